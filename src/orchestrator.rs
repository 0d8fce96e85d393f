//! The public operation surface driving stream runtimes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::backend::{Frames, PowerSink, TriggerCmd};
use crate::caps::{HwParams, NegotiatedConfig};
use crate::config::OrchestratorConfig;
use crate::error::StreamError;
use crate::stream::{StreamDescriptor, StreamRuntime};

/// Owns the stream runtimes for every substream it has opened and drives
/// them through the lifecycle protocol.
///
/// Operations on different substreams may run concurrently; operations on
/// one substream serialize on that runtime's lock. The map lock below is
/// only ever held for lookup and insert/remove, never across a backend
/// hook, so a slow backend on one stream cannot stall another.
pub struct StreamOrchestrator {
    config: OrchestratorConfig,
    sink: Arc<dyn PowerSink>,
    streams: Mutex<HashMap<String, Arc<StreamRuntime>>>,
}

impl StreamOrchestrator {
    pub fn new(config: OrchestratorConfig, sink: Arc<dyn PowerSink>) -> Self {
        Self {
            config,
            sink,
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// Open a substream: start the backends, negotiate the configuration
    /// and retain the runtime. On failure nothing is retained and every
    /// started backend has been shut down again.
    pub fn open(&self, desc: StreamDescriptor) -> Result<NegotiatedConfig, StreamError> {
        let name = desc.name.clone();
        let direction = desc.direction;
        let runtime = Arc::new(StreamRuntime::new(
            desc,
            Arc::clone(&self.sink),
            Duration::from_millis(self.config.power_down_delay_ms),
        ));

        {
            let mut streams = self.lock_streams();
            if streams.contains_key(&name) {
                return Err(StreamError::StreamExists(name));
            }
            streams.insert(name.clone(), Arc::clone(&runtime));
        }

        match runtime.open() {
            Ok(cfg) => {
                log::info!("'{}': {} stream open", name, direction.as_str());
                Ok(cfg)
            }
            Err(e) => {
                self.lock_streams().remove(&name);
                Err(e)
            }
        }
    }

    /// Close a substream and release the runtime.
    pub fn close(&self, name: &str) -> Result<(), StreamError> {
        let runtime = self
            .lock_streams()
            .remove(name)
            .ok_or_else(|| StreamError::UnknownStream(name.to_string()))?;
        runtime.close();
        log::info!("'{}': stream closed", name);
        Ok(())
    }

    /// Commit hardware parameters, validated against the configuration
    /// negotiated at open.
    pub fn set_params(&self, name: &str, params: &HwParams) -> Result<(), StreamError> {
        self.get(name)?.set_params(params)
    }

    /// Release committed hardware parameters (best-effort, always completes).
    pub fn free_params(&self, name: &str) -> Result<(), StreamError> {
        self.get(name)?.free_params();
        Ok(())
    }

    /// Ready the substream for the data path. Retriable.
    pub fn prepare(&self, name: &str) -> Result<(), StreamError> {
        self.get(name)?.prepare()
    }

    /// Change the stream state. Lock-free at this layer; must not be called
    /// concurrently with other transitions on the same substream.
    pub fn trigger(&self, name: &str, cmd: TriggerCmd) -> Result<(), StreamError> {
        self.get(name)?.trigger(cmd)
    }

    /// Buffer position and aggregated reporting latency of the substream.
    pub fn position(&self, name: &str) -> Result<(Frames, Frames), StreamError> {
        Ok(self.get(name)?.position())
    }

    /// The runtime for an open substream, if any.
    pub fn stream(&self, name: &str) -> Option<Arc<StreamRuntime>> {
        self.lock_streams().get(name).cloned()
    }

    fn get(&self, name: &str) -> Result<Arc<StreamRuntime>, StreamError> {
        self.stream(name)
            .ok_or_else(|| StreamError::UnknownStream(name.to_string()))
    }

    fn lock_streams(&self) -> MutexGuard<'_, HashMap<String, Arc<StreamRuntime>>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
