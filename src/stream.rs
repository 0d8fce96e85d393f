//! Per-substream runtime: the negotiation and lifecycle state machine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::backend::{
    DataMoverBackend, Frames, LinkPolicyBackend, PowerEvent, PowerSink, TriggerCmd,
};
use crate::caps::{negotiate, Direction, HwParams, NegotiatedConfig};
use crate::endpoint::Endpoint;
use crate::error::{Stage, StreamError};

/// Wiring for one substream: the backends its runtime drives.
pub struct StreamDescriptor {
    pub name: String,
    pub direction: Direction,
    pub data_interface: Arc<Endpoint>,
    pub codec: Arc<Endpoint>,
    pub data_mover: Arc<dyn DataMoverBackend>,
    pub link_policy: Option<Arc<dyn LinkPolicyBackend>>,
}

/// One open substream.
///
/// All lifecycle transitions (open, set-params, free-params, prepare, close)
/// serialize on the runtime's lock and hold it for the full transition.
/// Trigger and position take no lock; callers must not overlap trigger with
/// other transitions on the same substream.
pub struct StreamRuntime {
    name: String,
    direction: Direction,
    dai: Arc<Endpoint>,
    codec: Arc<Endpoint>,
    mover: Arc<dyn DataMoverBackend>,
    link: Option<Arc<dyn LinkPolicyBackend>>,
    sink: Arc<dyn PowerSink>,
    power_down_delay: Duration,
    /// Aggregated reporting latency from the last position query.
    latency: AtomicU64,
    state: Mutex<RuntimeState>,
}

#[derive(Default)]
struct RuntimeState {
    open: bool,
    negotiated: Option<NegotiatedConfig>,
    /// Rate committed by set-params. 0 = unset.
    rate: u32,
}

const START_ORDER: [Stage; 4] = [
    Stage::DataInterface,
    Stage::DataMover,
    Stage::Codec,
    Stage::LinkPolicy,
];
const CONFIGURE_ORDER: [Stage; 4] = [
    Stage::LinkPolicy,
    Stage::Codec,
    Stage::DataInterface,
    Stage::DataMover,
];
const RELEASE_ORDER: [Stage; 4] = [
    Stage::LinkPolicy,
    Stage::DataMover,
    Stage::Codec,
    Stage::DataInterface,
];
const PREPARE_ORDER: [Stage; 4] = [
    Stage::LinkPolicy,
    Stage::DataMover,
    Stage::Codec,
    Stage::DataInterface,
];
const TRIGGER_ORDER: [Stage; 3] = [Stage::Codec, Stage::DataMover, Stage::DataInterface];
const SHUTDOWN_ORDER: [Stage; 4] = [
    Stage::LinkPolicy,
    Stage::DataInterface,
    Stage::Codec,
    Stage::DataMover,
];

impl StreamRuntime {
    pub(crate) fn new(
        desc: StreamDescriptor,
        sink: Arc<dyn PowerSink>,
        power_down_delay: Duration,
    ) -> Self {
        Self {
            name: desc.name,
            direction: desc.direction,
            dai: desc.data_interface,
            codec: desc.codec,
            mover: desc.data_mover,
            link: desc.link_policy,
            sink,
            power_down_delay,
            latency: AtomicU64::new(0),
            state: Mutex::new(RuntimeState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_open(&self) -> bool {
        self.lock_state().open
    }

    /// The configuration negotiated at open, while the stream is open.
    pub fn negotiated(&self) -> Option<NegotiatedConfig> {
        self.lock_state().negotiated.clone()
    }

    /// Rate committed by the last set-params. 0 = unset.
    pub fn rate(&self) -> u32 {
        self.lock_state().rate
    }

    /// Aggregated reporting latency stored by the last position query.
    pub fn latency(&self) -> Frames {
        self.latency.load(Ordering::Relaxed)
    }

    /// Start every backend, negotiate the stream configuration and mark both
    /// endpoints active.
    ///
    /// Any failure unwinds the backends that already started, in reverse
    /// start order, leaving all backend and counter state untouched.
    pub(crate) fn open(&self) -> Result<NegotiatedConfig, StreamError> {
        let mut state = self.lock_state();
        if state.open {
            return Err(StreamError::StreamExists(self.name.clone()));
        }
        let dir = self.direction;

        let dai_caps = self.dai.backend().caps(dir);
        let codec_caps = self.codec.backend().caps(dir);
        if dai_caps.channels_min == 0 || codec_caps.channels_min == 0 {
            log::error!(
                "'{}': no {} support on '{}' <-> '{}'",
                self.name,
                dir.as_str(),
                self.codec.name(),
                self.dai.name(),
            );
            return Err(self.no_matching_channels());
        }

        let mut started: Vec<Stage> = Vec::with_capacity(START_ORDER.len());
        for stage in START_ORDER {
            if let Err(e) = self.run_start(stage, dir) {
                log::error!("'{}': can't start {}: {:#}", self.name, stage, e);
                self.unwind_started(&started, dir);
                return Err(StreamError::BackendStartFailed { stage, source: e });
            }
            started.push(stage);
        }

        let mut cfg = negotiate(dai_caps, codec_caps);
        if let Err(e) = self.check_negotiated(&cfg) {
            self.unwind_started(&started, dir);
            return Err(e);
        }

        // Symmetry only applies if another stream is already using one of
        // the endpoints.
        if self.dai.active() > 0 || self.codec.active() > 0 {
            self.apply_symmetry(&mut cfg);
        }

        log::debug!(
            "'{}': negotiated rates 0x{:x} ({}-{} Hz), channels {}-{}, formats 0x{:x}",
            self.name,
            cfg.rates,
            cfg.rate_min,
            cfg.rate_max,
            cfg.channels_min,
            cfg.channels_max,
            cfg.formats,
        );

        self.dai.activate(dir);
        self.codec.activate(dir);
        state.open = true;
        state.negotiated = Some(cfg.clone());
        Ok(cfg)
    }

    /// Commit hardware parameters to every backend.
    ///
    /// On failure, every stage that already accepted the parameters gets a
    /// release call in reverse order before the error is surfaced.
    pub(crate) fn set_params(&self, params: &HwParams) -> Result<(), StreamError> {
        let mut state = self.lock_state();
        let Some(cfg) = state.negotiated.clone() else {
            return Err(StreamError::ConfigRejected {
                stage: Stage::Caller,
                source: anyhow::anyhow!("stream '{}' is not open", self.name),
            });
        };
        if !cfg.supports(params) {
            log::error!(
                "'{}': rate={} channels={} format=0x{:x} outside the negotiated configuration",
                self.name,
                params.rate,
                params.channels,
                params.format,
            );
            return Err(StreamError::ConfigRejected {
                stage: Stage::Caller,
                source: anyhow::anyhow!(
                    "rate {} channels {} format {:#x} were not negotiated",
                    params.rate,
                    params.channels,
                    params.format,
                ),
            });
        }

        let mut committed: Vec<Stage> = Vec::with_capacity(CONFIGURE_ORDER.len());
        for stage in CONFIGURE_ORDER {
            if let Err(e) = self.run_configure(stage, params) {
                log::error!("'{}': {} rejected hardware parameters: {:#}", self.name, stage, e);
                for &done in committed.iter().rev() {
                    if let Err(e2) = self.run_release(done) {
                        log::warn!(
                            "'{}': {} release failed during rollback: {:#}",
                            self.name,
                            done,
                            e2,
                        );
                    }
                }
                return Err(StreamError::ConfigRejected { stage, source: e });
            }
            committed.push(stage);
        }

        state.rate = params.rate;
        // Later opens on a shared endpoint check this for rate symmetry.
        self.dai.set_committed_rate(params.rate);
        self.codec.set_committed_rate(params.rate);
        Ok(())
    }

    /// Release committed hardware parameters. Best-effort: every stage is
    /// released even if an earlier one fails.
    pub(crate) fn free_params(&self) {
        let mut state = self.lock_state();
        // Muting the converter suppresses artifacts caused during digital
        // shutdown, for example from stopping clocks.
        if self.codec.active() == 0 {
            self.codec.backend().set_mute(true);
        }
        for stage in RELEASE_ORDER {
            if let Err(e) = self.run_release(stage) {
                log::warn!("'{}': {} release failed: {:#}", self.name, stage, e);
            }
        }
        state.rate = 0;
    }

    /// Ready the backends for the data path. Retriable; may be called
    /// multiple times without reopening. The first failure aborts with no
    /// rollback; the caller is expected to close the stream.
    pub(crate) fn prepare(&self) -> Result<(), StreamError> {
        let _state = self.lock_state();
        let dir = self.direction;

        for stage in PREPARE_ORDER {
            if let Err(e) = self.run_prepare(stage, dir) {
                log::error!("'{}': {} prepare failed: {:#}", self.name, stage, e);
                return Err(StreamError::PrepareFailed { stage, source: e });
            }
        }

        // A recent playback close may have armed the deferred power-down on
        // the codec; this stream supersedes it.
        if dir == Direction::Playback && self.codec.cancel_power_down() {
            log::debug!("'{}': cancelled pending power-down", self.name);
        }

        let stream_name = &self.codec.backend().caps(dir).stream_name;
        self.sink.notify(stream_name, PowerEvent::Start);
        self.codec.backend().set_mute(false);
        Ok(())
    }

    /// Change the stream state (start, stop, pause, resume).
    ///
    /// Takes no lock: this is the time-critical path. The first failure
    /// returns immediately; the stages already triggered are left as they
    /// are, which the caller must treat as a hazard.
    pub fn trigger(&self, cmd: TriggerCmd) -> Result<(), StreamError> {
        for stage in TRIGGER_ORDER {
            if let Err(e) = self.run_trigger(stage, cmd) {
                log::error!("'{}': {} trigger {:?} failed: {:#}", self.name, stage, cmd, e);
                return Err(StreamError::TriggerFailed { stage, source: e });
            }
        }
        Ok(())
    }

    /// Tear the stream down. Best-effort: every shutdown hook runs, failures
    /// are logged and swallowed.
    pub(crate) fn close(&self) {
        let mut state = self.lock_state();
        if !state.open {
            return;
        }
        let dir = self.direction;

        self.dai.deactivate(dir);
        self.codec.deactivate(dir);
        if self.dai.active() == 0 && self.codec.active() == 0 {
            // No stream holds a rate anymore; the next open negotiates fresh.
            self.dai.set_committed_rate(0);
            self.codec.set_committed_rate(0);
        }

        match dir {
            Direction::Playback => {
                // Mute first, then debounce the power-down: an immediate stop
                // notification on every close would pop between tracks.
                self.codec.backend().set_mute(true);
                let stream_name = self.codec.backend().caps(dir).stream_name.clone();
                Arc::clone(&self.codec).arm_power_down(
                    Arc::clone(&self.sink),
                    stream_name,
                    self.power_down_delay,
                );
            }
            Direction::Capture => {
                // Capture paths can be powered down right away.
                let stream_name = &self.codec.backend().caps(dir).stream_name;
                self.sink.notify(stream_name, PowerEvent::Stop);
            }
        }

        for stage in SHUTDOWN_ORDER {
            if let Err(e) = self.run_shutdown(stage, dir) {
                log::warn!("'{}': {} shutdown failed: {:#}", self.name, stage, e);
            }
        }

        state.open = false;
        state.negotiated = None;
        state.rate = 0;
    }

    /// Data-mover buffer position plus the aggregated reporting latency of
    /// the whole path. Takes no lock; safe to call from the data path. A
    /// backend without a latency hook contributes zero.
    pub fn position(&self) -> (Frames, Frames) {
        let offset = self.mover.position(self.direction);
        let latency = self.dai.backend().reporting_latency()
            + self.codec.backend().reporting_latency()
            + self.mover.reporting_latency();
        self.latency.store(latency, Ordering::Relaxed);
        (offset, latency)
    }

    fn check_negotiated(&self, cfg: &NegotiatedConfig) -> Result<(), StreamError> {
        if cfg.rates == 0 || cfg.rate_min > cfg.rate_max {
            log::error!("'{}' <-> '{}': no matching rates", self.codec.name(), self.dai.name());
            return Err(StreamError::NoMatchingRates {
                dai: self.dai.name().to_string(),
                codec: self.codec.name().to_string(),
            });
        }
        if cfg.formats == 0 {
            log::error!("'{}' <-> '{}': no matching formats", self.codec.name(), self.dai.name());
            return Err(StreamError::NoMatchingFormats {
                dai: self.dai.name().to_string(),
                codec: self.codec.name().to_string(),
            });
        }
        if cfg.channels_min == 0 || cfg.channels_max == 0 || cfg.channels_min > cfg.channels_max {
            log::error!("'{}' <-> '{}': no matching channels", self.codec.name(), self.dai.name());
            return Err(self.no_matching_channels());
        }
        Ok(())
    }

    /// Constrain the negotiated configuration to the rate other streams on
    /// the shared endpoint already committed to. Never fails the open: a
    /// racing second initiator or an out-of-range committed rate degrades to
    /// a warning.
    fn apply_symmetry(&self, cfg: &mut NegotiatedConfig) {
        let required = self.dai.backend().symmetric_rates()
            || self.codec.backend().symmetric_rates()
            || self.link.as_ref().is_some_and(|link| link.symmetric_rates());
        if !required {
            return;
        }

        // Two streams starting simultaneously can get here before the first
        // one has picked a rate.
        let committed = [&self.dai, &self.codec]
            .into_iter()
            .filter(|ep| ep.active() > 0)
            .map(|ep| ep.committed_rate())
            .find(|rate| *rate != 0)
            .unwrap_or(0);
        if committed == 0 {
            log::warn!("'{}': not enforcing symmetric rates due to race", self.name);
            return;
        }

        if cfg.supports_rate(committed) {
            log::debug!("'{}': symmetry forces {}Hz rate", self.name, committed);
            cfg.rate_min = committed;
            cfg.rate_max = committed;
            cfg.limit_rates();
        } else {
            log::warn!(
                "'{}': not enforcing symmetric rate {}Hz outside the negotiated configuration",
                self.name,
                committed,
            );
        }
    }

    fn no_matching_channels(&self) -> StreamError {
        StreamError::NoMatchingChannels {
            dai: self.dai.name().to_string(),
            codec: self.codec.name().to_string(),
        }
    }

    fn unwind_started(&self, started: &[Stage], dir: Direction) {
        for &stage in started.iter().rev() {
            if let Err(e) = self.run_shutdown(stage, dir) {
                log::warn!(
                    "'{}': {} shutdown failed during open rollback: {:#}",
                    self.name,
                    stage,
                    e,
                );
            }
        }
    }

    fn run_start(&self, stage: Stage, dir: Direction) -> anyhow::Result<()> {
        match stage {
            Stage::DataInterface => self.dai.backend().start(dir),
            Stage::DataMover => self.mover.start(dir),
            Stage::Codec => self.codec.backend().start(dir),
            Stage::LinkPolicy => match &self.link {
                Some(link) => link.start(dir),
                None => Ok(()),
            },
            Stage::Caller => Ok(()),
        }
    }

    fn run_shutdown(&self, stage: Stage, dir: Direction) -> anyhow::Result<()> {
        match stage {
            Stage::DataInterface => self.dai.backend().shutdown(dir),
            Stage::DataMover => self.mover.shutdown(dir),
            Stage::Codec => self.codec.backend().shutdown(dir),
            Stage::LinkPolicy => match &self.link {
                Some(link) => link.shutdown(dir),
                None => Ok(()),
            },
            Stage::Caller => Ok(()),
        }
    }

    fn run_configure(&self, stage: Stage, params: &HwParams) -> anyhow::Result<()> {
        let dir = self.direction;
        match stage {
            Stage::DataInterface => self.dai.backend().configure(dir, params),
            Stage::DataMover => self.mover.configure(dir, params),
            Stage::Codec => self.codec.backend().configure(dir, params),
            Stage::LinkPolicy => match &self.link {
                Some(link) => link.configure(dir, params),
                None => Ok(()),
            },
            Stage::Caller => Ok(()),
        }
    }

    fn run_release(&self, stage: Stage) -> anyhow::Result<()> {
        let dir = self.direction;
        match stage {
            Stage::DataInterface => self.dai.backend().release_params(dir),
            Stage::DataMover => self.mover.release_params(dir),
            Stage::Codec => self.codec.backend().release_params(dir),
            Stage::LinkPolicy => match &self.link {
                Some(link) => link.release_params(dir),
                None => Ok(()),
            },
            Stage::Caller => Ok(()),
        }
    }

    fn run_prepare(&self, stage: Stage, dir: Direction) -> anyhow::Result<()> {
        match stage {
            Stage::DataInterface => self.dai.backend().prepare(dir),
            Stage::DataMover => self.mover.prepare(dir),
            Stage::Codec => self.codec.backend().prepare(dir),
            Stage::LinkPolicy => match &self.link {
                Some(link) => link.prepare(dir),
                None => Ok(()),
            },
            Stage::Caller => Ok(()),
        }
    }

    fn run_trigger(&self, stage: Stage, cmd: TriggerCmd) -> anyhow::Result<()> {
        let dir = self.direction;
        match stage {
            Stage::DataInterface => self.dai.backend().trigger(dir, cmd),
            Stage::DataMover => self.mover.trigger(dir, cmd),
            Stage::Codec => self.codec.backend().trigger(dir, cmd),
            Stage::LinkPolicy | Stage::Caller => Ok(()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RuntimeState> {
        // A panicked transition must not wedge the runtime; teardown paths
        // are best-effort and keep going with whatever state is left.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
