//! Shared mock backends for the orchestrator integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use soc_pcm_rs::caps::{FORMAT_S16_LE, FORMAT_S32_LE, RATE_44100, RATE_48000, RATE_8000, RATE_96000};
use soc_pcm_rs::{
    DataMoverBackend, Direction, EndpointBackend, Frames, HwParams, LinkPolicyBackend,
    OrchestratorConfig, PowerEvent, PowerSink, StreamCaps, StreamOrchestrator, TriggerCmd,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Capability descriptor the mocks use unless a test overrides it.
pub fn test_caps(stream_name: &str) -> StreamCaps {
    StreamCaps {
        stream_name: stream_name.to_string(),
        rate_min: 8000,
        rate_max: 96000,
        rates: RATE_8000 | RATE_44100 | RATE_48000 | RATE_96000,
        channels_min: 1,
        channels_max: 2,
        formats: FORMAT_S16_LE | FORMAT_S32_LE,
    }
}

pub fn orchestrator(sink: Arc<RecordingSink>, power_down_delay_ms: u64) -> StreamOrchestrator {
    StreamOrchestrator::new(OrchestratorConfig { power_down_delay_ms }, sink)
}

/// One program-order log shared by every mock of a test.
#[derive(Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn count(&self, needle: &str) -> usize {
        self.entries().iter().filter(|e| *e == needle).count()
    }
}

/// Power sink recording every notification.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(String, PowerEvent)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<(String, PowerEvent)> {
        self.events.lock().unwrap().clone()
    }

    pub fn starts(&self) -> usize {
        self.events().iter().filter(|(_, e)| *e == PowerEvent::Start).count()
    }

    pub fn stops(&self) -> usize {
        self.events().iter().filter(|(_, e)| *e == PowerEvent::Stop).count()
    }
}

impl PowerSink for RecordingSink {
    fn notify(&self, stream_name: &str, event: PowerEvent) {
        self.events.lock().unwrap().push((stream_name.to_string(), event));
    }
}

/// Endpoint backend logging every hook, with per-hook failure injection.
pub struct MockEndpoint {
    label: &'static str,
    playback: StreamCaps,
    capture: StreamCaps,
    symmetric: bool,
    latency: Frames,
    log: CallLog,
    fail: HashSet<&'static str>,
}

impl MockEndpoint {
    pub fn new(label: &'static str, log: &CallLog) -> Self {
        Self {
            label,
            playback: test_caps(&format!("{label} Playback")),
            capture: test_caps(&format!("{label} Capture")),
            symmetric: false,
            latency: 0,
            log: log.clone(),
            fail: HashSet::new(),
        }
    }

    pub fn symmetric(mut self) -> Self {
        self.symmetric = true;
        self
    }

    pub fn with_playback(mut self, caps: StreamCaps) -> Self {
        self.playback = caps;
        self
    }

    pub fn with_capture(mut self, caps: StreamCaps) -> Self {
        self.capture = caps;
        self
    }

    pub fn with_latency(mut self, frames: Frames) -> Self {
        self.latency = frames;
        self
    }

    pub fn fail_on(mut self, hook: &'static str) -> Self {
        self.fail.insert(hook);
        self
    }

    fn hook(&self, name: &'static str) -> anyhow::Result<()> {
        self.log.push(format!("{}.{}", self.label, name));
        if self.fail.contains(name) {
            anyhow::bail!("injected {} {} failure", self.label, name);
        }
        Ok(())
    }
}

impl EndpointBackend for MockEndpoint {
    fn caps(&self, dir: Direction) -> &StreamCaps {
        match dir {
            Direction::Playback => &self.playback,
            Direction::Capture => &self.capture,
        }
    }

    fn symmetric_rates(&self) -> bool {
        self.symmetric
    }

    fn start(&self, _dir: Direction) -> anyhow::Result<()> {
        self.hook("start")
    }

    fn shutdown(&self, _dir: Direction) -> anyhow::Result<()> {
        self.hook("shutdown")
    }

    fn configure(&self, _dir: Direction, _params: &HwParams) -> anyhow::Result<()> {
        self.hook("configure")
    }

    fn release_params(&self, _dir: Direction) -> anyhow::Result<()> {
        self.hook("release")
    }

    fn prepare(&self, _dir: Direction) -> anyhow::Result<()> {
        self.hook("prepare")
    }

    fn trigger(&self, _dir: Direction, _cmd: TriggerCmd) -> anyhow::Result<()> {
        self.hook("trigger")
    }

    fn set_mute(&self, mute: bool) {
        self.log.push(format!("{}.mute({})", self.label, mute));
    }

    fn reporting_latency(&self) -> Frames {
        self.latency
    }
}

/// Data-mover backend with a settable buffer position.
pub struct MockMover {
    label: &'static str,
    position: AtomicU64,
    latency: Frames,
    log: CallLog,
    fail: HashSet<&'static str>,
}

impl MockMover {
    pub fn new(log: &CallLog) -> Self {
        Self {
            label: "mover",
            position: AtomicU64::new(0),
            latency: 0,
            log: log.clone(),
            fail: HashSet::new(),
        }
    }

    pub fn with_position(self, frames: Frames) -> Self {
        self.position.store(frames, Ordering::Relaxed);
        self
    }

    pub fn with_latency(mut self, frames: Frames) -> Self {
        self.latency = frames;
        self
    }

    pub fn fail_on(mut self, hook: &'static str) -> Self {
        self.fail.insert(hook);
        self
    }

    fn hook(&self, name: &'static str) -> anyhow::Result<()> {
        self.log.push(format!("{}.{}", self.label, name));
        if self.fail.contains(name) {
            anyhow::bail!("injected {} {} failure", self.label, name);
        }
        Ok(())
    }
}

impl DataMoverBackend for MockMover {
    fn start(&self, _dir: Direction) -> anyhow::Result<()> {
        self.hook("start")
    }

    fn shutdown(&self, _dir: Direction) -> anyhow::Result<()> {
        self.hook("shutdown")
    }

    fn configure(&self, _dir: Direction, _params: &HwParams) -> anyhow::Result<()> {
        self.hook("configure")
    }

    fn release_params(&self, _dir: Direction) -> anyhow::Result<()> {
        self.hook("release")
    }

    fn prepare(&self, _dir: Direction) -> anyhow::Result<()> {
        self.hook("prepare")
    }

    fn trigger(&self, _dir: Direction, _cmd: TriggerCmd) -> anyhow::Result<()> {
        self.hook("trigger")
    }

    fn position(&self, _dir: Direction) -> Frames {
        self.position.load(Ordering::Relaxed)
    }

    fn reporting_latency(&self) -> Frames {
        self.latency
    }
}

/// Link policy backend logging every hook.
pub struct MockLink {
    label: &'static str,
    symmetric: bool,
    log: CallLog,
    fail: HashSet<&'static str>,
}

impl MockLink {
    pub fn new(log: &CallLog) -> Self {
        Self {
            label: "link",
            symmetric: false,
            log: log.clone(),
            fail: HashSet::new(),
        }
    }

    pub fn symmetric(mut self) -> Self {
        self.symmetric = true;
        self
    }

    pub fn fail_on(mut self, hook: &'static str) -> Self {
        self.fail.insert(hook);
        self
    }

    fn hook(&self, name: &'static str) -> anyhow::Result<()> {
        self.log.push(format!("{}.{}", self.label, name));
        if self.fail.contains(name) {
            anyhow::bail!("injected {} {} failure", self.label, name);
        }
        Ok(())
    }
}

impl LinkPolicyBackend for MockLink {
    fn symmetric_rates(&self) -> bool {
        self.symmetric
    }

    fn start(&self, _dir: Direction) -> anyhow::Result<()> {
        self.hook("start")
    }

    fn configure(&self, _dir: Direction, _params: &HwParams) -> anyhow::Result<()> {
        self.hook("configure")
    }

    fn prepare(&self, _dir: Direction) -> anyhow::Result<()> {
        self.hook("prepare")
    }

    fn release_params(&self, _dir: Direction) -> anyhow::Result<()> {
        self.hook("release")
    }

    fn shutdown(&self, _dir: Direction) -> anyhow::Result<()> {
        self.hook("shutdown")
    }
}
