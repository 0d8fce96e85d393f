//! Shared endpoint state: activation counters and deferred power-down.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crate::backend::{EndpointBackend, PowerEvent, PowerSink};
use crate::caps::Direction;

/// A registered endpoint backend plus the activation state shared by every
/// stream runtime that references it.
///
/// One physical endpoint may be multiplexed by several substreams, for
/// example a codec driving independent playback and capture runtimes. The
/// counters here are the shared bookkeeping those runtimes agree on; each
/// mutation happens under the mutating runtime's lock, and the counters are
/// atomics so concurrent transitions on other runtimes stay consistent.
pub struct Endpoint {
    name: String,
    backend: Box<dyn EndpointBackend>,
    active: AtomicU32,
    playback_active: AtomicU32,
    capture_active: AtomicU32,
    /// Rate committed by the most recent set-params while the endpoint is
    /// active. 0 = no stream has picked a rate yet.
    committed_rate: AtomicU32,
    power: Mutex<PowerDown>,
}

/// Deferred power-down bookkeeping for the codec side of a playback path.
#[derive(Default)]
struct PowerDown {
    pending: bool,
    /// Bumped on every arm; a stale timer firing late compares against it
    /// and backs off.
    generation: u64,
    timer: Option<TimerGuard>,
}

struct TimerGuard {
    cancel_tx: mpsc::Sender<()>,
}

impl Endpoint {
    /// Register a backend, producing the shared handle stream descriptors
    /// reference.
    pub fn new(name: impl Into<String>, backend: Box<dyn EndpointBackend>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            backend,
            active: AtomicU32::new(0),
            playback_active: AtomicU32::new(0),
            capture_active: AtomicU32::new(0),
            committed_rate: AtomicU32::new(0),
            power: Mutex::new(PowerDown::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &dyn EndpointBackend {
        self.backend.as_ref()
    }

    /// Total number of open streams referencing this endpoint.
    pub fn active(&self) -> u32 {
        self.active.load(Ordering::SeqCst)
    }

    pub fn playback_active(&self) -> u32 {
        self.playback_active.load(Ordering::SeqCst)
    }

    pub fn capture_active(&self) -> u32 {
        self.capture_active.load(Ordering::SeqCst)
    }

    pub(crate) fn activate(&self, dir: Direction) {
        match dir {
            Direction::Playback => self.playback_active.fetch_add(1, Ordering::SeqCst),
            Direction::Capture => self.capture_active.fetch_add(1, Ordering::SeqCst),
        };
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn deactivate(&self, dir: Direction) {
        match dir {
            Direction::Playback => self.playback_active.fetch_sub(1, Ordering::SeqCst),
            Direction::Capture => self.capture_active.fetch_sub(1, Ordering::SeqCst),
        };
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn committed_rate(&self) -> u32 {
        self.committed_rate.load(Ordering::SeqCst)
    }

    pub(crate) fn set_committed_rate(&self, rate: u32) {
        self.committed_rate.store(rate, Ordering::SeqCst);
    }

    /// Whether a deferred power-down is armed and has not fired yet.
    pub fn power_down_pending(&self) -> bool {
        self.lock_power().pending
    }

    /// Arm the deferred power-down timer. Arming while a previous timer is
    /// still pending replaces it; the last close wins.
    pub(crate) fn arm_power_down(
        self: Arc<Self>,
        sink: Arc<dyn PowerSink>,
        stream_name: String,
        delay: Duration,
    ) {
        let mut pd = self.lock_power();
        pd.pending = true;
        pd.generation += 1;
        let generation = pd.generation;

        let (cancel_tx, cancel_rx) = mpsc::channel();
        let endpoint = Arc::clone(&self);
        let timer_sink = Arc::clone(&sink);
        let timer_name = stream_name.clone();
        let spawned = thread::Builder::new()
            .name(format!("pmdown-{}", self.name))
            .spawn(move || {
                // Dropping the guard (cancel or replacement) disconnects the
                // channel; only an undisturbed timeout may fire.
                if let Err(RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(delay) {
                    endpoint.fire_power_down(generation, timer_sink.as_ref(), &timer_name);
                }
            });
        match spawned {
            Ok(_) => pd.timer = Some(TimerGuard { cancel_tx }),
            Err(e) => {
                log::warn!(
                    "'{}': failed to spawn power-down timer: {}, stopping stream power now",
                    self.name,
                    e,
                );
                pd.pending = false;
                drop(pd);
                sink.notify(&stream_name, PowerEvent::Stop);
            }
        }
    }

    fn fire_power_down(&self, generation: u64, sink: &dyn PowerSink, stream_name: &str) {
        let fire = {
            let mut pd = self.lock_power();
            if pd.pending && pd.generation == generation {
                pd.pending = false;
                pd.timer = None;
                true
            } else {
                false
            }
        };
        // Notify outside the lock so the sink may call back into the core.
        if fire {
            log::debug!("'{}': deferred power-down firing", self.name);
            sink.notify(stream_name, PowerEvent::Stop);
        }
    }

    /// Cancel a pending deferred power-down. Returns whether one was pending.
    pub(crate) fn cancel_power_down(&self) -> bool {
        let mut pd = self.lock_power();
        let was_pending = pd.pending;
        pd.pending = false;
        if let Some(timer) = pd.timer.take() {
            let _ = timer.cancel_tx.send(());
        }
        was_pending
    }

    fn lock_power(&self) -> MutexGuard<'_, PowerDown> {
        self.power.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
