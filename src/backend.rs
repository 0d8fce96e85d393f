//! Capability contracts implemented by the hardware-abstraction backends.
//!
//! Backends are registered once and then driven through these traits by the
//! stream runtime. Every lifecycle hook defaults to a no-op so a backend only
//! implements the operations its hardware actually needs. Hooks take `&self`;
//! backends that carry device state use interior mutability.

use anyhow::Result;

use crate::caps::{Direction, HwParams, StreamCaps};

/// Frame counts reported by position and latency hooks.
pub type Frames = u64;

/// Stream state-change commands issued through trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerCmd {
    Start,
    Stop,
    PausePush,
    PauseRelease,
    Suspend,
    Resume,
}

/// Power-domain stream events delivered to the notification sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEvent {
    Start,
    Stop,
}

/// One side of an audio data path: the data interface or the codec.
///
/// A single endpoint may be referenced by several concurrently open streams
/// (for example one codec driving independent playback and capture streams);
/// the shared activation bookkeeping lives in [`crate::endpoint::Endpoint`],
/// not in the backend.
pub trait EndpointBackend: Send + Sync {
    /// Capability descriptor for one direction. Return a reference to a
    /// [`StreamCaps::unsupported`] value for a direction the hardware lacks.
    fn caps(&self, dir: Direction) -> &StreamCaps;

    /// Whether all concurrently active streams on this endpoint must share
    /// one sample rate.
    fn symmetric_rates(&self) -> bool {
        false
    }

    fn start(&self, dir: Direction) -> Result<()> {
        let _ = dir;
        Ok(())
    }

    fn shutdown(&self, dir: Direction) -> Result<()> {
        let _ = dir;
        Ok(())
    }

    fn configure(&self, dir: Direction, params: &HwParams) -> Result<()> {
        let _ = (dir, params);
        Ok(())
    }

    fn release_params(&self, dir: Direction) -> Result<()> {
        let _ = dir;
        Ok(())
    }

    fn prepare(&self, dir: Direction) -> Result<()> {
        let _ = dir;
        Ok(())
    }

    fn trigger(&self, dir: Direction, cmd: TriggerCmd) -> Result<()> {
        let _ = (dir, cmd);
        Ok(())
    }

    /// Mute or unmute the converter output path.
    fn set_mute(&self, mute: bool) {
        let _ = mute;
    }

    /// Frames of latency this endpoint adds to position reporting.
    fn reporting_latency(&self) -> Frames {
        0
    }
}

/// The backend moving samples between buffer memory and the endpoints.
pub trait DataMoverBackend: Send + Sync {
    fn start(&self, dir: Direction) -> Result<()> {
        let _ = dir;
        Ok(())
    }

    fn shutdown(&self, dir: Direction) -> Result<()> {
        let _ = dir;
        Ok(())
    }

    fn configure(&self, dir: Direction, params: &HwParams) -> Result<()> {
        let _ = (dir, params);
        Ok(())
    }

    fn release_params(&self, dir: Direction) -> Result<()> {
        let _ = dir;
        Ok(())
    }

    fn prepare(&self, dir: Direction) -> Result<()> {
        let _ = dir;
        Ok(())
    }

    fn trigger(&self, dir: Direction, cmd: TriggerCmd) -> Result<()> {
        let _ = (dir, cmd);
        Ok(())
    }

    /// Current offset into the sample buffer.
    fn position(&self, dir: Direction) -> Frames;

    /// First-order latency contributed by the mover itself.
    fn reporting_latency(&self) -> Frames {
        0
    }
}

/// Board-level glue for one stream association. Every hook is optional.
pub trait LinkPolicyBackend: Send + Sync {
    /// Link-level symmetric-rate requirement.
    fn symmetric_rates(&self) -> bool {
        false
    }

    fn start(&self, dir: Direction) -> Result<()> {
        let _ = dir;
        Ok(())
    }

    fn configure(&self, dir: Direction, params: &HwParams) -> Result<()> {
        let _ = (dir, params);
        Ok(())
    }

    fn prepare(&self, dir: Direction) -> Result<()> {
        let _ = dir;
        Ok(())
    }

    fn release_params(&self, dir: Direction) -> Result<()> {
        let _ = dir;
        Ok(())
    }

    fn shutdown(&self, dir: Direction) -> Result<()> {
        let _ = dir;
        Ok(())
    }
}

/// Receiver for power-domain start/stop stream events.
///
/// Notifications are delivered while the emitting stream's transition is
/// still in progress (prepare, capture close) or from the deferred
/// power-down timer thread. The sink must not call back into lifecycle
/// operations of the substream that triggered the notification.
pub trait PowerSink: Send + Sync {
    fn notify(&self, stream_name: &str, event: PowerEvent);
}

/// Sink that discards power notifications.
pub struct NullPowerSink;

impl PowerSink for NullPowerSink {
    fn notify(&self, _stream_name: &str, _event: PowerEvent) {}
}
