//! Audio stream runtime orchestration over pluggable hardware backends.
//!
//! One audio data stream couples a data-interface endpoint with a codec
//! endpoint, a data mover and an optional board-level link policy. This
//! crate owns the negotiation and lifecycle protocol between them: it
//! intersects the endpoints' capability descriptors into a per-stream
//! configuration, drives the backends' lifecycle hooks in a fixed order with
//! rollback on partial failure, tracks shared endpoint activation across
//! concurrent streams, and debounces the power-domain stop notification
//! after playback close so rapid track changes do not pop.
//!
//! Backends implement the traits in [`backend`] and are registered through
//! [`Endpoint::new`]; callers drive streams through [`StreamOrchestrator`].

pub mod backend;
pub mod caps;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod orchestrator;
pub mod stream;

pub use backend::{
    DataMoverBackend, EndpointBackend, Frames, LinkPolicyBackend, NullPowerSink, PowerEvent,
    PowerSink, TriggerCmd,
};
pub use caps::{negotiate, Direction, HwParams, NegotiatedConfig, StreamCaps};
pub use config::OrchestratorConfig;
pub use endpoint::Endpoint;
pub use error::{Stage, StreamError};
pub use orchestrator::StreamOrchestrator;
pub use stream::{StreamDescriptor, StreamRuntime};
