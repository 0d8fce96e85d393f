//! Typed errors surfaced by orchestrator operations.

use std::fmt;

use thiserror::Error;

/// The party of a lifecycle transition that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DataInterface,
    DataMover,
    Codec,
    LinkPolicy,
    /// Parameter validation before any backend was involved.
    Caller,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::DataInterface => "data interface",
            Stage::DataMover => "data mover",
            Stage::Codec => "codec",
            Stage::LinkPolicy => "link policy",
            Stage::Caller => "caller",
        };
        f.write_str(name)
    }
}

/// Errors returned by the orchestrator's public operations.
///
/// Open and set-params fail non-destructively: every stage that succeeded
/// before the failure is unwound first. Prepare and trigger abort without
/// rollback; partial completion is accepted by design.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("{stage} start failed")]
    BackendStartFailed {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    #[error("no matching rates between '{codec}' and '{dai}'")]
    NoMatchingRates { dai: String, codec: String },

    #[error("no matching formats between '{codec}' and '{dai}'")]
    NoMatchingFormats { dai: String, codec: String },

    #[error("no matching channels between '{codec}' and '{dai}'")]
    NoMatchingChannels { dai: String, codec: String },

    #[error("{stage} rejected hardware parameters")]
    ConfigRejected {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    #[error("{stage} prepare failed")]
    PrepareFailed {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    #[error("{stage} trigger failed")]
    TriggerFailed {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    #[error("unknown stream '{0}'")]
    UnknownStream(String),

    #[error("stream '{0}' is already open")]
    StreamExists(String),
}

impl StreamError {
    /// The failing stage, when the error identifies one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            StreamError::BackendStartFailed { stage, .. }
            | StreamError::ConfigRejected { stage, .. }
            | StreamError::PrepareFailed { stage, .. }
            | StreamError::TriggerFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
