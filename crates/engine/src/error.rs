//! Engine error type.

use uuid::Uuid;

use escalator_rules::RuleError;

/// Errors surfaced by the escalation engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Clock or timer infrastructure failed. The instance was not changed;
    /// the caller should retry with backoff.
    #[error("scheduling unavailable: {0}")]
    SchedulingUnavailable(String),

    /// The id was never issued or the instance has been purged.
    #[error("unknown escalation instance: {0}")]
    UnknownInstance(Uuid),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// A string did not name a known stage, action, or notification kind.
    #[error("unknown {kind} '{value}'")]
    InvalidValue { kind: &'static str, value: String },

    /// A downstream collaborator (dispatch, workflow resume) failed.
    #[error("collaborator '{name}' failed: {reason}")]
    Collaborator { name: String, reason: String },

    #[error(transparent)]
    Rules(#[from] RuleError),
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
