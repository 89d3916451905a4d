//! Error types for the intervention engine.

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the engine and its runtime.
///
/// Malformed signals, stale timer firings and stale outcomes are not errors;
/// they are logged and ignored.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A durable write (or the read feeding a decision) failed after retrying
    #[error("Persistence failed during {operation}: {source}")]
    Persistence {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The pause session already recorded its terminal outcome
    #[error("Pause session {session_id} already resolved")]
    SessionAlreadyResolved { session_id: Uuid },

    /// Continue was chosen before the countdown finished
    #[error("Countdown still running ({remaining_secs}s left)")]
    CountdownRunning { remaining_secs: u32 },

    /// Configuration file could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Built-in or user-supplied classifier pattern is invalid
    #[error("Invalid classifier pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine task is gone; commands can no longer be delivered
    #[error("Engine runtime stopped")]
    RuntimeStopped,
}

impl EngineError {
    pub(crate) fn persistence(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Persistence {
            operation,
            source: source.into(),
        }
    }
}
