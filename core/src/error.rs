//! Adapter error types.

use std::time::Duration;
use thiserror::Error;

/// Why a question could not be answered.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A credential or setting the runtime needs is missing.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The question itself is unusable.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The runtime failed while running the pipeline. Holds the full detail
    /// for logs; callers decide what to show.
    #[error("Agent execution failed: {0}")]
    Execution(String),

    /// The invocation ran past the configured bound.
    #[error("Agent execution timed out after {0:?}")]
    Timeout(Duration),
}
