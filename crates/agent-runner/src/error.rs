//! Error types for agent-runner

use thiserror::Error;

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors from a turn against the agent runtime
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The hop did not finish in time
    #[error("Turn timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// The runtime could not be reached
    #[error("Runtime network error: {message}")]
    Network { message: String },

    /// The runtime reported a failure
    #[error("Runtime error: {message}")]
    Runtime { message: String },

    /// The runtime answered with something we cannot read
    #[error("Invalid runtime response: {message}")]
    InvalidResponse { message: String },

    /// Agent is not part of the network
    #[error("Unknown agent: {name}")]
    UnknownAgent { name: String },

    /// Caller input rejected before any turn runs
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl RuntimeError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Text recorded in the session log when a hop fails with this error.
    pub fn log_text(&self) -> String {
        match self {
            Self::Timeout { .. } => "turn_timeout".to_string(),
            Self::Network { message } => format!("runtime_network_error: {}", message),
            other => format!("agents_sdk_error: {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_text_by_kind() {
        assert_eq!(RuntimeError::Timeout { seconds: 15 }.log_text(), "turn_timeout");
        assert_eq!(
            RuntimeError::network("refused").log_text(),
            "runtime_network_error: refused"
        );
        assert_eq!(
            RuntimeError::runtime("boom").log_text(),
            "agents_sdk_error: Runtime error: boom"
        );
    }
}
