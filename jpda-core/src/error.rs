// Engine error type

use jdwp_client::protocol::error_codes;
use jdwp_client::types::ThreadId;
use jdwp_client::JdwpError;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DebuggerError>;

#[derive(Debug, Error)]
pub enum DebuggerError {
    #[error("Failed to attach to target VM: {0}")]
    Attach(String),

    #[error("Timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    #[error("Debugger session is disconnected")]
    Disconnected,

    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    #[error("Thread {0:#x} is not suspended")]
    ThreadNotSuspended(ThreadId),

    #[error("Stop was already resumed")]
    AlreadyResumed,

    #[error("Variable is not mutable")]
    NotMutable,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Jdwp(JdwpError),
}

impl DebuggerError {
    pub fn invalid_expression(message: impl Into<String>) -> Self {
        DebuggerError::InvalidExpression(message.into())
    }

    pub fn timeout(what: impl Into<String>, after: Duration) -> Self {
        DebuggerError::Timeout {
            what: what.into(),
            after,
        }
    }

    /// Whether the failure means the target is gone
    pub fn is_disconnect(&self) -> bool {
        matches!(self, DebuggerError::Disconnected)
    }
}

impl From<JdwpError> for DebuggerError {
    fn from(err: JdwpError) -> Self {
        match err {
            JdwpError::ConnectionClosed => DebuggerError::Disconnected,
            ref e if e.error_code() == Some(error_codes::VM_DEAD) => DebuggerError::Disconnected,
            other => DebuggerError::Jdwp(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_transport_maps_to_disconnected() {
        let err: DebuggerError = JdwpError::ConnectionClosed.into();
        assert!(err.is_disconnect());

        let err: DebuggerError = JdwpError::code(error_codes::VM_DEAD).into();
        assert!(err.is_disconnect());
    }

    #[test]
    fn test_other_codes_are_wrapped() {
        let err: DebuggerError = JdwpError::code(error_codes::INVALID_CLASS).into();
        assert!(matches!(err, DebuggerError::Jdwp(_)));
        assert!(err.to_string().contains("INVALID_CLASS"));
    }
}
