//! Error taxonomy for the Carbon test container.

use std::time::Duration;
use thiserror::Error;

pub type CarbonResult<T> = Result<T, CarbonError>;

#[derive(Debug, Error)]
pub enum CarbonError {
    /// Invalid or incomplete container configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Distribution could not be materialised (download, extraction, copy).
    #[error("provisioning error: {0}")]
    Provisioning(String),

    /// Entry point missing or the child process could not be spawned.
    #[error("launch error: {0}")]
    Launch(String),

    /// Any fault on the control channel, including errors raised by the remote runtime.
    #[error("remote control error: {0}")]
    RemoteControl(String),

    /// Readiness component did not reach the expected state in time.
    #[error("bundle {bundle_id} did not become active within {timeout:?}")]
    ReadinessTimeout { bundle_id: u64, timeout: Duration },

    /// A remote test reported an assertion failure.
    #[error("assertion failed in {caption}: {message}")]
    Assertion { caption: String, message: String },

    /// Working directory cleanup failed. Never returned from `stop()`.
    #[error("cleanup error: {0}")]
    Cleanup(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CarbonError {
    /// Whether this error came from a test assertion rather than infrastructure.
    pub fn is_assertion(&self) -> bool {
        matches!(self, CarbonError::Assertion { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_timeout_message() {
        let err = CarbonError::ReadinessTimeout {
            bundle_id: 0,
            timeout: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "bundle 0 did not become active within 30s");
    }

    #[test]
    fn test_is_assertion() {
        let err = CarbonError::Assertion {
            caption: "testFoo".into(),
            message: "expected 1".into(),
        };
        assert!(err.is_assertion());
        assert!(!CarbonError::Internal("x".into()).is_assertion());
    }
}
