use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a test container.
///
/// ```text
/// Created ──start()──► Starting ──ready──► Started ──stop()──► Stopping ──► Stopped
///    ▲                    │
///    └──────failure───────┘
/// ```
///
/// `Stopped` is terminal: a container is never started or stopped twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    Created,
    Starting,
    Started,
    Stopping,
    Stopped,
}

impl ContainerState {
    pub fn can_start(self) -> bool {
        self == ContainerState::Created
    }

    pub fn can_stop(self) -> bool {
        self == ContainerState::Started
    }

    /// Whether remote operations (calls, installs, readiness waits) are allowed.
    pub fn accepts_calls(self) -> bool {
        self == ContainerState::Started
    }

    pub fn is_terminal(self) -> bool {
        self == ContainerState::Stopped
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContainerState::Created => "created",
            ContainerState::Starting => "starting",
            ContainerState::Started => "started",
            ContainerState::Stopping => "stopping",
            ContainerState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        assert!(ContainerState::Created.can_start());
        assert!(!ContainerState::Stopped.can_start());
        assert!(!ContainerState::Started.can_start());

        assert!(ContainerState::Started.can_stop());
        assert!(!ContainerState::Created.can_stop());
        assert!(!ContainerState::Stopped.can_stop());

        assert!(ContainerState::Started.accepts_calls());
        assert!(!ContainerState::Starting.accepts_calls());
        assert!(ContainerState::Stopped.is_terminal());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&ContainerState::Stopping).unwrap();
        assert_eq!(json, "\"stopping\"");
        assert_eq!(ContainerState::Started.to_string(), "started");
    }
}
