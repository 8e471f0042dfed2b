//! Connection state of a data source.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SourceState {
    /// Never connected, disconnected, or failed a health check
    #[default]
    Offline,
    Connecting,
    Ready,
    /// Last connection attempt failed
    Failed(String),
}

impl SourceState {
    pub fn is_ready(&self) -> bool {
        matches!(self, SourceState::Ready)
    }
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceState::Offline => f.write_str("offline"),
            SourceState::Connecting => f.write_str("connecting"),
            SourceState::Ready => f.write_str("ready"),
            SourceState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serialization() {
        let ready = serde_json::to_value(SourceState::Ready).unwrap();
        assert_eq!(ready, serde_json::json!({"state": "ready"}));

        let failed = serde_json::to_value(SourceState::Failed("down".into())).unwrap();
        assert_eq!(
            failed,
            serde_json::json!({"state": "failed", "reason": "down"})
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(SourceState::Offline.to_string(), "offline");
        assert_eq!(SourceState::Failed("boom".into()).to_string(), "failed: boom");
        assert!(!SourceState::Connecting.is_ready());
    }
}
