//! Container and volume state as reported by the runtime.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Container state.
///
/// Mirrors the runtime's own state names so status reports can echo them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContainerState {
    /// Container has been created but not started.
    Created,

    /// Container is running.
    Running,

    /// Container is paused.
    Paused,

    /// Container is being restarted.
    Restarting,

    /// Container is being removed.
    Removing,

    /// Container has exited.
    Exited,

    /// Container could not be stopped or removed cleanly.
    Dead,

    /// A state this crate does not know about.
    Unknown(String),
}

impl ContainerState {
    /// Parses a runtime state string.
    pub fn parse(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "removing" => Self::Removing,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Returns the runtime's name for this state.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Removing => "removing",
            Self::Exited => "exited",
            Self::Dead => "dead",
            Self::Unknown(s) => s,
        }
    }

    /// Returns true if the container is running.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exited | Self::Dead)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ContainerState {
    fn from(state: String) -> Self {
        Self::parse(&state)
    }
}

impl From<ContainerState> for String {
    fn from(state: ContainerState) -> Self {
        state.as_str().to_string()
    }
}

/// A container known to the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Container name without the leading slash.
    pub name: String,

    /// Container ID assigned by the runtime.
    pub id: String,

    /// Current state.
    pub state: ContainerState,

    /// Human-readable status line (e.g. `Up 3 minutes`).
    pub status: String,
}

impl ContainerInfo {
    /// Creates a container record.
    pub fn new(name: impl Into<String>, id: impl Into<String>, state: ContainerState) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            status: state.as_str().to_string(),
            state,
        }
    }

    /// Returns the short container ID (first 12 characters).
    pub fn short_id(&self) -> &str {
        self.id.get(..12).unwrap_or(&self.id)
    }

    /// Returns true if the container is running.
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }
}

/// A volume known to the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    /// Materialized volume name.
    pub name: String,
}

impl VolumeInfo {
    /// Creates a volume record.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_states() {
        assert_eq!(ContainerState::parse("running"), ContainerState::Running);
        assert_eq!(ContainerState::parse("EXITED"), ContainerState::Exited);
        assert_eq!(
            ContainerState::parse("weird"),
            ContainerState::Unknown("weird".to_string())
        );
        assert_eq!(ContainerState::Unknown("weird".to_string()).to_string(), "weird");
    }

    #[test]
    fn test_state_serializes_as_runtime_name() {
        let json = serde_json::to_string(&ContainerState::Running).unwrap();
        assert_eq!(json, "\"running\"");
        let state: ContainerState = serde_json::from_str("\"paused\"").unwrap();
        assert_eq!(state, ContainerState::Paused);
    }

    #[test]
    fn test_short_id() {
        let info = ContainerInfo::new("kafka1", "0123456789abcdef", ContainerState::Running);
        assert_eq!(info.short_id(), "0123456789ab");
        assert!(info.is_running());

        let short = ContainerInfo::new("kafka1", "abc", ContainerState::Exited);
        assert_eq!(short.short_id(), "abc");
        assert!(short.state.is_terminal());
    }
}
