//! Error types for the playground orchestrator.
//!
//! Errors fall into four groups that callers treat differently:
//!
//! - **Not found** (manifest file, container, volume, broker, cluster):
//!   tolerated during cleanup, surfaced as a client error when the missing
//!   thing was the subject of the request.
//! - **Validation** (bad names, protected resources): rejected before any
//!   mutation happens.
//! - **Runtime** (Docker API, compose CLI, timeouts): logged and skipped inside
//!   multi-step procedures; the manifest stays the desired state.
//! - **Persistence** (manifest write): fatal to the triggering operation.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, PlaygroundError>;

/// Errors that can occur while managing the playground topology.
#[derive(Debug, Error)]
pub enum PlaygroundError {
    /// The manifest file does not exist.
    #[error("manifest not found: {}", .0.display())]
    ManifestNotFound(PathBuf),

    /// Container not found in the runtime.
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// Volume not found in the runtime.
    #[error("volume not found: {0}")]
    VolumeNotFound(String),

    /// Broker service not declared in the manifest.
    #[error("broker not found: {0}")]
    BrokerNotFound(String),

    /// No brokers declared for the cluster.
    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    /// The service used as a template for new brokers is missing.
    #[error("template broker not found: {0}")]
    TemplateNotFound(String),

    /// A cluster or broker name failed validation.
    #[error("invalid name {name:?}: {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The target is protected and cannot be removed.
    #[error("protected resource: {0}")]
    Protected(String),

    /// Generic validation failure.
    #[error("validation error: {0}")]
    Validation(String),

    /// No free external port within the probe budget.
    #[error("no free port found starting at {start} after {attempts} attempts")]
    PortExhausted {
        /// First port probed.
        start: u16,
        /// Number of candidates probed.
        attempts: u32,
    },

    /// A topology mutation was attempted while a reset is running.
    #[error("a reset is in progress, topology changes are rejected until it completes")]
    ResetInProgress,

    /// Writing the manifest failed.
    #[error("failed to persist manifest {}: {source}", path.display())]
    Persistence {
        /// Manifest path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Manifest (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The compose CLI exited unsuccessfully.
    #[error("compose command `{command}` failed: {reason}")]
    ComposeFailed {
        /// The command line that was run.
        command: String,
        /// Exit status and stderr.
        reason: String,
    },

    /// The container runtime is unreachable or misbehaving.
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// Timeout waiting for a runtime call.
    #[error("timeout waiting for {operation}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
    },

    /// The broker admin protocol could not be reached.
    #[error("broker admin unavailable: {0}")]
    AdminUnavailable(String),

    /// Docker API error.
    #[error("Docker API error: {0}")]
    DockerApi(#[from] bollard::errors::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl PlaygroundError {
    /// Creates a container not found error.
    pub fn container_not_found(name: impl Into<String>) -> Self {
        Self::ContainerNotFound(name.into())
    }

    /// Creates a volume not found error.
    pub fn volume_not_found(name: impl Into<String>) -> Self {
        Self::VolumeNotFound(name.into())
    }

    /// Creates a broker not found error.
    pub fn broker_not_found(name: impl Into<String>) -> Self {
        Self::BrokerNotFound(name.into())
    }

    /// Creates a cluster not found error.
    pub fn cluster_not_found(id: impl Into<String>) -> Self {
        Self::ClusterNotFound(id.into())
    }

    /// Creates an invalid name error.
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a protected resource error.
    pub fn protected(what: impl Into<String>) -> Self {
        Self::Protected(what.into())
    }

    /// Creates a validation error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    /// Creates a persistence error.
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Creates a serialization error.
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization(reason.into())
    }

    /// Creates a compose failure error.
    pub fn compose_failed(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ComposeFailed {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Creates a runtime unavailable error.
    pub fn runtime_unavailable(reason: impl Into<String>) -> Self {
        Self::RuntimeUnavailable(reason.into())
    }

    /// Creates a timeout error.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Creates an admin unavailable error.
    pub fn admin_unavailable(reason: impl Into<String>) -> Self {
        Self::AdminUnavailable(reason.into())
    }

    /// Creates a configuration error.
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    /// Returns true if this is a not found error.
    ///
    /// Docker 404 responses count as not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::ManifestNotFound(_)
            | Self::ContainerNotFound(_)
            | Self::VolumeNotFound(_)
            | Self::BrokerNotFound(_)
            | Self::ClusterNotFound(_)
            | Self::TemplateNotFound(_) => true,
            Self::DockerApi(bollard::errors::Error::DockerResponseServerError {
                status_code, ..
            }) => *status_code == 404,
            _ => false,
        }
    }

    /// Returns true if the error was caused by the request rather than the backend.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Maps the error onto an HTTP-style status code.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidName { .. } | Self::Validation(_) => 400,
            Self::Protected(_) => 403,
            Self::ContainerNotFound(_)
            | Self::VolumeNotFound(_)
            | Self::BrokerNotFound(_)
            | Self::ClusterNotFound(_) => 404,
            Self::ResetInProgress => 409,
            Self::RuntimeUnavailable(_) | Self::AdminUnavailable(_) => 503,
            Self::Timeout { .. } => 504,
            Self::DockerApi(_) if self.is_not_found() => 404,
            Self::ManifestNotFound(_)
            | Self::TemplateNotFound(_)
            | Self::PortExhausted { .. }
            | Self::Persistence { .. }
            | Self::Serialization(_)
            | Self::ComposeFailed { .. }
            | Self::DockerApi(_)
            | Self::Io(_)
            | Self::Configuration(_) => 500,
        }
    }
}

impl From<serde_yaml::Error> for PlaygroundError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for PlaygroundError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlaygroundError::container_not_found("kafka4");
        assert_eq!(err.to_string(), "container not found: kafka4");

        let err = PlaygroundError::PortExhausted {
            start: 9095,
            attempts: 100,
        };
        assert_eq!(
            err.to_string(),
            "no free port found starting at 9095 after 100 attempts"
        );
    }

    #[test]
    fn test_error_is_not_found() {
        assert!(PlaygroundError::container_not_found("x").is_not_found());
        assert!(PlaygroundError::ManifestNotFound("/app/docker-compose.yml".into()).is_not_found());
        assert!(!PlaygroundError::protected("kafka1").is_not_found());

        let docker_404 = PlaygroundError::DockerApi(
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message: "No such container".to_string(),
            },
        );
        assert!(docker_404.is_not_found());
        assert_eq!(docker_404.status_code(), 404);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(PlaygroundError::invalid_name("a-b", "not alphanumeric").status_code(), 400);
        assert_eq!(PlaygroundError::protected("kafka1").status_code(), 403);
        assert_eq!(PlaygroundError::cluster_not_found("teamA").status_code(), 404);
        assert_eq!(PlaygroundError::ResetInProgress.status_code(), 409);
        assert_eq!(PlaygroundError::timeout("stop kafka4").status_code(), 504);
        assert!(PlaygroundError::protected("kafka1").is_client_error());
        assert!(!PlaygroundError::configuration("bad").is_client_error());
    }
}
