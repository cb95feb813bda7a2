//! Playground configuration.
//!
//! Every section carries defaults matching the stock playground layout
//! (`/app/docker-compose.yml`, a `zookeeper` coordination service, three
//! default brokers `kafka1..kafka3`), so an empty config file is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{PlaygroundError, Result};
use crate::topology::ClusterId;

/// Top-level configuration for the topology manager.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaygroundConfig {
    /// Manifest location.
    pub manifest: ManifestConfig,

    /// Compose project settings.
    pub project: ProjectConfig,

    /// Naming and broker template settings.
    pub topology: TopologyConfig,

    /// External port allocation.
    pub ports: PortConfig,

    /// Container runtime timeouts and compose invocation.
    pub runtime: RuntimeConfig,

    /// Baseline retained by a full reset.
    pub reset: ResetConfig,

    /// Services stopped by an unscoped stop.
    pub stop: StopConfig,

    /// Host port probing.
    pub validation: ValidationConfig,
}

/// Manifest location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Path to the compose manifest.
    pub path: PathBuf,

    /// Directory the compose CLI runs in.
    pub project_dir: PathBuf,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/app/docker-compose.yml"),
            project_dir: PathBuf::from("/app"),
        }
    }
}

/// Compose project settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project name; the runtime prefixes volume names with it.
    pub name: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "kafka-playground".to_string(),
        }
    }
}

impl ProjectConfig {
    /// Returns the name a manifest volume is materialized under.
    pub fn materialized_volume(&self, volume: &str) -> String {
        format!("{}-{}", self.name, volume)
    }
}

/// Naming convention and broker template settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Reserved id of the default cluster.
    pub default_cluster_id: String,

    /// Prefix shared by every broker service name.
    pub broker_prefix: String,

    /// UI service that shares the broker prefix but is not a broker.
    pub ui_service: String,

    /// Default-cluster brokers that can never be deleted.
    pub protected_brokers: Vec<String>,

    /// Broker cloned when a cluster has no brokers yet.
    pub fallback_template: String,

    /// Coordination service every broker depends on.
    pub coordination_service: String,

    /// Connection string for the coordination service.
    pub coordination_connect: String,

    /// Client port brokers listen on inside their container.
    pub client_port: u16,

    /// Listener port used for container-to-container traffic.
    pub internal_listener_port: u16,

    /// Host name advertised to clients outside the container network.
    pub advertised_host: String,

    /// Bootstrap list used for the default cluster when the manifest has none.
    pub default_bootstrap_servers: Vec<String>,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            default_cluster_id: "default".to_string(),
            broker_prefix: "kafka".to_string(),
            ui_service: "kafka-ui".to_string(),
            protected_brokers: vec![
                "kafka1".to_string(),
                "kafka2".to_string(),
                "kafka3".to_string(),
            ],
            fallback_template: "kafka1".to_string(),
            coordination_service: "zookeeper".to_string(),
            coordination_connect: "zookeeper:2181".to_string(),
            client_port: 9092,
            internal_listener_port: 29092,
            advertised_host: "localhost".to_string(),
            default_bootstrap_servers: vec![
                "kafka1:29092".to_string(),
                "kafka2:29093".to_string(),
                "kafka3:29094".to_string(),
            ],
        }
    }
}

/// External port allocation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// First candidate probed for a new broker.
    pub start_port: u16,

    /// Maximum number of candidates probed.
    pub max_probes: u32,

    /// Fail with `PortExhausted` instead of returning a possibly colliding port.
    pub strict: bool,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            start_port: 9095,
            max_probes: 100,
            strict: true,
        }
    }
}

/// Container runtime settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Compose executable and leading arguments (e.g. `["docker", "compose"]`).
    pub compose_command: Vec<String>,

    /// Timeout for scoped compose invocations, in seconds.
    pub compose_timeout_secs: u64,

    /// Timeout for bringing the whole manifest up, in seconds.
    pub start_all_timeout_secs: u64,

    /// Grace period given to a container on stop, in seconds.
    pub stop_timeout_secs: i64,

    /// Timeout for a single Docker API call, in seconds.
    pub api_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            compose_command: vec!["docker-compose".to_string()],
            compose_timeout_secs: 60,
            start_all_timeout_secs: 120,
            stop_timeout_secs: 10,
            api_timeout_secs: 30,
        }
    }
}

impl RuntimeConfig {
    /// Returns the compose timeout as a Duration.
    pub fn compose_timeout(&self) -> Duration {
        Duration::from_secs(self.compose_timeout_secs)
    }

    /// Returns the start-all timeout as a Duration.
    pub fn start_all_timeout(&self) -> Duration {
        Duration::from_secs(self.start_all_timeout_secs)
    }

    /// Returns the Docker API timeout as a Duration.
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

/// Baseline kept by a full reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResetConfig {
    /// Services retained in the manifest.
    pub baseline_services: Vec<String>,

    /// Volumes retained in the manifest.
    pub baseline_volumes: Vec<String>,

    /// Delay before the reset task starts touching anything, in milliseconds.
    pub grace_ms: u64,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            baseline_services: [
                "zookeeper",
                "kafka1",
                "kafka2",
                "kafka3",
                "control-panel",
                "headers",
                "header-cluster",
                "kafka-ui",
                "jupyter",
                "jupyter-kafka",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            baseline_volumes: [
                "zookeeper-data",
                "zookeeper-logs",
                "kafka1-data",
                "kafka2-data",
                "kafka3-data",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            grace_ms: 1000,
        }
    }
}

impl ResetConfig {
    /// Returns the grace delay as a Duration.
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

/// Services stopped when no cluster is named.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopConfig {
    /// Auxiliary services stopped alongside every broker.
    pub auxiliary_services: Vec<String>,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            auxiliary_services: ["zookeeper", "kafka-ui", "jupyter-kafka", "control-ui"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Host port probe settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Whether declared ports are probed on the host at all.
    pub probe_host_ports: bool,

    /// Host the probe connects to.
    pub probe_host: String,

    /// Connect timeout per port, in milliseconds.
    pub probe_timeout_ms: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            probe_host_ports: true,
            probe_host: "host.docker.internal".to_string(),
            probe_timeout_ms: 500,
        }
    }
}

impl ValidationConfig {
    /// Returns the probe timeout as a Duration.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl PlaygroundConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> PlaygroundConfigBuilder {
        PlaygroundConfigBuilder::default()
    }

    /// Returns the parsed default cluster id.
    pub fn default_cluster(&self) -> Result<ClusterId> {
        ClusterId::parse(&self.topology.default_cluster_id)
    }

    /// Checks the settings that would otherwise fail deep inside an operation.
    pub fn validate(&self) -> Result<()> {
        self.default_cluster()?;

        if self.topology.broker_prefix.is_empty() {
            return Err(PlaygroundError::configuration("broker_prefix must not be empty"));
        }
        if self.topology.broker_prefix.contains('-') {
            return Err(PlaygroundError::configuration(
                "broker_prefix must not contain '-'",
            ));
        }
        if self.ports.max_probes == 0 {
            return Err(PlaygroundError::configuration("max_probes must be at least 1"));
        }
        if self.runtime.compose_command.is_empty() {
            return Err(PlaygroundError::configuration("compose_command must not be empty"));
        }
        if self.project.name.is_empty() {
            return Err(PlaygroundError::configuration("project name must not be empty"));
        }

        Ok(())
    }
}

/// Builder for `PlaygroundConfig`.
#[derive(Debug, Default)]
pub struct PlaygroundConfigBuilder {
    config: PlaygroundConfig,
}

impl PlaygroundConfigBuilder {
    /// Sets the manifest path.
    pub fn manifest_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.manifest.path = path.into();
        self
    }

    /// Sets the compose project directory.
    pub fn project_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.manifest.project_dir = path.into();
        self
    }

    /// Sets the project name.
    pub fn project_name(mut self, name: impl Into<String>) -> Self {
        self.config.project.name = name.into();
        self
    }

    /// Sets the first port probed for new brokers.
    pub fn start_port(mut self, port: u16) -> Self {
        self.config.ports.start_port = port;
        self
    }

    /// Sets the probe budget of the port allocator.
    pub fn max_port_probes(mut self, probes: u32) -> Self {
        self.config.ports.max_probes = probes;
        self
    }

    /// Sets whether port exhaustion is an error.
    pub fn strict_ports(mut self, strict: bool) -> Self {
        self.config.ports.strict = strict;
        self
    }

    /// Sets the delay before a reset starts.
    pub fn reset_grace_ms(mut self, ms: u64) -> Self {
        self.config.reset.grace_ms = ms;
        self
    }

    /// Sets whether host ports are probed during validation.
    pub fn probe_host_ports(mut self, probe: bool) -> Self {
        self.config.validation.probe_host_ports = probe;
        self
    }

    /// Sets the host probed during validation.
    pub fn probe_host(mut self, host: impl Into<String>) -> Self {
        self.config.validation.probe_host = host.into();
        self
    }

    /// Sets the compose command.
    pub fn compose_command(mut self, command: Vec<String>) -> Self {
        self.config.runtime.compose_command = command;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> PlaygroundConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PlaygroundConfig::default();

        assert_eq!(config.manifest.path, PathBuf::from("/app/docker-compose.yml"));
        assert_eq!(config.project.materialized_volume("kafka4-data"), "kafka-playground-kafka4-data");
        assert_eq!(config.ports.start_port, 9095);
        assert_eq!(config.topology.protected_brokers.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = PlaygroundConfig::builder()
            .manifest_path("/tmp/compose.yml")
            .project_name("pg")
            .start_port(19000)
            .strict_ports(false)
            .reset_grace_ms(0)
            .build();

        assert_eq!(config.manifest.path, PathBuf::from("/tmp/compose.yml"));
        assert_eq!(config.project.name, "pg");
        assert_eq!(config.ports.start_port, 19000);
        assert!(!config.ports.strict);
        assert_eq!(config.reset.grace(), Duration::ZERO);
    }

    #[test]
    fn test_validation_rejects_bad_settings() {
        let mut config = PlaygroundConfig::default();
        config.topology.default_cluster_id = "not-valid".to_string();
        assert!(config.validate().is_err());

        let mut config = PlaygroundConfig::default();
        config.ports.max_probes = 0;
        assert!(config.validate().is_err());

        let mut config = PlaygroundConfig::default();
        config.runtime.compose_command.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PlaygroundConfig =
            serde_json::from_str(r#"{"ports": {"start_port": 10000}}"#).unwrap();
        assert_eq!(config.ports.start_port, 10000);
        assert_eq!(config.ports.max_probes, 100);
        assert_eq!(config.project.name, "kafka-playground");
    }
}
