//! Manifest port validation.
//!
//! Two independent checks run over every literal host port the manifest
//! declares: collisions between services, and a TCP probe of the host to see
//! whether something else already listens there. Neither mutates anything.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::config::ValidationConfig;
use crate::error::Result;
use crate::manifest::{Manifest, ManifestStore};

/// A problem found in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    /// More than one service publishes the same host port.
    PortCollision {
        /// The port.
        port: u16,
        /// Every service claiming it, in manifest order.
        services: Vec<String>,
    },
    /// Something on the host already accepts connections on the port.
    PortInUse {
        /// The port.
        port: u16,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PortCollision { port, services } => write!(
                f,
                "Port {} is used by multiple services: {}",
                port,
                services.join(", ")
            ),
            Self::PortInUse { port } => {
                write!(f, "Port {} is already in use on the host system", port)
            }
        }
    }
}

/// Result of a validation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// True when no issues were found.
    pub valid: bool,
    /// Every issue, collisions first.
    pub issues: Vec<ValidationIssue>,
    /// Declared host ports and the services publishing them.
    pub port_map: BTreeMap<u16, Vec<String>>,
}

impl ValidationReport {
    /// Returns the issues as operator-facing messages.
    pub fn messages(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }
}

/// Builds the host port to services map. Templated and unparsable ports are
/// skipped.
pub fn port_map(manifest: &Manifest) -> BTreeMap<u16, Vec<String>> {
    let mut map: BTreeMap<u16, Vec<String>> = BTreeMap::new();
    for (name, spec) in manifest.services() {
        for port in spec.ports().iter().filter_map(|p| p.external_port()) {
            let claimants = map.entry(port).or_default();
            if !claimants.contains(&name) {
                claimants.push(name.clone());
            }
        }
    }
    map
}

/// Returns one collision issue per port claimed by more than one service.
pub fn port_collisions(map: &BTreeMap<u16, Vec<String>>) -> Vec<ValidationIssue> {
    map.iter()
        .filter(|(_, services)| services.len() > 1)
        .map(|(port, services)| ValidationIssue::PortCollision {
            port: *port,
            services: services.clone(),
        })
        .collect()
}

/// Returns true if something accepts a TCP connection on `host:port`.
///
/// Refusal, timeout and any other error count as free.
pub async fn port_in_use(host: &str, port: u16, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!(host = %host, port, error = %e, "Port probe failed, treating as free");
            false
        }
        Err(_) => false,
    }
}

/// Checks the manifest for port problems.
#[derive(Debug, Clone)]
pub struct ConfigValidator {
    config: ValidationConfig,
}

impl ConfigValidator {
    /// Creates a validator.
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validates an in-memory manifest.
    pub async fn validate(&self, manifest: &Manifest) -> ValidationReport {
        let port_map = port_map(manifest);
        let mut issues = port_collisions(&port_map);

        if self.config.probe_host_ports {
            let host = self.config.probe_host.as_str();
            let timeout = self.config.probe_timeout();
            let probes = port_map.keys().map(|&port| async move {
                (port, port_in_use(host, port, timeout).await)
            });
            issues.extend(
                join_all(probes)
                    .await
                    .into_iter()
                    .filter(|(_, in_use)| *in_use)
                    .map(|(port, _)| ValidationIssue::PortInUse { port }),
            );
        }

        info!(ports = port_map.len(), issues = issues.len(), "Validated manifest");
        ValidationReport {
            valid: issues.is_empty(),
            issues,
            port_map,
        }
    }

    /// Loads the manifest from `store` and validates it.
    pub async fn validate_store(&self, store: &ManifestStore) -> Result<ValidationReport> {
        let manifest = store.load().await?;
        Ok(self.validate(&manifest).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn offline() -> ConfigValidator {
        ConfigValidator::new(ValidationConfig {
            probe_host_ports: false,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_collision_names_both_services() {
        let manifest = Manifest::from_yaml_str(
            r#"
services:
  kafka1:
    ports: ["9092:9092"]
  kafka2:
    ports: ["9092:9092", "9093:9092"]
  kafka-ui:
    ports: ["8080:8080"]
"#,
        )
        .unwrap();

        let report = offline().validate(&manifest).await;
        assert!(!report.valid);
        assert_eq!(
            report.issues,
            vec![ValidationIssue::PortCollision {
                port: 9092,
                services: vec!["kafka1".to_string(), "kafka2".to_string()],
            }]
        );
        assert_eq!(
            report.messages(),
            vec!["Port 9092 is used by multiple services: kafka1, kafka2"]
        );
        assert_eq!(report.port_map.len(), 3);
    }

    #[tokio::test]
    async fn test_templated_ports_ignored() {
        let manifest = Manifest::from_yaml_str(
            r#"
services:
  kafka1:
    ports: ["${KAFKA_PORT}:9092"]
  kafka2:
    ports: ["${KAFKA_PORT}:9092"]
"#,
        )
        .unwrap();

        let report = offline().validate(&manifest).await;
        assert!(report.valid);
        assert!(report.port_map.is_empty());
    }

    #[tokio::test]
    async fn test_probe_detects_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let timeout = Duration::from_millis(500);

        assert!(port_in_use("127.0.0.1", port, timeout).await);
        drop(listener);
        assert!(!port_in_use("no-such-host.invalid", port, timeout).await);
    }

    #[tokio::test]
    async fn test_validate_reports_busy_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let manifest =
            Manifest::from_yaml_str(&format!("services:\n  kafka1:\n    ports: [\"{}:9092\"]\n", port))
                .unwrap();

        let validator = ConfigValidator::new(ValidationConfig {
            probe_host_ports: true,
            probe_host: "127.0.0.1".to_string(),
            probe_timeout_ms: 500,
        });
        let report = validator.validate(&manifest).await;

        assert!(!report.valid);
        assert_eq!(report.issues, vec![ValidationIssue::PortInUse { port }]);
    }
}
