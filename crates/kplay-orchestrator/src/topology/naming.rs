//! Service naming rules.
//!
//! Broker membership is encoded entirely in service names:
//!
//! | Cluster | Broker service | Data volume |
//! |---------|----------------|-------------|
//! | default | `kafka{N}` | `kafka{N}-data` |
//! | `C` | `kafka-{C}-{N}` | `kafka-{C}-{N}-data` |
//!
//! [`NamingConvention::classify`] is the single parser for these names; all
//! other modules go through it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{ProjectConfig, TopologyConfig};
use crate::error::{PlaygroundError, Result};

/// Identifier of a broker cluster.
///
/// Always non-empty and ASCII alphanumeric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClusterId(String);

impl ClusterId {
    /// Name of the built-in cluster.
    pub const DEFAULT: &'static str = "default";

    /// Validates and wraps a cluster name.
    pub fn parse(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(PlaygroundError::invalid_name(name, "cluster name is empty"));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(PlaygroundError::invalid_name(
                name,
                "cluster name must be alphanumeric",
            ));
        }
        Ok(Self(name.to_string()))
    }

    /// Returns the built-in default cluster id.
    pub fn default_cluster() -> Self {
        Self(Self::DEFAULT.to_string())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ClusterId {
    type Error = PlaygroundError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ClusterId> for String {
    fn from(id: ClusterId) -> Self {
        id.0
    }
}

impl std::str::FromStr for ClusterId {
    type Err = PlaygroundError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// What a service name denotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceClass {
    /// A well-formed broker.
    Broker {
        /// Owning cluster.
        cluster: ClusterId,
        /// Numeric broker id.
        broker_id: u32,
    },
    /// Looks like a broker of `cluster` but the name does not parse.
    MalformedBroker {
        /// Cluster whose naming pattern matched.
        cluster: ClusterId,
        /// What was wrong with the name.
        reason: String,
    },
    /// Anything else.
    Other,
}

impl ServiceClass {
    /// Returns true for well-formed brokers.
    pub fn is_broker(&self) -> bool {
        matches!(self, Self::Broker { .. })
    }

    /// Returns the cluster the name belongs to, malformed or not.
    pub fn cluster(&self) -> Option<&ClusterId> {
        match self {
            Self::Broker { cluster, .. } | Self::MalformedBroker { cluster, .. } => Some(cluster),
            Self::Other => None,
        }
    }
}

/// A broker service as resolved from the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerRef {
    /// Service (and container) name.
    pub service_name: String,
    /// Owning cluster.
    pub cluster: ClusterId,
    /// Numeric broker id.
    pub broker_id: u32,
    /// Host port of the first port entry, if it is a literal.
    pub external_port: Option<u16>,
}

/// The data volume owned by a broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRef {
    /// Key in the manifest's `volumes` section.
    pub manifest_name: String,
    /// Name of the volume in the container runtime.
    pub materialized_name: String,
}

impl VolumeRef {
    /// Returns the data volume of `service`.
    pub fn for_service(service: &str, project: &ProjectConfig) -> Self {
        let manifest_name = format!("{}-data", service);
        Self {
            materialized_name: project.materialized_volume(&manifest_name),
            manifest_name,
        }
    }
}

/// Naming rules for brokers and their clusters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingConvention {
    broker_prefix: String,
    ui_service: String,
    default_cluster: ClusterId,
}

impl Default for NamingConvention {
    fn default() -> Self {
        Self {
            broker_prefix: "kafka".to_string(),
            ui_service: "kafka-ui".to_string(),
            default_cluster: ClusterId::default_cluster(),
        }
    }
}

impl NamingConvention {
    /// Builds the convention from topology settings.
    pub fn from_config(config: &TopologyConfig) -> Result<Self> {
        Ok(Self {
            broker_prefix: config.broker_prefix.clone(),
            ui_service: config.ui_service.clone(),
            default_cluster: ClusterId::parse(&config.default_cluster_id)?,
        })
    }

    /// Returns the default cluster id.
    pub fn default_cluster(&self) -> &ClusterId {
        &self.default_cluster
    }

    /// Returns true if `cluster` is the default cluster.
    pub fn is_default(&self, cluster: &ClusterId) -> bool {
        *cluster == self.default_cluster
    }

    /// Returns the service name of broker `broker_id` in `cluster`.
    pub fn broker_name(&self, cluster: &ClusterId, broker_id: u32) -> String {
        if self.is_default(cluster) {
            format!("{}{}", self.broker_prefix, broker_id)
        } else {
            format!("{}-{}-{}", self.broker_prefix, cluster, broker_id)
        }
    }

    /// Turns an operator-supplied broker selector into a service name.
    ///
    /// A bare number selects that broker of the default cluster.
    pub fn resolve_selector(&self, selector: &str) -> String {
        match selector.parse::<u32>() {
            Ok(id) if !selector.is_empty() && selector.chars().all(|c| c.is_ascii_digit()) => {
                self.broker_name(&self.default_cluster, id)
            }
            _ => selector.to_string(),
        }
    }

    /// Classifies a service name.
    pub fn classify(&self, name: &str) -> ServiceClass {
        if name == self.ui_service {
            return ServiceClass::Other;
        }
        let Some(rest) = name.strip_prefix(self.broker_prefix.as_str()) else {
            return ServiceClass::Other;
        };

        match rest.strip_prefix('-') {
            Some(scoped) => self.classify_scoped(scoped),
            None => self.classify_default(rest),
        }
    }

    fn classify_default(&self, suffix: &str) -> ServiceClass {
        if suffix.contains('-') {
            return ServiceClass::Other;
        }
        match parse_broker_id(suffix) {
            Some(broker_id) => ServiceClass::Broker {
                cluster: self.default_cluster.clone(),
                broker_id,
            },
            None => ServiceClass::MalformedBroker {
                cluster: self.default_cluster.clone(),
                reason: format!("suffix {:?} is not a broker id", suffix),
            },
        }
    }

    fn classify_scoped(&self, scoped: &str) -> ServiceClass {
        let Some((cluster, id)) = scoped.split_once('-') else {
            return ServiceClass::Other;
        };
        let Ok(cluster) = ClusterId::parse(cluster) else {
            return ServiceClass::Other;
        };

        if self.is_default(&cluster) {
            return ServiceClass::MalformedBroker {
                cluster,
                reason: "default cluster brokers are not hyphenated".to_string(),
            };
        }
        match parse_broker_id(id) {
            Some(broker_id) => ServiceClass::Broker { cluster, broker_id },
            None => ServiceClass::MalformedBroker {
                cluster,
                reason: format!("suffix {:?} is not a broker id", id),
            },
        }
    }
}

fn parse_broker_id(text: &str) -> Option<u32> {
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(name: &str) -> ClusterId {
        ClusterId::parse(name).unwrap()
    }

    #[test]
    fn test_cluster_id_validation() {
        assert!(ClusterId::parse("teamA").is_ok());
        assert!(ClusterId::parse("team2").is_ok());
        assert!(ClusterId::parse("").is_err());
        assert!(ClusterId::parse("team-a").is_err());
        assert!(ClusterId::parse("team a").is_err());
        assert_eq!(
            ClusterId::parse("team_a").unwrap_err().status_code(),
            400
        );
    }

    #[test]
    fn test_classify_default_cluster() {
        let naming = NamingConvention::default();
        assert_eq!(
            naming.classify("kafka3"),
            ServiceClass::Broker {
                cluster: ClusterId::default_cluster(),
                broker_id: 3
            }
        );
        assert_eq!(naming.classify("kafka-ui"), ServiceClass::Other);
        assert_eq!(naming.classify("zookeeper"), ServiceClass::Other);
        assert!(matches!(
            naming.classify("kafkaconnect"),
            ServiceClass::MalformedBroker { .. }
        ));
        assert!(matches!(naming.classify("kafka"), ServiceClass::MalformedBroker { .. }));
    }

    #[test]
    fn test_classify_named_cluster() {
        let naming = NamingConvention::default();
        assert_eq!(
            naming.classify("kafka-teamA-12"),
            ServiceClass::Broker {
                cluster: cluster("teamA"),
                broker_id: 12
            }
        );
        assert!(matches!(
            naming.classify("kafka-teamA-x"),
            ServiceClass::MalformedBroker { .. }
        ));
        assert!(matches!(
            naming.classify("kafka-default-1"),
            ServiceClass::MalformedBroker { .. }
        ));
        assert_eq!(naming.classify("kafka-connect"), ServiceClass::Other);
        assert_eq!(naming.classify("jupyter-kafka"), ServiceClass::Other);
    }

    #[test]
    fn test_broker_name_parses_back() {
        let naming = NamingConvention::default();
        for c in [ClusterId::default_cluster(), cluster("teamA")] {
            let name = naming.broker_name(&c, 7);
            assert_eq!(
                naming.classify(&name),
                ServiceClass::Broker {
                    cluster: c.clone(),
                    broker_id: 7
                }
            );
        }
    }

    #[test]
    fn test_resolve_selector() {
        let naming = NamingConvention::default();
        assert_eq!(naming.resolve_selector("3"), "kafka3");
        assert_eq!(naming.resolve_selector("kafka-teamA-1"), "kafka-teamA-1");
        assert_eq!(naming.resolve_selector("-1"), "-1");
    }

    #[test]
    fn test_volume_ref() {
        let volume = VolumeRef::for_service("kafka-teamA-1", &ProjectConfig::default());
        assert_eq!(volume.manifest_name, "kafka-teamA-1-data");
        assert_eq!(volume.materialized_name, "kafka-playground-kafka-teamA-1-data");
    }
}
