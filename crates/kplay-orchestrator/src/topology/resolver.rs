//! Derives the cluster/broker view from a manifest.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::TopologyConfig;
use crate::error::{PlaygroundError, Result};
use crate::manifest::Manifest;
use crate::topology::naming::{BrokerRef, ClusterId, NamingConvention, ServiceClass};

const INTERNAL_LISTENER_SCHEME: &str = "PLAINTEXT://";

/// A cluster as declared in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSummary {
    /// Cluster id.
    pub id: ClusterId,
    /// Broker service names in manifest order.
    pub brokers: Vec<String>,
}

impl ClusterSummary {
    /// Number of declared brokers.
    pub fn broker_count(&self) -> usize {
        self.brokers.len()
    }
}

/// Pure queries over a manifest snapshot.
#[derive(Debug, Clone)]
pub struct TopologyResolver {
    naming: NamingConvention,
    default_bootstrap: Vec<String>,
}

impl TopologyResolver {
    /// Creates a resolver with explicit settings.
    pub fn new(naming: NamingConvention, default_bootstrap: Vec<String>) -> Self {
        Self {
            naming,
            default_bootstrap,
        }
    }

    /// Creates a resolver from topology settings.
    pub fn from_config(config: &TopologyConfig) -> Result<Self> {
        Ok(Self::new(
            NamingConvention::from_config(config)?,
            config.default_bootstrap_servers.clone(),
        ))
    }

    /// Returns the naming convention.
    pub fn naming(&self) -> &NamingConvention {
        &self.naming
    }

    /// Lists the well-formed brokers of `cluster` in manifest order.
    ///
    /// Names that match the cluster's pattern without parsing are skipped
    /// with a warning.
    pub fn list_brokers(&self, manifest: &Manifest, cluster: &ClusterId) -> Vec<BrokerRef> {
        manifest
            .services()
            .filter_map(|(name, spec)| match self.naming.classify(&name) {
                ServiceClass::Broker {
                    cluster: owner,
                    broker_id,
                } if owner == *cluster => Some(BrokerRef {
                    external_port: spec.ports().first().and_then(|p| p.external_port()),
                    service_name: name,
                    cluster: owner,
                    broker_id,
                }),
                ServiceClass::MalformedBroker {
                    cluster: owner,
                    reason,
                } if owner == *cluster => {
                    warn!(service = %name, cluster = %owner, reason = %reason, "Ignoring malformed broker name");
                    None
                }
                _ => None,
            })
            .collect()
    }

    /// Returns every service in `cluster`'s namespace, malformed names included.
    pub fn cluster_services(&self, manifest: &Manifest, cluster: &ClusterId) -> Vec<String> {
        manifest
            .service_names()
            .into_iter()
            .filter(|name| self.naming.classify(name).cluster() == Some(cluster))
            .collect()
    }

    /// Lists clusters: default first, then named clusters by first appearance.
    ///
    /// The default cluster is always listed, even with no brokers.
    pub fn list_clusters(&self, manifest: &Manifest) -> Vec<ClusterSummary> {
        let mut clusters = vec![ClusterSummary {
            id: self.naming.default_cluster().clone(),
            brokers: Vec::new(),
        }];

        for name in manifest.service_names() {
            let ServiceClass::Broker { cluster, .. } = self.naming.classify(&name) else {
                continue;
            };
            match clusters.iter_mut().find(|c| c.id == cluster) {
                Some(summary) => summary.brokers.push(name),
                None => clusters.push(ClusterSummary {
                    id: cluster,
                    brokers: vec![name],
                }),
            }
        }

        clusters
    }

    /// Returns the internal bootstrap addresses of `cluster`.
    ///
    /// Taken from each broker's `PLAINTEXT://` advertised listener. An empty
    /// default cluster falls back to the configured list.
    pub fn bootstrap_servers(&self, manifest: &Manifest, cluster: &ClusterId) -> Vec<String> {
        let servers: Vec<String> = self
            .list_brokers(manifest, cluster)
            .iter()
            .filter_map(|broker| manifest.service(&broker.service_name))
            .filter_map(|spec| spec.env("KAFKA_ADVERTISED_LISTENERS"))
            .filter_map(|listeners| {
                listeners
                    .split(',')
                    .map(str::trim)
                    .find_map(|l| l.strip_prefix(INTERNAL_LISTENER_SCHEME).map(str::to_string))
            })
            .collect();

        if servers.is_empty() && self.naming.is_default(cluster) {
            self.default_bootstrap.clone()
        } else {
            servers
        }
    }
}

/// Returns the next broker id: one past the highest, or 1.
///
/// Fails when the highest id is already `u32::MAX`, so a new broker never
/// takes an existing broker's name.
pub fn next_broker_id(brokers: &[BrokerRef]) -> Result<u32> {
    match brokers.iter().map(|b| b.broker_id).max() {
        None => Ok(1),
        Some(max) => max.checked_add(1).ok_or_else(|| {
            PlaygroundError::validation(format!("broker id {} is the largest allowed", max))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
services:
  zookeeper:
    image: zk
  kafka1:
    ports: ["9092:9092"]
    environment:
      KAFKA_ADVERTISED_LISTENERS: PLAINTEXT://kafka1:29092,PLAINTEXT_HOST://localhost:9092
  kafka-teamB-1:
    ports: ["9096:9092"]
  kafkaconnect:
    image: connect
  kafka2:
    ports: ["${K2_PORT}:9092"]
  kafka-teamA-2:
    ports: ["9095:9092"]
    environment:
      KAFKA_ADVERTISED_LISTENERS: PLAINTEXT://kafka-teamA-2:29092,PLAINTEXT_HOST://localhost:9095
  kafka-ui:
    image: ui
  kafka-teamA-5:
    ports: ["9097:9092"]
"#;

    fn resolver() -> TopologyResolver {
        TopologyResolver::from_config(&TopologyConfig::default()).unwrap()
    }

    fn team(name: &str) -> ClusterId {
        ClusterId::parse(name).unwrap()
    }

    #[test]
    fn test_list_brokers_default() {
        let manifest = Manifest::from_yaml_str(MANIFEST).unwrap();
        let brokers = resolver().list_brokers(&manifest, &ClusterId::default_cluster());

        let names: Vec<_> = brokers.iter().map(|b| b.service_name.as_str()).collect();
        assert_eq!(names, vec!["kafka1", "kafka2"]);
        assert_eq!(brokers[0].external_port, Some(9092));
        assert_eq!(brokers[1].external_port, None);
    }

    #[test]
    fn test_list_brokers_named() {
        let manifest = Manifest::from_yaml_str(MANIFEST).unwrap();
        let brokers = resolver().list_brokers(&manifest, &team("teamA"));
        let ids: Vec<_> = brokers.iter().map(|b| b.broker_id).collect();
        assert_eq!(ids, vec![2, 5]);
        assert_eq!(next_broker_id(&brokers).unwrap(), 6);
    }

    #[test]
    fn test_next_broker_id_empty() {
        assert_eq!(next_broker_id(&[]).unwrap(), 1);
    }

    #[test]
    fn test_next_broker_id_at_limit() {
        let manifest = Manifest::from_yaml_str("services:\n  kafka4294967295: {}\n").unwrap();
        let brokers = resolver().list_brokers(&manifest, &ClusterId::default_cluster());
        assert_eq!(brokers[0].broker_id, u32::MAX);

        let err = next_broker_id(&brokers).unwrap_err();
        assert!(matches!(err, PlaygroundError::Validation(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_list_clusters_order() {
        let manifest = Manifest::from_yaml_str(MANIFEST).unwrap();
        let clusters = resolver().list_clusters(&manifest);

        let ids: Vec<_> = clusters.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["default", "teamB", "teamA"]);
        assert_eq!(clusters[0].broker_count(), 2);
        assert_eq!(clusters[2].broker_count(), 2);
    }

    #[test]
    fn test_default_cluster_always_listed() {
        let manifest = Manifest::from_yaml_str("services:\n  zookeeper:\n    image: zk\n").unwrap();
        let clusters = resolver().list_clusters(&manifest);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].broker_count(), 0);
    }

    #[test]
    fn test_bootstrap_servers() {
        let manifest = Manifest::from_yaml_str(MANIFEST).unwrap();
        let resolver = resolver();

        assert_eq!(
            resolver.bootstrap_servers(&manifest, &team("teamA")),
            vec!["kafka-teamA-2:29092"]
        );
        assert!(resolver.bootstrap_servers(&manifest, &team("teamB")).is_empty());

        let empty = Manifest::new();
        assert_eq!(
            resolver.bootstrap_servers(&empty, &ClusterId::default_cluster()),
            vec!["kafka1:29092", "kafka2:29093", "kafka3:29094"]
        );
    }

    #[test]
    fn test_cluster_services_include_malformed() {
        let manifest = Manifest::from_yaml_str(
            "services:\n  kafka-teamA-1: {}\n  kafka-teamA-x: {}\n  kafka-teamB-1: {}\n",
        )
        .unwrap();
        let services = resolver().cluster_services(&manifest, &team("teamA"));
        assert_eq!(services, vec!["kafka-teamA-1", "kafka-teamA-x"]);
    }
}
