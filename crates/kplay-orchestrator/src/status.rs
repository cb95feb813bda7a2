//! Read-only cluster status queries.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::admin::{is_internal_topic, AdminConnector};
use crate::config::PlaygroundConfig;
use crate::container::ContainerState;
use crate::error::{PlaygroundError, Result};
use crate::manifest::{Manifest, ManifestStore};
use crate::runtime::ContainerRuntime;
use crate::topology::{ClusterId, ServiceClass, TopologyResolver};

/// Status reported for a container that does not exist.
pub const NOT_FOUND: &str = "not_found";

/// State of one container in a status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    /// Runtime state name, or `not_found`.
    pub status: String,
}

impl ContainerStatus {
    fn from_state(state: &ContainerState) -> Self {
        Self {
            status: state.as_str().to_string(),
        }
    }

    fn missing() -> Self {
        Self {
            status: NOT_FOUND.to_string(),
        }
    }
}

/// Live status of one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatus {
    /// Cluster the report is for.
    pub cluster_id: ClusterId,
    /// Coordination service and broker containers by name.
    pub containers: BTreeMap<String, ContainerStatus>,
    /// Number of broker containers, running or not.
    pub broker_count: usize,
    /// Number of user topics, 0 when the brokers cannot be reached.
    pub topic_count: usize,
    /// Comma-separated bootstrap servers.
    pub kafka_servers: String,
}

/// Whether a cluster has anything to connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterHealth {
    /// At least one bootstrap server is known.
    Configured,
    /// No bootstrap servers.
    Unknown,
}

/// One entry of the cluster listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterOverview {
    /// Cluster id.
    pub id: ClusterId,
    /// Display name.
    pub name: String,
    /// Brokers declared in the manifest.
    pub brokers: usize,
    /// Whether the cluster has bootstrap servers.
    pub status: ClusterHealth,
}

/// Combines runtime state, manifest state and the admin boundary.
pub struct StatusAggregator {
    store: Arc<ManifestStore>,
    runtime: Arc<dyn ContainerRuntime>,
    connector: Arc<dyn AdminConnector>,
    resolver: TopologyResolver,
    coordination_service: String,
    admin_timeout: Duration,
}

impl StatusAggregator {
    /// Creates an aggregator.
    pub fn new(
        config: &PlaygroundConfig,
        store: Arc<ManifestStore>,
        runtime: Arc<dyn ContainerRuntime>,
        connector: Arc<dyn AdminConnector>,
    ) -> Result<Self> {
        Ok(Self {
            store,
            runtime,
            connector,
            resolver: TopologyResolver::from_config(&config.topology)?,
            coordination_service: config.topology.coordination_service.clone(),
            admin_timeout: config.runtime.api_timeout(),
        })
    }

    /// Loads the manifest, treating a missing or unreadable one as empty.
    async fn manifest(&self) -> Manifest {
        match self.store.load().await {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(error = %e, "Manifest unavailable for status, assuming empty");
                Manifest::default()
            }
        }
    }

    /// Reports the live status of `cluster`.
    ///
    /// Only a failed container listing fails the query. Everything else
    /// degrades: a missing coordination container reads `not_found` and an
    /// unreachable broker protocol reads as zero topics.
    pub async fn cluster_status(&self, cluster: &str) -> Result<ClusterStatus> {
        let cluster = ClusterId::parse(cluster)?;
        let mut containers = BTreeMap::new();

        let coordination = match self.runtime.inspect_container(&self.coordination_service).await {
            Ok(info) => ContainerStatus::from_state(&info.state),
            Err(e) => {
                if !e.is_not_found() {
                    warn!(container = %self.coordination_service, error = %e, "Failed to inspect coordination service");
                }
                ContainerStatus::missing()
            }
        };
        containers.insert(self.coordination_service.clone(), coordination);

        let mut broker_count = 0;
        for info in self.runtime.list_containers(true).await? {
            if let ServiceClass::Broker { cluster: owner, .. } = self.resolver.naming().classify(&info.name) {
                if owner == cluster {
                    broker_count += 1;
                    containers.insert(info.name.clone(), ContainerStatus::from_state(&info.state));
                }
            }
        }

        let manifest = self.manifest().await;
        let bootstrap = self.resolver.bootstrap_servers(&manifest, &cluster);
        let topic_count = self.topic_count(&cluster, &bootstrap).await;

        Ok(ClusterStatus {
            cluster_id: cluster,
            containers,
            broker_count,
            topic_count,
            kafka_servers: bootstrap.join(","),
        })
    }

    async fn topic_count(&self, cluster: &ClusterId, bootstrap: &[String]) -> usize {
        if bootstrap.is_empty() {
            return 0;
        }
        let count = async {
            let admin = self.connector.connect(cluster, bootstrap).await?;
            let topics = admin.list_topics().await?;
            Ok::<_, PlaygroundError>(topics.iter().filter(|t| !is_internal_topic(t)).count())
        };
        match tokio::time::timeout(self.admin_timeout, count).await {
            Ok(Ok(count)) => count,
            Ok(Err(e)) => {
                debug!(cluster = %cluster, error = %e, "Topic count unavailable");
                0
            }
            Err(_) => {
                warn!(cluster = %cluster, "Topic count timed out");
                0
            }
        }
    }

    /// Lists clusters declared in the manifest, default first.
    pub async fn list_clusters(&self) -> Result<Vec<ClusterOverview>> {
        let manifest = self.store.load().await?;
        let naming = self.resolver.naming();

        Ok(self
            .resolver
            .list_clusters(&manifest)
            .into_iter()
            .map(|summary| {
                let name = if naming.is_default(&summary.id) {
                    "Default Cluster".to_string()
                } else {
                    summary.id.to_string()
                };
                let status = if self.resolver.bootstrap_servers(&manifest, &summary.id).is_empty() {
                    ClusterHealth::Unknown
                } else {
                    ClusterHealth::Configured
                };
                ClusterOverview {
                    brokers: summary.broker_count(),
                    id: summary.id,
                    name,
                    status,
                }
            })
            .collect())
    }
}

impl std::fmt::Debug for StatusAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusAggregator")
            .field("store", &self.store)
            .field("runtime", &self.runtime.name())
            .field("coordination_service", &self.coordination_service)
            .finish()
    }
}
