//! Broker admin protocol boundary.
//!
//! Topic administration talks to the brokers themselves rather than to the
//! container runtime. No wire client ships with this crate: callers plug one
//! in through [`AdminConnector`], and [`DisconnectedAdmin`] stands in when
//! none is configured so that status queries still work (with a zero topic
//! count).

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PlaygroundError, Result};
use crate::manifest::ManifestStore;
use crate::topology::{ClusterId, TopologyResolver};

/// Topics whose names start with this prefix are broker-internal.
pub const INTERNAL_TOPIC_PREFIX: char = '_';

/// Returns true for broker-internal topics such as `__consumer_offsets`.
pub fn is_internal_topic(name: &str) -> bool {
    name.starts_with(INTERNAL_TOPIC_PREFIX)
}

/// A topic to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTopic {
    /// Topic name.
    pub name: String,
    /// Partition count.
    #[serde(default = "default_partitions")]
    pub partitions: u32,
    /// Replication factor.
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u16,
}

fn default_partitions() -> u32 {
    3
}

fn default_replication_factor() -> u16 {
    1
}

impl NewTopic {
    /// Creates a topic request with the default partition count and replication.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partitions: default_partitions(),
            replication_factor: default_replication_factor(),
        }
    }

    /// Sets the partition count.
    pub fn with_partitions(mut self, partitions: u32) -> Self {
        self.partitions = partitions;
        self
    }

    /// Sets the replication factor.
    pub fn with_replication_factor(mut self, factor: u16) -> Self {
        self.replication_factor = factor;
        self
    }

    /// Rejects requests the brokers would refuse anyway.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(PlaygroundError::validation("topic name is empty"));
        }
        if self.partitions == 0 {
            return Err(PlaygroundError::validation("partitions must be at least 1"));
        }
        if self.replication_factor == 0 {
            return Err(PlaygroundError::validation(
                "replication factor must be at least 1",
            ));
        }
        Ok(())
    }
}

/// A user topic with its partition count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicInfo {
    /// Topic name.
    pub name: String,
    /// Number of partitions.
    pub partitions: usize,
}

/// An open admin session with one cluster.
#[async_trait]
pub trait BrokerAdmin: Send + Sync {
    /// Lists every topic, internal ones included.
    async fn list_topics(&self) -> Result<Vec<String>>;

    /// Creates a topic.
    async fn create_topic(&self, topic: &NewTopic) -> Result<()>;

    /// Deletes a topic.
    async fn delete_topic(&self, name: &str) -> Result<()>;

    /// Returns the partition ids of a topic.
    async fn partitions_for(&self, topic: &str) -> Result<Vec<i32>>;
}

/// Opens admin sessions.
#[async_trait]
pub trait AdminConnector: Send + Sync {
    /// Connects to `cluster` through `bootstrap` (`host:port` entries).
    async fn connect(&self, cluster: &ClusterId, bootstrap: &[String]) -> Result<Box<dyn BrokerAdmin>>;
}

/// Connector used when no broker client is configured; every connect fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisconnectedAdmin;

#[async_trait]
impl AdminConnector for DisconnectedAdmin {
    async fn connect(&self, cluster: &ClusterId, _bootstrap: &[String]) -> Result<Box<dyn BrokerAdmin>> {
        Err(PlaygroundError::admin_unavailable(format!(
            "no broker admin client configured for cluster {}",
            cluster
        )))
    }
}

/// Topic operations scoped to a cluster.
pub struct TopicService {
    store: Arc<ManifestStore>,
    resolver: TopologyResolver,
    connector: Arc<dyn AdminConnector>,
}

impl TopicService {
    /// Creates a topic service.
    pub fn new(
        store: Arc<ManifestStore>,
        resolver: TopologyResolver,
        connector: Arc<dyn AdminConnector>,
    ) -> Self {
        Self {
            store,
            resolver,
            connector,
        }
    }

    async fn session(&self, cluster: &str) -> Result<Box<dyn BrokerAdmin>> {
        let cluster = ClusterId::parse(cluster)?;
        let bootstrap = self
            .store
            .read(|m| self.resolver.bootstrap_servers(m, &cluster))
            .await?;
        if bootstrap.is_empty() {
            return Err(PlaygroundError::admin_unavailable(format!(
                "cluster {} has no bootstrap servers",
                cluster
            )));
        }
        debug!(cluster = %cluster, bootstrap = ?bootstrap, "Opening admin session");
        self.connector.connect(&cluster, &bootstrap).await
    }

    /// Lists user topics with their partition counts.
    pub async fn list_topics(&self, cluster: &str) -> Result<Vec<TopicInfo>> {
        let admin = self.session(cluster).await?;
        let mut topics = Vec::new();
        for name in admin.list_topics().await? {
            if is_internal_topic(&name) {
                continue;
            }
            let partitions = admin.partitions_for(&name).await?.len();
            topics.push(TopicInfo { name, partitions });
        }
        Ok(topics)
    }

    /// Creates a topic.
    pub async fn create_topic(&self, cluster: &str, topic: &NewTopic) -> Result<()> {
        topic.validate()?;
        self.session(cluster).await?.create_topic(topic).await?;
        info!(cluster = %cluster, topic = %topic.name, partitions = topic.partitions, "Created topic");
        Ok(())
    }

    /// Deletes a topic.
    pub async fn delete_topic(&self, cluster: &str, name: &str) -> Result<()> {
        self.session(cluster).await?.delete_topic(name).await?;
        info!(cluster = %cluster, topic = %name, "Deleted topic");
        Ok(())
    }
}
