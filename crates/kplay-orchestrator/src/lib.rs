//! Cluster and broker topology manager for a containerized Kafka playground.
//!
//! The playground is described by a single compose manifest. This crate
//! treats that manifest as the desired state: every topology change is
//! written to it first, then the container runtime is asked to catch up.
//!
//! # Overview
//!
//! - **Clusters and brokers** are derived from service names: `kafka{N}`
//!   belongs to the default cluster, `kafka-{cluster}-{N}` to a named one.
//! - **Adding a broker** clones a template broker, gives it the next id and a
//!   free host port, and wires it to the coordination service.
//! - **Deleting** removes containers, manifest entries and volumes, tolerating
//!   anything that is already gone.
//! - **Reset** trims the manifest back to its baseline and rebuilds the
//!   runtime in the background. Topology changes are rejected until it ends.
//!
//! # Architecture
//!
//! - [`manifest`]: the compose document model and its same-inode store
//! - [`topology`]: naming rules, cluster resolution and port allocation
//! - [`provision`]: new broker service blocks built from a template
//! - [`runtime`]: Docker and compose adapters behind two traits
//! - [`reconcile`]: the multi-step procedures and the background reset
//! - [`status`], [`validate`]: read-only queries
//! - [`admin`]: the broker admin protocol boundary and topic operations
//! - [`api`]: the operator response envelope
//!
//! # Example
//!
//! ```ignore
//! use kplay_orchestrator::{PlaygroundConfig, TopologyManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PlaygroundConfig::builder()
//!         .manifest_path("/app/docker-compose.yml")
//!         .build();
//!     let manager = TopologyManager::connect(config).await?;
//!
//!     let broker = manager.create_cluster("teamA").await?;
//!     println!("{} listening on {:?}", broker.broker_name, broker.port);
//!
//!     let reset = manager.reset()?;
//!     let report = reset.wait().await?;
//!     assert!(report.is_clean());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod admin;
pub mod api;
pub mod config;
pub mod container;
pub mod error;
pub mod manifest;
pub mod provision;
pub mod reconcile;
pub mod runtime;
pub mod status;
pub mod topology;
pub mod validate;

// Re-export commonly used types at the crate root
pub use admin::{AdminConnector, BrokerAdmin, DisconnectedAdmin, NewTopic, TopicInfo, TopicService};
pub use api::{ApiResponse, ResetAck};
pub use config::PlaygroundConfig;
pub use container::{ContainerInfo, ContainerState};
pub use error::{PlaygroundError, Result};
pub use manifest::{Manifest, ManifestStore};
pub use reconcile::{BrokerDescriptor, RemovalReport, ResetHandle, ResetPhase, ResetReport, TopologyManager};
pub use runtime::{ComposeCli, ContainerRuntime, DockerRuntime, ManifestApplier, SimulatedRuntime};
pub use status::{ClusterOverview, ClusterStatus, StatusAggregator};
pub use topology::{ClusterId, TopologyResolver};
pub use validate::{ConfigValidator, ValidationIssue, ValidationReport};
