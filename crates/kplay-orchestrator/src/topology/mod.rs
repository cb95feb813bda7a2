//! Cluster and broker topology derived from the manifest.
//!
//! Nothing here performs I/O: every query takes a [`Manifest`](crate::manifest::Manifest)
//! snapshot and answers from service names and port entries alone.

mod naming;
mod ports;
mod resolver;

pub use naming::{BrokerRef, ClusterId, NamingConvention, ServiceClass, VolumeRef};
pub use ports::PortAllocator;
pub use resolver::{next_broker_id, ClusterSummary, TopologyResolver};
