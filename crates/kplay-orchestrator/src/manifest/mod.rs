//! The declarative compose manifest and its on-disk store.

mod model;
mod store;

pub use model::{HostPort, Manifest, PortBinding, ServiceSpec, VolumeMount, VolumeSpec};
pub use store::ManifestStore;
