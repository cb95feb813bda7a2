//! Container runtime and manifest applier traits.

use async_trait::async_trait;

use crate::container::{ContainerInfo, VolumeInfo};
use crate::error::Result;

/// Direct operations against the container runtime.
///
/// Each call addresses one container or volume by name. Missing targets are
/// reported as `ContainerNotFound` / `VolumeNotFound`; callers decide whether
/// that is an error. See [`ignore_not_found`](crate::runtime::ignore_not_found).
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; procedures share one runtime
/// through an `Arc`.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Returns the name of this runtime.
    fn name(&self) -> &str;

    /// Checks that the runtime is reachable.
    async fn ping(&self) -> Result<()>;

    /// Lists containers; stopped ones only when `all` is set.
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerInfo>>;

    /// Returns the current record of one container.
    async fn inspect_container(&self, name: &str) -> Result<ContainerInfo>;

    /// Starts a container.
    async fn start_container(&self, name: &str) -> Result<()>;

    /// Stops a container gracefully.
    async fn stop_container(&self, name: &str) -> Result<()>;

    /// Kills a container.
    async fn kill_container(&self, name: &str) -> Result<()>;

    /// Removes a container.
    async fn remove_container(&self, name: &str, force: bool) -> Result<()>;

    /// Lists volumes.
    async fn list_volumes(&self) -> Result<Vec<VolumeInfo>>;

    /// Returns one volume.
    async fn inspect_volume(&self, name: &str) -> Result<VolumeInfo>;

    /// Removes a volume.
    async fn remove_volume(&self, name: &str, force: bool) -> Result<()>;

    /// Removes unused networks, returning their names.
    async fn prune_networks(&self) -> Result<Vec<String>>;
}

/// Makes the runtime match the manifest.
///
/// Implemented by the compose CLI; the manifest file is the input.
#[async_trait]
pub trait ManifestApplier: Send + Sync {
    /// Creates or updates `services` (every service when empty) and starts them.
    async fn up(&self, services: &[String], remove_orphans: bool) -> Result<()>;

    /// Stops and removes everything the manifest declares.
    async fn down(&self, remove_volumes: bool, remove_orphans: bool) -> Result<()>;
}
