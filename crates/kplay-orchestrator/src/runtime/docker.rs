//! Docker Engine API runtime.
//!
//! Talks to the local Docker daemon through bollard. Every call is bounded by
//! the configured API timeout, and 404 responses come back as the crate's
//! not-found variants.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    InspectContainerOptions, KillContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::network::PruneNetworksOptions;
use bollard::volume::{ListVolumesOptions, RemoveVolumeOptions};
use bollard::Docker;
use tracing::{debug, info};

use crate::config::RuntimeConfig;
use crate::container::{ContainerInfo, ContainerState, VolumeInfo};
use crate::error::{PlaygroundError, Result};
use crate::runtime::ContainerRuntime;

/// Container runtime backed by the Docker daemon.
pub struct DockerRuntime {
    docker: Docker,
    api_timeout: Duration,
    stop_timeout_secs: i64,
}

impl DockerRuntime {
    /// Connects to the local daemon and verifies it answers.
    pub async fn connect(config: &RuntimeConfig) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        let runtime = Self::with_client(docker, config);
        runtime.ping().await?;

        info!("Connected to Docker daemon");
        Ok(runtime)
    }

    /// Wraps an existing client without checking connectivity.
    pub fn with_client(docker: Docker, config: &RuntimeConfig) -> Self {
        Self {
            docker,
            api_timeout: config.api_timeout(),
            stop_timeout_secs: config.stop_timeout_secs,
        }
    }

    async fn bounded<T, F>(&self, operation: String, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, bollard::errors::Error>>,
    {
        match tokio::time::timeout(self.api_timeout, call).await {
            Ok(result) => result.map_err(PlaygroundError::from),
            Err(_) => Err(PlaygroundError::timeout(operation)),
        }
    }
}

/// Maps a Docker 404 onto `missing`, and 304 (already in the requested state) onto success.
fn settle(result: Result<()>, missing: impl FnOnce() -> PlaygroundError) -> Result<()> {
    match result {
        Err(PlaygroundError::DockerApi(bollard::errors::Error::DockerResponseServerError {
            status_code: 304,
            ..
        })) => Ok(()),
        Err(e) if e.is_not_found() => Err(missing()),
        other => other,
    }
}

fn not_found<T>(result: Result<T>, missing: impl FnOnce() -> PlaygroundError) -> Result<T> {
    result.map_err(|e| if e.is_not_found() { missing() } else { e })
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &str {
        "docker"
    }

    async fn ping(&self) -> Result<()> {
        let _ = self.bounded("docker ping".to_string(), self.docker.ping()).await?;
        Ok(())
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerInfo>> {
        let options = ListContainersOptions::<String> {
            all,
            ..Default::default()
        };
        let summaries = self
            .bounded(
                "list containers".to_string(),
                self.docker.list_containers(Some(options)),
            )
            .await?;

        let containers = summaries
            .into_iter()
            .filter_map(|summary| {
                let name = summary
                    .names
                    .as_ref()
                    .and_then(|names| names.first())
                    .map(|n| n.trim_start_matches('/').to_string())?;
                let state = ContainerState::parse(summary.state.as_deref().unwrap_or_default());
                Some(ContainerInfo {
                    name,
                    id: summary.id.unwrap_or_default(),
                    status: summary.status.unwrap_or_else(|| state.as_str().to_string()),
                    state,
                })
            })
            .collect::<Vec<_>>();

        debug!(count = containers.len(), all, "Listed containers");
        Ok(containers)
    }

    async fn inspect_container(&self, name: &str) -> Result<ContainerInfo> {
        let response = not_found(
            self.bounded(
                format!("inspect container {}", name),
                self.docker
                    .inspect_container(name, None::<InspectContainerOptions>),
            )
            .await,
            || PlaygroundError::container_not_found(name),
        )?;

        let state = response
            .state
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .map(|status| ContainerState::parse(&status.to_string()))
            .unwrap_or_else(|| ContainerState::Unknown("unknown".to_string()));

        Ok(ContainerInfo {
            name: response
                .name
                .as_deref()
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_else(|| name.to_string()),
            id: response.id.unwrap_or_default(),
            status: state.as_str().to_string(),
            state,
        })
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        let result = self
            .bounded(
                format!("start container {}", name),
                self.docker
                    .start_container(name, None::<StartContainerOptions<String>>),
            )
            .await;
        settle(result, || PlaygroundError::container_not_found(name))?;

        info!(container = %name, "Started container");
        Ok(())
    }

    async fn stop_container(&self, name: &str) -> Result<()> {
        let options = StopContainerOptions {
            t: self.stop_timeout_secs,
        };
        // The daemon itself waits up to `t` seconds before killing.
        let call = self.docker.stop_container(name, Some(options));
        let grace = Duration::from_secs(self.stop_timeout_secs.max(0).unsigned_abs());
        let result = match tokio::time::timeout(self.api_timeout + grace, call).await {
            Ok(result) => result.map_err(PlaygroundError::from),
            Err(_) => Err(PlaygroundError::timeout(format!("stop container {}", name))),
        };
        settle(result, || PlaygroundError::container_not_found(name))?;

        info!(container = %name, "Stopped container");
        Ok(())
    }

    async fn kill_container(&self, name: &str) -> Result<()> {
        let options = KillContainerOptions { signal: "SIGKILL" };
        let result = self
            .bounded(
                format!("kill container {}", name),
                self.docker.kill_container(name, Some(options)),
            )
            .await;
        settle(result, || PlaygroundError::container_not_found(name))?;

        info!(container = %name, "Killed container");
        Ok(())
    }

    async fn remove_container(&self, name: &str, force: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        let result = self
            .bounded(
                format!("remove container {}", name),
                self.docker.remove_container(name, Some(options)),
            )
            .await;
        settle(result, || PlaygroundError::container_not_found(name))?;

        info!(container = %name, "Removed container");
        Ok(())
    }

    async fn list_volumes(&self) -> Result<Vec<VolumeInfo>> {
        let response = self
            .bounded(
                "list volumes".to_string(),
                self.docker.list_volumes(None::<ListVolumesOptions<String>>),
            )
            .await?;

        Ok(response
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(|v| VolumeInfo::new(v.name))
            .collect())
    }

    async fn inspect_volume(&self, name: &str) -> Result<VolumeInfo> {
        let volume = not_found(
            self.bounded(
                format!("inspect volume {}", name),
                self.docker.inspect_volume(name),
            )
            .await,
            || PlaygroundError::volume_not_found(name),
        )?;
        Ok(VolumeInfo::new(volume.name))
    }

    async fn remove_volume(&self, name: &str, force: bool) -> Result<()> {
        let options = RemoveVolumeOptions { force };
        let result = self
            .bounded(
                format!("remove volume {}", name),
                self.docker.remove_volume(name, Some(options)),
            )
            .await;
        settle(result, || PlaygroundError::volume_not_found(name))?;

        info!(volume = %name, "Removed volume");
        Ok(())
    }

    async fn prune_networks(&self) -> Result<Vec<String>> {
        let response = self
            .bounded(
                "prune networks".to_string(),
                self.docker
                    .prune_networks(None::<PruneNetworksOptions<String>>),
            )
            .await?;

        let deleted = response.networks_deleted.unwrap_or_default();
        info!(count = deleted.len(), "Pruned networks");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docker_error(status_code: u16) -> PlaygroundError {
        PlaygroundError::DockerApi(bollard::errors::Error::DockerResponseServerError {
            status_code,
            message: "test".to_string(),
        })
    }

    #[test]
    fn test_settle_maps_not_found() {
        let err = settle(Err(docker_error(404)), || {
            PlaygroundError::container_not_found("kafka4")
        })
        .unwrap_err();
        assert!(matches!(err, PlaygroundError::ContainerNotFound(name) if name == "kafka4"));
    }

    #[test]
    fn test_settle_accepts_not_modified() {
        assert!(settle(Err(docker_error(304)), || PlaygroundError::container_not_found("x")).is_ok());
    }

    #[test]
    fn test_settle_keeps_other_errors() {
        let err = settle(Err(docker_error(500)), || PlaygroundError::container_not_found("x"))
            .unwrap_err();
        assert!(matches!(err, PlaygroundError::DockerApi(_)));
    }
}
