//! In-memory runtime for tests and dry runs.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::ProjectConfig;
use crate::container::{ContainerInfo, ContainerState, VolumeInfo};
use crate::error::{PlaygroundError, Result};
use crate::manifest::{Manifest, ManifestStore};
use crate::runtime::{ContainerRuntime, ManifestApplier};

/// A call made against the simulated runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    /// `start_container`.
    Start(String),
    /// `stop_container`.
    Stop(String),
    /// `kill_container`.
    Kill(String),
    /// `remove_container`.
    RemoveContainer(String),
    /// `remove_volume`.
    RemoveVolume(String),
    /// `prune_networks`.
    PruneNetworks,
    /// `up`.
    Up {
        /// Requested services.
        services: Vec<String>,
        /// Whether orphans were removed.
        remove_orphans: bool,
    },
    /// `down`.
    Down {
        /// Whether volumes were removed.
        remove_volumes: bool,
        /// Whether orphans were removed.
        remove_orphans: bool,
    },
}

#[derive(Debug, Default)]
struct SimState {
    containers: BTreeMap<String, ContainerInfo>,
    project_containers: BTreeSet<String>,
    volumes: BTreeSet<String>,
    networks: BTreeSet<String>,
    failing: HashSet<String>,
    listing_fails: bool,
    calls: Vec<RuntimeCall>,
    next_id: u64,
}

impl SimState {
    fn upsert(&mut self, name: &str, state: ContainerState) {
        let next_id = &mut self.next_id;
        let info = self.containers.entry(name.to_string()).or_insert_with(|| {
            *next_id += 1;
            ContainerInfo::new(name, format!("{:064x}", *next_id), state.clone())
        });
        info.status = state.as_str().to_string();
        info.state = state;
    }

    fn check(&self, name: &str) -> Result<()> {
        if self.failing.contains(name) {
            return Err(PlaygroundError::runtime_unavailable(format!(
                "simulated failure for {}",
                name
            )));
        }
        Ok(())
    }

    fn set_state(&mut self, name: &str, state: ContainerState) -> Result<()> {
        self.check(name)?;
        let info = self
            .containers
            .get_mut(name)
            .ok_or_else(|| PlaygroundError::container_not_found(name))?;
        info.status = state.as_str().to_string();
        info.state = state;
        Ok(())
    }
}

/// Container runtime and manifest applier that only keeps state in memory.
///
/// With a manifest store attached, `up` and `down` materialize the services
/// and named volumes the manifest declares, the way compose would.
#[derive(Debug, Default)]
pub struct SimulatedRuntime {
    state: RwLock<SimState>,
    manifest: Option<(Arc<ManifestStore>, ProjectConfig)>,
}

impl SimulatedRuntime {
    /// Creates an empty runtime with no manifest attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a runtime whose `up`/`down` follow the given manifest.
    pub fn with_manifest(store: Arc<ManifestStore>, project: ProjectConfig) -> Self {
        Self {
            state: RwLock::default(),
            manifest: Some((store, project)),
        }
    }

    /// Adds or replaces a container.
    pub async fn add_container(&self, name: &str, state: ContainerState) {
        self.state.write().await.upsert(name, state);
    }

    /// Adds a volume.
    pub async fn add_volume(&self, name: &str) {
        self.state.write().await.volumes.insert(name.to_string());
    }

    /// Adds an unused network.
    pub async fn add_network(&self, name: &str) {
        self.state.write().await.networks.insert(name.to_string());
    }

    /// Makes every subsequent operation on `name` fail.
    pub async fn fail_on(&self, name: &str) {
        self.state.write().await.failing.insert(name.to_string());
    }

    /// Makes container listing fail.
    pub async fn fail_listing(&self) {
        self.state.write().await.listing_fails = true;
    }

    /// Returns the state of a container, if it exists.
    pub async fn container_state(&self, name: &str) -> Option<ContainerState> {
        self.state
            .read()
            .await
            .containers
            .get(name)
            .map(|c| c.state.clone())
    }

    /// Returns all container names.
    pub async fn container_names(&self) -> Vec<String> {
        self.state.read().await.containers.keys().cloned().collect()
    }

    /// Returns all volume names.
    pub async fn volume_names(&self) -> Vec<String> {
        self.state.read().await.volumes.iter().cloned().collect()
    }

    /// Returns the calls made so far.
    pub async fn calls(&self) -> Vec<RuntimeCall> {
        self.state.read().await.calls.clone()
    }

    async fn load_manifest(&self) -> Result<Option<(Manifest, &ProjectConfig)>> {
        match &self.manifest {
            Some((store, project)) => Ok(Some((store.load().await?, project))),
            None => Ok(None),
        }
    }
}

/// Container name and materialized named volumes of one service.
fn materialize(manifest: &Manifest, service: &str, project: &ProjectConfig) -> (String, Vec<String>) {
    let Some(spec) = manifest.service(service) else {
        return (service.to_string(), Vec::new());
    };
    let container = spec.container_name().unwrap_or(service).to_string();
    let volumes = spec
        .volume_mounts()
        .iter()
        .filter_map(|mount| mount.source())
        .filter(|source| manifest.has_volume(source))
        .map(|source| {
            manifest
                .volume(source)
                .and_then(|v| v.name().map(str::to_string))
                .unwrap_or_else(|| project.materialized_volume(source))
        })
        .collect();
    (container, volumes)
}

#[async_trait]
impl ContainerRuntime for SimulatedRuntime {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerInfo>> {
        let state = self.state.read().await;
        if state.listing_fails {
            return Err(PlaygroundError::runtime_unavailable("simulated listing failure"));
        }
        Ok(state
            .containers
            .values()
            .filter(|c| all || c.is_running())
            .cloned()
            .collect())
    }

    async fn inspect_container(&self, name: &str) -> Result<ContainerInfo> {
        let state = self.state.read().await;
        state.check(name)?;
        state
            .containers
            .get(name)
            .cloned()
            .ok_or_else(|| PlaygroundError::container_not_found(name))
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.calls.push(RuntimeCall::Start(name.to_string()));
        state.set_state(name, ContainerState::Running)
    }

    async fn stop_container(&self, name: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.calls.push(RuntimeCall::Stop(name.to_string()));
        state.set_state(name, ContainerState::Exited)
    }

    async fn kill_container(&self, name: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.calls.push(RuntimeCall::Kill(name.to_string()));
        state.set_state(name, ContainerState::Exited)
    }

    async fn remove_container(&self, name: &str, force: bool) -> Result<()> {
        let mut state = self.state.write().await;
        state.calls.push(RuntimeCall::RemoveContainer(name.to_string()));
        state.check(name)?;
        let running = state
            .containers
            .get(name)
            .ok_or_else(|| PlaygroundError::container_not_found(name))?
            .is_running();
        if running && !force {
            return Err(PlaygroundError::validation(format!(
                "container {} is running",
                name
            )));
        }
        state.containers.remove(name);
        state.project_containers.remove(name);
        Ok(())
    }

    async fn list_volumes(&self) -> Result<Vec<VolumeInfo>> {
        Ok(self
            .state
            .read()
            .await
            .volumes
            .iter()
            .map(VolumeInfo::new)
            .collect())
    }

    async fn inspect_volume(&self, name: &str) -> Result<VolumeInfo> {
        let state = self.state.read().await;
        if state.volumes.contains(name) {
            Ok(VolumeInfo::new(name))
        } else {
            Err(PlaygroundError::volume_not_found(name))
        }
    }

    async fn remove_volume(&self, name: &str, _force: bool) -> Result<()> {
        let mut state = self.state.write().await;
        state.calls.push(RuntimeCall::RemoveVolume(name.to_string()));
        state.check(name)?;
        if state.volumes.remove(name) {
            Ok(())
        } else {
            Err(PlaygroundError::volume_not_found(name))
        }
    }

    async fn prune_networks(&self) -> Result<Vec<String>> {
        let mut state = self.state.write().await;
        state.calls.push(RuntimeCall::PruneNetworks);
        Ok(std::mem::take(&mut state.networks).into_iter().collect())
    }
}

#[async_trait]
impl ManifestApplier for SimulatedRuntime {
    async fn up(&self, services: &[String], remove_orphans: bool) -> Result<()> {
        let loaded = self.load_manifest().await?;
        let mut state = self.state.write().await;
        state.calls.push(RuntimeCall::Up {
            services: services.to_vec(),
            remove_orphans,
        });

        let Some((manifest, project)) = loaded else {
            return Ok(());
        };

        let targets = if services.is_empty() {
            manifest.service_names()
        } else {
            services.to_vec()
        };
        for service in &targets {
            if !manifest.has_service(service) {
                return Err(PlaygroundError::compose_failed(
                    format!("up -d {}", service),
                    format!("no such service: {}", service),
                ));
            }
        }

        for service in &targets {
            let (container, volumes) = materialize(&manifest, service, project);
            state.check(&container)?;
            state.upsert(&container, ContainerState::Running);
            state.project_containers.insert(container);
            state.volumes.extend(volumes);
        }

        if remove_orphans {
            let declared: HashSet<String> = manifest
                .service_names()
                .iter()
                .map(|s| materialize(&manifest, s, project).0)
                .collect();
            let orphans: Vec<String> = state
                .project_containers
                .iter()
                .filter(|c| !declared.contains(*c))
                .cloned()
                .collect();
            for orphan in orphans {
                debug!(container = %orphan, "Removing orphan container");
                state.containers.remove(&orphan);
                state.project_containers.remove(&orphan);
            }
        }

        Ok(())
    }

    async fn down(&self, remove_volumes: bool, remove_orphans: bool) -> Result<()> {
        let loaded = self.load_manifest().await?;
        let mut state = self.state.write().await;
        state.calls.push(RuntimeCall::Down {
            remove_volumes,
            remove_orphans,
        });

        let Some((manifest, project)) = loaded else {
            return Ok(());
        };

        let mut doomed_containers = BTreeSet::new();
        let mut doomed_volumes = BTreeSet::new();
        for service in manifest.service_names() {
            let (container, volumes) = materialize(&manifest, &service, project);
            doomed_containers.insert(container);
            doomed_volumes.extend(volumes);
        }
        if remove_orphans {
            doomed_containers.extend(state.project_containers.iter().cloned());
        }

        for container in &doomed_containers {
            state.containers.remove(container);
            state.project_containers.remove(container);
        }
        if remove_volumes {
            for volume in &doomed_volumes {
                state.volumes.remove(volume);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
services:
  zookeeper:
    image: zk
  kafka1:
    container_name: kafka1
    volumes:
      - kafka1-data:/var/lib/kafka/data
volumes:
  kafka1-data:
    name: kafka-playground-kafka1-data
"#;

    #[tokio::test]
    async fn test_container_operations() {
        let runtime = SimulatedRuntime::new();
        runtime.add_container("kafka1", ContainerState::Running).await;

        runtime.stop_container("kafka1").await.unwrap();
        assert_eq!(runtime.container_state("kafka1").await, Some(ContainerState::Exited));
        assert!(runtime.list_containers(false).await.unwrap().is_empty());
        assert_eq!(runtime.list_containers(true).await.unwrap().len(), 1);

        runtime.remove_container("kafka1", false).await.unwrap();
        let err = runtime.stop_container("kafka1").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_remove_running_requires_force() {
        let runtime = SimulatedRuntime::new();
        runtime.add_container("kafka1", ContainerState::Running).await;
        assert!(runtime.remove_container("kafka1", false).await.is_err());
        runtime.remove_container("kafka1", true).await.unwrap();
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let runtime = SimulatedRuntime::new();
        runtime.add_container("kafka1", ContainerState::Running).await;
        runtime.fail_on("kafka1").await;
        let err = runtime.stop_container("kafka1").await.unwrap_err();
        assert!(matches!(err, PlaygroundError::RuntimeUnavailable(_)));
    }

    #[tokio::test]
    async fn test_up_and_down_follow_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docker-compose.yml");
        std::fs::write(&path, MANIFEST).unwrap();
        let store = Arc::new(ManifestStore::new(&path));
        let runtime = SimulatedRuntime::with_manifest(store, ProjectConfig::default());

        runtime.up(&[], false).await.unwrap();
        assert_eq!(runtime.container_names().await, vec!["kafka1", "zookeeper"]);
        assert_eq!(runtime.volume_names().await, vec!["kafka-playground-kafka1-data"]);

        runtime.down(true, true).await.unwrap();
        assert!(runtime.container_names().await.is_empty());
        assert!(runtime.volume_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_up_unknown_service_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docker-compose.yml");
        std::fs::write(&path, MANIFEST).unwrap();
        let runtime = SimulatedRuntime::with_manifest(
            Arc::new(ManifestStore::new(&path)),
            ProjectConfig::default(),
        );

        let err = runtime.up(&["kafka9".to_string()], false).await.unwrap_err();
        assert!(matches!(err, PlaygroundError::ComposeFailed { .. }));
    }

    #[tokio::test]
    async fn test_prune_networks() {
        let runtime = SimulatedRuntime::new();
        runtime.add_network("kafka-net").await;
        assert_eq!(runtime.prune_networks().await.unwrap(), vec!["kafka-net"]);
        assert!(runtime.prune_networks().await.unwrap().is_empty());
    }
}
