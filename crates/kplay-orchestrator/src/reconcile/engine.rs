//! Multi-step topology procedures.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::config::PlaygroundConfig;
use crate::error::{PlaygroundError, Result};
use crate::manifest::{Manifest, ManifestStore};
use crate::provision::BrokerProvisioner;
use crate::reconcile::reset::{ResetHandle, ResetTask};
use crate::runtime::{
    best_effort, ignore_not_found, ComposeCli, ContainerRuntime, DockerRuntime, ManifestApplier,
};
use crate::topology::{ClusterId, ClusterSummary, ServiceClass, TopologyResolver, VolumeRef};

/// The broker created by an add procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerDescriptor {
    /// Service and container name.
    pub broker_name: String,
    /// Owning cluster.
    pub cluster_id: ClusterId,
    /// Numeric broker id.
    pub broker_id: u32,
    /// Host port clients connect to.
    pub port: Option<u16>,
    /// Whether the runtime accepted the new service. The manifest is written either way.
    pub started: bool,
}

/// What a delete procedure removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalReport {
    /// Services removed from the manifest.
    pub services: Vec<String>,
    /// Volumes removed from the manifest (manifest names).
    pub volumes: Vec<String>,
}

/// Owns every topology mutation.
///
/// Mutations run one at a time behind a single lock. While a reset is in
/// flight, other mutations fail fast with
/// [`ResetInProgress`](PlaygroundError::ResetInProgress) instead of queueing;
/// read-only queries keep working.
pub struct TopologyManager {
    config: PlaygroundConfig,
    store: Arc<ManifestStore>,
    runtime: Arc<dyn ContainerRuntime>,
    applier: Arc<dyn ManifestApplier>,
    resolver: TopologyResolver,
    provisioner: BrokerProvisioner,
    mutation_lock: Arc<Mutex<()>>,
    resetting: Arc<AtomicBool>,
}

impl TopologyManager {
    /// Creates a manager over explicit collaborators.
    pub fn new(
        config: PlaygroundConfig,
        store: Arc<ManifestStore>,
        runtime: Arc<dyn ContainerRuntime>,
        applier: Arc<dyn ManifestApplier>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            resolver: TopologyResolver::from_config(&config.topology)?,
            provisioner: BrokerProvisioner::from_config(&config)?,
            config,
            store,
            runtime,
            applier,
            mutation_lock: Arc::new(Mutex::new(())),
            resetting: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Creates a manager backed by the local Docker daemon and the compose CLI.
    pub async fn connect(config: PlaygroundConfig) -> Result<Self> {
        let store = Arc::new(ManifestStore::new(&config.manifest.path));
        let runtime = Arc::new(DockerRuntime::connect(&config.runtime).await?);
        let applier = Arc::new(ComposeCli::new(&config)?);
        Self::new(config, store, runtime, applier)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PlaygroundConfig {
        &self.config
    }

    /// Returns the manifest store.
    pub fn store(&self) -> &Arc<ManifestStore> {
        &self.store
    }

    /// Returns the container runtime.
    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Returns the topology resolver.
    pub fn resolver(&self) -> &TopologyResolver {
        &self.resolver
    }

    /// Returns true while a reset is running.
    pub fn is_resetting(&self) -> bool {
        self.resetting.load(Ordering::Acquire)
    }

    /// Lists declared clusters, default first.
    pub async fn list_clusters(&self) -> Result<Vec<ClusterSummary>> {
        self.store.read(|m| self.resolver.list_clusters(m)).await
    }

    async fn begin_mutation(&self) -> Result<MutexGuard<'_, ()>> {
        if self.is_resetting() {
            return Err(PlaygroundError::ResetInProgress);
        }
        let guard = self.mutation_lock.lock().await;
        // A reset may have been requested while we waited.
        if self.is_resetting() {
            return Err(PlaygroundError::ResetInProgress);
        }
        Ok(guard)
    }

    fn container_name(manifest: &Manifest, service: &str) -> String {
        manifest
            .service(service)
            .and_then(|s| s.container_name().map(str::to_string))
            .unwrap_or_else(|| service.to_string())
    }

    fn materialized_volume(&self, manifest: &Manifest, volume: &VolumeRef) -> String {
        manifest
            .volume(&volume.manifest_name)
            .and_then(|v| v.name().map(str::to_string))
            .unwrap_or_else(|| volume.materialized_name.clone())
    }

    /// Adds the next broker to `cluster`.
    ///
    /// The manifest is written before the runtime is asked to start the
    /// broker; a failed start leaves the manifest as the desired state.
    pub async fn add_broker(&self, cluster: &str) -> Result<BrokerDescriptor> {
        let cluster = ClusterId::parse(cluster)?;
        let _guard = self.begin_mutation().await?;

        let provisioned = self
            .store
            .update(|manifest| {
                let new = self.provisioner.provision(manifest, &cluster)?;
                new.apply_to(manifest);
                Ok(new)
            })
            .await?;
        let name = provisioned.broker.service_name.clone();
        info!(
            broker = %name,
            cluster = %cluster,
            port = ?provisioned.broker.external_port,
            "Added broker to manifest"
        );

        let started = best_effort(
            self.applier.up(std::slice::from_ref(&name), false).await,
            "start new broker",
        )
        .is_some();

        Ok(BrokerDescriptor {
            broker_name: name,
            cluster_id: cluster,
            broker_id: provisioned.broker.broker_id,
            port: provisioned.broker.external_port,
            started,
        })
    }

    /// Creates a named cluster by adding its first broker.
    ///
    /// An existing cluster just gets one more broker.
    pub async fn create_cluster(&self, name: &str) -> Result<BrokerDescriptor> {
        let cluster = ClusterId::parse(name)?;
        if self.resolver.naming().is_default(&cluster) {
            return Err(PlaygroundError::invalid_name(
                name,
                "reserved for the default cluster",
            ));
        }
        self.add_broker(cluster.as_str()).await
    }

    /// Deletes one broker.
    ///
    /// `selector` is a service name or, for the default cluster, a bare broker
    /// id. Protected brokers are refused before anything changes.
    pub async fn delete_broker(&self, selector: &str) -> Result<RemovalReport> {
        let name = self.resolver.naming().resolve_selector(selector);
        if self.config.topology.protected_brokers.contains(&name) {
            return Err(PlaygroundError::protected(format!(
                "{} is a default broker and cannot be deleted",
                name
            )));
        }

        let _guard = self.begin_mutation().await?;
        let manifest = self.store.load().await?;
        let in_namespace = self.resolver.naming().classify(&name) != ServiceClass::Other;
        if !manifest.has_service(&name) || !in_namespace {
            return Err(PlaygroundError::broker_not_found(name));
        }

        let container = Self::container_name(&manifest, &name);
        best_effort(self.runtime.stop_container(&container).await, "stop broker");
        best_effort(
            self.runtime.remove_container(&container, true).await,
            "remove broker container",
        );

        let volume = VolumeRef::for_service(&name, &self.config.project);
        let materialized = self.materialized_volume(&manifest, &volume);
        let report = self
            .store
            .update(|manifest| {
                let mut report = RemovalReport::default();
                if manifest.remove_service(&name).is_some() {
                    report.services.push(name.clone());
                }
                if manifest.remove_volume(&volume.manifest_name).is_some() {
                    report.volumes.push(volume.manifest_name.clone());
                }
                Ok(report)
            })
            .await?;
        info!(broker = %name, "Removed broker from manifest");

        best_effort(self.applier.up(&[], true).await, "apply manifest");
        best_effort(
            ignore_not_found(
                self.runtime.remove_volume(&materialized, true).await,
                &materialized,
            ),
            "remove broker volume",
        );

        Ok(report)
    }

    /// Deletes every broker of a named cluster.
    pub async fn delete_cluster(&self, cluster: &str) -> Result<RemovalReport> {
        let cluster = ClusterId::parse(cluster)?;
        if self.resolver.naming().is_default(&cluster) {
            return Err(PlaygroundError::validation("the default cluster cannot be deleted"));
        }

        let _guard = self.begin_mutation().await?;
        let manifest = self.store.load().await?;
        let services = self.resolver.cluster_services(&manifest, &cluster);
        if services.is_empty() {
            return Err(PlaygroundError::cluster_not_found(cluster.as_str()));
        }

        let mut materialized = Vec::new();
        for service in &services {
            let container = Self::container_name(&manifest, service);
            best_effort(self.runtime.kill_container(&container).await, "kill broker");
            best_effort(
                self.runtime.remove_container(&container, true).await,
                "remove broker container",
            );
            let volume = VolumeRef::for_service(service, &self.config.project);
            materialized.push(self.materialized_volume(&manifest, &volume));
        }

        let report = self
            .store
            .update(|manifest| {
                let mut report = RemovalReport::default();
                for service in &services {
                    if manifest.remove_service(service).is_some() {
                        report.services.push(service.clone());
                    }
                    let volume = VolumeRef::for_service(service, &self.config.project);
                    if manifest.remove_volume(&volume.manifest_name).is_some() {
                        report.volumes.push(volume.manifest_name);
                    }
                }
                Ok(report)
            })
            .await?;
        info!(cluster = %cluster, brokers = ?report.services, "Removed cluster from manifest");

        best_effort(self.applier.up(&[], true).await, "apply manifest");
        for volume in &materialized {
            best_effort(
                ignore_not_found(self.runtime.remove_volume(volume, true).await, volume),
                "remove broker volume",
            );
        }

        Ok(report)
    }

    async fn broker_container(&self, selector: &str) -> Result<String> {
        let name = self.resolver.naming().resolve_selector(selector);
        self.store
            .read(|m| Self::container_name(m, &name))
            .await
    }

    /// Starts an existing broker container.
    pub async fn start_broker(&self, selector: &str) -> Result<()> {
        let _guard = self.begin_mutation().await?;
        let container = self.broker_container(selector).await?;
        self.runtime.start_container(&container).await
    }

    /// Stops an existing broker container.
    pub async fn stop_broker(&self, selector: &str) -> Result<()> {
        let _guard = self.begin_mutation().await?;
        let container = self.broker_container(selector).await?;
        self.runtime.stop_container(&container).await
    }

    /// Stops running containers and returns the ones actually stopped.
    ///
    /// Without a cluster: every broker-prefixed container plus the auxiliary
    /// services. With a cluster: only that cluster's brokers.
    pub async fn stop_cluster(&self, cluster: Option<&str>) -> Result<Vec<String>> {
        let cluster = cluster.map(ClusterId::parse).transpose()?;
        let _guard = self.begin_mutation().await?;

        let naming = self.resolver.naming();
        let prefix = self.config.topology.broker_prefix.as_str();
        let auxiliary = &self.config.stop.auxiliary_services;
        let targets: Vec<String> = self
            .runtime
            .list_containers(false)
            .await?
            .into_iter()
            .filter(|c| c.is_running())
            .map(|c| c.name)
            .filter(|name| match &cluster {
                None => name.starts_with(prefix) || auxiliary.contains(name),
                Some(id) => matches!(
                    naming.classify(name),
                    ServiceClass::Broker { cluster, .. } if cluster == *id
                ),
            })
            .collect();

        let mut stopped = Vec::new();
        for name in targets {
            match ignore_not_found(self.runtime.stop_container(&name).await, &name) {
                Ok(true) => stopped.push(name),
                Ok(false) => {}
                Err(e) => warn!(container = %name, error = %e, "Failed to stop container"),
            }
        }

        info!(count = stopped.len(), "Stopped containers");
        Ok(stopped)
    }

    /// Applies the whole manifest.
    pub async fn start_cluster(&self) -> Result<()> {
        let _guard = self.begin_mutation().await?;
        self.applier.up(&[], false).await?;
        info!("Applied manifest");
        Ok(())
    }

    /// Starts a reset in the background and returns immediately.
    pub fn reset(&self) -> Result<ResetHandle> {
        if self.resetting.swap(true, Ordering::AcqRel) {
            return Err(PlaygroundError::ResetInProgress);
        }
        debug!(grace = ?self.config.reset.grace(), "Scheduling reset");

        Ok(ResetTask {
            config: self.config.clone(),
            store: self.store.clone(),
            runtime: self.runtime.clone(),
            applier: self.applier.clone(),
            mutation_lock: self.mutation_lock.clone(),
            in_flight: self.resetting.clone(),
        }
        .spawn())
    }
}

impl std::fmt::Debug for TopologyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopologyManager")
            .field("manifest", &self.store.path())
            .field("runtime", &self.runtime.name())
            .field("resetting", &self.is_resetting())
            .finish()
    }
}
