//! Building new broker definitions from a template broker.
//!
//! Provisioning is pure: [`BrokerProvisioner::provision`] reads a manifest
//! snapshot and returns a [`ProvisionedBroker`] that the caller merges back
//! with [`ProvisionedBroker::apply_to`].

use serde_yaml::Value;
use tracing::debug;

use crate::config::{PlaygroundConfig, ProjectConfig};
use crate::error::{PlaygroundError, Result};
use crate::manifest::{Manifest, ServiceSpec, VolumeSpec};
use crate::topology::{
    next_broker_id, BrokerRef, ClusterId, PortAllocator, TopologyResolver, VolumeRef,
};

/// Settings that shape a new broker definition.
#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    /// Template used when the target cluster has no brokers yet.
    pub fallback_template: String,
    /// Service every broker depends on.
    pub coordination_service: String,
    /// Coordination connect string without chroot.
    pub coordination_connect: String,
    /// Container-side client port.
    pub client_port: u16,
    /// Port of the listener other containers use.
    pub internal_listener_port: u16,
    /// Host name advertised to host clients.
    pub advertised_host: String,
    /// Prefix shared by broker service names.
    pub broker_prefix: String,
    /// Compose project settings.
    pub project: ProjectConfig,
}

impl ProvisionSettings {
    /// Extracts provisioning settings from the playground configuration.
    pub fn from_config(config: &PlaygroundConfig) -> Self {
        Self {
            fallback_template: config.topology.fallback_template.clone(),
            coordination_service: config.topology.coordination_service.clone(),
            coordination_connect: config.topology.coordination_connect.clone(),
            client_port: config.topology.client_port,
            internal_listener_port: config.topology.internal_listener_port,
            advertised_host: config.topology.advertised_host.clone(),
            broker_prefix: config.topology.broker_prefix.clone(),
            project: config.project.clone(),
        }
    }
}

/// Identity of the broker being built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerIdentity {
    /// Service and container name.
    pub service_name: String,
    /// Owning cluster.
    pub cluster: ClusterId,
    /// Numeric broker id.
    pub broker_id: u32,
    /// Whether `cluster` is the default cluster.
    pub default_cluster: bool,
}

/// A new broker ready to be merged into the manifest.
#[derive(Debug, Clone)]
pub struct ProvisionedBroker {
    /// The resolved broker.
    pub broker: BrokerRef,
    /// Name of the service the definition was cloned from.
    pub template: String,
    /// The new service block.
    pub spec: ServiceSpec,
    /// Volumes to register alongside the service.
    pub volumes: Vec<VolumeRef>,
}

impl ProvisionedBroker {
    /// Merges the service and its volumes into `manifest`.
    pub fn apply_to(&self, manifest: &mut Manifest) {
        manifest.insert_service(&self.broker.service_name, self.spec.clone());
        for volume in &self.volumes {
            manifest.insert_volume(
                &volume.manifest_name,
                VolumeSpec::named(&volume.materialized_name),
            );
        }
    }
}

/// Clones template brokers into new brokers.
#[derive(Debug, Clone)]
pub struct BrokerProvisioner {
    resolver: TopologyResolver,
    ports: PortAllocator,
    settings: ProvisionSettings,
}

impl BrokerProvisioner {
    /// Creates a provisioner.
    pub fn new(resolver: TopologyResolver, ports: PortAllocator, settings: ProvisionSettings) -> Self {
        Self {
            resolver,
            ports,
            settings,
        }
    }

    /// Creates a provisioner from the playground configuration.
    pub fn from_config(config: &PlaygroundConfig) -> Result<Self> {
        Ok(Self::new(
            TopologyResolver::from_config(&config.topology)?,
            PortAllocator::new(&config.ports),
            ProvisionSettings::from_config(config),
        ))
    }

    /// Builds the next broker of `cluster` without touching `manifest`.
    pub fn provision(&self, manifest: &Manifest, cluster: &ClusterId) -> Result<ProvisionedBroker> {
        let naming = self.resolver.naming();
        let brokers = self.resolver.list_brokers(manifest, cluster);
        let broker_id = next_broker_id(&brokers)?;
        let service_name = naming.broker_name(cluster, broker_id);

        let template_name = brokers
            .first()
            .map(|b| b.service_name.clone())
            .unwrap_or_else(|| self.settings.fallback_template.clone());
        let template = manifest
            .service(&template_name)
            .ok_or_else(|| PlaygroundError::TemplateNotFound(template_name.clone()))?;

        let external_port = self.ports.allocate(manifest)?;

        let identity = BrokerIdentity {
            service_name: service_name.clone(),
            cluster: cluster.clone(),
            broker_id,
            default_cluster: naming.is_default(cluster),
        };
        let (spec, volumes) = build_broker(&template, &identity, external_port, &self.settings);

        debug!(
            service = %service_name,
            cluster = %cluster,
            template = %template_name,
            port = external_port,
            "Provisioned broker definition"
        );

        Ok(ProvisionedBroker {
            broker: BrokerRef {
                service_name,
                cluster: cluster.clone(),
                broker_id,
                external_port: Some(external_port),
            },
            template: template_name,
            spec,
            volumes,
        })
    }
}

/// Rewrites a copy of `template` into the definition of `identity`.
///
/// Fields the rewrite does not touch are carried over from the template.
pub fn build_broker(
    template: &ServiceSpec,
    identity: &BrokerIdentity,
    external_port: u16,
    settings: &ProvisionSettings,
) -> (ServiceSpec, Vec<VolumeRef>) {
    let name = identity.service_name.as_str();
    let mut spec = template.clone();

    spec.set_container_name(name);
    spec.set_hostname(name);
    spec.set_ports([format!("{}:{}", external_port, settings.client_port)]);

    spec.set_env(
        "KAFKA_BROKER_ID",
        Value::Number(u64::from(identity.broker_id).into()),
    );
    let connect = if identity.default_cluster {
        settings.coordination_connect.clone()
    } else {
        format!("{}/{}", settings.coordination_connect, identity.cluster)
    };
    spec.set_env("KAFKA_ZOOKEEPER_CONNECT", connect);
    spec.set_env(
        "KAFKA_ADVERTISED_LISTENERS",
        format!(
            "PLAINTEXT://{}:{},PLAINTEXT_HOST://{}:{}",
            name, settings.internal_listener_port, settings.advertised_host, external_port
        ),
    );

    let data_volume = VolumeRef::for_service(name, &settings.project);
    let mut volumes = Vec::new();
    let mounts = template
        .volume_mounts()
        .iter()
        .map(|mount| match mount.source() {
            Some(source)
                if is_named_volume(source) && source.contains(settings.broker_prefix.as_str()) =>
            {
                if volumes.is_empty() {
                    volumes.push(data_volume.clone());
                }
                mount.with_source(&data_volume.manifest_name)
            }
            _ => mount.clone(),
        })
        .collect();
    spec.set_volume_mounts(mounts);

    spec.set_depends_on(vec![settings.coordination_service.clone()]);

    (spec, volumes)
}

fn is_named_volume(source: &str) -> bool {
    !source.is_empty() && !source.starts_with(['.', '/', '~', '$'])
}
