//! In-memory view of the compose manifest.
//!
//! The manifest is kept as the original insertion-ordered YAML document so
//! that keys this crate does not understand survive a rewrite untouched and in
//! place. Typed accessors sit on top for the parts the topology manager edits:
//! services, named volumes, and inside a service its identity, ports,
//! environment, volume bindings and dependencies.

use serde_yaml::{Mapping, Value};

use crate::error::{PlaygroundError, Result};

const SERVICES_KEY: &str = "services";
const VOLUMES_KEY: &str = "volumes";

/// The whole declarative manifest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    root: Mapping,
}

impl Manifest {
    /// Creates an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a manifest from YAML text.
    ///
    /// An empty document is an empty manifest.
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(input)?;
        match value {
            Value::Mapping(root) => Ok(Self { root }),
            Value::Null => Ok(Self::default()),
            other => Err(PlaygroundError::serialization(format!(
                "manifest root must be a mapping, found {}",
                value_kind(&other)
            ))),
        }
    }

    /// Serializes the manifest to YAML.
    ///
    /// Entries are written in insertion order, each as its own literal block.
    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.root)?)
    }

    /// Returns the service names in declaration order.
    pub fn service_names(&self) -> Vec<String> {
        section_keys(self.root.get(SERVICES_KEY))
    }

    /// Returns true if a service with this name is declared.
    pub fn has_service(&self, name: &str) -> bool {
        section(self.root.get(SERVICES_KEY)).is_some_and(|s| s.contains_key(name))
    }

    /// Returns an owned copy of a service block.
    pub fn service(&self, name: &str) -> Option<ServiceSpec> {
        section(self.root.get(SERVICES_KEY))?
            .get(name)
            .map(ServiceSpec::from_value)
    }

    /// Iterates over every service in declaration order.
    pub fn services(&self) -> impl Iterator<Item = (String, ServiceSpec)> + '_ {
        section(self.root.get(SERVICES_KEY))
            .into_iter()
            .flat_map(|s| s.iter())
            .filter_map(|(k, v)| Some((k.as_str()?.to_string(), ServiceSpec::from_value(v))))
    }

    /// Inserts or replaces a service. New services are appended.
    pub fn insert_service(&mut self, name: impl Into<String>, spec: ServiceSpec) {
        section_mut(&mut self.root, SERVICES_KEY)
            .insert(Value::String(name.into()), Value::Mapping(spec.into_mapping()));
    }

    /// Removes a service, keeping the order of the remaining ones.
    pub fn remove_service(&mut self, name: &str) -> Option<ServiceSpec> {
        remove_ordered(self.root.get_mut(SERVICES_KEY), name).map(|v| ServiceSpec::from_value(&v))
    }

    /// Keeps only the services for which `keep` returns true; returns the removed names.
    pub fn retain_services(&mut self, keep: impl FnMut(&str) -> bool) -> Vec<String> {
        retain_ordered(self.root.get_mut(SERVICES_KEY), keep)
    }

    /// Returns the named volume keys in declaration order.
    pub fn volume_names(&self) -> Vec<String> {
        section_keys(self.root.get(VOLUMES_KEY))
    }

    /// Returns true if a named volume with this key is declared.
    pub fn has_volume(&self, name: &str) -> bool {
        section(self.root.get(VOLUMES_KEY)).is_some_and(|s| s.contains_key(name))
    }

    /// Returns an owned copy of a volume block.
    pub fn volume(&self, name: &str) -> Option<VolumeSpec> {
        section(self.root.get(VOLUMES_KEY))?
            .get(name)
            .map(VolumeSpec::from_value)
    }

    /// Inserts or replaces a named volume. New volumes are appended.
    pub fn insert_volume(&mut self, name: impl Into<String>, spec: VolumeSpec) {
        section_mut(&mut self.root, VOLUMES_KEY)
            .insert(Value::String(name.into()), spec.into_value());
    }

    /// Removes a named volume, keeping the order of the remaining ones.
    pub fn remove_volume(&mut self, name: &str) -> Option<VolumeSpec> {
        remove_ordered(self.root.get_mut(VOLUMES_KEY), name).map(|v| VolumeSpec::from_value(&v))
    }

    /// Keeps only the volumes for which `keep` returns true; returns the removed names.
    pub fn retain_volumes(&mut self, keep: impl FnMut(&str) -> bool) -> Vec<String> {
        retain_ordered(self.root.get_mut(VOLUMES_KEY), keep)
    }
}

/// One service block.
///
/// Opaque apart from the accessors below; everything else in the block
/// (image, resource limits, extra environment, healthchecks) is carried as-is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceSpec {
    block: Mapping,
}

impl ServiceSpec {
    /// Wraps an existing mapping.
    pub fn from_mapping(block: Mapping) -> Self {
        Self { block }
    }

    /// Parses a service block from YAML text.
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        match serde_yaml::from_str::<Value>(input)? {
            Value::Mapping(block) => Ok(Self { block }),
            Value::Null => Ok(Self::default()),
            other => Err(PlaygroundError::serialization(format!(
                "service block must be a mapping, found {}",
                value_kind(&other)
            ))),
        }
    }

    fn from_value(value: &Value) -> Self {
        Self {
            block: value.as_mapping().cloned().unwrap_or_default(),
        }
    }

    /// Returns the underlying mapping.
    pub fn as_mapping(&self) -> &Mapping {
        &self.block
    }

    /// Consumes the service block, returning the underlying mapping.
    pub fn into_mapping(self) -> Mapping {
        self.block
    }

    /// Returns an arbitrary top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.block.get(key)
    }

    /// Sets an arbitrary top-level field, keeping its position if present.
    pub fn set(&mut self, key: &str, value: Value) {
        self.block.insert(Value::String(key.to_string()), value);
    }

    /// Returns the declared container name.
    pub fn container_name(&self) -> Option<&str> {
        self.block.get("container_name").and_then(Value::as_str)
    }

    /// Sets the container name.
    pub fn set_container_name(&mut self, name: &str) {
        self.set("container_name", Value::String(name.to_string()));
    }

    /// Returns the declared hostname.
    pub fn hostname(&self) -> Option<&str> {
        self.block.get("hostname").and_then(Value::as_str)
    }

    /// Sets the hostname.
    pub fn set_hostname(&mut self, name: &str) {
        self.set("hostname", Value::String(name.to_string()));
    }

    /// Returns the parsed port bindings in declaration order.
    pub fn ports(&self) -> Vec<PortBinding> {
        self.block
            .get("ports")
            .and_then(Value::as_sequence)
            .map(|seq| seq.iter().map(PortBinding::from_value).collect())
            .unwrap_or_default()
    }

    /// Replaces the port bindings with the given short-syntax entries.
    pub fn set_ports<I, S>(&mut self, ports: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let seq = ports.into_iter().map(|p| Value::String(p.into())).collect();
        self.set("ports", Value::Sequence(seq));
    }

    /// Returns an environment variable rendered as a string.
    ///
    /// Both the mapping form and the `KEY=VALUE` list form are understood.
    pub fn env(&self, key: &str) -> Option<String> {
        match self.block.get("environment")? {
            Value::Mapping(env) => env.get(key).map(scalar_to_string),
            Value::Sequence(list) => list.iter().filter_map(Value::as_str).find_map(|entry| {
                let (k, v) = entry.split_once('=').unwrap_or((entry, ""));
                (k == key).then(|| v.to_string())
            }),
            _ => None,
        }
    }

    /// Sets an environment variable, keeping the block's existing form.
    pub fn set_env(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        let env = self
            .block
            .entry(Value::String("environment".to_string()))
            .or_insert_with(|| Value::Mapping(Mapping::new()));

        match env {
            Value::Sequence(list) => {
                let rendered = format!("{}={}", key, scalar_to_string(&value));
                let existing = list.iter().position(|entry| {
                    entry
                        .as_str()
                        .map(|e| e.split_once('=').map_or(e, |(k, _)| k) == key)
                        .unwrap_or(false)
                });
                match existing {
                    Some(idx) => list[idx] = Value::String(rendered),
                    None => list.push(Value::String(rendered)),
                }
            }
            Value::Mapping(map) => {
                map.insert(Value::String(key.to_string()), value);
            }
            other => {
                let mut map = Mapping::new();
                map.insert(Value::String(key.to_string()), value);
                *other = Value::Mapping(map);
            }
        }
    }

    /// Returns the volume mounts in declaration order.
    ///
    /// Both the short `source:target[:mode]` form and the long mapping form
    /// are understood.
    pub fn volume_mounts(&self) -> Vec<VolumeMount> {
        self.block
            .get("volumes")
            .and_then(Value::as_sequence)
            .map(|seq| seq.iter().filter_map(VolumeMount::from_value).collect())
            .unwrap_or_default()
    }

    /// Replaces the volume mounts.
    pub fn set_volume_mounts(&mut self, mounts: Vec<VolumeMount>) {
        let seq = mounts.into_iter().map(VolumeMount::into_value).collect();
        self.set("volumes", Value::Sequence(seq));
    }

    /// Returns the services this one depends on.
    ///
    /// Both the list form and the long mapping form are understood.
    pub fn depends_on(&self) -> Vec<String> {
        match self.block.get("depends_on") {
            Some(Value::Sequence(seq)) => {
                seq.iter().filter_map(Value::as_str).map(str::to_string).collect()
            }
            Some(Value::Mapping(map)) => {
                map.keys().filter_map(Value::as_str).map(str::to_string).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Replaces the dependency list.
    pub fn set_depends_on(&mut self, services: Vec<String>) {
        let seq = services.into_iter().map(Value::String).collect();
        self.set("depends_on", Value::Sequence(seq));
    }
}

/// One named volume block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VolumeSpec {
    block: Mapping,
}

impl VolumeSpec {
    /// Creates a volume entry with an explicit materialized name.
    pub fn named(name: impl Into<String>) -> Self {
        let mut block = Mapping::new();
        block.insert(Value::String("name".to_string()), Value::String(name.into()));
        Self { block }
    }

    fn from_value(value: &Value) -> Self {
        Self {
            block: value.as_mapping().cloned().unwrap_or_default(),
        }
    }

    fn into_value(self) -> Value {
        if self.block.is_empty() {
            Value::Null
        } else {
            Value::Mapping(self.block)
        }
    }

    /// Returns the explicit materialized name, if declared.
    pub fn name(&self) -> Option<&str> {
        self.block.get("name").and_then(Value::as_str)
    }
}

/// One entry of a service's `volumes` list.
#[derive(Debug, Clone, PartialEq)]
pub enum VolumeMount {
    /// `source:target[:mode]`, or a bare container path.
    Short(String),
    /// Mapping with `type`, `source`, `target` and friends.
    Long(Mapping),
}

impl VolumeMount {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Short(s.clone())),
            Value::Mapping(long) => Some(Self::Long(long.clone())),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Self::Short(s) => Value::String(s),
            Self::Long(long) => Value::Mapping(long),
        }
    }

    /// Returns the mount source: a named volume, a host path, or `None` for
    /// an anonymous volume.
    pub fn source(&self) -> Option<&str> {
        match self {
            Self::Short(s) => s.split_once(':').map(|(source, _)| source),
            Self::Long(long) => long.get("source").and_then(Value::as_str),
        }
    }

    /// Returns a copy of this mount reading from `source` instead.
    ///
    /// Mounts without a source are returned unchanged.
    pub fn with_source(&self, source: &str) -> Self {
        match self {
            Self::Short(s) => match s.split_once(':') {
                Some((_, rest)) => Self::Short(format!("{}:{}", source, rest)),
                None => self.clone(),
            },
            Self::Long(long) if long.contains_key("source") => {
                let mut long = long.clone();
                long.insert(
                    Value::String("source".to_string()),
                    Value::String(source.to_string()),
                );
                Self::Long(long)
            }
            Self::Long(_) => self.clone(),
        }
    }
}

impl From<&str> for VolumeMount {
    fn from(entry: &str) -> Self {
        Self::Short(entry.to_string())
    }
}

/// The host side of a port binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPort {
    /// A literal port number.
    Literal(u16),
    /// A variable reference such as `${KAFKA_PORT}`.
    Templated(String),
    /// No host port; the runtime picks one.
    Unspecified,
    /// Text that is neither a port number nor a variable.
    Invalid(String),
}

/// A parsed entry of a service's `ports` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    /// Host side of the binding.
    pub host_port: HostPort,
    /// Container side of the binding, when it is a literal.
    pub container_port: Option<u16>,
    /// The entry as written.
    pub raw: String,
}

impl PortBinding {
    /// Parses a short-syntax port entry.
    ///
    /// Accepted forms: `container`, `host:container`, `ip:host:container`,
    /// each with an optional `/protocol` suffix.
    pub fn parse(entry: &str) -> Self {
        let raw = entry.to_string();
        let without_proto = entry.split('/').next().unwrap_or(entry).trim();
        let parts: Vec<&str> = without_proto.rsplitn(3, ':').collect();

        let (host, container) = match parts.as_slice() {
            [container] => (None, *container),
            [container, host] => (Some(*host), *container),
            [container, host, _ip] => (Some(*host), *container),
            _ => (None, ""),
        };

        Self {
            host_port: host.map_or(HostPort::Unspecified, parse_host_port),
            container_port: container.parse().ok(),
            raw,
        }
    }

    fn from_value(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::parse(s),
            Value::Number(n) => Self::parse(&n.to_string()),
            Value::Mapping(long) => {
                let published = long.get("published").map(scalar_to_string);
                let target = long.get("target").map(scalar_to_string);
                Self {
                    host_port: published
                        .as_deref()
                        .map_or(HostPort::Unspecified, parse_host_port),
                    container_port: target.as_deref().and_then(|t| t.parse().ok()),
                    raw: format!(
                        "{}:{}",
                        published.unwrap_or_default(),
                        target.unwrap_or_default()
                    ),
                }
            }
            other => Self {
                host_port: HostPort::Invalid(scalar_to_string(other)),
                container_port: None,
                raw: scalar_to_string(other),
            },
        }
    }

    /// Returns the external port if it is a literal.
    pub fn external_port(&self) -> Option<u16> {
        match self.host_port {
            HostPort::Literal(port) => Some(port),
            _ => None,
        }
    }
}

fn parse_host_port(text: &str) -> HostPort {
    let text = text.trim();
    if text.contains('$') {
        HostPort::Templated(text.to_string())
    } else if text.is_empty() {
        HostPort::Unspecified
    } else {
        text.parse()
            .map(HostPort::Literal)
            .unwrap_or_else(|_| HostPort::Invalid(text.to_string()))
    }
}

fn section(value: Option<&Value>) -> Option<&Mapping> {
    value.and_then(Value::as_mapping)
}

fn section_keys(value: Option<&Value>) -> Vec<String> {
    section(value)
        .map(|s| s.keys().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn section_mut<'a>(root: &'a mut Mapping, key: &str) -> &'a mut Mapping {
    let entry = root
        .entry(Value::String(key.to_string()))
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    if !entry.is_mapping() {
        *entry = Value::Mapping(Mapping::new());
    }
    match entry {
        Value::Mapping(map) => map,
        _ => unreachable!("section was just replaced by a mapping"),
    }
}

fn remove_ordered(section: Option<&mut Value>, name: &str) -> Option<Value> {
    let map = section?.as_mapping_mut()?;
    let mut removed = None;
    let entries = std::mem::take(map);
    *map = entries
        .into_iter()
        .filter_map(|(k, v)| {
            if removed.is_none() && k.as_str() == Some(name) {
                removed = Some(v);
                None
            } else {
                Some((k, v))
            }
        })
        .collect();
    removed
}

fn retain_ordered(section: Option<&mut Value>, mut keep: impl FnMut(&str) -> bool) -> Vec<String> {
    let Some(map) = section.and_then(Value::as_mapping_mut) else {
        return Vec::new();
    };
    let mut removed = Vec::new();
    let entries = std::mem::take(map);
    *map = entries
        .into_iter()
        .filter(|(k, _)| match k.as_str() {
            Some(name) if !keep(name) => {
                removed.push(name.to_string());
                false
            }
            _ => true,
        })
        .collect();
    removed
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version: '3.8'
services:
  zookeeper:
    image: confluentinc/cp-zookeeper:7.5.0
    ports:
      - "2181:2181"
  kafka1:
    image: confluentinc/cp-kafka:7.5.0
    ports:
      - "9092:9092"
    environment:
      KAFKA_BROKER_ID: 1
      KAFKA_ZOOKEEPER_CONNECT: zookeeper:2181
    volumes:
      - kafka1-data:/var/lib/kafka/data
    depends_on:
      - zookeeper
  kafka-ui:
    image: provectuslabs/kafka-ui
    ports:
      - "${UI_PORT}:8080"
volumes:
  kafka1-data:
    name: kafka-playground-kafka1-data
networks:
  default:
    name: kafka-net
"#;

    #[test]
    fn test_parse_and_accessors() {
        let manifest = Manifest::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(manifest.service_names(), vec!["zookeeper", "kafka1", "kafka-ui"]);
        assert_eq!(manifest.volume_names(), vec!["kafka1-data"]);

        let kafka1 = manifest.service("kafka1").unwrap();
        assert_eq!(kafka1.env("KAFKA_BROKER_ID").as_deref(), Some("1"));
        assert_eq!(kafka1.ports()[0].external_port(), Some(9092));
        assert_eq!(kafka1.depends_on(), vec!["zookeeper"]);
        assert_eq!(
            manifest.volume("kafka1-data").unwrap().name(),
            Some("kafka-playground-kafka1-data")
        );
    }

    #[test]
    fn test_remove_keeps_order_and_unknown_keys() {
        let mut manifest = Manifest::from_yaml_str(SAMPLE).unwrap();
        manifest.remove_service("zookeeper").unwrap();
        assert_eq!(manifest.service_names(), vec!["kafka1", "kafka-ui"]);

        let yaml = manifest.to_yaml_string().unwrap();
        let version = yaml.find("version:").unwrap();
        let services = yaml.find("services:").unwrap();
        let networks = yaml.find("networks:").unwrap();
        assert!(version < services && services < networks);
    }

    #[test]
    fn test_identical_blocks_are_not_aliased() {
        let mut manifest = Manifest::from_yaml_str(SAMPLE).unwrap();
        let kafka1 = manifest.service("kafka1").unwrap();
        manifest.insert_service("kafka9", kafka1.clone());
        manifest.insert_service("kafka10", kafka1);

        let yaml = manifest.to_yaml_string().unwrap();
        assert!(!yaml.contains('&'));
        assert!(!yaml.contains('*'));
        assert_eq!(yaml.matches("KAFKA_ZOOKEEPER_CONNECT").count(), 3);
    }

    #[test]
    fn test_retain_services_reports_removed() {
        let mut manifest = Manifest::from_yaml_str(SAMPLE).unwrap();
        let removed = manifest.retain_services(|name| name != "kafka-ui");
        assert_eq!(removed, vec!["kafka-ui"]);
        assert!(!manifest.has_service("kafka-ui"));
    }

    #[test]
    fn test_port_binding_forms() {
        assert_eq!(PortBinding::parse("9095:9092").external_port(), Some(9095));
        assert_eq!(PortBinding::parse("127.0.0.1:9096:9092").external_port(), Some(9096));
        assert_eq!(PortBinding::parse("9092/tcp").host_port, HostPort::Unspecified);
        assert_eq!(
            PortBinding::parse("${PORT}:9092").host_port,
            HostPort::Templated("${PORT}".to_string())
        );
        assert!(matches!(PortBinding::parse("abc:9092").host_port, HostPort::Invalid(_)));
        assert_eq!(PortBinding::parse("9095:9092").container_port, Some(9092));
    }

    #[test]
    fn test_env_list_form() {
        let mut spec = ServiceSpec::from_yaml_str(
            "environment:\n  - KAFKA_BROKER_ID=1\n  - OTHER=x\n",
        )
        .unwrap();
        assert_eq!(spec.env("KAFKA_BROKER_ID").as_deref(), Some("1"));

        spec.set_env("KAFKA_BROKER_ID", Value::Number(7.into()));
        spec.set_env("NEW_KEY", "value");
        assert_eq!(spec.env("KAFKA_BROKER_ID").as_deref(), Some("7"));
        assert_eq!(spec.env("NEW_KEY").as_deref(), Some("value"));
        assert_eq!(spec.env("OTHER").as_deref(), Some("x"));
    }

    #[test]
    fn test_volume_mount_forms() {
        let spec = ServiceSpec::from_yaml_str(
            r#"
volumes:
  - kafka1-data:/var/lib/kafka/data
  - type: volume
    source: kafka1-logs
    target: /var/log/kafka
  - type: tmpfs
    target: /tmp
  - /anonymous
"#,
        )
        .unwrap();

        let mounts = spec.volume_mounts();
        let sources: Vec<_> = mounts.iter().map(VolumeMount::source).collect();
        assert_eq!(sources, vec![Some("kafka1-data"), Some("kafka1-logs"), None, None]);

        let renamed: Vec<_> = mounts.iter().map(|m| m.with_source("other")).collect();
        assert_eq!(renamed[0], VolumeMount::from("other:/var/lib/kafka/data"));
        assert_eq!(renamed[1].source(), Some("other"));
        assert_eq!(renamed[2], mounts[2]);
        assert_eq!(renamed[3], mounts[3]);

        let mut copy = spec.clone();
        copy.set_volume_mounts(renamed);
        assert_eq!(copy.volume_mounts().len(), 4);
        assert_eq!(spec.volume_mounts()[1].source(), Some("kafka1-logs"));
    }

    #[test]
    fn test_empty_document() {
        let manifest = Manifest::from_yaml_str("").unwrap();
        assert!(manifest.service_names().is_empty());
        assert!(Manifest::from_yaml_str("- a\n- b\n").is_err());
    }
}
