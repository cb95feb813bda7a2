//! External port allocation for new brokers.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::config::PortConfig;
use crate::error::{PlaygroundError, Result};
use crate::manifest::{HostPort, Manifest};

/// Picks host ports that no service in the manifest claims.
///
/// Only the manifest is consulted; whether the host itself has the port free
/// is checked by the validator.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    start_port: u16,
    max_probes: u32,
    strict: bool,
}

impl PortAllocator {
    /// Creates an allocator from port settings.
    pub fn new(config: &PortConfig) -> Self {
        Self {
            start_port: config.start_port,
            max_probes: config.max_probes,
            strict: config.strict,
        }
    }

    /// Collects every literal host port declared by any service.
    pub fn used_ports(manifest: &Manifest) -> BTreeSet<u16> {
        let mut used = BTreeSet::new();
        for (service, spec) in manifest.services() {
            for binding in spec.ports() {
                match binding.host_port {
                    HostPort::Literal(port) => {
                        used.insert(port);
                    }
                    HostPort::Unspecified => {}
                    HostPort::Templated(_) | HostPort::Invalid(_) => {
                        debug!(service = %service, entry = %binding.raw, "Skipping non-literal port entry");
                    }
                }
            }
        }
        used
    }

    /// Returns the first free port at or after the start port.
    ///
    /// Gives up after the probe budget. In strict mode that is an error; in
    /// lenient mode the last probed candidate is returned even though it is
    /// taken.
    pub fn allocate(&self, manifest: &Manifest) -> Result<u16> {
        let used = Self::used_ports(manifest);
        let mut candidate = self.start_port;

        for attempt in 0..self.max_probes {
            if !used.contains(&candidate) {
                debug!(port = candidate, attempt, "Allocated external port");
                return Ok(candidate);
            }
            if attempt + 1 < self.max_probes {
                candidate = candidate.checked_add(1).ok_or(PlaygroundError::PortExhausted {
                    start: self.start_port,
                    attempts: attempt + 1,
                })?;
            }
        }

        if self.strict {
            Err(PlaygroundError::PortExhausted {
                start: self.start_port,
                attempts: self.max_probes,
            })
        } else {
            warn!(
                start = self.start_port,
                attempts = self.max_probes,
                port = candidate,
                "Port probe budget exhausted, reusing last candidate"
            );
            Ok(candidate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest_with_ports(ports: &[&str]) -> Manifest {
        let mut yaml = String::from("services:\n");
        for (i, port) in ports.iter().enumerate() {
            yaml.push_str(&format!("  svc{}:\n    ports:\n      - \"{}\"\n", i, port));
        }
        Manifest::from_yaml_str(&yaml).unwrap()
    }

    fn allocator(start_port: u16, max_probes: u32, strict: bool) -> PortAllocator {
        PortAllocator::new(&PortConfig {
            start_port,
            max_probes,
            strict,
        })
    }

    #[test]
    fn test_skips_used_ports() {
        let manifest = manifest_with_ports(&["9095:9092", "9096:9092"]);
        assert_eq!(allocator(9095, 100, true).allocate(&manifest).unwrap(), 9097);
    }

    #[test]
    fn test_used_ports_ignores_templated() {
        let manifest = manifest_with_ports(&["${PORT}:9092", "9092:9092", "8080"]);
        let used = PortAllocator::used_ports(&manifest);
        assert_eq!(used.into_iter().collect::<Vec<_>>(), vec![9092]);
    }

    #[test]
    fn test_strict_exhaustion() {
        let manifest = manifest_with_ports(&["9095:9092", "9096:9092", "9097:9092"]);
        let err = allocator(9095, 3, true).allocate(&manifest).unwrap_err();
        assert!(matches!(err, PlaygroundError::PortExhausted { start: 9095, attempts: 3 }));
    }

    #[test]
    fn test_lenient_exhaustion_returns_last_candidate() {
        let manifest = manifest_with_ports(&["9095:9092", "9096:9092", "9097:9092"]);
        assert_eq!(allocator(9095, 3, false).allocate(&manifest).unwrap(), 9097);
    }

    #[test]
    fn test_lenient_window_boundary() {
        // Last probe in the window is free.
        let manifest = manifest_with_ports(&["9095:9092", "9096:9092"]);
        assert_eq!(allocator(9095, 3, false).allocate(&manifest).unwrap(), 9097);

        // Window full, next port free but outside the budget.
        let manifest = manifest_with_ports(&["9095:9092", "9096:9092", "9097:9092"]);
        let port = allocator(9095, 3, false).allocate(&manifest).unwrap();
        assert_eq!(port, 9097);
        assert!(PortAllocator::used_ports(&manifest).contains(&port));
    }

    #[test]
    fn test_port_range_end() {
        let manifest = manifest_with_ports(&["65535:9092"]);
        let err = allocator(65535, 10, true).allocate(&manifest).unwrap_err();
        assert!(matches!(err, PlaygroundError::PortExhausted { start: 65535, attempts: 1 }));
    }

    #[test]
    fn test_port_range_end_lenient() {
        let manifest = manifest_with_ports(&["65534:9092", "65535:9092"]);
        let err = allocator(65534, 10, false).allocate(&manifest).unwrap_err();
        assert!(matches!(err, PlaygroundError::PortExhausted { start: 65534, attempts: 2 }));

        // A budget ending exactly at 65535 still falls back to the last candidate.
        assert_eq!(allocator(65534, 2, false).allocate(&manifest).unwrap(), 65535);
    }
}
