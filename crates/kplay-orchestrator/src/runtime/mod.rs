//! Container runtime adapters.
//!
//! Two seams sit between the topology manager and the outside world:
//!
//! - [`ContainerRuntime`]: per-container and per-volume calls
//!   ([`DockerRuntime`] in production).
//! - [`ManifestApplier`]: "make the runtime match the manifest"
//!   ([`ComposeCli`] in production).
//!
//! [`SimulatedRuntime`] implements both in memory.
//!
//! Cleanup steps are idempotent: removing something that is already gone is
//! success. [`ignore_not_found`] and [`best_effort`] encode that contract.

mod compose;
mod docker;
mod simulated;
mod r#trait;

pub use compose::ComposeCli;
pub use docker::DockerRuntime;
pub use r#trait::{ContainerRuntime, ManifestApplier};
pub use simulated::{RuntimeCall, SimulatedRuntime};

use tracing::{debug, warn};

use crate::error::Result;

/// Treats a not-found error as success.
///
/// Returns `Ok(true)` if the call did its work and `Ok(false)` if the target
/// was already gone.
pub fn ignore_not_found(result: Result<()>, target: &str) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => {
            debug!(target_name = %target, "Already absent");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Runs a step whose failure must not abort the surrounding procedure.
///
/// Not-found is silent; any other error is logged and swallowed.
pub fn best_effort<T>(result: Result<T>, step: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) if e.is_not_found() => {
            debug!(step = %step, error = %e, "Skipped, target not found");
            None
        }
        Err(e) => {
            warn!(step = %step, error = %e, "Step failed, continuing");
            None
        }
    }
}
