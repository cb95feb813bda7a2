//! Topology procedures: add, delete, start, stop and reset.
//!
//! Each procedure reads the manifest, computes the change, writes it back,
//! then asks the runtime to catch up. Runtime steps are best-effort: a
//! timeout or a missing container is logged and the procedure carries on,
//! because the manifest is the desired state and the next full apply
//! reconciles whatever lagged behind. Manifest writes are the exception and
//! fail the procedure.

mod engine;
mod reset;

pub use engine::{BrokerDescriptor, RemovalReport, TopologyManager};
pub use reset::{PhaseOutcome, ResetHandle, ResetPhase, ResetProgress, ResetReport};
