//! Background reset to the baseline topology.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::PlaygroundConfig;
use crate::error::{PlaygroundError, Result};
use crate::manifest::ManifestStore;
use crate::runtime::{best_effort, ContainerRuntime, ManifestApplier};

/// Steps of a reset, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetPhase {
    /// Waiting out the grace delay.
    Pending,
    /// Trimming the manifest to the baseline.
    CleaningConfig,
    /// Tearing down everything the manifest declares.
    StoppingContainers,
    /// Removing leftover containers, volumes and networks.
    PruningResources,
    /// Bringing the baseline back up.
    RestartingServices,
    /// All phases ran.
    Completed,
    /// Stopped early on request.
    Cancelled,
}

impl ResetPhase {
    /// The phases that do work, in order.
    pub const STEPS: [ResetPhase; 4] = [
        Self::CleaningConfig,
        Self::StoppingContainers,
        Self::PruningResources,
        Self::RestartingServices,
    ];

    /// Operator-facing description of the phase.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Pending => "Waiting to start",
            Self::CleaningConfig => "Cleaning config",
            Self::StoppingContainers => "Stopping containers",
            Self::PruningResources => "Pruning resources",
            Self::RestartingServices => "Restarting services",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Returns true once no further phases will run.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Result of one reset phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseOutcome {
    /// The phase.
    pub phase: ResetPhase,
    /// Whether every step of the phase succeeded.
    pub ok: bool,
    /// What went wrong, if anything.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Snapshot of a running reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetProgress {
    /// Phase currently running (or the final state).
    pub phase: ResetPhase,
    /// Phases finished so far.
    pub completed: Vec<PhaseOutcome>,
}

/// Final result of a reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetReport {
    /// Outcome of every phase that ran.
    pub outcomes: Vec<PhaseOutcome>,
    /// Whether the reset stopped early.
    pub cancelled: bool,
}

impl ResetReport {
    /// Returns true if every phase ran and succeeded.
    pub fn is_clean(&self) -> bool {
        !self.cancelled && self.outcomes.iter().all(|o| o.ok)
    }
}

/// Handle to a reset running in the background.
///
/// Dropping the handle does not stop the reset.
#[derive(Debug)]
pub struct ResetHandle {
    progress: watch::Receiver<ResetProgress>,
    cancel: Arc<AtomicBool>,
    task: JoinHandle<ResetReport>,
}

impl ResetHandle {
    /// Returns the latest progress snapshot.
    pub fn progress(&self) -> ResetProgress {
        self.progress.borrow().clone()
    }

    /// Returns a receiver that observes every progress change.
    pub fn subscribe(&self) -> watch::Receiver<ResetProgress> {
        self.progress.clone()
    }

    /// Asks the reset to stop before its next phase.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    /// Waits for the reset to finish.
    pub async fn wait(self) -> Result<ResetReport> {
        self.task
            .await
            .map_err(|e| PlaygroundError::runtime_unavailable(format!("reset task failed: {}", e)))
    }
}

/// Clears the in-flight flag however the task ends.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Everything the background task needs, owned.
pub(crate) struct ResetTask {
    pub(crate) config: PlaygroundConfig,
    pub(crate) store: Arc<ManifestStore>,
    pub(crate) runtime: Arc<dyn ContainerRuntime>,
    pub(crate) applier: Arc<dyn ManifestApplier>,
    pub(crate) mutation_lock: Arc<Mutex<()>>,
    pub(crate) in_flight: Arc<AtomicBool>,
}

impl ResetTask {
    /// Spawns the reset. The caller must already have set `in_flight`.
    pub(crate) fn spawn(self) -> ResetHandle {
        let (tx, rx) = watch::channel(ResetProgress {
            phase: ResetPhase::Pending,
            completed: Vec::new(),
        });
        let cancel = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(self.run(tx, cancel.clone()));

        ResetHandle {
            progress: rx,
            cancel,
            task,
        }
    }

    async fn run(self, tx: watch::Sender<ResetProgress>, cancel: Arc<AtomicBool>) -> ResetReport {
        let _in_flight = InFlight(self.in_flight.clone());

        tokio::time::sleep(self.config.reset.grace()).await;
        let _guard = self.mutation_lock.lock().await;
        info!("Starting reset");

        let mut outcomes = Vec::new();
        for phase in ResetPhase::STEPS {
            if cancel.load(Ordering::Acquire) {
                warn!(next = ?phase, "Reset cancelled");
                tx.send_replace(ResetProgress {
                    phase: ResetPhase::Cancelled,
                    completed: outcomes.clone(),
                });
                return ResetReport {
                    outcomes,
                    cancelled: true,
                };
            }

            tx.send_replace(ResetProgress {
                phase,
                completed: outcomes.clone(),
            });
            let outcome = self.run_phase(phase).await;
            if !outcome.ok {
                warn!(phase = ?phase, detail = ?outcome.detail, "Reset phase had failures");
            }
            outcomes.push(outcome);
        }

        info!(clean = outcomes.iter().all(|o| o.ok), "Reset finished");
        tx.send_replace(ResetProgress {
            phase: ResetPhase::Completed,
            completed: outcomes.clone(),
        });
        ResetReport {
            outcomes,
            cancelled: false,
        }
    }

    async fn run_phase(&self, phase: ResetPhase) -> PhaseOutcome {
        let result = match phase {
            ResetPhase::CleaningConfig => self.clean_config().await,
            ResetPhase::StoppingContainers => self.applier.down(true, true).await,
            ResetPhase::PruningResources => self.prune().await,
            ResetPhase::RestartingServices => self.applier.up(&[], false).await,
            ResetPhase::Pending | ResetPhase::Completed | ResetPhase::Cancelled => Ok(()),
        };
        match result {
            Ok(()) => PhaseOutcome {
                phase,
                ok: true,
                detail: None,
            },
            Err(e) => {
                error!(phase = ?phase, error = %e, "Reset phase failed");
                PhaseOutcome {
                    phase,
                    ok: false,
                    detail: Some(e.to_string()),
                }
            }
        }
    }

    async fn clean_config(&self) -> Result<()> {
        let services: HashSet<&str> = self
            .config
            .reset
            .baseline_services
            .iter()
            .map(String::as_str)
            .collect();
        let volumes: HashSet<&str> = self
            .config
            .reset
            .baseline_volumes
            .iter()
            .map(String::as_str)
            .collect();

        let (removed_services, removed_volumes) = self
            .store
            .update(|manifest| {
                Ok((
                    manifest.retain_services(|name| services.contains(name)),
                    manifest.retain_volumes(|name| volumes.contains(name)),
                ))
            })
            .await?;

        info!(
            services = ?removed_services,
            volumes = ?removed_volumes,
            "Trimmed manifest to baseline"
        );
        Ok(())
    }

    fn is_playground_resource(&self, name: &str) -> bool {
        name.contains(self.config.project.name.as_str())
            || name.starts_with(self.config.topology.broker_prefix.as_str())
    }

    async fn prune(&self) -> Result<()> {
        let mut failures = Vec::new();

        let containers = self.runtime.list_containers(true).await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to list containers");
            failures.push("list containers".to_string());
            Vec::new()
        });
        for container in containers
            .iter()
            .filter(|c| self.is_playground_resource(&c.name))
        {
            let step = format!("remove container {}", container.name);
            if let Err(e) = self.runtime.remove_container(&container.name, true).await {
                if !e.is_not_found() {
                    warn!(container = %container.name, error = %e, "Failed to remove container");
                    failures.push(step);
                }
            }
        }

        let volumes = self.runtime.list_volumes().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to list volumes");
            failures.push("list volumes".to_string());
            Vec::new()
        });
        for volume in volumes.iter().filter(|v| self.is_playground_resource(&v.name)) {
            let step = format!("remove volume {}", volume.name);
            if let Err(e) = self.runtime.remove_volume(&volume.name, true).await {
                if !e.is_not_found() {
                    warn!(volume = %volume.name, error = %e, "Failed to remove volume");
                    failures.push(step);
                }
            }
        }

        if best_effort(self.runtime.prune_networks().await, "prune networks").is_none() {
            failures.push("prune networks".to_string());
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PlaygroundError::runtime_unavailable(format!(
                "failed steps: {}",
                failures.join(", ")
            )))
        }
    }
}
