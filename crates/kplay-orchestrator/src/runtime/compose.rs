//! Compose CLI applier.
//!
//! Shells out to the configured compose command in the project directory,
//! pointing it at the manifest file. Each invocation is bounded by a timeout
//! and killed if it overruns.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::PlaygroundConfig;
use crate::error::{PlaygroundError, Result};
use crate::runtime::ManifestApplier;

/// Applies the manifest with `docker-compose` (or a compatible command).
#[derive(Debug, Clone)]
pub struct ComposeCli {
    command: Vec<String>,
    manifest_path: PathBuf,
    project_dir: PathBuf,
    service_timeout: Duration,
    full_timeout: Duration,
}

impl ComposeCli {
    /// Creates an applier from the playground configuration.
    pub fn new(config: &PlaygroundConfig) -> Result<Self> {
        if config.runtime.compose_command.is_empty() {
            return Err(PlaygroundError::configuration("compose_command must not be empty"));
        }
        Ok(Self {
            command: config.runtime.compose_command.clone(),
            manifest_path: config.manifest.path.clone(),
            project_dir: config.manifest.project_dir.clone(),
            service_timeout: config.runtime.compose_timeout(),
            full_timeout: config.runtime.start_all_timeout(),
        })
    }

    fn up_args(services: &[String], remove_orphans: bool) -> Vec<String> {
        let mut args = vec!["up".to_string(), "-d".to_string()];
        if remove_orphans {
            args.push("--remove-orphans".to_string());
        }
        args.extend(services.iter().cloned());
        args
    }

    fn down_args(remove_volumes: bool, remove_orphans: bool) -> Vec<String> {
        let mut args = vec!["down".to_string()];
        if remove_volumes {
            args.push("-v".to_string());
        }
        if remove_orphans {
            args.push("--remove-orphans".to_string());
        }
        args
    }

    async fn run(&self, args: Vec<String>, limit: Duration) -> Result<()> {
        let (program, base) = self
            .command
            .split_first()
            .ok_or_else(|| PlaygroundError::configuration("compose_command must not be empty"))?;

        let mut cmd = Command::new(program);
        cmd.args(base)
            .arg("-f")
            .arg(&self.manifest_path)
            .args(&args)
            .current_dir(&self.project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let command_line = format!("{} {}", self.command.join(" "), args.join(" "));
        debug!(command = %command_line, timeout = ?limit, "Running compose");

        let output = match timeout(limit, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(command = %command_line, error = %e, "Failed to launch compose");
                return Err(PlaygroundError::compose_failed(command_line, e.to_string()));
            }
            Err(_) => {
                warn!(command = %command_line, timeout = ?limit, "Compose timed out");
                return Err(PlaygroundError::timeout(command_line));
            }
        };

        if output.status.success() {
            info!(command = %command_line, "Compose succeeded");
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = format!("{}: {}", output.status, stderr.trim());
            warn!(command = %command_line, reason = %reason, "Compose failed");
            Err(PlaygroundError::compose_failed(command_line, reason))
        }
    }
}

#[async_trait]
impl ManifestApplier for ComposeCli {
    async fn up(&self, services: &[String], remove_orphans: bool) -> Result<()> {
        let limit = if services.is_empty() {
            self.full_timeout
        } else {
            self.service_timeout
        };
        self.run(Self::up_args(services, remove_orphans), limit).await
    }

    async fn down(&self, remove_volumes: bool, remove_orphans: bool) -> Result<()> {
        self.run(Self::down_args(remove_volumes, remove_orphans), self.full_timeout)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_up_args() {
        assert_eq!(
            ComposeCli::up_args(&["kafka4".to_string()], false),
            vec!["up", "-d", "kafka4"]
        );
        assert_eq!(ComposeCli::up_args(&[], true), vec!["up", "-d", "--remove-orphans"]);
    }

    #[test]
    fn test_down_args() {
        assert_eq!(
            ComposeCli::down_args(true, true),
            vec!["down", "-v", "--remove-orphans"]
        );
        assert_eq!(ComposeCli::down_args(false, false), vec!["down"]);
    }

    #[test]
    fn test_empty_command_rejected() {
        let config = PlaygroundConfig::builder().compose_command(vec![]).build();
        assert!(ComposeCli::new(&config).is_err());
    }

    #[cfg(unix)]
    fn cli(command: &[&str], timeout_secs: u64) -> ComposeCli {
        let mut config = PlaygroundConfig::builder()
            .compose_command(command.iter().map(|s| s.to_string()).collect())
            .project_dir(std::env::temp_dir())
            .build();
        config.runtime.compose_timeout_secs = timeout_secs;
        ComposeCli::new(&config).unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_command() {
        cli(&["true"], 5).up(&["kafka4".to_string()], false).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command() {
        let err = cli(&["false"], 5).up(&["kafka4".to_string()], false).await.unwrap_err();
        assert!(matches!(err, PlaygroundError::ComposeFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_timeout() {
        let err = cli(&["sh", "-c", "sleep 5"], 0)
            .up(&["kafka4".to_string()], false)
            .await
            .unwrap_err();
        assert!(matches!(err, PlaygroundError::Timeout { .. }));
    }
}
