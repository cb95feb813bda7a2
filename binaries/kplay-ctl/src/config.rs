//! CLI configuration.
//!
//! A TOML file with two sections: `[playground]` (the orchestrator's own
//! settings) and `[logging]`. CLI flags override file values.

use kplay_orchestrator::PlaygroundConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// kplay-ctl configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CtlConfig {
    /// Topology manager settings.
    pub playground: PlaygroundConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Log format (pretty, json, compact).
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl CtlConfig {
    /// Loads configuration from a file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merges CLI arguments into the configuration.
    pub fn merge_cli_args(&mut self, args: &super::CliArgs) {
        if let Some(ref manifest) = args.manifest {
            self.playground.manifest.path = manifest.clone();
            if args.project_dir.is_none() {
                if let Some(parent) = manifest.parent().filter(|p| !p.as_os_str().is_empty()) {
                    self.playground.manifest.project_dir = parent.to_path_buf();
                }
            }
        }

        if let Some(ref dir) = args.project_dir {
            self.playground.manifest.project_dir = dir.clone();
        }

        if let Some(ref project) = args.project_name {
            self.playground.project.name = project.clone();
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("Invalid log level: {}", self.logging.level);
        }

        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            anyhow::bail!("Invalid log format: {}", self.logging.format);
        }

        self.playground.validate()?;
        Ok(())
    }

    /// Returns the manifest path in use.
    pub fn manifest_path(&self) -> &PathBuf {
        &self.playground.manifest.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = CtlConfig::default();

        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.manifest_path(), &PathBuf::from("/app/docker-compose.yml"));
        assert_eq!(config.playground.ports.start_port, 9095);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = CtlConfig::default();
        assert!(config.validate().is_ok());

        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
        config.logging.level = "info".to_string();

        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
        config.logging.format = "json".to_string();

        config.playground.ports.max_probes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[playground.manifest]
path = "/srv/playground/docker-compose.yml"

[playground.ports]
start_port = 19000
strict = false

[logging]
level = "debug"
"#
        )
        .unwrap();

        let config = CtlConfig::from_file(file.path()).unwrap();
        assert_eq!(
            config.manifest_path(),
            &PathBuf::from("/srv/playground/docker-compose.yml")
        );
        assert_eq!(config.playground.ports.start_port, 19000);
        assert!(!config.playground.ports.strict);
        assert_eq!(config.playground.ports.max_probes, 100);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "compact");
    }

    #[test]
    fn test_config_serialization() {
        let config = CtlConfig::default();
        let toml_str = toml::to_string(&config).unwrap();

        let parsed: CtlConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.playground, config.playground);
    }
}
