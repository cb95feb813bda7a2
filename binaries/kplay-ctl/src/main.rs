//! kplay-ctl - operator CLI for the Kafka playground topology manager.
//!
//! Every command prints a JSON envelope (`{"success": true, ...}` or
//! `{"success": false, "error": "..."}`) on stdout and exits non-zero on
//! failure. Logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # List clusters declared in the manifest
//! kplay-ctl clusters
//!
//! # Create a named cluster and grow it
//! kplay-ctl create-cluster teamA
//! kplay-ctl add-broker teamA
//!
//! # Use another manifest and a configuration file
//! kplay-ctl --config kplay.toml --manifest ./docker-compose.yml status
//!
//! # Return to the baseline topology
//! kplay-ctl reset
//! ```

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::CtlConfig;
use kplay_orchestrator::{
    ApiResponse, ConfigValidator, DisconnectedAdmin, ManifestStore, NewTopic, PlaygroundError,
    ResetAck, StatusAggregator, TopicService, TopologyManager, TopologyResolver,
};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// CLI arguments for kplay-ctl.
#[derive(Parser, Debug)]
#[command(
    name = "kplay-ctl",
    about = "Manage clusters and brokers of the Kafka playground",
    version
)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Compose manifest to manage.
    #[arg(short, long, value_name = "FILE")]
    manifest: Option<PathBuf>,

    /// Directory compose runs in (defaults to the manifest's directory).
    #[arg(long, value_name = "DIR")]
    project_dir: Option<PathBuf>,

    /// Compose project name.
    #[arg(long, value_name = "NAME")]
    project_name: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Enable JSON log output.
    #[arg(long)]
    json_logs: bool,

    /// Print the effective configuration and exit.
    #[arg(long)]
    print_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// List clusters with their broker counts.
    Clusters,
    /// Create a named cluster with one broker.
    CreateCluster {
        /// Cluster name (alphanumeric).
        name: String,
    },
    /// Delete every broker of a named cluster.
    DeleteCluster {
        /// Cluster name.
        name: String,
    },
    /// Show live status of a cluster.
    Status {
        /// Cluster name.
        #[arg(default_value = "default")]
        cluster: String,
    },
    /// Add the next broker to a cluster.
    AddBroker {
        /// Cluster name.
        #[arg(default_value = "default")]
        cluster: String,
    },
    /// Delete a broker by service name or default-cluster id.
    DeleteBroker {
        /// Broker service name, or a bare id for the default cluster.
        broker: String,
    },
    /// Start a broker container.
    StartBroker {
        /// Broker service name, or a bare id for the default cluster.
        broker: String,
    },
    /// Stop a broker container.
    StopBroker {
        /// Broker service name, or a bare id for the default cluster.
        broker: String,
    },
    /// Stop one cluster's brokers, or the whole playground.
    Stop {
        /// Cluster to stop; everything when omitted.
        cluster: Option<String>,
    },
    /// Bring up every service in the manifest.
    Start,
    /// Trim the manifest to its baseline and rebuild the runtime.
    Reset,
    /// Check the manifest for port collisions and busy host ports.
    Validate,
    /// Topic administration.
    ///
    /// This build ships no broker admin client, so every topic command
    /// answers 503 (admin unavailable). Embed the library with your own
    /// `AdminConnector` to manage topics.
    #[command(subcommand)]
    Topics(TopicCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum TopicCommand {
    /// List user topics.
    List {
        /// Cluster name.
        #[arg(default_value = "default")]
        cluster: String,
    },
    /// Create a topic.
    Create {
        /// Topic name.
        name: String,
        /// Cluster name.
        #[arg(long, default_value = "default")]
        cluster: String,
        /// Partition count.
        #[arg(long, default_value_t = 3)]
        partitions: u32,
        /// Replication factor.
        #[arg(long, default_value_t = 1)]
        replication_factor: u16,
    },
    /// Delete a topic.
    Delete {
        /// Topic name.
        name: String,
        /// Cluster name.
        #[arg(long, default_value = "default")]
        cluster: String,
    },
}

/// Prints the envelope for `result` and returns its status code.
fn render<T: Serialize>(result: kplay_orchestrator::Result<T>) -> Result<u16> {
    let response = ApiResponse::from_result(result);
    println!(
        "{}",
        serde_json::to_string_pretty(&response).context("Failed to encode response")?
    );
    Ok(response.status_code())
}

/// Logs reset progress until it reaches a final phase.
async fn follow_reset(progress: &mut watch::Receiver<kplay_orchestrator::reconcile::ResetProgress>) {
    loop {
        let current = progress.borrow_and_update().clone();
        if current.phase.is_finished() {
            return;
        }
        info!(phase = current.phase.description(), done = current.completed.len(), "Reset running");
        if progress.changed().await.is_err() {
            return;
        }
    }
}

async fn run_reset(manager: &TopologyManager) -> Result<u16> {
    let handle = match manager.reset() {
        Ok(handle) => handle,
        Err(e) => return render::<ResetAck>(Err(e)),
    };
    render(Ok(ResetAck::default()))?;

    let mut progress = handle.subscribe();
    tokio::select! {
        _ = signal::ctrl_c() => {
            warn!("Interrupted, cancelling reset before its next phase");
            handle.cancel();
        }
        _ = follow_reset(&mut progress) => {}
    }

    let report = handle.wait().await;
    let clean = matches!(report, Ok(ref r) if r.is_clean());
    let status = render(report)?;
    Ok(if clean { status } else { status.max(500) })
}

async fn validate(config: &CtlConfig) -> Result<u16> {
    let store = ManifestStore::new(config.manifest_path());
    let report = ConfigValidator::new(config.playground.validation.clone())
        .validate_store(&store)
        .await;
    let valid = matches!(report, Ok(ref r) if r.valid);
    let status = render(report)?;
    Ok(if valid { status } else { status.max(400) })
}

/// Topic commands only need the manifest and the admin boundary.
async fn run_topics(command: TopicCommand, config: &CtlConfig) -> Result<u16> {
    let store = Arc::new(ManifestStore::new(config.manifest_path()));
    let resolver = TopologyResolver::from_config(&config.playground.topology)?;
    let service = TopicService::new(store, resolver, Arc::new(DisconnectedAdmin));

    match command {
        TopicCommand::List { cluster } => render(
            service
                .list_topics(&cluster)
                .await
                .map(|topics| json!({ "topics": topics })),
        ),
        TopicCommand::Create {
            name,
            cluster,
            partitions,
            replication_factor,
        } => {
            let topic = NewTopic::new(name)
                .with_partitions(partitions)
                .with_replication_factor(replication_factor);
            render(
                service
                    .create_topic(&cluster, &topic)
                    .await
                    .map(|()| json!({ "message": format!("Topic {} created", topic.name) })),
            )
        }
        TopicCommand::Delete { name, cluster } => render(
            service
                .delete_topic(&cluster, &name)
                .await
                .map(|()| json!({ "message": format!("Topic {} deleted", name) })),
        ),
    }
}

async fn execute(command: Command, config: &CtlConfig) -> Result<u16> {
    let playground = &config.playground;

    match command {
        Command::Validate => return validate(config).await,
        Command::Topics(topics) => return run_topics(topics, config).await,
        _ => {}
    }

    let manager = match TopologyManager::connect(playground.clone()).await {
        Ok(manager) => manager,
        Err(e) => return render::<serde_json::Value>(Err(e)),
    };
    let status = StatusAggregator::new(
        playground,
        manager.store().clone(),
        manager.runtime().clone(),
        Arc::new(DisconnectedAdmin),
    )?;

    match command {
        Command::Clusters => render(
            status
                .list_clusters()
                .await
                .map(|clusters| json!({ "clusters": clusters })),
        ),
        Command::CreateCluster { name } => render(manager.create_cluster(&name).await),
        Command::DeleteCluster { name } => render(manager.delete_cluster(&name).await),
        Command::Status { cluster } => render(status.cluster_status(&cluster).await),
        Command::AddBroker { cluster } => render(manager.add_broker(&cluster).await),
        Command::DeleteBroker { broker } => render(manager.delete_broker(&broker).await),
        Command::StartBroker { broker } => render(
            manager
                .start_broker(&broker)
                .await
                .map(|()| json!({ "message": format!("Broker {} started", broker) })),
        ),
        Command::StopBroker { broker } => render(
            manager
                .stop_broker(&broker)
                .await
                .map(|()| json!({ "message": format!("Broker {} stopped", broker) })),
        ),
        Command::Stop { cluster } => render(
            manager
                .stop_cluster(cluster.as_deref())
                .await
                .map(|stopped| json!({ "stopped": stopped })),
        ),
        Command::Start => render(
            manager
                .start_cluster()
                .await
                .map(|()| json!({ "message": "All services started" })),
        ),
        Command::Reset => run_reset(&manager).await,
        Command::Validate | Command::Topics(_) => {
            render::<serde_json::Value>(Err(PlaygroundError::validation("unsupported command")))
        }
    }
}

/// Initialize the tracing subscriber. Output goes to stderr so stdout stays JSON.
fn init_tracing(config: &config::LoggingConfig, json_logs: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("Failed to parse log filter")?;

    let format = if json_logs || config.format == "json" {
        "json"
    } else {
        &config.format
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
        "pretty" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = CliArgs::parse();

    let mut config = if let Some(ref config_path) = args.config {
        CtlConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        CtlConfig::default()
    };

    config.merge_cli_args(&args);

    if args.print_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(ExitCode::SUCCESS);
    }

    config.validate().context("Invalid configuration")?;

    init_tracing(&config.logging, args.json_logs)?;

    let Some(command) = args.command.clone() else {
        anyhow::bail!("No command given, see --help");
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        manifest = %config.manifest_path().display(),
        command = ?command,
        "kplay-ctl starting"
    );

    let status = execute(command, &config).await?;
    Ok(if status < 400 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_args_parsing() {
        let args = CliArgs::parse_from(["kplay-ctl", "clusters"]);
        assert!(args.config.is_none());
        assert!(!args.json_logs);
        assert_eq!(args.command, Some(Command::Clusters));
    }

    #[test]
    fn test_cli_args_with_options() {
        let args = CliArgs::parse_from([
            "kplay-ctl",
            "--manifest",
            "/srv/pg/docker-compose.yml",
            "--log-level",
            "debug",
            "--json-logs",
            "add-broker",
            "teamA",
        ]);

        assert_eq!(args.manifest, Some(PathBuf::from("/srv/pg/docker-compose.yml")));
        assert_eq!(args.log_level, Some("debug".to_string()));
        assert!(args.json_logs);
        assert_eq!(
            args.command,
            Some(Command::AddBroker {
                cluster: "teamA".to_string()
            })
        );
    }

    #[test]
    fn test_command_defaults() {
        let args = CliArgs::parse_from(["kplay-ctl", "status"]);
        assert_eq!(
            args.command,
            Some(Command::Status {
                cluster: "default".to_string()
            })
        );

        let args = CliArgs::parse_from(["kplay-ctl", "stop"]);
        assert_eq!(args.command, Some(Command::Stop { cluster: None }));

        let args = CliArgs::parse_from(["kplay-ctl", "topics", "create", "orders", "--partitions", "6"]);
        assert_eq!(
            args.command,
            Some(Command::Topics(TopicCommand::Create {
                name: "orders".to_string(),
                cluster: "default".to_string(),
                partitions: 6,
                replication_factor: 1,
            }))
        );
    }

    #[test]
    fn test_config_merge() {
        let mut config = CtlConfig::default();
        let args = CliArgs::parse_from([
            "kplay-ctl",
            "--manifest",
            "/srv/pg/docker-compose.yml",
            "--project-name",
            "pg",
            "validate",
        ]);

        config.merge_cli_args(&args);

        assert_eq!(config.manifest_path(), &PathBuf::from("/srv/pg/docker-compose.yml"));
        assert_eq!(config.playground.manifest.project_dir, PathBuf::from("/srv/pg"));
        assert_eq!(config.playground.project.name, "pg");
    }

    #[tokio::test]
    async fn test_validate_without_runtime() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("docker-compose.yml");
        std::fs::write(
            &path,
            "services:\n  kafka1:\n    ports: [\"9092:9092\"]\n  kafka2:\n    ports: [\"9092:9092\"]\n",
        )
        .unwrap();

        let mut config = CtlConfig::default();
        config.playground.manifest.path = path;
        config.playground.validation.probe_host_ports = false;

        let status = execute(Command::Validate, &config).await.unwrap();
        assert_eq!(status, 400);
    }

    #[tokio::test]
    async fn test_topics_report_admin_unavailable() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("docker-compose.yml");
        std::fs::write(&path, "services:\n  zookeeper:\n    image: zk\n").unwrap();

        let mut config = CtlConfig::default();
        config.playground.manifest.path = path;

        let list = TopicCommand::List {
            cluster: "default".to_string(),
        };
        let status = execute(Command::Topics(list), &config).await.unwrap();
        assert_eq!(status, 503);
    }

    #[test]
    fn test_topics_help_mentions_admin_client() {
        use clap::CommandFactory;

        let mut cmd = CliArgs::command();
        let topics = cmd.find_subcommand_mut("topics").unwrap();
        let help = topics.render_long_help().to_string();
        assert!(help.contains("no broker admin client"));
    }
}
