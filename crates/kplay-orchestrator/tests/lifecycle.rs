//! End-to-end topology lifecycle against the simulated runtime.

use std::sync::Arc;

use kplay_orchestrator::runtime::ManifestApplier;
use kplay_orchestrator::{
    ConfigValidator, DisconnectedAdmin, ManifestStore, PlaygroundConfig, PlaygroundError,
    ResetPhase, SimulatedRuntime, StatusAggregator, TopologyManager,
};
use tempfile::TempDir;

const BASELINE: &str = r#"services:
  zookeeper:
    image: confluentinc/cp-zookeeper:7.5.0
    container_name: zookeeper
  kafka1:
    image: confluentinc/cp-kafka:7.5.0
    container_name: kafka1
    hostname: kafka1
    depends_on:
      - zookeeper
    ports:
      - "9092:9092"
    environment:
      KAFKA_BROKER_ID: 1
      KAFKA_ZOOKEEPER_CONNECT: zookeeper:2181
      KAFKA_ADVERTISED_LISTENERS: PLAINTEXT://kafka1:29092,PLAINTEXT_HOST://localhost:9092
    volumes:
      - kafka1-data:/var/lib/kafka/data
  kafka2:
    image: confluentinc/cp-kafka:7.5.0
    container_name: kafka2
    ports:
      - "9093:9092"
    environment:
      KAFKA_BROKER_ID: 2
      KAFKA_ADVERTISED_LISTENERS: PLAINTEXT://kafka2:29092,PLAINTEXT_HOST://localhost:9093
  kafka3:
    image: confluentinc/cp-kafka:7.5.0
    container_name: kafka3
    ports:
      - "9094:9092"
    environment:
      KAFKA_BROKER_ID: 3
      KAFKA_ADVERTISED_LISTENERS: PLAINTEXT://kafka3:29092,PLAINTEXT_HOST://localhost:9094
  kafka-ui:
    image: provectuslabs/kafka-ui
    container_name: kafka-ui
    ports:
      - "8080:8080"
volumes:
  kafka1-data:
"#;

struct Playground {
    _dir: TempDir,
    config: PlaygroundConfig,
    store: Arc<ManifestStore>,
    runtime: Arc<SimulatedRuntime>,
    manager: TopologyManager,
}

async fn playground() -> Playground {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("docker-compose.yml");
    std::fs::write(&path, BASELINE).unwrap();

    let config = PlaygroundConfig::builder()
        .manifest_path(&path)
        .project_dir(dir.path())
        .reset_grace_ms(0)
        .probe_host_ports(false)
        .build();
    let store = Arc::new(ManifestStore::new(&path));
    let runtime = Arc::new(SimulatedRuntime::with_manifest(
        store.clone(),
        config.project.clone(),
    ));
    runtime.up(&[], false).await.unwrap();

    let manager =
        TopologyManager::new(config.clone(), store.clone(), runtime.clone(), runtime.clone())
            .unwrap();
    Playground {
        _dir: dir,
        config,
        store,
        runtime,
        manager,
    }
}

#[tokio::test]
async fn test_named_cluster_lifecycle() {
    let pg = playground().await;
    let status = StatusAggregator::new(
        &pg.config,
        pg.store.clone(),
        pg.runtime.clone(),
        Arc::new(DisconnectedAdmin),
    )
    .unwrap();

    let first = pg.manager.create_cluster("teamA").await.unwrap();
    let second = pg.manager.add_broker("teamA").await.unwrap();
    assert_eq!(first.broker_name, "kafka-teamA-1");
    assert_eq!(second.broker_name, "kafka-teamA-2");
    assert_eq!(first.port, Some(9095));
    assert_eq!(second.port, Some(9096));

    let team = status.cluster_status("teamA").await.unwrap();
    assert_eq!(team.broker_count, 2);
    assert_eq!(team.kafka_servers, "kafka-teamA-1:29092,kafka-teamA-2:29092");

    let clusters = status.list_clusters().await.unwrap();
    assert_eq!(clusters.len(), 2);
    assert_eq!(clusters[1].brokers, 2);

    let report = ConfigValidator::new(pg.config.validation.clone())
        .validate_store(&pg.store)
        .await
        .unwrap();
    assert!(report.valid, "unexpected issues: {:?}", report.messages());

    let removed = pg.manager.delete_cluster("teamA").await.unwrap();
    assert_eq!(removed.services, vec!["kafka-teamA-1", "kafka-teamA-2"]);
    assert_eq!(status.list_clusters().await.unwrap().len(), 1);
    assert!(pg.runtime.container_state("kafka-teamA-1").await.is_none());
}

#[tokio::test]
async fn test_reset_restores_baseline() {
    let pg = playground().await;
    pg.manager.add_broker("default").await.unwrap();
    pg.manager.create_cluster("teamB").await.unwrap();

    let handle = pg.manager.reset().unwrap();
    let report = handle.wait().await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.outcomes.len(), ResetPhase::STEPS.len());

    let services = pg.store.read(|m| m.service_names()).await.unwrap();
    assert_eq!(
        services,
        vec!["zookeeper", "kafka1", "kafka2", "kafka3", "kafka-ui"]
    );
    assert!(!pg.manager.is_resetting());

    let again = pg.manager.add_broker("default").await.unwrap();
    assert_eq!(again.broker_name, "kafka4");
}

#[tokio::test]
async fn test_guards_leave_manifest_untouched() {
    let pg = playground().await;
    let before = std::fs::read_to_string(pg.store.path()).unwrap();

    assert!(matches!(
        pg.manager.delete_broker("1").await,
        Err(PlaygroundError::Protected(_))
    ));
    assert!(matches!(
        pg.manager.create_cluster("team-a").await,
        Err(PlaygroundError::InvalidName { .. })
    ));
    assert!(matches!(
        pg.manager.delete_cluster("ghost").await,
        Err(PlaygroundError::ClusterNotFound(_))
    ));

    assert_eq!(std::fs::read_to_string(pg.store.path()).unwrap(), before);
}
