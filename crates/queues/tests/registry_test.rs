//! Snapshot files and deployment configs on disk.

use std::path::PathBuf;

use feedbus_queues::{
    FeedbusConfig, MessageBrokerQueue, QueueEntry, RegistrySnapshot, TopologyChange,
};

fn scratch_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("feedbus-{}-{name}", uuid::Uuid::new_v4()))
}

#[test]
fn snapshot_file_roundtrip() {
    let path = scratch_path("queues.json");
    let snapshot = RegistrySnapshot::current();
    snapshot.write_to(&path).unwrap();

    let loaded = RegistrySnapshot::read_from(&path).unwrap();
    assert_eq!(loaded, snapshot);
    for queue in MessageBrokerQueue::ALL {
        assert_eq!(loaded.lookup(queue.name()), Some(queue.routing_key()));
    }

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn deployed_snapshot_with_old_routing_key_is_breaking() {
    let mut deployed = RegistrySnapshot::current();
    for entry in &mut deployed.queues {
        if entry.name == "FeedDeliverArticles" {
            entry.routing_key = "feed.deliver".into();
        }
    }

    let changes = deployed.diff(&RegistrySnapshot::current());
    assert_eq!(
        changes,
        vec![TopologyChange::RoutingKeyChanged {
            name: "FeedDeliverArticles".into(),
            from: "feed.deliver".into(),
            to: "feed.deliver-articles".into(),
        }]
    );
    assert!(changes.iter().any(TopologyChange::is_breaking));
}

#[test]
fn deployed_snapshot_missing_a_queue_only_adds() {
    let mut deployed = RegistrySnapshot::current();
    deployed
        .queues
        .retain(|e| e.name != "SyncSupporterDiscordRoles");

    let changes = deployed.diff(&RegistrySnapshot::current());
    assert_eq!(changes.len(), 1);
    assert!(!changes[0].is_breaking());
}

#[test]
fn corrupted_snapshot_is_rejected() {
    let path = scratch_path("dup.json");
    let mut snapshot = RegistrySnapshot::current();
    snapshot.queues.push(QueueEntry {
        name: "FeedDeletedAgain".into(),
        routing_key: "feed.deleted".into(),
    });
    std::fs::write(&path, serde_json::to_string(&snapshot).unwrap()).unwrap();

    assert!(RegistrySnapshot::read_from(&path).is_err());

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn config_file_loads() {
    let path = scratch_path("feedbus.toml");
    std::fs::write(
        &path,
        r#"
[broker]
frontend = "tcp://127.0.0.1:7000"
backend = "tcp://127.0.0.1:7001"
health = "tcp://127.0.0.1:7002"

[services.supporters]
publishes = ["sync-supporter-discord-roles"]
consumes = ["sync-supporter-discord-roles"]
"#,
    )
    .unwrap();

    let cfg = FeedbusConfig::from_file(&path).unwrap();
    assert_eq!(
        cfg.published_by("supporters").unwrap().unwrap(),
        vec![MessageBrokerQueue::SyncSupporterDiscordRoles]
    );

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn missing_config_file_is_io_error() {
    let err = FeedbusConfig::from_file(scratch_path("absent.toml")).unwrap_err();
    assert!(matches!(err, feedbus_queues::BusError::Io(_)));
}

#[test]
fn shipped_deployment_config_is_valid() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config/feedbus.toml");
    let cfg = FeedbusConfig::from_file(path).unwrap();
    assert!(cfg.unproduced_queues().is_empty());
    for queue in MessageBrokerQueue::ALL {
        assert!(
            !cfg.consumers_of(queue).is_empty(),
            "{queue} has no consumer in the shipped config"
        );
    }
}
