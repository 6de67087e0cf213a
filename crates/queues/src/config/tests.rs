use std::collections::HashMap;

use super::types::FeedbusConfig;
use crate::queue::MessageBrokerQueue;
use crate::transport::Transport;

const PIPELINE_TOML: &str = r#"
[broker]
frontend = "tcp://10.0.0.1:5555"
backend = "tcp://10.0.0.1:5556"
health = "tcp://10.0.0.1:5557"
metrics_port = 9090

[services.feed-requests]
publishes = ["url.fetch.completed", "url.failing", "url.failed.disable-feeds", "url.rejected.disable-feeds"]
consumes = ["url.fetch-batch"]

[services.user-feeds]
publishes = ["url.fetch-batch", "feed.deliver-articles", "feed.deleted"]
consumes = ["url.failing", "url.failed.disable-feeds", "url.rejected.disable-feeds", "feed.rejected-article.disable-connection", "feed.rejected.disable-feed"]

[services.feed-handler]
publishes = ["feed.rejected-article.disable-connection", "feed.rejected.disable-feed"]
consumes = ["url.fetch.completed", "feed.deliver-articles", "feed.deleted"]
"#;

#[test]
fn parse_minimal_toml() {
    let cfg = FeedbusConfig::from_toml("[broker]\n").unwrap();
    assert!(cfg.broker.frontend.contains("broker-frontend"));
    assert!(cfg.broker.reject_unregistered);
    assert!(cfg.services.is_empty());
}

#[test]
fn parse_empty_document_uses_defaults() {
    let cfg = FeedbusConfig::from_toml("").unwrap();
    assert_eq!(cfg.broker.health, "ipc:///tmp/feedbus/broker-health.sock");
}

#[test]
fn parse_pipeline_toml() {
    let cfg = FeedbusConfig::from_toml(PIPELINE_TOML).unwrap();
    assert_eq!(cfg.broker.metrics_port, Some(9090));
    assert_eq!(cfg.services.len(), 3);

    assert_eq!(
        cfg.consumed_by("feed-requests").unwrap().unwrap(),
        vec![MessageBrokerQueue::UrlFetchBatch]
    );
    assert!(cfg.published_by("unknown-service").is_none());
}

#[test]
fn producers_and_consumers() {
    let cfg = FeedbusConfig::from_toml(PIPELINE_TOML).unwrap();
    assert_eq!(
        cfg.producers_of(MessageBrokerQueue::FeedDeleted),
        vec!["user-feeds"]
    );
    assert_eq!(
        cfg.consumers_of(MessageBrokerQueue::UrlFetchCompleted),
        vec!["feed-handler"]
    );
    assert!(cfg
        .producers_of(MessageBrokerQueue::SyncSupporterDiscordRoles)
        .is_empty());
}

#[test]
fn unknown_routing_key_is_rejected() {
    let toml = r#"
[services.feed-handler]
consumes = ["feed.deliver-article"]
"#;
    let err = FeedbusConfig::from_toml(toml).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("feed-handler"), "{msg}");
    assert!(msg.contains("feed.deliver-article"), "{msg}");
}

#[test]
fn symbolic_name_is_not_a_routing_key() {
    let toml = r#"
[services.user-feeds]
publishes = ["FeedDeleted"]
"#;
    assert!(FeedbusConfig::from_toml(toml).is_err());
}

#[test]
fn duplicate_queue_in_service_is_rejected() {
    let toml = r#"
[services.user-feeds]
publishes = ["feed.deleted", "feed.deleted"]
"#;
    let err = FeedbusConfig::from_toml(toml).unwrap_err();
    assert!(err.to_string().contains("twice"));
}

#[test]
fn invalid_endpoint_is_rejected() {
    let toml = r#"
[broker]
frontend = "amqp://localhost:5672"
"#;
    let err = FeedbusConfig::from_toml(toml).unwrap_err();
    assert!(err.to_string().contains("broker.frontend"));
}

#[test]
fn shared_endpoint_is_rejected() {
    let toml = r#"
[broker]
frontend = "tcp://127.0.0.1:5555"
backend = "tcp://127.0.0.1:5555"
"#;
    assert!(FeedbusConfig::from_toml(toml).is_err());
}

#[test]
fn unproduced_queues_are_reported() {
    let toml = r#"
[services.supporters]
consumes = ["sync-supporter-discord-roles"]
"#;
    let cfg = FeedbusConfig::from_toml(toml).unwrap();
    assert_eq!(
        cfg.unproduced_queues(),
        vec![MessageBrokerQueue::SyncSupporterDiscordRoles]
    );

    let cfg = FeedbusConfig::from_toml(PIPELINE_TOML).unwrap();
    assert!(cfg.unproduced_queues().is_empty());
}

#[test]
fn overrides_replace_broker_fields() {
    let vars: HashMap<&str, &str> = [
        ("FEEDBUS_BROKER_FRONTEND", "tcp://override:9999"),
        ("FEEDBUS_BROKER_METRICS_PORT", "7777"),
        ("FEEDBUS_BROKER_REJECT_UNREGISTERED", "false"),
    ]
    .into_iter()
    .collect();

    let mut cfg = FeedbusConfig::local();
    cfg.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

    assert_eq!(cfg.broker.frontend, "tcp://override:9999");
    assert_eq!(cfg.broker.metrics_port, Some(7777));
    assert!(!cfg.broker.reject_unregistered);
    assert!(cfg.broker.backend.contains("broker-backend"));
}

#[test]
fn invalid_override_values_are_ignored() {
    let mut cfg = FeedbusConfig::local();
    cfg.apply_overrides(|k| match k {
        "FEEDBUS_BROKER_METRICS_PORT" => Some("not-a-port".into()),
        "FEEDBUS_BROKER_REJECT_UNREGISTERED" => Some("maybe".into()),
        _ => None,
    });
    assert_eq!(cfg.broker.metrics_port, None);
    assert!(cfg.broker.reject_unregistered);
}

#[test]
fn local_config_defaults() {
    let cfg = FeedbusConfig::local();
    assert!(cfg.broker.frontend.starts_with("ipc://"));
    assert!(cfg.validate().is_ok());
}

#[test]
fn distributed_config() {
    let cfg = FeedbusConfig::distributed("10.0.0.5", 6000).unwrap();
    assert_eq!(cfg.broker.frontend, "tcp://10.0.0.5:6000");
    assert_eq!(cfg.broker.backend, "tcp://10.0.0.5:6001");
    assert_eq!(cfg.broker.health, "tcp://10.0.0.5:6002");
    assert_eq!(cfg.broker.metrics_port, Some(6003));
    assert!(cfg.validate().is_ok());
}

#[test]
fn broker_config_resolution() {
    let cfg = FeedbusConfig::from_toml(PIPELINE_TOML).unwrap();
    let broker = cfg.broker_config().unwrap();
    assert_eq!(broker.frontend, Transport::tcp("10.0.0.1", 5555));
    assert_eq!(broker.backend, Transport::tcp("10.0.0.1", 5556));
    assert_eq!(broker.metrics_port, Some(9090));
    assert_eq!(
        cfg.broker_backend_transport().unwrap().endpoint(),
        "tcp://10.0.0.1:5556"
    );
}

#[test]
fn distributed_config_near_port_ceiling() {
    let cfg = FeedbusConfig::distributed("10.0.0.5", 65532).unwrap();
    assert_eq!(cfg.broker.metrics_port, Some(65535));

    for base_port in [65533, 65534, u16::MAX] {
        let err = FeedbusConfig::distributed("10.0.0.5", base_port).unwrap_err();
        assert!(err.to_string().contains("base port"), "{err}");
    }
}

#[test]
fn ipc_endpoints_sharing_a_file_name_are_rejected() {
    let toml = r#"
[broker]
frontend = "ipc:///var/run/a/bus.sock"
backend = "ipc:///opt/b/bus.sock"
"#;
    let err = FeedbusConfig::from_toml(toml).unwrap_err();
    assert!(err.to_string().contains("broker.frontend"), "{err}");
}

#[test]
fn endpoints_resolving_to_one_socket_are_rejected() {
    let mut cfg = FeedbusConfig::local();
    cfg.broker.frontend = "tcp://10.0.0.1:5555".into();
    cfg.broker.backend = "tcp://10.0.0.1:5556".into();
    cfg.broker.health = "tcp://10.0.0.1:5555".into();
    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("broker.health"), "{err}");
}

#[test]
fn from_toml_ignores_environment() {
    // Parsing a string never consults FEEDBUS_BROKER_* variables.
    let cfg = FeedbusConfig::from_toml(PIPELINE_TOML).unwrap();
    assert_eq!(cfg.broker.frontend, "tcp://10.0.0.1:5555");
    assert_eq!(cfg.broker.metrics_port, Some(9090));
}
