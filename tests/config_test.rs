//! Configuration system tests.

use meterflow_lib::cli::Cli;
use meterflow_lib::core::{Config, ConfigBuilder, LogLevel, RoleConfig};
use pretty_assertions::assert_eq;
use std::io::Write;
use std::time::Duration;

fn cli_with_file(path: std::path::PathBuf) -> Cli {
    Cli {
        config: Some(path),
        node_address: None,
        flush_interval_ms: None,
        debug: false,
        check_config: false,
        demo: false,
        demo_rate: 500,
        local_cluster: false,
    }
}

#[test]
fn test_default_config() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.node.address, "127.0.0.1:11800");
    assert!(config.cluster.peers.is_empty());
    assert_eq!(config.aggregation.flush_interval, Duration::from_secs(3));
    assert_eq!(config.aggregation.mailbox_capacity, 512);
    assert_eq!(config.aggregation.max_identities_per_generation, 1000);
    assert_eq!(config.logging.level, LogLevel::Info);
}

#[test]
fn test_config_builder() {
    let config = ConfigBuilder::new()
        .node_address("10.0.0.2:11800")
        .peers(vec!["10.0.0.1:11800".to_string(), "10.0.0.2:11800".to_string()])
        .flush_interval(Duration::from_millis(500))
        .mailbox_capacity(128)
        .max_identities(50)
        .role(RoleConfig::new("service_calls", true))
        .debug(true)
        .build()
        .unwrap();

    assert_eq!(config.cluster.peers.len(), 2);
    assert_eq!(config.aggregation.flush_interval, Duration::from_millis(500));
    assert_eq!(config.aggregation.mailbox_capacity, 128);
    assert_eq!(config.aggregation.max_identities_per_generation, 50);
    assert_eq!(config.logging.level, LogLevel::Debug);
}

#[tokio::test]
async fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
node:
  address: "10.0.0.1:11800"
cluster:
  peers: ["10.0.0.1:11800", "10.0.0.2:11800"]
aggregation:
  flush_interval: 250ms
  drain_poll_interval: 2ms
roles:
  - name: service_calls
  - name: service_calls_l1
    need_merge_with_storage: false
    forward_to: service_calls
    mailbox_capacity: 2048
logging:
  level: warn
  structured: true
"#
    )
    .unwrap();

    let config = cli_with_file(file.path().to_path_buf()).load_config().await.unwrap();

    assert_eq!(config.node.address, "10.0.0.1:11800");
    assert_eq!(config.aggregation.flush_interval, Duration::from_millis(250));
    assert_eq!(config.aggregation.drain_poll_interval, Duration::from_millis(2));
    let l1 = config.role("service_calls_l1").unwrap();
    assert_eq!(l1.forward_to.as_deref(), Some("service_calls"));
    assert_eq!(l1.mailbox_capacity(&config.aggregation), 2048);
    assert_eq!(config.logging.level, LogLevel::Warn);
    assert!(config.logging.structured);
}

#[tokio::test]
async fn test_cli_overrides_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "aggregation:\n  flush_interval: 10s\n").unwrap();

    let cli = Cli {
        node_address: Some("192.168.1.7:11800".to_string()),
        flush_interval_ms: Some(100),
        ..cli_with_file(file.path().to_path_buf())
    };
    let config = cli.load_config().await.unwrap();

    assert_eq!(config.node.address, "192.168.1.7:11800");
    assert_eq!(config.aggregation.flush_interval, Duration::from_millis(100));
}

#[tokio::test]
async fn test_invalid_file_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "roles:\n  - name: a\n  - name: a\n").unwrap();

    let err = cli_with_file(file.path().to_path_buf()).load_config().await.unwrap_err();
    assert_eq!(err.category(), "config");
}
