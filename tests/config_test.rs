//! Integration tests for configuration loading

use geofence_engine::infra::{Config, SourceMode};
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[site]
id = "test-site"

[source]
mode = "mqtt"
telemetry_file = "replay/day1.jsonl"
run_timeout_secs = 60

[mqtt]
host = "test-host"
port = 1884
topic = "units/+/telemetry"
username = "engine"
password = "secret"

[zones]
catalog_file = "data/zones.json"
polyline_threshold_m = 25.0

[egress]
file = "out/transitions.jsonl"

[mqtt_egress]
enabled = true
transitions_topic = "test/transitions"

[pipeline]
workers = 8
queue_size = 256
message_type = 3

[metrics]
interval_secs = 15
prometheus_port = 9091
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "test-site");
    assert_eq!(config.source_mode(), SourceMode::Mqtt);
    assert_eq!(config.telemetry_file(), "replay/day1.jsonl");
    assert_eq!(config.run_timeout_secs(), 60);
    assert_eq!(config.mqtt_host(), "test-host");
    assert_eq!(config.mqtt_port(), 1884);
    assert_eq!(config.mqtt_topic(), "units/+/telemetry");
    assert_eq!(config.mqtt_username(), Some("engine"));
    assert_eq!(config.mqtt_password(), Some("secret"));
    assert_eq!(config.catalog_file(), "data/zones.json");
    assert_eq!(config.polyline_threshold_m(), 25.0);
    assert_eq!(config.egress_file(), "out/transitions.jsonl");
    assert!(config.mqtt_egress_enabled());
    assert_eq!(config.mqtt_egress_transitions_topic(), "test/transitions");
    assert_eq!(config.mqtt_egress_metrics_topic(), "geofence/metrics");
    assert_eq!(config.workers(), 8);
    assert_eq!(config.queue_size(), 256);
    assert_eq!(config.message_type(), 3);
    assert_eq!(config.metrics_interval_secs(), 15);
    assert_eq!(config.prometheus_port(), 9091);
    assert_eq!(config.config_file(), temp_file.path().display().to_string());
}

#[test]
fn test_partial_file_keeps_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[zones]\ncatalog_file = \"z.json\"\n").unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config.catalog_file(), "z.json");
    assert_eq!(config.polyline_threshold_m(), 50.0);
    assert_eq!(config.source_mode(), SourceMode::File);
    assert_eq!(config.run_timeout_secs(), 300);
}

#[test]
fn test_invalid_file_is_an_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[source]\nmode = \"carrier-pigeon\"\n").unwrap();
    temp_file.flush().unwrap();

    assert!(Config::from_file(temp_file.path()).is_err());
    assert_eq!(Config::load_from_path(temp_file.path()).config_file(), "default");
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.mqtt_host(), "localhost");
    assert_eq!(config.mqtt_port(), 1883);
    assert_eq!(config.source_mode(), SourceMode::File);
    assert_eq!(config.config_file(), "default");
}

#[test]
fn test_load_prefers_cli_path() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[site]\nid = \"cli-site\"\n").unwrap();
    temp_file.flush().unwrap();

    let path = temp_file.path().to_str().unwrap();
    let config = Config::load(Some(path));
    assert_eq!(config.site_id(), "cli-site");
    assert_eq!(config.config_file(), path);
}
