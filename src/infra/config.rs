//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument (parsed by the binary)
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Where telemetry comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// One finite batch replayed from a JSONL file
    File,
    /// Continuous stream from an MQTT topic
    Mqtt,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SiteConfig {
    /// Unique site identifier
    #[serde(default = "default_site_id")]
    pub id: String,
}

fn default_site_id() -> String {
    "geofence".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_mode")]
    pub mode: SourceMode,
    /// JSONL telemetry file used in `file` mode
    #[serde(default = "default_telemetry_file")]
    pub telemetry_file: String,
    /// Upper bound for one batch run
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            mode: default_source_mode(),
            telemetry_file: default_telemetry_file(),
            run_timeout_secs: default_run_timeout_secs(),
        }
    }
}

fn default_source_mode() -> SourceMode {
    SourceMode::File
}

fn default_telemetry_file() -> String {
    "telemetry.jsonl".to_string()
}

fn default_run_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            topic: "telemetry/#".to_string(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZonesConfig {
    /// JSON zone catalog (zones + per-unit assignments)
    #[serde(default = "default_catalog_file")]
    pub catalog_file: String,
    /// Proximity threshold for polylines without their own (meters)
    #[serde(default = "default_polyline_threshold_m")]
    pub polyline_threshold_m: f64,
}

impl Default for ZonesConfig {
    fn default() -> Self {
        Self {
            catalog_file: default_catalog_file(),
            polyline_threshold_m: default_polyline_threshold_m(),
        }
    }
}

fn default_catalog_file() -> String {
    "config/zones.json".to_string()
}

fn default_polyline_threshold_m() -> f64 {
    crate::domain::zone::DEFAULT_POLYLINE_THRESHOLD_M
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    /// File path for the transition journal (JSONL format)
    #[serde(default = "default_egress_file")]
    pub file: String,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self { file: default_egress_file() }
    }
}

fn default_egress_file() -> String {
    "transitions.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttEgressConfig {
    /// Enable MQTT egress publishing
    #[serde(default = "default_mqtt_egress_enabled")]
    pub enabled: bool,
    /// Topic for persisted transitions (QoS 1)
    #[serde(default = "default_transitions_topic")]
    pub transitions_topic: String,
    /// Topic for periodic metrics snapshots (QoS 0)
    #[serde(default = "default_metrics_topic")]
    pub metrics_topic: String,
    /// Interval for publishing metrics (seconds)
    #[serde(default = "default_metrics_publish_interval")]
    pub metrics_publish_interval_secs: u64,
}

impl Default for MqttEgressConfig {
    fn default() -> Self {
        Self {
            enabled: default_mqtt_egress_enabled(),
            transitions_topic: default_transitions_topic(),
            metrics_topic: default_metrics_topic(),
            metrics_publish_interval_secs: default_metrics_publish_interval(),
        }
    }
}

fn default_mqtt_egress_enabled() -> bool {
    false
}

fn default_transitions_topic() -> String {
    "geofence/transitions".to_string()
}

fn default_metrics_topic() -> String {
    "geofence/metrics".to_string()
}

fn default_metrics_publish_interval() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Shard workers in streaming mode
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Queue capacity per shard
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// Message-type tag stamped on transitions
    #[serde(default = "default_message_type")]
    pub message_type: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_size: default_queue_size(),
            message_type: default_message_type(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_queue_size() -> usize {
    1024
}

fn default_message_type() -> u8 {
    crate::services::transition::DEFAULT_MESSAGE_TYPE
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: 10, prometheus_port: default_prometheus_port() }
    }
}

fn default_prometheus_port() -> u16 {
    9090
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub zones: ZonesConfig,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default)]
    pub mqtt_egress: MqttEgressConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    source_mode: SourceMode,
    telemetry_file: String,
    run_timeout_secs: u64,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_topic: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    catalog_file: String,
    polyline_threshold_m: f64,
    egress_file: String,
    mqtt_egress_enabled: bool,
    mqtt_egress_transitions_topic: String,
    mqtt_egress_metrics_topic: String,
    mqtt_egress_metrics_interval_secs: u64,
    workers: usize,
    queue_size: usize,
    message_type: u8,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(
            TomlConfig {
                site: SiteConfig { id: default_site_id() },
                source: SourceConfig::default(),
                mqtt: MqttConfig::default(),
                zones: ZonesConfig::default(),
                egress: EgressConfig::default(),
                mqtt_egress: MqttEgressConfig::default(),
                pipeline: PipelineConfig::default(),
                metrics: MetricsConfig::default(),
            },
            "default".to_string(),
        )
    }
}

impl Config {
    /// Determine config file path from the CLI value or environment
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            site_id: toml_config.site.id,
            source_mode: toml_config.source.mode,
            telemetry_file: toml_config.source.telemetry_file,
            run_timeout_secs: toml_config.source.run_timeout_secs,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_topic: toml_config.mqtt.topic,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            catalog_file: toml_config.zones.catalog_file,
            polyline_threshold_m: toml_config.zones.polyline_threshold_m,
            egress_file: toml_config.egress.file,
            mqtt_egress_enabled: toml_config.mqtt_egress.enabled,
            mqtt_egress_transitions_topic: toml_config.mqtt_egress.transitions_topic,
            mqtt_egress_metrics_topic: toml_config.mqtt_egress.metrics_topic,
            mqtt_egress_metrics_interval_secs: toml_config
                .mqtt_egress
                .metrics_publish_interval_secs,
            workers: toml_config.pipeline.workers.max(1),
            queue_size: toml_config.pipeline.queue_size.max(1),
            message_type: toml_config.pipeline.message_type,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            prometheus_port: toml_config.metrics.prometheus_port,
            config_file,
        }
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(cli_path: Option<&str>) -> Self {
        Self::load_from_path(Self::resolve_config_path(cli_path))
    }

    /// Load from an explicit path, falling back to defaults on any error
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn source_mode(&self) -> SourceMode {
        self.source_mode
    }

    pub fn telemetry_file(&self) -> &str {
        &self.telemetry_file
    }

    pub fn run_timeout_secs(&self) -> u64 {
        self.run_timeout_secs
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_topic(&self) -> &str {
        &self.mqtt_topic
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn catalog_file(&self) -> &str {
        &self.catalog_file
    }

    pub fn polyline_threshold_m(&self) -> f64 {
        self.polyline_threshold_m
    }

    pub fn egress_file(&self) -> &str {
        &self.egress_file
    }

    pub fn mqtt_egress_enabled(&self) -> bool {
        self.mqtt_egress_enabled
    }

    pub fn mqtt_egress_transitions_topic(&self) -> &str {
        &self.mqtt_egress_transitions_topic
    }

    pub fn mqtt_egress_metrics_topic(&self) -> &str {
        &self.mqtt_egress_metrics_topic
    }

    pub fn mqtt_egress_metrics_interval_secs(&self) -> u64 {
        self.mqtt_egress_metrics_interval_secs
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn queue_size(&self) -> usize {
        self.queue_size
    }

    pub fn message_type(&self) -> u8 {
        self.message_type
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to point at a specific catalog and journal
    pub fn with_files(mut self, catalog_file: &str, egress_file: &str) -> Self {
        self.catalog_file = catalog_file.to_string();
        self.egress_file = egress_file.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.site_id(), "geofence");
        assert_eq!(config.source_mode(), SourceMode::File);
        assert_eq!(config.run_timeout_secs(), 300);
        assert_eq!(config.mqtt_host(), "localhost");
        assert_eq!(config.mqtt_port(), 1883);
        assert_eq!(config.polyline_threshold_m(), 50.0);
        assert_eq!(config.message_type(), 1);
        assert_eq!(config.workers(), 4);
        assert!(!config.mqtt_egress_enabled());
        assert_eq!(config.config_file(), "default");
    }

    #[test]
    fn test_resolve_config_path_default() {
        if env::var("CONFIG_FILE").is_err() {
            assert_eq!(Config::resolve_config_path(None), "config/dev.toml");
        }
    }

    #[test]
    fn test_resolve_config_path_from_cli() {
        assert_eq!(Config::resolve_config_path(Some("config/prod.toml")), "config/prod.toml");
    }

    #[test]
    fn test_egress_file_default() {
        let egress = EgressConfig::default();
        assert_eq!(egress.file, "transitions.jsonl");
        assert_eq!(Config::default().egress_file(), "transitions.jsonl");
    }

    #[test]
    fn test_zero_workers_clamped() {
        let toml_config: TomlConfig = toml::from_str("[pipeline]\nworkers = 0\n").unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.workers(), 1);
        assert_eq!(config.queue_size(), 1024);
    }
}
