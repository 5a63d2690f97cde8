//! Infrastructure - configuration and metrics
//!
//! - `config` - TOML configuration loading
//! - `metrics` - Lock-free metrics collection and reporting

pub mod config;
pub mod metrics;

pub use config::{Config, SourceMode};
pub use metrics::{Metrics, MetricsSummary};
