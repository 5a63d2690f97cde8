//! IO modules - external system interfaces
//!
//! - `mqtt` - MQTT client for receiving unit telemetry
//! - `mqtt_egress` - MQTT publisher for transitions and metrics
//! - `egress_channel` - Typed channel for MQTT egress messages
//! - `egress` - Transition journal (JSONL format)
//! - `telemetry` - Telemetry decoding and JSONL replay
//! - `zone_catalog` - Zone catalog file and in-memory state table
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod egress;
pub mod egress_channel;
pub mod mqtt;
pub mod mqtt_egress;
pub mod prometheus;
pub mod telemetry;
pub mod zone_catalog;

// Re-export commonly used types
pub use egress::{TransitionJournal, TransitionRecord};
pub use egress_channel::{create_egress_channel, EgressMessage, EgressSender, MetricsPayload};
pub use mqtt_egress::MqttPublisher;
pub use telemetry::{decode_telemetry, JsonlTelemetry};
pub use zone_catalog::{MemoryStore, ZoneCatalog};
