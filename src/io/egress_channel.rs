//! Typed channel for MQTT egress messages
//!
//! Provides a non-blocking way to send transitions and metrics to the MQTT
//! publisher. Uses bounded mpsc channels to prevent unbounded memory growth.

use crate::domain::types::epoch_ms;
use crate::infra::metrics::{MetricsSummary, METRICS_NUM_BUCKETS};
use crate::io::egress::TransitionRecord;
use serde::Serialize;
use tokio::sync::mpsc;

/// Messages that can be sent to the MQTT publisher
#[derive(Debug)]
pub enum EgressMessage {
    /// Persisted transition
    Transition(TransitionRecord),
    /// Periodic metrics snapshot
    Metrics(MetricsPayload),
}

/// Payload for metrics snapshot
#[derive(Debug, Serialize)]
pub struct MetricsPayload {
    pub site: String,
    /// Timestamp (epoch ms)
    pub ts: u64,
    pub records_total: u64,
    pub records_per_sec: f64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub lat_buckets: [u64; METRICS_NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p95_us: u64,
    pub lat_p99_us: u64,
    pub zones_evaluated: u64,
    pub transitions_inside: u64,
    pub transitions_outside: u64,
    pub malformed_zones: u64,
    pub unsupported_zones: u64,
    pub undefined_centers: u64,
    pub persist_failures: u64,
    pub records_dropped: u64,
}

impl MetricsPayload {
    pub fn from_summary(summary: MetricsSummary, site: String) -> Self {
        Self {
            site,
            ts: epoch_ms(),
            records_total: summary.records_total,
            records_per_sec: summary.records_per_sec,
            avg_latency_us: summary.avg_process_latency_us,
            max_latency_us: summary.max_process_latency_us,
            lat_buckets: summary.lat_buckets,
            lat_p50_us: summary.lat_p50_us,
            lat_p95_us: summary.lat_p95_us,
            lat_p99_us: summary.lat_p99_us,
            zones_evaluated: summary.zones_evaluated,
            transitions_inside: summary.transitions_inside,
            transitions_outside: summary.transitions_outside,
            malformed_zones: summary.malformed_zones,
            unsupported_zones: summary.unsupported_zones,
            undefined_centers: summary.undefined_centers,
            persist_failures: summary.persist_failures,
            records_dropped: summary.records_dropped,
        }
    }
}

/// Sender handle for egress messages
///
/// Clone this to share across shard workers.
/// Non-blocking - if the channel is full, messages are dropped.
#[derive(Clone)]
pub struct EgressSender {
    tx: mpsc::Sender<EgressMessage>,
    site_id: String,
}

impl EgressSender {
    pub fn new(tx: mpsc::Sender<EgressMessage>, site_id: String) -> Self {
        Self { tx, site_id }
    }

    /// Offer a persisted transition; returns false if it was dropped
    pub fn send_transition(&self, mut record: TransitionRecord) -> bool {
        record.site = Some(self.site_id.clone());
        self.tx.try_send(EgressMessage::Transition(record)).is_ok()
    }

    /// Send a metrics snapshot
    pub fn send_metrics(&self, summary: MetricsSummary) {
        let payload = MetricsPayload::from_summary(summary, self.site_id.clone());
        let _ = self.tx.try_send(EgressMessage::Metrics(payload));
    }
}

/// Create a new egress channel pair
///
/// Returns (sender, receiver) where sender can be cloned and shared.
/// site_id is stamped on every transition for downstream consumers.
pub fn create_egress_channel(
    buffer_size: usize,
    site_id: String,
) -> (EgressSender, mpsc::Receiver<EgressMessage>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (EgressSender::new(tx, site_id), rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::metrics::Metrics;

    fn record() -> TransitionRecord {
        TransitionRecord {
            id: "0190".to_string(),
            site: None,
            zone_id: 5,
            unit: "U1".to_string(),
            date_gps: "01-Jan-2024 00:00:00".to_string(),
            event_gps: "1".to_string(),
            lat: 10.0,
            lon: 20.0,
            geo_event: 1,
            message_type: 1,
            ts: 0,
        }
    }

    #[tokio::test]
    async fn test_transition_gets_site() {
        let (sender, mut rx) = create_egress_channel(4, "lima".to_string());
        assert!(sender.send_transition(record()));

        match rx.recv().await {
            Some(EgressMessage::Transition(r)) => {
                assert_eq!(r.site.as_deref(), Some("lima"));
                assert_eq!(r.zone_id, 5);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_full_channel_drops() {
        let (sender, _rx) = create_egress_channel(1, "lima".to_string());
        assert!(sender.send_transition(record()));
        assert!(!sender.send_transition(record()));
    }

    #[tokio::test]
    async fn test_metrics_payload() {
        let (sender, mut rx) = create_egress_channel(4, "lima".to_string());
        let metrics = Metrics::new();
        metrics.record_processed(150);
        metrics.record_transition(true);
        sender.send_metrics(metrics.report());

        match rx.recv().await {
            Some(EgressMessage::Metrics(p)) => {
                assert_eq!(p.site, "lima");
                assert_eq!(p.records_total, 1);
                assert_eq!(p.transitions_inside, 1);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
