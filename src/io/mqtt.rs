//! MQTT client for receiving unit telemetry

use crate::domain::error::SourceError;
use crate::domain::types::TelemetryRecord;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::telemetry::decode_telemetry;
use crate::services::dispatcher::{DispatchOutcome, Dispatcher};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Decode one MQTT payload into a telemetry record
pub fn parse_telemetry_payload(payload: &[u8]) -> Result<TelemetryRecord, SourceError> {
    let json_str = std::str::from_utf8(payload)
        .map_err(|e| SourceError::Decode(format!("invalid UTF-8: {e}")))?;
    decode_telemetry(json_str)
}

/// Start the MQTT client and dispatch decoded records to the shard workers
///
/// Dispatch never blocks the eventloop; full shard queues drop records.
/// Undecodable payloads are counted and logged (rate-limited).
pub async fn start_mqtt_client(
    config: &Config,
    mut dispatcher: Dispatcher,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let client_id = format!("geofence-engine-{}", std::process::id());
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    // Set credentials if configured
    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    client.subscribe(config.mqtt_topic(), QoS::AtMostOnce).await?;

    info!(topic = %config.mqtt_topic(), host = %config.mqtt_host(), port = %config.mqtt_port(), "mqtt_subscribed");

    // Rate-limit decode warnings to 1 per second
    let mut last_decode_warn = Instant::now() - Duration::from_secs(2);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("mqtt_shutdown");
                    return Ok(());
                }
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let record = match parse_telemetry_payload(&publish.payload) {
                            Ok(record) => record,
                            Err(e) => {
                                metrics.record_decode_failure();
                                if last_decode_warn.elapsed() > Duration::from_secs(1) {
                                    warn!(topic = %publish.topic, error = %e, "telemetry_decode_failed");
                                    last_decode_warn = Instant::now();
                                }
                                continue;
                            }
                        };

                        debug!(unit = %record.unit, lat = %record.point.lat, lon = %record.point.lon, "telemetry_received");
                        if dispatcher.dispatch(record) == DispatchOutcome::Closed {
                            warn!("shard_queue_closed");
                            return Ok(());
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "mqtt_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}
