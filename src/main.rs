//! Geofence engine - zone membership and transition detection
//!
//! Evaluates unit telemetry against each unit's assigned zones and persists
//! a transition whenever a unit enters or leaves a zone.
//!
//! Module structure:
//! - `domain/` - Core types (Point, Zone, TelemetryRecord, TransitionEvent)
//! - `io/` - External interfaces (zone catalog, journal, MQTT, Prometheus)
//! - `services/` - Evaluation (membership, transitions, pipeline, run drivers)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use geofence_engine::infra::{Config, Metrics, SourceMode};
use geofence_engine::io::{
    create_egress_channel, EgressSender, JsonlTelemetry, MemoryStore, MqttPublisher,
    TransitionJournal,
};
use geofence_engine::services::{create_dispatcher, run_batch, spawn_workers, EvaluationPipeline};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Geofence engine - zone entry/exit detection for unit telemetry
#[derive(Parser, Debug)]
#[command(name = "geofence-engine", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git_hash = %env!("GIT_HASH"), "geofence-engine starting");

    let args = Args::parse();
    let config = Config::load(args.config.as_deref());

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        source_mode = ?config.source_mode(),
        catalog_file = %config.catalog_file(),
        egress_file = %config.egress_file(),
        polyline_threshold_m = %config.polyline_threshold_m(),
        message_type = %config.message_type(),
        workers = %config.workers(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics = Arc::new(Metrics::new());

    // Zone catalog doubles as state table; transitions are journaled before the table moves
    let store = Arc::new(
        MemoryStore::load(config.catalog_file())
            .context("Failed to load zone catalog")?
            .with_journal(TransitionJournal::new(config.egress_file())),
    );

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_site = config.site_id().to_string();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = geofence_engine::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_site,
                prom_shutdown,
            )
            .await
            {
                error!(error = %e, "prometheus_server_error");
            }
        });
    }

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Create MQTT egress channel and publisher (if enabled)
    let egress_sender = if config.mqtt_egress_enabled() {
        let (egress_sender, egress_rx) = create_egress_channel(1000, config.site_id().to_string());

        let publisher = MqttPublisher::new(&config, egress_rx);
        let publisher_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            publisher.run(publisher_shutdown).await;
        });

        // Metrics egress reads a snapshot so the log reporter keeps its window
        let metrics_egress = egress_sender.clone();
        let metrics_for_egress = metrics.clone();
        let egress_interval = config.mqtt_egress_metrics_interval_secs().max(1);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(egress_interval));
            loop {
                interval.tick().await;
                metrics_egress.send_metrics(metrics_for_egress.snapshot());
            }
        });

        Some(egress_sender)
    } else {
        None
    };

    let result = match config.source_mode() {
        SourceMode::File => {
            run_file(&config, store, metrics.clone(), egress_sender, shutdown_tx.clone(), shutdown_rx).await
        }
        SourceMode::Mqtt => run_mqtt(&config, store, metrics.clone(), egress_sender, shutdown_rx).await,
    };

    let _ = shutdown_tx.send(true);
    metrics.report().log();

    match &result {
        Ok(()) => info!("geofence-engine shutdown complete"),
        Err(e) => error!(error = %format!("{e:#}"), "geofence-engine stopped with error"),
    }
    result
}

/// One batch run over the telemetry file, bounded by the run timeout
async fn run_file(
    config: &Config,
    store: Arc<MemoryStore>,
    metrics: Arc<Metrics>,
    egress_sender: Option<EgressSender>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let telemetry = JsonlTelemetry::open(config.telemetry_file())
        .context("Failed to open telemetry source")?;
    let mut pipeline = EvaluationPipeline::new(store.clone(), store, config, metrics, egress_sender);

    // Stop pulling records once shutdown is signalled (timeout or Ctrl+C)
    let stop = shutdown_rx.clone();
    let records = telemetry.take_while(move |_| !*stop.borrow());
    let mut batch = tokio::task::spawn_blocking(move || run_batch(&mut pipeline, records));

    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = ctrl_c_tx.send(true);
    });

    let run_timeout = Duration::from_secs(config.run_timeout_secs());
    let joined = match tokio::time::timeout(run_timeout, &mut batch).await {
        Ok(joined) => joined,
        Err(_) => {
            warn!(timeout_secs = %config.run_timeout_secs(), "batch_run_timed_out");
            let _ = shutdown_tx.send(true);
            batch.await
        }
    };

    let summary = joined.context("Batch task panicked")??;
    info!(
        records = %summary.records,
        transitions = %summary.transitions,
        zone_failures = %summary.zone_failures,
        skipped = %summary.skipped,
        "batch_summary"
    );
    Ok(())
}

/// Stream telemetry from MQTT until Ctrl+C or a fatal shard failure
async fn run_mqtt(
    config: &Config,
    store: Arc<MemoryStore>,
    metrics: Arc<Metrics>,
    egress_sender: Option<EgressSender>,
    shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let (dispatcher, workers, mut fatal_rx) =
        create_dispatcher(config.workers(), config.queue_size(), metrics.clone(), || {
            EvaluationPipeline::new(
                store.clone(),
                store.clone(),
                config,
                metrics.clone(),
                egress_sender.clone(),
            )
        });
    let worker_handles = spawn_workers(workers);
    info!(workers = %worker_handles.len(), "shard_workers_started");

    let mqtt_config = config.clone();
    let mqtt_metrics = metrics.clone();
    let (mqtt_stop_tx, mqtt_stop_rx) = watch::channel(false);
    let mqtt_handle = tokio::spawn(async move {
        if let Err(e) = geofence_engine::io::mqtt::start_mqtt_client(
            &mqtt_config,
            dispatcher,
            mqtt_metrics,
            mqtt_stop_rx,
        )
        .await
        {
            error!(error = %e, "mqtt_client_error");
        }
    });

    let mut shutdown = shutdown_rx;
    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown_signal_received");
            Ok(())
        }
        _ = shutdown.changed() => Ok(()),
        failure = fatal_rx.recv() => match failure {
            Some(f) => Err(anyhow::Error::new(f.error)
                .context(format!("Shard {} stopped", f.shard))),
            None => Ok(()),
        },
    };

    // Stopping the client drops the dispatcher, which closes every shard queue
    let _ = mqtt_stop_tx.send(true);
    let _ = mqtt_handle.await;
    for handle in worker_handles {
        let _ = handle.await;
    }

    result
}
