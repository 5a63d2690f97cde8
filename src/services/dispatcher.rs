//! Sharded dispatch of streamed telemetry
//!
//! Each shard worker owns one EvaluationPipeline and consumes its own
//! bounded queue. A unit always hashes to the same shard, so its records are
//! evaluated in arrival order while different units run in parallel.
//! Evaluation calls synchronous collaborators, so each record is processed
//! under `block_in_place` to keep the runtime's reactor responsive.

use crate::domain::types::{TelemetryRecord, UnitId};
use crate::infra::metrics::Metrics;
use crate::services::pipeline::{EvaluationPipeline, PipelineError};
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Result of handing a record to its shard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Queued,
    /// Shard queue full; record dropped
    Dropped,
    /// Shard worker has stopped
    Closed,
}

/// Fatal failure reported by a shard worker before it stops
#[derive(Debug)]
pub struct ShardFailure {
    pub shard: usize,
    pub error: PipelineError,
}

/// Routes records to shard workers by unit
pub struct Dispatcher {
    shards: Vec<mpsc::Sender<TelemetryRecord>>,
    metrics: Arc<Metrics>,
    last_drop_warn: Instant,
}

/// Worker that owns one pipeline and drains one shard queue
pub struct ShardWorker {
    shard: usize,
    pipeline: EvaluationPipeline,
    rx: mpsc::Receiver<TelemetryRecord>,
    fatal_tx: mpsc::Sender<ShardFailure>,
}

/// Shard index for a unit
pub fn shard_for(unit: &UnitId, shard_count: usize) -> usize {
    let mut hasher = FxHasher::default();
    unit.hash(&mut hasher);
    (hasher.finish() % shard_count.max(1) as u64) as usize
}

impl Dispatcher {
    /// Hand a record to its shard without waiting
    pub fn dispatch(&mut self, record: TelemetryRecord) -> DispatchOutcome {
        let shard = shard_for(&record.unit, self.shards.len());
        match self.shards[shard].try_send(record) {
            Ok(()) => DispatchOutcome::Queued,
            Err(TrySendError::Full(record)) => {
                self.metrics.record_dropped();
                // Rate-limit drop warnings to 1 per second
                if self.last_drop_warn.elapsed() > Duration::from_secs(1) {
                    warn!(shard = %shard, unit = %record.unit, "record_dropped_queue_full");
                    self.last_drop_warn = Instant::now();
                }
                DispatchOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => DispatchOutcome::Closed,
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

impl ShardWorker {
    /// Run until the queue closes or the zone source becomes unavailable
    pub async fn run(mut self) {
        info!(shard = %self.shard, "shard_worker_started");

        while let Some(record) = self.rx.recv().await {
            let result =
                tokio::task::block_in_place(|| self.pipeline.process_record(&record));
            if let Err(error) = result {
                error!(shard = %self.shard, unit = %record.unit, error = %error, "shard_worker_failed");
                let _ = self.fatal_tx.send(ShardFailure { shard: self.shard, error }).await;
                break;
            }
        }

        info!(shard = %self.shard, cached_pairs = %self.pipeline.cached_pairs(), "shard_worker_stopped");
    }
}

/// Create a dispatcher and its shard workers
///
/// `make_pipeline` builds one pipeline per shard. Returns the dispatcher,
/// the workers (to be spawned) and the receiver for fatal failures.
pub fn create_dispatcher<F>(
    shard_count: usize,
    queue_size: usize,
    metrics: Arc<Metrics>,
    mut make_pipeline: F,
) -> (Dispatcher, Vec<ShardWorker>, mpsc::Receiver<ShardFailure>)
where
    F: FnMut() -> EvaluationPipeline,
{
    let shard_count = shard_count.max(1);
    let (fatal_tx, fatal_rx) = mpsc::channel(shard_count);
    let mut shards = Vec::with_capacity(shard_count);
    let mut workers = Vec::with_capacity(shard_count);

    for shard in 0..shard_count {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        shards.push(tx);
        workers.push(ShardWorker { shard, pipeline: make_pipeline(), rx, fatal_tx: fatal_tx.clone() });
    }

    let dispatcher = Dispatcher {
        shards,
        metrics,
        last_drop_warn: Instant::now() - Duration::from_secs(2),
    };
    (dispatcher, workers, fatal_rx)
}

/// Spawn every worker on the runtime
pub fn spawn_workers(workers: Vec<ShardWorker>) -> Vec<JoinHandle<()>> {
    workers.into_iter().map(|w| tokio::spawn(w.run())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::{PersistError, SourceError};
    use crate::domain::geometry::Point;
    use crate::domain::types::{ContainmentState, GpsTimestamp, TransitionEvent, ZoneId};
    use crate::domain::zone::{RawZone, ZoneAssignment};
    use crate::infra::config::Config;
    use crate::services::store::{TransitionSink, ZoneSource};
    use parking_lot::Mutex;

    struct SquareZones {
        unavailable: bool,
    }

    impl ZoneSource for SquareZones {
        fn fetch_zones_for_unit(&self, _unit: &UnitId) -> Result<Vec<ZoneAssignment>, SourceError> {
            if self.unavailable {
                return Err(SourceError::Unavailable("down".to_string()));
            }
            Ok(vec![ZoneAssignment {
                zone: RawZone {
                    id: ZoneId(1),
                    shape_code: 2,
                    coordinates: vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0],
                    radius: 0.0,
                },
                last_known_state: ContainmentState::Unknown,
            }])
        }
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<TransitionEvent>>);

    impl TransitionSink for Collect {
        fn persist_transition(&self, event: &TransitionEvent) -> Result<(), PersistError> {
            self.0.lock().push(event.clone());
            Ok(())
        }
    }

    fn record(unit: &str, lat: f64, lon: f64) -> TelemetryRecord {
        TelemetryRecord {
            unit: UnitId::new(unit),
            point: Point::new(lat, lon),
            timestamp: GpsTimestamp::new("2024-01-01 00:00:00"),
            event_code: "1".to_string(),
        }
    }

    fn factory(
        zones: Arc<SquareZones>,
        sink: Arc<Collect>,
        metrics: Arc<Metrics>,
    ) -> impl FnMut() -> EvaluationPipeline {
        move || {
            EvaluationPipeline::new(
                zones.clone(),
                sink.clone(),
                &Config::default(),
                metrics.clone(),
                None,
            )
        }
    }

    #[test]
    fn test_shard_is_stable_per_unit() {
        let unit = UnitId::new("866123000111");
        let first = shard_for(&unit, 8);
        assert!(first < 8);
        for _ in 0..10 {
            assert_eq!(shard_for(&unit, 8), first);
        }
        assert_eq!(shard_for(&unit, 1), 0);
        assert_eq!(shard_for(&unit, 0), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_records_for_a_unit_keep_order() {
        let metrics = Arc::new(Metrics::new());
        let sink = Arc::new(Collect::default());
        let zones = Arc::new(SquareZones { unavailable: false });
        let (mut dispatcher, workers, _fatal_rx) =
            create_dispatcher(4, 64, metrics.clone(), factory(zones, sink.clone(), metrics));
        assert_eq!(dispatcher.shard_count(), 4);
        let handles = spawn_workers(workers);

        for (lat, lon) in [(0.5, 0.5), (2.0, 2.0), (0.5, 0.5), (0.5, 0.5)] {
            assert_eq!(dispatcher.dispatch(record("U1", lat, lon)), DispatchOutcome::Queued);
        }
        assert_eq!(dispatcher.dispatch(record("U2", 5.0, 5.0)), DispatchOutcome::Queued);

        drop(dispatcher);
        for handle in handles {
            handle.await.unwrap();
        }

        let events = sink.0.lock();
        let u1: Vec<_> = events
            .iter()
            .filter(|e| e.unit.as_str() == "U1")
            .map(|e| e.state)
            .collect();
        assert_eq!(
            u1,
            vec![ContainmentState::Inside, ContainmentState::Outside, ContainmentState::Inside]
        );
        assert_eq!(events.len(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unavailable_source_reports_fatal() {
        let metrics = Arc::new(Metrics::new());
        let sink = Arc::new(Collect::default());
        let zones = Arc::new(SquareZones { unavailable: true });
        let (mut dispatcher, workers, mut fatal_rx) =
            create_dispatcher(1, 8, metrics.clone(), factory(zones, sink, metrics));
        let _handles = spawn_workers(workers);

        dispatcher.dispatch(record("U1", 0.5, 0.5));

        let failure = fatal_rx.recv().await.unwrap();
        assert_eq!(failure.shard, 0);
        assert!(matches!(failure.error, PipelineError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn test_full_queue_drops_record() {
        let metrics = Arc::new(Metrics::new());
        let sink = Arc::new(Collect::default());
        let zones = Arc::new(SquareZones { unavailable: false });
        // Workers are never spawned, so the queue fills
        let (mut dispatcher, _workers, _fatal_rx) =
            create_dispatcher(1, 1, metrics.clone(), factory(zones, sink, metrics.clone()));

        assert_eq!(dispatcher.dispatch(record("U1", 0.5, 0.5)), DispatchOutcome::Queued);
        assert_eq!(dispatcher.dispatch(record("U1", 0.5, 0.5)), DispatchOutcome::Dropped);
        assert_eq!(metrics.records_dropped(), 1);
    }
}
