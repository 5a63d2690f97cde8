//! Per-record geofence evaluation
//!
//! The EvaluationPipeline processes one telemetry record at a time:
//! - fetches the unit's zone set from the zone source
//! - evaluates membership for every zone, in the order supplied
//! - detects state changes against the last-known state
//! - persists each transition, then advances the cached state
//!
//! A failing zone never stops evaluation of the remaining zones. Only an
//! unavailable zone source fails the whole record.

mod handlers;

use crate::domain::error::{PersistError, SourceError, ZoneError};
use crate::domain::types::{ContainmentState, GpsTimestamp, TelemetryRecord, TransitionEvent, UnitId, ZoneId};
use crate::domain::zone::ZoneAssignment;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::EgressSender;
use crate::services::membership::MembershipEvaluator;
use crate::services::store::{TransitionSink, ZoneSource};
use crate::services::transition::TransitionDetector;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Failure that ends processing of a record (and the current run)
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

/// Why one zone produced no decision
#[derive(Debug, thiserror::Error)]
pub enum ZoneFault {
    #[error(transparent)]
    Zone(#[from] ZoneError),
    #[error(transparent)]
    Persistence(#[from] PersistError),
}

/// Decision for one zone
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneDecision {
    /// No change; carries the state that was confirmed
    Unchanged(ContainmentState),
    /// Change detected and persisted
    Transitioned(TransitionEvent),
}

#[derive(Debug)]
pub struct ZoneOutcome {
    pub zone_id: ZoneId,
    pub result: Result<ZoneDecision, ZoneFault>,
}

/// Everything that happened for one telemetry record
#[derive(Debug)]
pub struct RecordReport {
    pub unit: UnitId,
    pub timestamp: GpsTimestamp,
    pub outcomes: Vec<ZoneOutcome>,
}

impl RecordReport {
    fn empty(record: &TelemetryRecord) -> Self {
        Self { unit: record.unit.clone(), timestamp: record.timestamp.clone(), outcomes: Vec::new() }
    }

    /// Persisted transitions, in zone order
    pub fn transitions(&self) -> impl Iterator<Item = &TransitionEvent> {
        self.outcomes.iter().filter_map(|o| match &o.result {
            Ok(ZoneDecision::Transitioned(event)) => Some(event),
            _ => None,
        })
    }

    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    pub fn outcome(&self, zone_id: ZoneId) -> Option<&ZoneOutcome> {
        self.outcomes.iter().find(|o| o.zone_id == zone_id)
    }
}

/// Evaluates telemetry records against their units' zones
pub struct EvaluationPipeline {
    /// Zone sets with stored states
    pub(crate) zones: Arc<dyn ZoneSource>,
    /// Durable transition store
    pub(crate) sink: Arc<dyn TransitionSink>,
    pub(crate) evaluator: MembershipEvaluator,
    pub(crate) detector: TransitionDetector,
    /// Threshold for polylines without their own (meters)
    pub(crate) polyline_threshold_m: f64,
    /// Last persisted state per (unit, zone); written only after persistence succeeds
    pub(crate) cache: FxHashMap<(UnitId, ZoneId), ContainmentState>,
    pub(crate) metrics: Arc<Metrics>,
    /// MQTT egress sender (optional)
    pub(crate) egress_sender: Option<EgressSender>,
}

impl EvaluationPipeline {
    pub fn new(
        zones: Arc<dyn ZoneSource>,
        sink: Arc<dyn TransitionSink>,
        config: &Config,
        metrics: Arc<Metrics>,
        egress_sender: Option<EgressSender>,
    ) -> Self {
        Self {
            zones,
            sink,
            evaluator: MembershipEvaluator::new(),
            detector: TransitionDetector::new(config.message_type()),
            polyline_threshold_m: config.polyline_threshold_m(),
            cache: FxHashMap::default(),
            metrics,
            egress_sender,
        }
    }

    /// Process one telemetry record end to end
    ///
    /// A unit without zones yields an empty report. An unavailable zone
    /// source is the only error.
    pub fn process_record(&mut self, record: &TelemetryRecord) -> Result<RecordReport, PipelineError> {
        let process_start = Instant::now();

        let zones = match self.zones.fetch_zones_for_unit(&record.unit) {
            Ok(zones) => zones,
            Err(SourceError::NotFound(unit)) => {
                debug!(unit = %unit, "unit_without_zones");
                self.metrics.record_unit_without_zones();
                Vec::new()
            }
            Err(SourceError::Decode(e)) => {
                warn!(unit = %record.unit, error = %e, "zone_set_decode_failed");
                self.metrics.record_decode_failure();
                return Ok(RecordReport::empty(record));
            }
            Err(SourceError::Unavailable(e)) => {
                error!(unit = %record.unit, error = %e, "zone_source_unavailable");
                self.metrics.record_upstream_failure();
                return Err(PipelineError::UpstreamUnavailable(e));
            }
        };

        let report = self.evaluate_zones(record, &zones);

        let latency_us = process_start.elapsed().as_micros() as u64;
        self.metrics.record_processed(latency_us);

        Ok(report)
    }

    /// Evaluate a known zone set for one record
    pub fn evaluate_zones(&mut self, record: &TelemetryRecord, zones: &[ZoneAssignment]) -> RecordReport {
        let mut report = RecordReport::empty(record);
        report.outcomes.reserve(zones.len());

        for assignment in zones {
            let result = self.evaluate_zone(record, assignment);
            report.outcomes.push(ZoneOutcome { zone_id: assignment.zone.id, result });
        }

        report
    }

    /// Cached state for a pair, if one was persisted by this pipeline
    pub fn cached_state(&self, unit: &UnitId, zone_id: ZoneId) -> Option<ContainmentState> {
        self.cache.get(&(unit.clone(), zone_id)).copied()
    }

    /// Number of (unit, zone) pairs in the cache
    pub fn cached_pairs(&self) -> usize {
        self.cache.len()
    }
}
