//! Per-zone handling for the EvaluationPipeline

use super::{EvaluationPipeline, ZoneDecision, ZoneFault};
use crate::domain::error::ZoneError;
use crate::domain::types::{ContainmentState, TelemetryRecord, TransitionEvent, UnitId, ZoneId};
use crate::domain::zone::ZoneAssignment;
use crate::io::egress::TransitionRecord;
use crate::services::membership::Verdict;
use tracing::{error, info, warn};

impl EvaluationPipeline {
    /// Evaluate one zone, detect, and persist if the state changed
    pub(super) fn evaluate_zone(
        &mut self,
        record: &TelemetryRecord,
        assignment: &ZoneAssignment,
    ) -> Result<ZoneDecision, ZoneFault> {
        let zone_id = assignment.zone.id;

        let verdict = match self.evaluator.evaluate_raw(
            &assignment.zone,
            record.point,
            self.polyline_threshold_m,
        ) {
            Ok(verdict) => verdict,
            Err(e) => {
                match &e {
                    ZoneError::MalformedGeometry(_) => self.metrics.record_malformed_zone(),
                    ZoneError::UnsupportedShape(_) => self.metrics.record_unsupported_zone(),
                }
                warn!(unit = %record.unit, zone_id = %zone_id, error = %e, "zone_skipped");
                return Err(e.into());
            }
        };
        self.metrics.record_zone_evaluated();

        if verdict == Verdict::UndefinedCenter {
            self.metrics.record_undefined_center();
            warn!(unit = %record.unit, zone_id = %zone_id, "zone_center_undefined");
        }

        let key = (record.unit.clone(), zone_id);
        let last = self.cache.get(&key).copied().unwrap_or(assignment.last_known_state);

        match self.detector.detect(zone_id, last, record, verdict.is_inside()) {
            None => Ok(ZoneDecision::Unchanged(last)),
            Some(event) => self.commit_transition(key, event),
        }
    }

    /// Persist first; only a successful write advances the cached state
    fn commit_transition(
        &mut self,
        key: (UnitId, ZoneId),
        event: TransitionEvent,
    ) -> Result<ZoneDecision, ZoneFault> {
        if let Err(e) = self.sink.persist_transition(&event) {
            self.metrics.record_persist_failure();
            error!(
                unit = %event.unit,
                zone_id = %event.zone_id,
                state = %event.state,
                error = %e,
                "transition_persist_failed"
            );
            return Err(e.into());
        }

        self.cache.insert(key, event.state);
        self.metrics.record_transition(event.state == ContainmentState::Inside);

        info!(
            transition_id = %event.id,
            unit = %event.unit,
            zone_id = %event.zone_id,
            state = %event.state,
            geo_event = %event.state.code(),
            date_gps = %event.timestamp,
            "transition_persisted"
        );

        if let Some(ref sender) = self.egress_sender {
            if !sender.send_transition(TransitionRecord::from_event(&event)) {
                self.metrics.record_egress_dropped();
            }
        }

        Ok(ZoneDecision::Transitioned(event))
    }
}
