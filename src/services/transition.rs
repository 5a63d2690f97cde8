//! Transition detection
//!
//! Compares the freshly computed containment of a (unit, zone) pair with its
//! last-known state. A change yields exactly one `TransitionEvent`; an equal
//! state yields nothing. The detector never mutates state: the caller
//! advances the stored state once the event has been persisted.

use crate::domain::types::{new_uuid_v7, ContainmentState, TelemetryRecord, TransitionEvent, ZoneId};

/// Message-type tag stamped on every transition unless configured otherwise
pub const DEFAULT_MESSAGE_TYPE: u8 = 1;

#[derive(Debug, Clone, Copy)]
pub struct TransitionDetector {
    message_type: u8,
}

impl Default for TransitionDetector {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_TYPE)
    }
}

impl TransitionDetector {
    pub fn new(message_type: u8) -> Self {
        Self { message_type }
    }

    pub fn message_type(&self) -> u8 {
        self.message_type
    }

    /// Decide whether `inside` differs from `last` and build the event if so
    pub fn detect(
        &self,
        zone_id: ZoneId,
        last: ContainmentState,
        record: &TelemetryRecord,
        inside: bool,
    ) -> Option<TransitionEvent> {
        let state = ContainmentState::from_inside(inside);
        if state == last {
            return None;
        }

        Some(TransitionEvent {
            id: new_uuid_v7(),
            zone_id,
            unit: record.unit.clone(),
            timestamp: record.timestamp.clone(),
            event_code: record.event_code.clone(),
            point: record.point,
            state,
            message_type: self.message_type,
        })
    }
}
