//! Collaborator seams for the backing store
//!
//! The pipeline only sees these traits; the concrete store handle is owned
//! by the caller and injected at construction.

use crate::domain::error::{PersistError, SourceError};
use crate::domain::types::{TransitionEvent, UnitId};
use crate::domain::zone::ZoneAssignment;

/// Delivers a unit's zones with the last-known state for each pair
pub trait ZoneSource: Send + Sync {
    /// Ordered zone set for `unit`. `SourceError::NotFound` means the unit
    /// has nothing to evaluate.
    fn fetch_zones_for_unit(&self, unit: &UnitId) -> Result<Vec<ZoneAssignment>, SourceError>;
}

/// Durable record of detected transitions
pub trait TransitionSink: Send + Sync {
    /// On error the caller must not advance the pair's state
    fn persist_transition(&self, event: &TransitionEvent) -> Result<(), PersistError>;
}
