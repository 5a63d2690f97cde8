//! File-backed zone catalog and in-memory state table
//!
//! The catalog is a JSON document with zone rows and per-unit assignments:
//!
//! ```json
//! {
//!   "zones": [{"id": 1, "shape": 1, "coordinates": "10.0|20.0001|", "radius": 50}],
//!   "units": [{"unit": "U1", "zones": [{"zone": 1, "geo_event": 2}]}]
//! }
//! ```
//!
//! `coordinates` uses the store's pipe-separated text; `geo_event` is the
//! stored state code (1 inside, 2 outside, anything else unknown).
//! `MemoryStore` serves zone sets from the catalog and keeps the state
//! table, persisting transitions to the journal before updating it.

use crate::domain::error::{PersistError, SourceError};
use crate::domain::types::{ContainmentState, TransitionEvent, UnitId, ZoneId};
use crate::domain::zone::{RawZone, ZoneAssignment};
use crate::io::egress::TransitionJournal;
use crate::services::store::{TransitionSink, ZoneSource};
use anyhow::Context;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Zone row as stored
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneRow {
    pub id: i64,
    pub shape: i32,
    #[serde(default)]
    pub coordinates: String,
    #[serde(default)]
    pub radius: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignmentRow {
    pub zone: i64,
    #[serde(default)]
    pub geo_event: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnitRow {
    #[serde(deserialize_with = "crate::io::telemetry::deserialize_text")]
    pub unit: String,
    #[serde(default)]
    pub zones: Vec<AssignmentRow>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ZoneCatalog {
    #[serde(default)]
    pub zones: Vec<ZoneRow>,
    #[serde(default)]
    pub units: Vec<UnitRow>,
}

impl ZoneCatalog {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read zone catalog {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse zone catalog {}", path.display()))
    }
}

/// Decode the store's `lat|lon|lat|lon|` text into a flat number list
///
/// A trailing separator is allowed and an empty string yields no numbers.
/// Pair validation happens later, per zone.
pub fn decode_coordinate_list(text: &str) -> Result<Vec<f64>, String> {
    coordinate_tokens(text)
        .map(|part| part.parse::<f64>().map_err(|_| format!("invalid coordinate {part:?}")))
        .collect()
}

fn coordinate_tokens(text: &str) -> impl Iterator<Item = &str> {
    let trimmed = text.trim();
    let trimmed = trimmed.strip_suffix('|').unwrap_or(trimmed);
    trimmed.split('|').map(str::trim).filter(move |_| !trimmed.is_empty())
}

impl From<&ZoneRow> for RawZone {
    /// Tokens that are not numbers decode as NaN, so the zone stays assigned
    /// and fails per record as malformed geometry.
    fn from(row: &ZoneRow) -> Self {
        let coordinates = decode_coordinate_list(&row.coordinates).unwrap_or_else(|e| {
            warn!(zone_id = %row.id, error = %e, "zone_coordinates_invalid");
            coordinate_tokens(&row.coordinates)
                .map(|part| part.parse::<f64>().unwrap_or(f64::NAN))
                .collect()
        });
        RawZone { id: ZoneId(row.id), shape_code: row.shape, coordinates, radius: row.radius }
    }
}

/// Zone source and transition sink backed by a loaded catalog
pub struct MemoryStore {
    zones: FxHashMap<ZoneId, RawZone>,
    /// Ordered zone list per unit
    assignments: FxHashMap<UnitId, Vec<ZoneId>>,
    states: RwLock<FxHashMap<(UnitId, ZoneId), ContainmentState>>,
    journal: Option<Mutex<TransitionJournal>>,
}

impl MemoryStore {
    /// Build from a decoded catalog
    ///
    /// Assignments to unknown zones are skipped with a warning. Zone rows
    /// are always kept; bad geometry surfaces when the zone is evaluated.
    pub fn from_catalog(catalog: ZoneCatalog) -> Self {
        let zones: FxHashMap<ZoneId, RawZone> = catalog
            .zones
            .iter()
            .map(|row| {
                let raw = RawZone::from(row);
                (raw.id, raw)
            })
            .collect();

        let mut assignments: FxHashMap<UnitId, Vec<ZoneId>> = FxHashMap::default();
        let mut states = FxHashMap::default();
        for unit_row in catalog.units {
            let unit = UnitId(unit_row.unit);
            let list = assignments.entry(unit.clone()).or_default();
            for a in unit_row.zones {
                let zone_id = ZoneId(a.zone);
                if !zones.contains_key(&zone_id) {
                    warn!(unit = %unit, zone_id = %zone_id, "assignment_unknown_zone");
                    continue;
                }
                list.push(zone_id);
                states.insert((unit.clone(), zone_id), ContainmentState::from_code(a.geo_event));
            }
        }

        info!(zones = %zones.len(), units = %assignments.len(), "zone_catalog_loaded");

        Self { zones, assignments, states: RwLock::new(states), journal: None }
    }

    /// Load a catalog file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Ok(Self::from_catalog(ZoneCatalog::from_file(path)?))
    }

    /// Persist transitions to `journal` before updating the state table
    pub fn with_journal(mut self, journal: TransitionJournal) -> Self {
        self.journal = Some(Mutex::new(journal));
        self
    }

    /// Stored state for a pair (Unknown if never recorded)
    pub fn state(&self, unit: &UnitId, zone: ZoneId) -> ContainmentState {
        self.states.read().get(&(unit.clone(), zone)).copied().unwrap_or_default()
    }

    pub fn zone(&self, id: ZoneId) -> Option<&RawZone> {
        self.zones.get(&id)
    }

    /// All zones, ordered by id
    pub fn zones(&self) -> Vec<&RawZone> {
        let mut all: Vec<&RawZone> = self.zones.values().collect();
        all.sort_by_key(|z| z.id);
        all
    }

    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    pub fn unit_count(&self) -> usize {
        self.assignments.len()
    }
}

impl ZoneSource for MemoryStore {
    fn fetch_zones_for_unit(&self, unit: &UnitId) -> Result<Vec<ZoneAssignment>, SourceError> {
        let ids = match self.assignments.get(unit) {
            Some(ids) if !ids.is_empty() => ids,
            _ => return Err(SourceError::NotFound(unit.clone())),
        };

        let states = self.states.read();
        Ok(ids
            .iter()
            .filter_map(|id| self.zones.get(id))
            .map(|zone| ZoneAssignment {
                zone: zone.clone(),
                last_known_state: states
                    .get(&(unit.clone(), zone.id))
                    .copied()
                    .unwrap_or_default(),
            })
            .collect())
    }
}

impl TransitionSink for MemoryStore {
    fn persist_transition(&self, event: &TransitionEvent) -> Result<(), PersistError> {
        if let Some(journal) = &self.journal {
            journal.lock().append(event)?;
        }
        self.states.write().insert((event.unit.clone(), event.zone_id), event.state);
        Ok(())
    }
}
