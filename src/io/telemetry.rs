//! Telemetry wire decoding and the JSONL replay source
//!
//! A telemetry message is one JSON object:
//! `{"imei": ..., "lat": ..., "lon": ..., "date_gps": "...", "event_gps": ...}`
//!
//! The store hands identifiers back either as text or as integers, and
//! coordinates either as numbers or as numeric text, so the decoder accepts
//! both for each.

use crate::domain::error::SourceError;
use crate::domain::geometry::Point;
use crate::domain::types::{GpsTimestamp, TelemetryRecord, UnitId};
use serde::{Deserialize, Deserializer};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use tracing::info;

/// Telemetry message as it arrives on the wire
#[derive(Debug, Deserialize)]
pub struct TelemetryMessage {
    #[serde(deserialize_with = "deserialize_text")]
    pub imei: String,
    #[serde(deserialize_with = "deserialize_coordinate")]
    pub lat: f64,
    #[serde(deserialize_with = "deserialize_coordinate")]
    pub lon: f64,
    pub date_gps: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub event_gps: String,
}

impl TryFrom<TelemetryMessage> for TelemetryRecord {
    type Error = SourceError;

    fn try_from(msg: TelemetryMessage) -> Result<Self, Self::Error> {
        if msg.imei.is_empty() {
            return Err(SourceError::Decode("empty imei".to_string()));
        }
        let point = Point::new(msg.lat, msg.lon);
        if !point.is_finite() {
            return Err(SourceError::Decode(format!("non-finite position {point}")));
        }
        Ok(TelemetryRecord {
            unit: UnitId(msg.imei),
            point,
            timestamp: GpsTimestamp(msg.date_gps),
            event_code: msg.event_gps,
        })
    }
}

/// Decode one telemetry JSON object
pub fn decode_telemetry(json: &str) -> Result<TelemetryRecord, SourceError> {
    let msg: TelemetryMessage =
        serde_json::from_str(json).map_err(|e| SourceError::Decode(e.to_string()))?;
    TelemetryRecord::try_from(msg)
}

/// Accept a JSON string or integer, yielding text
pub(crate) fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct TextVisitor;

    impl<'de> Visitor<'de> for TextVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or integer")
        }

        fn visit_str<E>(self, value: &str) -> Result<String, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_string<E>(self, value: String) -> Result<String, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_u64<E>(self, value: u64) -> Result<String, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_i64<E>(self, value: i64) -> Result<String, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(TextVisitor)
}

/// Accept a JSON number or numeric string, yielding degrees
fn deserialize_coordinate<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct CoordinateVisitor;

    impl<'de> Visitor<'de> for CoordinateVisitor {
        type Value = f64;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a number or numeric string")
        }

        fn visit_f64<E>(self, value: f64) -> Result<f64, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_u64<E>(self, value: u64) -> Result<f64, E>
        where
            E: de::Error,
        {
            Ok(value as f64)
        }

        fn visit_i64<E>(self, value: i64) -> Result<f64, E>
        where
            E: de::Error,
        {
            Ok(value as f64)
        }

        fn visit_str<E>(self, value: &str) -> Result<f64, E>
        where
            E: de::Error,
        {
            value.trim().parse::<f64>().map_err(E::custom)
        }
    }

    deserializer.deserialize_any(CoordinateVisitor)
}

/// Lazy, finite telemetry sequence read from a JSONL file
///
/// Each line yields one item. Undecodable lines yield `SourceError::Decode`
/// so the consumer can skip them; a read failure yields
/// `SourceError::Unavailable`. Blank lines are ignored.
pub struct JsonlTelemetry<R: BufRead> {
    lines: Lines<R>,
    line_no: usize,
}

impl JsonlTelemetry<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            SourceError::Unavailable(format!("telemetry file {}: {e}", path.display()))
        })?;
        info!(path = %path.display(), "telemetry_file_opened");
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> JsonlTelemetry<R> {
    pub fn new(reader: R) -> Self {
        Self { lines: reader.lines(), line_no: 0 }
    }
}

impl<R: BufRead> Iterator for JsonlTelemetry<R> {
    type Item = Result<TelemetryRecord, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(SourceError::from(e))),
            };
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            return Some(decode_telemetry(&line).map_err(|e| match e {
                SourceError::Decode(msg) => {
                    SourceError::Decode(format!("line {}: {msg}", self.line_no))
                }
                other => other,
            }));
        }
    }
}
