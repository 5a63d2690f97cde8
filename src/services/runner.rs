//! Batch run over a finite telemetry sequence

use crate::domain::error::SourceError;
use crate::domain::types::TelemetryRecord;
use crate::services::pipeline::{EvaluationPipeline, PipelineError};
use tracing::{error, info, warn};

/// Records between progress log lines
const PROGRESS_EVERY: u64 = 1000;

/// Totals for one batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Records evaluated
    pub records: u64,
    /// Transitions persisted
    pub transitions: u64,
    /// Zones skipped or not persisted
    pub zone_failures: u64,
    /// Rows that could not be decoded
    pub skipped: u64,
}

/// Drive every record of a lazy sequence through the pipeline
///
/// Undecodable rows are skipped. An unavailable source, or a pipeline
/// failure, ends the run.
pub fn run_batch<I>(pipeline: &mut EvaluationPipeline, records: I) -> Result<RunSummary, PipelineError>
where
    I: IntoIterator<Item = Result<TelemetryRecord, SourceError>>,
{
    let mut summary = RunSummary::default();
    info!("batch_run_started");

    for item in records {
        let record = match item {
            Ok(record) => record,
            Err(SourceError::Unavailable(e)) => {
                error!(error = %e, records = %summary.records, "telemetry_source_unavailable");
                pipeline.metrics.record_upstream_failure();
                return Err(PipelineError::UpstreamUnavailable(e));
            }
            Err(e) => {
                warn!(error = %e, "telemetry_row_skipped");
                pipeline.metrics.record_decode_failure();
                summary.skipped += 1;
                continue;
            }
        };

        if summary.records == 0 {
            info!(
                unit = %record.unit,
                lat = %record.point.lat,
                lon = %record.point.lon,
                date_gps = %record.timestamp,
                event_gps = %record.event_code,
                "first_record"
            );
        }

        let report = pipeline.process_record(&record)?;
        summary.records += 1;
        summary.transitions += report.transitions().count() as u64;
        summary.zone_failures += report.failures() as u64;

        if summary.records % PROGRESS_EVERY == 0 {
            info!(records = %summary.records, transitions = %summary.transitions, "batch_progress");
        }
    }

    info!(
        records = %summary.records,
        transitions = %summary.transitions,
        zone_failures = %summary.zone_failures,
        skipped = %summary.skipped,
        "batch_run_complete"
    );

    Ok(summary)
}
