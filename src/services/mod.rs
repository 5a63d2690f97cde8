//! Services - geofence evaluation and run drivers
//!
//! - `membership` - point-in-zone decisions per shape
//! - `transition` - state change detection
//! - `store` - collaborator traits for zone sets and transition persistence
//! - `pipeline` - per-record evaluation with the last-known-state cache
//! - `runner` - batch run over a finite telemetry sequence
//! - `dispatcher` - per-unit sharding for streamed telemetry

pub mod dispatcher;
pub mod membership;
pub mod pipeline;
pub mod runner;
pub mod store;
pub mod transition;

// Re-export commonly used types
pub use dispatcher::{create_dispatcher, spawn_workers, DispatchOutcome, Dispatcher, ShardFailure};
pub use membership::{MembershipEvaluator, Verdict};
pub use pipeline::{EvaluationPipeline, PipelineError, RecordReport, ZoneDecision, ZoneFault};
pub use runner::{run_batch, RunSummary};
pub use store::{TransitionSink, ZoneSource};
pub use transition::TransitionDetector;
