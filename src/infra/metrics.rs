//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Load all bucket values without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Last bucket uses 2x the previous bound
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps periodic counters to get a
/// consistent snapshot; monotonic totals are never reset.
pub struct Metrics {
    /// Telemetry records processed (monotonic)
    records_total: AtomicU64,
    /// Records since last report (reset on report)
    records_since_report: AtomicU64,
    /// Sum of per-record latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max per-record latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Per-record latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Zones evaluated successfully (monotonic)
    zones_evaluated: AtomicU64,
    /// Persisted transitions into a zone (monotonic)
    transitions_inside: AtomicU64,
    /// Persisted transitions out of a zone (monotonic)
    transitions_outside: AtomicU64,
    /// Zones rejected as malformed (monotonic)
    malformed_zones: AtomicU64,
    /// Zones with an unknown shape code (monotonic)
    unsupported_zones: AtomicU64,
    /// Circular zones evaluated without a center (monotonic)
    undefined_centers: AtomicU64,
    /// Transitions the sink failed to persist (monotonic)
    persist_failures: AtomicU64,
    /// Records for units with no zones (monotonic)
    units_without_zones: AtomicU64,
    /// Source unavailable errors (monotonic)
    upstream_failures: AtomicU64,
    /// Telemetry rows that failed to decode (monotonic)
    decode_failures: AtomicU64,
    /// Records dropped on a full shard queue (monotonic)
    records_dropped: AtomicU64,
    /// Transitions dropped on a full egress channel (monotonic)
    egress_dropped: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            records_total: AtomicU64::new(0),
            records_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            zones_evaluated: AtomicU64::new(0),
            transitions_inside: AtomicU64::new(0),
            transitions_outside: AtomicU64::new(0),
            malformed_zones: AtomicU64::new(0),
            unsupported_zones: AtomicU64::new(0),
            undefined_centers: AtomicU64::new(0),
            persist_failures: AtomicU64::new(0),
            units_without_zones: AtomicU64::new(0),
            upstream_failures: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
            egress_dropped: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a telemetry record was processed with given latency (lock-free)
    #[inline]
    pub fn record_processed(&self, latency_us: u64) {
        self.records_total.fetch_add(1, Ordering::Relaxed);
        self.records_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);

        update_atomic_max(&self.latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_zone_evaluated(&self) {
        self.zones_evaluated.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a persisted transition, split by direction
    #[inline]
    pub fn record_transition(&self, inside: bool) {
        if inside {
            self.transitions_inside.fetch_add(1, Ordering::Relaxed);
        } else {
            self.transitions_outside.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_malformed_zone(&self) {
        self.malformed_zones.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_unsupported_zone(&self) {
        self.unsupported_zones.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_undefined_center(&self) {
        self.undefined_centers.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_persist_failure(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_unit_without_zones(&self) {
        self.units_without_zones.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_upstream_failure(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a telemetry record dropped due to a full shard queue (lock-free)
    #[inline]
    pub fn record_dropped(&self) {
        self.records_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a transition dropped due to a full egress channel (lock-free)
    #[inline]
    pub fn record_egress_dropped(&self) {
        self.egress_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn records_total(&self) -> u64 {
        self.records_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn transitions_total(&self) -> u64 {
        self.transitions_inside.load(Ordering::Relaxed)
            + self.transitions_outside.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn persist_failures(&self) -> u64 {
        self.persist_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn malformed_zones(&self) -> u64 {
        self.malformed_zones.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn undefined_centers(&self) -> u64 {
        self.undefined_centers.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn records_dropped(&self) -> u64 {
        self.records_dropped.load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset periodic counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self) -> MetricsSummary {
        let records_count = self.records_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        self.summarize(records_count, latency_sum, max_latency, lat_buckets, elapsed.as_secs_f64())
    }

    /// Read the current window without resetting it (for scrapes)
    pub fn snapshot(&self) -> MetricsSummary {
        let records_count = self.records_since_report.load(Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.load(Ordering::Relaxed);
        let max_latency = self.latency_max_us.load(Ordering::Relaxed);
        let lat_buckets = load_buckets(&self.latency_buckets);
        let elapsed = self.last_report_time.lock().elapsed();

        self.summarize(records_count, latency_sum, max_latency, lat_buckets, elapsed.as_secs_f64())
    }

    fn summarize(
        &self,
        records_count: u64,
        latency_sum: u64,
        max_latency: u64,
        lat_buckets: [u64; NUM_BUCKETS],
        elapsed_secs: f64,
    ) -> MetricsSummary {
        let records_per_sec =
            if elapsed_secs > 0.0 { records_count as f64 / elapsed_secs } else { 0.0 };
        let avg_latency = if records_count > 0 { latency_sum / records_count } else { 0 };

        MetricsSummary {
            records_total: self.records_total.load(Ordering::Relaxed),
            records_per_sec,
            avg_process_latency_us: avg_latency,
            max_process_latency_us: max_latency,
            lat_buckets,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p95_us: percentile_from_buckets(&lat_buckets, 0.95),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            zones_evaluated: self.zones_evaluated.load(Ordering::Relaxed),
            transitions_inside: self.transitions_inside.load(Ordering::Relaxed),
            transitions_outside: self.transitions_outside.load(Ordering::Relaxed),
            malformed_zones: self.malformed_zones.load(Ordering::Relaxed),
            unsupported_zones: self.unsupported_zones.load(Ordering::Relaxed),
            undefined_centers: self.undefined_centers.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            units_without_zones: self.units_without_zones.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            egress_dropped: self.egress_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for egress)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub records_total: u64,
    pub records_per_sec: f64,
    pub avg_process_latency_us: u64,
    pub max_process_latency_us: u64,
    /// Per-record latency histogram buckets
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub lat_buckets: [u64; NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p95_us: u64,
    pub lat_p99_us: u64,
    pub zones_evaluated: u64,
    pub transitions_inside: u64,
    pub transitions_outside: u64,
    pub malformed_zones: u64,
    pub unsupported_zones: u64,
    pub undefined_centers: u64,
    pub persist_failures: u64,
    pub units_without_zones: u64,
    pub upstream_failures: u64,
    pub decode_failures: u64,
    pub records_dropped: u64,
    pub egress_dropped: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            records_total = %self.records_total,
            records_per_sec = format!("{:.1}", self.records_per_sec),
            avg_latency_us = %self.avg_process_latency_us,
            max_latency_us = %self.max_process_latency_us,
            p50_us = %self.lat_p50_us,
            p99_us = %self.lat_p99_us,
            zones_evaluated = %self.zones_evaluated,
            transitions_inside = %self.transitions_inside,
            transitions_outside = %self.transitions_outside,
            malformed_zones = %self.malformed_zones,
            undefined_centers = %self.undefined_centers,
            persist_failures = %self.persist_failures,
            dropped = %self.records_dropped,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.records_total(), 0);
        assert_eq!(metrics.transitions_total(), 0);
    }

    #[test]
    fn test_record_processed() {
        let metrics = Metrics::new();

        metrics.record_processed(100);
        assert_eq!(metrics.records_total(), 1);
        assert_eq!(metrics.latency_sum_us.load(Ordering::Relaxed), 100);

        metrics.record_processed(200);
        assert_eq!(metrics.records_total(), 2);
        assert_eq!(metrics.latency_sum_us.load(Ordering::Relaxed), 300);
    }

    #[test]
    fn test_transition_direction_counters() {
        let metrics = Metrics::new();
        metrics.record_transition(true);
        metrics.record_transition(true);
        metrics.record_transition(false);

        let summary = metrics.report();
        assert_eq!(summary.transitions_inside, 2);
        assert_eq!(summary.transitions_outside, 1);
        assert_eq!(metrics.transitions_total(), 3);
    }

    #[test]
    fn test_report_resets_periodic_counters_only() {
        let metrics = Metrics::new();

        metrics.record_processed(100);
        metrics.record_processed(200);
        metrics.record_processed(300);
        metrics.record_malformed_zone();

        let summary = metrics.report();
        assert_eq!(summary.records_total, 3);
        assert_eq!(summary.avg_process_latency_us, 200);
        assert_eq!(summary.max_process_latency_us, 300);
        assert_eq!(summary.malformed_zones, 1);

        assert_eq!(metrics.records_since_report.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.latency_sum_us.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.latency_max_us.load(Ordering::Relaxed), 0);

        let again = metrics.report();
        assert_eq!(again.records_total, 3);
        assert_eq!(again.malformed_zones, 1);
    }

    #[test]
    fn test_snapshot_does_not_reset() {
        let metrics = Metrics::new();
        metrics.record_processed(300);

        let first = metrics.snapshot();
        let second = metrics.snapshot();
        assert_eq!(first.lat_buckets, second.lat_buckets);
        assert_eq!(second.avg_process_latency_us, 300);
        assert_eq!(metrics.report().avg_process_latency_us, 300);
    }

    #[test]
    fn test_report_empty() {
        let summary = Metrics::new().report();
        assert_eq!(summary.records_total, 0);
        assert_eq!(summary.avg_process_latency_us, 0);
        assert_eq!(summary.lat_p99_us, 0);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(Metrics::new());
        let mut handles = vec![];

        for _ in 0..8 {
            let m = metrics.clone();
            handles.push(thread::spawn(move || {
                for i in 0..1000 {
                    m.record_processed(i as u64);
                    m.record_zone_evaluated();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(metrics.records_total(), 8_000);
        assert_eq!(metrics.report().zones_evaluated, 8_000);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(100), 0);
        assert_eq!(bucket_index(101), 1);
        assert_eq!(bucket_index(51200), 9);
        assert_eq!(bucket_index(51201), 10);
    }

    #[test]
    fn test_percentile_computation() {
        let metrics = Metrics::new();
        for _ in 0..100 {
            metrics.record_processed(150);
        }

        let summary = metrics.report();
        assert_eq!(summary.lat_buckets[1], 100);
        assert_eq!(summary.lat_p50_us, 200);
        assert_eq!(summary.lat_p99_us, 200);
    }
}
