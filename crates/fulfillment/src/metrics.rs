//! Pipeline counters.
//!
//! Recorded through the `metrics` facade; the service installs a Prometheus
//! recorder, and without one these are no-ops.

use metrics::counter;

pub const ARTIFACTS_FETCHED: &str = "scene_artifacts_fetched_total";
pub const ARTIFACTS_REUSED: &str = "scene_artifacts_reused_total";
pub const FETCH_FAILURES: &str = "scene_fetch_failures_total";
pub const ROWS_WRITTEN: &str = "scene_rows_written_total";
pub const OBJECTS_PUBLISHED: &str = "scene_objects_published_total";
pub const DECODE_FAILURES: &str = "scene_decode_failures_total";

pub fn record_fetched(bytes: u64) {
    counter!(ARTIFACTS_FETCHED).increment(1);
    counter!("scene_artifact_bytes_total").increment(bytes);
}

pub fn record_reused() {
    counter!(ARTIFACTS_REUSED).increment(1);
}

pub fn record_fetch_failure() {
    counter!(FETCH_FAILURES).increment(1);
}

pub fn record_row_written() {
    counter!(ROWS_WRITTEN).increment(1);
}

pub fn record_published() {
    counter!(OBJECTS_PUBLISHED).increment(1);
}

pub fn record_decode_failure() {
    counter!(DECODE_FAILURES).increment(1);
}
