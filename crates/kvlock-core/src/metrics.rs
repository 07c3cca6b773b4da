// Metric names for lock operations
// Published through the `metrics` facade; installing an exporter is up to the host

use metrics::{Unit, describe_counter};

pub const ACQUIRE_TOTAL: &str = "kvlock_acquire_total";
pub const ACQUIRE_ATTEMPTS_TOTAL: &str = "kvlock_acquire_attempts_total";
pub const RELEASE_TOTAL: &str = "kvlock_release_total";
pub const STORE_ERRORS_TOTAL: &str = "kvlock_store_errors_total";

/// Register metric descriptions.
/// Should be called once at application startup, after the recorder is installed
pub fn describe_metrics() {
    describe_counter!(
        ACQUIRE_TOTAL,
        Unit::Count,
        "Completed acquire calls, labelled by result (acquired, timeout, interrupted)"
    );
    describe_counter!(
        ACQUIRE_ATTEMPTS_TOTAL,
        Unit::Count,
        "Conditional-set attempts issued to the store"
    );
    describe_counter!(
        RELEASE_TOTAL,
        Unit::Count,
        "Release calls, labelled by result (deleted, not_owner)"
    );
    describe_counter!(
        STORE_ERRORS_TOTAL,
        Unit::Count,
        "Store failures, labelled by operation"
    );
}
