//! Pool metrics through the `metrics` facade.
//!
//! Installing a recorder is up to the application.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

pub const METRIC_ACQUIRE_WAIT: &str = "engine_pool_acquire_wait_seconds";
pub const METRIC_ACQUIRE_TIMEOUTS: &str = "engine_pool_acquire_timeouts_total";
pub const METRIC_SLOTS_OPENED: &str = "engine_pool_slots_opened_total";
pub const METRIC_IN_USE: &str = "engine_pool_slots_in_use";

/// Register metric descriptions with the installed recorder.
pub fn describe_metrics() {
    describe_histogram!(METRIC_ACQUIRE_WAIT, "Time spent waiting for a connection slot");
    describe_counter!(METRIC_ACQUIRE_TIMEOUTS, "Slot acquisitions that timed out");
    describe_counter!(METRIC_SLOTS_OPENED, "Engine connections opened by the pool");
    describe_gauge!(METRIC_IN_USE, "Connection slots currently claimed");
}

pub(crate) fn record_acquire_wait(wait: Duration) {
    histogram!(METRIC_ACQUIRE_WAIT).record(wait.as_secs_f64());
}

pub(crate) fn record_acquire_timeout() {
    counter!(METRIC_ACQUIRE_TIMEOUTS).increment(1);
}

pub(crate) fn record_slot_opened() {
    counter!(METRIC_SLOTS_OPENED).increment(1);
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn set_in_use(in_use: usize) {
    gauge!(METRIC_IN_USE).set(in_use as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        describe_metrics();
        record_acquire_wait(Duration::from_millis(3));
        record_acquire_timeout();
        record_slot_opened();
        set_in_use(2);
    }

    #[test]
    fn test_metric_names_are_prefixed() {
        for name in [
            METRIC_ACQUIRE_WAIT,
            METRIC_ACQUIRE_TIMEOUTS,
            METRIC_SLOTS_OPENED,
            METRIC_IN_USE,
        ] {
            assert!(name.starts_with("engine_pool_"));
        }
    }
}
