//! Runner service call counters.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! binary installs a recorder.

/// Logical calls made through the session manager (counter, labels: operation).
pub const CALLS_TOTAL: &str = "fleet_runner_service_calls_total";
/// Logical calls that ended in an error (counter, labels: operation).
pub const CALL_FAILURES_TOTAL: &str = "fleet_runner_service_call_failures_total";
/// Login round trips (counter, labels: status).
pub const LOGINS_TOTAL: &str = "fleet_runner_service_logins_total";

/// Count one logical call.
pub fn record_call(operation: &'static str) {
    ::metrics::counter!(CALLS_TOTAL, "operation" => operation).increment(1);
}

/// Count one failed logical call.
pub fn record_failure(operation: &'static str) {
    ::metrics::counter!(CALL_FAILURES_TOTAL, "operation" => operation).increment(1);
}

/// Count one login round trip.
pub fn record_login(success: bool) {
    let status = if success { "success" } else { "failure" };
    ::metrics::counter!(LOGINS_TOTAL, "status" => status).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_are_snake_case() {
        for name in [CALLS_TOTAL, CALL_FAILURES_TOTAL, LOGINS_TOTAL] {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_call("list_pool_instances");
        record_failure("list_pool_instances");
        record_login(true);
        record_login(false);
    }
}
