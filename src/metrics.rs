//! SDK metrics
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! application installs a recorder.

/// Record a call to the DLHub service or the search index
pub fn record_request(endpoint: &str, status: u16) {
    metrics::counter!("dlhub_sdk_requests_total",
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a servable publication attempt
pub fn record_publish(success: bool) {
    metrics::counter!("dlhub_sdk_publish_total",
        "outcome" => if success { "success" } else { "failure" }
    )
    .increment(1);
}

/// Record a status poll issued by a task future
///
/// `result` is one of `ok`, `transient_error` or `error`.
pub fn record_task_poll(result: &'static str) {
    metrics::counter!("dlhub_sdk_task_polls_total", "result" => result).increment(1);
}

/// Record the terminal state reached by a task future
pub fn record_task_outcome(outcome: &str) {
    metrics::counter!("dlhub_sdk_task_outcomes_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}
