use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

lazy_static! {
    pub static ref LOG_ENTRIES: IntCounterVec = register_int_counter_vec!(
        "gld_log_entries_total",
        "Total number of log entries submitted, by severity and outcome.",
        &["severity", "outcome"]
    )
    .expect("gld_log_entries_total can be registered");
    pub static ref HTTP_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "gld_http_requests_total",
        "Total number of HTTP requests served, by method and status code.",
        &["method", "status"]
    )
    .expect("gld_http_requests_total can be registered");
}

/// Counts one submitted log entry. `outcome` is `ok` or `error`.
pub fn add_log_entry(severity: &str, ok: bool) {
    LOG_ENTRIES
        .with_label_values(&[severity, if ok { "ok" } else { "error" }])
        .inc();
}

pub fn add_http_request(method: &str, status: u16) {
    HTTP_REQUESTS
        .with_label_values(&[method, &status.to_string()])
        .inc();
}

pub fn gather() -> Result<Vec<u8>, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_the_exposition() {
        add_log_entry("WARNING", true);
        add_http_request("GET", 200);
        let text = String::from_utf8(gather().unwrap()).unwrap();
        assert!(text.contains("gld_log_entries_total{outcome=\"ok\",severity=\"WARNING\"}"));
        assert!(text.contains("gld_http_requests_total{method=\"GET\",status=\"200\"}"));
    }
}
