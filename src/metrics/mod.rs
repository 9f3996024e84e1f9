//! # Metrics Collection Module
//!
//! Prometheus export for the relay.
//!
//! ## Metrics Tracked
//!
//! **Counters:**
//! - `voltwatch_upstream_connects_total` - Successful upstream connects
//! - `voltwatch_upstream_disconnects_total` - Upstream links lost after connecting
//! - `voltwatch_upstream_messages_total` - Data frames received from upstream
//! - `voltwatch_deliveries_total` - Payloads queued to a subscriber
//! - `voltwatch_send_failures_total` - Failed sends (subscriber pruned)
//!
//! **Histograms:**
//! - `voltwatch_upstream_connect_duration_seconds` - Time to open the upstream link
//!
//! **Gauges:**
//! - `voltwatch_subscribers` - Registered dashboard subscribers
//! - `voltwatch_upstream_connected` - 1 while the upstream link is open

pub mod handler;

pub use handler::metrics_handler;

// Re-export PrometheusBuilder for test compatibility
pub use metrics_exporter_prometheus::PrometheusBuilder;

/// Initialize Prometheus metrics exporter with custom histogram buckets.
///
/// Connect buckets span a loopback handshake up to the default connect
/// timeout: [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1, 2.5, 5, 10] seconds.
///
/// Returns a PrometheusHandle that can be used to render metrics.
pub fn setup_metrics(
) -> Result<metrics_exporter_prometheus::PrometheusHandle, Box<dyn std::error::Error>> {
    use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

    let connect_buckets = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("voltwatch_upstream_connect_duration_seconds".to_string()),
            connect_buckets,
        )?
        .install_recorder()?;

    describe_metrics();
    Ok(handle)
}

/// Register help text for every relay metric.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "voltwatch_upstream_connects_total",
        "Successful connections to the upstream telemetry feed"
    );
    metrics::describe_counter!(
        "voltwatch_upstream_disconnects_total",
        "Upstream links lost after connecting"
    );
    metrics::describe_counter!(
        "voltwatch_upstream_messages_total",
        "Data frames received from upstream"
    );
    metrics::describe_counter!(
        "voltwatch_deliveries_total",
        "Payloads queued to a dashboard subscriber"
    );
    metrics::describe_counter!(
        "voltwatch_send_failures_total",
        "Subscriber sends that failed and pruned the subscriber"
    );
    metrics::describe_histogram!(
        "voltwatch_upstream_connect_duration_seconds",
        metrics::Unit::Seconds,
        "Time taken to open the upstream link"
    );
    metrics::describe_gauge!("voltwatch_subscribers", "Registered dashboard subscribers");
    metrics::describe_gauge!(
        "voltwatch_upstream_connected",
        "1 while the upstream link is open"
    );
}
