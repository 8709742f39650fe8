use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus exporter and register all pipeline metrics.
/// Returns a `PrometheusHandle` whose `render()` method produces the
/// text/plain Prometheus scrape payload.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    // Pre-register counters so they appear even before the first increment.
    counter!("fetch_attempts_total").absolute(0);
    counter!("fetch_failures_total").absolute(0);
    counter!("records_skipped_total").absolute(0);
    counter!("cycles_succeeded_total").absolute(0);
    counter!("cycles_failed_total").absolute(0);
    counter!("markets_stored_total").absolute(0);

    gauge!("last_success_timestamp_seconds").set(0.0);

    // Histogram is lazily created on first record; force creation.
    histogram!("cycle_duration_seconds").record(0.0);

    Ok(handle)
}
