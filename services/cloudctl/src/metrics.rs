//! Prometheus metrics snapshot
//!
//! The library crates record:
//!
//! - `cloud_auth_logins_total` (counter): label `outcome`
//! - `cloud_activity_polls_total` (counter): label `kind`
//! - `cloud_activity_wait_seconds` (histogram): labels `kind`, `outcome`
//!
//! `cloudctl --metrics` installs this recorder and prints the text
//! exposition to stderr before exiting.

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Waits range from a single poll to the default 30 minute cap.
const WAIT_BUCKETS: &[f64] = &[
    1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0,
];

fn builder() -> anyhow::Result<PrometheusBuilder> {
    Ok(PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("cloud_activity_wait_seconds".to_string()),
        WAIT_BUCKETS,
    )?)
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    Ok(builder()?.install_recorder()?)
}
