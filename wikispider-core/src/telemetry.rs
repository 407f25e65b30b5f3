use crate::error::{CoreError, Result};
use crate::settings::MetricsSettings;
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{Ipv4Addr, SocketAddr};
use tracing::info;
use wikispider_scanner::Telemetry;

pub const SITES_VISITED: &str = "sites_visited";
pub const LINKS_FOUND: &str = "links_found";
pub const VISIT_ERROR: &str = "visit_error";

/// Counter sink backed by the global `metrics` recorder.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsTelemetry;

impl MetricsTelemetry {
    pub fn new() -> Self {
        describe_counter!(SITES_VISITED, "Number of pages fetched by the spider");
        describe_counter!(
            LINKS_FOUND,
            "Number of eligible links found while visiting a page"
        );
        describe_counter!(VISIT_ERROR, "Number of rejected or failed page visits");
        MetricsTelemetry
    }
}

impl Telemetry for MetricsTelemetry {
    fn page_visited(&self, _url: &str) {
        counter!(SITES_VISITED).increment(1);
    }

    fn link_found(&self, page_title: &str) {
        counter!(LINKS_FOUND, "page-title" => page_title.to_string()).increment(1);
    }

    fn visit_error(&self, reason: &str) {
        counter!(VISIT_ERROR, "error" => reason.to_string()).increment(1);
    }
}

/// Install the Prometheus recorder and its scrape endpoint. Without it the
/// counters are no-ops. Must be called from inside a tokio runtime.
pub fn init_metrics(settings: &MetricsSettings) -> Result<()> {
    if !settings.enabled {
        return Ok(());
    }

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, settings.port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| CoreError::Metrics(e.to_string()))?;

    info!(port = settings.port, "metrics exporter listening");
    Ok(())
}
