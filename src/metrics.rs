use metrics::{histogram, increment_counter};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::info;

use crate::HarvestError;

pub const ITEMS_HARVESTED: &str = "harvest_items_total";
pub const ITEMS_DROPPED: &str = "harvest_items_dropped_total";
pub const SESSION_ROTATIONS: &str = "harvest_session_rotations_total";
pub const DOM_RETRIES: &str = "harvest_dom_retries_total";
pub const LISTING_PAGES_FETCHED: &str = "discovery_pages_fetched_total";
pub const ITEM_DURATION: &str = "harvest_item_seconds";

/// Recording helpers for the harvest counters
///
/// Without an installed recorder every call is a no-op, so the engine records
/// unconditionally and the CLI decides whether anything is exported.
pub struct HarvestMetrics;

impl HarvestMetrics {
    pub fn record_item(duration: Duration, success: bool) {
        if success {
            increment_counter!(ITEMS_HARVESTED);
        } else {
            increment_counter!(ITEMS_DROPPED);
        }

        histogram!(ITEM_DURATION, duration.as_secs_f64());
    }

    pub fn record_rotation() {
        increment_counter!(SESSION_ROTATIONS);
    }

    pub fn record_dom_retry() {
        increment_counter!(DOM_RETRIES);
    }

    pub fn record_listing_page() {
        increment_counter!(LISTING_PAGES_FETCHED);
    }
}

/// Measures one item from first navigation to record assembly
pub struct ItemTimer {
    started: Instant,
}

impl ItemTimer {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn finish(self, success: bool) -> Duration {
        let elapsed = self.elapsed();
        HarvestMetrics::record_item(elapsed, success);
        elapsed
    }
}

pub struct PrometheusExporter {
    port: u16,
}

impl PrometheusExporter {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    /// Install the global recorder and serve `/metrics` on the configured port
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), HarvestError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));

        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .map_err(|e| {
                HarvestError::Configuration(format!("failed to start metrics exporter: {e}"))
            })?;

        info!("Serving Prometheus metrics on {}", addr);
        Ok(())
    }
}
