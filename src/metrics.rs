//! Pipeline metrics and the Prometheus exporter.

use metrics::{counter, histogram};
use std::net::SocketAddr;
use std::sync::Once;
use tracing::{info, warn};

static INIT: Once = Once::new();

pub const UNITS_TOTAL: &str = "whatnext_units_total";
pub const UNIT_FAILURES_TOTAL: &str = "whatnext_unit_failures_total";
pub const UNIT_DURATION_SECONDS: &str = "whatnext_unit_duration_seconds";
pub const CARDS_EXTRACTED_TOTAL: &str = "whatnext_cards_extracted_total";
pub const EVENTS_INSERTED_TOTAL: &str = "whatnext_events_inserted_total";
pub const EVENTS_MERGED_TOTAL: &str = "whatnext_events_merged_total";
pub const EVENTS_SKIPPED_TOTAL: &str = "whatnext_events_skipped_total";
pub const SOURCES_UNAVAILABLE_TOTAL: &str = "whatnext_sources_unavailable_total";

/// Installs the Prometheus recorder with an HTTP listener. Idempotent.
pub fn init_metrics(port: u16) {
    INIT.call_once(|| {
        let addr: SocketAddr = ([0, 0, 0, 0], port).into();
        match metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
        {
            Ok(()) => {
                info!("Prometheus exporter listening on http://{}/metrics", addr);
                register_metrics();
            }
            Err(e) => warn!("Prometheus exporter install failed: {}", e),
        }
    });
}

fn register_metrics() {
    let _ = counter!(UNITS_TOTAL);
    let _ = counter!(UNIT_FAILURES_TOTAL);
    let _ = counter!(CARDS_EXTRACTED_TOTAL);
    let _ = counter!(EVENTS_INSERTED_TOTAL);
    let _ = counter!(EVENTS_MERGED_TOTAL);
    let _ = counter!(EVENTS_SKIPPED_TOTAL);
    let _ = counter!(SOURCES_UNAVAILABLE_TOTAL);
    let _ = histogram!(UNIT_DURATION_SECONDS);
}

pub struct PipelineMetrics;

impl PipelineMetrics {
    pub fn record_unit(source: &str, cards: usize, duration_secs: f64, failed: bool) {
        counter!(UNITS_TOTAL, "source" => source.to_string()).increment(1);
        counter!(CARDS_EXTRACTED_TOTAL, "source" => source.to_string()).increment(cards as u64);
        histogram!(UNIT_DURATION_SECONDS, "source" => source.to_string()).record(duration_secs);
        if failed {
            counter!(UNIT_FAILURES_TOTAL, "source" => source.to_string()).increment(1);
        }
    }

    pub fn record_inserted(source: &str) {
        counter!(EVENTS_INSERTED_TOTAL, "source" => source.to_string()).increment(1);
    }

    pub fn record_merged(source: &str) {
        counter!(EVENTS_MERGED_TOTAL, "source" => source.to_string()).increment(1);
    }

    pub fn record_skipped(source: &str, reason: &'static str) {
        counter!(EVENTS_SKIPPED_TOTAL, "source" => source.to_string(), "reason" => reason).increment(1);
    }

    pub fn record_unavailable(source: &str) {
        counter!(SOURCES_UNAVAILABLE_TOTAL, "source" => source.to_string()).increment(1);
    }
}
