//! Observability for the series store
//!
//! Prometheus counters for the ingestion path. Registration happens once in
//! a global instance; exposition is left to the embedding process.

use prometheus::{register_int_counter, register_int_gauge, IntCounter, IntGauge};
use std::sync::OnceLock;

/// Global metrics instance (registered once).
static GLOBAL_METRICS: OnceLock<StoreMetricsInner> = OnceLock::new();

struct StoreMetricsInner {
    samples_ingested: IntCounter,
    parse_failures: IntCounter,
    merge_operations: IntCounter,
    series_count: IntGauge,
}

impl StoreMetricsInner {
    fn new() -> Self {
        Self {
            samples_ingested: register_int_counter!(
                "series_store_samples_ingested_total",
                "Total number of samples ingested across all series"
            )
            .expect("Failed to register samples_ingested_total"),

            parse_failures: register_int_counter!(
                "series_store_parse_failures_total",
                "Raw values that failed to parse and were recorded as the sentinel"
            )
            .expect("Failed to register parse_failures_total"),

            merge_operations: register_int_counter!(
                "series_store_merge_operations_total",
                "Batch merge operations applied to series buffers"
            )
            .expect("Failed to register merge_operations_total"),

            series_count: register_int_gauge!(
                "series_store_series_count",
                "Number of live series in the registry"
            )
            .expect("Failed to register series_count"),
        }
    }
}

/// Lightweight handle to the global store metrics.
///
/// Multiple clones share the same underlying metrics.
#[derive(Debug, Clone, Default)]
pub struct StoreMetrics {
    _private: (),
}

impl StoreMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(StoreMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &'static StoreMetricsInner {
        GLOBAL_METRICS.get_or_init(StoreMetricsInner::new)
    }

    pub fn record_sample_ingested(&self) {
        self.inner().samples_ingested.inc();
    }

    pub fn record_parse_failure(&self) {
        self.inner().parse_failures.inc();
    }

    pub fn record_merge(&self) {
        self.inner().merge_operations.inc();
    }

    pub fn set_series_count(&self, count: i64) {
        self.inner().series_count.set(count);
    }
}
