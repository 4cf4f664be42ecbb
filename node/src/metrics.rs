//! Prometheus metrics for the reconciler.
//!
//! [`ReconcilerMetrics`] owns a dedicated [`Registry`]; [`ReconcilerMetrics::render`]
//! encodes it into the Prometheus text exposition format.

use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_vec_with_registry, Encoder, Histogram,
    HistogramOpts, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

use agora_types::SyncCursor;

pub struct ReconcilerMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Events whose writes committed.
    pub events_applied: IntCounter,
    /// Events at or below the stream cursor.
    pub events_skipped: IntCounter,
    /// Events rejected by validation, labelled by error class.
    pub events_rejected: IntCounterVec,
    /// Out-of-order reveals scheduled for another attempt.
    pub out_of_order_retries: IntCounter,
    /// Times the event subscription was re-established.
    pub resubscriptions: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Persisted cursor per stream.
    pub cursor: IntGaugeVec,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Wall time of one event application, in milliseconds.
    pub apply_latency_ms: Histogram,
}

impl ReconcilerMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let events_applied = register_int_counter_with_registry!(
            Opts::new("agora_events_applied_total", "Ledger events applied"),
            registry
        )?;

        let events_skipped = register_int_counter_with_registry!(
            Opts::new(
                "agora_events_skipped_total",
                "Ledger events already covered by the stream cursor"
            ),
            registry
        )?;

        let events_rejected = register_int_counter_vec_with_registry!(
            Opts::new("agora_events_rejected_total", "Ledger events rejected"),
            &["class"],
            registry
        )?;

        let out_of_order_retries = register_int_counter_with_registry!(
            Opts::new(
                "agora_out_of_order_retries_total",
                "Retries of events applied before their prerequisite"
            ),
            registry
        )?;

        let resubscriptions = register_int_counter_with_registry!(
            Opts::new("agora_resubscriptions_total", "Event subscription restarts"),
            registry
        )?;

        let cursor = register_int_gauge_vec_with_registry!(
            Opts::new("agora_stream_cursor", "Highest applied sequence per stream"),
            &["stream"],
            registry
        )?;

        // 0.1 ms → ~1.6 s.
        let apply_latency_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "agora_apply_latency_ms",
                "Event application time in milliseconds"
            )
            .buckets(prometheus::exponential_buckets(0.1, 2.0, 15)?),
            registry
        )?;

        Ok(Self {
            registry,
            events_applied,
            events_skipped,
            events_rejected,
            out_of_order_retries,
            resubscriptions,
            cursor,
            apply_latency_ms,
        })
    }

    pub fn observe_cursor(&self, cursor: &SyncCursor) {
        self.cursor
            .with_label_values(&[cursor.stream.as_str()])
            .set(i64::try_from(cursor.sequence).unwrap_or(i64::MAX));
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
