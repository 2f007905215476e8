use prometheus::{Counter, CounterVec, Histogram, HistogramOpts, Opts, Registry};
use std::sync::Arc;

/// Metrics collector for admission decisions
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    decisions: CounterVec,
    store_errors: Counter,
    processing_errors: Counter,
    manual_resets: Counter,
    decision_duration: Histogram,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let decisions = CounterVec::new(
            Opts::new(
                "ratelimit_decisions_total",
                "Admission decisions by outcome",
            ),
            &["outcome"],
        )?;

        let store_errors = Counter::new(
            "ratelimit_store_errors_total",
            "Decisions that failed because the shared store was unavailable",
        )?;

        let processing_errors = Counter::new(
            "ratelimit_processing_errors_total",
            "Decisions that failed for any other reason",
        )?;

        let manual_resets = Counter::new(
            "ratelimit_manual_resets_total",
            "Windows cleared through an explicit reset",
        )?;

        let decision_duration = Histogram::with_opts(HistogramOpts::new(
            "ratelimit_decision_duration_seconds",
            "Duration of admission decisions in seconds",
        ))?;

        registry.register(Box::new(decisions.clone()))?;
        registry.register(Box::new(store_errors.clone()))?;
        registry.register(Box::new(processing_errors.clone()))?;
        registry.register(Box::new(manual_resets.clone()))?;
        registry.register(Box::new(decision_duration.clone()))?;

        Ok(Self {
            registry,
            decisions,
            store_errors,
            processing_errors,
            manual_resets,
            decision_duration,
        })
    }

    /// Get the Prometheus registry for this metrics instance
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a decision outcome (`bypassed`, `admitted` or `rejected`)
    pub fn record_decision(&self, outcome: &str) {
        self.decisions.with_label_values(&[outcome]).inc();
    }

    pub fn record_store_error(&self) {
        self.store_errors.inc();
    }

    pub fn record_processing_error(&self) {
        self.processing_errors.inc();
    }

    pub fn record_manual_reset(&self) {
        self.manual_resets.inc();
    }

    /// Create a timer for measuring decision duration
    pub fn start_decision_timer(&self) -> prometheus::HistogramTimer {
        self.decision_duration.start_timer()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics")
    }
}
