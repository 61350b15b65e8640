use commonware_runtime::Metrics as RuntimeMetrics;
use prometheus_client::metrics::counter::Counter;

/// Metrics for the [super::EventManager].
#[derive(Clone, Default)]
pub struct Metrics {
    /// Number of aggregations started
    pub aggregations_started: Counter,
    /// Number of aggregations that returned an aggregate
    pub aggregations_succeeded: Counter,
    /// Number of aggregations that failed
    pub aggregations_failed: Counter,
    /// Number of aggregates handed to the application
    pub responses_processed: Counter,
}

impl Metrics {
    /// Create and return a new set of metrics, registered with the given context.
    pub fn init<E: RuntimeMetrics>(context: &E) -> Self {
        let metrics = Self::default();
        context.register(
            "aggregations_started",
            "Number of aggregations started",
            metrics.aggregations_started.clone(),
        );
        context.register(
            "aggregations_succeeded",
            "Number of aggregations that returned an aggregate",
            metrics.aggregations_succeeded.clone(),
        );
        context.register(
            "aggregations_failed",
            "Number of aggregations that failed",
            metrics.aggregations_failed.clone(),
        );
        context.register(
            "responses_processed",
            "Number of aggregates handed to the application",
            metrics.responses_processed.clone(),
        );
        metrics
    }
}
