use commonware_runtime::Metrics as RuntimeMetrics;
use prometheus_client::metrics::{counter::Counter, gauge::Gauge};

/// Metrics for the [crate::Service].
#[derive(Clone, Default)]
pub struct Metrics {
    /// Number of tasks created
    pub tasks_created: Counter,
    /// Number of tasks finalized
    pub tasks_finalized: Counter,
    /// Number of tasks collecting responses
    pub tasks_active: Gauge,
    /// Number of responses recorded by a task
    pub responses_accepted: Counter,
    /// Number of responses dropped by a task
    pub responses_rejected: Counter,
    /// Number of tasks that finalized with an error
    pub aggregations_failed: Counter,
}

impl Metrics {
    /// Create and return a new set of metrics, registered with the given context.
    pub fn init<E: RuntimeMetrics>(context: &E) -> Self {
        let metrics = Self::default();
        context.register(
            "tasks_created",
            "Number of tasks created",
            metrics.tasks_created.clone(),
        );
        context.register(
            "tasks_finalized",
            "Number of tasks finalized",
            metrics.tasks_finalized.clone(),
        );
        context.register(
            "tasks_active",
            "Number of tasks collecting responses",
            metrics.tasks_active.clone(),
        );
        context.register(
            "responses_accepted",
            "Number of responses recorded by a task",
            metrics.responses_accepted.clone(),
        );
        context.register(
            "responses_rejected",
            "Number of responses dropped by a task",
            metrics.responses_rejected.clone(),
        );
        context.register(
            "aggregations_failed",
            "Number of tasks that finalized with an error",
            metrics.aggregations_failed.clone(),
        );
        metrics
    }
}
