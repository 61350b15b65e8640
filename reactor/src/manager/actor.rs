use super::{metrics::Metrics, Config};
use crate::{
    aggregation::AggregatorReactor,
    application::Application,
    bus::{Event, Topic},
    index::Index,
    request::RequestReactor,
};
use commonware_macros::select;
use commonware_runtime::{Handle, Metrics as RuntimeMetrics, Spawner};
use dvs_aggregator::{types::RequestHash, Aggregator, Reader};
use futures::{channel::mpsc, StreamExt};
use tracing::{debug, warn};

/// Routes aggregation requests to the [AggregatorReactor] and finished aggregations to the
/// [RequestReactor].
pub struct EventManager<
    E: Spawner + RuntimeMetrics,
    R: Reader,
    A: Application,
    I: Index,
    G: Aggregator,
> {
    context: E,
    requests: RequestReactor<R, A, I>,
    aggregations: AggregatorReactor<G, I>,

    requested: mpsc::Receiver<Event>,
    done: mpsc::Receiver<Event>,

    metrics: Metrics,
}

impl<E: Spawner + RuntimeMetrics, R: Reader, A: Application, I: Index, G: Aggregator>
    EventManager<E, R, A, I, G>
{
    /// Creates a new manager, subscribing it to the bus.
    pub fn new(context: E, cfg: Config<R, A, I, G>) -> Self {
        let metrics = Metrics::init(&context);
        Self {
            requested: cfg.bus.subscribe(Topic::AggregationRequested),
            done: cfg.bus.subscribe(Topic::AggregationDone),
            context,
            requests: cfg.requests,
            aggregations: cfg.aggregations,
            metrics,
        }
    }

    /// Starts dispatching events.
    pub fn start(self) -> Handle<()> {
        self.context.clone().spawn(|_| self.run())
    }

    async fn run(mut self) {
        loop {
            select! {
                event = self.requested.next() => {
                    let Some(event) = event else {
                        debug!("aggregation requests closed");
                        break;
                    };
                    let Event::AggregationRequested(hash) = event else {
                        continue;
                    };
                    self.aggregate(hash);
                },
                event = self.done.next() => {
                    let Some(event) = event else {
                        debug!("aggregation results closed");
                        break;
                    };
                    let Event::AggregationDone { hash, response } = event else {
                        continue;
                    };
                    let ok = response.is_ok();
                    match self.requests.on_aggregation_done(hash, response).await {
                        Ok(()) if ok => {
                            self.metrics.responses_processed.inc();
                        }
                        Ok(()) => {}
                        Err(err) => {
                            warn!(request = %hash, ?err, "failed to process aggregate");
                        }
                    }
                },
            }
        }
    }

    /// Signs and submits the result of `hash` on a new task.
    fn aggregate(&self, hash: RequestHash) {
        self.metrics.aggregations_started.inc();
        let reactor = self.aggregations.clone();
        let metrics = self.metrics.clone();
        self.context
            .with_label("aggregation")
            .spawn(move |_| async move {
                match reactor.handle(hash).await {
                    Ok(response) if response.is_ok() => {
                        metrics.aggregations_succeeded.inc();
                    }
                    Ok(_) => {
                        metrics.aggregations_failed.inc();
                    }
                    Err(err) => {
                        warn!(request = %hash, ?err, "failed to aggregate");
                        metrics.aggregations_failed.inc();
                    }
                }
            });
    }
}
