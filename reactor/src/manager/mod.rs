//! Dispatch bus events to the reactors.
//!
//! The [EventManager] subscribes to both topics when it is created, so events published
//! before it starts are not lost. Aggregation requests each run on their own task (they
//! block until the aggregator's deadline), while completed aggregations are handled in
//! order on the manager's own loop.

use crate::{
    aggregation::AggregatorReactor, application::Application, bus::Bus, index::Index,
    request::RequestReactor,
};
use dvs_aggregator::{Aggregator, Reader};

mod actor;
pub use actor::EventManager;
mod metrics;

/// Configuration for the [EventManager].
pub struct Config<R: Reader, A: Application, I: Index, G: Aggregator> {
    pub bus: Bus,
    pub requests: RequestReactor<R, A, I>,
    pub aggregations: AggregatorReactor<G, I>,
}
