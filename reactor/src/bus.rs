//! Typed publish/subscribe between the reactors.
//!
//! Every subscriber gets its own bounded queue. Publishing waits for room in each
//! subscriber's queue, and subscribers that have dropped their receiver are pruned.

use dvs_aggregator::types::{RequestHash, ValidatedResponse};
use futures::{channel::mpsc, SinkExt};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tracing::trace;

/// Default number of events a subscriber can have queued.
pub const DEFAULT_CAPACITY: usize = 16;

/// Kinds of [Event].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    AggregationRequested,
    AggregationDone,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// A request has been processed and its result should be signed and submitted.
    AggregationRequested(RequestHash),
    /// The aggregator returned the outcome of a request.
    AggregationDone {
        hash: RequestHash,
        response: ValidatedResponse,
    },
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::AggregationRequested(_) => Topic::AggregationRequested,
            Event::AggregationDone { .. } => Topic::AggregationDone,
        }
    }
}

/// Routes [Event]s to the subscribers of their [Topic].
#[derive(Clone)]
pub struct Bus {
    capacity: usize,
    subscribers: Arc<Mutex<HashMap<Topic, Vec<mpsc::Sender<Event>>>>>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Bus {
    /// Creates a bus whose subscribers can each queue `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            subscribers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns a receiver for every [Event] published on `topic` from now on.
    pub fn subscribe(&self, topic: Topic) -> mpsc::Receiver<Event> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.subscribers
            .lock()
            .unwrap()
            .entry(topic)
            .or_default()
            .push(sender);
        receiver
    }

    /// Delivers `event` to every subscriber of its topic.
    ///
    /// Returns the number of subscribers the event was delivered to.
    pub async fn publish(&self, event: Event) -> usize {
        let topic = event.topic();
        let senders = {
            let mut subscribers = self.subscribers.lock().unwrap();
            let senders = subscribers.entry(topic).or_default();
            senders.retain(|sender| !sender.is_closed());
            senders.clone()
        };
        let mut delivered = 0;
        for mut sender in senders {
            if sender.send(event.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        trace!(?topic, delivered, "published event");
        delivered
    }

    /// Number of live subscribers of `topic`.
    pub fn subscribers(&self, topic: Topic) -> usize {
        self.subscribers
            .lock()
            .unwrap()
            .get(&topic)
            .map_or(0, |senders| {
                senders.iter().filter(|sender| !sender.is_closed()).count()
            })
    }
}
