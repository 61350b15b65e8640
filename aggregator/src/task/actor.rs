use super::{
    ingress::{Mailbox, Message},
    Config,
};
use crate::{
    aggregate::{aggregate, Snapshot, Tally},
    metrics::Metrics,
    reader::Reader,
    registry::{Registry, Slot},
    types::{ResponseWithSignature, ValidatedResponse},
};
use commonware_macros::select;
use commonware_runtime::{Clock, Handle, Spawner};
use commonware_cryptography::bls12381::primitives::{ops, variant::MinSig};
use futures::{
    channel::{mpsc, oneshot},
    StreamExt,
};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Collects responses for one request and finalizes it exactly once.
pub struct Actor<E: Clock + Spawner, R: Reader> {
    context: E,
    reader: R,
    snapshot: Snapshot,
    deadline: SystemTime,

    registry: Registry,
    slot: Slot,
    mailbox: mpsc::Receiver<Message>,

    tally: Tally,
    waiters: Vec<oneshot::Sender<ValidatedResponse>>,

    metrics: Metrics,
}

impl<E: Clock + Spawner, R: Reader> Actor<E, R> {
    /// Creates a new task actor with the given configuration.
    ///
    /// Returns a tuple of the actor and the mailbox for sending messages.
    pub fn new(context: E, cfg: Config<R>) -> (Self, Mailbox) {
        let (tx, rx) = mpsc::channel(cfg.mailbox_size);
        (
            Self {
                context,
                reader: cfg.reader,
                snapshot: cfg.snapshot,
                deadline: cfg.deadline,
                registry: cfg.registry,
                slot: cfg.slot,
                mailbox: rx,
                tally: Tally::default(),
                waiters: Vec::new(),
                metrics: cfg.metrics,
            },
            Mailbox::new(tx),
        )
    }

    /// Starts collecting.
    ///
    /// Returns a handle that resolves once the task has been finalized.
    pub fn start(self) -> Handle<()> {
        self.context.clone().spawn(|_| self.run())
    }

    async fn run(mut self) {
        let task = self.snapshot.hash;
        loop {
            select! {
                _ = self.context.sleep_until(self.deadline) => {
                    debug!(%task, "deadline reached");
                    break;
                },
                message = self.mailbox.next() => {
                    let Some(message) = message else {
                        break;
                    };
                    match message {
                        Message::Collect { response, responder } => {
                            self.waiters.push(responder);
                            self.collect(response).await;
                        }
                        Message::Finalize => {
                            debug!(%task, "finalize requested");
                            break;
                        }
                    }
                },
            }
        }
        self.finalize().await;
    }

    /// Checks `response` and records it if its operator is known, its signature is
    /// valid, and its operator has not already responded.
    async fn collect(&mut self, response: ResponseWithSignature) {
        let task = self.snapshot.hash;
        let operator = response.operator_id;
        let info = match self.reader.operator_info_by_id(operator).await {
            Ok(info) => info,
            Err(err) => {
                warn!(%task, %operator, ?err, "failed to get operator info, dropping response");
                self.metrics.responses_rejected.inc();
                return;
            }
        };
        if let Err(err) = ops::verify_message::<MinSig>(
            &info.pubkeys.g2,
            None,
            &response.digest,
            &response.signature,
        ) {
            warn!(%task, %operator, ?err, "invalid signature, dropping response");
            self.metrics.responses_rejected.inc();
            return;
        }
        if !self.tally.record(response) {
            debug!(%task, %operator, "ignoring duplicate response");
            self.metrics.responses_rejected.inc();
            return;
        }
        self.metrics.responses_accepted.inc();
        debug!(%task, %operator, responses = self.tally.len(), "recorded response");
    }

    async fn handle_late(&mut self, message: Message) {
        match message {
            Message::Collect {
                response,
                responder,
            } => {
                self.waiters.push(responder);
                self.collect(response).await;
            }
            Message::Finalize => {}
        }
    }

    async fn finalize(mut self) {
        let task = self.snapshot.hash;

        // Callers enqueue while holding the slot lock, so keep draining until we hold it
        let slot = self.slot.clone();
        let mut guard = loop {
            select! {
                guard = slot.lock() => {
                    break guard;
                },
                message = self.mailbox.next() => {
                    match message {
                        Some(message) => self.handle_late(message).await,
                        None => break slot.lock().await,
                    }
                },
            }
        };

        // No caller can reach the mailbox anymore
        self.mailbox.close();
        while let Ok(Some(message)) = self.mailbox.try_next() {
            self.handle_late(message).await;
        }

        // Compute the outcome
        let result = match aggregate(&self.reader, &self.snapshot, &self.tally).await {
            Ok(result) => result,
            Err(err) => {
                warn!(%task, %err, "aggregation failed");
                self.metrics.aggregations_failed.inc();
                ValidatedResponse::error(err)
            }
        };

        // Deliver it to everyone still waiting
        let mut delivered = 0;
        for waiter in self.waiters.drain(..) {
            if waiter.is_canceled() {
                continue;
            }
            if waiter.send(result.clone()).is_ok() {
                delivered += 1;
            }
        }

        // Retire
        *guard = None;
        self.registry.remove(&task, &slot);
        drop(guard);
        self.metrics.tasks_finalized.inc();
        self.metrics.tasks_active.dec();
        info!(
            %task,
            responses = self.tally.len(),
            delivered,
            ok = result.is_ok(),
            "finalized task"
        );
    }
}
