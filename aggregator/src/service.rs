use crate::{
    aggregate::Snapshot,
    config::{ChainConfig, Config},
    metrics::Metrics,
    reader::Reader,
    registry::{Registry, Slot},
    task,
    types::{ChainId, RequestHash, ResponseWithSignature, ValidatedResponse},
    Aggregator, Error,
};
use commonware_runtime::{Clock, Metrics as RuntimeMetrics, Spawner};
use std::{collections::BTreeMap, future::Future, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

/// Entry point operators submit their signed responses to.
///
/// The first response for a request creates a task; every response (including the
/// first) then waits for that task's outcome.
#[derive(Clone)]
pub struct Service<E: Clock + Spawner + RuntimeMetrics, R: Reader> {
    context: E,
    reader: R,
    chains: Arc<BTreeMap<ChainId, ChainConfig>>,
    timeout: Duration,
    mailbox_size: usize,

    registry: Registry,
    metrics: Metrics,
}

impl<E: Clock + Spawner + RuntimeMetrics, R: Reader> Service<E, R> {
    /// Creates a new service, registering its metrics with `context`.
    pub fn new(context: E, reader: R, cfg: Config) -> Self {
        let metrics = Metrics::init(&context);
        Self {
            timeout: cfg.operator_response_timeout(),
            mailbox_size: cfg.mailbox_size,
            chains: Arc::new(cfg.chains),
            context,
            reader,
            registry: Registry::default(),
            metrics,
        }
    }

    /// Returns true if a task is collecting (or finalizing) for `hash`.
    pub fn is_active(&self, hash: &RequestHash) -> bool {
        self.registry.contains(hash)
    }

    /// Number of tasks collecting (or finalizing).
    pub fn active(&self) -> usize {
        self.registry.len()
    }

    /// Finalizes the task for `hash` before its deadline.
    ///
    /// Returns false if no task is collecting for `hash` (it may already be finalizing).
    pub async fn finalize(&self, hash: &RequestHash) -> bool {
        let Some(slot) = self.registry.get(hash) else {
            return false;
        };
        let mut guard = slot.lock().await;
        match guard.as_mut() {
            Some(mailbox) => mailbox.finalize().await,
            None => false,
        }
    }

    /// Reads the chain state a new task for `response` is evaluated against.
    async fn snapshot(
        &self,
        hash: RequestHash,
        response: &ResponseWithSignature,
    ) -> Result<Snapshot, Error> {
        let request = &response.request;
        if !self.chains.contains_key(&request.chain_id) {
            return Err(Error::ChainConfigNotFound(request.chain_id));
        }
        let (height, quorums) = request.requirements()?;
        let groups: Vec<_> = quorums.iter().map(|quorum| quorum.group).collect();
        let chain = request.chain_id;
        let operators = self
            .reader
            .operators_state_at_block(chain, &groups, height)
            .await?;
        let group_states = self
            .reader
            .groups_state_at_block(chain, &groups, height)
            .await?;
        let state = self.reader.operator_state(chain, &groups, height).await?;
        Ok(Snapshot {
            hash,
            chain,
            height,
            quorums,
            operators,
            groups: group_states,
            state,
        })
    }

    async fn collect_response_signature(
        &self,
        response: ResponseWithSignature,
    ) -> Result<ValidatedResponse, Error> {
        let hash = response.request.hash();
        let operator = response.operator_id;
        let receiver = loop {
            // Find (or create) the task's lock
            let slot = self.registry.get_or_create(hash);
            let mut guard = slot.lock().await;

            // Start a task if there is none
            if guard.is_none() {
                if !self.registry.is_current(&hash, &slot) {
                    // The task retired while we waited for its lock
                    continue;
                }

                // Release the slot if we fail (or are dropped) before the task starts
                let mut creation = Creation {
                    registry: &self.registry,
                    hash,
                    slot: &slot,
                    started: false,
                };
                let snapshot = match self.snapshot(hash, &response).await {
                    Ok(snapshot) => snapshot,
                    Err(err) => {
                        warn!(task = %hash, ?err, "failed to create task");
                        return Err(err);
                    }
                };
                let mailbox_size = snapshot.state.operators.len().max(self.mailbox_size);
                let deadline = self.context.current() + self.timeout;
                let (actor, mailbox) = task::Actor::new(
                    self.context.with_label("task"),
                    task::Config {
                        reader: self.reader.clone(),
                        snapshot,
                        deadline,
                        registry: self.registry.clone(),
                        slot: slot.clone(),
                        mailbox_size,
                        metrics: self.metrics.clone(),
                    },
                );
                *guard = Some(mailbox);
                actor.start();
                creation.started = true;
                self.metrics.tasks_created.inc();
                self.metrics.tasks_active.inc();
                info!(task = %hash, "created task");
            } else {
                debug!(task = %hash, "task exists");
            }

            // Enqueue the response
            let Some(mailbox) = guard.as_mut() else {
                continue;
            };
            match mailbox.collect(response.clone()).await {
                Some(receiver) => break receiver,
                None => return Err(Error::TaskClosed),
            }
        };

        // Wait for the outcome
        debug!(task = %hash, %operator, "waiting for task");
        receiver.await.map_err(|_| Error::TaskClosed)
    }
}

/// Removes a slot from the registry unless a task was started for it.
struct Creation<'a> {
    registry: &'a Registry,
    hash: RequestHash,
    slot: &'a Slot,
    started: bool,
}

impl Drop for Creation<'_> {
    fn drop(&mut self) {
        if !self.started {
            self.registry.remove(&self.hash, self.slot);
        }
    }
}

impl<E: Clock + Spawner + RuntimeMetrics, R: Reader> Aggregator for Service<E, R> {
    fn collect(
        &self,
        response: ResponseWithSignature,
    ) -> impl Future<Output = Result<ValidatedResponse, Error>> + Send {
        self.collect_response_signature(response)
    }
}
