//! Sign processed results and submit them for aggregation.

use crate::{
    bus::{Bus, Event},
    index::Index,
    Error,
};
use commonware_cryptography::bls12381::primitives::{group::Private, ops, variant::MinSig};
use dvs_aggregator::{
    types::{OperatorId, RequestHash, ResponseWithSignature, ValidatedResponse},
    Aggregator,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The operator a node signs as.
#[derive(Clone)]
pub struct Identity {
    pub operator_id: OperatorId,
    pub key: Private,
}

/// Submits the node's signed result for a request and publishes the aggregate.
#[derive(Clone)]
pub struct AggregatorReactor<G: Aggregator, I: Index> {
    aggregator: G,
    index: I,
    identity: Arc<Identity>,
    bus: Bus,
}

impl<G: Aggregator, I: Index> AggregatorReactor<G, I> {
    pub fn new(aggregator: G, index: I, identity: Identity, bus: Bus) -> Self {
        Self {
            aggregator,
            index,
            identity: Arc::new(identity),
            bus,
        }
    }

    /// Signs the indexed result of `hash`, waits for its aggregate, and publishes it.
    pub async fn handle(&self, hash: RequestHash) -> Result<ValidatedResponse, Error> {
        let mut result = self.index.get(&hash)?.ok_or(Error::NotFound(hash))?;
        let processed = result
            .processed_request
            .clone()
            .ok_or(Error::NotProcessed(hash))?;
        let signature = ops::sign_message::<MinSig>(&self.identity.key, None, &processed.digest);
        let response = ResponseWithSignature {
            data: processed.response,
            digest: processed.digest,
            signature,
            operator_id: self.identity.operator_id,
            request: result.request.clone(),
        };

        debug!(request = %hash, operator = %self.identity.operator_id, "submitting signature");
        let response = match self.aggregator.collect(response).await {
            Ok(response) => response,
            Err(err) => {
                warn!(request = %hash, ?err, "submission failed");
                result.submission_error = Some(err.to_string());
                self.index.index(result)?;
                return Err(err.into());
            }
        };
        info!(request = %hash, ok = response.is_ok(), "aggregation done");
        self.bus
            .publish(Event::AggregationDone {
                hash,
                response: response.clone(),
            })
            .await;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        application::ProcessedRequest, bus::Topic, index::Memory, types::RequestResult,
    };
    use commonware_macros::test_traced;
    use commonware_runtime::{deterministic, Clock, Metrics, Runner, Spawner};
    use commonware_cryptography::sha256;
    use dvs_aggregator::{mocks as chain, Config, Service};
    use futures::StreamExt;

    fn identity(operator: &chain::Operator) -> Identity {
        Identity {
            operator_id: operator.id,
            key: operator.key.clone(),
        }
    }

    fn service<E: Clock + Spawner + Metrics>(
        context: E,
        reader: chain::Reader,
    ) -> Service<E, chain::Reader> {
        let mut config = Config::default();
        config.chains.insert(chain::CHAIN, chain::chain_config());
        Service::new(context, reader, config)
    }

    #[test_traced]
    fn test_handle() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let operators = chain::operators(&[10]);
            let reader = chain::Reader::new(operators.clone());
            let service = service(context.with_label("aggregator"), reader);
            let index = Memory::default();
            let bus = Bus::default();
            let mut done = bus.subscribe(Topic::AggregationDone);
            let reactor =
                AggregatorReactor::new(service, index.clone(), identity(&operators[0]), bus);

            let request = chain::request(&[(0, 100)]);
            let hash = request.hash();
            let mut result = RequestResult::new(request);
            result.processed_request = Some(ProcessedRequest {
                response: b"result".to_vec(),
                digest: sha256::hash(b"result"),
            });
            index.index(result).unwrap();

            let response = reactor.handle(hash).await.unwrap();
            assert!(response.is_ok());
            assert_eq!(response.data, b"result".to_vec());
            ops::verify_message::<MinSig>(
                &operators[0].pubkeys().g2,
                None,
                &sha256::hash(b"result"),
                &response.signers_agg_sig_g1,
            )
            .unwrap();
            assert_eq!(
                done.next().await,
                Some(Event::AggregationDone { hash, response })
            );
        });
    }

    #[test_traced]
    fn test_handle_unprocessed() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let operators = chain::operators(&[10]);
            let service = service(
                context.with_label("aggregator"),
                chain::Reader::new(operators.clone()),
            );
            let index = Memory::default();
            let reactor = AggregatorReactor::new(
                service,
                index.clone(),
                identity(&operators[0]),
                Bus::default(),
            );

            let request = chain::request(&[(0, 100)]);
            let hash = request.hash();
            let err = reactor.handle(hash).await.unwrap_err();
            assert!(matches!(err, Error::NotFound(_)));

            index.index(RequestResult::new(request)).unwrap();
            let err = reactor.handle(hash).await.unwrap_err();
            assert!(matches!(err, Error::NotProcessed(_)));
        });
    }

    #[test_traced]
    fn test_handle_unknown_chain() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let operators = chain::operators(&[10]);
            let service = service(
                context.with_label("aggregator"),
                chain::Reader::new(operators.clone()),
            );
            let index = Memory::default();
            let bus = Bus::default();
            let mut done = bus.subscribe(Topic::AggregationDone);
            let reactor =
                AggregatorReactor::new(service, index.clone(), identity(&operators[0]), bus);

            let mut request = chain::request(&[(0, 100)]);
            request.chain_id = 1;
            let hash = request.hash();
            let mut result = RequestResult::new(request);
            result.processed_request = Some(ProcessedRequest {
                response: b"result".to_vec(),
                digest: sha256::hash(b"result"),
            });
            index.index(result).unwrap();

            let err = reactor.handle(hash).await.unwrap_err();
            assert!(matches!(
                err,
                Error::Aggregator(dvs_aggregator::Error::ChainConfigNotFound(1))
            ));
            assert!(done.try_next().is_err());

            // The failure is recorded alongside the request
            let result = index.get(&hash).unwrap().unwrap();
            assert_eq!(
                result.submission_error.as_deref(),
                Some("chain config not found for chain id: 1")
            );
            assert!(result.error.is_none());
            assert!(result.response.is_none());
        });
    }
}
