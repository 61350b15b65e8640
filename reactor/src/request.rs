//! Run requests through the application before and after aggregation.

use crate::{
    application::Application,
    bus::{Bus, Event},
    index::Index,
    types::{DvsResponse, Operator, RequestResult},
    Error,
};
use dvs_aggregator::{
    types::{DvsRequest, RequestHash, ValidatedResponse},
    Reader,
};
use tracing::{debug, error, info};

/// Handles requests a node receives and the aggregates they end in.
#[derive(Clone)]
pub struct RequestReactor<R: Reader, A: Application, I: Index> {
    reader: R,
    application: A,
    index: I,
    bus: Bus,
}

impl<R: Reader, A: Application, I: Index> RequestReactor<R, A, I> {
    pub fn new(reader: R, application: A, index: I, bus: Bus) -> Self {
        Self {
            reader,
            application,
            index,
            bus,
        }
    }

    /// Returns what has been recorded about a request.
    pub fn query(&self, hash: &RequestHash) -> Result<Option<RequestResult>, Error> {
        Ok(self.index.get(hash)?)
    }

    /// Processes a new request and asks for its result to be aggregated.
    ///
    /// Fails if the request has been seen before.
    pub async fn on_request(&self, request: DvsRequest) -> Result<RequestHash, Error> {
        let hash = request.hash();
        if self.index.get(&hash)?.is_some() {
            return Err(Error::AlreadyExists(hash));
        }
        let mut result = RequestResult::new(request.clone());
        self.index.index(result.clone())?;

        // Compute the result
        let operators = self.operators(&request).await?;
        debug!(request = %hash, operators = operators.len(), "processing request");
        let processed = self
            .application
            .process_request(request, operators)
            .await?;
        result.processed_request = Some(processed);
        self.index.index(result)?;

        // Hand it off for signing
        self.bus.publish(Event::AggregationRequested(hash)).await;
        info!(request = %hash, "requested aggregation");
        Ok(hash)
    }

    /// Records the outcome of an aggregation and passes successful aggregates to the
    /// application.
    pub async fn on_aggregation_done(
        &self,
        hash: RequestHash,
        response: ValidatedResponse,
    ) -> Result<(), Error> {
        let mut result = self.index.get(&hash)?.ok_or(Error::NotFound(hash))?;
        let response = match DvsResponse::try_from(&response) {
            Ok(response) => response,
            Err(err) => {
                error!(request = %hash, %err, "aggregation failed");
                result.error = Some(err);
                self.index.index(result)?;
                return Ok(());
            }
        };
        result.response = Some(response.clone());
        self.index.index(result.clone())?;

        let processed = self
            .application
            .process_response(result.request.clone(), response)
            .await?;
        result.processed_response = Some(processed);
        self.index.index(result)?;
        info!(request = %hash, "processed response");
        Ok(())
    }

    /// Lists the operators registered in the request's groups at its height.
    async fn operators(&self, request: &DvsRequest) -> Result<Vec<Operator>, Error> {
        let (height, quorums) = request.requirements()?;
        let groups: Vec<_> = quorums.iter().map(|quorum| quorum.group).collect();
        let states = self
            .reader
            .operators_state_at_block(request.chain_id, &groups, height)
            .await?;
        let mut operators = Vec::with_capacity(states.len());
        for (id, state) in states {
            let info = self.reader.operator_info_by_id(id).await?;
            operators.push(Operator {
                id,
                address: state.operator_address,
                socket: info.socket,
                stake: state.stake_per_group.values().sum(),
                pubkeys: info.pubkeys,
            });
        }
        Ok(operators)
    }
}
