//! The application a node computes request results with.

use crate::types::{DvsResponse, Operator};
use dvs_aggregator::types::{DvsRequest, ResultDigest};
use std::future::Future;
use thiserror::Error;

/// Errors an [Application] can return.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("unavailable")]
    Unavailable,
}

/// The application's result for a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessedRequest {
    pub response: Vec<u8>,
    /// Digest of `response` operators sign.
    pub digest: ResultDigest,
}

/// The application's acknowledgement of an aggregated response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessedResponse {
    pub data: Vec<u8>,
}

/// Interface the reactors use to reach the application.
pub trait Application: Clone + Send + Sync + 'static {
    /// Computes the result of `request`, given the operators registered at its height.
    fn process_request(
        &self,
        request: DvsRequest,
        operators: Vec<Operator>,
    ) -> impl Future<Output = Result<ProcessedRequest, Error>> + Send;

    /// Handles the aggregated response to `request`.
    fn process_response(
        &self,
        request: DvsRequest,
        response: DvsResponse,
    ) -> impl Future<Output = Result<ProcessedResponse, Error>> + Send;
}
