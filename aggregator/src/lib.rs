//! Collect signed operator responses to a request and aggregate them into a threshold BLS proof.
//!
//! # Overview
//!
//! Operators each submit a [types::ResponseWithSignature] for a [types::DvsRequest]. The first
//! submission for a request starts a task that snapshots operator and group stake at the
//! request's block (via a [Reader]) and collects submissions until a deadline. At the
//! deadline (or when [Service::finalize] is called) the task selects the first digest it saw,
//! checks that every required group's signed stake meets its threshold, aggregates the
//! signatures and keys of the operators that signed it, and computes the non-signer set an
//! on-chain verifier needs. The resulting [types::ValidatedResponse] (or a structured error
//! in its place) is delivered to every submitter.
//!
//! # Status
//!
//! `dvs-aggregator` is **ALPHA** software and is not yet recommended for production use. Developers should
//! expect breaking changes and occasional instability.

use std::future::Future;
use thiserror::Error;
use types::{ChainId, ResponseWithSignature, ValidatedResponse};

mod aggregate;
pub mod config;
pub use config::{ChainConfig, Config};
mod metrics;
pub mod mocks;
pub mod reader;
pub use reader::Reader;
mod registry;
mod service;
pub use service::Service;
mod task;
pub mod threshold;
pub mod types;

/// Errors that can occur when submitting a response.
///
/// Aggregation failures are not errors: they are delivered as a [ValidatedResponse]
/// carrying an [types::AggregationError].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("chain config not found for chain id: {0}")]
    ChainConfigNotFound(ChainId),
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("reader failed: {0}")]
    Reader(#[from] reader::Error),
    #[error("task closed")]
    TaskClosed,
}

/// Accepts signed responses and returns the aggregated outcome of their request.
pub trait Aggregator: Clone + Send + Sync + 'static {
    /// Submits `response` and waits for the outcome of its request.
    fn collect(
        &self,
        response: ResponseWithSignature,
    ) -> impl Future<Output = Result<ValidatedResponse, Error>> + Send;
}
