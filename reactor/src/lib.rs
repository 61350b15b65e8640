//! Drive requests through an application and the aggregator.
//!
//! # Overview
//!
//! A node receives a [dvs_aggregator::types::DvsRequest], lists the operators registered at
//! the request's block, and asks its [Application] for a result ([RequestReactor]). Once the
//! result is indexed, an [bus::Event::AggregationRequested] is published. The [EventManager]
//! hands it to the [AggregatorReactor], which signs the result digest with the node's operator
//! key and submits it to an [dvs_aggregator::Aggregator]. When the aggregate comes back it is
//! published as an [bus::Event::AggregationDone], converted into a [types::DvsResponse],
//! indexed, and passed back to the [Application].
//!
//! # Status
//!
//! `dvs-reactor` is **ALPHA** software and is not yet recommended for production use. Developers should
//! expect breaking changes and occasional instability.

use dvs_aggregator::types::RequestHash;
use thiserror::Error;

pub mod aggregation;
pub use aggregation::{AggregatorReactor, Identity};
pub mod application;
pub use application::Application;
pub mod bus;
pub mod index;
pub use index::Index;
pub mod manager;
pub use manager::EventManager;
pub mod mocks;
pub mod request;
pub use request::RequestReactor;
pub mod types;

/// Errors that can occur when handling a request.
#[derive(Error, Debug)]
pub enum Error {
    #[error("request already exists: {0}")]
    AlreadyExists(RequestHash),
    #[error("request not found: {0}")]
    NotFound(RequestHash),
    #[error("request not processed: {0}")]
    NotProcessed(RequestHash),
    #[error("aggregator failed: {0}")]
    Aggregator(#[from] dvs_aggregator::Error),
    #[error("reader failed: {0}")]
    Reader(#[from] dvs_aggregator::reader::Error),
    #[error("index failed: {0}")]
    Index(#[from] index::Error),
    #[error("application failed: {0}")]
    Application(#[from] application::Error),
}
