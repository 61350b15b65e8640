//! Storage for [RequestResult]s, keyed by request hash.

use crate::types::RequestResult;
use dvs_aggregator::types::RequestHash;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use thiserror::Error;

/// Errors that can occur when reading or writing an [Index].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("backend failed: {0}")]
    Backend(String),
}

/// Interface for recording the progress of requests.
pub trait Index: Clone + Send + Sync + 'static {
    /// Returns the result recorded for `hash`, if any.
    fn get(&self, hash: &RequestHash) -> Result<Option<RequestResult>, Error>;

    /// Records `result`, replacing anything recorded for the same request.
    fn index(&self, result: RequestResult) -> Result<(), Error>;
}

/// An [Index] held in memory.
#[derive(Clone, Default)]
pub struct Memory {
    results: Arc<Mutex<HashMap<RequestHash, RequestResult>>>,
}

impl Memory {
    pub fn len(&self) -> usize {
        self.results.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.lock().unwrap().is_empty()
    }
}

impl Index for Memory {
    fn get(&self, hash: &RequestHash) -> Result<Option<RequestResult>, Error> {
        Ok(self.results.lock().unwrap().get(hash).cloned())
    }

    fn index(&self, result: RequestResult) -> Result<(), Error> {
        self.results.lock().unwrap().insert(result.hash(), result);
        Ok(())
    }
}
