//! An in-memory application for tests.

use crate::{
    application::{self, Error, ProcessedRequest, ProcessedResponse},
    types::{DvsResponse, Operator},
};
use commonware_cryptography::hash;
use dvs_aggregator::types::DvsRequest;
use futures::future::ready;
use std::{
    future::Future,
    sync::{Arc, Mutex},
};

#[derive(Default)]
struct State {
    fail: bool,
    requests: Vec<(DvsRequest, Vec<Operator>)>,
    responses: Vec<(DvsRequest, DvsResponse)>,
}

/// Answers every request with its own data (digested with SHA-256) and records what it
/// was asked.
#[derive(Clone, Default)]
pub struct Application {
    state: Arc<Mutex<State>>,
}

impl Application {
    /// Makes every call fail.
    pub fn fail(&self, fail: bool) {
        self.state.lock().unwrap().fail = fail;
    }

    /// Requests processed so far, with the operators they were processed with.
    pub fn requests(&self) -> Vec<(DvsRequest, Vec<Operator>)> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Aggregated responses processed so far.
    pub fn responses(&self) -> Vec<(DvsRequest, DvsResponse)> {
        self.state.lock().unwrap().responses.clone()
    }
}

impl application::Application for Application {
    fn process_request(
        &self,
        request: DvsRequest,
        operators: Vec<Operator>,
    ) -> impl Future<Output = Result<ProcessedRequest, Error>> + Send {
        let mut state = self.state.lock().unwrap();
        if state.fail {
            return ready(Err(Error::Unavailable));
        }
        let response = request.data.clone();
        state.requests.push((request, operators));
        ready(Ok(ProcessedRequest {
            digest: hash(&response),
            response,
        }))
    }

    fn process_response(
        &self,
        request: DvsRequest,
        response: DvsResponse,
    ) -> impl Future<Output = Result<ProcessedResponse, Error>> + Send {
        let mut state = self.state.lock().unwrap();
        if state.fail {
            return ready(Err(Error::Unavailable));
        }
        let data = response.data.clone();
        state.responses.push((request, response));
        ready(Ok(ProcessedResponse { data }))
    }
}
