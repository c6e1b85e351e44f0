//! In-memory transport for unit tests.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::transport::{ApiRequest, ApiResponse, Method, Transport};
use crate::error::ClientError;

/// Answers requests from a script keyed by method and path, recording every
/// request it sees. The last queued response for a route is repeated; an
/// unscripted route answers 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<Result<ApiResponse, String>>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, method: Method, path: &str, status: u16, body: &str) {
        self.routes
            .lock()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(Ok(ApiResponse::new(status, body.to_string())));
    }

    /// Script a connection failure.
    pub fn fail(&self, method: Method, path: &str, reason: &str) {
        self.routes
            .lock()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(Err(reason.to_string()));
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_to(&self, method: Method, path: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let key = (request.method, request.path.clone());
        self.requests.lock().push(request);

        let mut routes = self.routes.lock();
        let next = match routes.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };

        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(reason)) => Err(ClientError::Transport(reason)),
            None => Ok(ApiResponse::new(404, r#"{"message":"no route"}"#)),
        }
    }
}
