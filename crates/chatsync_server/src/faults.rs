//! Fault injection.

use crate::error::ServerError;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;

/// Server endpoints that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `GET /messages`.
    Messages,
    /// `POST /register`.
    Register,
    /// `GET /server_settings`.
    ServerSettings,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Messages => write!(f, "messages"),
            Endpoint::Register => write!(f, "register"),
            Endpoint::ServerSettings => write!(f, "server_settings"),
        }
    }
}

/// A failure to inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// 503 Service Unavailable.
    Unavailable,
    /// 500 Internal Server Error.
    Internal,
    /// 401 with an invalid API key.
    Unauthorized,
    /// 400 Bad Request.
    BadRequest,
}

impl Fault {
    fn to_error(self, endpoint: Endpoint) -> ServerError {
        let detail = format!("injected fault on {endpoint}");
        match self {
            Fault::Unavailable => ServerError::Unavailable(detail),
            Fault::Internal => ServerError::Internal(detail),
            Fault::Unauthorized => ServerError::AuthenticationFailed(detail),
            Fault::BadRequest => ServerError::InvalidRequest(detail),
        }
    }
}

/// Makes the next calls to an endpoint fail.
#[derive(Debug, Default)]
pub struct FaultInjector {
    pending: Mutex<HashMap<Endpoint, VecDeque<Fault>>>,
    injected: Mutex<usize>,
}

impl FaultInjector {
    /// Creates an injector with no pending faults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `count` calls to `endpoint` with `fault`.
    pub fn fail_next(&self, endpoint: Endpoint, count: usize, fault: Fault) {
        let mut pending = self.pending.lock();
        let queue = pending.entry(endpoint).or_default();
        queue.extend(std::iter::repeat(fault).take(count));
    }

    /// Consumes the next fault for `endpoint`, if any.
    pub fn take(&self, endpoint: Endpoint) -> Option<ServerError> {
        let fault = self.pending.lock().get_mut(&endpoint)?.pop_front()?;
        *self.injected.lock() += 1;
        tracing::debug!(%endpoint, ?fault, "injecting fault");
        Some(fault.to_error(endpoint))
    }

    /// Number of faults still queued for `endpoint`.
    pub fn pending(&self, endpoint: Endpoint) -> usize {
        self.pending
            .lock()
            .get(&endpoint)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    /// Total number of faults injected so far.
    pub fn injected(&self) -> usize {
        *self.injected.lock()
    }

    /// Drops all pending faults.
    pub fn clear(&self) {
        self.pending.lock().clear();
    }
}
