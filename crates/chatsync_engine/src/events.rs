//! Lifecycle events reported to the store.

use crate::error::SyncError;
use chatsync_protocol::{Anchor, InitialData, Message, Narrow, ServerVersion, UserId};
use parking_lot::Mutex;
use std::sync::Arc;

/// Why a bootstrap attempt was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Credentials were rejected; the account is logged out.
    ClientError,
    /// The server failed; credentials are kept for a later attempt.
    ServerError,
    /// The absolute deadline elapsed.
    Timeout,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::ClientError => write!(f, "client error"),
            AbortReason::ServerError => write!(f, "server error"),
            AbortReason::Timeout => write!(f, "timeout"),
        }
    }
}

/// An event emitted by the engine.
///
/// Events are the only way shared fetch state changes. Sinks receive them
/// in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A fetch for `narrow` is about to be issued.
    FetchStarted {
        /// Narrow being fetched.
        narrow: Narrow,
        /// Messages requested before the anchor.
        num_before: u32,
        /// Messages requested after the anchor.
        num_after: u32,
    },
    /// A fetch for `narrow` succeeded.
    FetchCompleted {
        /// Narrow that was fetched.
        narrow: Narrow,
        /// Fetched messages, ascending by id.
        messages: Vec<Message>,
        /// Anchor of the request.
        anchor: Anchor,
        /// Messages requested before the anchor.
        num_before: u32,
        /// Messages requested after the anchor.
        num_after: u32,
        /// The server has no newer messages.
        found_newest: bool,
        /// The server has no older messages.
        found_oldest: bool,
        /// The acting user, for unread bookkeeping.
        own_user_id: Option<UserId>,
    },
    /// A fetch for `narrow` failed for good.
    FetchError {
        /// Narrow that was fetched.
        narrow: Narrow,
        /// Terminal error.
        error: SyncError,
    },
    /// The initial handshake began.
    BootstrapStarted,
    /// The initial handshake finished.
    BootstrapCompleted,
    /// The initial handshake was abandoned.
    BootstrapAborted {
        /// Failure class that ended it.
        reason: AbortReason,
    },
    /// A fresh snapshot of the realm arrived.
    RealmInitialized {
        /// Initial state returned by registration.
        initial_data: InitialData,
        /// Parsed server version.
        server_version: ServerVersion,
    },
}

impl SyncEvent {
    /// Short name, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncEvent::FetchStarted { .. } => "fetch_started",
            SyncEvent::FetchCompleted { .. } => "fetch_completed",
            SyncEvent::FetchError { .. } => "fetch_error",
            SyncEvent::BootstrapStarted => "bootstrap_started",
            SyncEvent::BootstrapCompleted => "bootstrap_completed",
            SyncEvent::BootstrapAborted { .. } => "bootstrap_aborted",
            SyncEvent::RealmInitialized { .. } => "realm_initialized",
        }
    }

    /// Narrow the event concerns, if any.
    pub fn narrow(&self) -> Option<&Narrow> {
        match self {
            SyncEvent::FetchStarted { narrow, .. }
            | SyncEvent::FetchCompleted { narrow, .. }
            | SyncEvent::FetchError { narrow, .. } => Some(narrow),
            _ => None,
        }
    }
}

/// Receives engine events.
///
/// `emit` is synchronous: when it returns, the event has been applied.
pub trait EventSink: Send + Sync {
    /// Handles one event.
    fn emit(&self, event: SyncEvent);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: SyncEvent) {
        (**self).emit(event)
    }
}

/// A sink that records every event, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<SyncEvent>>,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events.
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().clone()
    }

    /// Returns the recorded event kinds in order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(SyncEvent::kind).collect()
    }

    /// Counts events of one kind.
    pub fn count(&self, kind: &str) -> usize {
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }

    /// Clears the log.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for EventLog {
    fn emit(&self, event: SyncEvent) {
        self.events.lock().push(event);
    }
}
