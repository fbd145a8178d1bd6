//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use chatsync_protocol::{FetchResult, InitialData, MessagesQuery, RegisterOptions, ServerSettings};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A sync transport handles network communication with the chat server.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-process, mock for testing, etc.). Every call
/// returns a classified [`SyncError`] on failure and receives a
/// cancellation token it should observe to abort early.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Fetches one page of messages.
    async fn get_messages(
        &self,
        query: &MessagesQuery,
        cancel: &CancellationToken,
    ) -> SyncResult<FetchResult>;

    /// Registers an event queue and fetches the initial state.
    async fn register_for_events(
        &self,
        options: &RegisterOptions,
        cancel: &CancellationToken,
    ) -> SyncResult<InitialData>;

    /// Fetches server metadata, including the version.
    async fn server_settings(&self, cancel: &CancellationToken) -> SyncResult<ServerSettings>;
}

#[async_trait]
impl<T: SyncTransport + ?Sized> SyncTransport for Arc<T> {
    async fn get_messages(
        &self,
        query: &MessagesQuery,
        cancel: &CancellationToken,
    ) -> SyncResult<FetchResult> {
        (**self).get_messages(query, cancel).await
    }

    async fn register_for_events(
        &self,
        options: &RegisterOptions,
        cancel: &CancellationToken,
    ) -> SyncResult<InitialData> {
        (**self).register_for_events(options, cancel).await
    }

    async fn server_settings(&self, cancel: &CancellationToken) -> SyncResult<ServerSettings> {
        (**self).server_settings(cancel).await
    }
}

/// A scripted transport for testing.
///
/// Responses are queued per endpoint and consumed in order. When a queue
/// runs dry the last response is not repeated; the call fails with a
/// protocol error instead.
#[derive(Debug, Default)]
pub struct MockTransport {
    messages: Mutex<VecDeque<SyncResult<FetchResult>>>,
    register: Mutex<VecDeque<SyncResult<InitialData>>>,
    settings: Mutex<VecDeque<SyncResult<ServerSettings>>>,
    queries: Mutex<Vec<MessagesQuery>>,
    latency: Mutex<Option<Duration>>,
    messages_calls: AtomicUsize,
    register_calls: AtomicUsize,
    settings_calls: AtomicUsize,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response for `get_messages`.
    pub fn push_messages_response(&self, response: SyncResult<FetchResult>) {
        self.messages.lock().push_back(response);
    }

    /// Queues a response for `register_for_events`.
    pub fn push_register_response(&self, response: SyncResult<InitialData>) {
        self.register.lock().push_back(response);
    }

    /// Queues a response for `server_settings`.
    pub fn push_settings_response(&self, response: SyncResult<ServerSettings>) {
        self.settings.lock().push_back(response);
    }

    /// Delays every response by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Number of `get_messages` calls made.
    pub fn messages_calls(&self) -> usize {
        self.messages_calls.load(Ordering::SeqCst)
    }

    /// Number of `register_for_events` calls made.
    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    /// Number of `server_settings` calls made.
    pub fn settings_calls(&self) -> usize {
        self.settings_calls.load(Ordering::SeqCst)
    }

    /// Queries received by `get_messages`, in order.
    pub fn queries(&self) -> Vec<MessagesQuery> {
        self.queries.lock().clone()
    }

    async fn respond<R>(
        &self,
        queue: &Mutex<VecDeque<SyncResult<R>>>,
        endpoint: &str,
        cancel: &CancellationToken,
    ) -> SyncResult<R> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::select! {
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                _ = tokio::time::sleep(latency) => {}
            }
        }
        queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::Protocol(format!("no mock {endpoint} response set"))))
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn get_messages(
        &self,
        query: &MessagesQuery,
        cancel: &CancellationToken,
    ) -> SyncResult<FetchResult> {
        self.messages_calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().push(query.clone());
        self.respond(&self.messages, "messages", cancel).await
    }

    async fn register_for_events(
        &self,
        _options: &RegisterOptions,
        cancel: &CancellationToken,
    ) -> SyncResult<InitialData> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        self.respond(&self.register, "register", cancel).await
    }

    async fn server_settings(&self, cancel: &CancellationToken) -> SyncResult<ServerSettings> {
        self.settings_calls.fetch_add(1, Ordering::SeqCst);
        self.respond(&self.settings, "server_settings", cancel).await
    }
}
