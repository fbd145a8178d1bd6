//! Fetch orchestrator.

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::events::SyncEvent;
use crate::executor::RetryExecutor;
use crate::planner::{FetchDecision, PaginationPlanner};
use crate::state::SyncStore;
use crate::transport::SyncTransport;
use chatsync_protocol::{Anchor, FetchRequest, Message, Narrow};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Drives message fetches for narrows and reports their lifecycle.
///
/// Every fetch emits `FetchStarted` before its first network call, then
/// exactly one of `FetchCompleted` or `FetchError`. Failures are both
/// emitted and returned.
pub struct MessageFetcher<T, S> {
    transport: T,
    store: S,
    planner: PaginationPlanner,
    executor: RetryExecutor,
    recent_private_count: u32,
    /// Serializes guard checks with the `FetchStarted` emission.
    planning: Mutex<()>,
    shutdown: CancellationToken,
}

impl<T: SyncTransport, S: SyncStore> MessageFetcher<T, S> {
    /// Creates a fetcher.
    pub fn new(transport: T, store: S, config: &SyncConfig) -> Self {
        Self {
            transport,
            store,
            planner: PaginationPlanner::new(config.messages_per_request),
            executor: RetryExecutor::from_config(config),
            recent_private_count: config.recent_private_messages_count,
            planning: Mutex::new(()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns the store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the planner.
    pub fn planner(&self) -> &PaginationPlanner {
        &self.planner
    }

    /// Cancels every outstanding and future fetch of this fetcher.
    pub fn shutdown(&self) {
        debug!("shutting down message fetcher");
        self.shutdown.cancel();
    }

    /// Returns true once [`MessageFetcher::shutdown`] was called.
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Fetches one page unconditionally.
    ///
    /// Returns the fetched messages so that the caller can use them without
    /// waiting for the store.
    pub async fn fetch_messages(&self, request: FetchRequest) -> SyncResult<Vec<Message>> {
        self.emit_started(&request);
        self.execute(request).await
    }

    /// Fetches a page of older messages, unless the planner declines.
    ///
    /// Returns `Ok(None)` when no request was issued.
    pub async fn fetch_older(&self, narrow: &Narrow) -> SyncResult<Option<Vec<Message>>> {
        self.plan_and_fetch(narrow, |planner, store| {
            planner.plan_older(&store.session(), narrow, &store.fetch_window(narrow))
        })
        .await
    }

    /// Fetches a page of newer messages, unless the planner declines.
    pub async fn fetch_newer(&self, narrow: &Narrow) -> SyncResult<Option<Vec<Message>>> {
        self.plan_and_fetch(narrow, |planner, store| {
            planner.plan_newer(&store.session(), narrow, &store.fetch_window(narrow))
        })
        .await
    }

    /// Fetches half a page on each side of `anchor`, unless the narrow is
    /// already fully loaded.
    pub async fn fetch_around(
        &self,
        narrow: &Narrow,
        anchor: Anchor,
    ) -> SyncResult<Option<Vec<Message>>> {
        self.plan_and_fetch(narrow, |planner, store| {
            planner.plan_around(narrow, anchor, &store.fetch_window(narrow))
        })
        .await
    }

    /// Fetches the most recent private messages, newest first page only.
    pub async fn fetch_recent_private_messages(&self) -> SyncResult<Vec<Message>> {
        self.fetch_messages(PaginationPlanner::plan_recent_private(
            self.recent_private_count,
        ))
        .await
    }

    async fn plan_and_fetch<P>(&self, narrow: &Narrow, plan: P) -> SyncResult<Option<Vec<Message>>>
    where
        P: FnOnce(&PaginationPlanner, &S) -> FetchDecision,
    {
        let request = {
            let _planning = self.planning.lock();
            match plan(&self.planner, &self.store) {
                FetchDecision::Fetch(request) => {
                    self.emit_started(&request);
                    request
                }
                FetchDecision::Skip(reason) => {
                    trace!(%narrow, ?reason, "fetch skipped");
                    return Ok(None);
                }
            }
        };
        self.execute(request).await.map(Some)
    }

    fn emit_started(&self, request: &FetchRequest) {
        debug!(
            narrow = %request.narrow,
            anchor = %request.anchor,
            num_before = request.num_before,
            num_after = request.num_after,
            "fetch started"
        );
        self.store.emit(SyncEvent::FetchStarted {
            narrow: request.narrow.clone(),
            num_before: request.num_before,
            num_after: request.num_after,
        });
    }

    async fn execute(&self, request: FetchRequest) -> SyncResult<Vec<Message>> {
        let query = request.to_query();
        let transport = &self.transport;
        let query_ref = &query;
        let outcome = self
            .executor
            .run(&self.shutdown, move |cancel| async move {
                transport.get_messages(query_ref, &cancel).await
            })
            .await;

        match outcome {
            Ok(result) => {
                debug!(
                    narrow = %request.narrow,
                    count = result.messages.len(),
                    first_id = ?result.first_id(),
                    last_id = ?result.last_id(),
                    found_oldest = result.found_oldest,
                    found_newest = result.found_newest,
                    "fetch completed"
                );
                let messages = result.messages;
                self.store.emit(SyncEvent::FetchCompleted {
                    narrow: request.narrow,
                    messages: messages.clone(),
                    anchor: request.anchor,
                    num_before: request.num_before,
                    num_after: request.num_after,
                    found_newest: result.found_newest,
                    found_oldest: result.found_oldest,
                    own_user_id: self.store.session().own_user_id,
                });
                Ok(messages)
            }
            Err(err) => {
                debug!(narrow = %request.narrow, error = %err, "fetch failed");
                self.store.emit(SyncEvent::FetchError {
                    narrow: request.narrow,
                    error: err.clone(),
                });
                Err(err)
            }
        }
    }
}

impl<T, S: std::fmt::Debug> std::fmt::Debug for MessageFetcher<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageFetcher")
            .field("store", &self.store)
            .field("planner", &self.planner)
            .field("executor", &self.executor)
            .field("shut_down", &self.shutdown.is_cancelled())
            .finish()
    }
}
