//! Session driver.
//!
//! [`SyncSession`] ties the pieces together: it runs a fresh
//! [`BootstrapSequencer`] per attempt, carries out the follow-up effects it
//! returns, and serves pagination requests through one [`MessageFetcher`].

use crate::bootstrap::{BootstrapOutcome, BootstrapSequencer, BootstrapState, FollowUp};
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::fetcher::MessageFetcher;
use crate::state::SyncStore;
use crate::transport::SyncTransport;
use chatsync_protocol::{Anchor, Message, Narrow};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Subsystems outside the sync core that bootstrap hands work to.
///
/// Calls are fire-and-forget; an implementation that needs to do slow work
/// should spawn it.
pub trait SessionDelegate: Send + Sync {
    /// Starts the real-time event loop.
    fn start_event_polling(&self, queue_id: &str, last_event_id: i64);

    /// Sends messages queued while offline.
    fn send_outbox(&self);

    /// Sets up notifications.
    fn init_notifications(&self);

    /// Drops the credentials and returns to login.
    fn logout(&self);

    /// Returns to account selection.
    fn reset_to_account_picker(&self);
}

/// A delegate that records the effects it was asked to perform.
#[derive(Debug, Default)]
pub struct RecordingDelegate {
    calls: Mutex<Vec<FollowUp>>,
}

impl RecordingDelegate {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Effects performed so far, in order.
    pub fn calls(&self) -> Vec<FollowUp> {
        self.calls.lock().clone()
    }
}

impl SessionDelegate for RecordingDelegate {
    fn start_event_polling(&self, queue_id: &str, last_event_id: i64) {
        self.calls.lock().push(FollowUp::StartEventPolling {
            queue_id: queue_id.to_string(),
            last_event_id,
        });
    }

    fn send_outbox(&self) {
        self.calls.lock().push(FollowUp::SendOutbox);
    }

    fn init_notifications(&self) {
        self.calls.lock().push(FollowUp::InitNotifications);
    }

    fn logout(&self) {
        self.calls.lock().push(FollowUp::Logout);
    }

    fn reset_to_account_picker(&self) {
        self.calls.lock().push(FollowUp::ResetToAccountPicker);
    }
}

/// One logged-in session.
pub struct SyncSession<T, S> {
    config: SyncConfig,
    fetcher: Arc<MessageFetcher<T, S>>,
    delegate: Arc<dyn SessionDelegate>,
    background: Mutex<JoinSet<()>>,
    last_bootstrap: RwLock<BootstrapState>,
    cancel: CancellationToken,
}

impl<T, S> SyncSession<T, S>
where
    T: SyncTransport + 'static,
    S: SyncStore + 'static,
{
    /// Creates a session. Nothing is fetched until [`SyncSession::bootstrap`].
    pub fn new(transport: T, store: S, delegate: Arc<dyn SessionDelegate>, config: SyncConfig) -> Self {
        let fetcher = Arc::new(MessageFetcher::new(transport, store, &config));
        Self {
            config,
            fetcher,
            delegate,
            background: Mutex::new(JoinSet::new()),
            last_bootstrap: RwLock::new(BootstrapState::NotStarted),
            cancel: CancellationToken::new(),
        }
    }

    /// Returns the store.
    pub fn store(&self) -> &S {
        self.fetcher.store()
    }

    /// Returns the fetcher.
    pub fn fetcher(&self) -> &Arc<MessageFetcher<T, S>> {
        &self.fetcher
    }

    /// State reached by the most recent bootstrap attempt.
    pub fn bootstrap_state(&self) -> BootstrapState {
        *self.last_bootstrap.read()
    }

    /// Runs a bootstrap attempt and performs its follow-up effects.
    ///
    /// Each call starts from `NotStarted`; this is how a reconnect or a fresh
    /// login retries.
    pub async fn bootstrap(&self) -> SyncResult<BootstrapOutcome> {
        let mut sequencer = BootstrapSequencer::new(self.config.clone());
        *self.last_bootstrap.write() = BootstrapState::InProgress;
        let outcome = sequencer
            .run(self.fetcher.transport(), self.fetcher.store(), &self.cancel)
            .await;
        *self.last_bootstrap.write() = sequencer.state();

        let outcome = outcome?;
        for follow_up in outcome.follow_ups() {
            self.perform(follow_up);
        }
        Ok(outcome)
    }

    fn perform(&self, follow_up: &FollowUp) {
        debug!(?follow_up, "performing bootstrap follow-up");
        match follow_up {
            FollowUp::StartEventPolling {
                queue_id,
                last_event_id,
            } => self.delegate.start_event_polling(queue_id, *last_event_id),
            FollowUp::FetchRecentPrivateMessages => {
                let fetcher = Arc::clone(&self.fetcher);
                self.background.lock().spawn(async move {
                    if let Err(err) = fetcher.fetch_recent_private_messages().await {
                        warn!(error = %err, "recent private messages fetch failed");
                    }
                });
            }
            FollowUp::SendOutbox => self.delegate.send_outbox(),
            FollowUp::InitNotifications => self.delegate.init_notifications(),
            FollowUp::Logout => self.delegate.logout(),
            FollowUp::ResetToAccountPicker => self.delegate.reset_to_account_picker(),
        }
    }

    /// Waits for background follow-ups to finish. Returns how many ran.
    pub async fn join_background(&self) -> usize {
        let mut tasks = std::mem::take(&mut *self.background.lock());
        let mut finished = 0;
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "background follow-up panicked or was aborted");
            }
            finished += 1;
        }
        finished
    }

    /// Loads older messages in `narrow` if needed.
    pub async fn fetch_older(&self, narrow: &Narrow) -> SyncResult<Option<Vec<Message>>> {
        self.fetcher.fetch_older(narrow).await
    }

    /// Loads newer messages in `narrow` if needed.
    pub async fn fetch_newer(&self, narrow: &Narrow) -> SyncResult<Option<Vec<Message>>> {
        self.fetcher.fetch_newer(narrow).await
    }

    /// Loads messages around `anchor` when `narrow` is opened.
    pub async fn fetch_around(
        &self,
        narrow: &Narrow,
        anchor: Anchor,
    ) -> SyncResult<Option<Vec<Message>>> {
        self.fetcher.fetch_around(narrow, anchor).await
    }

    /// Cancels all network activity and background follow-ups.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.fetcher.shutdown();
        self.background.lock().abort_all();
    }
}
