//! Bootstrap sequencer.
//!
//! Performs the initial handshake of a session: registers an event queue
//! and fetches server settings concurrently, classifies failures, and on
//! success returns the follow-up effects an outer driver must run.

use crate::config::SyncConfig;
use crate::error::{ErrorClass, SyncError, SyncResult};
use crate::events::{AbortReason, EventSink, SyncEvent};
use crate::timeout::with_deadline;
use crate::transport::SyncTransport;
use chatsync_protocol::{BootstrapSnapshot, InitialData, ServerSettings, ServerVersion};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Lifecycle of one bootstrap attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    /// Not run yet.
    NotStarted,
    /// Handshake calls are in flight.
    InProgress,
    /// The session is ready.
    Completed,
    /// The attempt failed; a new sequencer is needed to retry.
    Aborted,
}

impl BootstrapState {
    /// Stable snake_case name.
    pub fn name(&self) -> &'static str {
        match self {
            BootstrapState::NotStarted => "not_started",
            BootstrapState::InProgress => "in_progress",
            BootstrapState::Completed => "completed",
            BootstrapState::Aborted => "aborted",
        }
    }
}

/// A side effect the sequencer asks its driver to perform, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    /// Start polling the event queue.
    StartEventPolling {
        /// Queue to poll.
        queue_id: String,
        /// Last event already reflected in the initial state.
        last_event_id: i64,
    },
    /// Fetch recent private messages for servers that do not include them
    /// in the initial state.
    FetchRecentPrivateMessages,
    /// Deliver messages queued while offline.
    SendOutbox,
    /// Set up notifications.
    InitNotifications,
    /// Forget the credentials.
    Logout,
    /// Return to account selection, keeping credentials.
    ResetToAccountPicker,
}

/// Result of a bootstrap attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum BootstrapOutcome {
    /// The handshake succeeded.
    Completed {
        /// Snapshot used to seed the store.
        snapshot: BootstrapSnapshot,
        /// Effects to run.
        follow_ups: Vec<FollowUp>,
    },
    /// The handshake failed.
    Aborted {
        /// Failure class; `None` for unclassified failures, which get no
        /// event and no recovery.
        reason: Option<AbortReason>,
        /// The failure.
        error: SyncError,
        /// Effects to run.
        follow_ups: Vec<FollowUp>,
    },
}

impl BootstrapOutcome {
    /// Effects to run.
    pub fn follow_ups(&self) -> &[FollowUp] {
        match self {
            BootstrapOutcome::Completed { follow_ups, .. }
            | BootstrapOutcome::Aborted { follow_ups, .. } => follow_ups,
        }
    }

    /// Returns true if the handshake succeeded.
    pub fn is_completed(&self) -> bool {
        matches!(self, BootstrapOutcome::Completed { .. })
    }
}

/// Runs one bootstrap attempt.
///
/// The sequencer is single-use: once it reaches a terminal state, running
/// it again fails with [`SyncError::InvalidStateTransition`]. The two
/// handshake calls are guarded by the long timeout but not retried.
#[derive(Debug, Clone)]
pub struct BootstrapSequencer {
    config: SyncConfig,
    state: BootstrapState,
}

impl BootstrapSequencer {
    /// Creates a sequencer in `NotStarted`.
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            state: BootstrapState::NotStarted,
        }
    }

    /// Current state.
    pub fn state(&self) -> BootstrapState {
        self.state
    }

    fn transition(&mut self, to: BootstrapState) -> SyncResult<()> {
        let allowed = matches!(
            (self.state, to),
            (BootstrapState::NotStarted, BootstrapState::InProgress)
                | (BootstrapState::InProgress, BootstrapState::Completed)
                | (BootstrapState::InProgress, BootstrapState::Aborted)
        );
        if !allowed {
            return Err(SyncError::InvalidStateTransition {
                from: self.state.name().to_string(),
                to: to.name().to_string(),
            });
        }
        self.state = to;
        Ok(())
    }

    /// Runs the handshake, emitting lifecycle events into `events`.
    ///
    /// Returns `Err` only when the sequencer was already used; handshake
    /// failures are reported as [`BootstrapOutcome::Aborted`].
    pub async fn run<T, E>(
        &mut self,
        transport: &T,
        events: &E,
        cancel: &CancellationToken,
    ) -> SyncResult<BootstrapOutcome>
    where
        T: SyncTransport + ?Sized,
        E: EventSink + ?Sized,
    {
        self.transition(BootstrapState::InProgress)?;
        info!("bootstrap started");
        events.emit(SyncEvent::BootstrapStarted);

        let calls = cancel.child_token();
        let _in_flight = calls.clone().drop_guard();
        let deadline = self.config.request_long_timeout;
        let options = &self.config.register;

        let handshake = tokio::try_join!(
            guarded(deadline, transport.register_for_events(options, &calls)),
            guarded(deadline, transport.server_settings(&calls)),
        )
        .and_then(|(initial_data, settings)| parse_settings(initial_data, &settings));

        match handshake {
            Ok((initial_data, server_version)) => {
                self.complete(initial_data, server_version, events)
            }
            Err(error) => self.abort(error, events),
        }
    }

    fn complete<E: EventSink + ?Sized>(
        &mut self,
        initial_data: InitialData,
        server_version: ServerVersion,
        events: &E,
    ) -> SyncResult<BootstrapOutcome> {
        self.transition(BootstrapState::Completed)?;
        info!(
            server_version = %server_version,
            queue_id = %initial_data.queue_id,
            last_event_id = initial_data.last_event_id,
            "bootstrap completed"
        );

        events.emit(SyncEvent::RealmInitialized {
            initial_data: initial_data.clone(),
            server_version: server_version.clone(),
        });
        events.emit(SyncEvent::BootstrapCompleted);

        let snapshot = BootstrapSnapshot::new(initial_data, server_version);
        let mut follow_ups = vec![FollowUp::StartEventPolling {
            queue_id: snapshot.queue_id.clone(),
            last_event_id: snapshot.last_event_id,
        }];
        if !snapshot
            .server_version
            .is_at_least(&self.config.min_recent_pms_version)
        {
            follow_ups.push(FollowUp::FetchRecentPrivateMessages);
        }
        follow_ups.push(FollowUp::SendOutbox);
        follow_ups.push(FollowUp::InitNotifications);

        Ok(BootstrapOutcome::Completed {
            snapshot,
            follow_ups,
        })
    }

    fn abort<E: EventSink + ?Sized>(
        &mut self,
        error: SyncError,
        events: &E,
    ) -> SyncResult<BootstrapOutcome> {
        self.transition(BootstrapState::Aborted)?;

        let (reason, follow_ups) = match error.class() {
            ErrorClass::Client => (Some(AbortReason::ClientError), vec![FollowUp::Logout]),
            ErrorClass::Server => (
                Some(AbortReason::ServerError),
                vec![FollowUp::ResetToAccountPicker],
            ),
            ErrorClass::Timeout => (
                Some(AbortReason::Timeout),
                vec![FollowUp::ResetToAccountPicker],
            ),
            ErrorClass::Unclassified => (None, Vec::new()),
        };

        match reason {
            Some(reason) => {
                info!(%reason, error = %error, "bootstrap aborted");
                events.emit(SyncEvent::BootstrapAborted { reason });
            }
            None => {
                // No recovery is offered here; the session stays pending.
                warn!(error = %error, "unexpected error during bootstrap");
            }
        }

        Ok(BootstrapOutcome::Aborted {
            reason,
            error,
            follow_ups,
        })
    }
}

async fn guarded<F, R>(deadline: Duration, call: F) -> SyncResult<R>
where
    F: Future<Output = SyncResult<R>>,
{
    with_deadline(deadline, call).await?
}

fn parse_settings(
    initial_data: InitialData,
    settings: &ServerSettings,
) -> SyncResult<(InitialData, ServerVersion)> {
    let server_version = ServerVersion::parse(&settings.server_version)?;
    Ok((initial_data, server_version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventLog;
    use crate::transport::MockTransport;
    use tokio::time::Instant;

    fn initial_data() -> InitialData {
        InitialData::new("1517975029:0", 42).with_user_id(7)
    }

    async fn run(transport: &MockTransport) -> (BootstrapSequencer, BootstrapOutcome, EventLog) {
        let log = EventLog::new();
        let mut sequencer = BootstrapSequencer::new(SyncConfig::default());
        let outcome = sequencer
            .run(transport, &log, &CancellationToken::new())
            .await
            .unwrap();
        (sequencer, outcome, log)
    }

    #[tokio::test(start_paused = true)]
    async fn completes_on_current_server() {
        let transport = MockTransport::new();
        transport.push_register_response(Ok(initial_data()));
        transport.push_settings_response(Ok(ServerSettings::new("4.0")));

        let (sequencer, outcome, log) = run(&transport).await;
        assert_eq!(sequencer.state(), BootstrapState::Completed);
        assert_eq!(
            log.kinds(),
            vec!["bootstrap_started", "realm_initialized", "bootstrap_completed"]
        );
        assert_eq!(
            outcome.follow_ups(),
            &[
                FollowUp::StartEventPolling {
                    queue_id: "1517975029:0".into(),
                    last_event_id: 42,
                },
                FollowUp::SendOutbox,
                FollowUp::InitNotifications,
            ]
        );
        assert_eq!(transport.messages_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn old_server_gets_private_messages_fallback() {
        let transport = MockTransport::new();
        transport.push_register_response(Ok(initial_data()));
        transport.push_settings_response(Ok(ServerSettings::new("2.0.4")));

        let (_, outcome, _) = run(&transport).await;
        let fallbacks = outcome
            .follow_ups()
            .iter()
            .filter(|f| **f == FollowUp::FetchRecentPrivateMessages)
            .count();
        assert_eq!(fallbacks, 1);
        assert_eq!(outcome.follow_ups()[1], FollowUp::FetchRecentPrivateMessages);
    }

    #[tokio::test(start_paused = true)]
    async fn threshold_version_skips_fallback() {
        let transport = MockTransport::new();
        transport.push_register_response(Ok(initial_data()));
        transport.push_settings_response(Ok(ServerSettings::new("2.1-dev-384-g4c3c669b41")));

        let (_, outcome, _) = run(&transport).await;
        assert!(!outcome
            .follow_ups()
            .contains(&FollowUp::FetchRecentPrivateMessages));
    }

    #[tokio::test(start_paused = true)]
    async fn client_error_logs_out_without_retry() {
        let transport = MockTransport::new();
        transport.push_register_response(Err(SyncError::from_status(
            401,
            "UNAUTHORIZED",
            "Invalid API key",
        )));
        transport.push_settings_response(Ok(ServerSettings::new("4.0")));

        let (sequencer, outcome, log) = run(&transport).await;
        assert_eq!(sequencer.state(), BootstrapState::Aborted);
        assert_eq!(transport.register_calls(), 1);
        assert_eq!(outcome.follow_ups(), &[FollowUp::Logout]);
        assert_eq!(
            log.events().last(),
            Some(&SyncEvent::BootstrapAborted {
                reason: AbortReason::ClientError,
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn server_error_resets_to_account_picker() {
        let transport = MockTransport::new();
        transport.push_register_response(Ok(initial_data()));
        transport.push_settings_response(Err(SyncError::from_status(502, "", "Bad Gateway")));

        let (_, outcome, log) = run(&transport).await;
        assert_eq!(outcome.follow_ups(), &[FollowUp::ResetToAccountPicker]);
        assert_eq!(transport.settings_calls(), 1);
        assert_eq!(log.count("bootstrap_aborted"), 1);
        assert_eq!(log.count("realm_initialized"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handshake_times_out() {
        let transport = MockTransport::new();
        transport.set_latency(Duration::from_secs(120));
        transport.push_register_response(Ok(initial_data()));
        transport.push_settings_response(Ok(ServerSettings::new("4.0")));

        let start = Instant::now();
        let (_, outcome, log) = run(&transport).await;
        assert!(start.elapsed() < Duration::from_secs(61));
        assert!(matches!(
            outcome,
            BootstrapOutcome::Aborted {
                reason: Some(AbortReason::Timeout),
                error: SyncError::Timeout,
                ..
            }
        ));
        assert_eq!(log.count("bootstrap_aborted"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unclassified_error_only_logs() {
        let transport = MockTransport::new();
        transport.push_register_response(Ok(initial_data()));
        transport.push_settings_response(Ok(ServerSettings::new("not a version")));

        let (sequencer, outcome, log) = run(&transport).await;
        assert_eq!(sequencer.state(), BootstrapState::Aborted);
        assert!(outcome.follow_ups().is_empty());
        assert!(matches!(
            outcome,
            BootstrapOutcome::Aborted {
                reason: None,
                error: SyncError::Protocol(_),
                ..
            }
        ));
        assert_eq!(log.kinds(), vec!["bootstrap_started"]);
    }

    #[tokio::test(start_paused = true)]
    async fn sequencer_is_single_use() {
        let transport = MockTransport::new();
        transport.push_register_response(Ok(initial_data()));
        transport.push_settings_response(Ok(ServerSettings::new("4.0")));

        let (mut sequencer, _, log) = run(&transport).await;
        let again = sequencer
            .run(&transport, &log, &CancellationToken::new())
            .await;
        assert!(matches!(
            again,
            Err(SyncError::InvalidStateTransition { .. })
        ));
        assert_eq!(transport.register_calls(), 1);
    }
}
