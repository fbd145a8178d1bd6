//! # Chatsync Engine
//!
//! Resilient message fetch engine and bootstrap sequencer for a chat
//! client.
//!
//! This crate provides:
//! - Backoff scheduler with full jitter
//! - Timeout guard and a retrying call executor with an absolute deadline
//! - Pagination planner (older / newer / around an anchor)
//! - Fetch orchestrator reporting lifecycle events to a store
//! - Bootstrap sequencer with failure classification and follow-up effects
//! - Transport abstraction with mock and HTTP implementations
//!
//! ## Architecture
//!
//! Shared fetch state lives in a [`SyncStore`] and changes only through
//! emitted [`SyncEvent`]s:
//! 1. The planner reads the store and decides whether to fetch
//! 2. The fetcher emits `FetchStarted`, runs the call through the executor,
//!    then emits `FetchCompleted` or `FetchError`
//! 3. Bootstrap emits its own lifecycle and returns [`FollowUp`] effects that
//!    the [`SyncSession`] driver performs
//!
//! ## Key Invariants
//!
//! - The executor is the only place that retries, and only server errors
//! - No retry outlives the deadline; in-flight calls are cancelled
//! - At most one `fetch_older` and one `fetch_newer` per narrow is in flight;
//!   `fetch_around` checks only the caught-up flags
//! - Caught-up flags come only from the server's `found_*` signals
//! - No per-narrow paging happens before bootstrap completes

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backoff;
mod bootstrap;
mod config;
mod error;
mod events;
mod executor;
mod fetcher;
mod http;
mod planner;
mod session;
mod state;
mod timeout;
mod transport;

pub use backoff::Backoff;
pub use bootstrap::{BootstrapOutcome, BootstrapSequencer, BootstrapState, FollowUp};
pub use config::{BackoffConfig, SyncConfig, MIN_RECENT_PMS_SERVER_VERSION};
pub use error::{ErrorClass, SyncError, SyncResult};
pub use events::{AbortReason, EventLog, EventSink, SyncEvent};
pub use executor::RetryExecutor;
pub use fetcher::MessageFetcher;
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, HttpTransport};
pub use planner::{FetchDecision, PaginationPlanner, SkipReason};
pub use session::{RecordingDelegate, SessionDelegate, SyncSession};
pub use state::{FetchStateStore, FetchWindow, SessionState, SyncStore};
pub use timeout::{with_deadline, with_deadline_cancelling};
pub use transport::{MockTransport, SyncTransport};
