//! Fetch bookkeeping state.
//!
//! [`FetchStateStore`] owns the session readiness flag and one
//! [`FetchWindow`] per narrow. It changes only by applying [`SyncEvent`]s,
//! in the order they are emitted.

use crate::events::{EventSink, SyncEvent};
use chatsync_protocol::{MessageId, Narrow, ServerVersion, UserId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-narrow pagination bookkeeping.
///
/// `fetching_older` and `older_caught_up` are never both true; likewise for
/// the newer side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchWindow {
    /// The server reported no older messages.
    pub older_caught_up: bool,
    /// The server reported no newer messages.
    pub newer_caught_up: bool,
    /// An older-side fetch is in flight.
    pub fetching_older: bool,
    /// A newer-side fetch is in flight.
    pub fetching_newer: bool,
    /// Oldest message id loaded so far.
    pub first_message_id: Option<MessageId>,
    /// Newest message id loaded so far.
    pub last_message_id: Option<MessageId>,
}

impl FetchWindow {
    /// Returns true if both directions are exhausted.
    pub fn is_caught_up(&self) -> bool {
        self.older_caught_up && self.newer_caught_up
    }

    /// Returns true if any fetch is in flight.
    pub fn is_fetching(&self) -> bool {
        self.fetching_older || self.fetching_newer
    }

    fn widen(&mut self, first: Option<MessageId>, last: Option<MessageId>) {
        self.first_message_id = match (self.first_message_id, first) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.last_message_id = match (self.last_message_id, last) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

/// Process-wide session readiness.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    /// True from startup until a bootstrap completes. While set, no
    /// per-narrow fetch is issued.
    pub needs_initial_fetch: bool,
    /// The acting user, known after the realm is initialized.
    pub own_user_id: Option<UserId>,
    /// Server version, known after the realm is initialized.
    pub server_version: Option<ServerVersion>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            needs_initial_fetch: true,
            own_user_id: None,
            server_version: None,
        }
    }
}

impl SessionState {
    /// A session that has completed bootstrap.
    pub fn ready() -> Self {
        Self {
            needs_initial_fetch: false,
            ..Self::default()
        }
    }
}

/// Read access to fetch state plus the event sink that mutates it.
pub trait SyncStore: EventSink {
    /// Current session state.
    fn session(&self) -> SessionState;

    /// Current window for `narrow`; a default window if none was recorded.
    fn fetch_window(&self, narrow: &Narrow) -> FetchWindow;
}

impl<T: SyncStore + ?Sized> SyncStore for Arc<T> {
    fn session(&self) -> SessionState {
        (**self).session()
    }

    fn fetch_window(&self, narrow: &Narrow) -> FetchWindow {
        (**self).fetch_window(narrow)
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    session: SessionState,
    windows: HashMap<Narrow, FetchWindow>,
}

impl StoreInner {
    fn apply(&mut self, event: &SyncEvent) {
        match event {
            SyncEvent::FetchStarted {
                narrow,
                num_before,
                num_after,
            } => {
                let window = self.windows.entry(narrow.clone()).or_default();
                if *num_before > 0 && !window.older_caught_up {
                    window.fetching_older = true;
                }
                if *num_after > 0 && !window.newer_caught_up {
                    window.fetching_newer = true;
                }
            }
            SyncEvent::FetchCompleted {
                narrow,
                messages,
                num_before,
                num_after,
                found_newest,
                found_oldest,
                ..
            } => {
                let window = self.windows.entry(narrow.clone()).or_default();
                if *num_before > 0 {
                    window.fetching_older = false;
                }
                if *num_after > 0 {
                    window.fetching_newer = false;
                }
                window.older_caught_up |= *found_oldest;
                window.newer_caught_up |= *found_newest;
                if window.older_caught_up {
                    window.fetching_older = false;
                }
                if window.newer_caught_up {
                    window.fetching_newer = false;
                }
                window.widen(
                    messages.iter().map(|m| m.id).min(),
                    messages.iter().map(|m| m.id).max(),
                );
            }
            SyncEvent::FetchError { narrow, .. } => {
                if let Some(window) = self.windows.get_mut(narrow) {
                    window.fetching_older = false;
                    window.fetching_newer = false;
                }
            }
            SyncEvent::BootstrapStarted => self.session.needs_initial_fetch = true,
            SyncEvent::BootstrapCompleted | SyncEvent::BootstrapAborted { .. } => {
                self.session.needs_initial_fetch = false
            }
            SyncEvent::RealmInitialized {
                initial_data,
                server_version,
            } => {
                self.session.own_user_id = initial_data.user_id;
                self.session.server_version = Some(server_version.clone());
                self.windows.clear();
            }
        }
    }
}

/// In-memory fetch state store.
///
/// Observers registered with [`FetchStateStore::with_observer`] receive
/// each event after it has been applied, outside the store lock.
#[derive(Default)]
pub struct FetchStateStore {
    inner: RwLock<StoreInner>,
    observers: RwLock<Vec<Arc<dyn EventSink>>>,
}

impl FetchStateStore {
    /// Creates a store for a session that has not bootstrapped yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with the given session state.
    pub fn with_session(session: SessionState) -> Self {
        let store = Self::default();
        store.inner.write().session = session;
        store
    }

    /// Adds an observer.
    pub fn with_observer(self, observer: Arc<dyn EventSink>) -> Self {
        self.observers.write().push(observer);
        self
    }

    /// Narrows with a recorded window.
    pub fn narrows(&self) -> Vec<Narrow> {
        let mut narrows: Vec<_> = self.inner.read().windows.keys().cloned().collect();
        narrows.sort();
        narrows
    }
}

impl std::fmt::Debug for FetchStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchStateStore")
            .field("inner", &*self.inner.read())
            .field("observers", &self.observers.read().len())
            .finish()
    }
}

impl EventSink for FetchStateStore {
    fn emit(&self, event: SyncEvent) {
        self.inner.write().apply(&event);
        let observers = self.observers.read().clone();
        for observer in observers {
            observer.emit(event.clone());
        }
    }
}

impl SyncStore for FetchStateStore {
    fn session(&self) -> SessionState {
        self.inner.read().session.clone()
    }

    fn fetch_window(&self, narrow: &Narrow) -> FetchWindow {
        self.inner
            .read()
            .windows
            .get(narrow)
            .copied()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::events::EventLog;
    use chatsync_protocol::{Anchor, InitialData, Message};
    use proptest::prelude::*;

    fn started(narrow: &Narrow, num_before: u32, num_after: u32) -> SyncEvent {
        SyncEvent::FetchStarted {
            narrow: narrow.clone(),
            num_before,
            num_after,
        }
    }

    fn completed(
        narrow: &Narrow,
        ids: &[MessageId],
        num_before: u32,
        num_after: u32,
        found_oldest: bool,
        found_newest: bool,
    ) -> SyncEvent {
        SyncEvent::FetchCompleted {
            narrow: narrow.clone(),
            messages: ids
                .iter()
                .map(|&id| Message::stream(id, 1, "general", "t", "hi"))
                .collect(),
            anchor: Anchor::Newest,
            num_before,
            num_after,
            found_newest,
            found_oldest,
            own_user_id: Some(1),
        }
    }

    #[test]
    fn started_marks_requested_directions() {
        let store = FetchStateStore::new();
        let narrow = Narrow::stream("general");
        store.emit(started(&narrow, 100, 0));

        let window = store.fetch_window(&narrow);
        assert!(window.fetching_older);
        assert!(!window.fetching_newer);
    }

    #[test]
    fn found_oldest_sets_caught_up() {
        let store = FetchStateStore::new();
        let narrow = Narrow::stream("general");
        store.emit(started(&narrow, 100, 0));
        store.emit(completed(&narrow, &[2, 3, 4], 100, 0, true, false));

        let window = store.fetch_window(&narrow);
        assert!(window.older_caught_up);
        assert!(!window.fetching_older);
        assert_eq!(window.first_message_id, Some(2));
        assert_eq!(window.last_message_id, Some(4));
    }

    #[test]
    fn missing_found_oldest_leaves_flag_alone() {
        let store = FetchStateStore::new();
        let narrow = Narrow::Home;
        store.emit(started(&narrow, 100, 0));
        // A short page is not a signal; only the server flag is.
        store.emit(completed(&narrow, &[7], 100, 0, false, false));
        assert!(!store.fetch_window(&narrow).older_caught_up);

        store.emit(completed(&narrow, &[], 100, 0, true, false));
        store.emit(completed(&narrow, &[6], 100, 0, false, false));
        assert!(store.fetch_window(&narrow).older_caught_up);
    }

    #[test]
    fn window_only_widens() {
        let store = FetchStateStore::new();
        let narrow = Narrow::Home;
        store.emit(completed(&narrow, &[10, 11, 12], 50, 50, false, false));
        store.emit(completed(&narrow, &[11], 50, 50, false, false));
        store.emit(completed(&narrow, &[4, 5], 100, 0, false, false));

        let window = store.fetch_window(&narrow);
        assert_eq!(window.first_message_id, Some(4));
        assert_eq!(window.last_message_id, Some(12));
    }

    #[test]
    fn error_clears_fetching() {
        let store = FetchStateStore::new();
        let narrow = Narrow::AllPrivate;
        store.emit(started(&narrow, 50, 50));
        store.emit(SyncEvent::FetchError {
            narrow: narrow.clone(),
            error: SyncError::Timeout,
        });
        assert!(!store.fetch_window(&narrow).is_fetching());
    }

    #[test]
    fn bootstrap_events_drive_session_flag() {
        let store = FetchStateStore::new();
        assert!(store.session().needs_initial_fetch);

        store.emit(SyncEvent::BootstrapCompleted);
        assert!(!store.session().needs_initial_fetch);

        store.emit(SyncEvent::BootstrapStarted);
        assert!(store.session().needs_initial_fetch);
    }

    #[test]
    fn realm_init_resets_windows() {
        let store = FetchStateStore::with_session(SessionState::ready());
        store.emit(completed(&Narrow::Home, &[1], 0, 10, false, true));
        assert_eq!(store.narrows(), vec![Narrow::Home]);

        store.emit(SyncEvent::RealmInitialized {
            initial_data: InitialData::new("q", 3).with_user_id(9),
            server_version: ServerVersion::parse("4.0").unwrap(),
        });
        assert!(store.narrows().is_empty());
        assert_eq!(store.session().own_user_id, Some(9));
        assert_eq!(
            store.session().server_version.map(|v| v.numeric()),
            Some((4, 0, 0))
        );
    }

    #[test]
    fn observers_see_events_after_apply() {
        let log = Arc::new(EventLog::new());
        let store = FetchStateStore::new().with_observer(log.clone());
        store.emit(SyncEvent::BootstrapStarted);
        store.emit(SyncEvent::BootstrapCompleted);
        assert_eq!(log.kinds(), vec!["bootstrap_started", "bootstrap_completed"]);
    }

    fn arb_event() -> impl Strategy<Value = SyncEvent> {
        let narrow = prop_oneof![
            Just(Narrow::Home),
            Just(Narrow::stream("general")),
            Just(Narrow::AllPrivate),
        ];
        (narrow, 0u8..3, 0u32..3, 0u32..3, any::<bool>(), any::<bool>(), 1u64..50).prop_map(
            |(narrow, kind, before, after, oldest, newest, id)| match kind {
                0 => started(&narrow, before, after),
                1 => completed(&narrow, &[id, id + 1], before, after, oldest, newest),
                _ => SyncEvent::FetchError {
                    narrow,
                    error: SyncError::Timeout,
                },
            },
        )
    }

    proptest! {
        #[test]
        fn fetching_and_caught_up_never_coexist(events in prop::collection::vec(arb_event(), 0..40)) {
            let store = FetchStateStore::new();
            for event in events {
                store.emit(event);
                for narrow in store.narrows() {
                    let window = store.fetch_window(&narrow);
                    prop_assert!(!(window.fetching_older && window.older_caught_up));
                    prop_assert!(!(window.fetching_newer && window.newer_caught_up));
                }
            }
        }
    }
}
