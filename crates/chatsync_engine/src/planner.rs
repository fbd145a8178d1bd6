//! Pagination planner.
//!
//! Decides whether a narrow needs more messages and with which parameters.
//! The planner is pure: it reads a [`SessionState`] and a [`FetchWindow`]
//! and returns a [`FetchDecision`].

use crate::state::{FetchWindow, SessionState};
use chatsync_protocol::{Anchor, FetchRequest, Narrow};

/// Why a fetch was not issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The session has not bootstrapped yet.
    BootstrapPending,
    /// A fetch in this direction is already in flight.
    AlreadyFetching,
    /// The server reported no more messages in this direction.
    CaughtUp,
    /// No message is loaded yet, so there is nothing to page from.
    NoAnchor,
}

/// Outcome of planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchDecision {
    /// Issue this request.
    Fetch(FetchRequest),
    /// Do nothing.
    Skip(SkipReason),
}

impl FetchDecision {
    /// Returns the request, if one should be issued.
    pub fn request(&self) -> Option<&FetchRequest> {
        match self {
            FetchDecision::Fetch(request) => Some(request),
            FetchDecision::Skip(_) => None,
        }
    }
}

/// Plans fetches with a fixed page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationPlanner {
    page_size: u32,
}

impl PaginationPlanner {
    /// Creates a planner.
    pub fn new(page_size: u32) -> Self {
        Self { page_size }
    }

    /// Page size used for older/newer fetches.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Plans a fetch of older messages, anchored at the first loaded id.
    pub fn plan_older(
        &self,
        session: &SessionState,
        narrow: &Narrow,
        window: &FetchWindow,
    ) -> FetchDecision {
        if session.needs_initial_fetch {
            return FetchDecision::Skip(SkipReason::BootstrapPending);
        }
        if window.fetching_older {
            return FetchDecision::Skip(SkipReason::AlreadyFetching);
        }
        if window.older_caught_up {
            return FetchDecision::Skip(SkipReason::CaughtUp);
        }
        match window.first_message_id {
            Some(first) => {
                FetchDecision::Fetch(FetchRequest::older(narrow.clone(), first, self.page_size))
            }
            None => FetchDecision::Skip(SkipReason::NoAnchor),
        }
    }

    /// Plans a fetch of newer messages, anchored at the last loaded id.
    pub fn plan_newer(
        &self,
        session: &SessionState,
        narrow: &Narrow,
        window: &FetchWindow,
    ) -> FetchDecision {
        if session.needs_initial_fetch {
            return FetchDecision::Skip(SkipReason::BootstrapPending);
        }
        if window.fetching_newer {
            return FetchDecision::Skip(SkipReason::AlreadyFetching);
        }
        if window.newer_caught_up {
            return FetchDecision::Skip(SkipReason::CaughtUp);
        }
        match window.last_message_id {
            Some(last) => {
                FetchDecision::Fetch(FetchRequest::newer(narrow.clone(), last, self.page_size))
            }
            None => FetchDecision::Skip(SkipReason::NoAnchor),
        }
    }

    /// Plans the fetch used when a narrow is opened.
    ///
    /// Skips only when both directions are caught up; otherwise requests
    /// half a page on each side of `anchor`.
    pub fn plan_around(&self, narrow: &Narrow, anchor: Anchor, window: &FetchWindow) -> FetchDecision {
        if window.is_caught_up() {
            return FetchDecision::Skip(SkipReason::CaughtUp);
        }
        let half = self.page_size / 2;
        FetchDecision::Fetch(FetchRequest::new(narrow.clone(), anchor, half, half))
    }

    /// The recent private messages fetch for servers that do not include
    /// them in the initial state.
    pub fn plan_recent_private(count: u32) -> FetchRequest {
        FetchRequest::new(Narrow::AllPrivate, Anchor::Newest, count, 0)
    }
}
