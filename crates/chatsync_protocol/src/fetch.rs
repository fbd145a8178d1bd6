//! Message fetch requests and results.

use crate::message::{Anchor, Message, MessageId};
use crate::narrow::{Narrow, NarrowTerm};
use serde::{Deserialize, Serialize};

/// One page request for a narrow.
///
/// This is an ephemeral value describing a single network call; it is not
/// retained once the call settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Narrow to fetch from.
    pub narrow: Narrow,
    /// Reference point of the page.
    pub anchor: Anchor,
    /// Number of messages requested before the anchor.
    pub num_before: u32,
    /// Number of messages requested after the anchor.
    pub num_after: u32,
}

impl FetchRequest {
    /// Creates a new fetch request.
    pub fn new(narrow: Narrow, anchor: Anchor, num_before: u32, num_after: u32) -> Self {
        Self {
            narrow,
            anchor,
            num_before,
            num_after,
        }
    }

    /// Creates a request for older messages before `first_id`.
    pub fn older(narrow: Narrow, first_id: MessageId, count: u32) -> Self {
        Self::new(narrow, Anchor::Message(first_id), count, 0)
    }

    /// Creates a request for newer messages after `last_id`.
    pub fn newer(narrow: Narrow, last_id: MessageId, count: u32) -> Self {
        Self::new(narrow, Anchor::Message(last_id), 0, count)
    }

    /// Translates the request into its wire query.
    pub fn to_query(&self) -> MessagesQuery {
        MessagesQuery {
            narrow: self.narrow.to_api_narrow(),
            anchor: self.anchor,
            num_before: self.num_before,
            num_after: self.num_after,
        }
    }
}

/// Wire form of a fetch request, with the narrow already translated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesQuery {
    /// Wire narrow.
    pub narrow: Vec<NarrowTerm>,
    /// Anchor.
    pub anchor: Anchor,
    /// Number of messages before the anchor.
    pub num_before: u32,
    /// Number of messages after the anchor.
    pub num_after: u32,
}

/// Result of one page request.
///
/// `found_oldest` and `found_newest` are authoritative server signals that
/// no further messages exist in that direction. They are never inferred
/// from the number of messages returned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResult {
    /// Messages in ascending id order.
    pub messages: Vec<Message>,
    /// No newer messages exist in the narrow.
    #[serde(default)]
    pub found_newest: bool,
    /// No older messages exist in the narrow.
    #[serde(default)]
    pub found_oldest: bool,
}

impl FetchResult {
    /// Creates a new fetch result.
    pub fn new(messages: Vec<Message>, found_oldest: bool, found_newest: bool) -> Self {
        Self {
            messages,
            found_newest,
            found_oldest,
        }
    }

    /// Smallest message id in the result.
    pub fn first_id(&self) -> Option<MessageId> {
        self.messages.iter().map(|m| m.id).min()
    }

    /// Largest message id in the result.
    pub fn last_id(&self) -> Option<MessageId> {
        self.messages.iter().map(|m| m.id).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn older_request_shape() {
        let request = FetchRequest::older(Narrow::stream("general"), 5, 100);
        assert_eq!(request.anchor, Anchor::Message(5));
        assert_eq!(request.num_before, 100);
        assert_eq!(request.num_after, 0);
    }

    #[test]
    fn query_carries_wire_narrow() {
        let query = FetchRequest::new(Narrow::Starred, Anchor::Newest, 10, 0).to_query();
        assert_eq!(query.narrow, vec![NarrowTerm::new("is", "starred")]);
        assert_eq!(query.anchor, Anchor::Newest);
    }

    #[test]
    fn result_defaults_missing_flags_to_false() {
        let result: FetchResult = serde_json::from_str(r#"{"messages": []}"#).unwrap();
        assert!(!result.found_oldest);
        assert!(!result.found_newest);
        assert_eq!(result.first_id(), None);
    }

    #[test]
    fn result_id_bounds() {
        let messages = [12, 9, 30]
            .into_iter()
            .map(|id| crate::Message::stream(id, 2, "general", "lunch", "hi"))
            .collect();
        let result = FetchResult::new(messages, false, true);
        assert_eq!(result.first_id(), Some(9));
        assert_eq!(result.last_id(), Some(30));
    }
}
