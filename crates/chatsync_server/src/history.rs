//! Server-side message history.

use chatsync_protocol::{Anchor, FetchResult, Message, MessageId, Narrow, Recipient, UserId};
use parking_lot::RwLock;

/// Message history of one realm.
///
/// The history maintains:
/// - All messages in ascending id order
/// - The next id to assign
///
/// Pagination follows anchor semantics: `num_before` messages older than the
/// anchor, the anchor message itself if it matches, and `num_after` newer
/// messages. `found_oldest`/`found_newest` report whether the page reached
/// the end of the narrow in each direction.
pub struct MessageHistory {
    messages: RwLock<Vec<Message>>,
    next_id: RwLock<MessageId>,
}

impl MessageHistory {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::with_next_id(1)
    }

    /// Creates an empty history whose first message gets `next_id`.
    pub fn with_next_id(next_id: MessageId) -> Self {
        Self {
            messages: RwLock::new(Vec::new()),
            next_id: RwLock::new(next_id),
        }
    }

    /// Returns the number of messages.
    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    /// Returns true if there are no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }

    /// Largest message id, if any.
    pub fn max_message_id(&self) -> Option<MessageId> {
        self.messages.read().last().map(|m| m.id)
    }

    /// Appends a message, assigning it the next id. Returns the id.
    pub fn append(&self, mut message: Message) -> MessageId {
        let mut next = self.next_id.write();
        message.id = *next;
        *next += 1;
        let id = message.id;
        self.messages.write().push(message);
        id
    }

    /// Marks every message up to and including `up_to` as read.
    pub fn mark_read_through(&self, up_to: MessageId) {
        for message in self.messages.write().iter_mut() {
            if message.id <= up_to && !message.has_flag("read") {
                message.flags.push("read".to_string());
            }
        }
    }

    /// Fetches one page of `narrow` around `anchor`, as seen by `own_user_id`.
    pub fn fetch(
        &self,
        narrow: &Narrow,
        anchor: Anchor,
        num_before: u32,
        num_after: u32,
        own_user_id: UserId,
    ) -> FetchResult {
        let messages = self.messages.read();
        let matching: Vec<&Message> = messages
            .iter()
            .filter(|m| matches_narrow(narrow, m, own_user_id))
            .collect();

        let anchor_id = match anchor {
            Anchor::Message(id) => id,
            Anchor::Newest => MessageId::MAX,
            Anchor::FirstUnread => matching
                .iter()
                .find(|m| !m.has_flag("read"))
                .map(|m| m.id)
                .unwrap_or(MessageId::MAX),
        };

        let split = matching.partition_point(|m| m.id < anchor_id);
        let (before, rest) = matching.split_at(split);
        let (at_anchor, after) = match rest.first() {
            Some(m) if m.id == anchor_id => rest.split_at(1),
            _ => rest.split_at(0),
        };

        let num_before = num_before as usize;
        let num_after = num_after as usize;
        let older = &before[before.len().saturating_sub(num_before)..];
        let newer = &after[..after.len().min(num_after)];

        let page = older
            .iter()
            .chain(at_anchor)
            .chain(newer)
            .map(|m| (*m).clone())
            .collect();

        FetchResult::new(page, before.len() <= num_before, after.len() <= num_after)
    }
}

impl Default for MessageHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MessageHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageHistory")
            .field("len", &self.len())
            .field("next_id", &*self.next_id.read())
            .finish()
    }
}

/// Returns true if `message` belongs to `narrow` for `own_user_id`.
pub fn matches_narrow(narrow: &Narrow, message: &Message, own_user_id: UserId) -> bool {
    match (narrow, &message.recipient) {
        (Narrow::Home, _) => true,
        (Narrow::Stream { stream }, Recipient::Stream { stream: s, .. }) => s == stream,
        (Narrow::Topic { stream, topic }, Recipient::Stream { stream: s, topic: t }) => {
            s == stream && t.eq_ignore_ascii_case(topic)
        }
        (Narrow::Private { user_ids }, Recipient::Private { user_ids: members }) => {
            let others: Vec<UserId> = members
                .iter()
                .copied()
                .filter(|id| *id != own_user_id)
                .collect();
            if others.is_empty() {
                // Messages to oneself.
                user_ids.as_slice() == [own_user_id]
            } else {
                others == *user_ids
            }
        }
        (Narrow::AllPrivate, Recipient::Private { .. }) => true,
        (Narrow::Starred, _) => message.has_flag("starred"),
        (Narrow::Mentioned, _) => {
            message.has_flag("mentioned") || message.has_flag("wildcard_mentioned")
        }
        (Narrow::Search { query }, _) => message
            .content
            .to_lowercase()
            .contains(&query.to_lowercase()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn seeded(count: u64) -> MessageHistory {
        let history = MessageHistory::new();
        for i in 0..count {
            history.append(Message::stream(0, 2, "general", "lunch", format!("msg {i}")));
        }
        history
    }

    fn ids(result: &FetchResult) -> Vec<MessageId> {
        result.messages.iter().map(|m| m.id).collect()
    }

    #[test]
    fn append_assigns_ids() {
        let history = MessageHistory::with_next_id(100);
        assert!(history.is_empty());
        assert_eq!(history.append(Message::stream(0, 1, "a", "b", "c")), 100);
        assert_eq!(history.append(Message::stream(0, 1, "a", "b", "c")), 101);
        assert_eq!(history.max_message_id(), Some(101));
    }

    #[test]
    fn older_page_includes_anchor() {
        let history = seeded(10);
        let result = history.fetch(&Narrow::Home, Anchor::Message(5), 2, 0, 1);
        assert_eq!(ids(&result), vec![3, 4, 5]);
        assert!(!result.found_oldest);
        assert!(!result.found_newest);
    }

    #[test]
    fn pages_report_ends() {
        let history = seeded(10);
        let result = history.fetch(&Narrow::Home, Anchor::Message(3), 5, 0, 1);
        assert_eq!(ids(&result), vec![1, 2, 3]);
        assert!(result.found_oldest);

        let result = history.fetch(&Narrow::Home, Anchor::Message(8), 0, 5, 1);
        assert_eq!(ids(&result), vec![8, 9, 10]);
        assert!(result.found_newest);
    }

    #[test]
    fn newest_anchor() {
        let history = seeded(10);
        let result = history.fetch(&Narrow::Home, Anchor::Newest, 3, 0, 1);
        assert_eq!(ids(&result), vec![8, 9, 10]);
        assert!(result.found_newest);
        assert!(!result.found_oldest);
    }

    #[test]
    fn first_unread_anchor() {
        let history = seeded(10);
        history.mark_read_through(6);
        let result = history.fetch(&Narrow::Home, Anchor::FirstUnread, 1, 1, 1);
        assert_eq!(ids(&result), vec![6, 7, 8]);

        history.mark_read_through(10);
        let result = history.fetch(&Narrow::Home, Anchor::FirstUnread, 1, 1, 1);
        assert_eq!(ids(&result), vec![10]);
        assert!(result.found_newest);
    }

    #[test]
    fn empty_narrow_is_caught_up() {
        let history = seeded(3);
        let result = history.fetch(&Narrow::Starred, Anchor::Newest, 50, 50, 1);
        assert!(result.messages.is_empty());
        assert!(result.found_oldest && result.found_newest);
    }

    #[test]
    fn narrow_filtering() {
        let history = MessageHistory::new();
        history.append(Message::stream(0, 2, "general", "Lunch", "soup today"));
        history.append(Message::stream(0, 2, "design", "logo", "new logo"));
        history.append(Message::private(0, 3, [1, 3], "hi there").with_flag("starred"));
        history.append(Message::private(0, 1, [1], "note to self"));
        history.append(Message::private(0, 4, [1, 3, 4], "group").with_flag("mentioned"));

        let fetch = |narrow: Narrow| ids(&history.fetch(&narrow, Anchor::Newest, 100, 0, 1));
        assert_eq!(fetch(Narrow::stream("general")), vec![1]);
        assert_eq!(fetch(Narrow::topic("general", "lunch")), vec![1]);
        assert_eq!(fetch(Narrow::private([3])), vec![3]);
        assert_eq!(fetch(Narrow::private([1])), vec![4]);
        assert_eq!(fetch(Narrow::private([4, 3])), vec![5]);
        assert_eq!(fetch(Narrow::AllPrivate), vec![3, 4, 5]);
        assert_eq!(fetch(Narrow::Starred), vec![3]);
        assert_eq!(fetch(Narrow::Mentioned), vec![5]);
        assert_eq!(fetch(Narrow::search("LOGO")), vec![2]);
    }

    proptest! {
        #[test]
        fn page_respects_counts(
            total in 0u64..60,
            anchor in 0u64..70,
            before in 0u32..20,
            after in 0u32..20,
        ) {
            let history = seeded(total);
            let result = history.fetch(&Narrow::Home, Anchor::Message(anchor), before, after, 1);
            let ids = ids(&result);

            prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(ids.len() <= (before + after) as usize + 1);
            prop_assert_eq!(result.found_oldest, anchor.saturating_sub(1).min(total) <= before as u64);
            prop_assert_eq!(result.found_newest, total.saturating_sub(anchor) <= after as u64);
        }
    }
}
