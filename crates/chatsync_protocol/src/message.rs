//! Messages and fetch anchors.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Server-assigned message id. Ids increase monotonically and are globally
/// ordered on one server.
pub type MessageId = u64;

/// Server-assigned user id.
pub type UserId = u64;

/// Where a message was sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Recipient {
    /// A stream message.
    Stream {
        /// Stream name.
        stream: String,
        /// Topic name.
        topic: String,
    },
    /// A private message.
    Private {
        /// All participants, including the sender.
        user_ids: Vec<UserId>,
    },
}

/// An emoji reaction on a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    /// Emoji name.
    pub emoji_name: String,
    /// Reacting user.
    pub user_id: UserId,
}

/// A message as returned by the server.
///
/// The engine never holds message bodies longer than one fetch cycle;
/// once delivered in a completion event they belong to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message id.
    pub id: MessageId,
    /// Sender.
    pub sender_id: UserId,
    /// Rendered content.
    pub content: String,
    /// Unix timestamp in seconds.
    pub timestamp: i64,
    /// Recipient.
    #[serde(flatten)]
    pub recipient: Recipient,
    /// Reactions.
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    /// Per-user flags (`read`, `starred`, `mentioned`, ...).
    #[serde(default)]
    pub flags: Vec<String>,
}

impl Message {
    /// Creates a stream message with no reactions or flags.
    pub fn stream(
        id: MessageId,
        sender_id: UserId,
        stream: impl Into<String>,
        topic: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id,
            sender_id,
            content: content.into(),
            timestamp: 0,
            recipient: Recipient::Stream {
                stream: stream.into(),
                topic: topic.into(),
            },
            reactions: Vec::new(),
            flags: Vec::new(),
        }
    }

    /// Creates a private message with no reactions or flags.
    pub fn private(
        id: MessageId,
        sender_id: UserId,
        user_ids: impl IntoIterator<Item = UserId>,
        content: impl Into<String>,
    ) -> Self {
        let mut user_ids: Vec<UserId> = user_ids.into_iter().collect();
        user_ids.sort_unstable();
        user_ids.dedup();
        Self {
            id,
            sender_id,
            content: content.into(),
            timestamp: 0,
            recipient: Recipient::Private { user_ids },
            reactions: Vec::new(),
            flags: Vec::new(),
        }
    }

    /// Adds a flag.
    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    /// Returns true if the message carries the given flag.
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }
}

/// The reference point a page of messages is fetched around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Anchor {
    /// A specific message id.
    Message(MessageId),
    /// The first unread message in the narrow (or the newest, if all are read).
    FirstUnread,
    /// The most recent message in the narrow.
    Newest,
}

impl Default for Anchor {
    fn default() -> Self {
        Anchor::FirstUnread
    }
}

impl Anchor {
    /// Returns the wire form of the anchor.
    pub fn to_wire(&self) -> String {
        self.to_string()
    }

    /// Returns the message id, if this anchor names one.
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            Anchor::Message(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anchor::Message(id) => write!(f, "{id}"),
            Anchor::FirstUnread => write!(f, "first_unread"),
            Anchor::Newest => write!(f, "newest"),
        }
    }
}

impl FromStr for Anchor {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        match s {
            "first_unread" => Ok(Anchor::FirstUnread),
            "newest" => Ok(Anchor::Newest),
            other => other
                .parse::<MessageId>()
                .map(Anchor::Message)
                .map_err(|_| ProtocolError::InvalidAnchor(s.to_string())),
        }
    }
}

impl Serialize for Anchor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Anchor::Message(id) => serializer.serialize_u64(*id),
            other => serializer.serialize_str(&other.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for Anchor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Id(MessageId),
            Named(String),
        }

        match Wire::deserialize(deserializer)? {
            Wire::Id(id) => Ok(Anchor::Message(id)),
            Wire::Named(name) => name.parse().map_err(serde::de::Error::custom),
        }
    }
}
