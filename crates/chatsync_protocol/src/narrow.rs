//! Narrows: named filters over the message stream.

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::UserId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A filtered subset of the message stream, such as one conversation.
///
/// Narrows are value types with structural equality and are used as map
/// keys for per-narrow fetch bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Narrow {
    /// Every message the user can see.
    Home,
    /// All topics of one stream.
    Stream {
        /// Stream name.
        stream: String,
    },
    /// One topic within a stream.
    Topic {
        /// Stream name.
        stream: String,
        /// Topic name.
        topic: String,
    },
    /// A private conversation with a fixed set of users.
    Private {
        /// Other participants, sorted and deduplicated.
        user_ids: Vec<UserId>,
    },
    /// All private conversations.
    AllPrivate,
    /// Starred messages.
    Starred,
    /// Messages mentioning the user.
    Mentioned,
    /// Full-text search results.
    Search {
        /// Search query.
        query: String,
    },
}

impl Narrow {
    /// Creates a stream narrow.
    pub fn stream(stream: impl Into<String>) -> Self {
        Narrow::Stream {
            stream: stream.into(),
        }
    }

    /// Creates a topic narrow.
    pub fn topic(stream: impl Into<String>, topic: impl Into<String>) -> Self {
        Narrow::Topic {
            stream: stream.into(),
            topic: topic.into(),
        }
    }

    /// Creates a private-conversation narrow.
    ///
    /// The user ids are sorted and deduplicated so that the same set of
    /// participants always yields an equal narrow.
    pub fn private(user_ids: impl IntoIterator<Item = UserId>) -> Self {
        let mut user_ids: Vec<UserId> = user_ids.into_iter().collect();
        user_ids.sort_unstable();
        user_ids.dedup();
        Narrow::Private { user_ids }
    }

    /// Creates a search narrow.
    pub fn search(query: impl Into<String>) -> Self {
        Narrow::Search {
            query: query.into(),
        }
    }

    /// Translates this narrow into the server's wire representation.
    pub fn to_api_narrow(&self) -> Vec<NarrowTerm> {
        match self {
            Narrow::Home => Vec::new(),
            Narrow::Stream { stream } => vec![NarrowTerm::new("stream", stream.as_str())],
            Narrow::Topic { stream, topic } => vec![
                NarrowTerm::new("stream", stream.as_str()),
                NarrowTerm::new("topic", topic.as_str()),
            ],
            Narrow::Private { user_ids } => vec![NarrowTerm::new("pm-with", user_ids.clone())],
            Narrow::AllPrivate => vec![NarrowTerm::new("is", "private")],
            Narrow::Starred => vec![NarrowTerm::new("is", "starred")],
            Narrow::Mentioned => vec![NarrowTerm::new("is", "mentioned")],
            Narrow::Search { query } => vec![NarrowTerm::new("search", query.as_str())],
        }
    }

    /// Reconstructs a narrow from its wire representation.
    pub fn from_api_narrow(terms: &[NarrowTerm]) -> ProtocolResult<Self> {
        match terms {
            [] => Ok(Narrow::Home),
            [stream, topic] if stream.operator == "stream" && topic.operator == "topic" => {
                Ok(Narrow::topic(stream.text()?, topic.text()?))
            }
            [term] => match term.operator.as_str() {
                "stream" => Ok(Narrow::stream(term.text()?)),
                "search" => Ok(Narrow::search(term.text()?)),
                "pm-with" => {
                    let ids = term
                        .operand
                        .as_array()
                        .and_then(|items| items.iter().map(Value::as_u64).collect::<Option<Vec<_>>>())
                        .ok_or_else(|| term.unsupported())?;
                    Ok(Narrow::private(ids))
                }
                "is" => match term.text()? {
                    "private" => Ok(Narrow::AllPrivate),
                    "starred" => Ok(Narrow::Starred),
                    "mentioned" => Ok(Narrow::Mentioned),
                    _ => Err(term.unsupported()),
                },
                _ => Err(term.unsupported()),
            },
            [first, ..] => Err(first.unsupported()),
        }
    }
}

impl fmt::Display for Narrow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Narrow::Home => write!(f, "home"),
            Narrow::Stream { stream } => write!(f, "stream:{stream}"),
            Narrow::Topic { stream, topic } => write!(f, "topic:{stream}/{topic}"),
            Narrow::Private { user_ids } => {
                let ids: Vec<String> = user_ids.iter().map(ToString::to_string).collect();
                write!(f, "pm:{}", ids.join(","))
            }
            Narrow::AllPrivate => write!(f, "private"),
            Narrow::Starred => write!(f, "starred"),
            Narrow::Mentioned => write!(f, "mentioned"),
            Narrow::Search { query } => write!(f, "search:{query}"),
        }
    }
}

impl FromStr for Narrow {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidNarrow(s.to_string());
        match s.split_once(':') {
            None => match s {
                "home" => Ok(Narrow::Home),
                "private" => Ok(Narrow::AllPrivate),
                "starred" => Ok(Narrow::Starred),
                "mentioned" => Ok(Narrow::Mentioned),
                _ => Err(invalid()),
            },
            Some((_, "")) => Err(invalid()),
            Some(("stream", stream)) => Ok(Narrow::stream(stream)),
            Some(("topic", rest)) => {
                let (stream, topic) = rest.split_once('/').ok_or_else(invalid)?;
                if stream.is_empty() || topic.is_empty() {
                    return Err(invalid());
                }
                Ok(Narrow::topic(stream, topic))
            }
            Some(("pm", ids)) => {
                let ids = ids
                    .split(',')
                    .map(|id| id.trim().parse::<UserId>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| invalid())?;
                Ok(Narrow::private(ids))
            }
            Some(("search", query)) => Ok(Narrow::search(query)),
            Some(_) => Err(invalid()),
        }
    }
}

/// One `{operator, operand}` term of a wire narrow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrowTerm {
    /// Term operator (`stream`, `topic`, `pm-with`, `is`, `search`).
    pub operator: String,
    /// Term operand.
    pub operand: Value,
}

impl NarrowTerm {
    /// Creates a new narrow term.
    pub fn new(operator: impl Into<String>, operand: impl Into<Value>) -> Self {
        Self {
            operator: operator.into(),
            operand: operand.into(),
        }
    }

    fn text(&self) -> ProtocolResult<&str> {
        self.operand.as_str().ok_or_else(|| self.unsupported())
    }

    fn unsupported(&self) -> ProtocolError {
        ProtocolError::UnsupportedTerm {
            operator: self.operator.clone(),
            operand: self.operand.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn private_narrow_is_order_insensitive() {
        assert_eq!(Narrow::private([7, 3, 7]), Narrow::private([3, 7]));

        let mut windows = HashMap::new();
        windows.insert(Narrow::private([3, 7]), 1);
        assert_eq!(windows.get(&Narrow::private([7, 3])), Some(&1));
    }

    #[test]
    fn api_narrow_for_topic() {
        let terms = Narrow::topic("general", "lunch").to_api_narrow();
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[0].operator, "stream");
        assert_eq!(terms[0].operand, Value::from("general"));
        assert_eq!(terms[1].operator, "topic");
        assert_eq!(terms[1].operand, Value::from("lunch"));
    }

    #[test]
    fn api_narrow_for_home_is_empty() {
        assert!(Narrow::Home.to_api_narrow().is_empty());
    }

    #[test]
    fn api_narrow_json_shape() {
        let json = serde_json::to_string(&Narrow::private([5, 2]).to_api_narrow()).unwrap();
        assert_eq!(json, r#"[{"operator":"pm-with","operand":[2,5]}]"#);
    }

    #[test]
    fn wire_narrow_is_understood_by_the_server_side() {
        for narrow in [
            Narrow::Home,
            Narrow::stream("general"),
            Narrow::topic("general", "lunch"),
            Narrow::private([1, 2]),
            Narrow::AllPrivate,
            Narrow::Starred,
            Narrow::Mentioned,
            Narrow::search("deploy"),
        ] {
            let terms = narrow.to_api_narrow();
            assert_eq!(Narrow::from_api_narrow(&terms).unwrap(), narrow);
        }
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let terms = vec![NarrowTerm::new("sender", "iago@example.com")];
        let err = Narrow::from_api_narrow(&terms).unwrap_err();
        assert!(matches!(err, ProtocolError::UnsupportedTerm { .. }));
    }

    #[test]
    fn parses_textual_narrows() {
        assert_eq!("home".parse::<Narrow>().unwrap(), Narrow::Home);
        assert_eq!(
            "stream:general".parse::<Narrow>().unwrap(),
            Narrow::stream("general")
        );
        assert_eq!(
            "topic:general/lunch".parse::<Narrow>().unwrap(),
            Narrow::topic("general", "lunch")
        );
        assert_eq!(
            "pm:9,4".parse::<Narrow>().unwrap(),
            Narrow::private([4, 9])
        );
        assert_eq!(Narrow::private([4, 9]).to_string(), "pm:4,9");
    }

    #[test]
    fn rejects_malformed_textual_narrows() {
        assert!("topic:general".parse::<Narrow>().is_err());
        assert!("pm:a,b".parse::<Narrow>().is_err());
        assert!("stream:".parse::<Narrow>().is_err());
        assert!("everything".parse::<Narrow>().is_err());
    }
}
