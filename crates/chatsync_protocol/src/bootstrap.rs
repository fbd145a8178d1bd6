//! Bootstrap types: event registration and server metadata.

use crate::message::UserId;
use crate::version::ServerVersion;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Options sent when registering for the real-time event feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterOptions {
    /// Kinds of state the server should include in the initial data.
    pub fetch_event_types: Vec<String>,
    /// Ask the server to render message content.
    pub apply_markdown: bool,
    /// Include stream subscriber lists.
    pub include_subscribers: bool,
    /// Let the client compute gravatar urls itself.
    pub client_gravatar: bool,
    /// Capabilities the client declares.
    pub client_capabilities: ClientCapabilities,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        let fetch_event_types = [
            "alert_words",
            "message",
            "muted_topics",
            "presence",
            "realm",
            "realm_emoji",
            "realm_filters",
            "realm_user",
            "realm_user_groups",
            "recent_private_conversations",
            "stream",
            "subscription",
            "update_display_settings",
            "update_global_notifications",
            "update_message_flags",
            "user_status",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        Self {
            fetch_event_types,
            apply_markdown: true,
            include_subscribers: false,
            client_gravatar: true,
            client_capabilities: ClientCapabilities::default(),
        }
    }
}

/// Capability flags declared at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCapabilities {
    /// Client accepts null per-stream notification settings.
    pub notification_settings_null: bool,
    /// Client handles bulk message deletion events.
    pub bulk_message_deletion: bool,
    /// Client tolerates users without an avatar url.
    pub user_avatar_url_field_optional: bool,
}

impl Default for ClientCapabilities {
    fn default() -> Self {
        Self {
            notification_settings_null: true,
            bulk_message_deletion: true,
            user_avatar_url_field_optional: true,
        }
    }
}

/// Initial state returned by event registration.
///
/// Only the fields the sync core needs are typed; the rest of the state is
/// kept opaque and handed to the store unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialData {
    /// Event queue to poll.
    pub queue_id: String,
    /// Id of the last event already reflected in this state.
    pub last_event_id: i64,
    /// The acting user.
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Remaining state, keyed by kind.
    #[serde(flatten)]
    pub state: Map<String, Value>,
}

impl InitialData {
    /// Creates initial data with empty state.
    pub fn new(queue_id: impl Into<String>, last_event_id: i64) -> Self {
        Self {
            queue_id: queue_id.into(),
            last_event_id,
            user_id: None,
            state: Map::new(),
        }
    }

    /// Sets the acting user.
    pub fn with_user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

/// Server metadata returned by the settings endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Raw server version string.
    pub server_version: String,
    /// Human-readable realm name.
    #[serde(default)]
    pub realm_name: Option<String>,
}

impl ServerSettings {
    /// Creates settings reporting the given version.
    pub fn new(server_version: impl Into<String>) -> Self {
        Self {
            server_version: server_version.into(),
            realm_name: None,
        }
    }
}

/// The one-time result of bootstrapping a session.
///
/// Created once per login session and consumed immediately to seed the
/// store and start event polling.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapSnapshot {
    /// Initial state.
    pub initial_data: InitialData,
    /// Parsed server version.
    pub server_version: ServerVersion,
    /// Event queue to poll.
    pub queue_id: String,
    /// Last event already reflected in the initial state.
    pub last_event_id: i64,
}

impl BootstrapSnapshot {
    /// Assembles a snapshot from registration data and the server version.
    pub fn new(initial_data: InitialData, server_version: ServerVersion) -> Self {
        Self {
            queue_id: initial_data.queue_id.clone(),
            last_event_id: initial_data.last_event_id,
            initial_data,
            server_version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_register_options() {
        let options = RegisterOptions::default();
        assert!(options.apply_markdown);
        assert!(!options.include_subscribers);
        assert!(options
            .fetch_event_types
            .iter()
            .any(|t| t == "recent_private_conversations"));
    }

    #[test]
    fn initial_data_keeps_unknown_state() {
        let json = r#"{
            "queue_id": "1517975029:0",
            "last_event_id": -1,
            "user_id": 12,
            "realm_name": "Example",
            "max_message_id": 880
        }"#;
        let data: InitialData = serde_json::from_str(json).unwrap();
        assert_eq!(data.queue_id, "1517975029:0");
        assert_eq!(data.last_event_id, -1);
        assert_eq!(data.user_id, Some(12));
        assert_eq!(data.state.get("max_message_id"), Some(&Value::from(880)));
    }

    #[test]
    fn snapshot_copies_queue_identity() {
        let data = InitialData::new("q:1", 41);
        let snapshot = BootstrapSnapshot::new(data, ServerVersion::parse("3.0").unwrap());
        assert_eq!(snapshot.queue_id, "q:1");
        assert_eq!(snapshot.last_event_id, 41);
    }
}
