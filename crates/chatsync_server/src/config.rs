//! Server configuration.

use chatsync_protocol::UserId;

/// Configuration for the reference server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Human-readable realm name.
    pub realm_name: String,
    /// Version string reported by the settings endpoint.
    pub server_version: String,
    /// Largest `num_before` or `num_after` accepted by the messages endpoint.
    pub max_messages_per_request: u32,
    /// The user every authenticated request acts as.
    pub own_user_id: UserId,
    /// Whether to require a valid API key.
    pub require_auth: bool,
    /// Secret key for API key validation (if auth enabled).
    pub auth_secret: Option<Vec<u8>>,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(realm_name: impl Into<String>, server_version: impl Into<String>) -> Self {
        Self {
            realm_name: realm_name.into(),
            server_version: server_version.into(),
            max_messages_per_request: 5000,
            own_user_id: 1,
            require_auth: false,
            auth_secret: None,
        }
    }

    /// Sets the reported server version.
    pub fn with_server_version(mut self, version: impl Into<String>) -> Self {
        self.server_version = version.into();
        self
    }

    /// Sets the maximum page size.
    pub fn with_max_messages_per_request(mut self, max: u32) -> Self {
        self.max_messages_per_request = max;
        self
    }

    /// Sets the acting user.
    pub fn with_own_user_id(mut self, user_id: UserId) -> Self {
        self.own_user_id = user_id;
        self
    }

    /// Enables authentication with the given secret.
    pub fn with_auth(mut self, secret: Vec<u8>) -> Self {
        self.require_auth = true;
        self.auth_secret = Some(secret);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("Chatsync Dev", "5.0")
    }
}
