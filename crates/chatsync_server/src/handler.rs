//! Request handlers for the chat endpoints.

use crate::auth::ApiKeyValidator;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::faults::{Endpoint, FaultInjector};
use crate::history::MessageHistory;
use chatsync_protocol::{
    FetchResult, InitialData, MessagesQuery, Narrow, RegisterOptions, ServerSettings, UserId,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Message history (shared across all handlers).
    pub history: Arc<MessageHistory>,
    /// Fault injector (shared across all handlers).
    pub faults: Arc<FaultInjector>,
    /// Registered event queues (queue_id -> queue info).
    queues: RwLock<HashMap<String, EventQueue>>,
    next_queue: AtomicU64,
    validator: Option<ApiKeyValidator>,
}

/// Information about a registered event queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQueue {
    /// Owner of the queue.
    pub user_id: UserId,
    /// Event types the client asked for.
    pub event_types: Vec<String>,
    /// Last event id handed out.
    pub last_event_id: i64,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, history: Arc<MessageHistory>) -> Self {
        let validator = config.auth_secret.clone().map(ApiKeyValidator::new);
        Self {
            config,
            history,
            faults: Arc::new(FaultInjector::new()),
            queues: RwLock::new(HashMap::new()),
            next_queue: AtomicU64::new(1),
            validator,
        }
    }

    /// Looks up a registered queue.
    pub fn queue(&self, queue_id: &str) -> Option<EventQueue> {
        self.queues.read().get(queue_id).cloned()
    }

    /// Number of registered queues.
    pub fn queue_count(&self) -> usize {
        self.queues.read().len()
    }

    /// Creates an API key, if authentication is enabled.
    pub fn create_api_key(&self, user_id: UserId) -> Option<String> {
        self.validator.as_ref().map(|v| v.create_key(user_id))
    }

    fn register_queue(&self, user_id: UserId, event_types: Vec<String>) -> String {
        let n = self.next_queue.fetch_add(1, Ordering::SeqCst);
        let queue_id = format!("chatsync:{n}");
        self.queues.write().insert(
            queue_id.clone(),
            EventQueue {
                user_id,
                event_types,
                last_event_id: -1,
            },
        );
        queue_id
    }
}

/// Handler for chat requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    fn authenticate(&self, api_key: Option<&str>) -> ServerResult<UserId> {
        if !self.context.config.require_auth {
            return Ok(self.context.config.own_user_id);
        }
        let validator = self
            .context
            .validator
            .as_ref()
            .ok_or_else(|| ServerError::Internal("auth enabled without a secret".into()))?;
        let key =
            api_key.ok_or_else(|| ServerError::AuthenticationFailed("Missing API key".into()))?;
        validator.validate(key)
    }

    fn inject(&self, endpoint: Endpoint) -> ServerResult<()> {
        match self.context.faults.take(endpoint) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Handles a messages request.
    pub fn handle_messages(
        &self,
        api_key: Option<&str>,
        query: &MessagesQuery,
    ) -> ServerResult<FetchResult> {
        self.inject(Endpoint::Messages)?;
        let user_id = self.authenticate(api_key)?;

        let max = self.context.config.max_messages_per_request;
        if query.num_before > max || query.num_after > max {
            return Err(ServerError::InvalidRequest(format!(
                "Too many messages requested (maximum {max})"
            )));
        }

        let narrow = Narrow::from_api_narrow(&query.narrow)?;
        let result = self.context.history.fetch(
            &narrow,
            query.anchor,
            query.num_before,
            query.num_after,
            user_id,
        );
        debug!(
            %narrow,
            anchor = %query.anchor,
            count = result.messages.len(),
            "served messages"
        );
        Ok(result)
    }

    /// Handles an event queue registration.
    pub fn handle_register(
        &self,
        api_key: Option<&str>,
        options: &RegisterOptions,
    ) -> ServerResult<InitialData> {
        self.inject(Endpoint::Register)?;
        let user_id = self.authenticate(api_key)?;

        let queue_id = self
            .context
            .register_queue(user_id, options.fetch_event_types.clone());
        let max_message_id = self
            .context
            .history
            .max_message_id()
            .map(Value::from)
            .unwrap_or(Value::from(-1));

        let mut data = InitialData::new(queue_id, -1).with_user_id(user_id);
        data.state.insert(
            "realm_name".into(),
            Value::from(self.context.config.realm_name.clone()),
        );
        data.state.insert("max_message_id".into(), max_message_id);
        debug!(queue_id = %data.queue_id, user_id, "registered event queue");
        Ok(data)
    }

    /// Handles a server settings request. No authentication is needed.
    pub fn handle_server_settings(&self) -> ServerResult<ServerSettings> {
        self.inject(Endpoint::ServerSettings)?;
        let mut settings = ServerSettings::new(self.context.config.server_version.clone());
        settings.realm_name = Some(self.context.config.realm_name.clone());
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faults::Fault;
    use chatsync_protocol::{Anchor, FetchRequest, Message};

    fn create_handler(config: ServerConfig) -> (RequestHandler, Arc<HandlerContext>) {
        let history = Arc::new(MessageHistory::new());
        for i in 0..5 {
            history.append(Message::stream(0, 2, "general", "lunch", format!("m{i}")));
        }
        let context = Arc::new(HandlerContext::new(config, history));
        (RequestHandler::new(Arc::clone(&context)), context)
    }

    #[test]
    fn messages_success() {
        let (handler, _) = create_handler(ServerConfig::default());
        let query = FetchRequest::older(Narrow::stream("general"), 3, 10).to_query();

        let result = handler.handle_messages(None, &query).unwrap();
        assert_eq!(result.messages.len(), 3);
        assert!(result.found_oldest);
    }

    #[test]
    fn messages_rejects_oversized_pages() {
        let config = ServerConfig::default().with_max_messages_per_request(10);
        let (handler, _) = create_handler(config);
        let query = FetchRequest::new(Narrow::Home, Anchor::Newest, 11, 0).to_query();

        let err = handler.handle_messages(None, &query).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn messages_rejects_unknown_narrow() {
        let (handler, _) = create_handler(ServerConfig::default());
        let mut query = FetchRequest::new(Narrow::Home, Anchor::Newest, 1, 0).to_query();
        query.narrow = vec![chatsync_protocol::NarrowTerm::new("is", "resolved")];

        let err = handler.handle_messages(None, &query).unwrap_err();
        assert_eq!(err.code(), "BAD_NARROW");
    }

    #[test]
    fn register_creates_queues() {
        let (handler, context) = create_handler(ServerConfig::default().with_own_user_id(7));
        let first = handler
            .handle_register(None, &RegisterOptions::default())
            .unwrap();
        let second = handler
            .handle_register(None, &RegisterOptions::default())
            .unwrap();

        assert_ne!(first.queue_id, second.queue_id);
        assert_eq!(first.user_id, Some(7));
        assert_eq!(first.state.get("max_message_id"), Some(&Value::from(5)));
        assert_eq!(context.queue_count(), 2);
        assert_eq!(context.queue(&first.queue_id).map(|q| q.user_id), Some(7));
    }

    #[test]
    fn auth_required_when_enabled() {
        let config = ServerConfig::default().with_auth(b"realm-secret".to_vec());
        let (handler, context) = create_handler(config);
        let options = RegisterOptions::default();

        let err = handler.handle_register(None, &options).unwrap_err();
        assert_eq!(err.status_code(), 401);

        let err = handler.handle_register(Some("1:00"), &options).unwrap_err();
        assert_eq!(err.status_code(), 403);

        let key = context.create_api_key(4).unwrap();
        let data = handler.handle_register(Some(&key), &options).unwrap();
        assert_eq!(data.user_id, Some(4));

        // Server settings are public.
        assert!(handler.handle_server_settings().is_ok());
    }

    #[test]
    fn injected_faults_fail_requests() {
        let (handler, context) = create_handler(ServerConfig::default());
        context
            .faults
            .fail_next(Endpoint::ServerSettings, 1, Fault::Unavailable);

        let err = handler.handle_server_settings().unwrap_err();
        assert!(err.is_server_error());
        assert!(handler.handle_server_settings().is_ok());
    }
}
