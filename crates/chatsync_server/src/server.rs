//! Main chat server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::faults::FaultInjector;
use crate::handler::{HandlerContext, RequestHandler};
use crate::history::MessageHistory;
use chatsync_protocol::{
    Anchor, FetchResult, InitialData, Message, MessageId, MessagesQuery, NarrowTerm,
    RegisterOptions, ServerSettings, UserId,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// A JSON reply to a dispatched request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    /// HTTP status code.
    pub status: u16,
    /// JSON body.
    pub body: String,
}

/// The reference chat server.
///
/// Serves message history, event queue registration and server settings.
/// Requests can be made through the typed `handle_*` methods or through
/// [`ChatServer::handle_request`], which speaks the REST wire format.
///
/// # Example
///
/// ```
/// use chatsync_server::{ChatServer, ServerConfig};
///
/// let server = ChatServer::new(ServerConfig::default());
/// let settings = server.handle_server_settings().unwrap();
/// assert_eq!(settings.server_version, "5.0");
/// ```
pub struct ChatServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl ChatServer {
    /// Creates a new chat server with an empty history.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_history(config, Arc::new(MessageHistory::new()))
    }

    /// Creates a chat server over an existing history.
    pub fn with_history(config: ServerConfig, history: Arc<MessageHistory>) -> Self {
        let context = Arc::new(HandlerContext::new(config, history));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Handles a messages request.
    pub fn handle_messages(
        &self,
        api_key: Option<&str>,
        query: &MessagesQuery,
    ) -> ServerResult<FetchResult> {
        self.handler.handle_messages(api_key, query)
    }

    /// Handles an event queue registration.
    pub fn handle_register(
        &self,
        api_key: Option<&str>,
        options: &RegisterOptions,
    ) -> ServerResult<InitialData> {
        self.handler.handle_register(api_key, options)
    }

    /// Handles a server settings request.
    pub fn handle_server_settings(&self) -> ServerResult<ServerSettings> {
        self.handler.handle_server_settings()
    }

    /// Handles a request in wire form.
    ///
    /// `path` is the URL path (e.g. `/api/v1/messages`) and `params` the
    /// decoded query or form parameters. Successful replies carry
    /// `"result": "success"`; failures carry `"result": "error"` with a
    /// `code` and `msg`, and the matching status.
    pub fn handle_request(
        &self,
        method: &str,
        path: &str,
        params: &[(String, String)],
        api_key: Option<&str>,
    ) -> HttpReply {
        let outcome = match (method, path) {
            ("GET", "/api/v1/messages") => parse_messages_query(params)
                .and_then(|query| self.handle_messages(api_key, &query))
                .and_then(|result| to_json(&result)),
            ("POST", "/api/v1/register") => parse_register_options(params)
                .and_then(|options| self.handle_register(api_key, &options))
                .and_then(|data| to_json(&data)),
            ("GET", "/api/v1/server_settings") => self
                .handle_server_settings()
                .and_then(|settings| to_json(&settings)),
            _ => Err(ServerError::NotFound(format!("{method} {path}"))),
        };

        match outcome {
            Ok(mut body) => {
                body.insert("result".into(), json!("success"));
                body.insert("msg".into(), json!(""));
                HttpReply {
                    status: 200,
                    body: Value::Object(body).to_string(),
                }
            }
            Err(err) => HttpReply {
                status: err.status_code(),
                body: json!({
                    "result": "error",
                    "code": err.code(),
                    "msg": err.to_string(),
                })
                .to_string(),
            },
        }
    }

    /// Stores a message and returns its assigned id.
    pub fn send_message(&self, message: Message) -> MessageId {
        self.context.history.append(message)
    }

    /// Returns the message history.
    pub fn history(&self) -> &Arc<MessageHistory> {
        &self.context.history
    }

    /// Returns the fault injector.
    pub fn faults(&self) -> &FaultInjector {
        &self.context.faults
    }

    /// Creates an API key for `user_id`, if authentication is enabled.
    pub fn create_api_key(&self, user_id: UserId) -> Option<String> {
        self.context.create_api_key(user_id)
    }

    /// Number of registered event queues.
    pub fn queue_count(&self) -> usize {
        self.context.queue_count()
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> ServerResult<Map<String, Value>> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ServerError::Internal(format!(
            "response is not an object: {other}"
        ))),
        Err(e) => Err(ServerError::Internal(e.to_string())),
    }
}

fn param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn parse_count(params: &[(String, String)], name: &str) -> ServerResult<u32> {
    match param(params, name) {
        None => Ok(0),
        Some(raw) => raw
            .parse()
            .map_err(|_| ServerError::InvalidRequest(format!("Invalid {name}: {raw}"))),
    }
}

fn parse_bool(params: &[(String, String)], name: &str, default: bool) -> ServerResult<bool> {
    match param(params, name) {
        None => Ok(default),
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        Some(raw) => Err(ServerError::InvalidRequest(format!(
            "Invalid {name}: {raw}"
        ))),
    }
}

fn parse_messages_query(params: &[(String, String)]) -> ServerResult<MessagesQuery> {
    let anchor: Anchor = param(params, "anchor")
        .ok_or_else(|| ServerError::InvalidRequest("Missing 'anchor' argument".into()))?
        .parse()?;
    let narrow: Vec<NarrowTerm> = match param(params, "narrow") {
        None => Vec::new(),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| ServerError::BadNarrow(format!("{raw}: {e}")))?,
    };
    Ok(MessagesQuery {
        narrow,
        anchor,
        num_before: parse_count(params, "num_before")?,
        num_after: parse_count(params, "num_after")?,
    })
}

fn parse_register_options(params: &[(String, String)]) -> ServerResult<RegisterOptions> {
    let mut options = RegisterOptions::default();
    if let Some(raw) = param(params, "fetch_event_types") {
        options.fetch_event_types = serde_json::from_str(raw).map_err(|e| {
            ServerError::InvalidRequest(format!("Invalid fetch_event_types: {e}"))
        })?;
    }
    if let Some(raw) = param(params, "client_capabilities") {
        options.client_capabilities = serde_json::from_str(raw).map_err(|e| {
            ServerError::InvalidRequest(format!("Invalid client_capabilities: {e}"))
        })?;
    }
    options.apply_markdown = parse_bool(params, "apply_markdown", options.apply_markdown)?;
    options.include_subscribers =
        parse_bool(params, "include_subscribers", options.include_subscribers)?;
    options.client_gravatar = parse_bool(params, "client_gravatar", options.client_gravatar)?;
    Ok(options)
}
