//! HTTP transport implementation.
//!
//! This module maps the transport calls onto the server's REST endpoints.
//! The actual HTTP client is abstracted via a trait to allow different
//! implementations (reqwest, hyper, etc.); authentication headers are the
//! client's concern.

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use async_trait::async_trait;
use chatsync_protocol::{FetchResult, InitialData, MessagesQuery, RegisterOptions, ServerSettings};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET with query parameters.
    Get,
    /// POST with form-encoded parameters.
    Post,
}

/// An HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: HttpMethod,
    /// Absolute URL.
    pub url: String,
    /// Query or form parameters.
    pub params: Vec<(String, String)>,
}

impl HttpRequest {
    /// Returns the value of a parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// An HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. An `Err` means
/// no response was received at all (connection refused, DNS failure, ...).
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

/// HTTP-based sync transport.
///
/// Uses JSON response bodies.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the realm (e.g., "https://chat.example.com").
    base_url: String,
    /// HTTP client implementation.
    client: C,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    async fn call<R: DeserializeOwned>(
        &self,
        method: HttpMethod,
        endpoint: &str,
        params: Vec<(String, String)>,
        cancel: &CancellationToken,
    ) -> SyncResult<R> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let request = HttpRequest {
            method,
            url: format!("{}/api/v1{}", self.base_url, endpoint),
            params,
        };

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            response = self.client.send(request) => response,
        };

        let result = response
            .map_err(SyncError::Network)
            .and_then(|response| decode_response(&response));
        match &result {
            Ok(_) => *self.last_error.write() = None,
            Err(err) => *self.last_error.write() = Some(err.to_string()),
        }
        result
    }
}

fn decode_response<R: DeserializeOwned>(response: &HttpResponse) -> SyncResult<R> {
    if !(200..300).contains(&response.status) {
        let (code, message) = match serde_json::from_slice::<ApiErrorBody>(&response.body) {
            Ok(body) => (
                body.code.unwrap_or_else(|| "UNKNOWN".to_string()),
                body.msg.unwrap_or_default(),
            ),
            Err(_) => (
                "UNKNOWN".to_string(),
                String::from_utf8_lossy(&response.body).into_owned(),
            ),
        };
        return Err(SyncError::from_status(response.status, code, message));
    }

    let mut value: Value = serde_json::from_slice(&response.body)?;
    if let Some(object) = value.as_object_mut() {
        object.remove("result");
        object.remove("msg");
    }
    Ok(serde_json::from_value(value)?)
}

fn bool_param(name: &str, value: bool) -> (String, String) {
    (name.to_string(), value.to_string())
}

#[async_trait]
impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    async fn get_messages(
        &self,
        query: &MessagesQuery,
        cancel: &CancellationToken,
    ) -> SyncResult<FetchResult> {
        let params = vec![
            ("anchor".to_string(), query.anchor.to_wire()),
            ("num_before".to_string(), query.num_before.to_string()),
            ("num_after".to_string(), query.num_after.to_string()),
            ("narrow".to_string(), serde_json::to_string(&query.narrow)?),
            bool_param("apply_markdown", true),
            bool_param("client_gravatar", true),
        ];
        self.call(HttpMethod::Get, "/messages", params, cancel).await
    }

    async fn register_for_events(
        &self,
        options: &RegisterOptions,
        cancel: &CancellationToken,
    ) -> SyncResult<InitialData> {
        let params = vec![
            (
                "fetch_event_types".to_string(),
                serde_json::to_string(&options.fetch_event_types)?,
            ),
            bool_param("apply_markdown", options.apply_markdown),
            bool_param("include_subscribers", options.include_subscribers),
            bool_param("client_gravatar", options.client_gravatar),
            (
                "client_capabilities".to_string(),
                serde_json::to_string(&options.client_capabilities)?,
            ),
        ];
        self.call(HttpMethod::Post, "/register", params, cancel).await
    }

    async fn server_settings(&self, cancel: &CancellationToken) -> SyncResult<ServerSettings> {
        self.call(HttpMethod::Get, "/server_settings", Vec::new(), cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsync_protocol::{Anchor, FetchRequest, Narrow};
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedClient {
        responses: Mutex<VecDeque<Result<HttpResponse, String>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedClient {
        fn respond(&self, status: u16, body: &str) {
            self.responses.lock().push_back(Ok(HttpResponse {
                status,
                body: body.as_bytes().to_vec(),
            }));
        }

        fn fail(&self, message: &str) {
            self.responses.lock().push_back(Err(message.to_string()));
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedClient {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
            self.requests.lock().push(request);
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err("no scripted response".to_string()))
        }
    }

    #[tokio::test]
    async fn get_messages_encodes_query() {
        let transport = HttpTransport::new("https://chat.example.com/", ScriptedClient::default());
        transport.client.respond(
            200,
            r#"{"result":"success","msg":"","messages":[],"found_oldest":true,"found_newest":false,"anchor":5}"#,
        );

        let query = FetchRequest::older(Narrow::stream("general"), 5, 100).to_query();
        let result = transport
            .get_messages(&query, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.found_oldest);
        assert!(!result.found_newest);

        let requests = transport.client.requests.lock();
        let request = &requests[0];
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.url, "https://chat.example.com/api/v1/messages");
        assert_eq!(request.param("anchor"), Some("5"));
        assert_eq!(request.param("num_before"), Some("100"));
        assert_eq!(request.param("num_after"), Some("0"));
        assert_eq!(
            request.param("narrow"),
            Some(r#"[{"operator":"stream","operand":"general"}]"#)
        );
    }

    #[tokio::test]
    async fn sentinel_anchors_use_names() {
        let transport = HttpTransport::new("https://chat.example.com", ScriptedClient::default());
        transport
            .client
            .respond(200, r#"{"result":"success","messages":[]}"#);

        let query = FetchRequest::new(Narrow::Home, Anchor::FirstUnread, 50, 50).to_query();
        transport
            .get_messages(&query, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            transport.client.requests.lock()[0].param("anchor"),
            Some("first_unread")
        );
    }

    #[tokio::test]
    async fn maps_error_statuses() {
        let transport = HttpTransport::new("https://chat.example.com", ScriptedClient::default());
        transport.client.respond(
            401,
            r#"{"result":"error","code":"UNAUTHORIZED","msg":"Invalid API key"}"#,
        );
        transport.client.respond(502, "<html>Bad Gateway</html>");

        let cancel = CancellationToken::new();
        let err = transport.server_settings(&cancel).await.unwrap_err();
        assert_eq!(
            err,
            SyncError::Client {
                status: 401,
                code: "UNAUTHORIZED".into(),
                message: "Invalid API key".into(),
            }
        );
        assert!(transport.last_error().is_some());

        let err = transport.server_settings(&cancel).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(
            err,
            SyncError::Server {
                status: 502,
                message: "<html>Bad Gateway</html>".into(),
            }
        );
    }

    #[tokio::test]
    async fn connection_failures_are_unclassified() {
        let transport = HttpTransport::new("https://chat.example.com", ScriptedClient::default());
        transport.client.fail("connection refused");

        let err = transport
            .server_settings(&CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, SyncError::Network("connection refused".into()));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn register_strips_envelope_fields() {
        let transport = HttpTransport::new("https://chat.example.com", ScriptedClient::default());
        transport.client.respond(
            200,
            r#"{"result":"success","msg":"","queue_id":"1517975029:0","last_event_id":-1,"realm_name":"Example"}"#,
        );

        let data = transport
            .register_for_events(&RegisterOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(data.queue_id, "1517975029:0");
        assert!(!data.state.contains_key("result"));
        assert!(data.state.contains_key("realm_name"));

        let requests = transport.client.requests.lock();
        assert_eq!(requests[0].method, HttpMethod::Post);
        assert_eq!(requests[0].param("include_subscribers"), Some("false"));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let transport = HttpTransport::new("https://chat.example.com", ScriptedClient::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = transport.server_settings(&cancel).await.unwrap_err();
        assert_eq!(err, SyncError::Cancelled);
    }

    #[tokio::test]
    async fn cancelled_calls_never_reach_the_client() {
        let transport = HttpTransport::new("https://chat.example.com", ScriptedClient::default());
        for _ in 0..200 {
            transport
                .client
                .respond(200, r#"{"result":"success","msg":"","server_version":"5.0"}"#);
        }
        let cancel = CancellationToken::new();
        cancel.cancel();

        for _ in 0..200 {
            assert_eq!(
                transport.server_settings(&cancel).await,
                Err(SyncError::Cancelled)
            );
        }
        assert!(transport.client.requests.lock().is_empty());
        assert_eq!(transport.client.responses.lock().len(), 200);
    }
}
