//! In-process realm: a seeded reference server reached over a loopback HTTP client.

use async_trait::async_trait;
use chatsync_engine::{
    EventLog, FetchStateStore, FollowUp, HttpClient, HttpMethod, HttpRequest, HttpResponse,
    HttpTransport, RecordingDelegate, SessionDelegate, SyncConfig, SyncSession,
};
use chatsync_protocol::Message;
use chatsync_server::{ChatServer, ServerConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const BASE_URL: &str = "http://chatsync.local";
const OWN_USER_ID: u64 = 1;

/// Session type used by all commands.
pub type Session = SyncSession<HttpTransport<LoopbackClient>, Arc<FetchStateStore>>;

/// How to build the realm.
#[derive(Debug, Clone)]
pub struct RealmOptions {
    /// Version the server reports.
    pub server_version: String,
    /// Number of stream messages to seed.
    pub seed_messages: u64,
    /// Delay added to every request.
    pub latency: Duration,
    /// Require API keys.
    pub auth: bool,
    /// Key to send instead of a valid one.
    pub api_key: Option<String>,
}

/// Serves requests from an in-process server after a fixed delay.
pub struct LoopbackClient {
    server: Arc<ChatServer>,
    api_key: Option<String>,
    latency: Duration,
}

#[async_trait]
impl HttpClient for LoopbackClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        let path = request
            .url
            .strip_prefix(BASE_URL)
            .ok_or_else(|| format!("unknown host in {}", request.url))?;
        let method = match request.method {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        };
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let reply = self
            .server
            .handle_request(method, path, &request.params, self.api_key.as_deref());
        Ok(HttpResponse {
            status: reply.status,
            body: reply.body.into_bytes(),
        })
    }
}

/// Logs each follow-up effect and remembers it for the report.
#[derive(Debug, Default)]
pub struct LoggingDelegate {
    recorded: RecordingDelegate,
}

impl LoggingDelegate {
    /// Effects performed so far.
    pub fn calls(&self) -> Vec<FollowUp> {
        self.recorded.calls()
    }
}

impl SessionDelegate for LoggingDelegate {
    fn start_event_polling(&self, queue_id: &str, last_event_id: i64) {
        info!(queue_id, last_event_id, "start event polling");
        self.recorded.start_event_polling(queue_id, last_event_id);
    }

    fn send_outbox(&self) {
        info!("send outbox");
        self.recorded.send_outbox();
    }

    fn init_notifications(&self) {
        info!("init notifications");
        self.recorded.init_notifications();
    }

    fn logout(&self) {
        info!("logout");
        self.recorded.logout();
    }

    fn reset_to_account_picker(&self) {
        info!("reset to account picker");
        self.recorded.reset_to_account_picker();
    }
}

/// A running realm.
pub struct Realm {
    /// The server, for fault injection.
    pub server: Arc<ChatServer>,
    /// The client session.
    pub session: Session,
    /// The session's delegate.
    pub delegate: Arc<LoggingDelegate>,
    /// Every event the store applied.
    pub events: Arc<EventLog>,
}

impl Realm {
    /// Builds and seeds the server and connects a session to it.
    pub fn start(options: &RealmOptions, config: SyncConfig) -> Self {
        let mut server_config = ServerConfig::default()
            .with_server_version(options.server_version.clone())
            .with_own_user_id(OWN_USER_ID);
        if options.auth {
            server_config = server_config.with_auth(b"chatsync-cli".to_vec());
        }
        let server = Arc::new(ChatServer::new(server_config));
        seed(&server, options.seed_messages);

        let api_key = options
            .api_key
            .clone()
            .or_else(|| server.create_api_key(OWN_USER_ID));
        let client = LoopbackClient {
            server: Arc::clone(&server),
            api_key,
            latency: options.latency,
        };
        let delegate = Arc::new(LoggingDelegate::default());
        let events = Arc::new(EventLog::new());
        let store = FetchStateStore::new().with_observer(events.clone());
        let session = SyncSession::new(
            HttpTransport::new(BASE_URL, client),
            Arc::new(store),
            delegate.clone(),
            config,
        );

        Self {
            server,
            session,
            delegate,
            events,
        }
    }
}

fn seed(server: &ChatServer, count: u64) {
    const STREAMS: [(&str, &str); 3] = [
        ("general", "lunch"),
        ("general", "standup"),
        ("design", "logo"),
    ];
    for i in 0..count {
        let (stream, topic) = STREAMS[(i % 3) as usize];
        let sender = 2 + i % 4;
        server.send_message(Message::stream(
            0,
            sender,
            stream,
            topic,
            format!("{topic} update {i}"),
        ));
        if i % 10 == 0 {
            server.send_message(Message::private(
                0,
                sender,
                [OWN_USER_ID, sender],
                format!("ping {i}"),
            ));
        }
    }
    // The first half has been read.
    if let Some(max) = server.history().max_message_id() {
        server.history().mark_read_through(max / 2);
    }
}
