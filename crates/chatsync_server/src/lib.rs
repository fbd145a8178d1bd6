//! # Chatsync Server
//!
//! Reference in-memory chat server for the chatsync engine.
//!
//! This crate provides:
//! - Message history with anchor-based pagination
//! - Event queue registration and server settings endpoints
//! - API key authentication (HMAC-SHA256)
//! - Fault injection for exercising client retry and abort paths
//!
//! # Architecture
//!
//! The server is synchronous and keeps everything in memory. It maintains:
//! - The realm's message history
//! - Registered event queues
//! - Pending injected faults
//!
//! # Protocol
//!
//! Requests use the REST wire format of the real service:
//! 1. `POST /api/v1/register` returns a queue id and the initial state
//! 2. `GET /api/v1/server_settings` returns the server version
//! 3. `GET /api/v1/messages` returns one page around an anchor, with
//!    `found_oldest` / `found_newest`

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod faults;
mod handler;
mod history;
mod server;

pub use auth::ApiKeyValidator;
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use faults::{Endpoint, Fault, FaultInjector};
pub use handler::{EventQueue, HandlerContext, RequestHandler};
pub use history::{matches_narrow, MessageHistory};
pub use server::{ChatServer, HttpReply};
