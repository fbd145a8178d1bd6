//! # Chatsync Protocol
//!
//! Data model and wire types shared by the chatsync engine and the
//! reference server.
//!
//! This crate provides:
//! - `Narrow` and its wire form (`NarrowTerm`)
//! - `Message`, `Anchor`, fetch requests and results
//! - Bootstrap types (register options, initial data, server settings)
//! - `ServerVersion` parsing and ordering
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bootstrap;
mod error;
mod fetch;
mod message;
mod narrow;
mod version;

pub use bootstrap::{
    BootstrapSnapshot, ClientCapabilities, InitialData, RegisterOptions, ServerSettings,
};
pub use error::{ProtocolError, ProtocolResult};
pub use fetch::{FetchRequest, FetchResult, MessagesQuery};
pub use message::{Anchor, Message, MessageId, Reaction, Recipient, UserId};
pub use narrow::{Narrow, NarrowTerm};
pub use version::{ReleaseStage, ServerVersion};
