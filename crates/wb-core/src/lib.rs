//! wb-core: domain model and synchronization engine for wb-bridge
//!
//! Everything that makes relay decisions lives here: phone number
//! canonicalization, unified message parsing, the outbound capability
//! ports, the token guard and the two sync use cases. Transport and
//! platform clients live in the sibling crates.

pub mod cache;
pub mod config;
pub mod error;
pub mod guard;
pub mod message;
pub mod phone;
pub mod ports;
pub mod sync;

pub use cache::ConversationCache;
pub use config::Config;
pub use error::{Error, Result};
pub use guard::TokenGuard;
pub use message::{Direction, Message, MessageKind, Source};
pub use phone::PhoneNumber;
pub use ports::{ChatGateway, InboxGateway, MediaBytes};
pub use sync::{SyncOutcome, SyncToChat, SyncToInbox};
