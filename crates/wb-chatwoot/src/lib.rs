//! wb-chatwoot: Chatwoot REST client for wb-bridge
//!
//! Implements the `InboxGateway` port against the Chatwoot application
//! API: contact search/create, conversation search/create and message
//! posting, all scoped to one account and one inbox.

pub mod client;

pub use client::ChatwootClient;
