//! wb-wuzapi: WuzAPI WhatsApp gateway client for wb-bridge
//!
//! Implements the `ChatGateway` port against a WuzAPI instance: text and
//! media sends plus avatar lookup, authenticated per-instance.

pub mod client;

pub use client::WuzapiClient;
