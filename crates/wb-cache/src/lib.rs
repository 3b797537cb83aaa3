//! wb-cache: conversation cache backends for wb-bridge
//!
//! Two interchangeable implementations of the `ConversationCache` port:
//! a Redis-backed store (durable, shared across instances) and an
//! in-process map (volatile, single instance, degraded-mode fallback).
//! Backend selection happens in the composition root, never inside the
//! sync engine.

pub mod memory;
pub mod redis;

pub use memory::MemoryCache;
pub use redis::RedisCache;
