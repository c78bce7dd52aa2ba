//! miniredis: single-threaded Redis-compatible key-value server
//!
//! Strings only, with every mutation made durable in an append-only file
//! before it is acknowledged.
//!
//! # Architecture
//!
//! - One mio event loop multiplexes the listener and all client sockets
//! - RESP request framing with exact consumed-byte reporting
//! - Chained hash table with power-of-two buckets and lazy doubling
//! - Append-only file replayed at startup to rebuild the keyspace

/// Append-only file (write-ahead log) and replay
pub mod aof;

/// Configuration management for the server
pub mod config;

/// Error types and result aliases
pub mod error;

/// Network layer for connection management
pub mod network;

/// Redis protocol (RESP) implementation
pub mod protocol;

/// Core server implementation
pub mod server;

/// In-memory keyspace
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use server::{Server, ShutdownHandle};
pub use store::Store;
