//! # Error Handling
//!
//! Error types for the store and the context bridge.
//!
//! ## Error Categories
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR CATEGORIES                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                      │
//! │  │                                                                      │
//! │  ├── Bridge Errors                                                      │
//! │  │   ├── Timeout          - No response within the deadline             │
//! │  │   ├── TransportClosed  - Peer context is gone                        │
//! │  │   └── Serialization    - Payload does not match the expected shape   │
//! │  │                                                                      │
//! │  ├── Store Errors                                                       │
//! │  │   ├── Storage          - Object-store engine failure (verbatim)      │
//! │  │   ├── Cipher           - Injected cipher failure                     │
//! │  │   └── Upgrade          - Schema migration step failed                │
//! │  │                                                                      │
//! │  └── Configuration Errors                                               │
//! │      └── EncryptionStatusMismatch - Persisted flag differs at open      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Construction-time errors (mismatch, upgrade) prevent the store from
//! becoming usable at all; per-call errors (timeout, serialization, storage,
//! cipher) fail only that call. Nothing is retried inside the crate; retry
//! policy belongs to the caller, because blind retries of non-idempotent
//! operations could duplicate records.

use std::time::Duration;

use thiserror::Error;

use crate::bridge::Tag;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the store and its bridge
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Bridge Errors
    // ========================================================================
    /// A correlated call received no response within the deadline
    #[error("no response for '{tag}' within {waited:?}")]
    Timeout {
        /// Tag of the unanswered request
        tag: Tag,
        /// How long the caller waited before giving up
        waited: Duration,
    },

    /// The peer context's end of the transport has been dropped
    #[error("transport closed: the peer context is gone")]
    TransportClosed,

    /// A payload could not be decoded to the expected shape
    #[error("serialization error: {0}")]
    Serialization(String),

    // ========================================================================
    // Store Errors
    // ========================================================================
    /// The underlying object-store engine reported a failure
    #[error("storage error: {0}")]
    Storage(String),

    /// The injected record cipher reported a failure
    #[error("cipher error: {0}")]
    Cipher(String),

    /// A schema migration step failed; the open is aborted
    #[error("schema upgrade failed: {0}")]
    Upgrade(String),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// The persisted encryption status differs from the requested one
    #[error(
        "encryption status mismatch: store was created with encryption={persisted}, \
         open requested encryption={requested}"
    )]
    EncryptionStatusMismatch {
        /// Status requested by this open attempt
        requested: bool,
        /// Status recorded when the database was first created
        persisted: bool,
    },
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
