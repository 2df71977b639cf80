//! # Nocturne Store
//!
//! An encrypted direct-message conversation log for a client whose storage
//! engine runs in an isolated worker context, separate from the main context
//! that owns durable flags and user-facing callbacks. The two contexts share
//! no memory; everything crosses an asynchronous message boundary, and this
//! crate makes that boundary behave like a reliable, ordered,
//! call-and-response service.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        NOCTURNE STORE MODULES                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   MAIN CONTEXT                               WORKER CONTEXT             │
//! │  ┌────────────────────┐                     ┌────────────────────┐      │
//! │  │ DmStore (façade)   │                     │ EventStore         │      │
//! │  │  EventModel ops    │                     │  receive/coalesce  │      │
//! │  │ Flag store (owner) │                     │  block list        │      │
//! │  │ Observer callback  │                     │  queries           │      │
//! │  └─────────┬──────────┘                     └─────────┬──────────┘      │
//! │            │              bridge                      │                 │
//! │  ┌─────────┴──────────────────────────────────────────┴──────────┐      │
//! │  │  Context loop ◄── Envelope {tag, call id, json} ──► Context   │      │
//! │  │  Dispatcher + Correlator          Dispatcher + Correlator     │      │
//! │  └───────────────────────────────────────────────────┬──────────┘      │
//! │                                                      │                 │
//! │                                        ┌─────────────┴──────────┐      │
//! │                                        │ storage                │      │
//! │                                        │  schema migrator 0→N   │      │
//! │                                        │  StoreEngine seam      │      │
//! │                                        │  records (+ cipher)    │      │
//! │                                        └────────────────────────┘      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire crate
//! - [`bridge`] - Envelope, dispatcher, correlator, and the context loops
//! - [`storage`] - Schema migrations, the object-store engine seam, records
//! - [`cipher`] - The injected at-rest cipher seam
//! - [`messaging`] - Wire protocol, worker event store, and the DM façade
//!
//! ## Boundary Model
//!
//! The worker context alone owns the object-store engine; the main context
//! alone owns the durable database-name and encryption-status flags and is
//! their sole writer. A correlated call suspends its caller until the
//! matching response arrives or the timeout elapses; matching is by
//! per-call identifier, never by tag or arrival order, so interleaved calls
//! can never cross-wire.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod bridge;
pub mod cipher;
pub mod error;
pub mod messaging;
pub mod storage;
/// Time utilities for stamping record mutations.
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use bridge::{Correlator, Dispatcher, Envelope, Tag, RESPONSE_TIMEOUT};
pub use cipher::{PlaintextCipher, RecordCipher};
pub use error::{Error, Result};
pub use messaging::{DmStore, EventModel, MessageObserver, OpenParams};
pub use storage::{
    ConversationRecord, MemoryEngine, MessageRecord, StoreEngine, TARGET_VERSION,
};
