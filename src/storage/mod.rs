//! # Storage Module
//!
//! The persistent side of the event store: the object-store engine seam, the
//! versioned schema with its migrator, and the record shapes.
//!
//! ## Storage Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE SYSTEM                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │  Schema Migrator (schema.rs)                                    │    │
//! │  │  ───────────────────────────                                    │    │
//! │  │  version 0 ──► step 0→1 ──► ... ──► TARGET_VERSION              │    │
//! │  │  Append-only step table; re-open at target runs zero steps.     │    │
//! │  └────────────────────────────┬────────────────────────────────────┘    │
//! │                               │ create_store / create_index             │
//! │                               ▼                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │  StoreEngine (engine.rs): external collaborator                 │    │
//! │  │  put / get / get_by_index / get_all / version                   │    │
//! │  │  MemoryEngine is the in-process reference implementation.       │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │                                                                         │
//! │  Records (records.rs): messages (bodies pass through the injected       │
//! │  cipher) and conversations (plaintext metadata + block flag).           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod engine;
pub(crate) mod records;
pub mod schema;

pub use engine::{IndexSchema, Key, MemoryEngine, StoreEngine, StoreSchema};
pub use records::{ConversationRecord, MessageRecord};
pub use schema::{migrate, TARGET_VERSION};
