//! # Messaging Module
//!
//! The DM-specific layer on top of the bridge and the storage engine: the
//! wire protocol both contexts agree on, the worker-side event store, and
//! the main-side [`DmStore`] façade applications hold.
//!
//! ## Operation Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        OPERATION FLOW                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   Application (main context)                                            │
//! │        │  EventModel::receive_text(...)                                 │
//! │        ▼                                                                │
//! │   DmStore ──► Correlator ──► Envelope{receive-text, id, json} ──►       │
//! │                                                                         │
//! │                              worker Dispatcher ──► EventStore           │
//! │                                   │  upsert conversation                │
//! │                                   │  coalesce by message-id index       │
//! │                                   │  cipher.encrypt body, put           │
//! │                                   ├──► notify message-received ──►      │
//! │                                   └──► reply {uuid} ──►                 │
//! │                                                                         │
//! │   ◄── observer(MessageReceivedEvent)     ◄── caller resumes with uuid   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod flags;
pub mod protocol;
mod store;
mod worker;

pub use flags::{
    FlagStore, JsonFileFlagStore, MemoryFlagStore, DATABASE_NAME_SUFFIX,
    ENCRYPTION_STATUS_SUFFIX,
};
pub use protocol::{message_type, sent_status, MessageReceivedEvent};
pub use store::{DmStore, EventModel, MessageObserver, OpenParams};
pub use worker::EventStore;
