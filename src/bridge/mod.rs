//! # Context Bridge
//!
//! Reliable, ordered call-and-response on top of fire-and-forget message
//! passing between two isolated execution contexts.
//!
//! ## Bridge Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         CONTEXT BRIDGE                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │      MAIN CONTEXT                           WORKER CONTEXT              │
//! │  ┌──────────────────┐                   ┌──────────────────┐            │
//! │  │ Correlator       │── Envelope ──────►│ Dispatcher       │            │
//! │  │  call(tag, req)  │   {tag, id, json} │  tag → handler   │            │
//! │  │  pending: id→tx  │◄───── Envelope ───│                  │            │
//! │  └──────────────────┘      (reply, id)  └──────────────────┘            │
//! │  ┌──────────────────┐                   ┌──────────────────┐            │
//! │  │ Dispatcher       │◄───── Envelope ───│ Correlator       │            │
//! │  │  (flag handlers, │                   │  (flag reads at  │            │
//! │  │   notifications) │── Envelope ──────►│   construction)  │            │
//! │  └──────────────────┘                   └──────────────────┘            │
//! │                                                                         │
//! │  One Context loop per side drives both halves; the transport is a       │
//! │  linked pair of mpsc channels and the only thing that crosses it is     │
//! │  an Envelope.                                                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod context;
mod correlator;
mod dispatcher;
mod envelope;

pub use context::{link, Context, Transport};
pub use correlator::{Correlator, RESPONSE_TIMEOUT};
pub use dispatcher::{handler, Dispatcher, Handler, HandlerOutput};
pub use envelope::{decode, encode, CallId, Envelope, Tag, READY};
