//! # Dispatcher
//!
//! Per-context mapping from tag to handler. Every inbound request envelope is
//! routed to exactly one registered handler; envelopes with no handler are
//! logged and dropped; an unknown tag must never crash the context.
//!
//! Handlers are async so a handler may itself issue correlated calls to the
//! peer context; the [`Context`](super::Context) loop polls them
//! cooperatively, which is what keeps such nested calls from stalling the
//! loop they would be answered on.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use parking_lot::Mutex;

use super::envelope::Tag;
use crate::error::Result;

/// What a handler produces: `Some(bytes)` becomes the reply payload for a
/// correlated request, `None` means no reply (fire-and-forget handlers).
pub type HandlerOutput = Result<Option<Bytes>>;

/// A registered handler: payload in, optional reply payload out.
pub type Handler = Arc<dyn Fn(Bytes) -> BoxFuture<'static, HandlerOutput> + Send + Sync>;

/// Wrap an async closure into a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerOutput> + Send + 'static,
{
    Arc::new(move |payload| -> BoxFuture<'static, HandlerOutput> { Box::pin(f(payload)) })
}

/// Per-context tag → handler table.
#[derive(Default)]
pub struct Dispatcher {
    handlers: Mutex<HashMap<Tag, Handler>>,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate exactly one handler with `tag`, replacing any prior
    /// registration (last registration wins).
    pub fn register(&self, tag: impl Into<Tag>, handler: Handler) {
        let tag = tag.into();
        if self.handlers.lock().insert(tag.clone(), handler).is_some() {
            tracing::debug!(%tag, "handler replaced");
        }
    }

    /// Look up the handler for `tag`, if any.
    pub fn lookup(&self, tag: &Tag) -> Option<Handler> {
        self.handlers.lock().get(tag).cloned()
    }
}

// ============================================================================
// TESTS
// ============================================================================
