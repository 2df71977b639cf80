//! # Context
//!
//! The per-context actor: one task reading an inbound envelope queue. Reply
//! envelopes are resolved through the context's [`Correlator`]; request
//! envelopes are dispatched through its [`Dispatcher`].
//!
//! ## Context Loop
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          CONTEXT LOOP                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐                  ┌──────────────────────────────┐  │
//! │  │  Inbound Rx     │─────────────────►│                              │  │
//! │  │  (from peer)    │                  │        tokio::select! {      │  │
//! │  └─────────────────┘                  │          env = rx.recv()     │  │
//! │                                       │          _ = inflight.next() │  │
//! │  ┌─────────────────┐                  │        }                     │  │
//! │  │  In-flight      │─────────────────►│                              │  │
//! │  │  handlers       │                  └──────────────┬───────────────┘  │
//! │  └─────────────────┘                                 │                  │
//! │                                                      ▼                  │
//! │        reply?  ──► Correlator::resolve (inline, never blocks)           │
//! │        request ──► Dispatcher lookup ──► handler future ──► in-flight   │
//! │        unknown ──► logged and dropped                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Handlers are polled as futures on the loop's own task, so a handler that
//! awaits a correlated call to the peer suspends cooperatively while the loop
//! keeps draining; the response it is waiting for arrives as a later
//! envelope on this same loop. This preserves the single-threaded,
//! non-reentrant-between-awaits execution the handlers are written for.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;

use super::correlator::Correlator;
use super::dispatcher::Dispatcher;
use super::envelope::Envelope;

/// One end of the bidirectional envelope channel between two contexts.
pub struct Transport {
    /// Envelopes to the peer context.
    pub tx: mpsc::Sender<Envelope>,
    /// Envelopes from the peer context.
    pub rx: mpsc::Receiver<Envelope>,
}

/// Build a linked pair of transports, one per context.
pub fn link(capacity: usize) -> (Transport, Transport) {
    let (a_tx, b_rx) = mpsc::channel(capacity);
    let (b_tx, a_rx) = mpsc::channel(capacity);
    (
        Transport { tx: a_tx, rx: a_rx },
        Transport { tx: b_tx, rx: b_rx },
    )
}

/// An isolated execution context: dispatcher, correlator, and the loop that
/// drives both.
pub struct Context {
    name: &'static str,
    dispatcher: Arc<Dispatcher>,
    correlator: Arc<Correlator>,
    tx: mpsc::Sender<Envelope>,
    rx: mpsc::Receiver<Envelope>,
}

impl Context {
    /// Create a context over one end of a transport link.
    pub fn new(name: &'static str, transport: Transport, call_timeout: Duration) -> Self {
        let correlator = Correlator::new(transport.tx.clone(), call_timeout);
        Self {
            name,
            dispatcher: Arc::new(Dispatcher::new()),
            correlator,
            tx: transport.tx,
            rx: transport.rx,
        }
    }

    /// The context's handler table, for registrations before `run`.
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    /// The context's correlator, for issuing calls to the peer.
    pub fn correlator(&self) -> Arc<Correlator> {
        self.correlator.clone()
    }

    /// Drive the context until the peer's end of the transport closes.
    ///
    /// Emits the reserved readiness envelope first, so the peer knows this
    /// loop is draining before it sends anything that expects an answer.
    pub async fn run(mut self) {
        tracing::info!(context = self.name, "context loop starting");
        if self.tx.send(Envelope::ready()).await.is_err() {
            tracing::info!(context = self.name, "peer gone before startup");
            return;
        }

        let mut inflight: FuturesUnordered<BoxFuture<'static, ()>> = FuturesUnordered::new();
        loop {
            // In-flight handlers drain first: a handler that never awaits
            // runs to completion before the next envelope is dispatched,
            // which keeps per-direction FIFO effects observable.
            tokio::select! {
                biased;
                Some(()) = inflight.next(), if !inflight.is_empty() => {}
                maybe = self.rx.recv() => match maybe {
                    Some(envelope) => self.route(envelope, &mut inflight),
                    None => break,
                },
            }
        }

        // Let handlers that are mid-flight finish before the loop exits.
        while inflight.next().await.is_some() {}
        tracing::info!(context = self.name, "context loop stopped");
    }

    fn route(&self, envelope: Envelope, inflight: &mut FuturesUnordered<BoxFuture<'static, ()>>) {
        if envelope.reply {
            match envelope.call {
                Some(id) => {
                    self.correlator.resolve(id, envelope.payload);
                }
                None => {
                    tracing::warn!(
                        context = self.name,
                        tag = %envelope.tag,
                        "dropping reply envelope without a call identifier"
                    );
                }
            }
            return;
        }

        let Some(handler) = self.dispatcher.lookup(&envelope.tag) else {
            // Unknown tags are not a protocol error; the peer may simply be
            // newer than this context.
            tracing::warn!(
                context = self.name,
                tag = %envelope.tag,
                "dropping envelope with no registered handler"
            );
            return;
        };

        let name = self.name;
        let tx = self.tx.clone();
        let Envelope { tag, call, payload, .. } = envelope;
        tracing::debug!(context = name, %tag, "dispatching envelope");

        inflight.push(
            async move {
                match handler(payload).await {
                    Ok(Some(reply)) => match call {
                        Some(id) => {
                            let _ = tx.send(Envelope::reply(tag, id, reply)).await;
                        }
                        None => {
                            tracing::debug!(
                                context = name,
                                %tag,
                                "handler produced a reply for a notification; discarded"
                            );
                        }
                    },
                    Ok(None) => {}
                    Err(e) => {
                        tracing::error!(context = name, %tag, error = %e, "handler failed");
                    }
                }
            }
            .boxed(),
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::dispatcher::handler;
    use crate::bridge::envelope::{self, Tag, READY};
    use crate::error::Error;
    use bytes::Bytes;

    fn pair() -> (Context, Context) {
        let (main_t, worker_t) = link(32);
        (
            Context::new("main", main_t, Duration::from_millis(500)),
            Context::new("worker", worker_t, Duration::from_millis(500)),
        )
    }

    fn register_ready_sink(ctx: &Context) {
        ctx.dispatcher().register(READY, handler(|_| async { Ok(None) }));
    }

    #[tokio::test]
    async fn test_correlated_call_round_trips_between_contexts() {
        let (main, worker) = pair();
        register_ready_sink(&main);
        register_ready_sink(&worker);

        worker.dispatcher().register(
            "double",
            handler(|payload| async move {
                let n: u32 = envelope::decode(&payload)?;
                Ok(Some(envelope::encode(&(n * 2))?))
            }),
        );

        let caller = main.correlator();
        let main_task = tokio::spawn(main.run());
        let worker_task = tokio::spawn(worker.run());

        let doubled: u32 = caller.call_as(Tag::from_static("double"), &21u32).await.unwrap();
        assert_eq!(doubled, 42);

        main_task.abort();
        worker_task.abort();
    }

    #[tokio::test]
    async fn test_unknown_tag_is_dropped_and_loop_survives() {
        let (main, worker) = pair();
        register_ready_sink(&main);
        register_ready_sink(&worker);
        worker.dispatcher().register(
            "echo",
            handler(|payload| async move { Ok(Some(payload)) }),
        );

        let caller = main.correlator();
        let main_task = tokio::spawn(main.run());
        let worker_task = tokio::spawn(worker.run());

        // A notification nobody handles: dropped, not fatal.
        caller.notify(Tag::from_static("no-such-op"), &()).await.unwrap();

        // The unanswered correlated variant times out rather than hanging.
        let err = caller.call(Tag::from_static("also-missing"), Bytes::new()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));

        // And the loop still answers real traffic afterwards.
        let echoed: u32 = caller.call_as(Tag::from_static("echo"), &9u32).await.unwrap();
        assert_eq!(echoed, 9);

        main_task.abort();
        worker_task.abort();
    }

    #[tokio::test]
    async fn test_handler_may_call_back_into_caller_without_stalling() {
        let (main, worker) = pair();
        register_ready_sink(&main);
        register_ready_sink(&worker);

        // Main answers "suffix"; the worker's "compose" handler calls it
        // while its own loop keeps draining; the nested response arrives
        // on the very loop that is awaiting the handler.
        main.dispatcher().register(
            "suffix",
            handler(|_| async move { Ok(Some(envelope::encode(&"!".to_string())?)) }),
        );

        let worker_correlator = worker.correlator();
        worker.dispatcher().register(
            "compose",
            handler(move |payload| {
                let correlator = worker_correlator.clone();
                async move {
                    let base: String = envelope::decode(&payload)?;
                    let suffix: String =
                        correlator.call_as(Tag::from_static("suffix"), &()).await?;
                    Ok(Some(envelope::encode(&format!("{base}{suffix}"))?))
                }
            }),
        );

        let caller = main.correlator();
        let main_task = tokio::spawn(main.run());
        let worker_task = tokio::spawn(worker.run());

        let composed: String = caller
            .call_as(Tag::from_static("compose"), &"done".to_string())
            .await
            .unwrap();
        assert_eq!(composed, "done!");

        main_task.abort();
        worker_task.abort();
    }

    #[tokio::test]
    async fn test_ready_envelope_is_sent_on_startup() {
        let (main_t, worker_t) = link(8);
        let ctx = Context::new("main", main_t, Duration::from_millis(200));
        let task = tokio::spawn(ctx.run());

        let mut peer_rx = worker_t.rx;
        let first = peer_rx.recv().await.unwrap();
        assert_eq!(first.tag, READY);

        task.abort();
    }
}
