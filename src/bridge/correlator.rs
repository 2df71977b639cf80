//! # Correlator
//!
//! Call/response semantics on top of fire-and-forget message passing. Each
//! call allocates a fresh [`CallId`], parks a one-shot channel in the pending
//! map, sends the request envelope, and races the channel against the
//! response timeout.
//!
//! ## Pending-Call Lifecycle
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        PENDING CALL LIFECYCLE                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  call(tag, req)                                                         │
//! │      │                                                                  │
//! │      ├─► id = fresh CallId        (never a shared static tag)           │
//! │      ├─► pending[id] = oneshot tx                                       │
//! │      ├─► send Envelope::request(tag, id, req)                           │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  race ──► reply arrives ──► resolve(id) removes entry ──► Ok(payload)   │
//! │      │                                                                  │
//! │      └──► timeout ──► entry removed ──► Err(Timeout { tag, waited })    │
//! │                          │                                              │
//! │                          └─► late reply finds no entry ──► dropped      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing is retried here: a timeout or decode failure is surfaced to the
//! caller, who alone knows whether the operation is safe to reissue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use super::envelope::{self, CallId, Envelope, Tag};
use crate::error::{Error, Result};

/// Response timeout applied to every correlated call.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Turns one-way envelope passing into await-able calls.
#[derive(Debug)]
pub struct Correlator {
    outbound: mpsc::Sender<Envelope>,
    pending: Mutex<HashMap<CallId, oneshot::Sender<Bytes>>>,
    timeout: Duration,
}

impl Correlator {
    /// Create a correlator sending requests through `outbound`.
    pub fn new(outbound: mpsc::Sender<Envelope>, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            outbound,
            pending: Mutex::new(HashMap::new()),
            timeout,
        })
    }

    /// Send a correlated request and wait for its raw reply payload.
    pub async fn call(&self, tag: Tag, payload: Bytes) -> Result<Bytes> {
        let id = CallId::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let envelope = Envelope::request(tag.clone(), id, payload);
        if self.outbound.send(envelope).await.is_err() {
            self.pending.lock().remove(&id);
            return Err(Error::TransportClosed);
        }

        let started = tokio::time::Instant::now();
        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            // The loop resolving replies dropped our sender: peer is gone.
            Ok(Err(_)) => Err(Error::TransportClosed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(Error::Timeout { tag, waited: started.elapsed() })
            }
        }
    }

    /// Send a typed correlated request and decode its typed reply.
    pub async fn call_as<Req, Resp>(&self, tag: Tag, request: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let reply = self.call(tag, envelope::encode(request)?).await?;
        envelope::decode(&reply)
    }

    /// Send a fire-and-forget notification; no reply will ever arrive.
    pub async fn notify<Req: Serialize>(&self, tag: Tag, request: &Req) -> Result<()> {
        let envelope = Envelope::notify(tag, envelope::encode(request)?);
        self.outbound
            .send(envelope)
            .await
            .map_err(|_| Error::TransportClosed)
    }

    /// Deliver a reply payload to the pending call `id`.
    ///
    /// Returns false when no call is waiting: a stray or late response,
    /// which is dropped by design.
    pub fn resolve(&self, id: CallId, payload: Bytes) -> bool {
        match self.pending.lock().remove(&id) {
            Some(tx) => tx.send(payload).is_ok(),
            None => {
                tracing::trace!(call = %id, "dropping stray response with no pending call");
                false
            }
        }
    }

    /// Number of calls currently awaiting a response.
    pub fn outstanding(&self) -> usize {
        self.pending.lock().len()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Correlator plus the receiving end of its outbound channel, so tests
    /// can play the peer context by hand.
    fn correlator(timeout: Duration) -> (Arc<Correlator>, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(16);
        (Correlator::new(tx, timeout), rx)
    }

    #[tokio::test]
    async fn test_call_resolves_with_matching_response() {
        let (correlator, mut rx) = correlator(RESPONSE_TIMEOUT);

        let responder = correlator.clone();
        let peer = tokio::spawn(async move {
            let request = rx.recv().await.unwrap();
            assert!(!request.reply);
            responder.resolve(request.call.unwrap(), Bytes::from_static(b"42"));
        });

        let reply: u32 = correlator
            .call_as(Tag::from_static("probe"), &())
            .await
            .unwrap();
        assert_eq!(reply, 42);
        assert_eq!(correlator.outstanding(), 0);
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_unanswered_call_times_out_and_cleans_up() {
        let (correlator, _rx) = correlator(Duration::from_millis(50));

        let err = correlator
            .call(Tag::from_static("silence"), Bytes::new())
            .await
            .unwrap_err();
        match err {
            Error::Timeout { tag, waited } => {
                assert_eq!(tag.as_str(), "silence");
                assert!(waited >= Duration::from_millis(50));
            }
            other => panic!("expected Timeout, got {:?}", other),
        }
        assert_eq!(correlator.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_distinct_calls_resolve_out_of_send_order() {
        let (correlator, mut rx) = correlator(RESPONSE_TIMEOUT);

        let responder = correlator.clone();
        let peer = tokio::spawn(async move {
            let first = rx.recv().await.unwrap();
            let second = rx.recv().await.unwrap();
            // Answer in reverse order; each caller must still get its own.
            responder.resolve(second.call.unwrap(), second.payload);
            responder.resolve(first.call.unwrap(), first.payload);
        });

        let (a, b) = tokio::join!(
            correlator.call_as::<_, u32>(Tag::from_static("first"), &1u32),
            correlator.call_as::<_, u32>(Tag::from_static("second"), &2u32),
        );
        assert_eq!(a.unwrap(), 1);
        assert_eq!(b.unwrap(), 2);
        assert_eq!(correlator.outstanding(), 0);
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_stray_response_is_dropped() {
        let (correlator, _rx) = correlator(RESPONSE_TIMEOUT);
        assert!(!correlator.resolve(CallId::new_v4(), Bytes::new()));
    }

    #[tokio::test]
    async fn test_late_response_after_timeout_does_not_resolve() {
        let (correlator, mut rx) = correlator(Duration::from_millis(20));

        let err = correlator
            .call(Tag::from_static("slow"), Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));

        // The request is still in the channel; answering now is too late.
        let request = rx.recv().await.unwrap();
        assert!(!correlator.resolve(request.call.unwrap(), Bytes::from_static(b"late")));
    }

    #[tokio::test]
    async fn test_call_against_closed_transport_fails_fast() {
        let (correlator, rx) = correlator(RESPONSE_TIMEOUT);
        drop(rx);
        let err = correlator
            .call(Tag::from_static("gone"), Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TransportClosed));
        assert_eq!(correlator.outstanding(), 0);
    }
}
