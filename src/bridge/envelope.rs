//! # Envelope
//!
//! The wire unit crossing the context boundary: a tag naming the operation,
//! an optional per-call correlation identifier, a reply flag, and an opaque
//! JSON payload. The two contexts share no memory; an envelope is the only
//! thing that ever crosses the transport.

use std::borrow::Cow;
use std::fmt;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

// ============================================================================
// TAG
// ============================================================================

/// Opaque operation identifier carried by an envelope.
///
/// Tags name operations, never individual calls; correlation is by
/// [`CallId`], so a tag may safely be in flight many times at once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(Cow<'static, str>);

impl Tag {
    /// Build a tag from a static operation name.
    pub const fn from_static(name: &'static str) -> Self {
        Tag(Cow::Borrowed(name))
    }

    /// The tag's string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Tag {
    fn from(name: &'static str) -> Self {
        Tag(Cow::Borrowed(name))
    }
}

impl From<String> for Tag {
    fn from(name: String) -> Self {
        Tag(Cow::Owned(name))
    }
}

/// Reserved tag signalling readiness-to-receive on channel establishment.
pub const READY: Tag = Tag::from_static("ready");

// ============================================================================
// CALL IDENTIFIER
// ============================================================================

/// Unique identifier for one correlated call.
///
/// A fresh random token per call is what makes late or stray responses
/// harmless: they find no pending entry and are dropped.
pub type CallId = uuid::Uuid;

// ============================================================================
// ENVELOPE
// ============================================================================

/// Tagged message unit crossing the context boundary.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Operation (or reply-to-operation) identifier.
    pub tag: Tag,
    /// Correlation identifier; present on correlated requests and replies,
    /// absent on fire-and-forget notifications.
    pub call: Option<CallId>,
    /// True when this envelope answers a prior request under `call`.
    pub reply: bool,
    /// Tag-specific JSON payload.
    pub payload: Bytes,
}

impl Envelope {
    /// A correlated request expecting a reply under `call`.
    pub fn request(tag: Tag, call: CallId, payload: Bytes) -> Self {
        Self { tag, call: Some(call), reply: false, payload }
    }

    /// A fire-and-forget notification; no reply is ever produced.
    pub fn notify(tag: Tag, payload: Bytes) -> Self {
        Self { tag, call: None, reply: false, payload }
    }

    /// The reply to a correlated request.
    pub fn reply(tag: Tag, call: CallId, payload: Bytes) -> Self {
        Self { tag, call: Some(call), reply: true, payload }
    }

    /// The readiness signal a context emits when its loop starts draining.
    pub fn ready() -> Self {
        Self { tag: READY, call: None, reply: false, payload: Bytes::new() }
    }
}

// ============================================================================
// PAYLOAD CODEC
// ============================================================================

/// Encode a payload value to the JSON bytes both contexts agree on.
pub fn encode<T: Serialize>(value: &T) -> Result<Bytes> {
    let raw = serde_json::to_vec(value)?;
    Ok(Bytes::from(raw))
}

/// Decode a payload into the shape expected for its tag.
///
/// Decode failure is a [`Error::Serialization`], surfaced rather than swallowed.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    serde_json::from_slice(payload).map_err(|e| Error::Serialization(e.to_string()))
}

// ============================================================================
// TESTS
// ============================================================================
