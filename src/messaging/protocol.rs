//! # Wire Protocol
//!
//! Every tag the two contexts exchange, and the fixed payload shape behind
//! each one. Payloads are JSON; the schema of each is versioned by
//! construction: a tag never changes shape, new shapes get new tags.
//!
//! Key material is hex-encoded on the wire, message bodies base64-encoded,
//! matching the stored record encodings.

use serde::{Deserialize, Serialize};

use crate::bridge::Tag;
use crate::storage::records::{base64_vec, hex_vec};
use crate::storage::ConversationRecord;

// ============================================================================
// TAGS
// ============================================================================

/// Open the store: verify flags with the main context, run migrations.
pub const CONSTRUCT_STORE: Tag = Tag::from_static("construct-store");
/// Store a message of an explicit type.
pub const RECEIVE: Tag = Tag::from_static("receive");
/// Store a plain text message.
pub const RECEIVE_TEXT: Tag = Tag::from_static("receive-text");
/// Store a text reply to an earlier message.
pub const RECEIVE_REPLY: Tag = Tag::from_static("receive-reply");
/// Store a reaction to an earlier message.
pub const RECEIVE_REACTION: Tag = Tag::from_static("receive-reaction");
/// Update a stored message's delivery status. Fire-and-forget.
pub const UPDATE_SENT_STATUS: Tag = Tag::from_static("update-sent-status");
/// Block a sender. Fire-and-forget.
pub const BLOCK_SENDER: Tag = Tag::from_static("block-sender");
/// Unblock a sender. Fire-and-forget.
pub const UNBLOCK_SENDER: Tag = Tag::from_static("unblock-sender");
/// Fetch one conversation by identifier.
pub const GET_CONVERSATION: Tag = Tag::from_static("get-conversation");
/// Fetch every conversation.
pub const GET_CONVERSATIONS: Tag = Tag::from_static("get-conversations");
/// Fetch a conversation's messages, bodies decrypted.
pub const GET_MESSAGES: Tag = Tag::from_static("get-messages");
/// Worker → main notification after every successful receive.
pub const MESSAGE_RECEIVED: Tag = Tag::from_static("message-received-notification");
/// Worker → main: persist the database name (main owns durable flags).
pub const STORE_DATABASE_NAME: Tag = Tag::from_static("store-database-name");
/// Worker → main: persist-or-read-back the encryption status flag.
pub const STORE_ENCRYPTION_STATUS: Tag = Tag::from_static("store-encryption-status");

// ============================================================================
// FIELD CONSTANTS
// ============================================================================

/// Message kinds stored in [`MessageRecord::message_type`](crate::storage::MessageRecord).
pub mod message_type {
    /// Plain text message.
    pub const TEXT: u32 = 1;
    /// Text reply to an earlier message.
    pub const REPLY: u32 = 2;
    /// Reaction to an earlier message.
    pub const REACTION: u32 = 3;
}

/// Delivery statuses stored in [`MessageRecord::status`](crate::storage::MessageRecord).
pub mod sent_status {
    /// Handed to the network, not yet confirmed.
    pub const SENDING: u8 = 1;
    /// Accepted by the network.
    pub const SENT: u8 = 2;
    /// Confirmed delivered to the partner.
    pub const DELIVERED: u8 = 3;
    /// The network rejected or lost the message.
    pub const FAILED: u8 = 4;
}

// ============================================================================
// CONSTRUCTION
// ============================================================================

/// Payload of [`CONSTRUCT_STORE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructStore {
    /// Application storage tag the flag keys derive from.
    pub storage_tag: String,
    /// Encryption status requested for this open.
    pub encryption: bool,
}

/// Why a construction attempt failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstructError {
    /// The persisted encryption flag disagrees with the request.
    EncryptionMismatch {
        /// Status this open asked for.
        requested: bool,
        /// Status recorded at first creation.
        persisted: bool,
    },
    /// A migration step failed.
    Upgrade {
        /// Engine error text, verbatim.
        message: String,
    },
    /// Flag persistence or another engine operation failed.
    Storage {
        /// Error text, verbatim.
        message: String,
    },
}

/// Reply to [`CONSTRUCT_STORE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructStoreReply {
    /// Present when construction failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ConstructError>,
}

// ============================================================================
// RECEIVE OPERATIONS
// ============================================================================

/// Payload of [`RECEIVE`]: a message of explicit type and raw body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiveRequest {
    /// Network-level message identifier.
    #[serde(with = "hex_vec")]
    pub message_id: Vec<u8>,
    /// Nickname the sender attached, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    /// Raw message body.
    #[serde(with = "base64_vec")]
    pub content: Vec<u8>,
    /// The conversation partner's public key.
    #[serde(with = "hex_vec")]
    pub partner_key: Vec<u8>,
    /// The actual sender's public key (partner, or self for echoes).
    #[serde(with = "hex_vec")]
    pub sender_key: Vec<u8>,
    /// The partner's DM token.
    pub dm_token: u32,
    /// Codeset version of the partner's identity.
    pub codeset: u8,
    /// Sender-side timestamp, Unix milliseconds.
    pub timestamp: i64,
    /// Network round the message arrived on.
    pub round: u64,
    /// Message kind, see [`message_type`].
    pub message_type: u32,
    /// Delivery status, see [`sent_status`].
    pub status: u8,
}

/// Payload of [`RECEIVE_TEXT`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiveTextRequest {
    /// Network-level message identifier.
    #[serde(with = "hex_vec")]
    pub message_id: Vec<u8>,
    /// Nickname the sender attached, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    /// The message text.
    pub text: String,
    /// The conversation partner's public key.
    #[serde(with = "hex_vec")]
    pub partner_key: Vec<u8>,
    /// The actual sender's public key.
    #[serde(with = "hex_vec")]
    pub sender_key: Vec<u8>,
    /// The partner's DM token.
    pub dm_token: u32,
    /// Codeset version of the partner's identity.
    pub codeset: u8,
    /// Sender-side timestamp, Unix milliseconds.
    pub timestamp: i64,
    /// Network round the message arrived on.
    pub round: u64,
    /// Delivery status, see [`sent_status`].
    pub status: u8,
}

/// Payload of [`RECEIVE_REPLY`]: a text message referencing its parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiveReplyRequest {
    /// Network-level message identifier.
    #[serde(with = "hex_vec")]
    pub message_id: Vec<u8>,
    /// Identifier of the message being replied to.
    #[serde(with = "hex_vec")]
    pub reply_to: Vec<u8>,
    /// Nickname the sender attached, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    /// The reply text.
    pub text: String,
    /// The conversation partner's public key.
    #[serde(with = "hex_vec")]
    pub partner_key: Vec<u8>,
    /// The actual sender's public key.
    #[serde(with = "hex_vec")]
    pub sender_key: Vec<u8>,
    /// The partner's DM token.
    pub dm_token: u32,
    /// Codeset version of the partner's identity.
    pub codeset: u8,
    /// Sender-side timestamp, Unix milliseconds.
    pub timestamp: i64,
    /// Network round the message arrived on.
    pub round: u64,
    /// Delivery status, see [`sent_status`].
    pub status: u8,
}

/// Payload of [`RECEIVE_REACTION`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiveReactionRequest {
    /// Network-level message identifier.
    #[serde(with = "hex_vec")]
    pub message_id: Vec<u8>,
    /// Identifier of the message being reacted to.
    #[serde(with = "hex_vec")]
    pub react_to: Vec<u8>,
    /// Nickname the sender attached, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    /// The reaction content (an emoji, typically).
    pub reaction: String,
    /// The conversation partner's public key.
    #[serde(with = "hex_vec")]
    pub partner_key: Vec<u8>,
    /// The actual sender's public key.
    #[serde(with = "hex_vec")]
    pub sender_key: Vec<u8>,
    /// The partner's DM token.
    pub dm_token: u32,
    /// Codeset version of the partner's identity.
    pub codeset: u8,
    /// Sender-side timestamp, Unix milliseconds.
    pub timestamp: i64,
    /// Network round the message arrived on.
    pub round: u64,
    /// Delivery status, see [`sent_status`].
    pub status: u8,
}

/// Reply to every receive-type request.
///
/// `uuid` is the stored record's identifier; `0` is the boundary convention
/// for a request payload that failed to decode. A genuine storage failure
/// carries `error` instead, so callers can tell the two apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiveResponse {
    /// Stored record identifier, or 0 on decode failure.
    pub uuid: u64,
    /// Engine error text, verbatim, when the store operation failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// STATUS AND BLOCK OPERATIONS (fire-and-forget)
// ============================================================================

/// Payload of [`UPDATE_SENT_STATUS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateSentStatus {
    /// Record identifier returned by the original receive call.
    pub uuid: u64,
    /// Final network-level message identifier.
    #[serde(with = "hex_vec")]
    pub message_id: Vec<u8>,
    /// Send timestamp, Unix milliseconds.
    pub timestamp: i64,
    /// Round the message went out on.
    pub round: u64,
    /// New delivery status, see [`sent_status`].
    pub status: u8,
}

/// Payload of [`BLOCK_SENDER`] and [`UNBLOCK_SENDER`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderKey {
    /// Public key of the sender to (un)block.
    #[serde(with = "hex_vec")]
    pub sender_key: Vec<u8>,
}

// ============================================================================
// QUERIES
// ============================================================================

/// Payload of [`GET_CONVERSATION`] and [`GET_MESSAGES`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationQuery {
    /// The conversation (partner key) to look up.
    #[serde(with = "hex_vec")]
    pub conversation_id: Vec<u8>,
}

/// Reply to [`GET_CONVERSATION`]. Absence is `None`, never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationReply {
    /// The conversation, if one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationRecord>,
    /// Engine error text, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reply to [`GET_CONVERSATIONS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationsReply {
    /// Every conversation in the store; empty when there are none.
    #[serde(default)]
    pub conversations: Vec<ConversationRecord>,
    /// Engine error text, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reply to [`GET_MESSAGES`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesReply {
    /// The conversation's messages, bodies decrypted, oldest first.
    #[serde(default)]
    pub messages: Vec<crate::storage::MessageRecord>,
    /// Engine or cipher error text, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// NOTIFICATION
// ============================================================================

/// Payload of [`MESSAGE_RECEIVED`]: emitted to the registered observer
/// exactly once per successful receive-type call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageReceivedEvent {
    /// Stored record identifier.
    pub uuid: u64,
    /// Public key of the message's sender.
    #[serde(with = "hex_vec")]
    pub sender_key: Vec<u8>,
    /// True when an existing record was updated rather than inserted.
    pub message_updated: bool,
    /// True when the conversation set (or its metadata) changed.
    pub conversation_updated: bool,
}

// ============================================================================
// FLAG PERSISTENCE (worker → main)
// ============================================================================

/// Payload of [`STORE_DATABASE_NAME`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreDatabaseName {
    /// Flag key: storage tag + fixed namespace suffix.
    pub key: String,
    /// Database name to persist.
    pub database_name: String,
}

/// Reply to [`STORE_DATABASE_NAME`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreDatabaseNameReply {
    /// Flag-store error text, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Payload of [`STORE_ENCRYPTION_STATUS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreEncryptionStatus {
    /// Flag key: storage tag + fixed namespace suffix.
    pub key: String,
    /// Status requested by this open.
    pub encryption: bool,
}

/// Reply to [`STORE_ENCRYPTION_STATUS`]: the authoritative persisted value
/// (first write wins; the main context is the sole writer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptionStatusReply {
    /// The persisted status.
    pub encryption: bool,
    /// Flag-store error text, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// TESTS
// ============================================================================
