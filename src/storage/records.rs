//! # Stored Records
//!
//! The two record shapes persisted by the event store, plus the field
//! encodings both sides of the bridge agree on: key material travels and is
//! stored hex-encoded, message bodies base64-encoded (they are ciphertext
//! once the injected cipher has run).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// FIELD ENCODINGS
// ============================================================================

/// Hex-encoded byte fields (`#[serde(with = "hex_vec")]`).
pub(crate) mod hex_vec {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}

/// Optional hex-encoded byte fields.
pub(crate) mod hex_vec_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let text: Option<String> = Option::deserialize(deserializer)?;
        text.map(|t| hex::decode(t).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Base64-encoded byte fields (message bodies).
pub(crate) mod base64_vec {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// One received (or sent-and-echoed) DM message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Engine-assigned primary key; absent until first stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<u64>,
    /// Network-level message identifier; unique per store.
    #[serde(with = "hex_vec")]
    pub message_id: Vec<u8>,
    /// Owning conversation (the partner's public key).
    #[serde(with = "hex_vec")]
    pub conversation_id: Vec<u8>,
    /// Public key of whoever sent this message.
    #[serde(with = "hex_vec")]
    pub sender_key: Vec<u8>,
    /// Message this one replies or reacts to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "hex_vec_opt")]
    pub parent_id: Option<Vec<u8>>,
    /// Message body as stored; ciphertext when encryption is on.
    #[serde(with = "base64_vec")]
    pub body: Vec<u8>,
    /// Sender-side timestamp, Unix milliseconds.
    pub timestamp: i64,
    /// Network round the message arrived on.
    pub round: u64,
    /// Message kind, see [`crate::messaging::message_type`].
    pub message_type: u32,
    /// Delivery status, see [`crate::messaging::sent_status`].
    pub status: u8,
}

/// One DM conversation, keyed by the partner's public key. Doubles as the
/// block list: `blocked` is the per-sender block flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// The partner's public key.
    #[serde(with = "hex_vec")]
    pub conversation_id: Vec<u8>,
    /// The partner's DM token.
    pub token: u32,
    /// Codeset version the partner's identity was published under.
    pub codeset_version: u8,
    /// Last nickname the partner supplied, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    /// Whether messages from this sender are blocked.
    pub blocked: bool,
    /// When this record last changed, Unix milliseconds.
    pub updated_at: i64,
}

impl MessageRecord {
    /// The record as an engine row.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Parse an engine row back into a record.
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

impl ConversationRecord {
    /// The record as an engine row.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Parse an engine row back into a record.
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> MessageRecord {
        MessageRecord {
            uuid: Some(3),
            message_id: vec![0xAA, 0xBB],
            conversation_id: vec![0x01, 0x02],
            sender_key: vec![0x01, 0x02],
            parent_id: Some(vec![0xCC]),
            body: b"sealed".to_vec(),
            timestamp: 1_720_000_000_000,
            round: 42,
            message_type: 1,
            status: 2,
        }
    }

    #[test]
    fn test_message_record_round_trip() {
        let record = message();
        let restored = MessageRecord::from_value(&record.to_value().unwrap()).unwrap();
        assert_eq!(restored, record);
    }

    #[test]
    fn test_message_row_encodes_keys_hex_and_body_base64() {
        let row = message().to_value().unwrap();
        assert_eq!(row["message_id"], serde_json::json!("aabb"));
        assert_eq!(row["conversation_id"], serde_json::json!("0102"));
        assert_eq!(row["parent_id"], serde_json::json!("cc"));
        assert_eq!(row["body"], serde_json::json!("c2VhbGVk"));
    }

    #[test]
    fn test_unstored_message_omits_uuid() {
        let mut record = message();
        record.uuid = None;
        record.parent_id = None;
        let row = record.to_value().unwrap();
        assert!(row.get("uuid").is_none());
        assert!(row.get("parent_id").is_none());

        let restored = MessageRecord::from_value(&row).unwrap();
        assert_eq!(restored.uuid, None);
        assert_eq!(restored.parent_id, None);
    }

    #[test]
    fn test_conversation_record_round_trip() {
        let record = ConversationRecord {
            conversation_id: vec![9, 9, 9],
            token: 7,
            codeset_version: 1,
            nickname: Some("aria".to_string()),
            blocked: true,
            updated_at: 1_720_000_000_000,
        };
        let row = record.to_value().unwrap();
        assert_eq!(row["conversation_id"], serde_json::json!("090909"));
        assert_eq!(ConversationRecord::from_value(&row).unwrap(), record);
    }
}
