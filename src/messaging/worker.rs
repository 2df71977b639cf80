//! # Worker-Side Event Store
//!
//! The worker context owns the object-store engine and the injected cipher;
//! everything here runs inside the worker. [`attach`] registers one handler
//! per wire tag on the worker's dispatcher, and [`EventStore`] holds the
//! store logic those handlers delegate to.
//!
//! The one place the direction reverses is construction: the worker reads
//! and persists the durable name/flag values through correlated calls back
//! to the main context, which is their sole owner.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::bridge::{decode, encode, handler, Context, Correlator, Handler, READY};
use crate::cipher::RecordCipher;
use crate::error::{Error, Result};
use crate::messaging::flags::{DATABASE_NAME_SUFFIX, ENCRYPTION_STATUS_SUFFIX};
use crate::messaging::protocol::{self, MessageReceivedEvent};
use crate::storage::schema::{
    self, CONVERSATION_STORE, INDEX_CONVERSATION_ID, INDEX_MESSAGE_ID, MESSAGE_STORE,
};
use crate::storage::{ConversationRecord, Key, MessageRecord, StoreEngine};
use crate::time::now_timestamp_millis;

// ============================================================================
// INCOMING MESSAGES
// ============================================================================

/// A receive-type request normalized to one shape, whatever tag it came in
/// under.
struct Incoming {
    message_id: Vec<u8>,
    parent_id: Option<Vec<u8>>,
    nickname: Option<String>,
    body: Vec<u8>,
    partner_key: Vec<u8>,
    sender_key: Vec<u8>,
    dm_token: u32,
    codeset: u8,
    timestamp: i64,
    round: u64,
    message_type: u32,
    status: u8,
}

impl From<protocol::ReceiveRequest> for Incoming {
    fn from(r: protocol::ReceiveRequest) -> Self {
        Incoming {
            message_id: r.message_id,
            parent_id: None,
            nickname: r.nickname,
            body: r.content,
            partner_key: r.partner_key,
            sender_key: r.sender_key,
            dm_token: r.dm_token,
            codeset: r.codeset,
            timestamp: r.timestamp,
            round: r.round,
            message_type: r.message_type,
            status: r.status,
        }
    }
}

impl From<protocol::ReceiveTextRequest> for Incoming {
    fn from(r: protocol::ReceiveTextRequest) -> Self {
        Incoming {
            message_id: r.message_id,
            parent_id: None,
            nickname: r.nickname,
            body: r.text.into_bytes(),
            partner_key: r.partner_key,
            sender_key: r.sender_key,
            dm_token: r.dm_token,
            codeset: r.codeset,
            timestamp: r.timestamp,
            round: r.round,
            message_type: protocol::message_type::TEXT,
            status: r.status,
        }
    }
}

impl From<protocol::ReceiveReplyRequest> for Incoming {
    fn from(r: protocol::ReceiveReplyRequest) -> Self {
        Incoming {
            message_id: r.message_id,
            parent_id: Some(r.reply_to),
            nickname: r.nickname,
            body: r.text.into_bytes(),
            partner_key: r.partner_key,
            sender_key: r.sender_key,
            dm_token: r.dm_token,
            codeset: r.codeset,
            timestamp: r.timestamp,
            round: r.round,
            message_type: protocol::message_type::REPLY,
            status: r.status,
        }
    }
}

impl From<protocol::ReceiveReactionRequest> for Incoming {
    fn from(r: protocol::ReceiveReactionRequest) -> Self {
        Incoming {
            message_id: r.message_id,
            parent_id: Some(r.react_to),
            nickname: r.nickname,
            body: r.reaction.into_bytes(),
            partner_key: r.partner_key,
            sender_key: r.sender_key,
            dm_token: r.dm_token,
            codeset: r.codeset,
            timestamp: r.timestamp,
            round: r.round,
            message_type: protocol::message_type::REACTION,
            status: r.status,
        }
    }
}

// ============================================================================
// EVENT STORE
// ============================================================================

/// The DM event store proper: engine + cipher, owned by the worker context.
pub struct EventStore {
    engine: Mutex<Box<dyn StoreEngine>>,
    cipher: Arc<dyn RecordCipher>,
}

impl EventStore {
    /// Wrap an engine and cipher into an event store.
    pub fn new(engine: Box<dyn StoreEngine>, cipher: Arc<dyn RecordCipher>) -> Self {
        Self { engine: Mutex::new(engine), cipher }
    }

    /// Name of the database the engine is bound to.
    pub fn database_name(&self) -> String {
        self.engine.lock().database_name().to_string()
    }

    /// Bring the engine to the target schema version. Returns steps run.
    pub fn construct(&self) -> Result<u32> {
        schema::migrate(self.engine.lock().as_mut())
    }

    /// Store a message, coalescing duplicates through the unique
    /// message-identifier index, and keep its conversation record current.
    fn receive(&self, incoming: Incoming) -> Result<MessageReceivedEvent> {
        let mut guard = self.engine.lock();
        let engine = guard.as_mut();

        let conversation_updated = upsert_conversation(engine, &incoming)?;

        // A message identifier we already hold is an update of that record,
        // not a second row; the unique index backstops this lookup.
        let matches = engine.get_by_index(
            MESSAGE_STORE,
            INDEX_MESSAGE_ID,
            &Value::from(hex::encode(&incoming.message_id)),
        )?;
        let previous_uuid = matches
            .first()
            .map(MessageRecord::from_value)
            .transpose()?
            .and_then(|m| m.uuid);

        let record = MessageRecord {
            uuid: previous_uuid,
            message_id: incoming.message_id,
            conversation_id: incoming.partner_key,
            sender_key: incoming.sender_key.clone(),
            parent_id: incoming.parent_id,
            body: self.cipher.encrypt(&incoming.body)?,
            timestamp: incoming.timestamp,
            round: incoming.round,
            message_type: incoming.message_type,
            status: incoming.status,
        };

        let key = engine.put(MESSAGE_STORE, record.to_value()?)?;
        let Key::Auto(uuid) = key else {
            return Err(Error::Storage(
                "message store assigned a non-numeric primary key".to_string(),
            ));
        };

        Ok(MessageReceivedEvent {
            uuid,
            sender_key: incoming.sender_key,
            message_updated: previous_uuid.is_some(),
            conversation_updated,
        })
    }

    /// Patch a stored message with its post-send identity and status.
    fn update_sent_status(&self, update: protocol::UpdateSentStatus) -> Result<()> {
        let mut guard = self.engine.lock();
        let engine = guard.as_mut();

        let Some(row) = engine.get(MESSAGE_STORE, &Key::Auto(update.uuid))? else {
            tracing::warn!(uuid = update.uuid, "sent-status update for unknown record");
            return Ok(());
        };
        let mut record = MessageRecord::from_value(&row)?;
        record.message_id = update.message_id;
        record.timestamp = update.timestamp;
        record.round = update.round;
        record.status = update.status;
        engine.put(MESSAGE_STORE, record.to_value()?)?;
        Ok(())
    }

    /// Set or clear the block flag for a sender. The conversation store is
    /// the block list; blocking a sender we have never heard from creates a
    /// stub record so the block sticks before first contact.
    fn set_blocked(&self, sender_key: &[u8], blocked: bool) -> Result<()> {
        let mut guard = self.engine.lock();
        let engine = guard.as_mut();

        let key = Key::Text(hex::encode(sender_key));
        match engine.get(CONVERSATION_STORE, &key)? {
            Some(row) => {
                let mut record = ConversationRecord::from_value(&row)?;
                record.blocked = blocked;
                record.updated_at = now_timestamp_millis();
                engine.put(CONVERSATION_STORE, record.to_value()?)?;
            }
            None if blocked => {
                let record = ConversationRecord {
                    conversation_id: sender_key.to_vec(),
                    token: 0,
                    codeset_version: 0,
                    nickname: None,
                    blocked: true,
                    updated_at: now_timestamp_millis(),
                };
                engine.put(CONVERSATION_STORE, record.to_value()?)?;
            }
            None => {
                tracing::warn!(
                    sender = %hex::encode(sender_key),
                    "unblock for a sender with no conversation"
                );
            }
        }
        Ok(())
    }

    /// One conversation by identifier; `None` when absent.
    fn conversation(&self, conversation_id: &[u8]) -> Result<Option<ConversationRecord>> {
        let guard = self.engine.lock();
        let key = Key::Text(hex::encode(conversation_id));
        guard
            .get(CONVERSATION_STORE, &key)?
            .map(|row| ConversationRecord::from_value(&row))
            .transpose()
    }

    /// Every conversation in the store.
    fn conversations(&self) -> Result<Vec<ConversationRecord>> {
        let guard = self.engine.lock();
        guard
            .get_all(CONVERSATION_STORE)?
            .iter()
            .map(ConversationRecord::from_value)
            .collect()
    }

    /// A conversation's messages, bodies decrypted, oldest first.
    fn messages(&self, conversation_id: &[u8]) -> Result<Vec<MessageRecord>> {
        let rows = {
            let guard = self.engine.lock();
            guard.get_by_index(
                MESSAGE_STORE,
                INDEX_CONVERSATION_ID,
                &Value::from(hex::encode(conversation_id)),
            )?
        };

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut record = MessageRecord::from_value(row)?;
            record.body = self.cipher.decrypt(&record.body)?;
            messages.push(record);
        }
        messages.sort_by_key(|m| (m.timestamp, m.uuid));
        Ok(messages)
    }
}

fn upsert_conversation(engine: &mut dyn StoreEngine, incoming: &Incoming) -> Result<bool> {
    let key = Key::Text(hex::encode(&incoming.partner_key));
    match engine.get(CONVERSATION_STORE, &key)? {
        None => {
            let record = ConversationRecord {
                conversation_id: incoming.partner_key.clone(),
                token: incoming.dm_token,
                codeset_version: incoming.codeset,
                nickname: incoming.nickname.clone(),
                blocked: false,
                updated_at: now_timestamp_millis(),
            };
            engine.put(CONVERSATION_STORE, record.to_value()?)?;
            Ok(true)
        }
        Some(row) => {
            let mut record = ConversationRecord::from_value(&row)?;
            let nickname_changed =
                incoming.nickname.is_some() && record.nickname != incoming.nickname;
            let changed = nickname_changed
                || record.token != incoming.dm_token
                || record.codeset_version != incoming.codeset;
            if changed {
                if nickname_changed {
                    record.nickname = incoming.nickname.clone();
                }
                record.token = incoming.dm_token;
                record.codeset_version = incoming.codeset;
                record.updated_at = now_timestamp_millis();
                engine.put(CONVERSATION_STORE, record.to_value()?)?;
            }
            Ok(changed)
        }
    }
}

// ============================================================================
// HANDLER REGISTRATION
// ============================================================================

/// Register the worker's handler for every wire tag it serves.
pub fn attach(context: &Context, store: Arc<EventStore>) {
    let dispatcher = context.dispatcher();
    let correlator = context.correlator();

    // Peer readiness needs no action on this side.
    dispatcher.register(READY, handler(|_| async { Ok(None) }));

    dispatcher.register(
        protocol::CONSTRUCT_STORE,
        construct_handler(store.clone(), correlator.clone()),
    );

    dispatcher.register(
        protocol::RECEIVE,
        receive_handler::<protocol::ReceiveRequest>(store.clone(), correlator.clone()),
    );
    dispatcher.register(
        protocol::RECEIVE_TEXT,
        receive_handler::<protocol::ReceiveTextRequest>(store.clone(), correlator.clone()),
    );
    dispatcher.register(
        protocol::RECEIVE_REPLY,
        receive_handler::<protocol::ReceiveReplyRequest>(store.clone(), correlator.clone()),
    );
    dispatcher.register(
        protocol::RECEIVE_REACTION,
        receive_handler::<protocol::ReceiveReactionRequest>(store.clone(), correlator),
    );

    {
        let store = store.clone();
        dispatcher.register(
            protocol::UPDATE_SENT_STATUS,
            handler(move |payload| {
                let store = store.clone();
                async move {
                    // Fire-and-forget: failures are logged, never answered.
                    match decode::<protocol::UpdateSentStatus>(&payload) {
                        Ok(update) => {
                            if let Err(e) = store.update_sent_status(update) {
                                tracing::error!(error = %e, "sent-status update failed");
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "undecodable sent-status update dropped")
                        }
                    }
                    Ok(None)
                }
            }),
        );
    }

    for (tag, blocked) in [(protocol::BLOCK_SENDER, true), (protocol::UNBLOCK_SENDER, false)] {
        let store = store.clone();
        dispatcher.register(
            tag,
            handler(move |payload| {
                let store = store.clone();
                async move {
                    match decode::<protocol::SenderKey>(&payload) {
                        Ok(request) => {
                            if let Err(e) = store.set_blocked(&request.sender_key, blocked) {
                                tracing::error!(error = %e, blocked, "block-list update failed");
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "undecodable block request dropped")
                        }
                    }
                    Ok(None)
                }
            }),
        );
    }

    {
        let store = store.clone();
        dispatcher.register(
            protocol::GET_CONVERSATION,
            handler(move |payload| {
                let store = store.clone();
                async move {
                    let reply = match decode::<protocol::ConversationQuery>(&payload)
                        .and_then(|query| store.conversation(&query.conversation_id))
                    {
                        Ok(conversation) => {
                            protocol::ConversationReply { conversation, error: None }
                        }
                        Err(e) => protocol::ConversationReply {
                            conversation: None,
                            error: Some(e.to_string()),
                        },
                    };
                    Ok(Some(encode(&reply)?))
                }
            }),
        );
    }

    {
        let store = store.clone();
        dispatcher.register(
            protocol::GET_CONVERSATIONS,
            handler(move |_| {
                let store = store.clone();
                async move {
                    let reply = match store.conversations() {
                        Ok(conversations) => {
                            protocol::ConversationsReply { conversations, error: None }
                        }
                        Err(e) => protocol::ConversationsReply {
                            conversations: Vec::new(),
                            error: Some(e.to_string()),
                        },
                    };
                    Ok(Some(encode(&reply)?))
                }
            }),
        );
    }

    dispatcher.register(
        protocol::GET_MESSAGES,
        handler(move |payload| {
            let store = store.clone();
            async move {
                let reply = match decode::<protocol::ConversationQuery>(&payload)
                    .and_then(|query| store.messages(&query.conversation_id))
                {
                    Ok(messages) => protocol::MessagesReply { messages, error: None },
                    Err(e) => protocol::MessagesReply {
                        messages: Vec::new(),
                        error: Some(e.to_string()),
                    },
                };
                Ok(Some(encode(&reply)?))
            }
        }),
    );
}

fn construct_handler(store: Arc<EventStore>, correlator: Arc<Correlator>) -> Handler {
    handler(move |payload| {
        let store = store.clone();
        let correlator = correlator.clone();
        async move {
            let reply = match decode::<protocol::ConstructStore>(&payload) {
                Ok(request) => construct(&store, &correlator, request).await,
                Err(e) => fail(protocol::ConstructError::Storage { message: e.to_string() }),
            };
            Ok(Some(encode(&reply)?))
        }
    })
}

fn fail(error: protocol::ConstructError) -> protocol::ConstructStoreReply {
    protocol::ConstructStoreReply { error: Some(error) }
}

async fn construct(
    store: &EventStore,
    correlator: &Correlator,
    request: protocol::ConstructStore,
) -> protocol::ConstructStoreReply {
    use crate::messaging::protocol::ConstructError;

    // The main context owns durable flags; the database name lives there so
    // the application can find its databases without opening them.
    let name = protocol::StoreDatabaseName {
        key: format!("{}{}", request.storage_tag, DATABASE_NAME_SUFFIX),
        database_name: store.database_name(),
    };
    let reply: protocol::StoreDatabaseNameReply =
        match correlator.call_as(protocol::STORE_DATABASE_NAME, &name).await {
            Ok(reply) => reply,
            Err(e) => return fail(ConstructError::Storage { message: e.to_string() }),
        };
    if let Some(message) = reply.error {
        return fail(ConstructError::Storage { message });
    }

    // The encryption flag is written once, on first creation; the main
    // context answers with the authoritative value.
    let status = protocol::StoreEncryptionStatus {
        key: format!("{}{}", request.storage_tag, ENCRYPTION_STATUS_SUFFIX),
        encryption: request.encryption,
    };
    let reply: protocol::EncryptionStatusReply =
        match correlator.call_as(protocol::STORE_ENCRYPTION_STATUS, &status).await {
            Ok(reply) => reply,
            Err(e) => return fail(ConstructError::Storage { message: e.to_string() }),
        };
    if let Some(message) = reply.error {
        return fail(ConstructError::Storage { message });
    }
    if reply.encryption != request.encryption {
        return fail(ConstructError::EncryptionMismatch {
            requested: request.encryption,
            persisted: reply.encryption,
        });
    }

    match store.construct() {
        Ok(steps) => {
            tracing::info!(database = %store.database_name(), steps, "store constructed");
            protocol::ConstructStoreReply { error: None }
        }
        Err(e) => fail(ConstructError::Upgrade { message: e.to_string() }),
    }
}

fn receive_handler<T>(store: Arc<EventStore>, correlator: Arc<Correlator>) -> Handler
where
    T: serde::de::DeserializeOwned + Into<Incoming> + Send + 'static,
{
    handler(move |payload| {
        let store = store.clone();
        let correlator = correlator.clone();
        async move {
            let reply = match decode::<T>(&payload) {
                Err(e) => {
                    // The 0 identifier is the boundary's decode-failure
                    // convention; a genuine store failure carries `error`.
                    tracing::warn!(error = %e, "rejecting undecodable receive payload");
                    protocol::ReceiveResponse { uuid: 0, error: None }
                }
                Ok(request) => match store.receive(request.into()) {
                    Ok(event) => {
                        let uuid = event.uuid;
                        if let Err(e) =
                            correlator.notify(protocol::MESSAGE_RECEIVED, &event).await
                        {
                            tracing::warn!(error = %e, "message-received notification lost");
                        }
                        protocol::ReceiveResponse { uuid, error: None }
                    }
                    Err(e) => protocol::ReceiveResponse { uuid: 0, error: Some(e.to_string()) },
                },
            };
            Ok(Some(encode(&reply)?))
        }
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::PlaintextCipher;
    use crate::storage::MemoryEngine;

    /// Involutive test cipher: visibly scrambles bodies at rest.
    struct XorCipher;

    impl RecordCipher for XorCipher {
        fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
            Ok(plaintext.iter().map(|b| b ^ 0x5A).collect())
        }

        fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
            self.encrypt(ciphertext)
        }
    }

    fn store_with(cipher: Arc<dyn RecordCipher>) -> EventStore {
        let mut engine = MemoryEngine::new("worker-test-db");
        schema::migrate(&mut engine).unwrap();
        EventStore::new(Box::new(engine), cipher)
    }

    fn incoming(message_id: &[u8], partner: &[u8], body: &[u8]) -> Incoming {
        Incoming {
            message_id: message_id.to_vec(),
            parent_id: None,
            nickname: Some("aria".to_string()),
            body: body.to_vec(),
            partner_key: partner.to_vec(),
            sender_key: partner.to_vec(),
            dm_token: 7,
            codeset: 1,
            timestamp: 1_720_000_000_000,
            round: 10,
            message_type: protocol::message_type::TEXT,
            status: protocol::sent_status::SENT,
        }
    }

    #[test]
    fn test_first_receive_creates_conversation_and_record() {
        let store = store_with(Arc::new(PlaintextCipher));
        let event = store.receive(incoming(b"m1", b"pk", b"hello")).unwrap();

        assert_eq!(event.uuid, 1);
        assert!(!event.message_updated);
        assert!(event.conversation_updated);

        let conversation = store.conversation(b"pk").unwrap().unwrap();
        assert_eq!(conversation.token, 7);
        assert_eq!(conversation.nickname.as_deref(), Some("aria"));
        assert!(!conversation.blocked);
    }

    #[test]
    fn test_second_message_same_conversation_does_not_update_conversation() {
        let store = store_with(Arc::new(PlaintextCipher));
        store.receive(incoming(b"m1", b"pk", b"one")).unwrap();
        let event = store.receive(incoming(b"m2", b"pk", b"two")).unwrap();

        assert_eq!(event.uuid, 2);
        assert!(!event.conversation_updated);
        assert_eq!(store.conversations().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_message_id_coalesces_to_one_record() {
        let store = store_with(Arc::new(PlaintextCipher));
        let first = store.receive(incoming(b"m1", b"pk", b"draft")).unwrap();

        let mut second = incoming(b"m1", b"pk", b"final");
        second.status = protocol::sent_status::DELIVERED;
        let event = store.receive(second).unwrap();

        assert_eq!(event.uuid, first.uuid);
        assert!(event.message_updated);

        let messages = store.messages(b"pk").unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].body, b"final");
        assert_eq!(messages[0].status, protocol::sent_status::DELIVERED);
    }

    #[test]
    fn test_nickname_change_refreshes_conversation() {
        let store = store_with(Arc::new(PlaintextCipher));
        store.receive(incoming(b"m1", b"pk", b"one")).unwrap();

        let mut renamed = incoming(b"m2", b"pk", b"two");
        renamed.nickname = Some("ghost".to_string());
        let event = store.receive(renamed).unwrap();

        assert!(event.conversation_updated);
        let conversation = store.conversation(b"pk").unwrap().unwrap();
        assert_eq!(conversation.nickname.as_deref(), Some("ghost"));
    }

    #[test]
    fn test_reaction_conversion_carries_parent_and_type() {
        let request = protocol::ReceiveReactionRequest {
            message_id: b"m2".to_vec(),
            react_to: b"m1".to_vec(),
            nickname: None,
            reaction: "🔥".to_string(),
            partner_key: b"pk".to_vec(),
            sender_key: b"pk".to_vec(),
            dm_token: 7,
            codeset: 1,
            timestamp: 2,
            round: 2,
            status: protocol::sent_status::SENT,
        };
        let incoming: Incoming = request.into();
        assert_eq!(incoming.parent_id.as_deref(), Some(b"m1".as_slice()));
        assert_eq!(incoming.message_type, protocol::message_type::REACTION);

        let store = store_with(Arc::new(PlaintextCipher));
        store.receive(incoming).unwrap();
        let stored = &store.messages(b"pk").unwrap()[0];
        assert_eq!(stored.parent_id.as_deref(), Some(b"m1".as_slice()));
        assert_eq!(stored.body, "🔥".as_bytes());
    }

    #[test]
    fn test_bodies_are_encrypted_at_rest_and_decrypted_on_read() {
        let store = store_with(Arc::new(XorCipher));
        store.receive(incoming(b"m1", b"pk", b"secret")).unwrap();

        // At rest: the raw engine row must not contain the plaintext body.
        let raw = {
            let guard = store.engine.lock();
            guard.get(MESSAGE_STORE, &Key::Auto(1)).unwrap().unwrap()
        };
        let at_rest = MessageRecord::from_value(&raw).unwrap();
        assert_ne!(at_rest.body, b"secret");

        // On read: decrypted through the same cipher.
        let messages = store.messages(b"pk").unwrap();
        assert_eq!(messages[0].body, b"secret");
    }

    #[test]
    fn test_update_sent_status_patches_record() {
        let store = store_with(Arc::new(PlaintextCipher));
        let event = store.receive(incoming(b"tmp-id", b"pk", b"out")).unwrap();

        store
            .update_sent_status(protocol::UpdateSentStatus {
                uuid: event.uuid,
                message_id: b"final-id".to_vec(),
                timestamp: 9_000,
                round: 33,
                status: protocol::sent_status::DELIVERED,
            })
            .unwrap();

        let messages = store.messages(b"pk").unwrap();
        assert_eq!(messages[0].message_id, b"final-id");
        assert_eq!(messages[0].round, 33);
        assert_eq!(messages[0].status, protocol::sent_status::DELIVERED);
    }

    #[test]
    fn test_update_sent_status_for_unknown_record_is_harmless() {
        let store = store_with(Arc::new(PlaintextCipher));
        store
            .update_sent_status(protocol::UpdateSentStatus {
                uuid: 404,
                message_id: b"x".to_vec(),
                timestamp: 0,
                round: 0,
                status: protocol::sent_status::FAILED,
            })
            .unwrap();
    }

    #[test]
    fn test_block_existing_sender_flips_flag_and_keeps_metadata() {
        let store = store_with(Arc::new(PlaintextCipher));
        store.receive(incoming(b"m1", b"pk", b"hi")).unwrap();

        store.set_blocked(b"pk", true).unwrap();
        let blocked = store.conversation(b"pk").unwrap().unwrap();
        assert!(blocked.blocked);
        assert_eq!(blocked.token, 7);

        store.set_blocked(b"pk", false).unwrap();
        assert!(!store.conversation(b"pk").unwrap().unwrap().blocked);
    }

    #[test]
    fn test_block_unknown_sender_creates_blocked_stub() {
        let store = store_with(Arc::new(PlaintextCipher));
        store.set_blocked(b"stranger", true).unwrap();

        let stub = store.conversation(b"stranger").unwrap().unwrap();
        assert!(stub.blocked);
        assert_eq!(stub.token, 0);

        // Unblocking a sender we never heard from stays a no-op.
        store.set_blocked(b"nobody", false).unwrap();
        assert!(store.conversation(b"nobody").unwrap().is_none());
    }

    #[test]
    fn test_messages_sorted_oldest_first() {
        let store = store_with(Arc::new(PlaintextCipher));
        let mut late = incoming(b"m-late", b"pk", b"late");
        late.timestamp = 2_000;
        let mut early = incoming(b"m-early", b"pk", b"early");
        early.timestamp = 1_000;

        store.receive(late).unwrap();
        store.receive(early).unwrap();

        let bodies: Vec<Vec<u8>> =
            store.messages(b"pk").unwrap().into_iter().map(|m| m.body).collect();
        assert_eq!(bodies, vec![b"early".to_vec(), b"late".to_vec()]);
    }

    #[test]
    fn test_queries_on_absent_data_return_empty() {
        let store = store_with(Arc::new(PlaintextCipher));
        assert!(store.conversation(b"ghost").unwrap().is_none());
        assert!(store.conversations().unwrap().is_empty());
        assert!(store.messages(b"ghost").unwrap().is_empty());
    }
}
