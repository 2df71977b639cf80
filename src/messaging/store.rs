//! # DM Store Façade
//!
//! The main-context handle to the event store. Opening a store wires up both
//! contexts, performs the ready handshake, and issues `construct-store`;
//! afterwards every operation is a thin correlated call (or fire-and-forget
//! notification) to the worker.
//!
//! ## Open Sequence
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          OPEN SEQUENCE                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   MAIN                                          WORKER                  │
//! │   ────                                          ──────                  │
//! │   link transports, spawn both loops                                     │
//! │        │◄──────────────── ready ──────────────────│                     │
//! │        │─────────── construct-store ─────────────►│                     │
//! │        │◄──────── store-database-name ────────────│  (main persists)    │
//! │        │──────────────── reply ──────────────────►│                     │
//! │        │◄─────── store-encryption-status ─────────│  (first write wins) │
//! │        │──────── reply: persisted value ─────────►│                     │
//! │        │                                          │ mismatch? fail open │
//! │        │                                          │ else run migrations │
//! │        │◄──────── construct-store reply ──────────│                     │
//! │   store usable, or open() returns the error                             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::bridge::{
    decode, encode, handler, link, Context, Correlator, READY, RESPONSE_TIMEOUT,
};
use crate::cipher::{PlaintextCipher, RecordCipher};
use crate::error::{Error, Result};
use crate::messaging::flags::{FlagStore, MemoryFlagStore};
use crate::messaging::protocol::{self, ConstructError, MessageReceivedEvent};
use crate::messaging::worker::{self, EventStore};
use crate::storage::{ConversationRecord, MessageRecord, StoreEngine};

/// Observer invoked on the main context once per successful receive.
pub type MessageObserver = Arc<dyn Fn(MessageReceivedEvent) + Send + Sync>;

// ============================================================================
// EVENT MODEL
// ============================================================================

/// The DM event-store operation set, one method per wire tag.
#[async_trait]
pub trait EventModel: Send + Sync {
    /// Store a message of an explicit type; returns its record identifier.
    async fn receive(&self, message: protocol::ReceiveRequest) -> Result<u64>;

    /// Store a plain text message; returns its record identifier.
    async fn receive_text(&self, message: protocol::ReceiveTextRequest) -> Result<u64>;

    /// Store a reply; returns its record identifier.
    async fn receive_reply(&self, message: protocol::ReceiveReplyRequest) -> Result<u64>;

    /// Store a reaction; returns its record identifier.
    async fn receive_reaction(&self, message: protocol::ReceiveReactionRequest) -> Result<u64>;

    /// Patch a stored message's post-send identity and status.
    /// Fire-and-forget: no response is awaited.
    async fn update_sent_status(&self, update: protocol::UpdateSentStatus) -> Result<()>;

    /// Block a sender. Fire-and-forget.
    async fn block_sender(&self, sender_key: Vec<u8>) -> Result<()>;

    /// Unblock a sender. Fire-and-forget.
    async fn unblock_sender(&self, sender_key: Vec<u8>) -> Result<()>;

    /// Fetch one conversation; `None` when absent.
    async fn get_conversation(&self, conversation_id: &[u8])
        -> Result<Option<ConversationRecord>>;

    /// Fetch every conversation; empty when there are none.
    async fn get_conversations(&self) -> Result<Vec<ConversationRecord>>;

    /// Fetch a conversation's messages, bodies decrypted, oldest first.
    async fn get_messages(&self, conversation_id: &[u8]) -> Result<Vec<MessageRecord>>;
}

// ============================================================================
// OPEN PARAMETERS
// ============================================================================

/// Configuration for [`DmStore::open`].
pub struct OpenParams {
    /// Application storage tag; flag keys derive from it.
    pub storage_tag: String,
    /// Whether stored bodies are encrypted. Must match the status persisted
    /// at the database's first creation.
    pub encryption: bool,
    /// The object-store engine the worker will own.
    pub engine: Box<dyn StoreEngine>,
    /// Cipher applied to message bodies.
    pub cipher: Arc<dyn RecordCipher>,
    /// Durable flag storage owned by the main context.
    pub flags: Arc<dyn FlagStore>,
    /// Observer for message-received notifications.
    pub observer: Option<MessageObserver>,
    /// Timeout applied to every correlated call.
    pub call_timeout: Duration,
    /// Capacity of each direction of the envelope channel.
    pub queue_capacity: usize,
}

impl OpenParams {
    /// Parameters with the stock collaborators: plaintext cipher, in-memory
    /// flags, no observer, default timeout.
    pub fn new(storage_tag: impl Into<String>, engine: Box<dyn StoreEngine>) -> Self {
        Self {
            storage_tag: storage_tag.into(),
            encryption: false,
            engine,
            cipher: Arc::new(PlaintextCipher),
            flags: Arc::new(MemoryFlagStore::new()),
            observer: None,
            call_timeout: RESPONSE_TIMEOUT,
            queue_capacity: 64,
        }
    }
}

// ============================================================================
// DM STORE
// ============================================================================

/// Main-context handle to the worker-owned event store.
///
/// Dropping the handle stops both context loops.
#[derive(Debug)]
pub struct DmStore {
    correlator: Arc<Correlator>,
    main_task: JoinHandle<()>,
    worker_task: JoinHandle<()>,
}

impl DmStore {
    /// Wire up both contexts, perform the ready handshake, and construct the
    /// store. Construction-time failures (flag mismatch, migration failure)
    /// mean no usable store is returned at all.
    pub async fn open(params: OpenParams) -> Result<DmStore> {
        let OpenParams {
            storage_tag,
            encryption,
            engine,
            cipher,
            flags,
            observer,
            call_timeout,
            queue_capacity,
        } = params;

        let (main_transport, worker_transport) = link(queue_capacity);
        let main = Context::new("main", main_transport, call_timeout);
        let worker_ctx = Context::new("worker", worker_transport, call_timeout);

        let ready_rx = register_main_handlers(&main, flags, observer);

        let event_store = Arc::new(EventStore::new(engine, cipher));
        worker::attach(&worker_ctx, event_store);

        let correlator = main.correlator();
        let store = DmStore {
            correlator,
            main_task: tokio::spawn(main.run()),
            worker_task: tokio::spawn(worker_ctx.run()),
        };

        // The worker signals readiness-to-receive before anything that
        // expects an answer may be sent.
        match tokio::time::timeout(call_timeout, ready_rx).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(Error::TransportClosed),
            Err(_) => return Err(Error::Timeout { tag: READY, waited: call_timeout }),
        }

        let reply: protocol::ConstructStoreReply = store
            .correlator
            .call_as(
                protocol::CONSTRUCT_STORE,
                &protocol::ConstructStore { storage_tag, encryption },
            )
            .await?;
        if let Some(error) = reply.error {
            return Err(match error {
                ConstructError::EncryptionMismatch { requested, persisted } => {
                    Error::EncryptionStatusMismatch { requested, persisted }
                }
                ConstructError::Upgrade { message } => Error::Upgrade(message),
                ConstructError::Storage { message } => Error::Storage(message),
            });
        }

        Ok(store)
    }
}

impl Drop for DmStore {
    fn drop(&mut self) {
        self.main_task.abort();
        self.worker_task.abort();
    }
}

fn register_main_handlers(
    main: &Context,
    flags: Arc<dyn FlagStore>,
    observer: Option<MessageObserver>,
) -> oneshot::Receiver<()> {
    let dispatcher = main.dispatcher();

    let (ready_tx, ready_rx) = oneshot::channel();
    let ready_slot = Arc::new(Mutex::new(Some(ready_tx)));
    dispatcher.register(
        READY,
        handler(move |_| {
            let sender = ready_slot.lock().take();
            async move {
                if let Some(tx) = sender {
                    let _ = tx.send(());
                }
                Ok(None)
            }
        }),
    );

    {
        let flags = flags.clone();
        dispatcher.register(
            protocol::STORE_DATABASE_NAME,
            handler(move |payload| {
                let flags = flags.clone();
                async move {
                    let request: protocol::StoreDatabaseName = decode(&payload)?;
                    let error = flags
                        .set(&request.key, &request.database_name)
                        .err()
                        .map(|e| e.to_string());
                    Ok(Some(encode(&protocol::StoreDatabaseNameReply { error })?))
                }
            }),
        );
    }

    dispatcher.register(
        protocol::STORE_ENCRYPTION_STATUS,
        handler(move |payload| {
            let flags = flags.clone();
            async move {
                let request: protocol::StoreEncryptionStatus = decode(&payload)?;
                let reply = match persist_encryption_status(flags.as_ref(), &request) {
                    Ok(encryption) => {
                        protocol::EncryptionStatusReply { encryption, error: None }
                    }
                    Err(e) => protocol::EncryptionStatusReply {
                        encryption: request.encryption,
                        error: Some(e.to_string()),
                    },
                };
                Ok(Some(encode(&reply)?))
            }
        }),
    );

    dispatcher.register(
        protocol::MESSAGE_RECEIVED,
        handler(move |payload| {
            let observer = observer.clone();
            async move {
                match decode::<MessageReceivedEvent>(&payload) {
                    Ok(event) => match observer {
                        Some(callback) => callback(event),
                        None => tracing::debug!("message received with no observer registered"),
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "undecodable message-received notification")
                    }
                }
                Ok(None)
            }
        }),
    );

    ready_rx
}

/// First write wins: a recorded status is authoritative forever; the first
/// open of a database records the requested one.
fn persist_encryption_status(
    flags: &dyn FlagStore,
    request: &protocol::StoreEncryptionStatus,
) -> Result<bool> {
    match flags.get(&request.key)? {
        Some(stored) => Ok(stored == "true"),
        None => {
            flags.set(&request.key, if request.encryption { "true" } else { "false" })?;
            Ok(request.encryption)
        }
    }
}

fn receive_result(reply: protocol::ReceiveResponse) -> Result<u64> {
    match reply.error {
        Some(message) => Err(Error::Storage(message)),
        None => Ok(reply.uuid),
    }
}

#[async_trait]
impl EventModel for DmStore {
    async fn receive(&self, message: protocol::ReceiveRequest) -> Result<u64> {
        receive_result(self.correlator.call_as(protocol::RECEIVE, &message).await?)
    }

    async fn receive_text(&self, message: protocol::ReceiveTextRequest) -> Result<u64> {
        receive_result(self.correlator.call_as(protocol::RECEIVE_TEXT, &message).await?)
    }

    async fn receive_reply(&self, message: protocol::ReceiveReplyRequest) -> Result<u64> {
        receive_result(self.correlator.call_as(protocol::RECEIVE_REPLY, &message).await?)
    }

    async fn receive_reaction(&self, message: protocol::ReceiveReactionRequest) -> Result<u64> {
        receive_result(
            self.correlator.call_as(protocol::RECEIVE_REACTION, &message).await?,
        )
    }

    async fn update_sent_status(&self, update: protocol::UpdateSentStatus) -> Result<()> {
        self.correlator.notify(protocol::UPDATE_SENT_STATUS, &update).await
    }

    async fn block_sender(&self, sender_key: Vec<u8>) -> Result<()> {
        self.correlator
            .notify(protocol::BLOCK_SENDER, &protocol::SenderKey { sender_key })
            .await
    }

    async fn unblock_sender(&self, sender_key: Vec<u8>) -> Result<()> {
        self.correlator
            .notify(protocol::UNBLOCK_SENDER, &protocol::SenderKey { sender_key })
            .await
    }

    async fn get_conversation(
        &self,
        conversation_id: &[u8],
    ) -> Result<Option<ConversationRecord>> {
        let query = protocol::ConversationQuery { conversation_id: conversation_id.to_vec() };
        let reply: protocol::ConversationReply =
            self.correlator.call_as(protocol::GET_CONVERSATION, &query).await?;
        match reply.error {
            Some(message) => Err(Error::Storage(message)),
            None => Ok(reply.conversation),
        }
    }

    async fn get_conversations(&self) -> Result<Vec<ConversationRecord>> {
        let reply: protocol::ConversationsReply =
            self.correlator.call_as(protocol::GET_CONVERSATIONS, &()).await?;
        match reply.error {
            Some(message) => Err(Error::Storage(message)),
            None => Ok(reply.conversations),
        }
    }

    async fn get_messages(&self, conversation_id: &[u8]) -> Result<Vec<MessageRecord>> {
        let query = protocol::ConversationQuery { conversation_id: conversation_id.to_vec() };
        let reply: protocol::MessagesReply =
            self.correlator.call_as(protocol::GET_MESSAGES, &query).await?;
        match reply.error {
            Some(message) => Err(Error::Storage(message)),
            None => Ok(reply.messages),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::flags::{DATABASE_NAME_SUFFIX, ENCRYPTION_STATUS_SUFFIX};
    use crate::messaging::protocol::{message_type, sent_status};
    use crate::storage::{IndexSchema, Key, MemoryEngine, StoreSchema, TARGET_VERSION};
    use serde_json::Value;

    /// MemoryEngine behind an Arc so tests can hand the "same database" to a
    /// second open, the way a real engine would reopen a file.
    #[derive(Clone)]
    struct SharedEngine {
        name: String,
        inner: Arc<Mutex<MemoryEngine>>,
    }

    impl SharedEngine {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                inner: Arc::new(Mutex::new(MemoryEngine::new(name))),
            }
        }
    }

    impl StoreEngine for SharedEngine {
        fn database_name(&self) -> &str {
            &self.name
        }
        fn version(&self) -> u32 {
            self.inner.lock().version()
        }
        fn set_version(&mut self, version: u32) -> Result<()> {
            self.inner.lock().set_version(version)
        }
        fn create_store(&mut self, schema: StoreSchema) -> Result<()> {
            self.inner.lock().create_store(schema)
        }
        fn create_index(&mut self, store: &str, index: IndexSchema) -> Result<()> {
            self.inner.lock().create_index(store, index)
        }
        fn put(&mut self, store: &str, value: Value) -> Result<Key> {
            self.inner.lock().put(store, value)
        }
        fn get(&self, store: &str, key: &Key) -> Result<Option<Value>> {
            self.inner.lock().get(store, key)
        }
        fn get_by_index(&self, store: &str, index: &str, key: &Value) -> Result<Vec<Value>> {
            self.inner.lock().get_by_index(store, index, key)
        }
        fn get_all(&self, store: &str) -> Result<Vec<Value>> {
            self.inner.lock().get_all(store)
        }
    }

    fn text_message(message_id: &[u8], partner: &[u8], text: &str) -> protocol::ReceiveTextRequest {
        protocol::ReceiveTextRequest {
            message_id: message_id.to_vec(),
            nickname: Some("aria".to_string()),
            text: text.to_string(),
            partner_key: partner.to_vec(),
            sender_key: partner.to_vec(),
            dm_token: 11,
            codeset: 1,
            timestamp: 1_720_000_000_000,
            round: 1,
            status: sent_status::SENT,
        }
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_alice_scenario_end_to_end() {
        let events: Arc<Mutex<Vec<MessageReceivedEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();

        let mut params = OpenParams::new(
            "alice",
            Box::new(MemoryEngine::new("nocturne-dm-alice")),
        );
        params.observer = Some(Arc::new(move |event| sink.lock().push(event)));
        let store = DmStore::open(params).await.unwrap();

        let partner = b"a1b2".to_vec();
        let first = store.receive_text(text_message(b"m1", &partner, "hi")).await.unwrap();
        assert_eq!(first, 1);

        let reaction = protocol::ReceiveReactionRequest {
            message_id: b"m2".to_vec(),
            react_to: b"m1".to_vec(),
            nickname: Some("aria".to_string()),
            reaction: "🔥".to_string(),
            partner_key: partner.clone(),
            sender_key: partner.clone(),
            dm_token: 11,
            codeset: 1,
            timestamp: 1_720_000_000_500,
            round: 2,
            status: sent_status::SENT,
        };
        let second = store.receive_reaction(reaction).await.unwrap();
        assert_eq!(second, 2);

        let conversation = store.get_conversation(&partner).await.unwrap().unwrap();
        assert_eq!(conversation.token, 11);

        let conversations = store.get_conversations().await.unwrap();
        assert_eq!(conversations.len(), 1);

        let messages = store.get_messages(&partner).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].body, b"hi");
        assert_eq!(messages[0].message_type, message_type::TEXT);
        assert_eq!(messages[1].parent_id.as_deref(), Some(b"m1".as_slice()));
        assert_eq!(messages[1].message_type, message_type::REACTION);

        // Exactly one notification per successful receive.
        wait_for(|| events.lock().len() == 2).await;
        let seen = events.lock();
        assert!(seen[0].conversation_updated);
        assert!(!seen[0].message_updated);
        assert!(!seen[1].conversation_updated);
    }

    #[tokio::test]
    async fn test_encryption_mismatch_on_reopen_leaves_data_untouched() {
        let engine = SharedEngine::new("nocturne-dm-bob");
        let flags: Arc<dyn FlagStore> = Arc::new(MemoryFlagStore::new());

        let mut params = OpenParams::new("bob", Box::new(engine.clone()));
        params.flags = flags.clone();
        params.encryption = false;
        let store = DmStore::open(params).await.unwrap();
        store.receive_text(text_message(b"m1", b"pk", "kept")).await.unwrap();
        drop(store);

        // Same database, different requested status: fatal, never reconciled.
        let mut params = OpenParams::new("bob", Box::new(engine.clone()));
        params.flags = flags.clone();
        params.encryption = true;
        let err = DmStore::open(params).await.unwrap_err();
        match err {
            Error::EncryptionStatusMismatch { requested, persisted } => {
                assert!(requested);
                assert!(!persisted);
            }
            other => panic!("expected EncryptionStatusMismatch, got {:?}", other),
        }

        // The original status still opens, with prior data intact.
        let mut params = OpenParams::new("bob", Box::new(engine.clone()));
        params.flags = flags;
        params.encryption = false;
        let store = DmStore::open(params).await.unwrap();
        let messages = store.get_messages(b"pk").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].body, b"kept");
    }

    #[tokio::test]
    async fn test_reopen_at_target_version_runs_no_migrations() {
        let engine = SharedEngine::new("nocturne-dm-carol");
        let flags: Arc<dyn FlagStore> = Arc::new(MemoryFlagStore::new());

        let mut params = OpenParams::new("carol", Box::new(engine.clone()));
        params.flags = flags.clone();
        let store = DmStore::open(params).await.unwrap();
        drop(store);
        assert_eq!(engine.version(), TARGET_VERSION);

        let mut params = OpenParams::new("carol", Box::new(engine.clone()));
        params.flags = flags;
        let _store = DmStore::open(params).await.unwrap();
        assert_eq!(engine.version(), TARGET_VERSION);
        assert_eq!(engine.inner.lock().store_names().len(), 2);
    }

    #[tokio::test]
    async fn test_fire_and_forget_ordering_is_preserved() {
        let store = DmStore::open(OpenParams::new(
            "dave",
            Box::new(MemoryEngine::new("nocturne-dm-dave")),
        ))
        .await
        .unwrap();

        let partner = b"pk".to_vec();
        let uuid = store.receive_text(text_message(b"m1", &partner, "out")).await.unwrap();

        // Notifications and the follow-up query travel the same direction;
        // per-direction FIFO makes the mutation visible to the query.
        store
            .update_sent_status(protocol::UpdateSentStatus {
                uuid,
                message_id: b"m1-final".to_vec(),
                timestamp: 1_720_000_001_000,
                round: 8,
                status: sent_status::DELIVERED,
            })
            .await
            .unwrap();
        let messages = store.get_messages(&partner).await.unwrap();
        assert_eq!(messages[0].status, sent_status::DELIVERED);
        assert_eq!(messages[0].message_id, b"m1-final");

        store.block_sender(partner.clone()).await.unwrap();
        let conversation = store.get_conversation(&partner).await.unwrap().unwrap();
        assert!(conversation.blocked);

        store.unblock_sender(partner.clone()).await.unwrap();
        let conversation = store.get_conversation(&partner).await.unwrap().unwrap();
        assert!(!conversation.blocked);
    }

    #[tokio::test]
    async fn test_absent_conversation_is_none_not_error() {
        let store = DmStore::open(OpenParams::new(
            "erin",
            Box::new(MemoryEngine::new("nocturne-dm-erin")),
        ))
        .await
        .unwrap();

        assert!(store.get_conversation(b"ghost").await.unwrap().is_none());
        assert!(store.get_conversations().await.unwrap().is_empty());
        assert!(store.get_messages(b"ghost").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_persists_database_name_and_status_flags() {
        let flags = Arc::new(MemoryFlagStore::new());
        let mut params = OpenParams::new(
            "frank",
            Box::new(MemoryEngine::new("nocturne-dm-frank")),
        );
        params.flags = flags.clone();
        params.encryption = true;
        let _store = DmStore::open(params).await.unwrap();

        assert_eq!(
            flags.get(&format!("frank{DATABASE_NAME_SUFFIX}")).unwrap().as_deref(),
            Some("nocturne-dm-frank")
        );
        assert_eq!(
            flags.get(&format!("frank{ENCRYPTION_STATUS_SUFFIX}")).unwrap().as_deref(),
            Some("true")
        );
    }
}
