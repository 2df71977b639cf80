//! # Database Schema
//!
//! Versioned schema for the DM event store, and the migrator that brings an
//! engine from its recorded version to [`TARGET_VERSION`].
//!
//! ## Schema Overview (version 1)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DATABASE SCHEMA                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────────────────┐      ┌──────────────────────────┐         │
//! │  │        messages          │      │      conversations       │         │
//! │  ├──────────────────────────┤      ├──────────────────────────┤         │
//! │  │ uuid (auto primary key)  │      │ conversation_id (pk)     │         │
//! │  │ message_id       [uniq]  │      │ token                    │         │
//! │  │ conversation_id  [idx]───┼─────►│ codeset_version          │         │
//! │  │ sender_key       [idx]   │      │ nickname                 │         │
//! │  │ parent_id                │      │ blocked                  │         │
//! │  │ body (encrypted)         │      │ updated_at               │         │
//! │  │ timestamp / round        │      └──────────────────────────┘         │
//! │  │ message_type / status    │                                           │
//! │  └──────────────────────────┘                                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Migration steps are an ordered, append-only table: a released step is
//! frozen forever, because deployed stores depend on its exact effects. New
//! schema work appends a step with the next version number and may only add
//! stores, indexes, or additively-compatible fields, never remove or
//! redefine what an earlier step created.

use super::engine::{IndexSchema, StoreEngine, StoreSchema};
use crate::error::{Error, Result};

// ============================================================================
// SCHEMA CONSTANTS
// ============================================================================

/// Current schema version.
pub const TARGET_VERSION: u32 = 1;

/// Store holding one record per received message.
pub const MESSAGE_STORE: &str = "messages";

/// Store holding one record per DM conversation.
pub const CONVERSATION_STORE: &str = "conversations";

/// Primary key path of the message store (engine-assigned).
pub const MESSAGE_KEY_PATH: &str = "uuid";

/// Primary key path of the conversation store (the partner's public key).
pub const CONVERSATION_KEY_PATH: &str = "conversation_id";

/// Unique index on the message identifier; duplicate receives coalesce here.
pub const INDEX_MESSAGE_ID: &str = "message_id";

/// Non-unique index on the owning conversation.
pub const INDEX_CONVERSATION_ID: &str = "conversation_id";

/// Non-unique index on the sending key.
pub const INDEX_SENDER_KEY: &str = "sender_key";

// ============================================================================
// MIGRATION TABLE
// ============================================================================

/// One frozen upgrade step, moving the schema to version `to`.
pub struct Migration {
    /// Version this step upgrades the store to (always previous + 1).
    pub to: u32,
    /// The step itself. Must be a no-op-safe pure function of the engine.
    pub run: fn(&mut dyn StoreEngine) -> Result<()>,
}

/// Every released migration, in version order. Append-only.
const MIGRATIONS: &[Migration] = &[Migration { to: 1, run: create_initial_stores }];

/// v0 → v1: the initial layout. Frozen.
fn create_initial_stores(engine: &mut dyn StoreEngine) -> Result<()> {
    engine.create_store(StoreSchema {
        name: MESSAGE_STORE.to_string(),
        key_path: MESSAGE_KEY_PATH.to_string(),
        auto_increment: true,
        indexes: vec![
            IndexSchema {
                name: INDEX_MESSAGE_ID.to_string(),
                key_path: INDEX_MESSAGE_ID.to_string(),
                unique: true,
                multi_entry: false,
            },
            IndexSchema {
                name: INDEX_CONVERSATION_ID.to_string(),
                key_path: INDEX_CONVERSATION_ID.to_string(),
                unique: false,
                multi_entry: false,
            },
            IndexSchema {
                name: INDEX_SENDER_KEY.to_string(),
                key_path: INDEX_SENDER_KEY.to_string(),
                unique: false,
                multi_entry: false,
            },
        ],
    })?;
    engine.create_store(StoreSchema {
        name: CONVERSATION_STORE.to_string(),
        key_path: CONVERSATION_KEY_PATH.to_string(),
        auto_increment: false,
        indexes: vec![],
    })?;
    Ok(())
}

// ============================================================================
// MIGRATOR
// ============================================================================

/// Bring `engine` from its recorded version to [`TARGET_VERSION`].
///
/// Steps run strictly in increasing order starting after the recorded
/// version; a store already at the target runs zero steps. Returns how many
/// steps ran. Any step failure aborts the open as [`Error::Upgrade`], with
/// the engine left at its last committed version.
pub fn migrate(engine: &mut dyn StoreEngine) -> Result<u32> {
    let recorded = engine.version();
    if recorded > TARGET_VERSION {
        return Err(Error::Upgrade(format!(
            "store '{}' is at schema version {recorded}, newer than this build's {TARGET_VERSION}",
            engine.database_name()
        )));
    }
    if recorded == TARGET_VERSION {
        tracing::debug!(version = recorded, "schema already at target version");
        return Ok(0);
    }

    tracing::info!(
        database = engine.database_name(),
        from = recorded,
        to = TARGET_VERSION,
        "running schema migrations"
    );

    let mut steps_run = 0;
    for migration in MIGRATIONS {
        let current = engine.version();
        if migration.to <= current {
            continue;
        }
        if migration.to != current + 1 {
            return Err(Error::Upgrade(format!(
                "migration table is not contiguous: at version {current}, next step is {}",
                migration.to
            )));
        }

        tracing::info!(from = current, to = migration.to, "running migration");
        (migration.run)(engine).map_err(|e| {
            Error::Upgrade(format!("migration {current} → {} failed: {e}", migration.to))
        })?;
        engine
            .set_version(migration.to)
            .map_err(|e| Error::Upgrade(format!("recording version {} failed: {e}", migration.to)))?;
        steps_run += 1;
    }

    tracing::info!(version = engine.version(), "migrations complete");
    Ok(steps_run)
}

// ============================================================================
// TESTS
// ============================================================================
