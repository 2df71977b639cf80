//! # Object-Store Engine
//!
//! The seam for the persistent key-value/object-store engine. The core only
//! ever issues the operations on [`StoreEngine`] and receives
//! success/failure; durability, transactions, and the physical format belong
//! to the engine behind the trait.
//!
//! [`MemoryEngine`] is the reference implementation: it models the engine
//! semantics the rest of the crate is written against (auto-increment
//! primary keys, key-path extraction, unique and non-unique indexes,
//! forward-only versioning) and makes the whole system exercisable without
//! a real database.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// SCHEMA TYPES
// ============================================================================

/// A named index over one field of a store's records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    /// Index name, unique within its store.
    pub name: String,
    /// Field path the index reads from each record.
    pub key_path: String,
    /// Whether two records may share an indexed value.
    pub unique: bool,
    /// Whether an array-valued field indexes each element separately.
    pub multi_entry: bool,
}

/// A named record collection with a declared primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSchema {
    /// Store name, unique within the database.
    pub name: String,
    /// Field path holding each record's primary key.
    pub key_path: String,
    /// Whether the engine assigns ascending numeric keys.
    pub auto_increment: bool,
    /// Indexes created together with the store.
    pub indexes: Vec<IndexSchema>,
}

/// Primary key of a stored record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Key {
    /// Engine-assigned ascending numeric key.
    Auto(u64),
    /// Caller-supplied string key taken from the record's key path.
    Text(String),
}

// ============================================================================
// ENGINE TRAIT
// ============================================================================

/// The external persistent object-store engine.
///
/// Implementations guarantee that a failed migration step leaves the store
/// at its last successfully committed version; the core never attempts
/// partial-upgrade recovery itself.
pub trait StoreEngine: Send {
    /// Name of the database this engine is bound to.
    fn database_name(&self) -> &str;

    /// The currently recorded schema version (0 before first migration).
    fn version(&self) -> u32;

    /// Record a new schema version; versions only ever move forward.
    fn set_version(&mut self, version: u32) -> Result<()>;

    /// Create a store and its declared indexes. Fails if the store exists.
    fn create_store(&mut self, schema: StoreSchema) -> Result<()>;

    /// Add an index to an existing store (the additive path for future
    /// schema versions). Fails if the index name is taken.
    fn create_index(&mut self, store: &str, index: IndexSchema) -> Result<()>;

    /// Insert a record, or replace the record with the same primary key.
    /// Returns the (possibly engine-assigned) key.
    fn put(&mut self, store: &str, value: Value) -> Result<Key>;

    /// Fetch one record by primary key.
    fn get(&self, store: &str, key: &Key) -> Result<Option<Value>>;

    /// Fetch every record whose indexed field equals `key`.
    fn get_by_index(&self, store: &str, index: &str, key: &Value) -> Result<Vec<Value>>;

    /// Fetch every record in the store, in primary-key order.
    fn get_all(&self, store: &str) -> Result<Vec<Value>>;
}

// ============================================================================
// IN-MEMORY REFERENCE ENGINE
// ============================================================================

struct StoreData {
    schema: StoreSchema,
    next_key: u64,
    rows: BTreeMap<Key, Value>,
}

/// In-memory [`StoreEngine`] used as the reference model and in tests.
pub struct MemoryEngine {
    name: String,
    version: u32,
    stores: HashMap<String, StoreData>,
}

impl MemoryEngine {
    /// Create an empty engine at schema version 0.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 0,
            stores: HashMap::new(),
        }
    }

    /// The declared schema of a store, if it exists.
    pub fn store_schema(&self, store: &str) -> Option<&StoreSchema> {
        self.stores.get(store).map(|s| &s.schema)
    }

    /// Names of every store, sorted.
    pub fn store_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.keys().cloned().collect();
        names.sort();
        names
    }

    fn store(&self, store: &str) -> Result<&StoreData> {
        self.stores
            .get(store)
            .ok_or_else(|| Error::Storage(format!("unknown store '{store}'")))
    }

    fn store_mut(&mut self, store: &str) -> Result<&mut StoreData> {
        self.stores
            .get_mut(store)
            .ok_or_else(|| Error::Storage(format!("unknown store '{store}'")))
    }

    fn index_matches(index: &IndexSchema, row: &Value, key: &Value) -> bool {
        match row.get(&index.key_path) {
            None | Some(Value::Null) => false,
            Some(Value::Array(elements)) if index.multi_entry => elements.contains(key),
            Some(field) => field == key,
        }
    }
}

impl StoreEngine for MemoryEngine {
    fn database_name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) -> Result<()> {
        if version < self.version {
            return Err(Error::Storage(format!(
                "schema version may only move forward (recorded {}, requested {})",
                self.version, version
            )));
        }
        self.version = version;
        Ok(())
    }

    fn create_store(&mut self, schema: StoreSchema) -> Result<()> {
        if self.stores.contains_key(&schema.name) {
            return Err(Error::Storage(format!("store '{}' already exists", schema.name)));
        }
        self.stores.insert(
            schema.name.clone(),
            StoreData { schema, next_key: 1, rows: BTreeMap::new() },
        );
        Ok(())
    }

    fn create_index(&mut self, store: &str, index: IndexSchema) -> Result<()> {
        let data = self.store_mut(store)?;
        if data.schema.indexes.iter().any(|i| i.name == index.name) {
            return Err(Error::Storage(format!(
                "index '{}' already exists on store '{store}'",
                index.name
            )));
        }
        data.schema.indexes.push(index);
        Ok(())
    }

    fn put(&mut self, store: &str, mut value: Value) -> Result<Key> {
        let data = self.store_mut(store)?;
        if !value.is_object() {
            return Err(Error::Storage(format!(
                "store '{store}' only accepts JSON object records"
            )));
        }

        let key = match value.get(&data.schema.key_path).cloned() {
            Some(existing) if data.schema.auto_increment => Key::Auto(
                existing.as_u64().ok_or_else(|| {
                    Error::Storage(format!(
                        "auto-increment store '{store}' requires a numeric '{}' key",
                        data.schema.key_path
                    ))
                })?,
            ),
            Some(existing) => Key::Text(
                existing
                    .as_str()
                    .ok_or_else(|| {
                        Error::Storage(format!(
                            "store '{store}' requires a string '{}' key",
                            data.schema.key_path
                        ))
                    })?
                    .to_string(),
            ),
            None if data.schema.auto_increment => {
                let assigned = data.next_key;
                data.next_key += 1;
                value[&data.schema.key_path] = Value::from(assigned);
                Key::Auto(assigned)
            }
            None => {
                return Err(Error::Storage(format!(
                    "record for store '{store}' is missing its '{}' key",
                    data.schema.key_path
                )));
            }
        };

        // Enforce unique indexes against every other record.
        for index in data.schema.indexes.iter().filter(|i| i.unique) {
            if let Some(indexed) = value.get(&index.key_path) {
                if indexed.is_null() {
                    continue;
                }
                let conflict = data
                    .rows
                    .iter()
                    .any(|(k, row)| *k != key && Self::index_matches(index, row, indexed));
                if conflict {
                    return Err(Error::Storage(format!(
                        "unique index '{}' violated on store '{store}'",
                        index.name
                    )));
                }
            }
        }

        if let Key::Auto(n) = key {
            data.next_key = data.next_key.max(n + 1);
        }
        data.rows.insert(key.clone(), value);
        Ok(key)
    }

    fn get(&self, store: &str, key: &Key) -> Result<Option<Value>> {
        Ok(self.store(store)?.rows.get(key).cloned())
    }

    fn get_by_index(&self, store: &str, index: &str, key: &Value) -> Result<Vec<Value>> {
        let data = self.store(store)?;
        let index = data
            .schema
            .indexes
            .iter()
            .find(|i| i.name == index)
            .ok_or_else(|| Error::Storage(format!("unknown index '{index}' on store '{store}'")))?;
        Ok(data
            .rows
            .values()
            .filter(|row| Self::index_matches(index, row, key))
            .cloned()
            .collect())
    }

    fn get_all(&self, store: &str) -> Result<Vec<Value>> {
        Ok(self.store(store)?.rows.values().cloned().collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================
