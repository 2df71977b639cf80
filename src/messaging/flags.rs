//! # Flag Store
//!
//! Durable name/flag storage owned by the main context. The worker never
//! touches it directly; it reads and writes these values only through
//! correlated calls, and the main context is the sole writer.
//!
//! Keys are the application's storage tag suffixed with a fixed namespace
//! string, so several stores can share one flag store.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Namespace suffix for the persisted database name.
pub const DATABASE_NAME_SUFFIX: &str = "/dbName";

/// Namespace suffix for the persisted encryption status.
pub const ENCRYPTION_STATUS_SUFFIX: &str = "/encryptionStatus";

/// Key-value storage for the main context's durable flags.
pub trait FlagStore: Send + Sync {
    /// Read a flag, `None` when never written.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a flag.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Flag store that lives and dies with the process. Useful in tests and for
/// callers that manage durability themselves.
#[derive(Default)]
pub struct MemoryFlagStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryFlagStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlagStore for MemoryFlagStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ============================================================================
// FILE-BACKED STORE
// ============================================================================

/// Flag store persisted as a single JSON object on disk, written through on
/// every set.
#[derive(Debug)]
pub struct JsonFileFlagStore {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl JsonFileFlagStore {
    /// Open (or create) the flag file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match std::fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw)
                .map_err(|e| Error::Storage(format!("flag file is corrupt: {e}")))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(Error::Storage(format!("failed to read flag file: {e}"))),
        };
        Ok(Self { path, values: Mutex::new(values) })
    }
}

impl FlagStore for JsonFileFlagStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock();
        values.insert(key.to_string(), value.to_string());
        let raw = serde_json::to_vec_pretty(&*values)?;
        std::fs::write(&self.path, raw)
            .map_err(|e| Error::Storage(format!("failed to write flag file: {e}")))
    }
}

// ============================================================================
// TESTS
// ============================================================================
