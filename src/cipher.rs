//! # Record Cipher
//!
//! The seam for at-rest encryption of message bodies. The store never
//! implements encryption itself: a cipher is injected at construction and
//! applied to message bodies on the way into and out of the object store.
//! Everything else in a record (identifiers, timestamps, flags) stays
//! plaintext so the engine's indexes keep working.

use crate::error::Result;

/// Symmetric cipher applied to stored message bodies.
///
/// Implementations must be deterministic only in the sense that
/// `decrypt(encrypt(x)) == x`; nothing in the store inspects ciphertext.
pub trait RecordCipher: Send + Sync {
    /// Encrypt a message body before it is written to the store.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt a message body read back from the store.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// Pass-through cipher used when encryption is disabled for a database.
pub struct PlaintextCipher;

impl RecordCipher for PlaintextCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        Ok(ciphertext.to_vec())
    }
}
