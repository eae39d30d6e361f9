//! Object storage for event media.
//!
//! Keys look like `{user_id}/{event_id}/{8 hex}_{file name}`; see
//! [`crate::domain::media::object_key`].

pub mod memory;
pub mod supabase;

use std::time::Duration;

use async_trait::async_trait;

pub use memory::MemoryStorage;
pub use supabase::SupabaseStorage;

/// Errors returned by an [`ObjectStorage`] backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The request never produced a response.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("storage rejected request with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// No object exists under the key.
    #[error("object not found: {0}")]
    NotFound(String),
}

/// A bucket of binary objects addressed by string keys.
#[async_trait]
pub trait ObjectStorage: Send + Sync + std::fmt::Debug {
    /// Stores `bytes` under `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the backend refuses the upload.
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str)
    -> Result<(), StorageError>;

    /// Permanent public URL for `key`. Does not check that it exists.
    fn public_url(&self, key: &str) -> String;

    /// Time-limited URL for `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the backend cannot sign the key.
    async fn signed_url(&self, key: &str, expires_in: Duration) -> Result<String, StorageError>;

    /// Removes the given keys. Missing keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the backend call fails.
    async fn remove(&self, keys: &[String]) -> Result<(), StorageError>;

    /// Lists full keys under `prefix`.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the backend call fails.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Copies the object at `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] when `from` does not exist, or
    /// another [`StorageError`] on backend failure.
    async fn copy(&self, from: &str, to: &str) -> Result<(), StorageError>;
}
