//! Local persistence for the signed-in session.
//!
//! This module provides:
//! - A string key-value storage trait with file and in-memory backends
//! - The credential store that keeps the bearer token and user profile together

pub(crate) mod credentials;
mod file;
mod memory;

pub use credentials::{Credential, CredentialStore, UserProfile};
pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;

/// Storage keys used by the client.
pub struct StoreKeys;

impl StoreKeys {
    /// Bearer token
    pub const TOKEN: &'static str = "token";

    /// User profile (JSON)
    pub const USER_DATA: &'static str = "userData";
}

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Backend-specific failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistent string key-value storage.
///
/// Absence is not an error: `get` returns `Ok(None)` and removing a missing
/// key succeeds.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Retrieve a value
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Store several values. Backends that can should apply them in one write.
    async fn set_many(&self, entries: &[(&str, String)]) -> StoreResult<()>;

    /// Delete several values. Missing keys are ignored.
    async fn remove_many(&self, keys: &[&str]) -> StoreResult<()>;

    /// Store a single value
    async fn set(&self, key: &str, value: String) -> StoreResult<()> {
        self.set_many(&[(key, value)]).await
    }

    /// Delete a single value
    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.remove_many(&[key]).await
    }
}
