//! Bearer token and user profile, kept as one unit.
//!
//! The token and the profile are separate entries on disk, but callers only
//! ever see both or neither. A half-written pair reads as absent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{KeyValueStore, StoreKeys, StoreResult};

/// Raw token and profile entries as stored.
type RawPair = (Option<String>, Option<String>);

/// Snapshot of the signed-in user, as returned by login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub role: String,
    pub group_id: u64,
    pub group_name: String,
}

/// A stored session.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub user: UserProfile,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

/// Owner of the persisted session.
///
/// Save, load and clear are serialized with one lock so a reader never sees
/// the pair mid-update from this process.
pub struct CredentialStore {
    backend: Arc<dyn KeyValueStore>,
    lock: Mutex<()>,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            lock: Mutex::new(()),
        }
    }

    /// Persist the token and profile together.
    ///
    /// If the write fails and left the stored entries changed, the previous
    /// pair is put back, or both entries are removed when there was none.
    /// The write error is returned either way.
    pub async fn save(&self, credential: &Credential) -> StoreResult<()> {
        let _guard = self.lock.lock().await;
        let user_data = serde_json::to_string(&credential.user)?;
        let previous = self.read_pair().await.ok();

        let result = self
            .backend
            .set_many(&[
                (StoreKeys::TOKEN, credential.token.clone()),
                (StoreKeys::USER_DATA, user_data),
            ])
            .await;

        if let Err(e) = result {
            warn!(error = %e, "Failed to save credentials");
            self.roll_back(previous).await;
            return Err(e);
        }

        debug!(user_id = credential.user.id, "Credentials saved");
        Ok(())
    }

    /// Load the stored session, or `None` if either half is missing or unusable.
    pub async fn load(&self) -> StoreResult<Option<Credential>> {
        let _guard = self.lock.lock().await;

        let token = self.backend.get(StoreKeys::TOKEN).await?;
        let user_data = self.backend.get(StoreKeys::USER_DATA).await?;

        let (Some(token), Some(user_data)) = (token, user_data) else {
            return Ok(None);
        };
        if token.is_empty() {
            return Ok(None);
        }

        match serde_json::from_str::<UserProfile>(&user_data) {
            Ok(user) => Ok(Some(Credential { token, user })),
            Err(e) => {
                warn!(error = %e, "Stored user profile is unreadable, treating session as absent");
                Ok(None)
            }
        }
    }

    /// Remove both entries. Clearing an empty store succeeds.
    pub async fn clear(&self) -> StoreResult<()> {
        let _guard = self.lock.lock().await;
        self.remove_pair().await?;
        debug!("Credentials cleared");
        Ok(())
    }

    async fn read_pair(&self) -> StoreResult<RawPair> {
        let token = self.backend.get(StoreKeys::TOKEN).await?;
        let user_data = self.backend.get(StoreKeys::USER_DATA).await?;
        Ok((token, user_data))
    }

    async fn roll_back(&self, previous: Option<RawPair>) {
        if let (Some(previous), Ok(current)) = (&previous, self.read_pair().await) {
            if *previous == current {
                debug!("Failed credential write left storage unchanged");
                return;
            }
        }

        let outcome = match previous {
            Some((Some(token), Some(user_data))) => {
                match self
                    .backend
                    .set_many(&[(StoreKeys::TOKEN, token), (StoreKeys::USER_DATA, user_data)])
                    .await
                {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        warn!(error = %e, "Failed to restore previous credentials");
                        self.remove_pair().await
                    }
                }
            }
            _ => self.remove_pair().await,
        };
        if let Err(e) = outcome {
            warn!(error = %e, "Credential rollback failed");
        }
    }

    async fn remove_pair(&self) -> StoreResult<()> {
        self.backend
            .remove_many(&[StoreKeys::TOKEN, StoreKeys::USER_DATA])
            .await
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::store::{FileStore, MemoryStore};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let store = CredentialStore::new(Arc::new(MemoryStore::new()));
        let credential = sample_credential();

        store.save(&credential).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(credential));
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let store = CredentialStore::new(Arc::new(MemoryStore::new()));
        store.save(&sample_credential()).await.unwrap();

        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_token_without_profile_is_absent() {
        let backend = Arc::new(MemoryStore::new());
        backend
            .set(StoreKeys::TOKEN, "token-abc".to_string())
            .await
            .unwrap();

        let store = CredentialStore::new(backend);
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_profile_without_token_is_absent() {
        let backend = Arc::new(MemoryStore::new());
        let user_data = serde_json::to_string(&sample_profile()).unwrap();
        backend.set(StoreKeys::USER_DATA, user_data).await.unwrap();

        let store = CredentialStore::new(backend);
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_token_is_absent() {
        let store = CredentialStore::new(Arc::new(MemoryStore::new()));
        let mut credential = sample_credential();
        credential.token = String::new();

        store.save(&credential).await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unreadable_profile_is_absent() {
        let backend = Arc::new(MemoryStore::new());
        backend
            .set_many(&[
                (StoreKeys::TOKEN, "token-abc".to_string()),
                (StoreKeys::USER_DATA, "{not json".to_string()),
            ])
            .await
            .unwrap();

        let store = CredentialStore::new(backend);
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_save_rolls_back_partial_write() {
        let backend = Arc::new(FlakyStore::default());
        backend.fail_writes(true);

        let store = CredentialStore::new(backend.clone());
        assert!(store.save(&sample_credential()).await.is_err());
        assert!(backend.inner.is_empty());
    }

    #[tokio::test]
    async fn test_failed_clean_save_keeps_previous_session() {
        let backend = Arc::new(FlakyStore::default());
        let store = CredentialStore::new(backend.clone());
        store.save(&sample_credential()).await.unwrap();

        backend.fail_writes_cleanly(true);
        let mut replacement = sample_credential();
        replacement.token = "token-new".to_string();
        assert!(store.save(&replacement).await.is_err());

        assert_eq!(store.load().await.unwrap(), Some(sample_credential()));
    }

    #[tokio::test]
    async fn test_failed_partial_save_clears_when_restore_fails() {
        let backend = Arc::new(FlakyStore::default());
        let store = CredentialStore::new(backend.clone());
        store.save(&sample_credential()).await.unwrap();

        // A partial write that cannot be undone by rewriting falls back to
        // removing both entries.
        backend.fail_writes(true);
        let mut replacement = sample_credential();
        replacement.token = "token-new".to_string();
        assert!(store.save(&replacement).await.is_err());

        assert_eq!(store.load().await.unwrap(), None);
        assert!(backend.inner.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_document_is_overwritten_by_clear() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("credentials.json");
        std::fs::write(&path, r#"{"token": "abc", trunc"#).unwrap();
        let store = CredentialStore::new(Arc::new(FileStore::new(&path)));

        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);

        store.save(&sample_credential()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(sample_credential()));
    }

    #[tokio::test]
    async fn test_persists_under_fixed_keys() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("credentials.json");
        let store = CredentialStore::new(Arc::new(FileStore::new(&path)));
        store.save(&sample_credential()).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["token"], "token-abc");
        let user: UserProfile = serde_json::from_str(raw["userData"].as_str().unwrap()).unwrap();
        assert_eq!(user, sample_profile());
    }

    #[test]
    fn test_debug_redacts_token() {
        let rendered = format!("{:?}", sample_credential());
        assert!(!rendered.contains("token-abc"));
        assert!(rendered.contains("<redacted>"));
    }
}
