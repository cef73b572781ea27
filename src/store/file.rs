//! JSON-document storage on disk.
//!
//! All keys live in one JSON object. Every mutation rewrites the whole
//! document through a temp file and a rename, so a multi-key write lands
//! entirely or not at all. A document that no longer decodes fails reads but
//! is replaced by the next write.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{KeyValueStore, StoreError, StoreResult};

type Document = BTreeMap<String, String>;

pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> StoreResult<Document> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Document::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Document::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Current document as the base for a write. An undecodable file is
    /// started over from empty.
    async fn document_for_write(&self) -> StoreResult<Document> {
        match self.read_document().await {
            Err(StoreError::Encoding(e)) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Storage document is corrupt, replacing it"
                );
                Ok(Document::new())
            }
            other => other,
        }
    }

    async fn write_document(&self, document: Document) -> StoreResult<()> {
        let path = self.path.clone();
        let keys = document.len();
        let contents = serde_json::to_vec_pretty(&document)?;

        tokio::task::spawn_blocking(move || -> StoreResult<()> {
            let dir = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            };
            std::fs::create_dir_all(&dir)?;

            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&contents)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Backend(format!("Storage task failed: {}", e)))??;

        debug!(path = %self.path.display(), keys, "Storage document written");
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let document = self.read_document().await?;
        Ok(document.get(key).cloned())
    }

    async fn set_many(&self, entries: &[(&str, String)]) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.document_for_write().await?;
        for (key, value) in entries {
            document.insert((*key).to_string(), value.clone());
        }
        self.write_document(document).await
    }

    async fn remove_many(&self, keys: &[&str]) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.document_for_write().await?;
        let before = document.len();
        for key in keys {
            document.remove(*key);
        }
        if document.len() == before && !self.path.exists() {
            return Ok(());
        }
        self.write_document(document).await
    }
}
