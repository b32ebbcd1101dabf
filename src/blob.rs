//! Blob storage for uploaded source files.
//!
//! Materials keep their original upload around for re-processing and
//! download. [`LocalBlobStore`] writes under a configured root with
//! collision-free generated names.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Where uploaded files live. The store returns an opaque key that the
/// material row records as its `file_path`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist `bytes`, returning the storage key.
    async fn put(&self, original_name: &str, bytes: &[u8]) -> Result<String>;

    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Filesystem-backed blob store rooted at one directory.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Keys are generated server-side; a key that escapes the root is a
    /// corrupted or forged reference.
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        if key.contains("..") || Path::new(key).is_absolute() {
            return Err(Error::Conflict(format!("invalid blob key {key:?}")));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, original_name: &str, bytes: &[u8]) -> Result<String> {
        let extension = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");
        let key = format!("{}.{extension}", Uuid::new_v4());
        let path = self.resolve(&key)?;
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(&path, bytes).await?;
        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        Ok(tokio::fs::read(&path).await?)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        tokio::fs::remove_file(&path).await?;
        Ok(())
    }
}
