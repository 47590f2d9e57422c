//! Blob storage for workspace artifacts.
//!
//! Keys are `/`-separated relative paths such as
//! `alice/pod-1/sections/section2.txt`. Every write overwrites; there is no
//! versioning and no locking.
//!
//! ```text
//! stages ──► BlobStore::{get, put, list, delete}
//!                    │
//!          ┌─────────┴─────────┐
//!     FsBlobStore        MemoryBlobStore
//!   files under root     BTreeMap (tests)
//! ```

pub mod fs;
pub mod memory;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::PipelineError;

/// Key-addressed byte storage.
///
/// This trait is object-safe and designed to be used as `Arc<dyn BlobStore>`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read a blob, or [`PipelineError::NotFound`] if it does not exist.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Write a blob, replacing any previous content.
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()>;

    /// Keys under `prefix`, sorted lexicographically.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Delete a blob. Returns `false` if it did not exist.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Whether a blob exists.
    async fn exists(&self, key: &str) -> Result<bool> {
        match self.get(key).await {
            Ok(_) => Ok(true),
            Err(PipelineError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Read a blob as UTF-8 text.
    async fn get_text(&self, key: &str) -> Result<String> {
        let bytes = self.get(key).await?;
        String::from_utf8(bytes).map_err(|e| PipelineError::storage(key, e))
    }

    /// Write UTF-8 text.
    async fn put_text(&self, key: &str, text: &str) -> Result<()> {
        self.put(key, text.as_bytes().to_vec()).await
    }
}

/// Reject keys that could escape the store root.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if bad {
        return Err(PipelineError::storage(key, "invalid blob key"));
    }
    Ok(())
}
