//! In-memory blob store for tests and local runs.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{validate_key, BlobStore};
use crate::error::Result;
use crate::PipelineError;

/// A [`BlobStore`] backed by a sorted map.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored key, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.blobs
            .read()
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn poisoned(key: &str) -> PipelineError {
        PipelineError::storage(key, "store lock poisoned")
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let blobs = self.blobs.read().map_err(|_| Self::poisoned(key))?;
        blobs
            .get(key)
            .cloned()
            .ok_or_else(|| PipelineError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        validate_key(key)?;
        let mut blobs = self.blobs.write().map_err(|_| Self::poisoned(key))?;
        blobs.insert(key.to_string(), data);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let blobs = self.blobs.read().map_err(|_| Self::poisoned(prefix))?;
        Ok(blobs
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut blobs = self.blobs.write().map_err(|_| Self::poisoned(key))?;
        Ok(blobs.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_overwrite() {
        let store = MemoryBlobStore::new();
        store.put("a/x", b"one".to_vec()).await.unwrap();
        store.put("a/x", b"two".to_vec()).await.unwrap();
        assert_eq!(store.get("a/x").await.unwrap(), b"two");
        assert_eq!(store.keys(), vec!["a/x"]);
    }

    #[tokio::test]
    async fn test_missing_is_not_found() {
        let store = MemoryBlobStore::new();
        assert!(matches!(store.get("nope").await, Err(PipelineError::NotFound(k)) if k == "nope"));
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let store = MemoryBlobStore::new();
        for key in ["w/sections/section2.txt", "w/sections/section1.txt", "w/plan.txt", "x/sections/a"] {
            store.put(key, vec![]).await.unwrap();
        }
        assert_eq!(
            store.list("w/sections/").await.unwrap(),
            vec!["w/sections/section1.txt", "w/sections/section2.txt"]
        );
        assert!(store.list("none/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryBlobStore::new();
        store.put("k", vec![1]).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }
}
