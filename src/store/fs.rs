//! Filesystem blob store.
//!
//! Each key maps to a file under the store root. Writes go to a temp file in
//! the destination directory and are renamed into place, so readers never
//! observe a half-written blob.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::{validate_key, BlobStore};
use crate::error::Result;
use crate::PipelineError;

/// A [`BlobStore`] rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create a store rooted at `root`. The directory is created lazily on
    /// the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, part| path.join(part)))
    }

    /// Key of a file found under the root.
    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(PipelineError::NotFound(key.to_string())),
            Err(e) => Err(PipelineError::storage(key, e)),
        }
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::storage(key, e))?;
        }

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PipelineError::storage(key, "key has no file name"))?;
        let tmp = path.with_file_name(format!(".{}.{:016x}.tmp", file_name, fastrand::u64(..)));

        fs::write(&tmp, &data)
            .await
            .map_err(|e| PipelineError::storage(key, e))?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(PipelineError::storage(key, e));
        }

        tracing::trace!(key, bytes = data.len(), "blob written");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        // Walk from the deepest directory named by the prefix, then filter.
        let dir_part = match prefix.rfind('/') {
            Some(idx) => &prefix[..idx],
            None => "",
        };
        let start = if dir_part.is_empty() {
            self.root.clone()
        } else {
            self.path_for(dir_part)?
        };

        let mut keys = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(PipelineError::storage(prefix, e)),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| PipelineError::storage(prefix, e))?
            {
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| PipelineError::storage(prefix, e))?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                let is_temp = entry.file_name().to_str().is_some_and(|n| n.starts_with('.') && n.ends_with(".tmp"));
                if is_temp {
                    continue;
                }
                if let Some(key) = self.key_for(&path) {
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PipelineError::storage(key, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        store.put("alice/pod/introduction.txt", b"hello".to_vec()).await.unwrap();
        store.put("alice/pod/introduction.txt", b"again".to_vec()).await.unwrap();

        assert_eq!(store.get("alice/pod/introduction.txt").await.unwrap(), b"again");
        assert!(dir.path().join("alice").join("pod").join("introduction.txt").is_file());
    }

    #[tokio::test]
    async fn test_missing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(matches!(store.get("a/b").await, Err(PipelineError::NotFound(_))));
        assert!(!store.delete("a/b").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_recurses_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        for key in [
            "u/p/sections/section1.txt",
            "u/p/sections/section10.txt",
            "u/p/mp3_sections/section1.mp3",
            "u/p/podcast_plan.txt",
            "u/other/podcast_plan.txt",
        ] {
            store.put(key, vec![0]).await.unwrap();
        }

        assert_eq!(
            store.list("u/p/sections/").await.unwrap(),
            vec!["u/p/sections/section1.txt", "u/p/sections/section10.txt"]
        );
        assert_eq!(store.list("u/p/").await.unwrap().len(), 4);
        assert_eq!(store.list("u/p/podcast").await.unwrap(), vec!["u/p/podcast_plan.txt"]);
        assert!(store.list("nobody/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(matches!(
            store.put("../outside", vec![]).await,
            Err(PipelineError::Storage { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_existing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        store.put("k/v", vec![1]).await.unwrap();
        assert!(store.delete("k/v").await.unwrap());
        assert!(!store.exists("k/v").await.unwrap());
    }
}
