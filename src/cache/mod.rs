//! Content-addressed stage caches.
//!
//! Every pipeline stage is cacheable, keyed by a SHA-256 hash of its
//! upstream input, so a later stage's re-run never repeats earlier
//! stages. Writes are idempotent (same key, same value — rewriting is
//! a no-op semantically) and atomic per entry; readers concurrent with
//! a write see the old value or the new one, never a torn entry.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

/// Content-addressed key/value store for one pipeline stage family.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn put(&self, key: &str, value: &[u8]) -> io::Result<()>;
}

/// Compute a cache key from a stage name and its input parts.
pub fn cache_key(stage: &str, parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(stage.as_bytes());
    for part in parts {
        // Length-prefix each part so concatenations can't collide.
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

/// In-memory cache for tests and one-shot runs.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Arc<Vec<u8>>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.read().await.get(key).map(|v| v.as_ref().clone())
    }

    async fn put(&self, key: &str, value: &[u8]) -> io::Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), Arc::new(value.to_vec()));
        Ok(())
    }
}

/// Filesystem cache.
///
/// Entries live in a two-level directory layout keyed by hash prefix
/// (`{root}/{key[0..2]}/{key}.json`) to keep directories small. Writes
/// go through a temp file and an atomic rename, which is what makes
/// one entry the unit of atomicity.
pub struct FsCache {
    root: PathBuf,
}

impl FsCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let prefix = if key.len() >= 2 { &key[..2] } else { "xx" };
        self.root.join(prefix).join(format!("{}.json", key))
    }
}

#[async_trait]
impl CacheStore for FsCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.entry_path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Some(bytes),
            Err(_) => None,
        }
    }

    async fn put(&self, key: &str, value: &[u8]) -> io::Result<()> {
        let path = self.entry_path(key);
        let parent = path
            .parent()
            .ok_or_else(|| io::Error::other("cache entry has no parent directory"))?
            .to_path_buf();

        let value = value.to_vec();
        tokio::task::spawn_blocking(move || -> io::Result<()> {
            std::fs::create_dir_all(&parent)?;
            let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
            io::Write::write_all(&mut tmp, &value)?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| io::Error::other(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_length_prefixing() {
        // ("ab", "c") and ("a", "bc") must not collide.
        let a = cache_key("stage", &[b"ab", b"c"]);
        let b = cache_key("stage", &[b"a", b"bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_cache_key_stage_separation() {
        let a = cache_key("parse", &[b"input"]);
        let b = cache_key("chunk", &[b"input"]);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_memory_cache_roundtrip() {
        let cache = MemoryCache::new();
        let key = cache_key("test", &[b"x"]);
        assert!(cache.get(&key).await.is_none());
        cache.put(&key, b"value").await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), b"value");
    }

    #[tokio::test]
    async fn test_memory_cache_rewrite_same_key() {
        let cache = MemoryCache::new();
        cache.put("k", b"v").await.unwrap();
        cache.put("k", b"v").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), b"v");
    }

    #[tokio::test]
    async fn test_fs_cache_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path());
        let key = cache_key("test", &[b"payload"]);

        assert!(cache.get(&key).await.is_none());
        cache.put(&key, b"stored bytes").await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), b"stored bytes");

        // Two-level layout: {root}/{prefix}/{key}.json
        let expected = dir.path().join(&key[..2]).join(format!("{}.json", key));
        assert!(expected.exists());
    }

    #[tokio::test]
    async fn test_fs_cache_last_writer_wins() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path());
        cache.put("samekey", b"one").await.unwrap();
        cache.put("samekey", b"two").await.unwrap();
        assert_eq!(cache.get("samekey").await.unwrap(), b"two");
    }
}
