//! Key-value cache for provider metadata
//!
//! Discovery documents and JWKS are stored as serialized JSON strings under
//! keys derived from the provider URI. The cache is an optimization: the
//! resolver treats read failures as misses and logs write failures.

use crate::error::{OidcError, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Storage capability injected into the discovery resolver
///
/// Implementations must tolerate concurrent readers and writers. Concurrent
/// writes to one key may resolve in any order but must never leave a torn
/// value behind.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn put(&self, key: &str, value: String) -> Result<()>;
}

/// Process-local cache
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// Cache persisted as one JSON file per key
///
/// Survives restarts, so a CLI login does not need to re-fetch discovery and
/// JWKS on every run.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Use `dir` as the storage directory, creating it if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Default storage directory (cross-platform)
    ///
    /// Returns: ~/.cache/oidc_rp/ on Linux/macOS
    ///          %USERPROFILE%\.cache\oidc_rp\ on Windows
    pub fn default_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .map_err(|_| OidcError::Cache("Cannot determine home directory".to_string()))?;

        Ok(PathBuf::from(home).join(".cache").join("oidc_rp"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a cache key: the hex SHA-256 of the whole key
    ///
    /// Distinct keys, including ones differing only in scheme or in `/`
    /// versus `_`, always land in distinct files.
    fn file_name(key: &str) -> String {
        format!("{:x}.json", Sha256::digest(key.as_bytes()))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(Self::file_name(key))
    }
}

#[async_trait]
impl Cache for FileCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);

        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(OidcError::Cache(format!("Failed to read {:?}: {}", path, e))),
        }
    }

    async fn put(&self, key: &str, value: String) -> Result<()> {
        use rand::Rng;

        let path = self.path_for(key);
        // Readers only ever see a complete file: write aside, then rename over.
        let tmp = path.with_extension(format!("{:016x}.tmp", rand::thread_rng().gen::<u64>()));

        tokio::fs::write(&tmp, value)
            .await
            .map_err(|e| OidcError::Cache(format!("Failed to write {:?}: {}", tmp, e)))?;

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(OidcError::Cache(format!("Failed to replace {:?}: {}", path, e)));
        }

        tracing::debug!("Cache entry saved to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_file_name_is_stable_hex() {
        let name = FileCache::file_name("oidc:discovery:https://login.example.com/tenant/v2.0");
        assert_eq!(
            name,
            FileCache::file_name("oidc:discovery:https://login.example.com/tenant/v2.0")
        );
        assert_eq!(name.len(), 64 + ".json".len());
        assert!(name
            .trim_end_matches(".json")
            .chars()
            .all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_file_cache_keeps_similar_uris_apart() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path()).unwrap();

        cache
            .put("oidc:jwks:http://idp.example", "plain".to_string())
            .await
            .unwrap();
        cache
            .put("oidc:discovery:https://idp.example/t_a", "underscore".to_string())
            .await
            .unwrap();

        assert!(cache
            .get("oidc:jwks:https://idp.example")
            .await
            .unwrap()
            .is_none());
        assert!(cache
            .get("oidc:discovery:https://idp.example/t/a")
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            cache
                .get("oidc:jwks:http://idp.example")
                .await
                .unwrap()
                .as_deref(),
            Some("plain")
        );
    }

    #[tokio::test]
    async fn test_memory_cache_get_put() {
        let cache = MemoryCache::new();
        assert!(cache.get("missing").await.unwrap().is_none());

        cache.put("key", "first".to_string()).await.unwrap();
        cache.put("key", "second".to_string()).await.unwrap();

        assert_eq!(cache.get("key").await.unwrap().as_deref(), Some("second"));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_file_cache_roundtrip_and_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("nested")).unwrap();

        assert!(cache.get("oidc:jwks:https://idp.example").await.unwrap().is_none());

        cache
            .put("oidc:jwks:https://idp.example", r#"{"keys":[]}"#.to_string())
            .await
            .unwrap();

        assert_eq!(
            cache
                .get("oidc:jwks:https://idp.example")
                .await
                .unwrap()
                .as_deref(),
            Some(r#"{"keys":[]}"#)
        );
    }

    #[tokio::test]
    async fn test_file_cache_concurrent_writers_leave_whole_value() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(FileCache::new(dir.path()).unwrap());

        let values: Vec<String> = (0..16)
            .map(|i| format!(r#"{{"writer":{},"padding":"{}"}}"#, i, "x".repeat(4096)))
            .collect();

        let mut handles = Vec::new();
        for value in values.clone() {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.put("oidc:discovery:https://idp.example", value).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = cache
            .get("oidc:discovery:https://idp.example")
            .await
            .unwrap()
            .unwrap();
        assert!(values.contains(&stored));

        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|entry| {
                entry
                    .as_ref()
                    .map(|e| e.path().extension().map_or(false, |ext| ext == "tmp"))
                    .unwrap_or(false)
            })
            .count();
        assert_eq!(leftovers, 0);
    }
}
