//! Read-through cache collaborator
//!
//! Keys are structured so invalidation can target one entry or a whole
//! namespace instead of relying on string prefixes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheNamespace {
    /// Full station listing
    Stations,
    /// Station listing filtered by module family
    StationFamily,
    /// One station by id
    Station,
}

impl CacheNamespace {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheNamespace::Stations => "stations",
            CacheNamespace::StationFamily => "station_family",
            CacheNamespace::Station => "station",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub namespace: CacheNamespace,
    pub subject: String,
}

impl CacheKey {
    /// Subjects are trimmed; their case is kept since station ids are
    /// case-sensitive
    pub fn new(namespace: CacheNamespace, subject: impl AsRef<str>) -> Self {
        Self {
            namespace,
            subject: subject.as_ref().trim().to_string(),
        }
    }

    pub fn stations() -> Self {
        Self::new(CacheNamespace::Stations, "all")
    }

    /// Family names are a closed lowercase vocabulary
    pub fn station_family(family: impl AsRef<str>) -> Self {
        Self::new(CacheNamespace::StationFamily, family.as_ref().to_lowercase())
    }

    pub fn station(station_id: impl AsRef<str>) -> Self {
        Self::new(CacheNamespace::Station, station_id)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace.as_str(), self.subject)
    }
}

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Option<String>;

    async fn set(&self, key: &CacheKey, value: String);

    async fn invalidate(&self, key: &CacheKey);

    async fn invalidate_namespace(&self, namespace: CacheNamespace);
}

/// Process-local cache
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, String>>,
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
    async fn get(&self, key: &CacheKey) -> Option<String> {
        self.entries.read().await.get(key).cloned()
    }

    async fn set(&self, key: &CacheKey, value: String) {
        self.entries.write().await.insert(key.clone(), value);
    }

    async fn invalidate(&self, key: &CacheKey) {
        self.entries.write().await.remove(key);
    }

    async fn invalidate_namespace(&self, namespace: CacheNamespace) {
        self.entries
            .write()
            .await
            .retain(|key, _| key.namespace != namespace);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;

    #[test]
    fn test_key_normalization() {
        let key = CacheKey::station_family(" Wind ");
        assert_eq!(key, CacheKey::station_family("wind"));
        assert_snapshot!(key.to_string(), @"station_family:wind");

        assert_eq!(CacheKey::station(" Abc "), CacheKey::station("Abc"));
        assert_ne!(CacheKey::station("Abc"), CacheKey::station("abc"));
    }

    #[tokio::test]
    async fn test_invalidation_scopes() {
        let cache = MemoryCache::new();
        cache.set(&CacheKey::stations(), "[]".into()).await;
        cache.set(&CacheKey::station_family("wind"), "[]".into()).await;
        cache.set(&CacheKey::station_family("rain"), "[]".into()).await;
        cache.set(&CacheKey::station("a"), "{}".into()).await;
        cache.set(&CacheKey::station("b"), "{}".into()).await;

        cache.invalidate(&CacheKey::station("a")).await;
        assert!(cache.get(&CacheKey::station("a")).await.is_none());
        assert_eq!(cache.get(&CacheKey::station("b")).await.as_deref(), Some("{}"));

        cache.invalidate_namespace(CacheNamespace::StationFamily).await;
        assert!(cache.get(&CacheKey::station_family("rain")).await.is_none());
        assert_eq!(cache.len().await, 2);
    }
}
