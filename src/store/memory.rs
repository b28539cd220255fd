use futures::future::BoxFuture;
use tokio::sync::RwLock;

use crate::core::services::DEFAULT_QUOTA_BYTES;
use crate::core::{SettingsStore, StoreMap, TrmnlError};
use crate::store::{check_quota, measure};

/// An in-process store. State is lost when the process exits.
///
/// Writes that would push usage past the quota are rejected whole.
#[derive(Debug)]
pub struct MemoryStore {
    map: RwLock<StoreMap>,
    quota: u64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(StoreMap::new()),
            quota: DEFAULT_QUOTA_BYTES,
        }
    }

    /// Start from existing entries.
    pub fn with_entries(entries: StoreMap) -> Self {
        Self {
            map: RwLock::new(entries),
            quota: DEFAULT_QUOTA_BYTES,
        }
    }

    /// Override the reported quota.
    #[must_use]
    pub fn quota(mut self, bytes: u64) -> Self {
        self.quota = bytes;
        self
    }

    /// A copy of everything stored.
    pub async fn snapshot(&self) -> StoreMap {
        self.map.read().await.clone()
    }
}

impl SettingsStore for MemoryStore {
    fn get<'a>(&'a self, keys: &'a [&'a str]) -> BoxFuture<'a, Result<StoreMap, TrmnlError>> {
        Box::pin(async move {
            let guard = self.map.read().await;
            Ok(keys
                .iter()
                .filter_map(|k| guard.get(*k).map(|v| ((*k).to_string(), v.clone())))
                .collect())
        })
    }

    fn set(&self, items: StoreMap) -> BoxFuture<'_, Result<(), TrmnlError>> {
        Box::pin(async move {
            let mut guard = self.map.write().await;
            let mut next = guard.clone();
            next.extend(items);
            check_quota(&next, self.quota)?;
            *guard = next;
            Ok(())
        })
    }

    fn bytes_in_use(&self) -> BoxFuture<'_, Result<u64, TrmnlError>> {
        Box::pin(async move {
            measure(&*self.map.read().await)
        })
    }

    fn quota_bytes(&self) -> u64 {
        self.quota
    }
}
