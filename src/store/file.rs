use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::core::services::DEFAULT_QUOTA_BYTES;
use crate::core::{SettingsStore, StoreMap, TrmnlError};
use crate::store::{check_quota, measure};

/// A store persisted as one JSON object on disk.
///
/// Every [`set`](SettingsStore::set) rewrites the file through a sibling
/// temporary file and a rename, so the file on disk always holds a complete
/// batch.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    map: Mutex<StoreMap>,
    quota: u64,
}

impl JsonFileStore {
    /// Open `path`, starting empty if it does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, TrmnlError> {
        let path = path.into();
        let map = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => StoreMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), entries = map.len(), "opened settings file");
        Ok(Self {
            path,
            map: Mutex::new(map),
            quota: DEFAULT_QUOTA_BYTES,
        })
    }

    /// Override the reported quota.
    #[must_use]
    pub fn quota(mut self, bytes: u64) -> Self {
        self.quota = bytes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, map: &StoreMap) -> Result<(), TrmnlError> {
        let body = serde_json::to_vec_pretty(map)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

impl SettingsStore for JsonFileStore {
    fn get<'a>(&'a self, keys: &'a [&'a str]) -> BoxFuture<'a, Result<StoreMap, TrmnlError>> {
        Box::pin(async move {
            let guard = self.map.lock().await;
            Ok(keys
                .iter()
                .filter_map(|k| guard.get(*k).map(|v| ((*k).to_string(), v.clone())))
                .collect())
        })
    }

    fn set(&self, items: StoreMap) -> BoxFuture<'_, Result<(), TrmnlError>> {
        Box::pin(async move {
            let mut guard = self.map.lock().await;
            let mut next = guard.clone();
            next.extend(items);
            check_quota(&next, self.quota)?;
            // Commit in memory only once the file holds the new batch.
            self.persist(&next).await?;
            *guard = next;
            Ok(())
        })
    }

    fn bytes_in_use(&self) -> BoxFuture<'_, Result<u64, TrmnlError>> {
        Box::pin(async move {
            measure(&*self.map.lock().await)
        })
    }

    fn quota_bytes(&self) -> u64 {
        self.quota
    }
}
