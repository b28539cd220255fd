//! Settings persistence.
//!
//! The settings record is stored one field per key so that partial updates
//! (a retry counter bump, a new cadence) never rewrite the cached image. The
//! image itself is a single structured value under [`keys::CURRENT_IMAGE`].

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use serde_json::{Value, json};

use crate::core::client::{DEFAULT_REFRESH_RATE, MAX_REFRESH_RATE};
use crate::core::{CachedImage, Environment, Settings, SettingsStore, StoreMap, TrmnlError};

/// Store keys for each settings field.
pub mod keys {
    pub const API_KEY: &str = "apiKey";
    pub const REFRESH_RATE: &str = "refreshRate";
    pub const LAST_FETCH: &str = "lastFetch";
    pub const NEXT_FETCH: &str = "nextFetch";
    pub const RETRY_COUNT: &str = "retryCount";
    pub const RETRY_AFTER: &str = "retryAfter";
    pub const ENVIRONMENT: &str = "environment";
    pub const DEVICE_ID: &str = "deviceId";
    pub const CURRENT_IMAGE: &str = "currentImage";

    /// Every key making up the settings record.
    pub const ALL: &[&str] = &[
        API_KEY,
        REFRESH_RATE,
        LAST_FETCH,
        NEXT_FETCH,
        RETRY_COUNT,
        RETRY_AFTER,
        ENVIRONMENT,
        DEVICE_ID,
        CURRENT_IMAGE,
    ];
}

/// Read the full settings record, filling defaults for anything missing or malformed.
pub async fn load_settings(store: &dyn SettingsStore) -> Result<Settings, TrmnlError> {
    let map = store.get(keys::ALL).await?;
    Ok(settings_from_map(&map))
}

/// Write a batch of field updates in one store call.
pub async fn apply(store: &dyn SettingsStore, patch: SettingsPatch) -> Result<(), TrmnlError> {
    if patch.is_empty() {
        return Ok(());
    }
    store.set(patch.into_map()).await
}

pub(crate) fn settings_from_map(map: &StoreMap) -> Settings {
    let defaults = Settings::default();
    Settings {
        api_key: map
            .get(keys::API_KEY)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        refresh_rate: map
            .get(keys::REFRESH_RATE)
            .and_then(as_i64)
            .filter(|r| *r > 0)
            .map_or(DEFAULT_REFRESH_RATE, |r| (r as u64).min(MAX_REFRESH_RATE)),
        last_fetch: map.get(keys::LAST_FETCH).and_then(as_i64).unwrap_or(0),
        next_fetch: map.get(keys::NEXT_FETCH).and_then(as_i64).unwrap_or(0),
        retry_count: map
            .get(keys::RETRY_COUNT)
            .and_then(as_i64)
            .map_or(0, |c| u32::try_from(c).unwrap_or(0)),
        // 0 was never a meaningful deadline; treat it like null.
        retry_after: map
            .get(keys::RETRY_AFTER)
            .and_then(as_i64)
            .filter(|t| *t != 0),
        environment: map
            .get(keys::ENVIRONMENT)
            .and_then(Value::as_str)
            .and_then(Environment::parse)
            .unwrap_or(defaults.environment),
        device_id: map.get(keys::DEVICE_ID).and_then(as_i64),
        current_image: map.get(keys::CURRENT_IMAGE).and_then(|v| {
            if v.is_null() {
                return None;
            }
            match serde_json::from_value::<CachedImage>(v.clone()) {
                Ok(img) => Some(img),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring malformed cached image");
                    None
                }
            }
        }),
    }
}

/// Serialized size of `map`, counted as key length plus JSON value length.
pub(crate) fn measure(map: &StoreMap) -> Result<u64, TrmnlError> {
    let mut total = 0u64;
    for (k, v) in map {
        total += (k.len() + serde_json::to_string(v)?.len()) as u64;
    }
    Ok(total)
}

pub(crate) fn check_quota(map: &StoreMap, quota: u64) -> Result<(), TrmnlError> {
    let used = measure(map)?;
    if used > quota {
        return Err(TrmnlError::Store(format!(
            "quota exceeded: {used} of {quota} bytes"
        )));
    }
    Ok(())
}

// Timestamps written by other hosts may come back as floats.
fn as_i64(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
}

/// A set of field updates applied together by [`apply`].
#[derive(Debug, Clone, Default)]
pub struct SettingsPatch {
    items: StoreMap,
}

impl SettingsPatch {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.items
            .insert(keys::API_KEY.into(), Value::String(key.into()));
        self
    }

    #[must_use]
    pub fn refresh_rate(mut self, secs: u64) -> Self {
        self.items.insert(keys::REFRESH_RATE.into(), json!(secs));
        self
    }

    #[must_use]
    pub fn last_fetch(mut self, at: i64) -> Self {
        self.items.insert(keys::LAST_FETCH.into(), json!(at));
        self
    }

    #[must_use]
    pub fn next_fetch(mut self, at: i64) -> Self {
        self.items.insert(keys::NEXT_FETCH.into(), json!(at));
        self
    }

    #[must_use]
    pub fn retry_count(mut self, count: u32) -> Self {
        self.items.insert(keys::RETRY_COUNT.into(), json!(count));
        self
    }

    #[must_use]
    pub fn retry_after(mut self, at: Option<i64>) -> Self {
        self.items.insert(keys::RETRY_AFTER.into(), json!(at));
        self
    }

    /// Clear backoff memory: `retryCount = 0`, `retryAfter = null`.
    #[must_use]
    pub fn reset_retry(self) -> Self {
        self.retry_count(0).retry_after(None)
    }

    #[must_use]
    pub fn environment(mut self, env: Environment) -> Self {
        self.items
            .insert(keys::ENVIRONMENT.into(), Value::String(env.as_str().into()));
        self
    }

    #[must_use]
    pub fn device_id(mut self, id: Option<i64>) -> Self {
        self.items.insert(keys::DEVICE_ID.into(), json!(id));
        self
    }

    /// Store `img` as one structured value.
    ///
    /// # Errors
    ///
    /// Returns [`TrmnlError::Json`] if the image cannot be serialized.
    pub fn current_image(mut self, img: &CachedImage) -> Result<Self, TrmnlError> {
        self.items
            .insert(keys::CURRENT_IMAGE.into(), serde_json::to_value(img)?);
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_map(self) -> StoreMap {
        self.items
    }
}
