use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use crate::core::TrmnlError;

/// A batch of store entries keyed by name.
pub type StoreMap = Map<String, Value>;

/// Quota assumed for stores that do not report one (10 MiB).
pub const DEFAULT_QUOTA_BYTES: u64 = 10 * 1024 * 1024;

/// A persistent key-value store holding JSON values.
///
/// This is the seam between the engine and whatever durable storage the host
/// provides. Implementations must apply every entry of a single [`set`](Self::set)
/// call together, so a reader never observes part of a batch.
pub trait SettingsStore: Send + Sync {
    /// Fetches the given keys. Missing keys are absent from the returned map.
    fn get<'a>(&'a self, keys: &'a [&'a str]) -> BoxFuture<'a, Result<StoreMap, TrmnlError>>;

    /// Writes every entry of `items` as one update.
    fn set(&self, items: StoreMap) -> BoxFuture<'_, Result<(), TrmnlError>>;

    /// Approximate serialized size of everything stored.
    fn bytes_in_use(&self) -> BoxFuture<'_, Result<u64, TrmnlError>>;

    /// Maximum number of bytes the store is expected to hold.
    fn quota_bytes(&self) -> u64 {
        DEFAULT_QUOTA_BYTES
    }
}

/// Fires named callbacks periodically or at an absolute time.
///
/// Scheduling a name that already exists replaces the earlier alarm.
pub trait Scheduler: Send + Sync {
    /// Fire `name` every `period`, starting one period from now.
    fn schedule_periodic(&self, name: &str, period: Duration);

    /// Fire `name` once at `when_ms` (Unix milliseconds).
    fn schedule_at(&self, name: &str, when_ms: i64);

    /// Cancel `name`. Returns whether an alarm was registered.
    fn clear(&self, name: &str) -> bool;
}

/// Source of the current wall-clock time in Unix milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Reads the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to. Useful for driving the engine deterministically.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
