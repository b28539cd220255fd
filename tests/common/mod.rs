#![allow(dead_code)]

use httpmock::{Method::GET, Mock, MockServer};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use trmnl_tab::{
    FetchEngine, ManualClock, MemoryStore, Scheduler, Settings, SettingsStore, TrmnlClient,
    store,
};
use url::Url;

/// 2023-11-14T22:13:20Z
pub const NOW: i64 = 1_700_000_000_000;

pub const KEY: &str = "device-key-1";

/// A tiny PNG signature plus padding; content is never decoded.
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 1, 2, 3, 4];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scheduled {
    Periodic(String, Duration),
    At(String, i64),
    Cleared(String),
}

/// Records every scheduler call instead of arming timers.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    calls: Mutex<Vec<Scheduled>>,
}

impl RecordingScheduler {
    pub fn calls(&self) -> Vec<Scheduled> {
        self.calls.lock().unwrap().clone()
    }

    pub fn one_shots(&self) -> Vec<(String, i64)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Scheduled::At(name, at) => Some((name, at)),
                _ => None,
            })
            .collect()
    }

    pub fn periodic(&self) -> Vec<(String, Duration)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Scheduled::Periodic(name, period) => Some((name, period)),
                _ => None,
            })
            .collect()
    }
}

impl Scheduler for RecordingScheduler {
    fn schedule_periodic(&self, name: &str, period: Duration) {
        self.calls
            .lock()
            .unwrap()
            .push(Scheduled::Periodic(name.into(), period));
    }

    fn schedule_at(&self, name: &str, when_ms: i64) {
        self.calls
            .lock()
            .unwrap()
            .push(Scheduled::At(name.into(), when_ms));
    }

    fn clear(&self, name: &str) -> bool {
        self.calls
            .lock()
            .unwrap()
            .push(Scheduled::Cleared(name.into()));
        true
    }
}

pub struct Harness {
    pub engine: FetchEngine,
    pub store: Arc<MemoryStore>,
    pub scheduler: Arc<RecordingScheduler>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub async fn settings(&self) -> Settings {
        store::load_settings(&*self.store).await.unwrap()
    }
}

pub fn client_for(server: &MockServer) -> TrmnlClient {
    TrmnlClient::builder()
        .base_url(Url::parse(&format!("{}/", server.base_url())).unwrap())
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// Engine against `server`, a memory store seeded with `patch`, a recording
/// scheduler, a manual clock at [`NOW`] and zero jitter.
pub async fn harness(server: &MockServer, patch: store::SettingsPatch) -> Harness {
    harness_with_store(server, MemoryStore::new(), patch).await
}

/// Like [`harness`], on a caller-configured store (e.g. a small quota).
pub async fn harness_with_store(
    server: &MockServer,
    store: MemoryStore,
    patch: store::SettingsPatch,
) -> Harness {
    let store = Arc::new(store);
    store.set(patch.into_map()).await.unwrap();
    let scheduler = Arc::new(RecordingScheduler::default());
    let clock = Arc::new(ManualClock::new(NOW));
    let engine = FetchEngine::new(client_for(server), store.clone(), scheduler.clone())
        .clock(clock.clone())
        .jitter(|| 0.0);
    Harness {
        engine,
        store,
        scheduler,
        clock,
    }
}

/// Settings with a key and nothing else.
pub fn keyed() -> store::SettingsPatch {
    store::SettingsPatch::new().api_key(KEY)
}

pub fn image_url(server: &MockServer, path: &str) -> String {
    format!("{}{}", server.base_url(), path)
}

pub fn mock_display<'a>(server: &'a MockServer, body: String) -> Mock<'a> {
    server.mock(|when, then| {
        when.method(GET)
            .path("/api/display")
            .header("access-token", KEY)
            .header("cache-control", "no-cache");
        then.status(200)
            .header("content-type", "application/json")
            .body(body);
    })
}

pub fn mock_image<'a>(server: &'a MockServer, path: &'a str) -> Mock<'a> {
    server.mock(|when, then| {
        when.method(GET).path(path).header("cache-control", "no-cache");
        then.status(200)
            .header("content-type", "image/png")
            .body(PNG_BYTES);
    })
}

pub fn display_body(image_url: &str, refresh_rate: Option<u64>) -> String {
    match refresh_rate {
        Some(r) => format!(r#"{{"image_url":"{image_url}","refresh_rate":{r},"filename":"plugin.png"}}"#),
        None => format!(r#"{{"image_url":"{image_url}"}}"#),
    }
}
