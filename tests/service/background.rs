use httpmock::MockServer;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use trmnl_tab::core::client::{REFRESH_ALARM, RETRY_ALARM};
use trmnl_tab::service::{Ack, Background, Request, Response};
use trmnl_tab::store::{SettingsPatch, keys};
use trmnl_tab::{Alarm, ManualClock, MemoryStore, Settings, SettingsStore, store};

use crate::common::{self, Harness, KEY, NOW, RecordingScheduler, Scheduled};

struct Rig {
    bg: Background,
    store: Arc<MemoryStore>,
    scheduler: Arc<RecordingScheduler>,
    clock: Arc<ManualClock>,
}

impl Rig {
    async fn settings(&self) -> Settings {
        store::load_settings(&*self.store).await.unwrap()
    }
}

async fn rig(server: &MockServer, patch: SettingsPatch) -> Rig {
    let Harness {
        engine,
        store,
        scheduler,
        clock,
    } = common::harness(server, patch).await;
    Rig {
        bg: Background::new(engine),
        store,
        scheduler,
        clock,
    }
}

#[tokio::test]
async fn install_fills_defaults_and_arms_refresh() {
    let server = MockServer::start();
    let h = rig(&server, SettingsPatch::new().retry_count(4).retry_after(Some(NOW + 1))).await;

    h.bg.on_installed().await.unwrap();

    let raw = h.store.get(keys::ALL).await.unwrap();
    assert_eq!(raw[keys::API_KEY], json!(""));
    assert_eq!(raw[keys::REFRESH_RATE], json!(60));
    assert_eq!(raw[keys::LAST_FETCH], json!(0));
    assert_eq!(raw[keys::NEXT_FETCH], json!(0));
    assert_eq!(raw[keys::RETRY_COUNT], json!(0));
    assert_eq!(raw[keys::RETRY_AFTER], json!(null));
    assert_eq!(
        h.scheduler.calls(),
        vec![
            Scheduled::Cleared(REFRESH_ALARM.into()),
            Scheduled::Periodic(REFRESH_ALARM.into(), Duration::from_secs(60)),
        ]
    );
}

#[tokio::test]
async fn install_keeps_existing_values_and_fetches_with_a_key() {
    let server = MockServer::start();
    let img = common::image_url(&server, "/img/a.png");
    let display = common::mock_display(&server, common::display_body(&img, Some(300)));
    let _image = common::mock_image(&server, "/img/a.png");
    let h = rig(&server, common::keyed().refresh_rate(300)).await;

    h.bg.on_installed().await.unwrap();

    display.assert_calls(1);
    let s = h.settings().await;
    assert_eq!(s.api_key, KEY);
    assert_eq!(s.refresh_rate, 300);
    assert!(s.current_image.is_some());
    assert_eq!(
        h.scheduler.periodic(),
        vec![(REFRESH_ALARM.to_string(), Duration::from_secs(300))]
    );
}

#[tokio::test]
async fn empty_key_is_rejected_without_touching_the_store() {
    let server = MockServer::start();
    let h = rig(&server, common::keyed()).await;

    let resp = h
        .bg
        .handle(Request::SaveApiKey { api_key: "   ".into() })
        .await;

    assert_eq!(resp, Response::Ack(Ack::error("API key cannot be empty")));
    assert_eq!(h.settings().await.api_key, KEY);
}

#[tokio::test]
async fn saving_a_key_clears_backoff_and_fetches() {
    let server = MockServer::start();
    let img = common::image_url(&server, "/img/a.png");
    let display = common::mock_display(&server, common::display_body(&img, Some(60)));
    let _image = common::mock_image(&server, "/img/a.png");
    let h = rig(&server, SettingsPatch::new().retry_count(3).retry_after(Some(NOW + 60_000))).await;

    let resp = h
        .bg
        .handle(Request::SaveApiKey { api_key: format!(" {KEY} ") })
        .await;

    assert_eq!(resp, Response::Ack(Ack::ok()));
    display.assert_calls(1);
    let s = h.settings().await;
    assert_eq!(s.api_key, KEY);
    assert_eq!((s.retry_count, s.retry_after), (0, None));
    assert_eq!(s.last_fetch, NOW);
}

#[tokio::test]
async fn force_refresh_reports_failure_without_error_text() {
    let server = MockServer::start();
    let _display = server.mock(|when, then| {
        when.path("/api/display");
        then.status(500);
    });
    let h = rig(&server, common::keyed()).await;

    let resp = h.bg.handle(Request::ForceRefresh).await;

    assert_eq!(resp, Response::Ack(Ack::failed()));
    assert_eq!(h.settings().await.retry_count, 1);
}

#[tokio::test]
async fn force_refresh_bypasses_cadence() {
    let server = MockServer::start();
    let img = common::image_url(&server, "/img/a.png");
    let display = common::mock_display(&server, common::display_body(&img, Some(60)));
    let _image = common::mock_image(&server, "/img/a.png");
    let h = rig(&server, common::keyed().next_fetch(NOW + 30_000)).await;

    assert_eq!(h.bg.handle(Request::ForceRefresh).await, Response::Ack(Ack::ok()));
    display.assert_calls(1);
}

#[tokio::test]
async fn current_image_snapshot_mirrors_settings() {
    let server = MockServer::start();
    let h = rig(&server, common::keyed().last_fetch(NOW - 5_000).next_fetch(NOW + 55_000)).await;

    let Response::CurrentImage(snap) = h.bg.handle(Request::GetCurrentImage).await else {
        panic!("expected a current image snapshot");
    };
    assert_eq!(snap.current_image, None);
    assert_eq!(snap.last_fetch, NOW - 5_000);
    assert_eq!(snap.next_fetch, NOW + 55_000);
    assert_eq!(snap.refresh_rate, 60);
}

#[tokio::test]
async fn status_lines_describe_backoff() {
    let server = MockServer::start();
    let h = rig(&server, common::keyed().retry_count(2).retry_after(Some(NOW + 90_000))).await;

    let Response::Status(status) = h.bg.handle(Request::GetStatus).await else {
        panic!("expected status lines");
    };
    assert_eq!(status.lines.len(), 2);
    assert!(status.lines[0].starts_with("Retry after: "));
    assert!(status.lines[0].ends_with("(attempt 2)"));
    assert_eq!(status.lines[1], "Refresh rate: 60 seconds");
}

#[tokio::test]
async fn alarms_dispatch_by_name() {
    let server = MockServer::start();
    let img = common::image_url(&server, "/img/a.png");
    let display = common::mock_display(&server, common::display_body(&img, Some(60)));
    let _image = common::mock_image(&server, "/img/a.png");
    let h = rig(&server, common::keyed()).await;

    let alarm = |name: &str| Alarm {
        name: name.into(),
        scheduled_time: NOW,
    };

    assert!(h.bg.on_alarm(&alarm("somethingElse")).await.unwrap().is_none());
    display.assert_calls(0);

    let outcome = h.bg.on_alarm(&alarm(REFRESH_ALARM)).await.unwrap().unwrap();
    assert!(outcome.is_success());
    display.assert_calls(1);

    // The retry alarm fetches too, with normal gating: cadence has not elapsed.
    h.clock.advance(Duration::from_secs(1));
    let outcome = h.bg.on_alarm(&alarm(RETRY_ALARM)).await.unwrap().unwrap();
    assert!(!outcome.is_success());
    display.assert_calls(1);
}
