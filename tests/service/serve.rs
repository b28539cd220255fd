use httpmock::MockServer;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use trmnl_tab::core::client::REFRESH_ALARM;
use trmnl_tab::service::{Ack, Background, Event, Request, Response};
use trmnl_tab::{Alarm, TrmnlError, store};

use crate::common::{self, NOW};

#[tokio::test]
async fn requests_are_answered_and_updates_broadcast() {
    let server = MockServer::start();
    let img = common::image_url(&server, "/img/a.png");
    let _display = common::mock_display(&server, common::display_body(&img, Some(60)));
    let _image = common::mock_image(&server, "/img/a.png");
    let h = common::harness(&server, common::keyed()).await;
    let (_alarm_tx, alarm_rx) = mpsc::unbounded_channel();

    let (handle, client) = Background::new(h.engine).serve(alarm_rx);
    let mut events = client.subscribe();

    let resp = client.request(Request::ForceRefresh).await.unwrap();
    assert_eq!(resp, Response::Ack(Ack::ok()));

    let event = timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("event delivered")
        .unwrap();
    assert_eq!(event, Event::ImageUpdated);

    let Response::CurrentImage(snap) = client.request(Request::GetCurrentImage).await.unwrap()
    else {
        panic!("expected a snapshot");
    };
    assert_eq!(snap.last_fetch, NOW);
    assert!(snap.current_image.is_some_and(|img| img.url.starts_with("data:image/png;base64,")));

    handle.stop().await;
    assert!(matches!(
        client.request(Request::GetStatus).await,
        Err(TrmnlError::ServiceClosed)
    ));
}

#[tokio::test]
async fn fired_alarms_trigger_fetches() {
    let server = MockServer::start();
    let img = common::image_url(&server, "/img/a.png");
    let display = common::mock_display(&server, common::display_body(&img, Some(60)));
    let _image = common::mock_image(&server, "/img/a.png");
    let h = common::harness(&server, common::keyed()).await;
    let store = h.store.clone();
    let (alarm_tx, alarm_rx) = mpsc::unbounded_channel();

    let (handle, client) = Background::new(h.engine).serve(alarm_rx);
    let mut events = client.subscribe();

    alarm_tx
        .send(Alarm {
            name: REFRESH_ALARM.into(),
            scheduled_time: NOW,
        })
        .unwrap();

    timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("alarm produced an update")
        .unwrap();
    display.assert_calls(1);
    assert_eq!(store::load_settings(&*store).await.unwrap().last_fetch, NOW);

    // Closing the alarm channel leaves requests working.
    drop(alarm_tx);
    assert!(matches!(
        client.request(Request::GetStatus).await.unwrap(),
        Response::Status(_)
    ));
    handle.abort();
}
