use serde_json::json;
use trmnl_tab::store::{self, SettingsPatch, keys};
use trmnl_tab::{CachedImage, Environment, MemoryStore, Settings, SettingsStore};

#[tokio::test]
async fn empty_store_loads_defaults() {
    let store = MemoryStore::new();
    let s = store::load_settings(&store).await.unwrap();
    assert_eq!(s, Settings::default());
    assert_eq!(s.refresh_rate, 60);
    assert!(!s.has_api_key());
}

#[tokio::test]
async fn fields_are_stored_under_individual_keys() {
    let store = MemoryStore::new();
    let img = CachedImage {
        url: "data:image/png;base64,AAAA".into(),
        original_url: "http://x/a.png".into(),
        filename: "a.png".into(),
        timestamp: 42,
    };
    store::apply(
        &store,
        SettingsPatch::new()
            .api_key("k")
            .refresh_rate(120)
            .last_fetch(1)
            .next_fetch(2)
            .retry_count(3)
            .retry_after(Some(4))
            .environment(Environment::Development)
            .device_id(Some(7))
            .current_image(&img)
            .unwrap(),
    )
    .await
    .unwrap();

    let raw = store.snapshot().await;
    assert_eq!(raw[keys::API_KEY], json!("k"));
    assert_eq!(raw[keys::REFRESH_RATE], json!(120));
    assert_eq!(raw[keys::RETRY_AFTER], json!(4));
    assert_eq!(raw[keys::ENVIRONMENT], json!("development"));
    assert_eq!(
        raw[keys::CURRENT_IMAGE],
        json!({
            "url": "data:image/png;base64,AAAA",
            "originalUrl": "http://x/a.png",
            "filename": "a.png",
            "timestamp": 42
        })
    );

    let s = store::load_settings(&store).await.unwrap();
    assert_eq!(s.api_key, "k");
    assert_eq!(s.refresh_rate, 120);
    assert_eq!((s.last_fetch, s.next_fetch), (1, 2));
    assert_eq!(s.retry_count, 3);
    assert_eq!(s.retry_after, Some(4));
    assert_eq!(s.environment, Environment::Development);
    assert_eq!(s.device_id, Some(7));
    assert_eq!(s.current_image, Some(img));
}

#[tokio::test]
async fn reset_retry_writes_zero_and_null() {
    let store = MemoryStore::new();
    store::apply(&store, SettingsPatch::new().retry_count(5).retry_after(Some(99)))
        .await
        .unwrap();
    store::apply(&store, SettingsPatch::new().reset_retry())
        .await
        .unwrap();

    let raw = store.snapshot().await;
    assert_eq!(raw[keys::RETRY_COUNT], json!(0));
    assert_eq!(raw[keys::RETRY_AFTER], json!(null));
    let s = store::load_settings(&store).await.unwrap();
    assert_eq!((s.retry_count, s.retry_after), (0, None));
}

#[tokio::test]
async fn loose_values_from_other_writers_are_tolerated() {
    let mut entries = serde_json::Map::new();
    entries.insert(keys::LAST_FETCH.into(), json!(1_700_000_000_000.0));
    entries.insert(keys::REFRESH_RATE.into(), json!(0));
    entries.insert(keys::RETRY_AFTER.into(), json!(0));
    entries.insert(keys::ENVIRONMENT.into(), json!("staging"));
    entries.insert(keys::CURRENT_IMAGE.into(), json!({"url": 5}));
    let store = MemoryStore::with_entries(entries);

    let s = store::load_settings(&store).await.unwrap();

    assert_eq!(s.last_fetch, 1_700_000_000_000);
    assert_eq!(s.refresh_rate, 60);
    assert_eq!(s.retry_after, None);
    assert_eq!(s.environment, Environment::Production);
    assert_eq!(s.current_image, None);
}

#[tokio::test]
async fn memory_store_reports_usage_and_quota() {
    let store = MemoryStore::new().quota(1024);
    assert_eq!(store.bytes_in_use().await.unwrap(), 0);
    store::apply(&store, SettingsPatch::new().api_key("abc"))
        .await
        .unwrap();
    // "apiKey" + "\"abc\""
    assert_eq!(store.bytes_in_use().await.unwrap(), 11);
    assert_eq!(store.quota_bytes(), 1024);
}

#[tokio::test]
async fn empty_patch_is_not_written() {
    let store = MemoryStore::new();
    store::apply(&store, SettingsPatch::new()).await.unwrap();
    assert!(store.snapshot().await.is_empty());
}

#[tokio::test]
async fn writes_past_the_quota_are_rejected_whole() {
    let store = MemoryStore::new().quota(32);
    store::apply(&store, SettingsPatch::new().api_key("abc"))
        .await
        .unwrap();

    let err = store::apply(
        &store,
        SettingsPatch::new()
            .last_fetch(1)
            .api_key("a-key-far-too-long-for-this-tiny-quota"),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, trmnl_tab::TrmnlError::Store(_)), "{err}");
    let s = store::load_settings(&store).await.unwrap();
    assert_eq!(s.api_key, "abc");
    assert_eq!(s.last_fetch, 0);
}

#[tokio::test]
async fn stored_cadence_is_capped() {
    let mut entries = serde_json::Map::new();
    entries.insert(keys::REFRESH_RATE.into(), json!(i64::MAX));
    let store = MemoryStore::with_entries(entries);

    let s = store::load_settings(&store).await.unwrap();
    assert_eq!(s.refresh_rate, trmnl_tab::core::client::MAX_REFRESH_RATE);
}
