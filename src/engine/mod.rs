//! The fetch-and-backoff engine.
//!
//! [`FetchEngine::fetch_image`] is the single entry point used by both alarms
//! and on-demand requests. It gates on the stored settings, talks to the
//! display API, and turns every failed fetch, including a rejected image
//! write, into persisted retry state plus a one-shot retry alarm. Only a store
//! that cannot even take the retry state surfaces as an error.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, error, info, warn};

use crate::core::client::retry::{error_delay, parse_retry_after, random_jitter, rate_limit_delay};
use crate::core::client::{REFRESH_ALARM, RETRY_ALARM};
use crate::core::{
    CachedImage, Clock, FetchOutcome, Scheduler, Settings, SettingsStore, SkipReason,
    SystemClock, TrmnlClient, TrmnlError,
};
use crate::display::{self, Display, DisplayReply, DownloadedImage};
use crate::service::Event;
use crate::store::{self, SettingsPatch};

/// Share of the store quota above which a warning is logged before writing an image.
pub const STORAGE_WARN_RATIO: f64 = 0.8;

const EVENT_CAPACITY: usize = 16;

type Jitter = Arc<dyn Fn() -> f64 + Send + Sync>;

/// What the network phase of a fetch produced. Nothing has been persisted yet.
enum Transfer {
    RateLimited {
        retry_after: Option<String>,
    },
    Unchanged {
        display: Display,
        image: CachedImage,
    },
    Downloaded {
        display: Display,
        image: DownloadedImage,
    },
}

/// Orchestrates fetches, backoff and persistence of the cached image.
pub struct FetchEngine {
    client: TrmnlClient,
    store: Arc<dyn SettingsStore>,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    jitter: Jitter,
    events: broadcast::Sender<Event>,
    in_flight: Mutex<()>,
}

impl FetchEngine {
    pub fn new(
        client: TrmnlClient,
        store: Arc<dyn SettingsStore>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            client,
            store,
            scheduler,
            clock: Arc::new(SystemClock),
            jitter: Arc::new(random_jitter),
            events,
            in_flight: Mutex::new(()),
        }
    }

    /// Use `clock` instead of the system clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the rate-limit jitter source (milliseconds, expected in `[0, 10000)`).
    #[must_use]
    pub fn jitter(mut self, f: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
        self.jitter = Arc::new(f);
        self
    }

    /// Subscribe to [`Event::ImageUpdated`] notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn client(&self) -> &TrmnlClient {
        &self.client
    }

    pub fn store(&self) -> &Arc<dyn SettingsStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Read the current settings record.
    pub async fn settings(&self) -> Result<Settings, TrmnlError> {
        store::load_settings(&*self.store).await
    }

    /// (Re)program the periodic refresh alarm.
    pub fn setup_refresh_alarm(&self, refresh_rate_secs: u64) {
        self.scheduler.clear(REFRESH_ALARM);
        self.scheduler
            .schedule_periodic(REFRESH_ALARM, Duration::from_secs(refresh_rate_secs));
        info!(refresh_rate_secs, "refresh alarm programmed");
    }

    /// Fetch the current display image if the gating rules allow it.
    ///
    /// Gating, in order: no API key, active backoff window, and (unless
    /// `force_refresh`) a cadence that has not elapsed. A call made while
    /// another is in flight is skipped.
    ///
    /// # Errors
    ///
    /// Only a failure to read settings or to record retry state is returned.
    /// Network, HTTP, decoding and image-write failures are recorded as retry
    /// state and reported as [`FetchOutcome::Failed`].
    #[tracing::instrument(skip(self), fields(force = force_refresh))]
    pub async fn fetch_image(&self, force_refresh: bool) -> Result<FetchOutcome, TrmnlError> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!("fetch already in flight");
            return Ok(FetchOutcome::Skipped(SkipReason::InFlight));
        };

        let settings = self.settings().await?;
        let now = self.clock.now_ms();

        if let Some(reason) = gate(&settings, now, force_refresh) {
            match reason {
                SkipReason::NoApiKey => debug!("API key not set, skipping fetch"),
                SkipReason::Backoff { retry_after } => debug!(
                    wait_secs = (retry_after - now + 999) / 1000,
                    "in retry backoff period"
                ),
                SkipReason::TooEarly { next_fetch } => debug!(
                    wait_secs = (next_fetch - now + 999) / 1000,
                    "too early to refresh"
                ),
                SkipReason::InFlight => {}
            }
            return Ok(FetchOutcome::Skipped(reason));
        }

        match self.transfer(&settings, force_refresh).await {
            Ok(Transfer::RateLimited { retry_after }) => {
                self.enter_rate_limit(&settings, now, retry_after.as_deref())
                    .await
            }
            Ok(Transfer::Unchanged { display, image }) => {
                match self.commit_unchanged(&settings, now, &display, image).await {
                    Ok(outcome) => Ok(outcome),
                    Err(e) => self.enter_failure(&settings, now, &e).await,
                }
            }
            Ok(Transfer::Downloaded { display, image }) => {
                match self.commit_new(&settings, now, &display, &image).await {
                    Ok(outcome) => Ok(outcome),
                    Err(e) => self.enter_failure(&settings, now, &e).await,
                }
            }
            Err(e) => self.enter_failure(&settings, now, &e).await,
        }
    }

    async fn transfer(&self, settings: &Settings, force_refresh: bool) -> Result<Transfer, TrmnlError> {
        let (body, location) = match display::fetch_display(&self.client, &settings.api_key).await? {
            DisplayReply::RateLimited { retry_after } => {
                return Ok(Transfer::RateLimited { retry_after });
            }
            DisplayReply::Ok {
                display,
                image_location,
            } => (display, image_location),
        };
        debug!(image_url = %location, refresh_rate = body.refresh_rate, "display response");

        if !force_refresh
            && let Some(current) = &settings.current_image
            && current.original_url == body.image_url
        {
            return Ok(Transfer::Unchanged {
                display: body,
                image: current.clone(),
            });
        }

        let image = display::download_image(&self.client, location).await?;
        Ok(Transfer::Downloaded {
            display: body,
            image,
        })
    }

    async fn enter_rate_limit(
        &self,
        settings: &Settings,
        now: i64,
        header: Option<&str>,
    ) -> Result<FetchOutcome, TrmnlError> {
        // A server-given delay does not count as a retry attempt.
        let (delay, patch) = match header.and_then(parse_retry_after) {
            Some(ms) => (ms, SettingsPatch::new()),
            None => {
                let attempt = settings.retry_count.saturating_add(1);
                (
                    rate_limit_delay(attempt, (self.jitter)()),
                    SettingsPatch::new().retry_count(attempt),
                )
            }
        };
        let retry_after = now + delay;
        warn!(delay_secs = delay / 1000, "rate limited by the display API");

        store::apply(&*self.store, patch.retry_after(Some(retry_after))).await?;
        self.scheduler.schedule_at(RETRY_ALARM, retry_after);

        Ok(FetchOutcome::RateLimited { retry_after })
    }

    async fn enter_failure(
        &self,
        settings: &Settings,
        now: i64,
        err: &TrmnlError,
    ) -> Result<FetchOutcome, TrmnlError> {
        let attempt = settings.retry_count.saturating_add(1);
        let delay = error_delay(attempt);
        let retry_after = now + delay;
        error!(error = %err, attempt, delay_secs = delay / 1000, "display fetch failed, retry scheduled");

        store::apply(
            &*self.store,
            SettingsPatch::new()
                .retry_count(attempt)
                .retry_after(Some(retry_after)),
        )
        .await?;
        self.scheduler.schedule_at(RETRY_ALARM, retry_after);

        Ok(FetchOutcome::Failed {
            retry_after,
            error: err.to_string(),
        })
    }

    async fn commit_unchanged(
        &self,
        settings: &Settings,
        now: i64,
        display: &Display,
        image: CachedImage,
    ) -> Result<FetchOutcome, TrmnlError> {
        info!("image has not changed, updating refresh time only");
        store::apply(&*self.store, cadence_patch(now, display.refresh_rate)).await?;
        self.reprogram_if_changed(settings, display.refresh_rate);
        Ok(FetchOutcome::Unchanged(image))
    }

    async fn commit_new(
        &self,
        settings: &Settings,
        now: i64,
        display: &Display,
        downloaded: &DownloadedImage,
    ) -> Result<FetchOutcome, TrmnlError> {
        let image = CachedImage {
            url: downloaded.to_data_url(),
            original_url: display.image_url.clone(),
            filename: display.filename.clone(),
            timestamp: now,
        };

        self.check_storage_usage().await;

        store::apply(
            &*self.store,
            cadence_patch(now, display.refresh_rate).current_image(&image)?,
        )
        .await?;
        self.reprogram_if_changed(settings, display.refresh_rate);

        info!(
            filename = %image.filename,
            bytes = downloaded.bytes.len(),
            "stored new display image"
        );
        if self.events.send(Event::ImageUpdated).is_err() {
            debug!("no active listeners for imageUpdated");
        }

        Ok(FetchOutcome::Updated(image))
    }

    fn reprogram_if_changed(&self, settings: &Settings, refresh_rate: u64) {
        if refresh_rate != settings.refresh_rate {
            self.setup_refresh_alarm(refresh_rate);
        }
    }

    // Best-effort: a failing size check must not block storing the image.
    async fn check_storage_usage(&self) {
        let quota = self.store.quota_bytes();
        match self.store.bytes_in_use().await {
            Ok(used) if quota > 0 => {
                let ratio = used as f64 / quota as f64;
                debug!(used, quota, percent = ratio * 100.0, "storage usage");
                if ratio > STORAGE_WARN_RATIO {
                    warn!(used, quota, "storage usage is high");
                }
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "could not measure storage usage"),
        }
    }
}

/// The first gating rule that blocks a fetch at `now`, if any.
pub fn gate(settings: &Settings, now: i64, force_refresh: bool) -> Option<SkipReason> {
    if !settings.has_api_key() {
        return Some(SkipReason::NoApiKey);
    }
    if let Some(retry_after) = settings.retry_after
        && now < retry_after
    {
        return Some(SkipReason::Backoff { retry_after });
    }
    if !force_refresh && settings.too_early(now) {
        return Some(SkipReason::TooEarly {
            next_fetch: settings.next_fetch,
        });
    }
    None
}

/// Cadence fields written after any successful fetch, with retry state cleared.
fn cadence_patch(now: i64, refresh_rate: u64) -> SettingsPatch {
    SettingsPatch::new()
        .refresh_rate(refresh_rate)
        .last_fetch(now)
        .next_fetch(now.saturating_add(
            i64::try_from(refresh_rate)
                .unwrap_or(i64::MAX)
                .saturating_mul(1000),
        ))
        .reset_retry()
}
