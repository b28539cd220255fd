//! trmnl-tab: background refresh engine for a TRMNL new-tab display.
//!
//! The crate keeps a display image fresh: it asks the TRMNL display API what to
//! show on a server-driven cadence, downloads the image into a durable
//! `data:` URL, and backs off when the API rate limits it or a fetch fails.
//!
//! The moving parts:
//! - [`FetchEngine`] gates, fetches and records retry state.
//! - [`SettingsStore`] and [`Scheduler`] are the seams to storage and alarms;
//!   [`store`] and [`schedule`] provide ready-made implementations.
//! - [`service::Background`] speaks the message protocol used by display clients.
//!
//! ```no_run
//! use std::sync::Arc;
//! use trmnl_tab::{FetchEngine, MemoryStore, TokioScheduler, TrmnlClient, service::Background};
//!
//! # async fn run() -> Result<(), trmnl_tab::TrmnlError> {
//! let (scheduler, alarms) = TokioScheduler::new();
//! let engine = FetchEngine::new(
//!     TrmnlClient::builder().build()?,
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(scheduler),
//! );
//! let background = Background::new(engine);
//! background.on_installed().await?;
//! let (handle, client) = background.serve(alarms);
//! let _ = client.request(trmnl_tab::service::Request::ForceRefresh).await?;
//! handle.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod devices;
pub mod display;
pub mod engine;
pub mod schedule;
pub mod service;
pub mod status;
pub mod store;

pub use crate::core::{
    CachedImage, Clock, Environment, FetchOutcome, ManualClock, Scheduler, Settings,
    SettingsStore, SkipReason, SystemClock, TrmnlClient, TrmnlClientBuilder, TrmnlError,
};
pub use devices::{Device, DeviceDirectory};
pub use engine::FetchEngine;
pub use schedule::{Alarm, AlarmKind, TokioScheduler};
pub use status::StatusInfo;
pub use store::{JsonFileStore, MemoryStore, SettingsPatch};
