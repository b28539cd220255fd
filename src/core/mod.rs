//! Core components of the `trmnl-tab` crate.
//!
//! This module contains the foundational building blocks of the library, including:
//! - The [`TrmnlClient`] and its builder.
//! - The primary [`TrmnlError`] type.
//! - The persisted [`Settings`] record and the [`CachedImage`] artifact.
//! - The store, scheduler and clock seams the engine is written against.

/// The HTTP client (`TrmnlClient`), builder, endpoint constants and backoff curves.
pub mod client;
/// The primary error type (`TrmnlError`) for the crate.
pub mod error;
/// Settings record, cached artifact and fetch outcomes.
pub mod models;
/// Service traits for abstracting storage, alarms and time.
pub mod services;

pub(crate) mod net;

// convenient re-exports so most code can just `use crate::core::TrmnlClient`
pub use client::{TrmnlClient, TrmnlClientBuilder};
pub use error::TrmnlError;
pub use models::{CachedImage, Environment, FetchOutcome, Settings, SkipReason};
pub use services::{Clock, ManualClock, Scheduler, SettingsStore, StoreMap, SystemClock};
