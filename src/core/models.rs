use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::client::{DEFAULT_REFRESH_RATE, DEVELOPMENT_BASE, PRODUCTION_BASE};

/// Which TRMNL host the extension talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// `https://usetrmnl.com`
    #[default]
    Production,
    /// `http://localhost:3000`
    Development,
}

impl Environment {
    /// Base URL of the host for this environment.
    pub const fn base_url(self) -> &'static str {
        match self {
            Self::Production => PRODUCTION_BASE,
            Self::Development => DEVELOPMENT_BASE,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
        }
    }

    /// Parses `production` / `development` (case-insensitive). Anything else is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Some(Self::Production),
            "development" | "dev" => Some(Self::Development),
            _ => None,
        }
    }

    /// Reads `TRMNL_ENV`, defaulting to production when unset or unrecognized.
    pub fn from_env() -> Self {
        std::env::var("TRMNL_ENV")
            .ok()
            .and_then(|v| Self::parse(&v))
            .unwrap_or_default()
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The cached display image plus its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedImage {
    /// Self-contained `data:` URL holding the image bytes.
    pub url: String,
    /// The `image_url` the API pointed at; used to skip re-downloading unchanged content.
    #[serde(rename = "originalUrl")]
    pub original_url: String,
    pub filename: String,
    /// Unix milliseconds when the image was stored.
    pub timestamp: i64,
}

/// The persisted settings record. Each field lives under its own store key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_key: String,
    /// Seconds between scheduled refreshes.
    pub refresh_rate: u64,
    /// Unix milliseconds of the last successful fetch; 0 when unset.
    pub last_fetch: i64,
    /// Unix milliseconds before which scheduled fetches are skipped; 0 when unset.
    pub next_fetch: i64,
    /// Consecutive failed or rate-limited attempts.
    pub retry_count: u32,
    /// Unix milliseconds before which every fetch is skipped.
    pub retry_after: Option<i64>,
    pub environment: Environment,
    /// Device selected from the account's device list, if any.
    pub device_id: Option<i64>,
    pub current_image: Option<CachedImage>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            refresh_rate: DEFAULT_REFRESH_RATE,
            last_fetch: 0,
            next_fetch: 0,
            retry_count: 0,
            retry_after: None,
            environment: Environment::default(),
            device_id: None,
            current_image: None,
        }
    }
}

impl Settings {
    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// `true` while `now` is inside the backoff window.
    pub fn in_backoff(&self, now: i64) -> bool {
        matches!(self.retry_after, Some(at) if now < at)
    }

    /// `true` while `now` is before the next scheduled fetch.
    pub fn too_early(&self, now: i64) -> bool {
        self.next_fetch != 0 && now < self.next_fetch
    }
}

/// Why a call to the engine did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No API key is configured.
    NoApiKey,
    /// Still inside a backoff window that ends at `retry_after`.
    Backoff { retry_after: i64 },
    /// The cadence has not elapsed yet.
    TooEarly { next_fetch: i64 },
    /// Another fetch is already running.
    InFlight,
}

/// Result of one pass through the fetch flow.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// A new image was downloaded and stored.
    Updated(CachedImage),
    /// The API pointed at the image already cached; only the cadence advanced.
    Unchanged(CachedImage),
    /// A gating condition short-circuited the call.
    Skipped(SkipReason),
    /// The API answered 429; retries are suppressed until `retry_after`.
    RateLimited { retry_after: i64 },
    /// The fetch failed; a retry is scheduled for `retry_after`.
    Failed { retry_after: i64, error: String },
}

impl FetchOutcome {
    /// The artifact obtained by this call, new or confirmed unchanged.
    pub fn image(&self) -> Option<&CachedImage> {
        match self {
            Self::Updated(img) | Self::Unchanged(img) => Some(img),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.image().is_some()
    }
}
