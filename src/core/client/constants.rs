//! Centralized constants for default endpoints, UA and alarm names.

/// Identifies this client to the display API.
pub(crate) const USER_AGENT: &str = concat!("trmnl-tab/", env!("CARGO_PKG_VERSION"));

/// Production TRMNL host.
pub(crate) const PRODUCTION_BASE: &str = "https://usetrmnl.com";

/// Local development server.
pub(crate) const DEVELOPMENT_BASE: &str = "http://localhost:3000";

/// Display endpoint, relative to the base URL.
pub(crate) const DISPLAY_PATH: &str = "api/display";

/// Device list endpoint, relative to the base URL.
pub(crate) const DEVICES_PATH: &str = "api/devices";

/// Login page, relative to the base URL.
pub(crate) const LOGIN_PATH: &str = "login";

/// Header carrying the device API key on display requests.
pub(crate) const ACCESS_TOKEN_HEADER: &str = "access-token";

/// Default overall request timeout in seconds.
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Cadence used when the API does not report a positive `refresh_rate`.
pub const DEFAULT_REFRESH_RATE: u64 = 60;

/// Longest cadence accepted from the API or the store (one week).
pub const MAX_REFRESH_RATE: u64 = 7 * 24 * 60 * 60;

/// Filename recorded when the API omits one.
pub const DEFAULT_FILENAME: &str = "display.jpg";

/// Periodic alarm driving regular refreshes.
pub const REFRESH_ALARM: &str = "refreshTrmnlImage";

/// One-shot alarm armed when entering a backoff window.
pub const RETRY_ALARM: &str = "retryTrmnlImage";
