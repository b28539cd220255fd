//! Backoff formulas used when the display API rate limits us or a fetch fails.
//!
//! The two paths use different curves: rate limiting grows by 1.5x
//! with up to ten seconds of jitter, generic failures double without jitter.

use std::time::Duration;

/// Base delay for the first retry.
pub const BASE_DELAY_MS: i64 = 60_000;

/// Upper bound for any computed backoff delay (one hour).
pub const MAX_DELAY_MS: i64 = 3_600_000;

/// Upper bound (exclusive) of the jitter added to rate-limit delays.
pub const MAX_JITTER_MS: f64 = 10_000.0;

/// Specifies the backoff curve applied to the n-th consecutive failure.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Backoff {
    /// `base * factor^(n-1) + jitter`, capped at `max`.
    Exponential {
        /// The delay for the first attempt.
        base: Duration,
        /// The multiplicative factor for each subsequent retry.
        factor: f64,
        /// The maximum duration to wait between retries.
        max: Duration,
    },
}

impl Backoff {
    /// Curve used after an HTTP 429 without a usable `Retry-After` header.
    pub const RATE_LIMITED: Self = Self::Exponential {
        base: Duration::from_millis(BASE_DELAY_MS as u64),
        factor: 1.5,
        max: Duration::from_millis(MAX_DELAY_MS as u64),
    };

    /// Curve used after network failures, non-2xx statuses and malformed responses.
    pub const FAILURE: Self = Self::Exponential {
        base: Duration::from_millis(BASE_DELAY_MS as u64),
        factor: 2.0,
        max: Duration::from_millis(MAX_DELAY_MS as u64),
    };

    /// Delay in milliseconds for the `attempt`-th consecutive failure (1-based).
    ///
    /// `jitter_ms` is added before the cap is applied.
    #[must_use]
    pub fn delay_ms(&self, attempt: u32, jitter_ms: f64) -> i64 {
        match *self {
            Self::Exponential { base, factor, max } => {
                let exp = attempt.saturating_sub(1).min(64) as i32;
                let raw = base.as_millis() as f64 * factor.powi(exp) + jitter_ms.max(0.0);
                let capped = raw.min(max.as_millis() as f64);
                capped as i64
            }
        }
    }
}

/// Delay for the n-th consecutive 429 response: `min(60000 * 1.5^(n-1) + jitter, 3600000)`.
#[must_use]
pub fn rate_limit_delay(attempt: u32, jitter_ms: f64) -> i64 {
    Backoff::RATE_LIMITED.delay_ms(attempt, jitter_ms)
}

/// Delay for the n-th consecutive fetch error: `min(60000 * 2^(n-1), 3600000)`.
#[must_use]
pub fn error_delay(attempt: u32) -> i64 {
    Backoff::FAILURE.delay_ms(attempt, 0.0)
}

/// Parses a `Retry-After` header given in whole seconds into milliseconds.
///
/// HTTP-date values and garbage yield `None`, in which case the caller falls
/// back to [`rate_limit_delay`].
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<i64> {
    let secs: u32 = value.trim().parse().ok()?;
    Some(i64::from(secs) * 1000)
}

/// Uniform jitter in `[0, MAX_JITTER_MS)`.
pub(crate) fn random_jitter() -> f64 {
    rand::random::<f64>() * MAX_JITTER_MS
}
