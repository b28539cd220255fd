//! Human-readable refresh status for display clients.

use chrono::{DateTime, Local, TimeZone};
use std::fmt;

use crate::core::Settings;

/// Window within which a fetch counts as "just happened".
pub const RECENT_FETCH_MS: i64 = 10_000;

/// What happens next for the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextUpdate {
    /// A backoff window is active until `at`; `attempt` failures so far.
    RetryAfter { at: i64, attempt: u32 },
    /// Regular refresh due at `at`.
    Scheduled(i64),
    Unknown,
}

/// Snapshot of the refresh state, as shown in the settings panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusInfo {
    pub last_updated: Option<i64>,
    pub next: NextUpdate,
    pub refresh_rate: u64,
}

impl StatusInfo {
    pub fn from_settings(settings: &Settings, now: i64) -> Self {
        let next = match settings.retry_after {
            Some(at) if now < at => NextUpdate::RetryAfter {
                at,
                attempt: settings.retry_count,
            },
            _ if settings.next_fetch != 0 => NextUpdate::Scheduled(settings.next_fetch),
            _ => NextUpdate::Unknown,
        };
        Self {
            last_updated: (settings.last_fetch != 0).then_some(settings.last_fetch),
            next,
            refresh_rate: settings.refresh_rate,
        }
    }

    /// One line per known fact, in display order.
    pub fn lines(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(3);
        if let Some(at) = self.last_updated {
            out.push(format!("Last updated: {}", format_timestamp(at)));
        }
        match self.next {
            NextUpdate::RetryAfter { at, attempt } => {
                let mut line = format!("Retry after: {}", format_timestamp(at));
                if attempt > 0 {
                    line.push_str(&format!(" (attempt {attempt})"));
                }
                out.push(line);
            }
            NextUpdate::Scheduled(at) => {
                out.push(format!("Next update: {}", format_timestamp(at)));
            }
            NextUpdate::Unknown => {}
        }
        out.push(format!("Refresh rate: {} seconds", self.refresh_rate));
        out
    }
}

impl fmt::Display for StatusInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines().join("\n"))
    }
}

/// Local date-time for a Unix-millisecond timestamp.
pub fn format_timestamp(ms: i64) -> String {
    match Local.timestamp_millis_opt(ms).single() {
        Some(dt) => fmt_local(dt),
        None => ms.to_string(),
    }
}

fn fmt_local(dt: DateTime<Local>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Time left until `next_fetch` as `HH:MM:SS`; `Now` once elapsed, `Unknown` when unset.
pub fn countdown(next_fetch: i64, now: i64) -> String {
    if next_fetch == 0 {
        return "Unknown".into();
    }
    let remaining = next_fetch - now;
    if remaining <= 0 {
        return "Now".into();
    }
    let total_secs = remaining / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs / 60) % 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Whether the last fetch is recent enough that a display client can just reload.
pub fn is_recent_fetch(last_fetch: i64, now: i64) -> bool {
    last_fetch != 0 && now - last_fetch < RECENT_FETCH_MS
}
