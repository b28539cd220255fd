use serde::{Deserialize, Serialize};

use crate::core::{CachedImage, Settings};
use crate::devices::Device;

/// A request from a display client (settings panel or new-tab page).
///
/// Serialized as `{"action": "<name>", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    /// Store a device key, clear backoff memory and fetch.
    #[serde(rename_all = "camelCase")]
    SaveApiKey { api_key: String },
    /// Snapshot of the cached image and cadence.
    GetCurrentImage,
    /// Fetch now, ignoring the cadence (backoff still applies).
    ForceRefresh,
    /// List the devices visible to an account key.
    #[serde(rename_all = "camelCase")]
    ListDevices { account_key: String },
    /// Switch to another device and fetch immediately.
    SelectDevice { device: Device },
    /// Rendered status lines.
    GetStatus,
}

/// Plain success flag with an optional error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(msg.into()),
        }
    }
}

/// Answer to [`Request::GetCurrentImage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentImage {
    pub current_image: Option<CachedImage>,
    pub last_fetch: i64,
    pub next_fetch: i64,
    pub refresh_rate: u64,
}

impl From<Settings> for CurrentImage {
    fn from(s: Settings) -> Self {
        Self {
            current_image: s.current_image,
            last_fetch: s.last_fetch,
            next_fetch: s.next_fetch,
            refresh_rate: s.refresh_rate,
        }
    }
}

/// Answer to [`Request::ListDevices`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceList {
    pub success: bool,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Answer to [`Request::GetStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLines {
    pub lines: Vec<String>,
}

/// Reply to a [`Request`]; the variant follows the request kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Ack(Ack),
    CurrentImage(CurrentImage),
    Devices(DeviceList),
    Status(StatusLines),
}

/// Pushed from the engine to every listening display client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Event {
    /// A new image is cached; clients should request a fresh snapshot.
    ImageUpdated,
}
