//! The remote display endpoint and image download.

mod api;
mod encode;
mod wire;

pub use encode::{FALLBACK_MIME, from_data_url, to_data_url};

use crate::core::{TrmnlClient, TrmnlError};

/// A decoded success body from the display endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Display {
    /// Where the rendered image lives, exactly as sent by the API.
    pub image_url: String,
    /// Effective cadence in seconds; the default when the API omits a positive value.
    pub refresh_rate: u64,
    /// Suggested filename; `display.jpg` when omitted.
    pub filename: String,
}

/// How the display endpoint answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayReply {
    Ok {
        display: Display,
        /// `image_url` resolved to an absolute URL.
        image_location: url::Url,
    },
    /// HTTP 429, with the raw `Retry-After` header if one was sent.
    RateLimited { retry_after: Option<String> },
}

/// Raw image bytes and the media type the server reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedImage {
    pub bytes: Vec<u8>,
    pub mime: Option<String>,
}

impl DownloadedImage {
    /// Encode as a `data:` URL suitable for the settings store.
    pub fn to_data_url(&self) -> String {
        to_data_url(self.mime.as_deref(), &self.bytes)
    }
}

/// Ask the display endpoint what to show, authenticating with the device `api_key`.
///
/// # Errors
///
/// Returns a `TrmnlError` on transport failures, non-2xx statuses other than 429,
/// or a body without an `image_url`.
pub async fn fetch_display(client: &TrmnlClient, api_key: &str) -> Result<DisplayReply, TrmnlError> {
    api::fetch_display(client, api_key).await
}

/// Download the image at `url`, bypassing intermediary caches.
///
/// # Errors
///
/// Returns a `TrmnlError` on transport failures or a non-2xx status.
pub async fn download_image(client: &TrmnlClient, url: url::Url) -> Result<DownloadedImage, TrmnlError> {
    api::download_image(client, url).await
}
