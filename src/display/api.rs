use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;

use crate::core::client::{
    ACCESS_TOKEN_HEADER, DEFAULT_FILENAME, DEFAULT_REFRESH_RATE, MAX_REFRESH_RATE,
};
use crate::core::{TrmnlClient, TrmnlError, net};
use crate::display::{Display, DisplayReply, DownloadedImage, wire};

pub(super) async fn fetch_display(
    client: &TrmnlClient,
    api_key: &str,
) -> Result<DisplayReply, TrmnlError> {
    let url = client.display_url()?;
    let resp = net::get_no_cache(client, url.clone())
        .header(ACCESS_TOKEN_HEADER, api_key)
        .send()
        .await?;

    if resp.status() == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        return Ok(DisplayReply::RateLimited { retry_after });
    }

    let resp = net::ensure_success(resp)?;
    let body = net::get_text(resp).await?;
    let display = decode_display(&body)?;

    // Relative image paths resolve against the display endpoint.
    let image_location = url.join(&display.image_url)?;
    Ok(DisplayReply::Ok {
        display,
        image_location,
    })
}

fn decode_display(body: &str) -> Result<Display, TrmnlError> {
    let parsed: wire::DisplayEnvelope = serde_json::from_str(body)
        .map_err(|e| TrmnlError::Data(format!("json parse error: {e}")))?;

    let image_url = parsed
        .image_url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| TrmnlError::Data("missing image_url".into()))?;

    let refresh_rate = parsed
        .refresh_rate
        .filter(|r| r.is_finite() && *r >= 1.0)
        .map_or(DEFAULT_REFRESH_RATE, |r| {
            r.round().min(MAX_REFRESH_RATE as f64) as u64
        });

    let filename = parsed
        .filename
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string());

    Ok(Display {
        image_url,
        refresh_rate,
        filename,
    })
}

pub(super) async fn download_image(
    client: &TrmnlClient,
    url: url::Url,
) -> Result<DownloadedImage, TrmnlError> {
    let resp = net::get_no_cache(client, url).send().await?;
    let resp = net::ensure_success(resp)?;
    let (bytes, mime) = net::get_bytes(resp).await?;
    Ok(DownloadedImage { bytes, mime })
}
