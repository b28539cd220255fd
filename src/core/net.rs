use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response};
use url::Url;

use crate::core::{TrmnlClient, TrmnlError};

/// A GET that asks every intermediary to skip its cache.
pub(crate) fn get_no_cache(client: &TrmnlClient, url: Url) -> RequestBuilder {
    client.http().get(url).header(CACHE_CONTROL, "no-cache")
}

/// Turn any non-2xx response into [`TrmnlError::Status`].
pub(crate) fn ensure_success(resp: Response) -> Result<Response, TrmnlError> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        Err(TrmnlError::Status {
            status: resp.status().as_u16(),
            url: resp.url().to_string(),
        })
    }
}

/// Read the response body as text.
pub(crate) async fn get_text(resp: Response) -> Result<String, TrmnlError> {
    Ok(resp.text().await?)
}

/// Read a binary body together with its media type (parameters stripped).
pub(crate) async fn get_bytes(resp: Response) -> Result<(Vec<u8>, Option<String>), TrmnlError> {
    let mime = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty());
    let body = resp.bytes().await?;
    Ok((body.to_vec(), mime))
}
