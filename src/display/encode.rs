use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

/// Media type used when the server does not send one.
pub const FALLBACK_MIME: &str = "application/octet-stream";

/// Encode `bytes` as a self-contained `data:<mime>;base64,<payload>` URL.
pub fn to_data_url(mime: Option<&str>, bytes: &[u8]) -> String {
    let mime = mime.filter(|m| !m.is_empty()).unwrap_or(FALLBACK_MIME);
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Recover the media type and bytes from a `data:` URL produced by [`to_data_url`].
///
/// Returns `None` for anything that is not a base64 data URL.
pub fn from_data_url(url: &str) -> Option<(String, Vec<u8>)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    let bytes = STANDARD.decode(payload).ok()?;
    Some((mime.to_string(), bytes))
}
