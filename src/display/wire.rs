use serde::Deserialize;

#[derive(Deserialize)]
pub(crate) struct DisplayEnvelope {
    pub(crate) image_url: Option<String>,
    // Occasionally sent as a float.
    pub(crate) refresh_rate: Option<f64>,
    pub(crate) filename: Option<String>,
}
