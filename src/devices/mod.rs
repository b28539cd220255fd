//! Account device list.
//!
//! An account key lists the devices it owns; picking one hands its device key
//! to the engine (see [`Background::select_device`](crate::service::Background::select_device)).

mod wire;

use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};

use crate::core::{TrmnlClient, TrmnlError, net};

/// A device registered to the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub name: String,
    pub friendly_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    /// Key sent as `access-token` on display requests for this device.
    pub api_key: String,
}

/// Lists the devices visible to an account key.
#[derive(Debug, Clone)]
pub struct DeviceDirectory {
    client: TrmnlClient,
}

impl DeviceDirectory {
    pub fn new(client: &TrmnlClient) -> Self {
        Self {
            client: client.clone(),
        }
    }

    /// Fetch the device list, authenticating with `Authorization: Bearer <account_key>`.
    ///
    /// # Errors
    ///
    /// Returns a `TrmnlError` if the request fails, the server answers with a
    /// non-2xx status, or the body is not a device list.
    #[tracing::instrument(skip(self, account_key), err)]
    pub async fn list(&self, account_key: &str) -> Result<Vec<Device>, TrmnlError> {
        let url = self.client.devices_url()?;
        let resp = net::get_no_cache(&self.client, url)
            .header(AUTHORIZATION, format!("Bearer {account_key}"))
            .send()
            .await?;
        let resp = net::ensure_success(resp)?;
        let body = net::get_text(resp).await?;
        let envelope: wire::DevicesEnvelope = serde_json::from_str(&body)?;

        let devices: Vec<Device> = envelope
            .data
            .unwrap_or_default()
            .into_iter()
            .filter_map(|raw| {
                let api_key = raw.api_key.filter(|k| !k.is_empty())?;
                Some(Device {
                    id: raw.id,
                    name: raw.name.unwrap_or_else(|| format!("Device {}", raw.id)),
                    friendly_id: raw.friendly_id.unwrap_or_default(),
                    mac_address: raw.mac_address,
                    api_key,
                })
            })
            .collect();
        tracing::debug!(count = devices.len(), "device list fetched");
        Ok(devices)
    }
}
