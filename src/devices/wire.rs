use serde::Deserialize;

#[derive(Deserialize)]
pub(crate) struct DevicesEnvelope {
    pub(crate) data: Option<Vec<DeviceNode>>,
}

#[derive(Deserialize)]
pub(crate) struct DeviceNode {
    pub(crate) id: i64,
    pub(crate) name: Option<String>,
    pub(crate) friendly_id: Option<String>,
    pub(crate) mac_address: Option<String>,
    // Devices the key cannot manage come back without one.
    pub(crate) api_key: Option<String>,
}
