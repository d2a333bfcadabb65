use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceBodyDto {
    pub name: Option<String>,
    pub push_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UnregisterResponseDto {
    pub removed: Vec<String>,
}
