use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueryDto {
    pub device_id: Option<String>,
    pub token: Option<String>,
}

/// Parameters of the `cache-resync` job endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheTaskQueryDto {
    pub user: Option<String>,
    /// comma separated device ids whose event caches must be dropped
    pub stale_devices: Option<String>,
}

impl CacheTaskQueryDto {
    pub fn stale_devices(&self) -> Vec<String> {
        self.stale_devices
            .as_deref()
            .map(|it| {
                it.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Parameters of the `push-notify` job endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTaskQueryDto {
    pub user: String,
    pub device_id_source: Option<String>,
    pub token: Option<String>,
}
