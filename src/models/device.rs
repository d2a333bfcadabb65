use serde::{Deserialize, Serialize};

/// Presented in place of a missing device name.
pub const UNNAMED_DEVICE: &str = "Unknown";

/// Stored device row. Carries the push token, so it never leaves the server.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DeviceEntity {
    pub id: String,
    pub owner: String,
    pub name: Option<String>,
    pub push_token: Option<String>,
}

impl DeviceEntity {
    #[inline]
    pub fn is_owned_by(&self, user: &str) -> bool {
        self.owner == user
    }
    #[inline]
    pub fn can_receive_push(&self) -> bool {
        self.push_token.as_deref().is_some_and(|it| !it.is_empty())
    }
}

/// Over-the-wire shape of a device, also what the cache holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceView {
    pub id: String,
    pub name: String,
}

impl From<&DeviceEntity> for DeviceView {
    fn from(value: &DeviceEntity) -> Self {
        Self {
            id: value.id.clone(),
            name: value
                .name
                .clone()
                .unwrap_or_else(|| UNNAMED_DEVICE.to_string()),
        }
    }
}

impl From<DeviceEntity> for DeviceView {
    fn from(value: DeviceEntity) -> Self {
        Self::from(&value)
    }
}
