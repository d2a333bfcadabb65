use crate::common::AppError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Closed set of timeline event kinds, stored and transmitted as an integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[repr(i32)]
pub enum EventType {
    MissedCall = 0,
    ReceivedSms = 1,
}

impl EventType {
    #[inline]
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for EventType {
    type Error = AppError;
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EventType::MissedCall),
            1 => Ok(EventType::ReceivedSms),
            _ => Err(AppError::invalid_argument(format!(
                "unknown event type: {value}"
            ))),
        }
    }
}

impl Display for EventType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::MissedCall => f.write_str("MISSED_CALL"),
            EventType::ReceivedSms => f.write_str("RECEIVED_SMS"),
        }
    }
}

/// Stored event row; `(device_id, id)` is its identity.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct EventEntity {
    pub device_id: String,
    pub id: String,
    pub kind: EventType,
    pub occurred_at: i64,
    pub counterpart_number: Option<String>,
    pub counterpart_name: Option<String>,
    pub message: Option<String>,
    /// set by the repository on every write, milliseconds since epoch
    pub last_updated: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub id: String,
    pub device_id: String,
    pub created: i64,
    #[serde(rename = "type")]
    pub kind: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub updated: i64,
}

impl From<&EventEntity> for EventView {
    fn from(value: &EventEntity) -> Self {
        Self {
            id: value.id.clone(),
            device_id: value.device_id.clone(),
            created: value.occurred_at,
            kind: value.kind.code(),
            number: value.counterpart_number.clone(),
            name: value.counterpart_name.clone(),
            message: value.message.clone(),
            updated: value.last_updated,
        }
    }
}

impl From<EventEntity> for EventView {
    fn from(value: EventEntity) -> Self {
        Self::from(&value)
    }
}
