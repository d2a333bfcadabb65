use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddEventBodyDto {
    pub device_id: String,
    pub created: i64,
    #[serde(rename = "type")]
    pub kind: i32,
    pub number: Option<String>,
    pub name: Option<String>,
    pub message: Option<String>,
}
