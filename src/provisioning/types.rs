// src/provisioning/types.rs
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct CreateKeyRequest {
    #[serde(rename = "id")]
    pub subscriber_id: i64,
    #[serde(rename = "email")]
    pub label: String,
    #[serde(rename = "limitIp")]
    pub device_limit: u32,
    /// Zero means unlimited
    #[serde(rename = "totalGB")]
    pub data_cap_gb: u64,
    #[serde(rename = "expiryTime")]
    pub expires_at_unix: i64,
    #[serde(rename = "enable")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedKey {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateKeyResponse {
    pub success: bool,
    #[serde(default, rename = "msg")]
    pub message: String,
    #[serde(default, rename = "obj")]
    pub key: Option<CreatedKey>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtendKeyRequest<'a> {
    pub id: &'a str,
    #[serde(rename = "expiryTime")]
    pub expires_at_unix: i64,
    pub operation: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteKeyRequest<'a> {
    pub id: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenericResponse {
    pub success: bool,
    #[serde(default, rename = "msg")]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrafficEntry {
    pub id: String,
    #[serde(rename = "expiryTime")]
    pub expires_at_unix: i64,
    #[serde(default, rename = "enable")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrafficResponse {
    pub success: bool,
    #[serde(default, rename = "msg")]
    pub message: String,
    #[serde(default, rename = "obj")]
    pub entries: Option<Vec<TrafficEntry>>,
}
