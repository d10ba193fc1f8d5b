//! Wire types the client receives from the server.
//!
//! Success responses arrive encrypted inside an envelope; error responses are
//! plain JSON. The client distinguishes them by HTTP status.

use chrono::NaiveDateTime;
use serde::Deserialize;

/// Key exchange response. `session_key` is ciphertext under the shared
/// secret.
#[derive(Debug, Deserialize)]
pub struct KeyExchangeResponse {
    pub status_code: String,
    pub session_key: String,
    pub expires_in: u64,
    pub username: String,
}

/// Envelope around an encrypted heartbeat success body.
#[derive(Debug, Deserialize)]
pub struct HeartbeatEnvelope {
    pub encrypted_data: String,
}

/// Unencrypted error body returned on any non-success status.
#[derive(Debug, Deserialize)]
pub struct ServerErrorResponse {
    pub status_code: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Decrypted heartbeat success body.
#[derive(Debug, Deserialize)]
pub struct HeartbeatReport {
    pub status_code: String,
    pub license_info: LicenseInfo,
    pub machine_info: MachineInfo,
}

#[derive(Debug, Deserialize)]
pub struct LicenseInfo {
    pub expires_at: NaiveDateTime,
    pub plan_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MachineInfo {
    pub id: String,
    pub name: String,
    pub registered_at: NaiveDateTime,
}
