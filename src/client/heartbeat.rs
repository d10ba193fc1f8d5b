//! Client-side heartbeat.
//!
//! Encrypts the hardware payload, posts it, and decrypts the server's
//! response with the same key the request went out under.

use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::client::hardware;
use crate::client::key_exchange::{exchange_key, ClientConfig};
use crate::client::responses::{HeartbeatEnvelope, HeartbeatReport, ServerErrorResponse};
use crate::crypto;
use crate::errors::{WardenError, WardenResult};

/// Plaintext heartbeat payload, encrypted before transmission.
#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatPayload {
    pub machine_id: String,
    pub machine_name: String,
    pub ram: i64,
    pub cores: i64,
}

impl HeartbeatPayload {
    /// Build a payload from this machine's identity and inventory.
    pub fn from_local_machine() -> WardenResult<Self> {
        Ok(Self {
            machine_id: hardware::machine_fingerprint()?,
            machine_name: hardware::machine_name(),
            ram: hardware::total_ram_gb(),
            cores: hardware::cpu_cores(),
        })
    }
}

/// Stateful heartbeat client: negotiates a session key on first use, retains
/// it across beats, and renegotiates once when the server stops accepting it
/// (expiry, server restart). Falls back to the shared secret only while no
/// session key can be negotiated at all.
pub struct HeartbeatAgent {
    http: Client,
    config: ClientConfig,
    session_key: Option<String>,
}

impl HeartbeatAgent {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: Client::new(),
            config,
            session_key: None,
        }
    }

    /// Heartbeat with this machine's identity and inventory.
    pub async fn beat(&mut self) -> WardenResult<HeartbeatReport> {
        let payload = HeartbeatPayload::from_local_machine()?;
        self.beat_with(&payload).await
    }

    /// Heartbeat with an explicit payload.
    pub async fn beat_with(&mut self, payload: &HeartbeatPayload) -> WardenResult<HeartbeatReport> {
        if self.session_key.is_none() {
            match exchange_key(&self.http, &self.config).await {
                Ok(handshake) => self.session_key = Some(handshake.session_key),
                Err(err) => {
                    warn!("Key exchange unavailable, using shared secret: {err}");
                }
            }
        }

        let key = match &self.session_key {
            Some(key) => key.clone(),
            None => {
                let secret = self.config.shared_secret.clone();
                return send_heartbeat(&self.http, &self.config, &secret, false, payload).await;
            }
        };

        match send_heartbeat(&self.http, &self.config, &key, true, payload).await {
            Ok(report) => Ok(report),
            Err(WardenError::ServerError(msg)) => {
                // The held key may have expired server-side; renegotiate once.
                debug!("Heartbeat rejected ({msg}), renegotiating session key");
                let handshake = exchange_key(&self.http, &self.config).await?;
                self.session_key = Some(handshake.session_key.clone());

                send_heartbeat(&self.http, &self.config, &handshake.session_key, true, payload)
                    .await
            }
            Err(err) => Err(err),
        }
    }
}

/// Send one heartbeat encrypted under `key`.
///
/// `use_session_key` tells the server which key class the client chose; pass
/// `false` only when `key` is the shared secret.
pub async fn send_heartbeat(
    http: &Client,
    config: &ClientConfig,
    key: &str,
    use_session_key: bool,
    payload: &HeartbeatPayload,
) -> WardenResult<HeartbeatReport> {
    let url = format!("{}/heartbeat", config.server_url.trim_end_matches('/'));

    let plaintext = serde_json::to_vec(payload)
        .map_err(|e| WardenError::EncryptionError(format!("payload serialization failed: {e}")))?;
    let encrypted_data = crypto::encrypt(&plaintext, key)?;

    let response = http
        .post(&url)
        .json(&json!({
            "API_KEY": config.api_key,
            "encrypted_data": encrypted_data,
            "use_session_key": use_session_key,
        }))
        .send()
        .await
        .map_err(|e| WardenError::NetworkError(format!("heartbeat request failed: {e}")))?;

    if !response.status().is_success() {
        let status = response.status();
        let body: ServerErrorResponse = response
            .json()
            .await
            .unwrap_or_else(|_| ServerErrorResponse {
                status_code: "SERVER_ERROR".to_string(),
                message: None,
            });

        warn!(%status, code = %body.status_code, "Heartbeat rejected");
        return Err(WardenError::ServerError(format!(
            "heartbeat failed: {}{}",
            body.status_code,
            body.message.map(|m| format!(" ({m})")).unwrap_or_default()
        )));
    }

    let envelope: HeartbeatEnvelope = response
        .json()
        .await
        .map_err(|e| WardenError::NetworkError(format!("invalid heartbeat response: {e}")))?;

    let decrypted = crypto::decrypt(&envelope.encrypted_data, key)?;
    let report: HeartbeatReport = serde_json::from_slice(&decrypted).map_err(|e| {
        WardenError::DecryptionError(format!("heartbeat response did not parse: {e}"))
    })?;

    debug!(
        expires_at = %report.license_info.expires_at,
        "Heartbeat acknowledged"
    );

    Ok(report)
}
