//! Client-side key exchange.
//!
//! Negotiates a short-lived session key: the server returns it encrypted
//! under the shared secret, and the client holds the decrypted key in memory
//! for subsequent heartbeats.

use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use crate::client::responses::{KeyExchangeResponse, ServerErrorResponse};
use crate::crypto;
use crate::errors::{WardenError, WardenResult};

/// Connection settings for talking to a Warden server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the server, e.g. `http://127.0.0.1:3000`.
    pub server_url: String,
    /// The user's API key.
    pub api_key: String,
    /// Shared secret provisioned out-of-band.
    pub shared_secret: String,
}

/// A negotiated session key, already decrypted.
#[derive(Debug, Clone)]
pub struct SessionHandshake {
    pub session_key: String,
    pub expires_in: u64,
    pub username: String,
}

/// Perform the key exchange and decrypt the returned session key.
pub async fn exchange_key(http: &Client, config: &ClientConfig) -> WardenResult<SessionHandshake> {
    let url = format!("{}/key-exchange", config.server_url.trim_end_matches('/'));

    let response = http
        .post(&url)
        .json(&json!({ "API_KEY": config.api_key }))
        .send()
        .await
        .map_err(|e| WardenError::NetworkError(format!("key exchange request failed: {e}")))?;

    if !response.status().is_success() {
        let status = response.status();
        let body: ServerErrorResponse = response
            .json()
            .await
            .unwrap_or_else(|_| ServerErrorResponse {
                status_code: "SERVER_ERROR".to_string(),
                message: None,
            });

        warn!(%status, code = %body.status_code, "Key exchange rejected");
        return Err(WardenError::ServerError(format!(
            "key exchange failed: {}{}",
            body.status_code,
            body.message.map(|m| format!(" ({m})")).unwrap_or_default()
        )));
    }

    let body: KeyExchangeResponse = response
        .json()
        .await
        .map_err(|e| WardenError::NetworkError(format!("invalid key exchange response: {e}")))?;

    let key_bytes = crypto::decrypt(&body.session_key, &config.shared_secret)?;
    let session_key = String::from_utf8(key_bytes)
        .map_err(|_| WardenError::DecryptionError("session key is not valid UTF-8".to_string()))?;

    debug!(expires_in = body.expires_in, "Session key negotiated");

    Ok(SessionHandshake {
        session_key,
        expires_in: body.expires_in,
        username: body.username,
    })
}
