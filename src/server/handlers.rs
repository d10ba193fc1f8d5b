//! Axum handlers: key exchange and the heartbeat orchestrator.
//!
//! A heartbeat moves through a fixed progression: authenticate, select key,
//! decrypt, validate payload fields, resolve the machine, record hardware
//! drift, check the license, encrypt the response. The response is always
//! encrypted with whichever key successfully decrypted the request.

use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::crypto;
use crate::server::api_error::{ApiError, ErrorCode};
use crate::server::auth::authenticate;
use crate::server::database::Database;
use crate::server::licenses::{check_license, LicenseCheck};
use crate::server::machines::{verify_and_update_hardware, verify_or_register, Registration};
use crate::session::SessionKeyStore;

/// Shared application state for handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub sessions: Arc<SessionKeyStore>,
    /// Long-lived shared secret, injected from configuration at startup.
    pub shared_secret: String,
    /// Maximum machine rows per API key.
    pub machine_limit: u32,
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Key exchange request body.
#[derive(Debug, Deserialize)]
pub struct KeyExchangeRequest {
    #[serde(rename = "API_KEY")]
    pub api_key: Option<String>,
}

/// Key exchange response: the fresh (or current) session key, encrypted
/// under the shared secret.
#[derive(Debug, Serialize, Deserialize)]
pub struct KeyExchangeResponse {
    pub status_code: String,
    pub session_key: String,
    pub expires_in: u64,
    pub username: String,
}

/// Heartbeat request body. Everything meaningful travels inside
/// `encrypted_data`; `use_session_key: false` opts the client out of session
/// keys entirely.
#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    #[serde(rename = "API_KEY")]
    pub api_key: Option<String>,
    pub encrypted_data: Option<String>,
    pub use_session_key: Option<bool>,
}

/// Heartbeat response envelope. Success bodies are encrypted; errors go out
/// as unencrypted `ApiError` JSON instead.
#[derive(Debug, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub encrypted_data: String,
}

/// Decrypted heartbeat payload. All fields are required; absence of any one
/// is a terminal input error.
#[derive(Debug, Deserialize)]
struct HeartbeatPayload {
    machine_id: String,
    machine_name: String,
    ram: i64,
    cores: i64,
}

/// Plaintext success body, serialized then encrypted into the response.
#[derive(Debug, Serialize)]
struct HeartbeatSuccess {
    status_code: &'static str,
    license_info: LicenseInfo,
    machine_info: MachineInfo,
}

#[derive(Debug, Serialize)]
struct LicenseInfo {
    expires_at: NaiveDateTime,
    plan_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct MachineInfo {
    id: String,
    name: String,
    registered_at: NaiveDateTime,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check.
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Issue (or re-issue) the caller's session key.
///
/// The key is encrypted under the shared secret, the only message besides
/// heartbeat fallback ever protected by it. No side effect beyond key
/// creation in the session store.
pub async fn key_exchange_handler(
    State(state): State<AppState>,
    Json(req): Json<KeyExchangeRequest>,
) -> Result<Json<KeyExchangeResponse>, ApiError> {
    let user = authenticate(&state.db, req.api_key.as_deref()).await?;

    let session_key = state.sessions.get_or_create(&user.id);
    let encrypted_session_key = crypto::encrypt(session_key.as_bytes(), &state.shared_secret)?;

    info!(user_id = %user.id, "Session key issued via key exchange");

    Ok(Json(KeyExchangeResponse {
        status_code: "SUCCESS".to_string(),
        session_key: encrypted_session_key,
        expires_in: state.sessions.ttl().as_secs(),
        username: user.display_name(),
    }))
}

/// Process one heartbeat.
pub async fn heartbeat_handler(
    State(state): State<AppState>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let user = authenticate(&state.db, req.api_key.as_deref()).await?;

    // Key selection: session key unless the client opted out. A missing or
    // expired session key is minted here so the client can pick it up on its
    // next key exchange.
    let use_session_key = req.use_session_key.unwrap_or(true);
    let selected_key = if use_session_key {
        state.sessions.get_or_create(&user.id)
    } else {
        state.shared_secret.clone()
    };

    let encrypted_data = req.encrypted_data.ok_or_else(|| {
        ApiError::new(ErrorCode::DecryptionFailed, "encrypted_data is required")
    })?;

    // Decrypt with the selected key; fall back to the shared secret exactly
    // once. The fallback covers clients still holding a session key this
    // process no longer knows (e.g. after a restart). A fallback success
    // leaves the cached session key untouched.
    let (plaintext, reply_key) = match crypto::decrypt(&encrypted_data, &selected_key) {
        Ok(plaintext) => (plaintext, selected_key),
        Err(err) if selected_key != state.shared_secret => {
            match crypto::decrypt(&encrypted_data, &state.shared_secret) {
                Ok(plaintext) => {
                    debug!(user_id = %user.id, "Heartbeat decrypted with shared-secret fallback");
                    (plaintext, state.shared_secret.clone())
                }
                Err(_) => {
                    warn!(user_id = %user.id, "Heartbeat decryption failed on both keys");
                    return Err(ApiError::new(
                        ErrorCode::DecryptionFailed,
                        format!("Decryption failed: {err}"),
                    ));
                }
            }
        }
        Err(err) => {
            warn!(user_id = %user.id, "Heartbeat decryption failed");
            return Err(ApiError::new(
                ErrorCode::DecryptionFailed,
                format!("Decryption failed: {err}"),
            ));
        }
    };

    // Field presence is validated independently of the cipher path: a
    // payload that decrypted fine but lacks a required field is terminal.
    let payload: HeartbeatPayload = serde_json::from_slice(&plaintext).map_err(|e| {
        ApiError::new(
            ErrorCode::MalformedPayload,
            format!("Missing or invalid fields in decrypted data: {e}"),
        )
    })?;

    let registration = verify_or_register(
        &state.db,
        &user.api_key,
        &payload.machine_id,
        &payload.machine_name,
        payload.ram,
        payload.cores,
        state.machine_limit,
    )
    .await?;

    let machine = match registration {
        Registration::LimitExceeded => {
            return Err(ApiError::new(
                ErrorCode::MachineLimitExceeded,
                format!(
                    "Maximum {} machines allowed per user",
                    state.machine_limit
                ),
            ));
        }
        Registration::New(machine) => machine,
        Registration::Existing(machine) => {
            verify_and_update_hardware(&state.db, &machine, payload.ram, payload.cores).await?
        }
    };

    let standing = match check_license(&state.db, &user.id).await? {
        LicenseCheck::Valid(standing) => standing,
        LicenseCheck::NoLicense => {
            return Err(ApiError::new(
                ErrorCode::LicenseExpired,
                "No license found for user",
            ));
        }
        LicenseCheck::Expired => {
            return Err(ApiError::new(
                ErrorCode::LicenseExpired,
                "License has expired",
            ));
        }
    };

    let success = HeartbeatSuccess {
        status_code: "SUCCESS",
        license_info: LicenseInfo {
            expires_at: standing.expires_at,
            plan_type: standing.plan_type,
        },
        machine_info: MachineInfo {
            id: machine.id,
            name: machine.name,
            registered_at: machine.created_at,
        },
    };

    let body = serde_json::to_vec(&success)
        .map_err(|e| ApiError::new(ErrorCode::ServerError, format!("Internal server error: {e}")))?;

    // Symmetry: the response goes out under the key that decrypted the request.
    let encrypted_response = crypto::encrypt(&body, &reply_key)?;

    debug!(user_id = %user.id, machine_id = %payload.machine_id, "Heartbeat succeeded");

    Ok(Json(HeartbeatResponse {
        encrypted_data: encrypted_response,
    }))
}
