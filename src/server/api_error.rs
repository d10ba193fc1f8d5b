//! Wire-level error responses for the Warden API.
//!
//! Error responses are always unencrypted JSON, even though successful
//! heartbeat responses are encrypted. Deployed clients key their parsing on
//! that asymmetry, so it must be preserved.
//!
//! # Response Format
//!
//! ```json
//! {
//!   "status_code": "LICENSE_EXPIRED",
//!   "message": "License has expired"
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::WardenError;

/// Machine-readable status codes for API responses.
///
/// These are stable wire names; existing clients dispatch on them.
/// `LicenseExpired` deliberately covers both "no license" and "expired
/// license"; the two causes are not distinguished to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// API key missing or not associated with any user
    InvalidApiKey,
    /// Ciphertext could not be decrypted with any applicable key
    DecryptionFailed,
    /// Payload decrypted but required fields are missing or unparsable
    MalformedPayload,
    /// Per-user machine cap reached; no row was created
    MachineLimitExceeded,
    /// No usable license (absent, unissued, or past expiry)
    LicenseExpired,
    /// Database or other internal failure
    ServerError,
}

impl ErrorCode {
    /// Returns the HTTP status for this error code.
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidApiKey => StatusCode::UNAUTHORIZED,
            ErrorCode::DecryptionFailed | ErrorCode::MalformedPayload => StatusCode::BAD_REQUEST,
            ErrorCode::MachineLimitExceeded | ErrorCode::LicenseExpired => StatusCode::FORBIDDEN,
            ErrorCode::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub status_code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiError {
    pub fn new(status_code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: Some(message.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code.http_status();
        (status, Json(self)).into_response()
    }
}

/// Internal failures surface as `SERVER_ERROR` without leaking details.
impl From<WardenError> for ApiError {
    fn from(err: WardenError) -> Self {
        match err {
            WardenError::DecryptionError(msg) => {
                ApiError::new(ErrorCode::DecryptionFailed, format!("Decryption failed: {msg}"))
            }
            WardenError::DatabaseError(_) => {
                ApiError::new(ErrorCode::ServerError, "Database error")
            }
            other => ApiError::new(ErrorCode::ServerError, format!("Internal server error: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_serialization() {
        let err = ApiError::new(ErrorCode::MachineLimitExceeded, "cap reached");
        let json = serde_json::to_string(&err).unwrap();

        assert!(json.contains("MACHINE_LIMIT_EXCEEDED"));
        assert!(json.contains("cap reached"));
    }

    #[test]
    fn message_is_omitted_when_absent() {
        let err = ApiError {
            status_code: ErrorCode::LicenseExpired,
            message: None,
        };
        let json = serde_json::to_string(&err).unwrap();

        assert!(!json.contains("message"));
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(
            ErrorCode::InvalidApiKey.http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ErrorCode::DecryptionFailed.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::MalformedPayload.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::MachineLimitExceeded.http_status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ErrorCode::LicenseExpired.http_status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ErrorCode::ServerError.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn database_error_maps_to_server_error() {
        let api: ApiError = WardenError::DatabaseError("boom".to_string()).into();
        assert_eq!(api.status_code, ErrorCode::ServerError);
    }
}
