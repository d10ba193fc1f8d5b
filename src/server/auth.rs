//! API key authentication.
//!
//! Requests carry their credential as an `API_KEY` field in the JSON body.
//! Authentication resolves the key to a `User` row before any core logic
//! runs; a missing or unknown key short-circuits the request.

use tracing::warn;

use crate::server::api_error::{ApiError, ErrorCode};
use crate::server::database::{Database, User};

/// Resolve an API key to its user, or fail with `INVALID_API_KEY`.
pub async fn authenticate(db: &Database, api_key: Option<&str>) -> Result<User, ApiError> {
    let api_key = match api_key.filter(|key| !key.is_empty()) {
        Some(key) => key,
        None => {
            return Err(ApiError::new(
                ErrorCode::InvalidApiKey,
                "API_KEY is required",
            ));
        }
    };

    match db.find_user_by_api_key(api_key).await? {
        Some(user) => Ok(user),
        None => {
            warn!("Rejected request with unknown API key");
            Err(ApiError::new(ErrorCode::InvalidApiKey, "Invalid API Key"))
        }
    }
}
