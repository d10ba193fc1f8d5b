//! License validation.
//!
//! A user has at most one license row. A missing row, a row with no expiry
//! timestamp, and a row past its expiry all fail validation; the first two
//! fail closed, and all three surface to the client under the single
//! `LICENSE_EXPIRED` wire code.

use chrono::{NaiveDateTime, Utc};

use crate::errors::WardenResult;
use crate::server::database::Database;

/// License details carried into a successful heartbeat response.
#[derive(Debug, Clone)]
pub struct LicenseStanding {
    pub expires_at: NaiveDateTime,
    pub plan_type: Option<String>,
}

/// Outcome of validating a user's license.
#[derive(Debug, Clone)]
pub enum LicenseCheck {
    Valid(LicenseStanding),
    /// No license row exists for the user.
    NoLicense,
    /// A license exists but its expiry is missing or in the past.
    Expired,
}

/// Expiry policy: no timestamp fails closed; a timestamp strictly in the
/// past is expired; a timestamp equal to `now` is still valid.
pub(crate) fn is_expired(expires_at: Option<NaiveDateTime>, now: NaiveDateTime) -> bool {
    match expires_at {
        None => true,
        Some(expiry) => now > expiry,
    }
}

/// Resolve and validate the user's license against the current clock.
pub async fn check_license(db: &Database, user_id: &str) -> WardenResult<LicenseCheck> {
    let license = match db.find_license_by_user_id(user_id).await? {
        Some(license) => license,
        None => return Ok(LicenseCheck::NoLicense),
    };

    let now = Utc::now().naive_utc();
    match license.expires_at {
        Some(expires_at) if !is_expired(Some(expires_at), now) => {
            Ok(LicenseCheck::Valid(LicenseStanding {
                expires_at,
                plan_type: license.plan_type,
            }))
        }
        _ => Ok(LicenseCheck::Expired),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn missing_expiry_fails_closed() {
        let now = Utc::now().naive_utc();
        assert!(is_expired(None, now));
    }

    #[test]
    fn past_expiry_is_expired() {
        let now = Utc::now().naive_utc();
        assert!(is_expired(Some(now - Duration::seconds(1)), now));
        assert!(is_expired(Some(now - Duration::days(365)), now));
    }

    #[test]
    fn future_expiry_is_valid() {
        let now = Utc::now().naive_utc();
        assert!(!is_expired(Some(now + Duration::seconds(1)), now));
        assert!(!is_expired(Some(now + Duration::days(30)), now));
    }

    #[test]
    fn expiry_equal_to_now_is_valid() {
        // Strict `now > expires_at` semantics: the boundary instant passes.
        let now = Utc::now().naive_utc();
        assert!(!is_expired(Some(now), now));
    }
}
