//! End-to-end heartbeat tests: handler invoked directly against an in-memory
//! SQLite database.

mod common;

use axum::extract::State;
use axum::Json;
use chrono::{Duration, Utc};
use serde_json::json;

use warden::client::responses::HeartbeatReport;
use warden::crypto;
use warden::server::handlers::{heartbeat_handler, HeartbeatRequest};
use warden::server::ErrorCode;

use common::{
    machine_count, make_state, seed_license, seed_machine, seed_user, setup_pool, API_KEY,
    SHARED_SECRET, USER_ID,
};

const FINGERPRINT: &str = "fp-aaaa-bbbb-cccc";

fn encrypt_payload(key: &str, machine_id: &str, ram: i64, cores: i64) -> String {
    let payload = json!({
        "machine_id": machine_id,
        "machine_name": "build-box",
        "ram": ram,
        "cores": cores,
    });

    crypto::encrypt(payload.to_string().as_bytes(), key).unwrap()
}

fn request(encrypted_data: Option<String>, use_session_key: Option<bool>) -> HeartbeatRequest {
    HeartbeatRequest {
        api_key: Some(API_KEY.to_string()),
        encrypted_data,
        use_session_key,
    }
}

#[tokio::test]
async fn successful_heartbeat_registers_machine_and_reports_license() {
    let pool = setup_pool().await;
    seed_user(&pool).await;

    let expires_at = Utc::now().naive_utc() + Duration::days(30);
    seed_license(&pool, Some(expires_at)).await;

    let state = make_state(&pool);
    let encrypted = encrypt_payload(SHARED_SECRET, FINGERPRINT, 32, 8);

    let response = heartbeat_handler(
        State(state),
        Json(request(Some(encrypted), Some(false))),
    )
    .await
    .expect("heartbeat should succeed");

    let plaintext = crypto::decrypt(&response.0.encrypted_data, SHARED_SECRET)
        .expect("response should decrypt with the request key");
    let report: HeartbeatReport = serde_json::from_slice(&plaintext).unwrap();

    assert_eq!(report.status_code, "SUCCESS");
    assert_eq!(report.license_info.expires_at, expires_at);
    assert_eq!(report.license_info.plan_type.as_deref(), Some("pro"));
    assert_eq!(report.machine_info.name, "build-box");

    assert_eq!(machine_count(&pool).await, 1);
}

#[tokio::test]
async fn fourth_machine_is_rejected_without_registration() {
    let pool = setup_pool().await;
    seed_user(&pool).await;
    seed_license(&pool, Some(Utc::now().naive_utc() + Duration::days(30))).await;

    seed_machine(&pool, "fp-1", "one").await;
    seed_machine(&pool, "fp-2", "two").await;
    seed_machine(&pool, "fp-3", "three").await;

    let state = make_state(&pool);
    let encrypted = encrypt_payload(SHARED_SECRET, "fp-4", 32, 8);

    let err = heartbeat_handler(State(state), Json(request(Some(encrypted), Some(false))))
        .await
        .expect_err("fourth machine must be rejected");

    assert_eq!(err.status_code, ErrorCode::MachineLimitExceeded);
    assert_eq!(machine_count(&pool).await, 3, "no row may be created");
}

#[tokio::test]
async fn registered_machine_resolves_even_at_the_cap() {
    let pool = setup_pool().await;
    seed_user(&pool).await;
    seed_license(&pool, Some(Utc::now().naive_utc() + Duration::days(30))).await;

    seed_machine(&pool, "fp-1", "one").await;
    seed_machine(&pool, "fp-2", "two").await;
    seed_machine(&pool, FINGERPRINT, "build-box").await;

    let state = make_state(&pool);
    let encrypted = encrypt_payload(SHARED_SECRET, FINGERPRINT, 16, 8);

    let response = heartbeat_handler(State(state), Json(request(Some(encrypted), Some(false))))
        .await
        .expect("known machine must pass despite the cap");

    let plaintext = crypto::decrypt(&response.0.encrypted_data, SHARED_SECRET).unwrap();
    let report: HeartbeatReport = serde_json::from_slice(&plaintext).unwrap();
    assert_eq!(report.status_code, "SUCCESS");
}

#[tokio::test]
async fn hardware_drift_is_persisted() {
    let pool = setup_pool().await;
    seed_user(&pool).await;
    seed_license(&pool, Some(Utc::now().naive_utc() + Duration::days(30))).await;

    let state = make_state(&pool);

    let first = encrypt_payload(SHARED_SECRET, FINGERPRINT, 16, 8);
    heartbeat_handler(State(state.clone()), Json(request(Some(first), Some(false))))
        .await
        .expect("first heartbeat should succeed");

    // RAM upgrade, same core count.
    let second = encrypt_payload(SHARED_SECRET, FINGERPRINT, 64, 8);
    heartbeat_handler(State(state), Json(request(Some(second), Some(false))))
        .await
        .expect("second heartbeat should succeed");

    let (ram, cores): (i64, i64) =
        sqlx::query_as("SELECT ram, cores FROM machines WHERE machine_id = ?")
            .bind(FINGERPRINT)
            .fetch_one(&pool)
            .await
            .unwrap();

    assert_eq!(ram, 64);
    assert_eq!(cores, 8);
    assert_eq!(machine_count(&pool).await, 1);
}

#[tokio::test]
async fn payload_missing_fields_is_malformed() {
    let pool = setup_pool().await;
    seed_user(&pool).await;
    seed_license(&pool, Some(Utc::now().naive_utc() + Duration::days(30))).await;

    let state = make_state(&pool);

    // Decrypts fine, but `cores` is absent.
    let partial = json!({
        "machine_id": FINGERPRINT,
        "machine_name": "build-box",
        "ram": 32,
    });
    let encrypted = crypto::encrypt(partial.to_string().as_bytes(), SHARED_SECRET).unwrap();

    let err = heartbeat_handler(State(state), Json(request(Some(encrypted), Some(false))))
        .await
        .expect_err("incomplete payload must be rejected");

    assert_eq!(err.status_code, ErrorCode::MalformedPayload);
    assert_eq!(machine_count(&pool).await, 0, "nothing may be registered");
}

#[tokio::test]
async fn missing_encrypted_data_fails_decryption() {
    let pool = setup_pool().await;
    seed_user(&pool).await;

    let state = make_state(&pool);

    let err = heartbeat_handler(State(state), Json(request(None, Some(false))))
        .await
        .expect_err("missing ciphertext must be rejected");

    assert_eq!(err.status_code, ErrorCode::DecryptionFailed);
}

#[tokio::test]
async fn wrong_key_fails_decryption() {
    let pool = setup_pool().await;
    seed_user(&pool).await;
    seed_license(&pool, Some(Utc::now().naive_utc() + Duration::days(30))).await;

    let state = make_state(&pool);
    let encrypted = encrypt_payload("some-other-secret", FINGERPRINT, 32, 8);

    let err = heartbeat_handler(State(state), Json(request(Some(encrypted), Some(false))))
        .await
        .expect_err("foreign ciphertext must be rejected");

    assert_eq!(err.status_code, ErrorCode::DecryptionFailed);
    assert_eq!(machine_count(&pool).await, 0);
}

#[tokio::test]
async fn shared_secret_fallback_leaves_session_key_intact() {
    let pool = setup_pool().await;
    seed_user(&pool).await;
    seed_license(&pool, Some(Utc::now().naive_utc() + Duration::days(30))).await;

    let state = make_state(&pool);

    // The server holds a session key, but the client encrypts with the
    // shared secret (e.g. it lost its negotiated key).
    let session_key = state.sessions.get_or_create(USER_ID);
    let encrypted = encrypt_payload(SHARED_SECRET, FINGERPRINT, 32, 8);

    let response = heartbeat_handler(
        State(state.clone()),
        Json(request(Some(encrypted), Some(true))),
    )
    .await
    .expect("fallback decryption should succeed");

    // Response comes back under the key that decrypted the request.
    let plaintext = crypto::decrypt(&response.0.encrypted_data, SHARED_SECRET)
        .expect("response must be encrypted with the shared secret");
    let report: HeartbeatReport = serde_json::from_slice(&plaintext).unwrap();
    assert_eq!(report.status_code, "SUCCESS");

    // The cached session key survives the fallback untouched.
    assert_eq!(state.sessions.get(USER_ID), Some(session_key));
}

#[tokio::test]
async fn default_heartbeat_mints_a_session_key() {
    let pool = setup_pool().await;
    seed_user(&pool).await;
    seed_license(&pool, Some(Utc::now().naive_utc() + Duration::days(30))).await;

    let state = make_state(&pool);
    assert!(state.sessions.is_empty());

    // No session key negotiated yet: the request still decrypts via the
    // shared-secret fallback, and key selection mints a key as a side effect.
    let encrypted = encrypt_payload(SHARED_SECRET, FINGERPRINT, 32, 8);
    heartbeat_handler(State(state.clone()), Json(request(Some(encrypted), None)))
        .await
        .expect("fallback heartbeat should succeed");

    assert!(
        state.sessions.get(USER_ID).is_some(),
        "a session key must now be cached for the user"
    );
}

#[tokio::test]
async fn session_key_heartbeat_round_trips() {
    let pool = setup_pool().await;
    seed_user(&pool).await;
    seed_license(&pool, Some(Utc::now().naive_utc() + Duration::days(30))).await;

    let state = make_state(&pool);
    let session_key = state.sessions.get_or_create(USER_ID);

    let encrypted = encrypt_payload(&session_key, FINGERPRINT, 32, 8);
    let response = heartbeat_handler(State(state), Json(request(Some(encrypted), Some(true))))
        .await
        .expect("session-key heartbeat should succeed");

    let plaintext = crypto::decrypt(&response.0.encrypted_data, &session_key)
        .expect("response must be encrypted with the session key");
    let report: HeartbeatReport = serde_json::from_slice(&plaintext).unwrap();
    assert_eq!(report.status_code, "SUCCESS");
}

#[tokio::test]
async fn expired_license_is_rejected() {
    let pool = setup_pool().await;
    seed_user(&pool).await;
    seed_license(&pool, Some(Utc::now().naive_utc() - Duration::days(1))).await;

    let state = make_state(&pool);
    let encrypted = encrypt_payload(SHARED_SECRET, FINGERPRINT, 32, 8);

    let err = heartbeat_handler(State(state), Json(request(Some(encrypted), Some(false))))
        .await
        .expect_err("expired license must be rejected");

    assert_eq!(err.status_code, ErrorCode::LicenseExpired);
    assert_eq!(err.message.as_deref(), Some("License has expired"));
}

#[tokio::test]
async fn license_without_expiry_is_rejected_as_expired() {
    let pool = setup_pool().await;
    seed_user(&pool).await;
    seed_license(&pool, None).await;

    let state = make_state(&pool);
    let encrypted = encrypt_payload(SHARED_SECRET, FINGERPRINT, 32, 8);

    let err = heartbeat_handler(State(state), Json(request(Some(encrypted), Some(false))))
        .await
        .expect_err("a license with no expiry must fail closed");

    assert_eq!(err.status_code, ErrorCode::LicenseExpired);
    assert_eq!(err.message.as_deref(), Some("License has expired"));
}

#[tokio::test]
async fn missing_license_is_rejected_with_the_same_code() {
    let pool = setup_pool().await;
    seed_user(&pool).await;

    let state = make_state(&pool);
    let encrypted = encrypt_payload(SHARED_SECRET, FINGERPRINT, 32, 8);

    let err = heartbeat_handler(State(state), Json(request(Some(encrypted), Some(false))))
        .await
        .expect_err("license-less user must be rejected");

    assert_eq!(err.status_code, ErrorCode::LicenseExpired);
    assert_eq!(err.message.as_deref(), Some("No license found for user"));
}

#[tokio::test]
async fn license_check_runs_after_registration() {
    // A new machine registers even when the license is expired: the row is
    // created first, then the license gate fires.
    let pool = setup_pool().await;
    seed_user(&pool).await;
    seed_license(&pool, Some(Utc::now().naive_utc() - Duration::days(1))).await;

    let state = make_state(&pool);
    let encrypted = encrypt_payload(SHARED_SECRET, FINGERPRINT, 32, 8);

    let err = heartbeat_handler(State(state), Json(request(Some(encrypted), Some(false))))
        .await
        .expect_err("expired license must be rejected");

    assert_eq!(err.status_code, ErrorCode::LicenseExpired);
    assert_eq!(machine_count(&pool).await, 1, "registration precedes the gate");
}

#[tokio::test]
async fn unknown_api_key_is_unauthorized() {
    let pool = setup_pool().await;
    seed_user(&pool).await;

    let state = make_state(&pool);
    let encrypted = encrypt_payload(SHARED_SECRET, FINGERPRINT, 32, 8);

    let err = heartbeat_handler(
        State(state),
        Json(HeartbeatRequest {
            api_key: Some("not-a-real-key".to_string()),
            encrypted_data: Some(encrypted),
            use_session_key: Some(false),
        }),
    )
    .await
    .expect_err("unknown key must be rejected");

    assert_eq!(err.status_code, ErrorCode::InvalidApiKey);
}
