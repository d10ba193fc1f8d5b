//! Shared fixtures: in-memory SQLite with the production schema, plus seeded
//! rows and a ready-to-use handler state.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDateTime;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use warden::server::{AppState, Database};
use warden::session::SessionKeyStore;

pub const SHARED_SECRET: &str = "test-shared-secret";
pub const API_KEY: &str = "wdn_test_key_0001";
pub const USER_ID: &str = "user-0001";
pub const MACHINE_LIMIT: u32 = 3;

/// Fresh in-memory database with the production schema applied.
///
/// A single connection keeps every query on the same in-memory instance.
pub async fn setup_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory SQLite should connect");

    sqlx::query(
        "CREATE TABLE users (
            id TEXT PRIMARY KEY,
            api_key TEXT NOT NULL UNIQUE,
            username TEXT,
            email TEXT
        )",
    )
    .execute(&pool)
    .await
    .expect("users schema should apply");

    sqlx::query(
        "CREATE TABLE machines (
            id TEXT PRIMARY KEY,
            machine_id TEXT NOT NULL,
            api_key TEXT NOT NULL,
            name TEXT NOT NULL,
            ram INTEGER NOT NULL,
            cores INTEGER NOT NULL,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            UNIQUE (api_key, machine_id)
        )",
    )
    .execute(&pool)
    .await
    .expect("machines schema should apply");

    sqlx::query(
        "CREATE TABLE licenses (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            plan_type TEXT,
            expires_at TIMESTAMP
        )",
    )
    .execute(&pool)
    .await
    .expect("licenses schema should apply");

    pool
}

/// Handler state wrapping `pool`, with the default test secret and cap.
pub fn make_state(pool: &SqlitePool) -> AppState {
    AppState {
        db: Arc::new(Database::SQLite(pool.clone())),
        sessions: Arc::new(SessionKeyStore::new()),
        shared_secret: SHARED_SECRET.to_string(),
        machine_limit: MACHINE_LIMIT,
    }
}

/// Insert the default test user.
pub async fn seed_user(pool: &SqlitePool) {
    seed_user_with(pool, USER_ID, API_KEY, Some("alice")).await;
}

pub async fn seed_user_with(
    pool: &SqlitePool,
    user_id: &str,
    api_key: &str,
    username: Option<&str>,
) {
    sqlx::query("INSERT INTO users (id, api_key, username, email) VALUES (?, ?, ?, ?)")
        .bind(user_id)
        .bind(api_key)
        .bind(username)
        .bind(username.map(|u| format!("{u}@example.com")))
        .execute(pool)
        .await
        .expect("user should insert");
}

/// Insert a license for the default test user.
pub async fn seed_license(pool: &SqlitePool, expires_at: Option<NaiveDateTime>) {
    sqlx::query("INSERT INTO licenses (id, user_id, plan_type, expires_at) VALUES (?, ?, ?, ?)")
        .bind(Uuid::new_v4().to_string())
        .bind(USER_ID)
        .bind("pro")
        .bind(expires_at)
        .execute(pool)
        .await
        .expect("license should insert");
}

/// Insert a machine row directly, bypassing the registration path.
pub async fn seed_machine(pool: &SqlitePool, machine_id: &str, name: &str) {
    let now = chrono::Utc::now().naive_utc();

    sqlx::query(
        "INSERT INTO machines (id, machine_id, api_key, name, ram, cores, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(machine_id)
    .bind(API_KEY)
    .bind(name)
    .bind(16i64)
    .bind(8i64)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .expect("machine should insert");
}

/// Count machine rows for the default API key.
pub async fn machine_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM machines WHERE api_key = ?")
        .bind(API_KEY)
        .fetch_one(pool)
        .await
        .expect("count should succeed")
}
