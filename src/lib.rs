//! Warden - a heartbeat-based license enforcement server
//!
//! Clients periodically send an authenticated, encrypted heartbeat proving
//! they run on a registered machine with an unexpired license. Payloads are
//! protected with an OpenSSL-compatible symmetric cipher; the bulk of traffic
//! is encrypted under short-lived per-user session keys negotiated over the
//! long-lived shared secret.
//!
//! # Features
//!
//! Warden uses feature flags to allow you to include only what you need:
//!
//! - `server` - Server components (handlers, database). Enabled by default.
//! - `sqlite` - SQLite database backend. Enabled by default.
//! - `postgres` - PostgreSQL database backend.
//! - `background-jobs` - Scheduled session key sweep. Enabled by default.
//!
//! # Example
//!
//! ```toml
//! # Use defaults (server + sqlite + background-jobs)
//! warden = "0.1"
//!
//! # Client-only (no server components)
//! warden = { version = "0.1", default-features = false }
//! ```

// Core modules (always available)
pub mod config;
pub mod crypto;
pub mod errors;
pub mod session;

// Client-related modules (always available)
pub mod client {
    pub mod hardware;
    pub mod heartbeat;
    pub mod key_exchange;
    pub mod responses;
}

// Server-related modules (requires "server" feature)
#[cfg(feature = "server")]
pub mod server;

// Background jobs (requires "background-jobs" feature)
#[cfg(feature = "background-jobs")]
pub mod jobs;
