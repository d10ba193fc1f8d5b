//! Server-side components: database access, authentication, the machine
//! registry, license validation, and the HTTP handlers that tie them
//! together.

pub mod api_error;
pub mod auth;
pub mod database;
pub mod handlers;
pub mod licenses;
pub mod machines;
pub mod routes;

pub use api_error::{ApiError, ErrorCode};
pub use database::Database;
pub use handlers::AppState;
pub use routes::build_router;
