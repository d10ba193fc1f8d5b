use chrono::{NaiveDateTime, Utc};
use sqlx::{query, query_as, query_scalar, FromRow};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

#[cfg(feature = "sqlite")]
use sqlx::SqlitePool;

#[cfg(feature = "postgres")]
use sqlx::PgPool;

use crate::config::get_config;
use crate::errors::{WardenError, WardenResult};

/// A user record as stored in the `users` table.
///
/// Users are owned by an external provisioning flow; this core only reads
/// them, keyed by API key.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub api_key: String,
    pub username: Option<String>,
    pub email: Option<String>,
}

impl User {
    /// Display name for responses: username, falling back to email, then a
    /// generic label.
    pub fn display_name(&self) -> String {
        self.username
            .clone()
            .or_else(|| self.email.clone())
            .unwrap_or_else(|| "User".to_string())
    }
}

/// A registered machine as stored in the `machines` table.
///
/// `machine_id` is the client-generated hardware fingerprint; the pair
/// (`api_key`, `machine_id`) is unique.
#[derive(Debug, Clone, FromRow)]
pub struct Machine {
    pub id: String,
    pub machine_id: String,
    pub api_key: String,
    pub name: String,
    pub ram: i64,
    pub cores: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Fields for inserting a new machine row.
#[derive(Debug, Clone)]
pub struct NewMachine {
    pub machine_id: String,
    pub api_key: String,
    pub name: String,
    pub ram: i64,
    pub cores: i64,
}

/// A license record as stored in the `licenses` table.
///
/// `expires_at` is nullable; a missing expiry means no license was issued and
/// is treated as expired by the validator.
#[derive(Debug, Clone, FromRow)]
pub struct License {
    pub id: String,
    pub user_id: String,
    pub plan_type: Option<String>,
    pub expires_at: Option<NaiveDateTime>,
}

/// Unified database abstraction over SQLite and Postgres.
///
/// Available variants depend on enabled features:
/// - `sqlite` feature enables `Database::SQLite`
/// - `postgres` feature enables `Database::Postgres`
#[derive(Debug, Clone)]
pub enum Database {
    #[cfg(feature = "sqlite")]
    SQLite(SqlitePool),
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
}

impl Database {
    /// Initialize the database connection based on configuration.
    ///
    /// Uses the global configuration from `config.toml` and environment
    /// variables. See `crate::config` for configuration options.
    pub async fn new() -> WardenResult<Arc<Self>> {
        let config = get_config()?;
        let db_config = &config.database;

        match db_config.db_type.as_str() {
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                let pool = SqlitePool::connect(&db_config.sqlite_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to SQLite: {e}");
                        WardenError::DatabaseError(format!("failed to connect to SQLite: {e}"))
                    })?;

                Ok(Arc::new(Database::SQLite(pool)))
            }
            #[cfg(not(feature = "sqlite"))]
            "sqlite" => Err(WardenError::ConfigError(
                "SQLite support not compiled in. Enable the 'sqlite' feature.".to_string(),
            )),
            #[cfg(feature = "postgres")]
            "postgres" => {
                let pool = PgPool::connect(&db_config.postgres_url).await.map_err(|e| {
                    error!("Failed to connect to PostgreSQL: {e}");
                    WardenError::DatabaseError(format!("failed to connect to PostgreSQL: {e}"))
                })?;

                Ok(Arc::new(Database::Postgres(pool)))
            }
            #[cfg(not(feature = "postgres"))]
            "postgres" => Err(WardenError::ConfigError(
                "PostgreSQL support not compiled in. Enable the 'postgres' feature.".to_string(),
            )),
            other => Err(WardenError::ConfigError(format!(
                "unsupported database type: {other}"
            ))),
        }
    }

    /// Fetch a user by API key.
    ///
    /// Returns:
    /// - `Ok(Some(User))` if found
    /// - `Ok(None)` if no user carries that key
    /// - `Err(WardenError::DatabaseError)` on DB failure
    pub async fn find_user_by_api_key(&self, api_key: &str) -> WardenResult<Option<User>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let user = query_as::<_, User>("SELECT * FROM users WHERE api_key = ?")
                    .bind(api_key)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| {
                        error!("SQLite find_user_by_api_key failed: {e}");
                        WardenError::DatabaseError(format!("database error: {e}"))
                    })?;

                Ok(user)
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let user = query_as::<_, User>("SELECT * FROM users WHERE api_key = $1")
                    .bind(api_key)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| {
                        error!("Postgres find_user_by_api_key failed: {e}");
                        WardenError::DatabaseError(format!("database error: {e}"))
                    })?;

                Ok(user)
            }
        }
    }

    /// Fetch a machine by its (api_key, machine_id) natural key.
    pub async fn find_machine(
        &self,
        api_key: &str,
        machine_id: &str,
    ) -> WardenResult<Option<Machine>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let machine = query_as::<_, Machine>(
                    "SELECT * FROM machines WHERE api_key = ? AND machine_id = ?",
                )
                .bind(api_key)
                .bind(machine_id)
                .fetch_optional(pool)
                .await
                .map_err(|e| {
                    error!("SQLite find_machine failed: {e}");
                    WardenError::DatabaseError(format!("database error: {e}"))
                })?;

                Ok(machine)
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let machine = query_as::<_, Machine>(
                    "SELECT * FROM machines WHERE api_key = $1 AND machine_id = $2",
                )
                .bind(api_key)
                .bind(machine_id)
                .fetch_optional(pool)
                .await
                .map_err(|e| {
                    error!("Postgres find_machine failed: {e}");
                    WardenError::DatabaseError(format!("database error: {e}"))
                })?;

                Ok(machine)
            }
        }
    }

    /// Count machine rows for an API key.
    pub async fn count_machines(&self, api_key: &str) -> WardenResult<i64> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let count: i64 =
                    query_scalar("SELECT COUNT(*) FROM machines WHERE api_key = ?")
                        .bind(api_key)
                        .fetch_one(pool)
                        .await
                        .map_err(|e| {
                            error!("SQLite count_machines failed: {e}");
                            WardenError::DatabaseError(format!("database error: {e}"))
                        })?;

                Ok(count)
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let count: i64 =
                    query_scalar("SELECT COUNT(*) FROM machines WHERE api_key = $1")
                        .bind(api_key)
                        .fetch_one(pool)
                        .await
                        .map_err(|e| {
                            error!("Postgres count_machines failed: {e}");
                            WardenError::DatabaseError(format!("database error: {e}"))
                        })?;

                Ok(count)
            }
        }
    }

    /// Insert a new machine row and return it.
    ///
    /// The row id is generated here; timestamps are set to now. The UNIQUE
    /// (api_key, machine_id) constraint rejects duplicate fingerprints.
    pub async fn create_machine(&self, new: NewMachine) -> WardenResult<Machine> {
        let now = Utc::now().naive_utc();
        let machine = Machine {
            id: Uuid::new_v4().to_string(),
            machine_id: new.machine_id,
            api_key: new.api_key,
            name: new.name,
            ram: new.ram,
            cores: new.cores,
            created_at: now,
            updated_at: now,
        };

        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query(
                    r#"
                    INSERT INTO machines (
                        id, machine_id, api_key, name, ram, cores, created_at, updated_at
                    )
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&machine.id)
                .bind(&machine.machine_id)
                .bind(&machine.api_key)
                .bind(&machine.name)
                .bind(machine.ram)
                .bind(machine.cores)
                .bind(machine.created_at)
                .bind(machine.updated_at)
                .execute(pool)
                .await
                .map_err(|e| {
                    error!("SQLite create_machine failed: {e}");
                    WardenError::DatabaseError(format!("database error: {e}"))
                })?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query(
                    r#"
                    INSERT INTO machines (
                        id, machine_id, api_key, name, ram, cores, created_at, updated_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                )
                .bind(&machine.id)
                .bind(&machine.machine_id)
                .bind(&machine.api_key)
                .bind(&machine.name)
                .bind(machine.ram)
                .bind(machine.cores)
                .bind(machine.created_at)
                .bind(machine.updated_at)
                .execute(pool)
                .await
                .map_err(|e| {
                    error!("Postgres create_machine failed: {e}");
                    WardenError::DatabaseError(format!("database error: {e}"))
                })?;
            }
        }

        Ok(machine)
    }

    /// Update hardware fields on a machine row, touching only the fields
    /// supplied plus `updated_at`, and return the refreshed row.
    ///
    /// `None` leaves a field as stored (COALESCE against the bind).
    pub async fn update_machine_hardware(
        &self,
        api_key: &str,
        machine_id: &str,
        ram: Option<i64>,
        cores: Option<i64>,
    ) -> WardenResult<Option<Machine>> {
        let now = Utc::now().naive_utc();

        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query(
                    "UPDATE machines \
                     SET ram = COALESCE(?, ram), \
                         cores = COALESCE(?, cores), \
                         updated_at = ? \
                     WHERE api_key = ? AND machine_id = ?",
                )
                .bind(ram)
                .bind(cores)
                .bind(now)
                .bind(api_key)
                .bind(machine_id)
                .execute(pool)
                .await
                .map_err(|e| {
                    error!("SQLite update_machine_hardware failed: {e}");
                    WardenError::DatabaseError(format!("database error: {e}"))
                })?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query(
                    "UPDATE machines \
                     SET ram = COALESCE($1, ram), \
                         cores = COALESCE($2, cores), \
                         updated_at = $3 \
                     WHERE api_key = $4 AND machine_id = $5",
                )
                .bind(ram)
                .bind(cores)
                .bind(now)
                .bind(api_key)
                .bind(machine_id)
                .execute(pool)
                .await
                .map_err(|e| {
                    error!("Postgres update_machine_hardware failed: {e}");
                    WardenError::DatabaseError(format!("database error: {e}"))
                })?;
            }
        }

        self.find_machine(api_key, machine_id).await
    }

    /// Fetch a user's license row.
    pub async fn find_license_by_user_id(&self, user_id: &str) -> WardenResult<Option<License>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let license = query_as::<_, License>("SELECT * FROM licenses WHERE user_id = ?")
                    .bind(user_id)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| {
                        error!("SQLite find_license_by_user_id failed: {e}");
                        WardenError::DatabaseError(format!("database error: {e}"))
                    })?;

                Ok(license)
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let license = query_as::<_, License>("SELECT * FROM licenses WHERE user_id = $1")
                    .bind(user_id)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| {
                        error!("Postgres find_license_by_user_id failed: {e}");
                        WardenError::DatabaseError(format!("database error: {e}"))
                    })?;

                Ok(license)
            }
        }
    }
}
