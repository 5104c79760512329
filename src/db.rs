//! Postgres connection management.
//!
//! Builds a connection pool from [`DbConfig`]. The pool is owned by the
//! caller (the CLI entry point) and handed to [`crate::pg_store::PgStore`];
//! the store itself never opens connections.

use anyhow::{bail, Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};

use crate::config::DbConfig;

/// Open a connection pool against the configured Postgres instance.
pub async fn connect(db: &DbConfig) -> Result<PgPool> {
    let ssl_mode = match db.sslmode.as_str() {
        "disable" => PgSslMode::Disable,
        "prefer" => PgSslMode::Prefer,
        "require" => PgSslMode::Require,
        other => bail!("Unknown DB_SSLMODE: {}", other),
    };

    let options = PgConnectOptions::new()
        .host(&db.host)
        .port(db.port)
        .database(&db.name)
        .username(&db.user)
        .password(&db.password)
        .ssl_mode(ssl_mode);

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| {
            format!(
                "Failed to connect to Postgres at {}:{}/{}",
                db.host, db.port, db.name
            )
        })?;

    Ok(pool)
}
