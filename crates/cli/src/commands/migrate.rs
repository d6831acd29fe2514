//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! cart-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `CART_DATABASE_URL` - `PostgreSQL` connection string for the remote cart
//!   store (falls back to `DATABASE_URL`)
//!
//! Migrations live in `crates/engine/migrations/`.

use cart_sync::{ConfigError, EngineConfig, PgRemoteStore};

/// Errors from running migrations.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Remote store error: {0}")]
    Remote(#[from] cart_sync::RemoteError),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run the remote cart store migrations.
///
/// # Errors
///
/// Returns `MigrationError` if no database is configured, the connection
/// fails, or a migration fails.
pub async fn run(config: &EngineConfig) -> Result<(), MigrationError> {
    let database_url = config
        .database_url
        .as_ref()
        .ok_or_else(|| ConfigError::MissingEnvVar("CART_DATABASE_URL".to_string()))?;

    tracing::info!("Connecting to cart database...");
    let store = PgRemoteStore::connect(database_url).await?;

    tracing::info!("Running cart migrations...");
    sqlx::migrate!("../engine/migrations").run(store.pool()).await?;

    tracing::info!("Cart migrations complete!");
    Ok(())
}
