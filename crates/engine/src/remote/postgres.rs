//! `PostgreSQL`-backed remote cart store.
//!
//! # Table: `storefront.cart_snapshot`
//!
//! One row per identity. `snapshot` holds the full cart as JSONB; `version`
//! mirrors the snapshot's logical clock for inspection.
//!
//! Migrations are stored in `crates/engine/migrations/` and run via:
//! ```bash
//! cargo run -p cart-sync-cli -- migrate
//! ```

use std::time::Duration;

use cart_sync_core::{CartSnapshot, UserId};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use tracing::{debug, instrument};

use super::{RemoteCartStore, RemoteError};

/// Remote cart store backed by the storefront database.
#[derive(Debug, Clone)]
pub struct PgRemoteStore {
    pool: PgPool,
}

impl PgRemoteStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a small pool suited to a single cart engine.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Database` if the connection cannot be established.
    pub async fn connect(database_url: &secrecy::SecretString) -> Result<Self, RemoteError> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url.expose_secret())
            .await?;
        Ok(Self::new(pool))
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl RemoteCartStore for PgRemoteStore {
    #[instrument(skip(self), fields(user_id = %identity))]
    async fn fetch(&self, identity: UserId) -> Result<CartSnapshot, RemoteError> {
        let row: Option<(Json<CartSnapshot>,)> = sqlx::query_as(
            r"
            SELECT snapshot
            FROM storefront.cart_snapshot
            WHERE user_id = $1
            ",
        )
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;

        let snapshot = row.map(|(Json(snapshot),)| snapshot).unwrap_or_default();
        debug!(lines = snapshot.len(), version = snapshot.version(), "Fetched remote cart");
        Ok(snapshot)
    }

    #[instrument(skip(self, snapshot), fields(user_id = %identity, version = snapshot.version()))]
    async fn replace(&self, identity: UserId, snapshot: &CartSnapshot) -> Result<(), RemoteError> {
        let version = i64::try_from(snapshot.version()).unwrap_or(i64::MAX);

        sqlx::query(
            r"
            INSERT INTO storefront.cart_snapshot (user_id, snapshot, version, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (user_id) DO UPDATE
            SET snapshot = EXCLUDED.snapshot,
                version = EXCLUDED.version,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(identity)
        .bind(Json(snapshot))
        .bind(version)
        .execute(&self.pool)
        .await?;

        debug!(lines = snapshot.len(), "Replaced remote cart");
        Ok(())
    }
}
