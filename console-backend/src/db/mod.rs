//! Database layer for cost and utilization data.
//!
//! The schema is passive: rows are written by the cost ingestion job and by an external
//! utilization exporter, and read back by the cost and utilization resolvers.
//!
//! - [`handlers`]: Postgres implementations of [`crate::costs::CostStore`] and
//!   [`crate::utilization::UtilizationStore`]
//! - [`models`]: Database record structures matching table schemas
//! - [`errors`]: Database-specific error types

pub mod errors;
pub mod handlers;
pub mod models;

use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::config::DatabaseConfig;

/// Create a connection pool. Connections are opened lazily on first use.
pub fn create_pool(config: &DatabaseConfig) -> errors::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_lazy(&config.url)?;
    Ok(pool)
}

/// Apply embedded migrations.
pub async fn migrate(pool: &PgPool) -> errors::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
