use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use vibesense_core::config::PostgresConfig;

use crate::error::StoreError;

/// Connect to PostgreSQL and apply pending migrations.
pub async fn init_pg_pool(config: &PostgresConfig) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.connection_string())
        .await?;
    info!(host = %config.host, db = %config.database, "PostgreSQL connected");

    sqlx::migrate!("../../migrations").run(&pool).await?;
    info!("Database migrations applied successfully");

    Ok(pool)
}
