use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::config::DatabaseConfig;

/// Connects with exponential backoff; gives up after `connect_retries` attempts.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    let retry_strategy = ExponentialBackoff::from_millis(config.retry_delay_ms.max(1))
        .max_delay(Duration::from_secs(10))
        .map(jitter)
        .take(config.connect_retries);

    let result = Retry::spawn(retry_strategy, || {
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
    })
    .await;

    if let Err(e) = &result {
        tracing::error!(
            attempts = config.connect_retries,
            error = %e,
            "All database connection attempts failed"
        );
    }
    result
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
