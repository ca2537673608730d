//! PostgreSQL connection pooling

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connect to PostgreSQL and apply pending migrations.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    crate::MIGRATOR.run(&pool).await?;

    tracing::info!("connected to PostgreSQL and applied migrations");
    Ok(pool)
}
