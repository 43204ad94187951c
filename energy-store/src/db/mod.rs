pub mod ledger_queries;
pub mod sample_queries;
pub mod schema;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// Single-connection in-memory database with the given schemas applied.
///
/// An in-memory SQLite database lives only as long as its connection, so the pool
/// is pinned to exactly one connection that never expires.
pub async fn memory_pool(schemas: &[&[&str]]) -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    for statements in schemas {
        schema::apply(&pool, statements).await?;
    }

    Ok(pool)
}
