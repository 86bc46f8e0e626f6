use sqlx::SqlitePool;

use crate::error::Result;

/// Create the index artifact schema if it does not exist yet.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Key/value header: document name, model, dims, raw content.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            chunk_index INTEGER PRIMARY KEY,
            document_name TEXT NOT NULL,
            text TEXT NOT NULL,
            source_file_path TEXT NOT NULL,
            start_char INTEGER NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
