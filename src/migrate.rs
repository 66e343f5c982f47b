use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // Passages: one row per stored chunk (or split-half part).
    // The unique key is what makes ingestion idempotent and safe to
    // resume; `part` is 0 except for the halves of an oversize-split
    // chunk, which share the parent's chunk_index.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS passages (
            id TEXT PRIMARY KEY,
            author TEXT NOT NULL,
            title TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            part INTEGER NOT NULL DEFAULT 0,
            content TEXT NOT NULL,
            embedding BLOB,
            model TEXT,
            dims INTEGER,
            domain TEXT,
            significance TEXT,
            source_work TEXT,
            hash TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(author, title, chunk_index, part)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Positions: atomic structured claims, never chunked.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS positions (
            position_id TEXT PRIMARY KEY,
            author TEXT NOT NULL,
            domain TEXT,
            topic TEXT,
            content TEXT NOT NULL,
            embedding BLOB,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_passages_author ON passages(author)")
        .execute(&pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_passages_document ON passages(author, title, chunk_index)",
    )
    .execute(&pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_positions_author ON positions(author)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}
