//! Corpus statistics and health overview.
//!
//! A quick summary of what's ingested: passage and position counts,
//! embedding coverage, and per-author breakdowns. Used by
//! `corpus stats` to give confidence that ingestion runs are landing
//! where they should.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

struct AuthorStats {
    author: String,
    doc_count: i64,
    passage_count: i64,
    embedded_count: i64,
    position_count: i64,
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_passages: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM passages")
        .fetch_one(&pool)
        .await?;
    let total_embedded: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM passages WHERE embedding IS NOT NULL")
            .fetch_one(&pool)
            .await?;
    let total_positions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM positions")
        .fetch_one(&pool)
        .await?;
    let total_docs: i64 =
        sqlx::query_scalar("SELECT COUNT(DISTINCT author || '/' || title) FROM passages")
            .fetch_one(&pool)
            .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Corpus Harness — Database Stats");
    println!("===============================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", total_docs);
    println!("  Passages:    {}", total_passages);
    println!(
        "  Embedded:    {} / {} ({}%)",
        total_embedded,
        total_passages,
        if total_passages > 0 {
            (total_embedded * 100) / total_passages
        } else {
            0
        }
    );
    println!("  Positions:   {}", total_positions);

    let rows = sqlx::query(
        r#"
        SELECT
            author,
            COUNT(DISTINCT title) AS doc_count,
            COUNT(*) AS passage_count,
            COUNT(embedding) AS embedded_count
        FROM passages
        GROUP BY author
        ORDER BY passage_count DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let position_rows =
        sqlx::query("SELECT author, COUNT(*) AS position_count FROM positions GROUP BY author")
            .fetch_all(&pool)
            .await?;

    let mut author_stats: Vec<AuthorStats> = Vec::new();
    for row in &rows {
        let author: String = row.get("author");
        let position_count = position_rows
            .iter()
            .find(|pr| {
                let pr_author: String = pr.get("author");
                pr_author == author
            })
            .map(|pr| pr.get::<i64, _>("position_count"))
            .unwrap_or(0);

        author_stats.push(AuthorStats {
            author,
            doc_count: row.get("doc_count"),
            passage_count: row.get("passage_count"),
            embedded_count: row.get("embedded_count"),
            position_count,
        });
    }

    if !author_stats.is_empty() {
        println!();
        println!("  By author:");
        println!(
            "  {:<20} {:>6} {:>9} {:>9} {:>10}",
            "AUTHOR", "DOCS", "PASSAGES", "EMBEDDED", "POSITIONS"
        );
        println!("  {}", "-".repeat(60));

        for s in &author_stats {
            println!(
                "  {:<20} {:>6} {:>9} {:>9} {:>10}",
                s.author, s.doc_count, s.passage_count, s.embedded_count, s.position_count
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
