//! SQLite-backed [`VectorStore`] implementation.
//!
//! Vectors are stored as little-endian f32 BLOBs and compared with
//! brute-force cosine similarity in Rust; corpora in the hundreds of
//! thousands of passages scan in well under a second, which is far from
//! the bottleneck next to the embedding API. Insert-if-absent rides on
//! `ON CONFLICT DO NOTHING` against the unique key, so concurrent
//! writers cannot duplicate a passage.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{InsertOutcome, Passage, PositionRecord};

use super::{PassageFilter, PassageHit, PassageText, PositionHit, PositionText, VectorStore};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_passage_text(row: &sqlx::sqlite::SqliteRow) -> PassageText {
    PassageText {
        id: row.get("id"),
        author: row.get("author"),
        title: row.get("title"),
        chunk_index: row.get("chunk_index"),
        content: row.get("content"),
        significance: row.get("significance"),
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn insert_passage(&self, passage: &Passage) -> Result<InsertOutcome> {
        let now = chrono::Utc::now().timestamp();
        let blob = passage.embedding.as_ref().map(|v| vec_to_blob(v));

        let result = sqlx::query(
            r#"
            INSERT INTO passages
                (id, author, title, chunk_index, part, content, embedding,
                 model, dims, domain, significance, source_work, hash, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(author, title, chunk_index, part) DO NOTHING
            "#,
        )
        .bind(&passage.id)
        .bind(&passage.author)
        .bind(&passage.title)
        .bind(passage.chunk_index)
        .bind(passage.part)
        .bind(&passage.content)
        .bind(blob)
        .bind(&passage.model)
        .bind(passage.dims.map(|d| d as i64))
        .bind(&passage.domain)
        .bind(&passage.significance)
        .bind(&passage.source_work)
        .bind(&passage.hash)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::AlreadyExists)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    async fn distinct_indices(&self, author: &str, title: &str) -> Result<Vec<i64>> {
        let rows = sqlx::query_scalar(
            "SELECT DISTINCT chunk_index FROM passages \
             WHERE author = ? AND title = ? ORDER BY chunk_index",
        )
        .bind(author)
        .bind(title)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn count_passages(&self, author: &str, title: &str) -> Result<i64> {
        let count =
            sqlx::query_scalar("SELECT COUNT(*) FROM passages WHERE author = ? AND title = ?")
                .bind(author)
                .bind(title)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    async fn nearest_passages(
        &self,
        query: &[f32],
        filter: PassageFilter<'_>,
        k: usize,
    ) -> Result<Vec<PassageHit>> {
        let rows = sqlx::query(
            r#"
            SELECT id, author, title, chunk_index, content, significance, embedding
            FROM passages
            WHERE embedding IS NOT NULL
              AND (? IS NULL OR author = ?)
              AND (? IS NULL OR significance = ?)
            ORDER BY author, title, chunk_index, part
            "#,
        )
        .bind(filter.author)
        .bind(filter.author)
        .bind(filter.significance)
        .bind(filter.significance)
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<PassageHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                PassageHit {
                    passage: row_to_passage_text(row),
                    similarity: cosine_similarity(query, &vec) as f64,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);

        Ok(hits)
    }

    async fn keyword_candidates(&self, author: &str) -> Result<Vec<PassageText>> {
        let rows = sqlx::query(
            r#"
            SELECT id, author, title, chunk_index, content, significance
            FROM passages
            WHERE author = ?
            ORDER BY title, chunk_index, part
            "#,
        )
        .bind(author)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_passage_text).collect())
    }

    async fn insert_position(&self, position: &PositionRecord) -> Result<InsertOutcome> {
        let now = chrono::Utc::now().timestamp();
        let blob = position.embedding.as_ref().map(|v| vec_to_blob(v));

        let result = sqlx::query(
            r#"
            INSERT INTO positions
                (position_id, author, domain, topic, content, embedding, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(position_id) DO NOTHING
            "#,
        )
        .bind(&position.position_id)
        .bind(&position.author)
        .bind(&position.domain)
        .bind(&position.topic)
        .bind(&position.content)
        .bind(blob)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::AlreadyExists)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    async fn position_exists(&self, position_id: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM positions WHERE position_id = ?")
                .bind(position_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count > 0)
    }

    async fn nearest_positions(
        &self,
        query: &[f32],
        author: Option<&str>,
        k: usize,
    ) -> Result<Vec<PositionHit>> {
        let rows = sqlx::query(
            r#"
            SELECT position_id, author, topic, content, embedding
            FROM positions
            WHERE embedding IS NOT NULL
              AND (? IS NULL OR author = ?)
            ORDER BY created_at, position_id
            "#,
        )
        .bind(author)
        .bind(author)
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<PositionHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                PositionHit {
                    position: PositionText {
                        position_id: row.get("position_id"),
                        author: row.get("author"),
                        topic: row.get("topic"),
                        content: row.get("content"),
                    },
                    similarity: cosine_similarity(query, &vec) as f64,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);

        Ok(hits)
    }

    async fn positions_for_author(&self, author: &str) -> Result<Vec<PositionText>> {
        let rows = sqlx::query(
            "SELECT position_id, author, topic, content FROM positions \
             WHERE author = ? ORDER BY created_at, position_id",
        )
        .bind(author)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| PositionText {
                position_id: row.get("position_id"),
                author: row.get("author"),
                topic: row.get("topic"),
                content: row.get("content"),
            })
            .collect())
    }

    async fn clear_author(&self, author: &str) -> Result<u64> {
        let passages = sqlx::query("DELETE FROM passages WHERE author = ?")
            .bind(author)
            .execute(&self.pool)
            .await?;
        let positions = sqlx::query("DELETE FROM positions WHERE author = ?")
            .bind(author)
            .execute(&self.pool)
            .await?;

        Ok(passages.rows_affected() + positions.rows_affected())
    }

    async fn clear_document(&self, author: &str, title: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM passages WHERE author = ? AND title = ?")
            .bind(author)
            .bind(title)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
