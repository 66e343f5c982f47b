//! Storage abstraction for the corpus.
//!
//! The [`VectorStore`] trait defines every operation the ingestion
//! coordinator and the retrieval side need, enabling pluggable backends:
//! SQLite for production, in-memory for tests.
//!
//! The store is the durable source of truth for resumability: which
//! chunk indices of a document already exist is answered here, never
//! from in-process state, so an interrupted run loses no progress. The
//! unique key `(author, title, chunk_index, part)` is also the last
//! line of defense against duplicate inserts from racing writers.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{InsertOutcome, Passage, PositionRecord};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Identity and content of a stored passage, without score.
#[derive(Debug, Clone)]
pub struct PassageText {
    pub id: String,
    pub author: String,
    pub title: String,
    pub chunk_index: i64,
    pub content: String,
    pub significance: Option<String>,
}

/// A passage candidate from vector search, with its similarity score.
#[derive(Debug, Clone)]
pub struct PassageHit {
    pub passage: PassageText,
    /// Cosine similarity to the query vector, in `[-1.0, 1.0]`.
    pub similarity: f64,
}

/// Identity and content of a stored position, without score.
#[derive(Debug, Clone)]
pub struct PositionText {
    pub position_id: String,
    pub author: String,
    pub topic: Option<String>,
    pub content: String,
}

/// A position candidate from vector search, with its similarity score.
#[derive(Debug, Clone)]
pub struct PositionHit {
    pub position: PositionText,
    pub similarity: f64,
}

/// Exact metadata filters for passage vector search.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassageFilter<'a> {
    pub author: Option<&'a str>,
    pub significance: Option<&'a str>,
}

/// Abstract storage backend.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert a passage if `(author, title, chunk_index, part)` is not
    /// already present. A conflict is reported as
    /// [`InsertOutcome::AlreadyExists`], never as an error.
    async fn insert_passage(&self, passage: &Passage) -> Result<InsertOutcome>;

    /// Distinct chunk indices stored for a document, ascending.
    async fn distinct_indices(&self, author: &str, title: &str) -> Result<Vec<i64>>;

    /// Number of passage rows stored for a document (parts counted).
    async fn count_passages(&self, author: &str, title: &str) -> Result<i64>;

    /// Nearest passages by cosine similarity, best first. Passages
    /// without embeddings are not candidates.
    async fn nearest_passages(
        &self,
        query: &[f32],
        filter: PassageFilter<'_>,
        k: usize,
    ) -> Result<Vec<PassageHit>>;

    /// All passages for an author in corpus order
    /// `(title, chunk_index, part)`: the candidate set for keyword-mode
    /// ranking, embeddings not required.
    async fn keyword_candidates(&self, author: &str) -> Result<Vec<PassageText>>;

    /// Insert a position if its id is not already present.
    async fn insert_position(&self, position: &PositionRecord) -> Result<InsertOutcome>;

    async fn position_exists(&self, position_id: &str) -> Result<bool>;

    /// Nearest positions by cosine similarity, best first, optionally
    /// restricted to one author.
    async fn nearest_positions(
        &self,
        query: &[f32],
        author: Option<&str>,
        k: usize,
    ) -> Result<Vec<PositionHit>>;

    /// All positions for an author in insertion order (keyword-mode
    /// candidates).
    async fn positions_for_author(&self, author: &str) -> Result<Vec<PositionText>>;

    /// Delete everything stored for an author (passages and positions).
    /// Returns the number of rows removed.
    async fn clear_author(&self, author: &str) -> Result<u64>;

    /// Delete the passages of a single document. Returns the number of
    /// rows removed.
    async fn clear_document(&self, author: &str, title: &str) -> Result<u64>;
}
