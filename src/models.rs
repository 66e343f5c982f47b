//! Core data models for the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};

/// A named unit of raw text to be ingested. Identified by
/// `(author, title)`; immutable once stored.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub author: String,
    pub title: String,
    pub domain: Option<String>,
    pub significance: Option<String>,
    pub source_work: Option<String>,
    pub body: String,
}

/// A stored passage: one chunk of a document plus its embedding and
/// metadata.
///
/// Uniqueness is `(author, title, chunk_index, part)`. `part` is 0 for
/// ordinary chunks; the two halves of an oversize-split chunk are stored
/// as parts 0 and 1 under the parent's index, so completeness checks
/// stay keyed on distinct `chunk_index` values forming `{0..N-1}`.
///
/// `embedding` is `None` for keyword-only corpora ingested with the
/// provider disabled; such passages are still reachable in keyword mode.
#[derive(Debug, Clone)]
pub struct Passage {
    pub id: String,
    pub author: String,
    pub title: String,
    pub chunk_index: i64,
    pub part: i64,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
    pub model: Option<String>,
    pub dims: Option<usize>,
    pub domain: Option<String>,
    pub significance: Option<String>,
    pub source_work: Option<String>,
    pub hash: String,
}

/// An atomic structured claim with its own stable identifier.
///
/// Positions are not chunked; they are produced by a one-time external
/// extraction step and loaded once, with reloads skipping ids already
/// present.
#[derive(Debug, Clone)]
pub struct PositionRecord {
    pub position_id: String,
    pub author: String,
    pub domain: Option<String>,
    pub topic: Option<String>,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
}

/// Canonical content of an imported position, regardless of which field
/// name the source file used.
///
/// The extraction exports name their payload field inconsistently
/// (`thesis`, `statement`, `position`, or `content`); every import path
/// funnels through [`PositionContent::from_json`] so the rest of the
/// pipeline only ever sees one shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionContent {
    pub content: String,
    pub topic: Option<String>,
    pub domain: Option<String>,
    pub id: Option<String>,
}

impl PositionContent {
    /// Extract canonical content from a JSON object, accepting any of
    /// the known field spellings. Returns `None` when no content field
    /// is present or it is empty.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let content = ["thesis", "statement", "position", "content"]
            .iter()
            .find_map(|k| value.get(*k).and_then(|v| v.as_str()))
            .map(str::trim)
            .filter(|s| !s.is_empty())?;

        let string_field = |k: &str| {
            value
                .get(k)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        Some(Self {
            content: content.to_string(),
            topic: string_field("topic"),
            domain: string_field("domain"),
            id: value
                .get("id")
                .map(|v| match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .filter(|s| !s.is_empty()),
        })
    }
}

/// Summary of one ingestion run. Failures are counted here rather than
/// raised; the run continues past per-chunk errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub inserted: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl IngestionReport {
    pub fn merge(&mut self, other: &IngestionReport) {
        self.inserted += other.inserted;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}

/// Outcome of an insert-if-absent store operation.
///
/// `AlreadyExists` is the idempotency signal: a duplicate-insert
/// conflict is success-no-op, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}
