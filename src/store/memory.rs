//! In-memory [`VectorStore`] implementation for tests.
//!
//! `Vec` + `HashSet` behind `std::sync::RwLock`; vector search is
//! brute-force cosine similarity, mirroring the SQLite backend so the
//! coordinator and retrieval tests exercise identical semantics.

use std::collections::HashSet;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{InsertOutcome, Passage, PositionRecord};

use super::{PassageFilter, PassageHit, PassageText, PositionHit, PositionText, VectorStore};

#[derive(Default)]
pub struct MemoryStore {
    passages: RwLock<Vec<Passage>>,
    passage_keys: RwLock<HashSet<(String, String, i64, i64)>>,
    positions: RwLock<Vec<PositionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of stored passages, in insertion order. Test helper.
    pub fn passages(&self) -> Vec<Passage> {
        self.passages.read().unwrap().clone()
    }

    /// Remove one stored passage row. Test helper for resumability
    /// scenarios ("manually delete index 2").
    pub fn remove_passage(&self, author: &str, title: &str, chunk_index: i64) {
        let mut passages = self.passages.write().unwrap();
        passages.retain(|p| {
            !(p.author == author && p.title == title && p.chunk_index == chunk_index)
        });
        let mut keys = self.passage_keys.write().unwrap();
        keys.retain(|(a, t, i, _)| !(a == author && t == title && *i == chunk_index));
    }
}

fn to_text(p: &Passage) -> PassageText {
    PassageText {
        id: p.id.clone(),
        author: p.author.clone(),
        title: p.title.clone(),
        chunk_index: p.chunk_index,
        content: p.content.clone(),
        significance: p.significance.clone(),
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn insert_passage(&self, passage: &Passage) -> Result<InsertOutcome> {
        let key = (
            passage.author.clone(),
            passage.title.clone(),
            passage.chunk_index,
            passage.part,
        );
        let mut keys = self.passage_keys.write().unwrap();
        if !keys.insert(key) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        self.passages.write().unwrap().push(passage.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn distinct_indices(&self, author: &str, title: &str) -> Result<Vec<i64>> {
        let passages = self.passages.read().unwrap();
        let mut indices: Vec<i64> = passages
            .iter()
            .filter(|p| p.author == author && p.title == title)
            .map(|p| p.chunk_index)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        indices.sort_unstable();
        Ok(indices)
    }

    async fn count_passages(&self, author: &str, title: &str) -> Result<i64> {
        let passages = self.passages.read().unwrap();
        Ok(passages
            .iter()
            .filter(|p| p.author == author && p.title == title)
            .count() as i64)
    }

    async fn nearest_passages(
        &self,
        query: &[f32],
        filter: PassageFilter<'_>,
        k: usize,
    ) -> Result<Vec<PassageHit>> {
        let passages = self.passages.read().unwrap();
        let mut hits: Vec<PassageHit> = passages
            .iter()
            .filter(|p| p.embedding.is_some())
            .filter(|p| filter.author.map_or(true, |a| p.author == a))
            .filter(|p| filter.significance.map_or(true, |s| p.significance.as_deref() == Some(s)))
            .map(|p| PassageHit {
                passage: to_text(p),
                similarity: cosine_similarity(query, p.embedding.as_ref().unwrap()) as f64,
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
        let passages = self.passages.read().unwrap();
        let mut texts: Vec<&Passage> =
            passages.iter().filter(|p| p.author == author).collect();
        texts.sort_by(|a, b| {
            a.title
                .cmp(&b.title)
                .then(a.chunk_index.cmp(&b.chunk_index))
                .then(a.part.cmp(&b.part))
        });
        Ok(texts.into_iter().map(to_text).collect())
    }

    async fn insert_position(&self, position: &PositionRecord) -> Result<InsertOutcome> {
        let mut positions = self.positions.write().unwrap();
        if positions
            .iter()
            .any(|p| p.position_id == position.position_id)
        {
            return Ok(InsertOutcome::AlreadyExists);
        }
        positions.push(position.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn position_exists(&self, position_id: &str) -> Result<bool> {
        let positions = self.positions.read().unwrap();
        Ok(positions.iter().any(|p| p.position_id == position_id))
    }

    async fn nearest_positions(
        &self,
        query: &[f32],
        author: Option<&str>,
        k: usize,
    ) -> Result<Vec<PositionHit>> {
        let positions = self.positions.read().unwrap();
        let mut hits: Vec<PositionHit> = positions
            .iter()
            .filter(|p| p.embedding.is_some())
            .filter(|p| author.map_or(true, |a| p.author == a))
            .map(|p| PositionHit {
                position: PositionText {
                    position_id: p.position_id.clone(),
                    author: p.author.clone(),
                    topic: p.topic.clone(),
                    content: p.content.clone(),
                },
                similarity: cosine_similarity(query, p.embedding.as_ref().unwrap()) as f64,
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
        let positions = self.positions.read().unwrap();
        Ok(positions
            .iter()
            .filter(|p| p.author == author)
            .map(|p| PositionText {
                position_id: p.position_id.clone(),
                author: p.author.clone(),
                topic: p.topic.clone(),
                content: p.content.clone(),
            })
            .collect())
    }

    async fn clear_author(&self, author: &str) -> Result<u64> {
        let mut removed = 0u64;
        {
            let mut passages = self.passages.write().unwrap();
            let before = passages.len();
            passages.retain(|p| p.author != author);
            removed += (before - passages.len()) as u64;
            let mut keys = self.passage_keys.write().unwrap();
            keys.retain(|(a, _, _, _)| a != author);
        }
        {
            let mut positions = self.positions.write().unwrap();
            let before = positions.len();
            positions.retain(|p| p.author != author);
            removed += (before - positions.len()) as u64;
        }
        Ok(removed)
    }

    async fn clear_document(&self, author: &str, title: &str) -> Result<u64> {
        let mut passages = self.passages.write().unwrap();
        let before = passages.len();
        passages.retain(|p| !(p.author == author && p.title == title));
        let removed = (before - passages.len()) as u64;
        let mut keys = self.passage_keys.write().unwrap();
        keys.retain(|(a, t, _, _)| !(a == author && t == title));
        Ok(removed)
    }
}
