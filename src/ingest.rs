//! Ingestion coordination: chunk → embed → store for a named document.
//!
//! The coordinator is what makes multi-hour ingestion runs safe to kill
//! and re-run. Before touching the network it asks the store which
//! chunk indices of the document already exist; a document whose
//! indices form the full contiguous set is a no-op, and a partial
//! document only embeds the gap. Progress lives entirely in the store;
//! there is no in-memory cursor to lose.
//!
//! Per-chunk failures never abort the run. An embedding rejected as
//! oversize is retried as two word-halves (stored as parts of the
//! parent index, carrying the parent's metadata); a half that still
//! fails is counted and skipped. Everything ends up in the
//! [`IngestionReport`].

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

use crate::chunk::{chunk, word_count};
use crate::config::Config;
use crate::corpus;
use crate::db;
use crate::embedding::{self, Embedder};
use crate::models::{IngestionReport, InsertOutcome, Passage, SourceDocument};
use crate::normalize::normalize;
use crate::progress::{IngestProgressEvent, ProgressReporter};
use crate::store::{SqliteStore, VectorStore};

/// A stored index set is complete when it is exactly `{0..expected-1}`.
pub fn is_complete(indices: &[i64], expected: usize) -> bool {
    indices.len() == expected
        && indices
            .iter()
            .enumerate()
            .all(|(i, &v)| v == i as i64)
}

/// Ingest one document's chunks, resuming past whatever the store
/// already holds.
pub async fn ingest_document(
    store: &dyn VectorStore,
    embedder: Option<&dyn Embedder>,
    config: &Config,
    document: &SourceDocument,
    chunks: &[String],
) -> Result<IngestionReport> {
    let mut report = IngestionReport::default();

    let existing = store
        .distinct_indices(&document.author, &document.title)
        .await?;

    if is_complete(&existing, chunks.len()) {
        tracing::info!(
            author = %document.author,
            title = %document.title,
            chunks = chunks.len(),
            "document already complete, skipping"
        );
        report.skipped = chunks.len() as u64;
        return Ok(report);
    }

    let existing_set: HashSet<i64> = existing.iter().copied().collect();
    let pending: Vec<(i64, &String)> = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| (i as i64, c))
        .filter(|(i, _)| !existing_set.contains(i))
        .collect();

    report.skipped += (chunks.len() - pending.len()) as u64;

    if !existing.is_empty() {
        tracing::info!(
            author = %document.author,
            title = %document.title,
            stored = existing.len(),
            pending = pending.len(),
            "resuming partial document"
        );
    }

    let batch_size = config.embedding.batch_size.max(1);
    let pace = Duration::from_millis(config.embedding.pace_ms);

    for batch in pending.chunks(batch_size) {
        let vectors: Vec<Option<Vec<f32>>> = match embedder {
            Some(embedder) => {
                let texts: Vec<String> = batch.iter().map(|(_, c)| (*c).clone()).collect();
                match embedder.embed(&texts).await {
                    Ok(vectors) => vectors,
                    Err(e) => {
                        // Transient retries are exhausted inside the
                        // adapter; whatever surfaces here is a
                        // chunk-level failure, not a run-level one.
                        tracing::warn!(
                            author = %document.author,
                            title = %document.title,
                            error = %e,
                            "embedding batch failed, counting {} chunks as errors",
                            batch.len()
                        );
                        report.errors += batch.len() as u64;
                        continue;
                    }
                }
            }
            None => vec![None; batch.len()],
        };

        for ((index, content), vector) in batch.iter().zip(vectors.into_iter()) {
            match (vector, embedder) {
                (Some(vector), Some(embedder)) => {
                    let passage =
                        make_passage(document, *index, 0, content, Some(vector), Some(embedder));
                    match store.insert_passage(&passage).await? {
                        InsertOutcome::Inserted => report.inserted += 1,
                        InsertOutcome::AlreadyExists => report.skipped += 1,
                    }
                }
                (None, Some(embedder)) => {
                    // Definitive oversize: split into two word-halves and
                    // store each as a part of the parent index.
                    let outcome =
                        split_and_store(store, embedder, document, *index, content).await?;
                    report.merge(&outcome);
                }
                (_, None) => {
                    // Keyword-only corpus: store the text without a vector.
                    let passage = make_passage(document, *index, 0, content, None, None);
                    match store.insert_passage(&passage).await? {
                        InsertOutcome::Inserted => report.inserted += 1,
                        InsertOutcome::AlreadyExists => report.skipped += 1,
                    }
                }
            }
        }

        if embedder.is_some() && !pace.is_zero() {
            tokio::time::sleep(pace).await;
        }
    }

    Ok(report)
}

/// Retry an oversize chunk as two halves under the parent's index.
async fn split_and_store(
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    document: &SourceDocument,
    index: i64,
    content: &str,
) -> Result<IngestionReport> {
    let mut report = IngestionReport::default();

    let words: Vec<&str> = content.split_whitespace().collect();
    let mid = words.len() / 2;
    let halves = [words[..mid].join(" "), words[mid..].join(" ")];

    tracing::warn!(
        author = %document.author,
        title = %document.title,
        chunk_index = index,
        words = words.len(),
        "chunk oversize, retrying as two halves"
    );

    match embedder.embed(&halves).await {
        Ok(vectors) => {
            for (part, (half, vector)) in halves.iter().zip(vectors.into_iter()).enumerate() {
                match vector {
                    Some(vector) => {
                        let passage = make_passage(
                            document,
                            index,
                            part as i64,
                            half,
                            Some(vector),
                            Some(embedder),
                        );
                        match store.insert_passage(&passage).await? {
                            InsertOutcome::Inserted => report.inserted += 1,
                            InsertOutcome::AlreadyExists => report.skipped += 1,
                        }
                    }
                    None => {
                        tracing::warn!(
                            chunk_index = index,
                            part,
                            words = word_count(half),
                            "half still oversize, skipping"
                        );
                        report.errors += 1;
                    }
                }
            }
        }
        Err(e) => {
            tracing::warn!(chunk_index = index, error = %e, "split retry failed");
            report.errors += 1;
        }
    }

    Ok(report)
}

fn make_passage(
    document: &SourceDocument,
    index: i64,
    part: i64,
    content: &str,
    embedding: Option<Vec<f32>>,
    embedder: Option<&dyn Embedder>,
) -> Passage {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Passage {
        id: Uuid::new_v4().to_string(),
        author: document.author.clone(),
        title: document.title.clone(),
        chunk_index: index,
        part,
        content: content.to_string(),
        embedding,
        model: embedder.map(|e| e.model_name().to_string()),
        dims: embedder.map(|e| e.dims()),
        domain: document.domain.clone(),
        significance: document.significance.clone(),
        source_work: document.source_work.clone(),
        hash,
    }
}

/// CLI entry point: ingest every document in one author's corpus folder.
pub async fn run_ingest(
    config: &Config,
    author: &str,
    domain: Option<String>,
    dry_run: bool,
    limit: Option<usize>,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    reporter.report(IngestProgressEvent::Scanning {
        author: author.to_string(),
    });

    let mut documents = corpus::scan_author(&config.library, author, domain.as_deref())?;
    if let Some(limit) = limit {
        documents.truncate(limit);
    }

    if dry_run {
        println!("ingest {} (dry-run)", author);
        println!("  documents found: {}", documents.len());
        let total_chunks: usize = documents
            .iter()
            .map(|d| chunk(&normalize(&d.body), config.chunking.target_words).len())
            .sum();
        println!("  estimated chunks: {}", total_chunks);
        return Ok(());
    }

    let embedder = embedding::create_embedder(&config.embedding)?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let mut total = IngestionReport::default();
    let doc_count = documents.len() as u64;

    for (n, document) in documents.iter().enumerate() {
        let chunks = chunk(&normalize(&document.body), config.chunking.target_words);
        let report =
            ingest_document(&store, embedder.as_deref(), config, document, &chunks).await?;
        total.merge(&report);

        reporter.report(IngestProgressEvent::Ingesting {
            author: author.to_string(),
            n: n as u64 + 1,
            total: doc_count,
        });
    }

    println!("ingest {}", author);
    println!("  documents: {}", documents.len());
    println!("  inserted: {}", total.inserted);
    println!("  skipped: {}", total.skipped);
    println!("  errors: {}", total.errors);
    println!("ok");

    store.pool().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbedError;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic embedder that rejects texts above a word limit as
    /// oversize, the way the real API does.
    struct StubEmbedder {
        max_words: usize,
        calls: AtomicUsize,
    }

    impl StubEmbedder {
        fn new(max_words: usize) -> Self {
            Self {
                max_words,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        fn model_name(&self) -> &str {
            "stub-embedding-model"
        }

        fn dims(&self) -> usize {
            2
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>, EmbedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    let words = word_count(t);
                    if words > self.max_words {
                        None
                    } else {
                        Some(vec![words as f32, 1.0])
                    }
                })
                .collect())
        }
    }

    fn test_config() -> Config {
        let raw = r#"
[db]
path = "unused.sqlite"

[library]
root = "unused"

[embedding]
provider = "remote"
model = "stub-embedding-model"
dims = 2
pace_ms = 0
"#;
        // The db/library paths are never touched by these tests.
        toml::from_str(raw).unwrap()
    }

    fn doc(author: &str, title: &str) -> SourceDocument {
        SourceDocument {
            author: author.to_string(),
            title: title.to_string(),
            domain: Some("epistemology".to_string()),
            significance: None,
            source_work: Some("works/test.txt".to_string()),
            body: String::new(),
        }
    }

    fn chunks_of(words_each: usize, count: usize) -> Vec<String> {
        (0..count)
            .map(|c| {
                (0..words_each)
                    .map(|w| format!("c{c}w{w}"))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect()
    }

    #[test]
    fn test_is_complete() {
        assert!(is_complete(&[0, 1, 2], 3));
        assert!(is_complete(&[], 0));
        assert!(!is_complete(&[0, 1], 3));
        assert!(!is_complete(&[0, 2, 3], 3));
        assert!(!is_complete(&[1, 2, 3], 3));
    }

    #[tokio::test]
    async fn test_ingest_then_reingest_is_idempotent() {
        let store = MemoryStore::new();
        let embedder = StubEmbedder::new(500);
        let config = test_config();
        let document = doc("hume", "enquiry");
        let chunks = chunks_of(100, 3);

        let first = ingest_document(&store, Some(&embedder), &config, &document, &chunks)
            .await
            .unwrap();
        assert_eq!(first.inserted, 3);
        assert_eq!(first.errors, 0);

        let second = ingest_document(&store, Some(&embedder), &config, &document, &chunks)
            .await
            .unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped, 3);
        assert_eq!(store.count_passages("hume", "enquiry").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_complete_document_makes_no_embedding_calls() {
        let store = MemoryStore::new();
        let embedder = StubEmbedder::new(500);
        let config = test_config();
        let document = doc("hume", "enquiry");
        let chunks = chunks_of(100, 3);

        ingest_document(&store, Some(&embedder), &config, &document, &chunks)
            .await
            .unwrap();
        let calls_after_first = embedder.calls.load(Ordering::SeqCst);

        ingest_document(&store, Some(&embedder), &config, &document, &chunks)
            .await
            .unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), calls_after_first);
    }

    #[tokio::test]
    async fn test_resumes_only_missing_index() {
        let store = MemoryStore::new();
        let embedder = StubEmbedder::new(500);
        let config = test_config();
        let document = doc("hume", "enquiry");
        let chunks = chunks_of(100, 3);

        ingest_document(&store, Some(&embedder), &config, &document, &chunks)
            .await
            .unwrap();

        let untouched: Vec<String> = store
            .passages()
            .iter()
            .filter(|p| p.chunk_index != 2)
            .map(|p| p.id.clone())
            .collect();

        store.remove_passage("hume", "enquiry", 2);

        let report = ingest_document(&store, Some(&embedder), &config, &document, &chunks)
            .await
            .unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped, 2);

        let after = store.passages();
        assert_eq!(after.len(), 3);
        // Indices 0 and 1 kept their original rows.
        for id in untouched {
            assert!(after.iter().any(|p| p.id == id));
        }
        assert_eq!(
            store.distinct_indices("hume", "enquiry").await.unwrap(),
            vec![0, 1, 2]
        );
    }

    #[tokio::test]
    async fn test_oversize_chunk_splits_into_two_parts() {
        let store = MemoryStore::new();
        let embedder = StubEmbedder::new(500);
        let config = test_config();
        let document = doc("kant", "critique");

        let mut chunks = chunks_of(100, 2);
        chunks.insert(1, chunks_of(600, 1).remove(0));

        let report = ingest_document(&store, Some(&embedder), &config, &document, &chunks)
            .await
            .unwrap();
        // Two ordinary chunks plus two stored halves.
        assert_eq!(report.inserted, 4);
        assert_eq!(report.errors, 0);

        let stored = store.passages();
        let halves: Vec<_> = stored.iter().filter(|p| p.chunk_index == 1).collect();
        assert_eq!(halves.len(), 2);
        assert_eq!(
            halves.iter().map(|p| p.part).collect::<Vec<_>>(),
            vec![0, 1]
        );
        for half in &halves {
            assert_eq!(half.domain.as_deref(), Some("epistemology"));
            assert_eq!(half.source_work.as_deref(), Some("works/test.txt"));
            assert!(word_count(&half.content) <= 300);
        }

        // The split document still reads as complete.
        let indices = store.distinct_indices("kant", "critique").await.unwrap();
        assert!(is_complete(&indices, chunks.len()));
    }

    #[tokio::test]
    async fn test_unsplittable_chunk_is_counted_not_fatal() {
        let store = MemoryStore::new();
        // Even a half of the oversize chunk stays above the limit.
        let embedder = StubEmbedder::new(100);
        let config = test_config();
        let document = doc("kant", "critique");

        let mut chunks = chunks_of(50, 2);
        chunks.push(chunks_of(600, 1).remove(0));

        let report = ingest_document(&store, Some(&embedder), &config, &document, &chunks)
            .await
            .unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(report.errors, 2);
        assert_eq!(store.count_passages("kant", "critique").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_disabled_provider_stores_text_only() {
        let store = MemoryStore::new();
        let config = test_config();
        let document = doc("hume", "essays");
        let chunks = chunks_of(100, 2);

        let report = ingest_document(&store, None, &config, &document, &chunks)
            .await
            .unwrap();
        assert_eq!(report.inserted, 2);
        assert!(store.passages().iter().all(|p| p.embedding.is_none()));
    }
}
