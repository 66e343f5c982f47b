//! The `corpus search` command: ranked retrieval without the audit
//! machinery, for inspecting what the store would surface.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::rank;
use crate::store::{PassageFilter, SqliteStore, VectorStore};

pub async fn run_search(
    config: &Config,
    query: &str,
    mode: &str,
    author: &str,
    limit: Option<usize>,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No relevant passages.");
        return Ok(());
    }

    match mode {
        "vector" | "keyword" => {}
        _ => bail!("Unknown search mode: {}. Use vector or keyword.", mode),
    }

    if mode == "vector" && !config.embedding.is_enabled() {
        bail!("Mode 'vector' requires embeddings. Set [embedding] provider in config.");
    }

    let max_results = limit.unwrap_or(config.retrieval.max_results);
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    match mode {
        "vector" => {
            let Some(embedder) = embedding::create_embedder(&config.embedding)? else {
                bail!("Mode 'vector' requires embeddings. Set [embedding] provider in config.");
            };
            let hits = rank::rank_vector(
                &store,
                embedder.as_ref(),
                query,
                PassageFilter {
                    author: Some(author),
                    significance: None,
                },
                max_results,
            )
            .await?;

            if hits.is_empty() {
                println!("No relevant passages.");
            } else {
                for (i, hit) in hits.iter().enumerate() {
                    println!(
                        "{}. [{:.3}] {} / {} #{}",
                        i + 1,
                        hit.similarity,
                        hit.passage.author,
                        hit.passage.title,
                        hit.passage.chunk_index
                    );
                    println!("    excerpt: \"{}\"", snippet(&hit.passage.content));
                    println!();
                }
            }
        }
        _ => {
            let candidates = store.keyword_candidates(author).await?;
            let ranked = rank::rank_keyword(&candidates, query, max_results);

            if ranked.is_empty() {
                println!("No relevant passages.");
            } else {
                for (i, r) in ranked.iter().enumerate() {
                    println!(
                        "{}. [{}] {} / {} #{}",
                        i + 1,
                        r.score,
                        r.passage.author,
                        r.passage.title,
                        r.passage.chunk_index
                    );
                    println!("    excerpt: \"{}\"", snippet(&r.passage.content));
                    println!();
                }
            }
        }
    }

    store.pool().close().await;
    Ok(())
}

fn snippet(content: &str) -> String {
    let flat = content.replace('\n', " ");
    let trimmed = flat.trim();
    if trimmed.len() <= 240 {
        return trimmed.to_string();
    }
    let mut cut = 240;
    while !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &trimmed[..cut])
}
