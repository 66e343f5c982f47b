//! Relevance ranking over stored passages.
//!
//! Two modes, chosen by what the queried corpus supports:
//!
//! - **Vector mode**: the query is embedded with the same model used at
//!   ingestion and candidates are ranked by descending cosine
//!   similarity.
//! - **Keyword mode**: the fallback for corpora stored without
//!   embeddings. Query keywords (stop words and short tokens removed)
//!   score each candidate as `2 × occurrence count + distinct keyword
//!   presence count`.
//!
//! Both modes are deterministic: sorting is stable, so candidates with
//! equal scores keep their original corpus order, and zero matches is
//! an explicit empty result, never an arbitrary top-K.

use regex::Regex;

use crate::embedding::{embed_query, Embedder};
use crate::store::{PassageFilter, PassageHit, PassageText, VectorStore};

/// Query tokens this short are never keywords.
const MIN_KEYWORD_LEN: usize = 4;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "was", "are", "were", "be", "been", "being", "have", "has", "had", "do",
    "does", "did", "will", "would", "should", "could", "can", "may", "might", "what", "when",
    "where", "why", "how", "who", "which", "this", "that", "these", "those", "about", "think",
    "your", "they", "their", "there",
];

/// A keyword-ranked passage.
#[derive(Debug, Clone)]
pub struct RankedPassage {
    pub passage: PassageText,
    pub score: f64,
}

/// Extract searchable keywords from a query: lowercase, punctuation
/// stripped, stop words and short tokens removed. Order of first
/// occurrence is preserved; duplicates are dropped.
pub fn extract_keywords(query: &str) -> Vec<String> {
    let cleaned: String = query
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut keywords = Vec::new();
    for token in cleaned.split_whitespace() {
        if token.len() >= MIN_KEYWORD_LEN
            && !STOP_WORDS.contains(&token)
            && !keywords.iter().any(|k| k == token)
        {
            keywords.push(token.to_string());
        }
    }
    keywords
}

/// Score one candidate against the extracted keywords:
/// `2 × word-boundary occurrences + 1 per keyword present at all`.
fn keyword_score(content_lower: &str, keywords: &[String], patterns: &[Regex]) -> i64 {
    let mut score = 0i64;
    for (keyword, pattern) in keywords.iter().zip(patterns) {
        let occurrences = pattern.find_iter(content_lower).count() as i64;
        score += occurrences * 2;
        if content_lower.contains(keyword.as_str()) {
            score += 1;
        }
    }
    score
}

/// Rank candidates lexically against a query, best first, bounded by
/// `max_results`.
///
/// Candidates must arrive in corpus order; the stable sort keeps that
/// order for equal scores. A query with no usable keywords, or no
/// candidate scoring above zero, returns an empty vector.
pub fn rank_keyword(
    candidates: &[PassageText],
    query: &str,
    max_results: usize,
) -> Vec<RankedPassage> {
    let keywords = extract_keywords(query);
    if keywords.is_empty() {
        return Vec::new();
    }

    // Keywords match at word starts, so "cause" also counts "causes".
    let patterns: Vec<Regex> = keywords
        .iter()
        .map(|k| {
            Regex::new(&format!(r"\b{}", regex::escape(k))).expect("escaped keyword regex")
        })
        .collect();

    let mut ranked: Vec<RankedPassage> = candidates
        .iter()
        .filter_map(|candidate| {
            let lower = candidate.content.to_lowercase();
            let score = keyword_score(&lower, &keywords, &patterns);
            (score > 0).then(|| RankedPassage {
                passage: candidate.clone(),
                score: score as f64,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(max_results);
    ranked
}

/// Rank passages by embedding similarity, best first, bounded by
/// `max_results`.
pub async fn rank_vector(
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    query: &str,
    filter: PassageFilter<'_>,
    max_results: usize,
) -> anyhow::Result<Vec<PassageHit>> {
    let query_vec = embed_query(embedder, query).await?;
    store.nearest_passages(&query_vec, filter, max_results).await
}
