//! Audited corpus retrieval.
//!
//! Searches the store classes in descending signal order (structured
//! positions, then verbatim quotes, then chunked prose), collecting up
//! to `max_direct_answers` passages that directly answer the query,
//! recording every accept/reject decision in a [`RetrievalTrace`], and
//! finishing with an alignment check over the accepted answers.
//!
//! A conflicting alignment verdict is a warning surfaced to the
//! consumer, never grounds for discarding the evidence; the generator
//! downstream decides what to do with it. Zero evidence is likewise a
//! first-class outcome: the trace completes with `no_direct_answer`
//! and the caller renders an explicit "no relevant passage" state.

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;

use crate::audit::{RetrievalTrace, SearchTable, TraceEventKind};
use crate::config::RetrievalConfig;
use crate::embedding::{embed_query, Embedder};
use crate::rank::extract_keywords;
use crate::store::{PassageFilter, VectorStore};

/// How far into a passage the trace excerpt reaches.
const EXCERPT_CHARS: usize = 160;

/// Adjacent material below this match ratio is discarded outright.
const ADJACENT_FLOOR: f64 = 0.1;

/// Adjacent passages kept for the generator when direct answers run short.
const MAX_ADJACENT: usize = 5;

static CONTRADICTION_PAIRS: Lazy<Vec<(Regex, Regex)>> = Lazy::new(|| {
    [
        (r"\bis\b", r"\bis not\b"),
        (r"\bexists\b", r"\bdoes not exist\b"),
        (r"\btrue\b", r"\bfalse\b"),
        (r"\bgood\b", r"\bbad\b"),
        (r"\bpossible\b", r"\bimpossible\b"),
        (r"\bnecessary\b", r"\bunnecessary\b"),
        (r"\balways\b", r"\bnever\b"),
        (r"\ball\b", r"\bnone\b"),
        (r"\bshould\b", r"\bshould not\b"),
        (r"\bmust\b", r"\bmust not\b"),
    ]
    .iter()
    .map(|(a, b)| {
        (
            Regex::new(a).expect("contradiction pattern"),
            Regex::new(b).expect("contradiction pattern"),
        )
    })
    .collect()
});

/// A passage accepted as directly answering the query.
#[derive(Debug, Clone, Serialize)]
pub struct DirectAnswer {
    pub text: String,
    pub table: SearchTable,
    pub source_id: String,
    pub topic: Option<String>,
    pub relevance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalDecision {
    Aligned,
    Conflicting,
    NoDirectAnswer,
}

impl std::fmt::Display for FinalDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FinalDecision::Aligned => "aligned",
            FinalDecision::Conflicting => "conflicting",
            FinalDecision::NoDirectAnswer => "no_direct_answer",
        };
        f.write_str(name)
    }
}

/// Everything an audited search produced: the evidence and the trace
/// of how it was assembled.
#[derive(Debug, Serialize)]
pub struct AuditOutcome {
    pub query: String,
    pub author: String,
    pub direct_answers: Vec<DirectAnswer>,
    pub adjacent: Vec<String>,
    pub aligned: bool,
    pub conflicting: bool,
    pub final_decision: FinalDecision,
    pub trace: RetrievalTrace,
}

struct Verdict {
    direct: bool,
    score: f64,
    reason: String,
}

/// Decide whether a passage directly answers the query: the share of
/// query keywords present in the passage, weighed against passage
/// length so one-liners cannot qualify on a single term.
fn assess(content: &str, keywords: &[String]) -> Verdict {
    if keywords.is_empty() {
        return Verdict {
            direct: false,
            score: 0.0,
            reason: "question has no searchable keywords".to_string(),
        };
    }

    let lower = content.to_lowercase();
    let matched = keywords.iter().filter(|k| lower.contains(k.as_str())).count();
    let ratio = matched as f64 / keywords.len() as f64;

    if ratio >= 0.5 && content.len() >= 50 {
        Verdict {
            direct: true,
            score: ratio,
            reason: format!("matches {matched}/{} key terms", keywords.len()),
        }
    } else if ratio >= 0.3 && content.len() >= 100 {
        Verdict {
            direct: true,
            score: ratio * 0.8,
            reason: format!("partial match: {matched}/{} terms", keywords.len()),
        }
    } else {
        Verdict {
            direct: false,
            score: ratio,
            reason: format!("only {matched}/{} terms match", keywords.len()),
        }
    }
}

/// Pairwise contradiction scan over the accepted answers.
fn check_alignment(answers: &[DirectAnswer]) -> (bool, bool) {
    if answers.len() < 2 {
        return (true, false);
    }

    let texts: Vec<String> = answers.iter().map(|a| a.text.to_lowercase()).collect();

    for i in 0..texts.len() {
        for j in (i + 1)..texts.len() {
            for (a, b) in CONTRADICTION_PAIRS.iter() {
                if (a.is_match(&texts[i]) && b.is_match(&texts[j]))
                    || (b.is_match(&texts[i]) && a.is_match(&texts[j]))
                {
                    return (false, true);
                }
            }
        }
    }

    (true, false)
}

fn excerpt(content: &str) -> String {
    if content.len() <= EXCERPT_CHARS {
        return content.to_string();
    }
    let mut cut = EXCERPT_CHARS;
    while !content.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &content[..cut])
}

/// One candidate passage, whichever table it came from.
struct Candidate {
    table: SearchTable,
    source_id: String,
    topic: Option<String>,
    content: String,
}

/// Run the staged audited search for one query against one author's
/// corpus.
pub async fn audited_search(
    store: &dyn VectorStore,
    embedder: Option<&dyn Embedder>,
    retrieval: &RetrievalConfig,
    query: &str,
    author: &str,
) -> Result<AuditOutcome> {
    let mut trace = RetrievalTrace::new(query, author);
    trace.record(TraceEventKind::Query {
        message: format!("searching corpus for: \"{query}\""),
    })?;

    let query_vec = match embedder {
        Some(embedder) => match embed_query(embedder, query).await {
            Ok(v) => Some(v),
            Err(e) => {
                // Degrade to corpus-order candidates rather than failing
                // the whole query.
                tracing::warn!(error = %e, "query embedding failed, searching without vectors");
                None
            }
        },
        None => None,
    };

    let keywords = extract_keywords(query);
    let k = retrieval.candidate_k;
    let max_answers = retrieval.max_direct_answers;

    let mut answers: Vec<DirectAnswer> = Vec::new();
    let mut adjacent: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    // Stage 1: structured positions, the highest-signal class.
    trace.record(TraceEventKind::SearchStart {
        table: SearchTable::Positions,
        message: "structured positions first (highest signal)".to_string(),
    })?;

    let position_candidates: Vec<Candidate> = match &query_vec {
        Some(qv) => store
            .nearest_positions(qv, Some(author), k)
            .await?
            .into_iter()
            .map(|hit| Candidate {
                table: SearchTable::Positions,
                source_id: hit.position.position_id,
                topic: hit.position.topic,
                content: hit.position.content,
            })
            .collect(),
        None => store
            .positions_for_author(author)
            .await?
            .into_iter()
            .take(k)
            .map(|p| Candidate {
                table: SearchTable::Positions,
                source_id: p.position_id,
                topic: p.topic,
                content: p.content,
            })
            .collect(),
    };

    consider_candidates(
        &mut trace,
        &mut answers,
        &mut adjacent,
        &mut seen,
        &position_candidates,
        &keywords,
        max_answers,
    )?;

    // Stage 2: verbatim quotes.
    if answers.len() < max_answers {
        trace.record(TraceEventKind::SearchStart {
            table: SearchTable::Quotes,
            message: "verbatim quotes (need more direct answers)".to_string(),
        })?;

        let quote_candidates =
            passage_candidates(store, &query_vec, author, Some("quote"), k, SearchTable::Quotes)
                .await?;
        consider_candidates(
            &mut trace,
            &mut answers,
            &mut adjacent,
            &mut seen,
            &quote_candidates,
            &keywords,
            max_answers,
        )?;
    }

    // Stage 3: chunked prose, the last resort.
    if answers.len() < max_answers {
        trace.record(TraceEventKind::SearchStart {
            table: SearchTable::Passages,
            message: "chunked prose (last resort)".to_string(),
        })?;

        let prose_candidates =
            passage_candidates(store, &query_vec, author, None, k, SearchTable::Passages).await?;
        consider_candidates(
            &mut trace,
            &mut answers,
            &mut adjacent,
            &mut seen,
            &prose_candidates,
            &keywords,
            max_answers,
        )?;
    }

    let (aligned, conflicting) = check_alignment(&answers);
    if !answers.is_empty() {
        trace.record(TraceEventKind::AlignmentCheck {
            aligned,
            conflicting,
            message: if conflicting {
                "direct answers conflict - presenting separately for human judgment".to_string()
            } else {
                format!("{} direct answers align", answers.len())
            },
        })?;
    }

    let final_decision = if conflicting {
        FinalDecision::Conflicting
    } else if !answers.is_empty() {
        FinalDecision::Aligned
    } else {
        FinalDecision::NoDirectAnswer
    };

    adjacent.truncate(MAX_ADJACENT);

    trace.record(TraceEventKind::GenerationStart {
        message: format!(
            "handing {} direct answers and {} adjacent passages to the generator",
            answers.len(),
            adjacent.len()
        ),
    })?;
    trace.record(TraceEventKind::Complete {
        message: format!("search complete, decision: {final_decision}"),
    })?;

    Ok(AuditOutcome {
        query: query.to_string(),
        author: author.to_string(),
        direct_answers: answers,
        adjacent,
        aligned,
        conflicting,
        final_decision,
        trace,
    })
}

/// Fetch passage candidates for one stage, by vector when available,
/// else in corpus order.
async fn passage_candidates(
    store: &dyn VectorStore,
    query_vec: &Option<Vec<f32>>,
    author: &str,
    significance: Option<&str>,
    k: usize,
    table: SearchTable,
) -> Result<Vec<Candidate>> {
    let candidates = match query_vec {
        Some(qv) => store
            .nearest_passages(
                qv,
                PassageFilter {
                    author: Some(author),
                    significance,
                },
                k,
            )
            .await?
            .into_iter()
            .map(|hit| Candidate {
                table,
                source_id: hit.passage.id,
                topic: None,
                content: hit.passage.content,
            })
            .collect(),
        None => store
            .keyword_candidates(author)
            .await?
            .into_iter()
            .filter(|p| match significance {
                Some(s) => p.significance.as_deref() == Some(s),
                None => true,
            })
            .take(k)
            .map(|p| Candidate {
                table,
                source_id: p.id,
                topic: None,
                content: p.content,
            })
            .collect(),
    };
    Ok(candidates)
}

/// Accept/reject each candidate, recording the decision.
fn consider_candidates(
    trace: &mut RetrievalTrace,
    answers: &mut Vec<DirectAnswer>,
    adjacent: &mut Vec<String>,
    seen: &mut HashSet<String>,
    candidates: &[Candidate],
    keywords: &[String],
    max_answers: usize,
) -> Result<()> {
    for candidate in candidates {
        if answers.len() >= max_answers {
            break;
        }
        if !seen.insert(candidate.source_id.clone()) {
            continue;
        }

        let verdict = assess(&candidate.content, keywords);

        if verdict.direct {
            trace.record(TraceEventKind::DirectAnswer {
                table: candidate.table,
                source_id: candidate.source_id.clone(),
                excerpt: excerpt(&candidate.content),
                answer_number: answers.len() + 1,
                reason: verdict.reason,
            })?;
            answers.push(DirectAnswer {
                text: candidate.content.clone(),
                table: candidate.table,
                source_id: candidate.source_id.clone(),
                topic: candidate.topic.clone(),
                relevance: verdict.score,
            });
        } else if verdict.score > ADJACENT_FLOOR {
            // Not a direct answer, but close enough to hand the
            // generator as supporting material.
            trace.record(TraceEventKind::PassageFound {
                table: candidate.table,
                source_id: candidate.source_id.clone(),
                excerpt: excerpt(&candidate.content),
                reason: verdict.reason,
            })?;
            adjacent.push(candidate.content.clone());
        } else {
            trace.record(TraceEventKind::PassageRejected {
                table: candidate.table,
                source_id: candidate.source_id.clone(),
                excerpt: excerpt(&candidate.content),
                reason: verdict.reason,
            })?;
        }
    }
    Ok(())
}
