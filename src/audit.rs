//! Retrieval audit trace.
//!
//! Every audited query builds a [`RetrievalTrace`]: an append-only,
//! time-ordered record of each search decision: which table was
//! searched, which passages were accepted or rejected and why, whether
//! the assembled answers align. The trace is what lets a reader verify
//! *how* an answer was assembled rather than taking it on faith.
//!
//! A trace becomes terminal when a `Complete` or `Error` event is
//! recorded; recording anything after that is a programming error and
//! is rejected with [`TraceError::Terminal`].

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Store class searched during one stage of an audited query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchTable {
    /// Structured positions (atomic claims).
    Positions,
    /// Passages tagged as verbatim quotes.
    Quotes,
    /// Chunked prose passages.
    Passages,
}

impl std::fmt::Display for SearchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SearchTable::Positions => "positions",
            SearchTable::Quotes => "quotes",
            SearchTable::Passages => "passages",
        };
        f.write_str(name)
    }
}

/// One kind of retrieval decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEventKind {
    Query {
        message: String,
    },
    SearchStart {
        table: SearchTable,
        message: String,
    },
    PassageFound {
        table: SearchTable,
        source_id: String,
        excerpt: String,
        reason: String,
    },
    PassageRejected {
        table: SearchTable,
        source_id: String,
        excerpt: String,
        reason: String,
    },
    DirectAnswer {
        table: SearchTable,
        source_id: String,
        excerpt: String,
        answer_number: usize,
        reason: String,
    },
    AlignmentCheck {
        aligned: bool,
        conflicting: bool,
        message: String,
    },
    GenerationStart {
        message: String,
    },
    Complete {
        message: String,
    },
    Error {
        message: String,
    },
}

/// A timestamped trace entry.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: TraceEventKind,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TraceError {
    #[error("retrieval trace is terminal; no further events may be recorded")]
    Terminal,
}

/// Append-only, strictly ordered audit log for one query.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalTrace {
    pub query: String,
    pub author: String,
    pub started_at: DateTime<Utc>,
    events: Vec<TraceEvent>,
    terminal: bool,
}

impl RetrievalTrace {
    pub fn new(query: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            author: author.into(),
            started_at: Utc::now(),
            events: Vec::new(),
            terminal: false,
        }
    }

    /// Append an event. `Complete` and `Error` seal the trace.
    pub fn record(&mut self, kind: TraceEventKind) -> Result<(), TraceError> {
        if self.terminal {
            return Err(TraceError::Terminal);
        }
        if matches!(
            kind,
            TraceEventKind::Complete { .. } | TraceEventKind::Error { .. }
        ) {
            self.terminal = true;
        }
        self.events.push(TraceEvent {
            timestamp: Utc::now(),
            kind,
        });
        Ok(())
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }
}

/// Render a trace as flat human-readable lines, in recorded order.
pub fn render_trace(trace: &RetrievalTrace) -> String {
    let mut lines = Vec::new();

    for event in &trace.events {
        let time = event.timestamp.format("%H:%M:%S%.3f");
        let line = match &event.kind {
            TraceEventKind::Query { message } => format!("[{time}] QUERY: {message}"),
            TraceEventKind::SearchStart { table, message } => {
                format!("[{time}] SEARCH_START ({table}): {message}")
            }
            TraceEventKind::PassageFound {
                table,
                source_id,
                excerpt,
                reason,
            } => format!(
                "[{time}] PASSAGE_FOUND ({table}) [{source_id}]\n    Passage: \"{excerpt}\"\n    Reason: {reason}"
            ),
            TraceEventKind::PassageRejected {
                table,
                source_id,
                excerpt,
                reason,
            } => format!(
                "[{time}] PASSAGE_REJECTED ({table}) [{source_id}]\n    Passage: \"{excerpt}\"\n    Reason: {reason}"
            ),
            TraceEventKind::DirectAnswer {
                table,
                source_id,
                excerpt,
                answer_number,
                reason,
            } => format!(
                "[{time}] DIRECT_ANSWER ({table}) [{source_id}]\n    Passage: \"{excerpt}\"\n    Reason: {reason}\n    -> Direct Answer #{answer_number}"
            ),
            TraceEventKind::AlignmentCheck {
                aligned,
                conflicting,
                message,
            } => format!(
                "[{time}] ALIGNMENT_CHECK (aligned: {aligned}, conflicting: {conflicting}): {message}"
            ),
            TraceEventKind::GenerationStart { message } => {
                format!("[{time}] GENERATION_START: {message}")
            }
            TraceEventKind::Complete { message } => format!("[{time}] COMPLETE: {message}"),
            TraceEventKind::Error { message } => format!("[{time}] ERROR: {message}"),
        };
        lines.push(line);
    }

    lines.join("\n")
}
