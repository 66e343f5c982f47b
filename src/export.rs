//! Audit report export.
//!
//! Renders an [`AuditOutcome`] as a flat human-readable report or as
//! pretty JSON, to a file path or stdout for piping.

use anyhow::Result;
use std::path::Path;

use crate::audit::render_trace;
use crate::retrieve::AuditOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Json,
}

impl std::str::FromStr for ReportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            other => anyhow::bail!("Unknown report format: {}. Use text or json.", other),
        }
    }
}

/// Render the full plain-text audit report.
pub fn render_report(outcome: &AuditOutcome) -> String {
    let mut lines: Vec<String> = Vec::new();
    let rule = "=".repeat(60);
    let sub = "-".repeat(60);

    lines.push(rule.clone());
    lines.push("AUDIT REPORT: CORPUS SEARCH TRACE".to_string());
    lines.push(rule.clone());
    lines.push(String::new());
    lines.push(format!("Query: {}", outcome.query));
    lines.push(format!("Author: {}", outcome.author));
    lines.push(format!(
        "Started: {}",
        outcome.trace.started_at.format("%Y-%m-%dT%H:%M:%S%.3fZ")
    ));
    lines.push(format!(
        "Final Decision: {}",
        outcome.final_decision.to_string().to_uppercase()
    ));
    lines.push(String::new());

    lines.push(sub.clone());
    lines.push("EXECUTION TRACE".to_string());
    lines.push(sub.clone());
    lines.push(render_trace(&outcome.trace));
    lines.push(String::new());

    lines.push(sub.clone());
    lines.push("DIRECT ANSWERS FOUND".to_string());
    lines.push(sub.clone());
    if outcome.direct_answers.is_empty() {
        lines.push("No direct answers found in corpus.".to_string());
    } else {
        for (i, answer) in outcome.direct_answers.iter().enumerate() {
            lines.push(String::new());
            lines.push(format!("Direct Answer #{}:", i + 1));
            lines.push(format!(
                "  Source: {} (id: {})",
                answer.table, answer.source_id
            ));
            lines.push(format!(
                "  Topic: {}",
                answer.topic.as_deref().unwrap_or("n/a")
            ));
            lines.push(format!("  Relevance: {:.1}%", answer.relevance * 100.0));
            lines.push(format!("  Text: \"{}\"", truncate(&answer.text, 500)));
        }
    }
    lines.push(String::new());

    lines.push(sub.clone());
    lines.push("ALIGNMENT ANALYSIS".to_string());
    lines.push(sub.clone());
    lines.push(format!(
        "Answers Aligned: {}",
        if outcome.aligned { "YES" } else { "NO" }
    ));
    lines.push(format!(
        "Contradictions Detected: {}",
        if outcome.conflicting { "YES" } else { "NO" }
    ));

    if !outcome.adjacent.is_empty() {
        lines.push(String::new());
        lines.push(sub.clone());
        lines.push("ADJACENT MATERIAL (used if no direct answer)".to_string());
        lines.push(sub.clone());
        for (i, passage) in outcome.adjacent.iter().enumerate() {
            lines.push(String::new());
            lines.push(format!("[{}] {}", i + 1, truncate(passage, 300)));
        }
    }

    lines.push(String::new());
    lines.push(rule.clone());
    lines.push("END OF AUDIT REPORT".to_string());
    lines.push(rule);

    lines.join("\n")
}

/// Write the report to `output`, or stdout when no path is given.
pub fn write_report(
    outcome: &AuditOutcome,
    format: ReportFormat,
    output: Option<&Path>,
) -> Result<()> {
    let rendered = match format {
        ReportFormat::Text => render_report(outcome),
        ReportFormat::Json => serde_json::to_string_pretty(outcome)?,
    };

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &rendered)?;
            eprintln!("Audit report written to {}", path.display());
        }
        None => {
            println!("{}", rendered);
        }
    }

    Ok(())
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &text[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{RetrievalTrace, SearchTable, TraceEventKind};
    use crate::retrieve::{DirectAnswer, FinalDecision};

    fn outcome() -> AuditOutcome {
        let mut trace = RetrievalTrace::new("what is justice", "plato");
        trace
            .record(TraceEventKind::Query {
                message: "what is justice".to_string(),
            })
            .unwrap();
        trace
            .record(TraceEventKind::Complete {
                message: "done".to_string(),
            })
            .unwrap();

        AuditOutcome {
            query: "what is justice".to_string(),
            author: "plato".to_string(),
            direct_answers: vec![DirectAnswer {
                text: "Justice is each part doing its own work.".to_string(),
                table: SearchTable::Positions,
                source_id: "pos-9".to_string(),
                topic: Some("ethics".to_string()),
                relevance: 0.75,
            }],
            adjacent: vec!["On the tripartite soul.".to_string()],
            aligned: true,
            conflicting: false,
            final_decision: FinalDecision::Aligned,
            trace,
        }
    }

    #[test]
    fn test_text_report_sections() {
        let rendered = render_report(&outcome());
        assert!(rendered.contains("AUDIT REPORT"));
        assert!(rendered.contains("EXECUTION TRACE"));
        assert!(rendered.contains("Direct Answer #1:"));
        assert!(rendered.contains("Source: positions (id: pos-9)"));
        assert!(rendered.contains("Relevance: 75.0%"));
        assert!(rendered.contains("ADJACENT MATERIAL"));
        assert!(rendered.contains("Final Decision: ALIGNED"));
    }

    #[test]
    fn test_json_report_roundtrips() {
        let json = serde_json::to_string_pretty(&outcome()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["final_decision"], "aligned");
        assert_eq!(value["trace"]["events"][0]["type"], "query");
    }

    #[test]
    fn test_write_report_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/audit.txt");
        write_report(&outcome(), ReportFormat::Text, Some(&path)).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("END OF AUDIT REPORT"));
    }
}
