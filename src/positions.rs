//! Structured position import.
//!
//! Positions arrive from a one-time extraction step in two formats:
//!
//! - **Pipe-delimited** lines: `author | content | topic` (topic
//!   optional, author falling back to the import's default).
//! - **JSON** arrays whose objects name their payload field any of
//!   `thesis`, `statement`, `position`, or `content`, depending on
//!   which extraction produced them.
//!
//! Both funnel through [`PositionContent`] so the rest of the pipeline
//! sees one canonical shape. Position ids are stable: taken from the
//! source when present, otherwise derived as a SHA-256 over
//! `(author, content)`, so reloading the same file is a no-op either way.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::embedding::Embedder;
use crate::models::{IngestionReport, InsertOutcome, PositionContent, PositionRecord};
use crate::store::VectorStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionFormat {
    Pipe,
    Json,
}

impl PositionFormat {
    /// Infer the format from a file extension; `--format` overrides.
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => PositionFormat::Json,
            _ => PositionFormat::Pipe,
        }
    }
}

impl std::str::FromStr for PositionFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pipe" => Ok(PositionFormat::Pipe),
            "json" => Ok(PositionFormat::Json),
            other => bail!("Unknown position format: {}. Use pipe or json.", other),
        }
    }
}

/// A position parsed from an import file, before id derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPosition {
    pub author: String,
    pub content: PositionContent,
}

/// Parse an import file. `default_author` covers entries that do not
/// name one; pipe files with neither fail.
pub fn parse_positions(
    text: &str,
    format: PositionFormat,
    default_author: Option<&str>,
) -> Result<Vec<ParsedPosition>> {
    match format {
        PositionFormat::Pipe => parse_pipe(text, default_author),
        PositionFormat::Json => parse_json(text, default_author),
    }
}

fn parse_pipe(text: &str, default_author: Option<&str>) -> Result<Vec<ParsedPosition>> {
    let mut entries = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || !line.contains(" | ") {
            continue;
        }

        let parts: Vec<&str> = line.split(" | ").map(str::trim).collect();
        if parts.len() < 2 {
            continue;
        }

        let author = if parts[0].is_empty() {
            default_author.map(String::from)
        } else {
            Some(parts[0].to_string())
        };
        let Some(author) = author.or_else(|| default_author.map(String::from)) else {
            bail!("Pipe-delimited line names no author and no --author was given: {line}");
        };

        let content = parts[1].to_string();
        if content.is_empty() {
            continue;
        }

        entries.push(ParsedPosition {
            author,
            content: PositionContent {
                content,
                topic: parts.get(2).filter(|t| !t.is_empty()).map(|t| t.to_string()),
                domain: None,
                id: None,
            },
        });
    }

    Ok(entries)
}

fn parse_json(text: &str, default_author: Option<&str>) -> Result<Vec<ParsedPosition>> {
    let value: serde_json::Value =
        serde_json::from_str(text).context("Position file is not valid JSON")?;
    let array = value
        .as_array()
        .context("Position JSON must be an array of objects")?;

    let mut entries = Vec::new();
    let mut malformed = 0usize;

    for item in array {
        let Some(content) = PositionContent::from_json(item) else {
            malformed += 1;
            continue;
        };

        let author = ["author", "thinker"]
            .iter()
            .find_map(|k| item.get(*k).and_then(|v| v.as_str()))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .or_else(|| default_author.map(String::from));

        let Some(author) = author else {
            bail!("Position entry names no author and no --author was given");
        };

        entries.push(ParsedPosition { author, content });
    }

    if malformed > 0 {
        tracing::warn!(malformed, "position entries without content were skipped");
    }

    Ok(entries)
}

/// Stable position id: the source's own id when it has one, else a
/// content hash so reloads always collide with the first load.
pub fn position_id(parsed: &ParsedPosition) -> String {
    if let Some(id) = &parsed.content.id {
        return id.clone();
    }
    let mut hasher = Sha256::new();
    hasher.update(parsed.author.as_bytes());
    hasher.update(b"|");
    hasher.update(parsed.content.content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Load parsed positions into the store, skipping ids already present.
pub async fn import_positions(
    store: &dyn VectorStore,
    embedder: Option<&dyn Embedder>,
    parsed: &[ParsedPosition],
) -> Result<IngestionReport> {
    let mut report = IngestionReport::default();

    for entry in parsed {
        let id = position_id(entry);

        if store.position_exists(&id).await? {
            report.skipped += 1;
            continue;
        }

        let embedding = match embedder {
            Some(embedder) => {
                let texts = [entry.content.content.clone()];
                match embedder.embed(&texts).await {
                    Ok(mut vectors) => {
                        let v = vectors.pop().flatten();
                        if v.is_none() {
                            tracing::warn!(position_id = %id, "position oversize, storing without embedding");
                        }
                        v
                    }
                    Err(e) => {
                        tracing::warn!(position_id = %id, error = %e, "position embedding failed");
                        report.errors += 1;
                        continue;
                    }
                }
            }
            None => None,
        };

        let record = PositionRecord {
            position_id: id,
            author: entry.author.clone(),
            domain: entry.content.domain.clone(),
            topic: entry.content.topic.clone(),
            content: entry.content.content.clone(),
            embedding,
        };

        match store.insert_position(&record).await? {
            InsertOutcome::Inserted => report.inserted += 1,
            InsertOutcome::AlreadyExists => report.skipped += 1,
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const PIPE_FILE: &str = "\
hume | Causation is constant conjunction plus habit. | causation
hume | The self is a bundle of perceptions.
hume | Impressions precede ideas. | epistemology

not a position line
";

    #[test]
    fn test_parse_pipe() {
        let parsed = parse_positions(PIPE_FILE, PositionFormat::Pipe, Some("hume")).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].content.topic.as_deref(), Some("causation"));
        assert_eq!(parsed[1].content.topic, None);
        assert_eq!(parsed[2].content.content, "Impressions precede ideas.");
        assert!(parsed.iter().all(|p| p.author == "hume"));
    }

    #[test]
    fn test_parse_json_variant_fields() {
        let json = r#"[
            { "thinker": "kant", "thesis": "Concepts without intuitions are empty.", "topic": "critique" },
            { "author": "kant", "statement": "Intuitions without concepts are blind." },
            { "position": "Space is the form of outer sense.", "id": 17 },
            { "topic": "no content here" }
        ]"#;
        let parsed = parse_positions(json, PositionFormat::Json, Some("kant")).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].content.content, "Concepts without intuitions are empty.");
        assert_eq!(parsed[1].content.content, "Intuitions without concepts are blind.");
        assert_eq!(parsed[2].content.id.as_deref(), Some("17"));
        assert!(parsed.iter().all(|p| p.author == "kant"));
    }

    #[test]
    fn test_derived_ids_are_stable() {
        let parsed = parse_positions(PIPE_FILE, PositionFormat::Pipe, Some("hume")).unwrap();
        let a = position_id(&parsed[0]);
        let b = position_id(&parsed[0]);
        assert_eq!(a, b);
        assert_ne!(a, position_id(&parsed[1]));
    }

    #[test]
    fn test_format_for_path() {
        assert_eq!(
            PositionFormat::for_path(Path::new("kant_positions.json")),
            PositionFormat::Json
        );
        assert_eq!(
            PositionFormat::for_path(Path::new("kant_positions_v2.txt")),
            PositionFormat::Pipe
        );
    }

    #[tokio::test]
    async fn test_reload_skips_existing_ids() {
        let store = MemoryStore::new();
        let parsed = parse_positions(PIPE_FILE, PositionFormat::Pipe, Some("hume")).unwrap();

        let first = import_positions(&store, None, &parsed).await.unwrap();
        assert_eq!(first.inserted, 3);
        assert_eq!(first.skipped, 0);

        let second = import_positions(&store, None, &parsed).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped, 3);
    }
}
