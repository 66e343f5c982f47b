//! Corpus scanning: one folder per author under the library root.
//!
//! This is the single parameterized replacement for what used to be a
//! per-author ingestion script: point it at an author's folder and it
//! yields the ordered set of source documents to ingest. File names
//! carry light-weight typing, the same convention the raw archives use:
//! a name containing `_quotes` marks a verbatim-quote collection (the
//! passages are tagged so retrieval can search them as their own
//! class), and a name containing `_positions` is skipped here because
//! position files go through the structured import instead.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::LibraryConfig;
use crate::models::SourceDocument;

/// File classification derived from the file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Text,
    Quotes,
    Positions,
}

fn classify(file_name: &str) -> FileKind {
    let lower = file_name.to_lowercase();
    if lower.contains("_positions") {
        FileKind::Positions
    } else if lower.contains("_quotes") {
        FileKind::Quotes
    } else {
        FileKind::Text
    }
}

/// Scan one author's folder into source documents, deterministically
/// ordered by title.
pub fn scan_author(
    library: &LibraryConfig,
    author: &str,
    domain: Option<&str>,
) -> Result<Vec<SourceDocument>> {
    let author_dir = library.root.join(author);
    if !author_dir.is_dir() {
        bail!(
            "No corpus folder for author '{}' under {}",
            author,
            library.root.display()
        );
    }

    let include_set = build_globset(&library.include_globs)?;
    let exclude_set = build_globset(&library.exclude_globs)?;

    let mut documents = Vec::new();

    for entry in WalkDir::new(&author_dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(&author_dir).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        match classify(&file_name) {
            FileKind::Positions => {
                tracing::debug!(file = %rel_str, "skipping positions file in corpus scan");
                continue;
            }
            kind => {
                let body = std::fs::read_to_string(path)?;
                documents.push(SourceDocument {
                    author: author.to_string(),
                    title: title_from_path(path),
                    domain: domain.map(String::from),
                    significance: match kind {
                        FileKind::Quotes => Some("quote".to_string()),
                        _ => None,
                    },
                    source_work: Some(rel_str),
                    body,
                });
            }
        }
    }

    documents.sort_by(|a, b| a.title.cmp(&b.title));

    Ok(documents)
}

/// List the author folders available under the library root.
pub fn list_authors(library: &LibraryConfig) -> Result<Vec<String>> {
    if !library.root.is_dir() {
        bail!("Library root does not exist: {}", library.root.display());
    }

    let mut authors = Vec::new();
    for entry in std::fs::read_dir(&library.root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            authors.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    authors.sort();
    Ok(authors)
}

/// Derive a document title from a file path: the stem with underscores
/// replaced by spaces.
fn title_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().replace('_', " "))
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn library(root: PathBuf) -> LibraryConfig {
        LibraryConfig {
            root,
            include_globs: vec!["**/*.txt".to_string()],
            exclude_globs: vec![],
        }
    }

    #[test]
    fn test_scan_orders_and_classifies() {
        let dir = tempfile::tempdir().unwrap();
        let hume = dir.path().join("hume");
        std::fs::create_dir_all(&hume).unwrap();
        std::fs::write(hume.join("Treatise_of_Human_Nature.txt"), "body a").unwrap();
        std::fs::write(hume.join("Enquiry.txt"), "body b").unwrap();
        std::fs::write(hume.join("hume_quotes_collected.txt"), "body c").unwrap();
        std::fs::write(hume.join("hume_positions_v2.txt"), "ignored").unwrap();
        std::fs::write(hume.join("notes.md"), "ignored").unwrap();

        let docs = scan_author(&library(dir.path().to_path_buf()), "hume", Some("empiricism"))
            .unwrap();

        let titles: Vec<&str> = docs.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Enquiry",
                "Treatise of Human Nature",
                "hume quotes collected"
            ]
        );
        assert!(docs.iter().all(|d| d.author == "hume"));
        assert!(docs.iter().all(|d| d.domain.as_deref() == Some("empiricism")));
        assert_eq!(
            docs.iter()
                .filter(|d| d.significance.as_deref() == Some("quote"))
                .count(),
            1
        );
    }

    #[test]
    fn test_missing_author_folder_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_author(&library(dir.path().to_path_buf()), "nobody", None).is_err());
    }

    #[test]
    fn test_list_authors_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for a in ["kant", "hume", "spinoza"] {
            std::fs::create_dir_all(dir.path().join(a)).unwrap();
        }
        let authors = list_authors(&library(dir.path().to_path_buf())).unwrap();
        assert_eq!(authors, vec!["hume", "kant", "spinoza"]);
    }
}
