//! Raw text normalization applied before chunking.
//!
//! Source files arrive with every line-ending convention in existence
//! (many of the original works were exported from Windows word
//! processors), so everything is collapsed to `\n` before any boundary
//! detection runs. Beyond line endings the only changes are
//! whitespace-level: trailing whitespace is stripped per line and runs
//! of three or more newlines collapse to a paragraph break. No semantic
//! content is altered.

/// Normalize raw source text.
///
/// - `\r\n` and bare `\r` become `\n`.
/// - Trailing spaces/tabs on each line are removed.
/// - Runs of 3+ newlines collapse to exactly two (one blank line).
///
/// Pure function; empty input passes through unchanged.
pub fn normalize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let unified = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut out = String::with_capacity(unified.len());
    let mut pending_blank = false;
    let mut first = true;

    for line in unified.split('\n') {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            // At most one blank line survives between paragraphs; leading
            // and trailing blanks are dropped entirely.
            pending_blank = !first;
            continue;
        }
        if !first {
            out.push('\n');
            if pending_blank {
                out.push('\n');
            }
        }
        out.push_str(trimmed);
        pending_blank = false;
        first = false;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_passthrough() {
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_crlf_collapsed() {
        assert_eq!(normalize("one\r\ntwo\rthree\n"), "one\ntwo\nthree");
    }

    #[test]
    fn test_trailing_whitespace_stripped() {
        assert_eq!(normalize("line one   \nline two\t\n"), "line one\nline two");
    }

    #[test]
    fn test_blank_runs_collapse() {
        assert_eq!(normalize("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(normalize("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_paragraph_break_preserved() {
        let text = "First paragraph.\r\n\r\nSecond paragraph.";
        assert_eq!(normalize(text), "First paragraph.\n\nSecond paragraph.");
    }

    #[test]
    fn test_idempotent() {
        let text = "Alpha.\r\n\r\n\r\nBeta.   \nGamma.";
        let once = normalize(text);
        assert_eq!(normalize(&once), once);
    }
}
