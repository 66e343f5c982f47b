use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn corpus_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("corpus");
    path
}

const ENQUIRY: &str = "\
All our ideas are copied from impressions, and the mind never perceives any \
real connexion among distinct existences; what we call cause is nothing but \
constant conjunction observed between objects.

When we look about us towards external objects, and consider the operation of \
causes, we are never able, in a single instance, to discover any power or \
necessary connexion between them.

Custom, then, is the great guide of human life; it is that principle alone \
which renders our experience useful to us, and makes us expect, for the \
future, a similar train of events.
";

const TREATISE: &str = "\
The self, when we enter most intimately into what we call ourselves, is \
nothing but a bundle or collection of different perceptions, which succeed \
each other with an inconceivable rapidity.

Reason is, and ought only to be the slave of the passions, and can never \
pretend to any other office than to serve and obey them in every instance.

The identity which we ascribe to the mind of man is only a fictitious one, \
and of a like kind with that which we ascribe to vegetables and animal bodies.
";

const POSITIONS_FILE: &str = "\
hume | Causation reduces to constant conjunction plus the habit of expectation. | causation
hume | The self is a bundle of perceptions with no underlying substance. | personal identity
";

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let hume_dir = root.join("library/hume");
    fs::create_dir_all(&hume_dir).unwrap();
    fs::write(hume_dir.join("Enquiry_Concerning_Human_Understanding.txt"), ENQUIRY).unwrap();
    fs::write(hume_dir.join("Treatise_of_Human_Nature.txt"), TREATISE).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/corpus.sqlite"

[library]
root = "{}/library"
include_globs = ["**/*.txt"]

[chunking]
target_words = 400

[retrieval]
max_results = 6
"#,
        root.display(),
        root.display()
    );

    let config_path = config_dir.join("corpus.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_corpus(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = corpus_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("--progress")
        .arg("off")
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run corpus binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_is_idempotent() {
    let (_tmp, config) = setup_test_env();

    let (stdout, stderr, ok) = run_corpus(&config, &["init"]);
    assert!(ok, "init failed: {stderr}");
    assert!(stdout.contains("Database initialized"));

    let (_, stderr, ok) = run_corpus(&config, &["init"]);
    assert!(ok, "second init failed: {stderr}");
}

#[test]
fn test_ingest_then_search_then_clear() {
    let (_tmp, config) = setup_test_env();
    run_corpus(&config, &["init"]);

    // First run ingests both documents (one chunk each at this size).
    let (stdout, stderr, ok) = run_corpus(&config, &["ingest", "hume"]);
    assert!(ok, "ingest failed: {stderr}");
    assert!(stdout.contains("documents: 2"), "unexpected: {stdout}");
    assert!(stdout.contains("inserted: 2"), "unexpected: {stdout}");
    assert!(stdout.contains("errors: 0"), "unexpected: {stdout}");

    // Second run is a complete no-op: nothing new inserted.
    let (stdout, _, ok) = run_corpus(&config, &["ingest", "hume"]);
    assert!(ok);
    assert!(stdout.contains("inserted: 0"), "reingest wrote rows: {stdout}");
    assert!(stdout.contains("skipped: 2"), "unexpected: {stdout}");

    // Keyword search surfaces the causation chunk first.
    let (stdout, _, ok) = run_corpus(
        &config,
        &["search", "causation custom conjunction", "--author", "hume"],
    );
    assert!(ok);
    assert!(stdout.contains("Enquiry"), "unexpected: {stdout}");
    assert!(stdout.contains("constant conjunction"), "unexpected: {stdout}");

    // Zero keyword overlap is an explicit empty result.
    let (stdout, _, ok) = run_corpus(
        &config,
        &["search", "quantum chromodynamics lattice", "--author", "hume"],
    );
    assert!(ok);
    assert!(stdout.contains("No relevant passages."), "unexpected: {stdout}");

    // Clearing the author empties the corpus.
    let (stdout, _, ok) = run_corpus(&config, &["clear", "hume"]);
    assert!(ok);
    assert!(stdout.contains("cleared"), "unexpected: {stdout}");

    let (stdout, _, ok) = run_corpus(
        &config,
        &["search", "causation custom conjunction", "--author", "hume"],
    );
    assert!(ok);
    assert!(stdout.contains("No relevant passages."));
}

#[test]
fn test_positions_import_skips_on_reload() {
    let (tmp, config) = setup_test_env();
    run_corpus(&config, &["init"]);

    let positions_path = tmp.path().join("hume_positions.txt");
    fs::write(&positions_path, POSITIONS_FILE).unwrap();
    let positions_arg = positions_path.to_str().unwrap();

    let (stdout, stderr, ok) = run_corpus(&config, &["positions", positions_arg]);
    assert!(ok, "positions import failed: {stderr}");
    assert!(stdout.contains("inserted: 2"), "unexpected: {stdout}");

    let (stdout, _, ok) = run_corpus(&config, &["positions", positions_arg]);
    assert!(ok);
    assert!(stdout.contains("inserted: 0"), "reload wrote rows: {stdout}");
    assert!(stdout.contains("skipped: 2"), "unexpected: {stdout}");
}

#[test]
fn test_audit_report_export() {
    let (tmp, config) = setup_test_env();
    run_corpus(&config, &["init"]);
    run_corpus(&config, &["ingest", "hume"]);

    let positions_path = tmp.path().join("hume_positions.txt");
    fs::write(&positions_path, POSITIONS_FILE).unwrap();
    run_corpus(&config, &["positions", positions_path.to_str().unwrap()]);

    let report_path = tmp.path().join("reports/audit.txt");
    let (_, stderr, ok) = run_corpus(
        &config,
        &[
            "audit",
            "causation habit expectation conjunction",
            "--author",
            "hume",
            "--output",
            report_path.to_str().unwrap(),
        ],
    );
    assert!(ok, "audit failed: {stderr}");

    let report = fs::read_to_string(&report_path).unwrap();
    assert!(report.contains("AUDIT REPORT"), "unexpected: {report}");
    assert!(report.contains("SEARCH_START (positions)"), "unexpected: {report}");
    assert!(report.contains("COMPLETE"), "unexpected: {report}");
    assert!(report.contains("END OF AUDIT REPORT"));

    // JSON export parses and preserves event order.
    let json_path = tmp.path().join("reports/audit.json");
    let (_, _, ok) = run_corpus(
        &config,
        &[
            "audit",
            "causation habit expectation conjunction",
            "--author",
            "hume",
            "--format",
            "json",
            "--output",
            json_path.to_str().unwrap(),
        ],
    );
    assert!(ok);
    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    let events = value["trace"]["events"].as_array().unwrap();
    assert_eq!(events.first().unwrap()["type"], "query");
    assert_eq!(events.last().unwrap()["type"], "complete");
}

#[test]
fn test_stats_reports_counts() {
    let (_tmp, config) = setup_test_env();
    run_corpus(&config, &["init"]);
    run_corpus(&config, &["ingest", "hume"]);

    let (stdout, stderr, ok) = run_corpus(&config, &["stats"]);
    assert!(ok, "stats failed: {stderr}");
    assert!(stdout.contains("Passages:"), "unexpected: {stdout}");
    assert!(stdout.contains("hume"), "unexpected: {stdout}");
}

#[test]
fn test_authors_lists_library_folders() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, ok) = run_corpus(&config, &["authors"]);
    assert!(ok);
    assert!(stdout.contains("hume"));
}

#[test]
fn test_vector_mode_without_provider_fails_cleanly() {
    let (_tmp, config) = setup_test_env();
    run_corpus(&config, &["init"]);

    let (_, stderr, ok) = run_corpus(
        &config,
        &["search", "anything", "--author", "hume", "--mode", "vector"],
    );
    assert!(!ok);
    assert!(stderr.contains("requires embeddings"), "unexpected: {stderr}");
}
