use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use axum::routing::get;
use axum::Router;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const PASSPORT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Publication xmlns:dc="http://purl.org/dc/elements/1.1/" ID="F14929">
  <dc:title>Passeport biométrique</dc:title>
  <dc:description>Comment obtenir un passeport ?</dc:description>
  <Audience>Particuliers</Audience>
  <FilDAriane>
    <Niveau ID="N19810" type="Thème">Papiers - Citoyenneté</Niveau>
    <Niveau ID="N360" type="Dossier">Passeport</Niveau>
  </FilDAriane>
  <Texte><Paragraphe>La demande se fait en mairie.</Paragraphe></Texte>
</Publication>
"#;

const FORM_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Formulaire ID="R42">
  <Titre>Formulaire cerfa 12100</Titre>
  <Texte>Déclaration de changement de situation.</Texte>
</Formulaire>
"#;

const HIERARCHY_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Arborescence>
  <Item ID="N19810"><Titre>Papiers - Citoyenneté</Titre>
    <Item ID="N19811"><Titre>Identité</Titre>
      <Item ID="N360"><Titre>Passeport</Titre></Item>
    </Item>
  </Item>
</Arborescence>
"#;

fn vdi_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("vdi");
    path
}

fn build_archive() -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, content) in [
        ("vosdroits/F14929.xml", PASSPORT_XML),
        ("vosdroits/R42.xml", FORM_XML),
        ("vosdroits/LISEZMOI.txt", "not indexed"),
        ("vosdroits/arborescence.xml", HIERARCHY_XML),
    ] {
        writer.start_file(name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Serve the archive fixture on a local port and return the base URL.
/// Any other path answers 404.
fn serve_archive() -> String {
    let archive = build_archive();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            let app = Router::new().route(
                "/vosdroits-latest.zip",
                get(move || {
                    let archive = archive.clone();
                    async move { archive }
                }),
            );
            axum::serve(listener, app).await.unwrap();
        });
    });

    format!("http://{}", addr)
}

fn setup_test_env() -> (TempDir, PathBuf, String) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let base_url = serve_archive();

    let config_content = format!(
        r#"[db]
path = "{}/data/vdi.sqlite"

[archive]
url = "{}/vosdroits-latest.zip"
timeout_secs = 30
channel_capacity = 2

[sync]
flush_threshold = 1
batch_ceiling = 1

[logging]
level = "warn"
"#,
        root.display(),
        base_url
    );

    let config_path = config_dir.join("vdi.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path, base_url)
}

fn run_vdi(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = vdi_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run vdi binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn synced_env() -> (TempDir, PathBuf) {
    let (tmp, config_path, _) = setup_test_env();
    run_vdi(&config_path, &["init"]);
    let (stdout, stderr, success) = run_vdi(&config_path, &["sync", "--progress", "off"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    (tmp, config_path)
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path, _) = setup_test_env();

    let (stdout, stderr, success) = run_vdi(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path, _) = setup_test_env();

    let (_, _, success1) = run_vdi(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_vdi(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_sync_archive() {
    let (_tmp, config_path, _) = setup_test_env();

    run_vdi(&config_path, &["init"]);
    let (stdout, stderr, success) = run_vdi(&config_path, &["sync", "--progress", "off"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("documents upserted: 2"));
    assert!(stdout.contains("themes upserted: 3"));
    assert!(stdout.contains("entries skipped: 0"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_sync_idempotent_no_duplicates() {
    let (_tmp, config_path) = synced_env();

    let (_, _, success) = run_vdi(&config_path, &["sync", "--progress", "off"]);
    assert!(success, "second sync failed");

    let (stdout, _, _) = run_vdi(&config_path, &["stats"]);
    assert!(stdout.contains("Documents:   2"), "stats: {}", stdout);
    assert!(stdout.contains("Themes:      3"), "stats: {}", stdout);
}

#[test]
fn test_search_finds_synced_document() {
    let (_tmp, config_path) = synced_env();

    let (stdout, stderr, success) = run_vdi(&config_path, &["search", "passeport"]);
    assert!(success, "search failed: stderr={}", stderr);
    assert!(stdout.contains("id: F14929"));
    assert!(stdout.contains("Passeport biométrique"));
}

#[test]
fn test_search_json_output() {
    let (_tmp, config_path) = synced_env();

    let (stdout, _, success) = run_vdi(&config_path, &["search", "cerfa AND 12100", "--json"]);
    assert!(success);
    let outcome: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(outcome["sanitized"], "cerfa 12100");
    assert_eq!(outcome["strategy"], "ranked");
    assert_eq!(outcome["hits"][0]["id"], "R42");
}

#[test]
fn test_search_partial_word_uses_fallback() {
    let (_tmp, config_path) = synced_env();

    let (stdout, _, success) = run_vdi(&config_path, &["search", "passep"]);
    assert!(success);
    assert!(stdout.contains("no ranked matches"));
    assert!(stdout.contains("id: F14929"));
}

#[test]
fn test_search_no_results() {
    let (_tmp, config_path) = synced_env();

    let (stdout, _, success) = run_vdi(&config_path, &["search", "zzzznotfound"]);
    assert!(success);
    assert!(stdout.contains("No results."));

    let (stdout, _, success) = run_vdi(&config_path, &["search", "--", "--- *** ()"]);
    assert!(success);
    assert!(stdout.contains("No searchable terms."));
}

#[test]
fn test_search_theme_filter() {
    let (_tmp, config_path) = synced_env();

    let (stdout, _, _) = run_vdi(
        &config_path,
        &["search", "passeport", "--theme", "N19810", "--json"],
    );
    let outcome: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(outcome["hits"].as_array().unwrap().len(), 1);

    let (stdout, _, _) = run_vdi(
        &config_path,
        &["search", "passeport", "--theme", "N1", "--json"],
    );
    let outcome: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(outcome["hits"].as_array().unwrap().is_empty());
}

#[test]
fn test_get_document() {
    let (_tmp, config_path) = synced_env();

    let (stdout, _, success) = run_vdi(&config_path, &["get", "F14929"]);
    assert!(success);
    assert!(stdout.contains("Passeport biométrique"));
    assert!(stdout.contains("https://www.service-public.fr/particuliers/vosdroits/F14929"));

    let (stdout, _, success) = run_vdi(&config_path, &["get", "F14929", "--json"]);
    assert!(success);
    let doc: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(doc["theme_id"], "N19810");
    assert_eq!(doc["kind"], "procedure");
}

#[test]
fn test_get_nonexistent_document() {
    let (_tmp, config_path) = synced_env();

    let (_, stderr, success) = run_vdi(&config_path, &["get", "F999999"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_failed_download_is_recorded() {
    let (_tmp, config_path, base_url) = setup_test_env();
    run_vdi(&config_path, &["init"]);

    let missing = format!("{}/missing.zip", base_url);
    let (_, stderr, success) = run_vdi(
        &config_path,
        &["sync", "--url", &missing, "--progress", "off"],
    );
    assert!(!success, "sync of a missing archive should fail");
    assert!(stderr.contains("404"));

    let (stdout, _, success) = run_vdi(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("error: archive download failed"), "stats: {}", stdout);
    assert!(stdout.contains("Documents:   0"));
}

#[test]
fn test_unknown_progress_mode() {
    let (_tmp, config_path, _) = setup_test_env();

    let (_, stderr, success) = run_vdi(&config_path, &["sync", "--progress", "loud"]);
    assert!(!success);
    assert!(stderr.contains("Unknown progress mode"));
}
