//! Database statistics and sync health overview.
//!
//! Provides a quick summary of what's indexed: document counts per kind,
//! hierarchy size, and the most recent sync runs. Used by `vdi stats` to
//! confirm that syncs are landing.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::models::{SyncLogEntry, SyncStatus};
use crate::store::{SqliteStore, Store};

/// Recent sync runs shown by `vdi stats`.
const RECENT_SYNCS: i64 = 5;

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await?;

    let total_themes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM themes")
        .fetch_one(&pool)
        .await?;

    let kind_rows = sqlx::query(
        "SELECT kind, COUNT(*) AS doc_count FROM documents GROUP BY kind ORDER BY doc_count DESC",
    )
    .fetch_all(&pool)
    .await?;

    let store = SqliteStore::new(pool.clone(), config.sync.batch_ceiling);
    let syncs = store.recent_syncs(RECENT_SYNCS).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("vosdroits index — Database Stats");
    println!("================================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", total_docs);
    println!("  Themes:      {}", total_themes);

    if !kind_rows.is_empty() {
        println!();
        println!("  By kind:");
        for row in &kind_rows {
            let kind: String = row.get("kind");
            let count: i64 = row.get("doc_count");
            println!("  {:<12} {:>8}", kind, count);
        }
    }

    println!();
    if syncs.is_empty() {
        println!("  Syncs:       never");
    } else {
        println!("  Recent syncs:");
        println!(
            "  {:<6} {:<18} {:>8} {:>7}   {}",
            "ID", "STARTED", "DOCS", "ERRORS", "STATUS"
        );
        println!("  {}", "-".repeat(70));
        for entry in &syncs {
            println!("  {}", format_sync_row(entry));
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

fn format_sync_row(entry: &SyncLogEntry) -> String {
    let count = |c: Option<i64>| c.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string());
    let status = match &entry.status {
        SyncStatus::Running => "running".to_string(),
        SyncStatus::Completed => "completed".to_string(),
        SyncStatus::Error(message) => format!("error: {}", first_line(message, 40)),
    };
    format!(
        "{:<6} {:<18} {:>8} {:>7}   {}",
        entry.id,
        format_ts_iso(entry.started_at),
        count(entry.document_count),
        count(entry.error_count),
        status
    )
}

fn first_line(message: &str, max_chars: usize) -> String {
    let line = message.lines().next().unwrap_or("");
    if line.chars().count() > max_chars {
        let cut: String = line.chars().take(max_chars).collect();
        format!("{}…", cut)
    } else {
        line.to_string()
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
