//! Storage abstraction.
//!
//! The [`Store`] trait defines everything ingestion and search need from
//! persistence, so the sync loop and the search engine can run against
//! SQLite in production and an in-memory store in tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    NormalizedDocument, SearchFilters, SearchHit, SyncLogEntry, SyncOutcome, ThemeNode,
};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_documents`](Store::upsert_documents) | One write call for a chunk of documents |
/// | [`upsert_themes`](Store::upsert_themes) | One write call for a chunk of hierarchy nodes |
/// | [`begin_sync`](Store::begin_sync) | Open a `running` audit row |
/// | [`finish_sync`](Store::finish_sync) | Close an audit row exactly once |
/// | [`recent_syncs`](Store::recent_syncs) | Latest audit rows, newest first |
/// | [`get_document`](Store::get_document) | Fetch one document by id |
/// | [`ranked_search`](Store::ranked_search) | Relevance-ranked full-text query |
/// | [`substring_search`](Store::substring_search) | AND of substring matches on title/description |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or replace documents keyed by id. The slice is a single write
    /// call; implementations reject slices above their batch ceiling.
    async fn upsert_documents(&self, docs: &[NormalizedDocument]) -> Result<()>;

    async fn upsert_themes(&self, nodes: &[ThemeNode]) -> Result<()>;

    /// Open a sync run and return its log id.
    ///
    /// Fails while another run is `running` and younger than `stale_after`.
    /// Older `running` rows are closed as abandoned first.
    async fn begin_sync(&self, stale_after: Duration) -> Result<i64>;

    /// Record the terminal state of a run. Errors if the run is not open.
    async fn finish_sync(&self, id: i64, outcome: &SyncOutcome) -> Result<()>;

    async fn recent_syncs(&self, limit: i64) -> Result<Vec<SyncLogEntry>>;

    async fn get_document(&self, id: &str) -> Result<Option<NormalizedDocument>>;

    /// Terms are already sanitized; the backend quotes them for its grammar.
    async fn ranked_search(
        &self,
        terms: &[String],
        filters: &SearchFilters,
        limit: i64,
    ) -> Result<Vec<SearchHit>>;

    async fn substring_search(
        &self,
        terms: &[String],
        filters: &SearchFilters,
        limit: i64,
    ) -> Result<Vec<SearchHit>>;
}

/// Shorten a message to at most `max_chars` characters.
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        message.to_string()
    } else {
        let mut cut: String = message.chars().take(max_chars.saturating_sub(3)).collect();
        cut.push_str("...");
        cut
    }
}
