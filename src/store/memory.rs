//! In-memory [`Store`] implementation for testing.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Ranked search returns an empty result set (no FTS index); substring
//! search is a case-insensitive scan so the fallback path can be exercised.
//! Every write call's size is recorded for batching assertions.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{
    NormalizedDocument, SearchFilters, SearchHit, SyncLogEntry, SyncOutcome, SyncStatus,
    ThemeNode,
};

use super::Store;

/// In-memory store for tests.
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, NormalizedDocument>>,
    themes: RwLock<HashMap<String, ThemeNode>>,
    log: RwLock<Vec<SyncLogEntry>>,
    document_writes: RwLock<Vec<usize>>,
    theme_writes: RwLock<Vec<usize>>,
    batch_ceiling: usize,
    fail_after: Option<usize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            themes: RwLock::new(HashMap::new()),
            log: RwLock::new(Vec::new()),
            document_writes: RwLock::new(Vec::new()),
            theme_writes: RwLock::new(Vec::new()),
            batch_ceiling: usize::MAX,
            fail_after: None,
        }
    }

    /// Reject document and theme writes larger than `ceiling`.
    pub fn with_batch_ceiling(mut self, ceiling: usize) -> Self {
        self.batch_ceiling = ceiling;
        self
    }

    /// Accept `writes` document write calls, then fail every later one.
    pub fn failing_after(mut self, writes: usize) -> Self {
        self.fail_after = Some(writes);
        self
    }

    pub fn documents(&self) -> Vec<NormalizedDocument> {
        let mut docs: Vec<_> = self.docs.read().unwrap().values().cloned().collect();
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        docs
    }

    pub fn themes(&self) -> Vec<ThemeNode> {
        let mut themes: Vec<_> = self.themes.read().unwrap().values().cloned().collect();
        themes.sort_by(|a, b| a.id.cmp(&b.id));
        themes
    }

    pub fn sync_log(&self) -> Vec<SyncLogEntry> {
        self.log.read().unwrap().clone()
    }

    /// Row counts of every accepted document write call, in order.
    pub fn document_writes(&self) -> Vec<usize> {
        self.document_writes.read().unwrap().clone()
    }

    pub fn theme_writes(&self) -> Vec<usize> {
        self.theme_writes.read().unwrap().clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_filters(doc: &NormalizedDocument, filters: &SearchFilters) -> bool {
    if let Some(theme) = &filters.theme {
        let by_id = doc.theme_id.as_deref() == Some(theme.as_str());
        let by_title = doc
            .theme_title
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(theme));
        if !by_id && !by_title {
            return false;
        }
    }
    if let Some(audience) = &filters.audience {
        let found = doc
            .audience
            .as_deref()
            .is_some_and(|a| a.to_lowercase().contains(&audience.to_lowercase()));
        if !found {
            return false;
        }
    }
    true
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_documents(&self, docs: &[NormalizedDocument]) -> Result<()> {
        if docs.len() > self.batch_ceiling {
            bail!(
                "write of {} rows exceeds the batch ceiling of {}",
                docs.len(),
                self.batch_ceiling
            );
        }
        let mut writes = self.document_writes.write().unwrap();
        if let Some(limit) = self.fail_after {
            if writes.len() >= limit {
                bail!("simulated storage failure");
            }
        }
        writes.push(docs.len());

        let mut stored = self.docs.write().unwrap();
        for doc in docs {
            stored.insert(doc.id.clone(), doc.clone());
        }
        Ok(())
    }

    async fn upsert_themes(&self, nodes: &[ThemeNode]) -> Result<()> {
        if nodes.len() > self.batch_ceiling {
            bail!(
                "write of {} rows exceeds the batch ceiling of {}",
                nodes.len(),
                self.batch_ceiling
            );
        }
        self.theme_writes.write().unwrap().push(nodes.len());

        let mut stored = self.themes.write().unwrap();
        for node in nodes {
            stored.insert(node.id.clone(), node.clone());
        }
        Ok(())
    }

    async fn begin_sync(&self, stale_after: Duration) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let cutoff = now - stale_after.as_secs() as i64;
        let mut log = self.log.write().unwrap();

        for entry in log.iter_mut() {
            if entry.status == SyncStatus::Running && entry.started_at <= cutoff {
                entry.status = SyncStatus::Error("abandoned".to_string());
                entry.completed_at = Some(now);
            }
        }
        if log.iter().any(|e| e.status == SyncStatus::Running) {
            bail!("another sync is already running");
        }

        let id = log.last().map(|e| e.id + 1).unwrap_or(1);
        log.push(SyncLogEntry {
            id,
            started_at: now,
            completed_at: None,
            document_count: None,
            error_count: None,
            status: SyncStatus::Running,
        });
        Ok(id)
    }

    async fn finish_sync(&self, id: i64, outcome: &SyncOutcome) -> Result<()> {
        let mut log = self.log.write().unwrap();
        let Some(entry) = log
            .iter_mut()
            .find(|e| e.id == id && e.status == SyncStatus::Running)
        else {
            bail!("sync log #{} is not running", id);
        };

        entry.completed_at = Some(chrono::Utc::now().timestamp());
        match outcome {
            SyncOutcome::Completed { documents, errors } => {
                entry.status = SyncStatus::Completed;
                entry.document_count = Some(*documents as i64);
                entry.error_count = Some(*errors as i64);
            }
            SyncOutcome::Failed { message } => {
                entry.status = SyncStatus::Error(message.clone());
            }
        }
        Ok(())
    }

    async fn recent_syncs(&self, limit: i64) -> Result<Vec<SyncLogEntry>> {
        let log = self.log.read().unwrap();
        Ok(log.iter().rev().take(limit.max(0) as usize).cloned().collect())
    }

    async fn get_document(&self, id: &str) -> Result<Option<NormalizedDocument>> {
        Ok(self.docs.read().unwrap().get(id).cloned())
    }

    async fn ranked_search(
        &self,
        _terms: &[String],
        _filters: &SearchFilters,
        _limit: i64,
    ) -> Result<Vec<SearchHit>> {
        Ok(Vec::new())
    }

    async fn substring_search(
        &self,
        terms: &[String],
        filters: &SearchFilters,
        limit: i64,
    ) -> Result<Vec<SearchHit>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let terms: Vec<String> = terms.iter().map(|t| t.to_lowercase()).collect();
        let docs = self.docs.read().unwrap();

        let mut hits: Vec<SearchHit> = docs
            .values()
            .filter(|doc| matches_filters(doc, filters))
            .filter(|doc| {
                let title = doc.title.to_lowercase();
                let description = doc.description.as_deref().unwrap_or("").to_lowercase();
                terms
                    .iter()
                    .all(|t| title.contains(t.as_str()) || description.contains(t.as_str()))
            })
            .map(|doc| SearchHit {
                id: doc.id.clone(),
                kind: doc.kind,
                title: doc.title.clone(),
                snippet: None,
                description: doc.description.clone(),
                theme: doc.theme_title.clone(),
                folder: doc.folder_title.clone(),
                url: doc.url.clone(),
                score: 0.0,
            })
            .collect();

        hits.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(limit.max(0) as usize);
        Ok(hits)
    }
}
