//! SQLite-backed [`Store`] implementation.
//!
//! Documents, themes and the sync log live in plain tables. The FTS5 index
//! `documents_fts` is external-content and maintained by triggers (see
//! `migrate`), so this module never writes to it.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::{
    DocumentKind, NormalizedDocument, SearchFilters, SearchHit, SyncLogEntry, SyncOutcome,
    SyncStatus, ThemeNode,
};
use crate::search::fts_match_expression;

use super::Store;

/// SQLite implementation of the [`Store`] trait.
///
/// `batch_ceiling` is the most rows a single write call may carry; each
/// call runs in its own transaction.
pub struct SqliteStore {
    pool: SqlitePool,
    batch_ceiling: usize,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, batch_ceiling: usize) -> Self {
        Self {
            pool,
            batch_ceiling,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn check_ceiling(&self, rows: usize) -> Result<()> {
        if rows > self.batch_ceiling {
            bail!(
                "write of {} rows exceeds the batch ceiling of {}",
                rows,
                self.batch_ceiling
            );
        }
        Ok(())
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn from_json<T: serde::de::DeserializeOwned + Default>(raw: &str) -> T {
    serde_json::from_str(raw).unwrap_or_default()
}

fn document_from_row(row: &SqliteRow) -> NormalizedDocument {
    let kind: String = row.get("kind");
    let legal_references: String = row.get("legal_references");
    let online_services: String = row.get("online_services");
    let internal_links: String = row.get("internal_links");

    NormalizedDocument {
        id: row.get("id"),
        kind: DocumentKind::parse(&kind),
        title: row.get("title"),
        description: row.get("description"),
        subject: row.get("subject"),
        audience: row.get("audience"),
        url: row.get("url"),
        theme_id: row.get("theme_id"),
        theme_title: row.get("theme_title"),
        subtheme: row.get("subtheme"),
        folder_id: row.get("folder_id"),
        folder_title: row.get("folder_title"),
        full_text: row.get("full_text"),
        legal_references: from_json(&legal_references),
        online_services: from_json(&online_services),
        internal_links: from_json(&internal_links),
        last_modified: row.get("last_modified"),
    }
}

fn hit_from_row(row: &SqliteRow, with_snippet: bool) -> SearchHit {
    let kind: String = row.get("kind");
    SearchHit {
        id: row.get("id"),
        kind: DocumentKind::parse(&kind),
        title: row.get("title"),
        snippet: if with_snippet {
            row.get("snippet")
        } else {
            None
        },
        description: row.get("description"),
        theme: row.get("theme_title"),
        folder: row.get("folder_title"),
        url: row.get("url"),
        score: row.get("score"),
    }
}

/// Escape `%`, `_` and the escape character itself for a LIKE pattern.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_documents(&self, docs: &[NormalizedDocument]) -> Result<()> {
        self.check_ceiling(docs.len())?;
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for doc in docs {
            sqlx::query(
                r#"
                INSERT INTO documents (id, kind, title, description, subject, audience, url,
                                       theme_id, theme_title, subtheme, folder_id, folder_title,
                                       full_text, legal_references, online_services,
                                       internal_links, last_modified, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    kind = excluded.kind,
                    title = excluded.title,
                    description = excluded.description,
                    subject = excluded.subject,
                    audience = excluded.audience,
                    url = excluded.url,
                    theme_id = excluded.theme_id,
                    theme_title = excluded.theme_title,
                    subtheme = excluded.subtheme,
                    folder_id = excluded.folder_id,
                    folder_title = excluded.folder_title,
                    full_text = excluded.full_text,
                    legal_references = excluded.legal_references,
                    online_services = excluded.online_services,
                    internal_links = excluded.internal_links,
                    last_modified = excluded.last_modified,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&doc.id)
            .bind(doc.kind.as_str())
            .bind(&doc.title)
            .bind(&doc.description)
            .bind(&doc.subject)
            .bind(&doc.audience)
            .bind(&doc.url)
            .bind(&doc.theme_id)
            .bind(&doc.theme_title)
            .bind(&doc.subtheme)
            .bind(&doc.folder_id)
            .bind(&doc.folder_title)
            .bind(&doc.full_text)
            .bind(to_json(&doc.legal_references)?)
            .bind(to_json(&doc.online_services)?)
            .bind(to_json(&doc.internal_links)?)
            .bind(&doc.last_modified)
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to upsert document {}", doc.id))?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_themes(&self, nodes: &[ThemeNode]) -> Result<()> {
        self.check_ceiling(nodes.len())?;
        let mut tx = self.pool.begin().await?;

        for node in nodes {
            sqlx::query(
                r#"
                INSERT INTO themes (id, kind, title, parent_id) VALUES (?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    kind = excluded.kind,
                    title = excluded.title,
                    parent_id = excluded.parent_id
                "#,
            )
            .bind(&node.id)
            .bind(node.kind.as_str())
            .bind(&node.title)
            .bind(&node.parent_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to upsert theme {}", node.id))?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn begin_sync(&self, stale_after: Duration) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let cutoff = now - stale_after.as_secs() as i64;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE sync_log SET status = 'error: abandoned', completed_at = ?
            WHERE status = 'running' AND started_at <= ?
            "#,
        )
        .bind(now)
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO sync_log (started_at, status)
            SELECT ?, 'running'
            WHERE NOT EXISTS (SELECT 1 FROM sync_log WHERE status = 'running')
            "#,
        )
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            bail!("another sync is already running");
        }
        let id = result.last_insert_rowid();

        tx.commit().await?;
        Ok(id)
    }

    async fn finish_sync(&self, id: i64, outcome: &SyncOutcome) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        let result = match outcome {
            SyncOutcome::Completed { documents, errors } => {
                sqlx::query(
                    r#"
                    UPDATE sync_log
                    SET status = 'completed', completed_at = ?, document_count = ?, error_count = ?
                    WHERE id = ? AND status = 'running'
                    "#,
                )
                .bind(now)
                .bind(*documents as i64)
                .bind(*errors as i64)
                .bind(id)
                .execute(&self.pool)
                .await?
            }
            SyncOutcome::Failed { message } => {
                sqlx::query(
                    "UPDATE sync_log SET status = ?, completed_at = ? WHERE id = ? AND status = 'running'",
                )
                .bind(SyncStatus::Error(message.clone()).to_db())
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            bail!("sync log #{} is not running", id);
        }
        Ok(())
    }

    async fn recent_syncs(&self, limit: i64) -> Result<Vec<SyncLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, started_at, completed_at, document_count, error_count, status
            FROM sync_log
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let status: String = row.get("status");
                SyncLogEntry {
                    id: row.get("id"),
                    started_at: row.get("started_at"),
                    completed_at: row.get("completed_at"),
                    document_count: row.get("document_count"),
                    error_count: row.get("error_count"),
                    status: SyncStatus::from_db(&status),
                }
            })
            .collect())
    }

    async fn get_document(&self, id: &str) -> Result<Option<NormalizedDocument>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(document_from_row))
    }

    async fn ranked_search(
        &self,
        terms: &[String],
        filters: &SearchFilters,
        limit: i64,
    ) -> Result<Vec<SearchHit>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        // bm25 weights follow the column order: id, title, description, full_text
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.kind, d.title, d.description, d.theme_title, d.folder_title, d.url,
                   snippet(documents_fts, 3, '>>>', '<<<', '...', 24) AS snippet,
                   -bm25(documents_fts, 2.0, 10.0, 5.0, 1.0) AS score
            FROM documents_fts
            JOIN documents d ON d.rowid = documents_fts.rowid
            WHERE documents_fts MATCH ?1
              AND (?2 IS NULL OR d.theme_id = ?2 OR d.theme_title = ?2 COLLATE NOCASE)
              AND (?3 IS NULL OR d.audience LIKE ?3 ESCAPE '\')
            ORDER BY score DESC, d.id ASC
            LIMIT ?4
            "#,
        )
        .bind(fts_match_expression(terms))
        .bind(&filters.theme)
        .bind(filters.audience.as_deref().map(like_pattern))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| hit_from_row(row, true)).collect())
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

        let mut sql = String::from(
            "SELECT d.id, d.kind, d.title, d.description, d.theme_title, d.folder_title, d.url, \
             0.0 AS score FROM documents d WHERE 1 = 1",
        );
        for _ in terms {
            sql.push_str(
                " AND (d.title LIKE ? ESCAPE '\\' OR IFNULL(d.description, '') LIKE ? ESCAPE '\\')",
            );
        }
        if filters.theme.is_some() {
            sql.push_str(" AND (d.theme_id = ? OR d.theme_title = ? COLLATE NOCASE)");
        }
        if filters.audience.is_some() {
            sql.push_str(" AND d.audience LIKE ? ESCAPE '\\'");
        }
        sql.push_str(" ORDER BY d.title ASC, d.id ASC LIMIT ?");

        let mut query = sqlx::query(&sql);
        for term in terms {
            let pattern = like_pattern(term);
            query = query.bind(pattern.clone()).bind(pattern);
        }
        if let Some(theme) = &filters.theme {
            query = query.bind(theme.clone()).bind(theme.clone());
        }
        if let Some(audience) = &filters.audience {
            query = query.bind(like_pattern(audience));
        }
        let rows = query.bind(limit).fetch_all(&self.pool).await?;

        Ok(rows.iter().map(|row| hit_from_row(row, false)).collect())
    }
}
