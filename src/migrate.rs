use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table, index and trigger. Safe to run repeatedly.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Create documents table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            subject TEXT,
            audience TEXT,
            url TEXT NOT NULL,
            theme_id TEXT,
            theme_title TEXT,
            subtheme TEXT,
            folder_id TEXT,
            folder_title TEXT,
            full_text TEXT NOT NULL DEFAULT '',
            legal_references TEXT NOT NULL DEFAULT '[]',
            online_services TEXT NOT NULL DEFAULT '[]',
            internal_links TEXT NOT NULL DEFAULT '[]',
            last_modified TEXT,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create themes table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS themes (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            parent_id TEXT REFERENCES themes(id) DEFERRABLE INITIALLY DEFERRED
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create sync log table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at INTEGER NOT NULL,
            completed_at INTEGER,
            document_count INTEGER,
            error_count INTEGER,
            status TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is checked first, as for any virtual table
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='documents_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        // External content: rows live in `documents`, the triggers below
        // keep the index in step. Rowids are never rewritten (no VACUUM).
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE documents_fts USING fts5(
                id,
                title,
                description,
                full_text,
                content='documents',
                content_rowid='rowid',
                tokenize='unicode61 remove_diacritics 2'
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS documents_ai AFTER INSERT ON documents BEGIN
            INSERT INTO documents_fts(rowid, id, title, description, full_text)
            VALUES (new.rowid, new.id, new.title, new.description, new.full_text);
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS documents_ad AFTER DELETE ON documents BEGIN
            INSERT INTO documents_fts(documents_fts, rowid, id, title, description, full_text)
            VALUES ('delete', old.rowid, old.id, old.title, old.description, old.full_text);
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS documents_au AFTER UPDATE ON documents BEGIN
            INSERT INTO documents_fts(documents_fts, rowid, id, title, description, full_text)
            VALUES ('delete', old.rowid, old.id, old.title, old.description, old.full_text);
            INSERT INTO documents_fts(rowid, id, title, description, full_text)
            VALUES (new.rowid, new.id, new.title, new.description, new.full_text);
        END
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_kind ON documents(kind)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_theme_id ON documents(theme_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_themes_parent_id ON themes(parent_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sync_log_status ON sync_log(status)")
        .execute(pool)
        .await?;

    Ok(())
}
