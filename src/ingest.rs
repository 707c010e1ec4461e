//! Sync orchestration.
//!
//! Coordinates the full sync flow: archive stream → routing → parsing →
//! buffered batch writes → sync log. The archive is consumed in one pass.
//! Parsed documents are buffered and flushed whenever the buffer reaches
//! the flush threshold, so memory stays bounded regardless of archive size.
//!
//! Per-entry failures (undecompressable or unparseable entries) are counted
//! and skipped. Transport failures and write failures abort the run; either
//! way the run's `sync_log` row receives exactly one terminal status.

use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::archive::{fetch_archive, ArchiveItem, EntryRoute, EntryStream};
use crate::config::Config;
use crate::db;
use crate::document::parse_document;
use crate::hierarchy::parse_hierarchy;
use crate::migrate;
use crate::models::{NormalizedDocument, SyncOutcome};
use crate::progress::{SyncProgressEvent, SyncProgressReporter};
use crate::store::{truncate_message, SqliteStore, Store};
use crate::writer::{write_documents, write_themes};

/// Longest error message stored in the sync log.
const MAX_ERROR_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub flush_threshold: usize,
    pub batch_ceiling: usize,
    pub stale_after: Duration,
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            flush_threshold: config.sync.flush_threshold,
            batch_ceiling: config.sync.batch_ceiling,
            stale_after: Duration::from_secs(config.sync.stale_lock_secs),
        }
    }
}

/// Counters for one completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub documents: u64,
    pub themes: u64,
    /// Entries skipped because they could not be read or parsed.
    pub errors: u64,
    pub flushes: u64,
    pub duration: Duration,
}

/// Run one sync against `store`, reading entries from whatever `open`
/// yields.
///
/// The sync log row is opened before `open` is called, so a transport
/// failure is recorded like any other.
///
/// # Errors
///
/// Returns an error if another run holds the lock, if the archive cannot
/// be opened or read, or if a batch write fails.
pub async fn sync_archive<F, Fut>(
    store: &dyn Store,
    options: &SyncOptions,
    open: F,
    progress: &dyn SyncProgressReporter,
) -> Result<SyncReport>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<EntryStream>>,
{
    let started = Instant::now();
    let log_id = store.begin_sync(options.stale_after).await?;
    info!(sync_id = log_id, "sync started");

    let result = match open().await {
        Ok(entries) => ingest_entries(store, options, entries, progress).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(mut report) => {
            report.duration = started.elapsed();
            store
                .finish_sync(
                    log_id,
                    &SyncOutcome::Completed {
                        documents: report.documents,
                        errors: report.errors,
                    },
                )
                .await?;
            info!(
                sync_id = log_id,
                documents = report.documents,
                themes = report.themes,
                errors = report.errors,
                "sync completed"
            );
            Ok(report)
        }
        Err(e) => {
            let message = truncate_message(&format!("{:#}", e), MAX_ERROR_CHARS);
            warn!(sync_id = log_id, error = %message, "sync failed");
            if let Err(log_err) = store
                .finish_sync(log_id, &SyncOutcome::Failed { message })
                .await
            {
                warn!(sync_id = log_id, error = %log_err, "could not record sync failure");
            }
            Err(e)
        }
    }
}

async fn ingest_entries(
    store: &dyn Store,
    options: &SyncOptions,
    mut entries: EntryStream,
    progress: &dyn SyncProgressReporter,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();
    let mut buffer: Vec<NormalizedDocument> = Vec::with_capacity(options.flush_threshold);

    while let Some(item) = entries.next().await {
        let entry = match item? {
            ArchiveItem::Entry(entry) => entry,
            ArchiveItem::Unreadable { name, error } => {
                warn!(entry = %name, error = %error, "skipping unreadable entry");
                report.errors += 1;
                continue;
            }
        };

        match entry.route {
            EntryRoute::Document => match parse_document(&entry.name, &entry.bytes) {
                Ok(doc) => {
                    buffer.push(doc);
                    if buffer.len() >= options.flush_threshold {
                        flush(store, options, &mut buffer, &mut report, progress).await?;
                    }
                }
                Err(e) => {
                    warn!(entry = %entry.name, error = %e, "skipping unparseable document");
                    report.errors += 1;
                }
            },
            EntryRoute::Hierarchy => match parse_hierarchy(&entry.bytes) {
                Ok(nodes) => {
                    write_themes(store, &nodes, options.batch_ceiling).await?;
                    report.themes += nodes.len() as u64;
                    debug!(nodes = nodes.len(), "hierarchy written");
                }
                Err(e) => {
                    warn!(entry = %entry.name, error = %e, "skipping unparseable hierarchy");
                    report.errors += 1;
                }
            },
        }
    }

    if !buffer.is_empty() {
        flush(store, options, &mut buffer, &mut report, progress).await?;
    }

    Ok(report)
}

async fn flush(
    store: &dyn Store,
    options: &SyncOptions,
    buffer: &mut Vec<NormalizedDocument>,
    report: &mut SyncReport,
    progress: &dyn SyncProgressReporter,
) -> Result<()> {
    write_documents(store, buffer, options.batch_ceiling).await?;
    report.documents += buffer.len() as u64;
    report.flushes += 1;
    debug!(rows = buffer.len(), total = report.documents, "buffer flushed");
    buffer.clear();

    progress.report(SyncProgressEvent::Ingesting {
        documents: report.documents,
        errors: report.errors,
    });
    Ok(())
}

/// CLI entry point: sync the configured (or overridden) archive into SQLite.
pub async fn run_sync(
    config: &Config,
    url_override: Option<String>,
    progress: &dyn SyncProgressReporter,
) -> Result<()> {
    let mut archive = config.archive.clone();
    if let Some(url) = url_override {
        archive.url = url;
    }

    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let store = SqliteStore::new(pool.clone(), config.sync.batch_ceiling);
    let options = SyncOptions::from_config(config);

    let archive_ref = &archive;
    let result = sync_archive(
        &store,
        &options,
        move || async move {
            progress.report(SyncProgressEvent::Downloading {
                url: archive_ref.url.clone(),
            });
            fetch_archive(archive_ref).await
        },
        progress,
    )
    .await;

    pool.close().await;
    let report = result?;

    println!("sync {}", archive.url);
    println!("  documents upserted: {}", report.documents);
    println!("  themes upserted: {}", report.themes);
    println!("  entries skipped: {}", report.errors);
    println!("  batch flushes: {}", report.flushes);
    println!("  duration: {:.1}s", report.duration.as_secs_f64());
    println!("ok");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::read_entries;
    use crate::models::SyncStatus;
    use crate::progress::NoProgress;
    use crate::store::InMemoryStore;
    use crate::test_support::{build_zip, numbered_publication, HIERARCHY_XML, PUBLICATION_XML};
    use anyhow::anyhow;
    use std::io::Cursor;
    use std::sync::Mutex;

    fn options(flush_threshold: usize, batch_ceiling: usize) -> SyncOptions {
        SyncOptions {
            flush_threshold,
            batch_ceiling,
            stale_after: Duration::from_secs(3600),
        }
    }

    fn zip_stream(zip: Vec<u8>) -> EntryStream {
        read_entries(Cursor::new(zip), "arborescence.xml".to_string(), 4)
    }

    async fn run(store: &InMemoryStore, opts: &SyncOptions, zip: Vec<u8>) -> Result<SyncReport> {
        sync_archive(
            store,
            opts,
            move || async move { Ok::<_, anyhow::Error>(zip_stream(zip)) },
            &NoProgress,
        )
        .await
    }

    #[derive(Default)]
    struct RecordingProgress(Mutex<Vec<SyncProgressEvent>>);

    impl SyncProgressReporter for RecordingProgress {
        fn report(&self, event: SyncProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    #[tokio::test]
    async fn publication_and_hierarchy_are_stored() {
        let store = InMemoryStore::new();
        let zip = build_zip(&[
            ("F14929.xml", PUBLICATION_XML),
            ("arborescence.xml", HIERARCHY_XML),
        ]);

        let report = run(&store, &options(500, 100), zip).await.unwrap();
        assert_eq!(report.documents, 1);
        assert_eq!(report.themes, 5);
        assert_eq!(report.errors, 0);

        let docs = store.documents();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "F14929");
        assert!(!docs[0].full_text.is_empty());
        assert_eq!(docs[0].theme_id.as_deref(), Some("N19810"));

        let themes = store.themes();
        let parent = |id: &str| {
            themes
                .iter()
                .find(|t| t.id == id)
                .and_then(|t| t.parent_id.clone())
        };
        assert_eq!(parent("N19810"), None);
        assert_eq!(parent("N19811").as_deref(), Some("N19810"));
        assert_eq!(parent("N360").as_deref(), Some("N19811"));

        let log = store.sync_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].status, SyncStatus::Completed);
        assert_eq!(log[0].document_count, Some(1));
        assert_eq!(log[0].error_count, Some(0));
    }

    #[tokio::test]
    async fn unmatched_entries_do_not_change_counts() {
        let with_extra = InMemoryStore::new();
        let without = InMemoryStore::new();

        let a = run(
            &with_extra,
            &options(500, 100),
            build_zip(&[
                ("F14929.xml", PUBLICATION_XML),
                ("notes/readme.txt", "hello"),
                ("F14929.xml.orig", PUBLICATION_XML),
            ]),
        )
        .await
        .unwrap();
        let b = run(
            &without,
            &options(500, 100),
            build_zip(&[("F14929.xml", PUBLICATION_XML)]),
        )
        .await
        .unwrap();

        assert_eq!(a.documents, b.documents);
        assert_eq!(a.errors, b.errors);
        assert_eq!(with_extra.documents(), without.documents());
    }

    fn numbered_zip(n: usize) -> Vec<u8> {
        let contents: Vec<(String, String)> = (1..=n)
            .map(|i| (format!("F{}.xml", i), numbered_publication(i)))
            .collect();
        let entries: Vec<(&str, &str)> = contents
            .iter()
            .map(|(name, body)| (name.as_str(), body.as_str()))
            .collect();
        build_zip(&entries)
    }

    #[tokio::test]
    async fn one_flush_of_137_makes_two_write_calls() {
        let store = InMemoryStore::new().with_batch_ceiling(100);
        let report = run(&store, &options(500, 100), numbered_zip(137))
            .await
            .unwrap();
        assert_eq!(report.documents, 137);
        assert_eq!(report.flushes, 1);
        assert_eq!(store.document_writes(), vec![100, 37]);
    }

    #[tokio::test]
    async fn buffer_flushes_at_threshold() {
        let store = InMemoryStore::new().with_batch_ceiling(100);
        let progress = RecordingProgress::default();
        let zip = numbered_zip(137);
        let report = sync_archive(
            &store,
            &options(50, 100),
            move || async move { Ok::<_, anyhow::Error>(zip_stream(zip)) },
            &progress,
        )
        .await
        .unwrap();

        assert_eq!(report.flushes, 3);
        assert_eq!(store.document_writes(), vec![50, 50, 37]);
        let events = progress.0.lock().unwrap();
        assert_eq!(
            events.last(),
            Some(&SyncProgressEvent::Ingesting {
                documents: 137,
                errors: 0
            })
        );
    }

    #[tokio::test]
    async fn malformed_entries_are_counted_and_skipped() {
        let store = InMemoryStore::new();
        let zip = build_zip(&[
            ("F1.xml", "<Publication><dc:title>x</Publication>"),
            ("F14929.xml", PUBLICATION_XML),
            ("arborescence.xml", "<Arborescence><Item>"),
        ]);

        let report = run(&store, &options(500, 100), zip).await.unwrap();
        assert_eq!(report.documents, 1);
        assert_eq!(report.errors, 2);
        assert_eq!(store.sync_log()[0].error_count, Some(2));
    }

    #[tokio::test]
    async fn deeply_nested_entry_is_skipped() {
        let store = InMemoryStore::new();
        let nested = format!(
            "<Publication>{}{}</Publication>",
            "<a>".repeat(200_000),
            "</a>".repeat(200_000)
        );
        let zip = build_zip(&[("F1.xml", nested.as_str()), ("F14929.xml", PUBLICATION_XML)]);

        let report = run(&store, &options(500, 100), zip).await.unwrap();
        assert_eq!(report.documents, 1);
        assert_eq!(report.errors, 1);
        assert_eq!(store.sync_log()[0].status, SyncStatus::Completed);
    }

    #[tokio::test]
    async fn transport_failure_is_logged() {
        let store = InMemoryStore::new();
        let err = sync_archive(
            &store,
            &options(500, 100),
            || async {
                Err::<EntryStream, _>(anyhow!("archive download failed (HTTP 404 Not Found)"))
            },
            &NoProgress,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("404"));

        let log = store.sync_log();
        assert_eq!(log.len(), 1);
        match &log[0].status {
            SyncStatus::Error(message) => assert!(message.contains("404")),
            other => panic!("unexpected status: {:?}", other),
        }
        assert!(store.documents().is_empty());
    }

    #[tokio::test]
    async fn corrupt_archive_fails_the_run() {
        let store = InMemoryStore::new();
        let result = run(&store, &options(500, 100), b"not a zip".to_vec()).await;
        assert!(result.is_err());
        assert!(matches!(store.sync_log()[0].status, SyncStatus::Error(_)));
    }

    #[tokio::test]
    async fn write_failure_aborts_and_is_logged() {
        let store = InMemoryStore::new().failing_after(0);
        let result = run(
            &store,
            &options(500, 100),
            build_zip(&[("F14929.xml", PUBLICATION_XML)]),
        )
        .await;
        assert!(result.is_err());
        assert!(matches!(store.sync_log()[0].status, SyncStatus::Error(_)));
    }

    #[tokio::test]
    async fn running_sync_blocks_a_second_one() {
        let store = InMemoryStore::new();
        store.begin_sync(Duration::from_secs(3600)).await.unwrap();

        let opened = Mutex::new(false);
        let opened_ref = &opened;
        let result = sync_archive(
            &store,
            &options(500, 100),
            move || async move {
                *opened_ref.lock().unwrap() = true;
                Err::<EntryStream, _>(anyhow!("unreachable"))
            },
            &NoProgress,
        )
        .await;

        assert!(result.unwrap_err().to_string().contains("already running"));
        assert!(!*opened.lock().unwrap());
        assert_eq!(store.sync_log().len(), 1);
    }
}
