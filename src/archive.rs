//! Streaming reader for the remote export archive.
//!
//! The archive is far larger than what should sit in memory, so it is never
//! buffered whole. The HTTP body is bridged into a blocking [`Read`] and fed
//! to `zip`'s sequential reader on a blocking thread. Each entry is inflated
//! on its own and sent down a bounded channel as soon as it is complete. When
//! the consumer stops pulling (for example while it flushes a batch), the
//! channel fills and decompression waits.
//!
//! # Entry routing
//!
//! | Basename | Route |
//! |----------|-------|
//! | `^[A-Z]\d+\.xml$` | [`EntryRoute::Document`] |
//! | the configured hierarchy name | [`EntryRoute::Hierarchy`] |
//! | anything else | skipped, never inflated |

use std::io::Read;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use futures::TryStreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::io::{StreamReader, SyncIoBridge};
use tracing::{debug, info};

use crate::config::ArchiveConfig;
use crate::document::{basename, document_id};

/// Maximum decompressed bytes read from a single entry (zip-bomb protection).
const MAX_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryRoute {
    Document,
    Hierarchy,
}

/// A fully decompressed entry.
#[derive(Debug)]
pub struct ArchiveEntry {
    pub name: String,
    pub route: EntryRoute,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
pub enum ArchiveItem {
    Entry(ArchiveEntry),
    /// The entry header was readable but its content was not.
    Unreadable { name: String, error: String },
}

/// Route an entry by its basename, `None` for entries to ignore.
pub fn route_entry(name: &str, hierarchy_entry: &str) -> Option<EntryRoute> {
    if name.ends_with('/') {
        return None;
    }
    if basename(name) == hierarchy_entry {
        return Some(EntryRoute::Hierarchy);
    }
    document_id(name).map(|_| EntryRoute::Document)
}

/// Entries arriving from the reader thread.
///
/// An `Err` item is fatal: the archive itself could not be read further.
pub struct EntryStream {
    rx: mpsc::Receiver<Result<ArchiveItem>>,
    task: Option<JoinHandle<()>>,
}

impl EntryStream {
    pub async fn next(&mut self) -> Option<Result<ArchiveItem>> {
        if let Some(item) = self.rx.recv().await {
            return Some(item);
        }
        // Channel closed: surface a reader panic instead of a silent end.
        let task = self.task.take()?;
        match task.await {
            Ok(()) => None,
            Err(e) => Some(Err(anyhow!("archive reader stopped unexpectedly: {}", e))),
        }
    }
}

/// Download the archive and start streaming its entries.
///
/// # Errors
///
/// Returns an error if:
/// - the request fails or times out
/// - the server answers with a non-2xx status
/// - the response declares an empty body
pub async fn fetch_archive(config: &ArchiveConfig) -> Result<EntryStream> {
    let timeout_secs = config.timeout_secs;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;

    info!(url = %config.url, "downloading archive");

    let resp = client.get(&config.url).send().await.map_err(|e| {
        if e.is_timeout() {
            anyhow!(
                "archive download exceeded {}s timeout: {}",
                timeout_secs,
                config.url
            )
        } else {
            anyhow!("Failed to download archive {}: {}", config.url, e)
        }
    })?;

    if !resp.status().is_success() {
        bail!(
            "archive download failed (HTTP {}): {}",
            resp.status(),
            config.url
        );
    }
    if resp.content_length() == Some(0) {
        bail!("archive response has no body: {}", config.url);
    }

    let body = Box::pin(resp.bytes_stream().map_err(move |e| {
        if e.is_timeout() {
            std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("archive download exceeded {}s timeout", timeout_secs),
            )
        } else {
            std::io::Error::new(std::io::ErrorKind::Other, e)
        }
    }));
    let reader = SyncIoBridge::new(StreamReader::new(body));

    Ok(read_entries(
        reader,
        config.hierarchy_entry.clone(),
        config.channel_capacity,
    ))
}

/// Stream entries out of any sequential ZIP source.
///
/// Must be called inside a Tokio runtime; the reading happens on the
/// blocking pool.
pub fn read_entries<R>(reader: R, hierarchy_entry: String, capacity: usize) -> EntryStream
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let task = tokio::task::spawn_blocking(move || {
        read_zip_stream(reader, &hierarchy_entry, &tx);
    });
    EntryStream {
        rx,
        task: Some(task),
    }
}

fn read_zip_stream<R: Read>(
    mut reader: R,
    hierarchy_entry: &str,
    tx: &mpsc::Sender<Result<ArchiveItem>>,
) {
    let mut skipped = 0u64;

    loop {
        let file = match zip::read::read_zipfile_from_stream(&mut reader) {
            Ok(Some(file)) => file,
            Ok(None) => break,
            Err(e) => {
                let _ = tx.blocking_send(Err(anyhow!(e).context("Failed to read archive entry")));
                return;
            }
        };

        if file.is_dir() {
            continue;
        }

        let name = file.name().to_string();
        let Some(route) = route_entry(&name, hierarchy_entry) else {
            // Dropping the entry drains its compressed bytes without inflating them.
            debug!(entry = %name, "ignoring archive entry");
            skipped += 1;
            continue;
        };

        let item = read_entry(file, name, route);
        if tx.blocking_send(Ok(item)).is_err() {
            // Receiver gone: the sync loop has already failed.
            return;
        }
    }

    debug!(skipped, "archive fully read");
}

fn read_entry(file: impl Read, name: String, route: EntryRoute) -> ArchiveItem {
    let mut bytes = Vec::new();
    match file.take(MAX_ENTRY_BYTES).read_to_end(&mut bytes) {
        Ok(_) if bytes.len() as u64 >= MAX_ENTRY_BYTES => ArchiveItem::Unreadable {
            name,
            error: format!("entry exceeds size limit ({} bytes)", MAX_ENTRY_BYTES),
        },
        Ok(_) => ArchiveItem::Entry(ArchiveEntry { name, route, bytes }),
        Err(e) => ArchiveItem::Unreadable {
            name,
            error: e.to_string(),
        },
    }
}
