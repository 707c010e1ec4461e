//! Chunked persistence of parsed records.
//!
//! The store accepts at most `ceiling` rows per write call, so every buffer
//! is split into `ceil(N / ceiling)` chunks written one after another. The
//! first failing chunk aborts the rest; nothing is retried.

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::models::{NormalizedDocument, ThemeNode};
use crate::store::Store;

/// Write documents in chunks of at most `ceiling`. Returns the number of
/// write calls made.
pub async fn write_documents(
    store: &dyn Store,
    docs: &[NormalizedDocument],
    ceiling: usize,
) -> Result<usize> {
    if ceiling == 0 {
        bail!("batch ceiling must be at least 1");
    }

    let mut calls = 0;
    for (index, chunk) in docs.chunks(ceiling).enumerate() {
        store.upsert_documents(chunk).await.with_context(|| {
            format!(
                "Failed to write document chunk {} ({} rows, starting at {})",
                index + 1,
                chunk.len(),
                chunk[0].id
            )
        })?;
        calls += 1;
    }

    debug!(rows = docs.len(), calls, "documents written");
    Ok(calls)
}

/// Write hierarchy nodes in chunks of at most `ceiling`.
pub async fn write_themes(store: &dyn Store, nodes: &[ThemeNode], ceiling: usize) -> Result<usize> {
    if ceiling == 0 {
        bail!("batch ceiling must be at least 1");
    }

    let mut calls = 0;
    for (index, chunk) in nodes.chunks(ceiling).enumerate() {
        store
            .upsert_themes(chunk)
            .await
            .with_context(|| format!("Failed to write theme chunk {}", index + 1))?;
        calls += 1;
    }

    debug!(rows = nodes.len(), calls, "themes written");
    Ok(calls)
}
