//! Document retrieval by ID.
//!
//! Fetches one normalized document from the database. Used by `vdi get`.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::models::NormalizedDocument;
use crate::store::{SqliteStore, Store};

/// Core get function returning structured data.
pub async fn get_document(config: &Config, id: &str) -> Result<NormalizedDocument> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone(), config.sync.batch_ceiling);
    let doc = store.get_document(id).await;
    pool.close().await;

    match doc? {
        Some(doc) => Ok(doc),
        None => bail!("document not found: {}", id),
    }
}

/// CLI entry point — calls get_document and prints to stdout.
pub async fn run_get(config: &Config, id: &str, json: bool) -> Result<()> {
    let doc = get_document(config, id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("--- Document ---");
    println!("id:            {}", doc.id);
    println!("kind:          {}", doc.kind.as_str());
    println!("title:         {}", doc.title);
    println!("url:           {}", doc.url);
    if let Some(ref description) = doc.description {
        println!("description:   {}", description);
    }
    if let Some(ref audience) = doc.audience {
        println!("audience:      {}", audience);
    }
    let breadcrumb: Vec<&str> = [
        doc.theme_title.as_deref(),
        doc.subtheme.as_deref(),
        doc.folder_title.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect();
    if !breadcrumb.is_empty() {
        println!("theme:         {}", breadcrumb.join(" > "));
    }
    if let Some(ref modified) = doc.last_modified {
        println!("last_modified: {}", modified);
    }
    println!();

    println!("--- Text ---");
    println!("{}", doc.full_text);
    println!();

    if !doc.online_services.is_empty() {
        println!("--- Online services ({}) ---", doc.online_services.len());
        for service in &doc.online_services {
            match service.url {
                Some(ref url) => println!("{} <{}>", service.title, url),
                None => println!("{}", service.title),
            }
        }
        println!();
    }

    if !doc.legal_references.is_empty() {
        println!("--- Legal references ({}) ---", doc.legal_references.len());
        for reference in &doc.legal_references {
            match reference.url {
                Some(ref url) => println!("{} <{}>", reference.title, url),
                None => println!("{}", reference.title),
            }
        }
        println!();
    }

    if !doc.internal_links.is_empty() {
        println!("--- Links ---");
        println!("{}", doc.internal_links.join(", "));
        println!();
    }

    Ok(())
}
