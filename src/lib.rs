//! # vosdroits index
//!
//! Streaming ingestion and full-text search over the public-service
//! administrative-content export.
//!
//! The export is a large ZIP archive of XML documents plus one hierarchy
//! file. A sync streams the archive straight from HTTP, parses each entry
//! as it is inflated, and writes documents and hierarchy nodes to SQLite in
//! bounded batches. Searches run against an FTS5 index kept in step by
//! triggers, with a substring fallback for queries the index cannot match.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────┐   ┌───────────┐
//! │  HTTP ZIP   │──▶│ Entry stream │──▶│  Parsers  │──▶│  SQLite   │
//! │  (reqwest)  │   │ (zip, mpsc)  │   │ XML / tree│   │ FTS5+logs │
//! └─────────────┘   └──────────────┘   └───────────┘   └─────┬─────┘
//!                                                            │
//!                                                            ▼
//!                                                      ┌───────────┐
//!                                                      │ CLI (vdi) │
//!                                                      └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! vdi init                      # create database
//! vdi sync                      # stream the archive in
//! vdi search "passeport"
//! vdi get F14929
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`archive`] | Streaming ZIP reader and entry routing |
//! | [`xml`] | Minimal XML tree |
//! | [`document`] | Document entry parser |
//! | [`hierarchy`] | Hierarchy entry parser |
//! | [`store`] | Storage trait, SQLite and in-memory backends |
//! | [`writer`] | Chunked batch writes |
//! | [`ingest`] | Sync orchestration |
//! | [`search`] | Query sanitization and search with fallback |
//! | [`progress`] | Sync progress reporting |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod archive;
pub mod config;
pub mod db;
pub mod document;
pub mod get;
pub mod hierarchy;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod search;
pub mod stats;
pub mod store;
pub mod writer;
pub mod xml;

#[cfg(test)]
mod test_support;
