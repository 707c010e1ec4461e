//! Query sanitization and search with substring fallback.
//!
//! A raw query is first reduced to plain terms that cannot break the FTS5
//! grammar. The ranked full-text query runs first; when it returns nothing
//! the store's substring scan over titles and descriptions gets a chance
//! before the caller is told there are no results.
//!
//! # Strategy
//!
//! | Step | Outcome |
//! |------|---------|
//! | sanitized query is empty | [`SearchError::NoSearchableTerms`], store untouched |
//! | ranked query has hits | [`SearchStrategy::Ranked`] |
//! | otherwise | [`SearchStrategy::Fallback`] (possibly empty) |

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::db;
use crate::models::{SearchFilters, SearchHit};
use crate::store::{SqliteStore, Store};

/// Words with a meaning in the FTS5 query grammar. FTS5 only treats the
/// uppercase spelling as an operator.
const RESERVED: &[&str] = &["AND", "OR", "NOT", "NEAR"];

/// Upper bound on `limit`, whatever the caller asks for.
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("no searchable terms in query")]
    NoSearchableTerms,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    Ranked,
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub sanitized: String,
    pub strategy: SearchStrategy,
    pub hits: Vec<SearchHit>,
}

fn is_reserved(word: &str) -> bool {
    RESERVED.contains(&word)
}

fn clean_token(token: &str) -> Option<String> {
    let without_colons: String = token.chars().filter(|c| *c != ':').collect();
    let trimmed = without_colons
        .trim_start_matches(['-', '*'])
        .trim_end_matches('*');
    if trimmed.is_empty() || is_reserved(trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// First run of two or more letters that is not an operator.
fn first_word(query: &str) -> Option<String> {
    query
        .split(|c: char| !c.is_alphabetic())
        .filter(|run| run.chars().count() >= 2)
        .find(|run| !is_reserved(run))
        .map(str::to_string)
}

/// Reduce a free-form query to space-separated plain terms.
///
/// Quotes and parentheses become spaces. In each token, colons are removed,
/// leading `-`/`*` and trailing `*` are stripped, and bare operators are
/// dropped. Returns an empty string when nothing searchable remains.
pub fn sanitize(query: &str) -> String {
    let spaced: String = query
        .chars()
        .map(|c| if matches!(c, '"' | '(' | ')') { ' ' } else { c })
        .collect();

    let tokens: Vec<String> = spaced.split_whitespace().filter_map(clean_token).collect();
    if !tokens.is_empty() {
        return tokens.join(" ");
    }

    first_word(query).unwrap_or_default()
}

/// Quote every term as an FTS5 string; adjacent strings are AND-ed.
pub fn fts_match_expression(terms: &[String]) -> String {
    terms
        .iter()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(1, MAX_LIMIT)
}

/// Run a search against any [`Store`].
///
/// # Errors
///
/// [`SearchError::NoSearchableTerms`] if sanitizing leaves nothing, and
/// [`SearchError::Store`] if either query fails.
pub async fn search(
    store: &dyn Store,
    query: &str,
    filters: &SearchFilters,
    limit: i64,
) -> Result<SearchOutcome, SearchError> {
    let sanitized = sanitize(query);
    if sanitized.is_empty() {
        return Err(SearchError::NoSearchableTerms);
    }

    let terms: Vec<String> = sanitized.split(' ').map(str::to_string).collect();
    let limit = clamp_limit(limit);

    let hits = store.ranked_search(&terms, filters, limit).await?;
    if !hits.is_empty() {
        return Ok(SearchOutcome {
            sanitized,
            strategy: SearchStrategy::Ranked,
            hits,
        });
    }

    debug!(query = %sanitized, "no ranked hits, trying substring match");
    let hits = store.substring_search(&terms, filters, limit).await?;
    Ok(SearchOutcome {
        sanitized,
        strategy: SearchStrategy::Fallback,
        hits,
    })
}

pub async fn run_search(
    config: &Config,
    query: &str,
    filters: SearchFilters,
    limit: Option<i64>,
    json: bool,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone(), config.sync.batch_ceiling);
    let limit = limit.unwrap_or(config.search.default_limit);

    let outcome = match search(&store, query, &filters, limit).await {
        Ok(outcome) => outcome,
        Err(SearchError::NoSearchableTerms) => {
            println!("No searchable terms.");
            pool.close().await;
            return Ok(());
        }
        Err(SearchError::Store(e)) => {
            pool.close().await;
            return Err(e.context("Search failed"));
        }
    };
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    if outcome.hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    if outcome.strategy == SearchStrategy::Fallback {
        println!("(no ranked matches, showing title/description matches)");
        println!();
    }

    for (i, hit) in outcome.hits.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, hit.score, hit.title);
        println!("    kind: {}", hit.kind.as_str());
        if let Some(ref theme) = hit.theme {
            match hit.folder {
                Some(ref folder) => println!("    theme: {} / {}", theme, folder),
                None => println!("    theme: {}", theme),
            }
        }
        println!("    url: {}", hit.url);
        if let Some(ref snippet) = hit.snippet {
            println!("    excerpt: \"{}\"", snippet.replace('\n', " ").trim());
        } else if let Some(ref description) = hit.description {
            println!("    description: {}", description);
        }
        println!("    id: {}", hit.id);
        println!();
    }

    Ok(())
}
