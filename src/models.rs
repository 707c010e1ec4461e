//! Core data models used throughout the index.
//!
//! These types represent the parsed documents, hierarchy nodes, sync audit
//! rows and search hits that flow through ingestion and retrieval.

use serde::{Deserialize, Serialize};

/// Public site the document URLs point to.
pub const PUBLIC_BASE_URL: &str = "https://www.service-public.fr/particuliers";

/// Document family, encoded by the first character of the document id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// `F…` fact sheets describing a procedure.
    Procedure,
    /// `N…` topic and folder pages.
    Topic,
    /// `R…` resources: forms, online services, model letters.
    Resource,
    Other,
}

impl DocumentKind {
    pub fn from_id(id: &str) -> Self {
        match id.chars().next() {
            Some('F') => DocumentKind::Procedure,
            Some('N') => DocumentKind::Topic,
            Some('R') => DocumentKind::Resource,
            _ => DocumentKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Procedure => "procedure",
            DocumentKind::Topic => "topic",
            DocumentKind::Resource => "resource",
            DocumentKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "procedure" => DocumentKind::Procedure,
            "topic" => DocumentKind::Topic,
            "resource" => DocumentKind::Resource,
            _ => DocumentKind::Other,
        }
    }
}

/// Canonical URL of a document on the public site.
pub fn document_url(id: &str, kind: DocumentKind) -> String {
    match kind {
        DocumentKind::Procedure | DocumentKind::Topic | DocumentKind::Resource => {
            format!("{}/vosdroits/{}", PUBLIC_BASE_URL, id)
        }
        DocumentKind::Other => format!("{}/recherche?keyword={}", PUBLIC_BASE_URL, id),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegalReference {
    pub title: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineService {
    pub id: Option<String>,
    pub title: String,
    pub url: Option<String>,
    pub kind: Option<String>,
}

/// One source document after parsing. Upserted by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDocument {
    pub id: String,
    pub kind: DocumentKind,
    pub title: String,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub audience: Option<String>,
    pub url: String,
    pub theme_id: Option<String>,
    pub theme_title: Option<String>,
    pub subtheme: Option<String>,
    pub folder_id: Option<String>,
    pub folder_title: Option<String>,
    pub full_text: String,
    pub legal_references: Vec<LegalReference>,
    pub online_services: Vec<OnlineService>,
    pub internal_links: Vec<String>,
    pub last_modified: Option<String>,
}

/// Depth of a node in the browsing hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeKind {
    Theme,
    SubTheme,
    Folder,
    SubFolder,
}

impl ThemeKind {
    /// Kind for a nesting depth, `None` past the fourth level.
    pub fn from_depth(depth: usize) -> Option<Self> {
        match depth {
            0 => Some(ThemeKind::Theme),
            1 => Some(ThemeKind::SubTheme),
            2 => Some(ThemeKind::Folder),
            3 => Some(ThemeKind::SubFolder),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeKind::Theme => "theme",
            ThemeKind::SubTheme => "subtheme",
            ThemeKind::Folder => "folder",
            ThemeKind::SubFolder => "subfolder",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeNode {
    pub id: String,
    pub kind: ThemeKind,
    pub title: String,
    pub parent_id: Option<String>,
}

/// Lifecycle of a sync run as recorded in `sync_log.status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SyncStatus {
    Running,
    Completed,
    Error(String),
}

impl SyncStatus {
    pub fn to_db(&self) -> String {
        match self {
            SyncStatus::Running => "running".to_string(),
            SyncStatus::Completed => "completed".to_string(),
            SyncStatus::Error(message) => format!("error: {}", message),
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s {
            "running" => SyncStatus::Running,
            "completed" => SyncStatus::Completed,
            other => SyncStatus::Error(
                other
                    .strip_prefix("error:")
                    .unwrap_or(other)
                    .trim()
                    .to_string(),
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncLogEntry {
    pub id: i64,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub document_count: Option<i64>,
    pub error_count: Option<i64>,
    pub status: SyncStatus,
}

/// Terminal state handed to the store when a run ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed { documents: u64, errors: u64 },
    Failed { message: String },
}

/// Optional narrowing applied to both search paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    /// Theme id or theme title.
    pub theme: Option<String>,
    pub audience: Option<String>,
}

/// A search result returned from the query engine.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub kind: DocumentKind,
    pub title: String,
    /// Highlighted excerpt, only produced by the ranked path.
    pub snippet: Option<String>,
    pub description: Option<String>,
    pub theme: Option<String>,
    pub folder: Option<String>,
    pub url: String,
    pub score: f64,
}
