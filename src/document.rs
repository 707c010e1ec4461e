//! Document parsing: one archive entry to one [`NormalizedDocument`].
//!
//! The export mixes several document shapes (fact sheets, topic pages,
//! resources). The parser never assumes a single layout: the semantic root is
//! picked from an ordered candidate list, and repeatable elements are
//! collected wherever they sit in the tree.

use std::collections::HashSet;

use crate::models::{
    document_url, DocumentKind, LegalReference, NormalizedDocument, OnlineService,
};
use crate::xml::{self, XmlElement, XmlError};

/// Container names tried in order when locating the semantic root.
const ROOT_CANDIDATES: &[&str] = &["Publication", "Fiche", "Dossier", "Ressource", "Noeud"];

/// Per-entry failure. The sync loop counts these and moves on.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("entry name '{0}' is not a document name")]
    InvalidName(String),
    #[error(transparent)]
    Malformed(#[from] XmlError),
    #[error("document contains no element")]
    Empty,
}

/// Basename of an archive path.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Id of a document entry (`F14929.xml` → `F14929`), if the basename is one
/// capital letter, one or more digits, then `.xml`.
pub fn document_id(entry_name: &str) -> Option<&str> {
    let stem = basename(entry_name).strip_suffix(".xml")?;
    let mut chars = stem.chars();
    let first = chars.next()?;
    let digits = chars.as_str();
    if first.is_ascii_uppercase() && !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
    {
        Some(stem)
    } else {
        None
    }
}

pub fn parse_document(entry_name: &str, bytes: &[u8]) -> Result<NormalizedDocument, ParseError> {
    let id = document_id(entry_name)
        .ok_or_else(|| ParseError::InvalidName(entry_name.to_string()))?
        .to_string();

    let tree = xml::parse(bytes)?;
    let root = semantic_root(&tree).ok_or(ParseError::Empty)?;
    let kind = DocumentKind::from_id(&id);

    let title = root
        .child_text("dc:title")
        .or_else(|| root.find_first("Titre").map(|e| e.text()).filter(|t| !t.is_empty()))
        .unwrap_or_else(|| id.clone());

    let breadcrumb = Breadcrumb::from_root(root);

    Ok(NormalizedDocument {
        url: document_url(&id, kind),
        kind,
        title,
        description: root.child_text("dc:description"),
        subject: root.child_text("dc:subject"),
        audience: audience(root),
        theme_id: breadcrumb.theme_id,
        theme_title: breadcrumb.theme_title,
        subtheme: breadcrumb.subtheme,
        folder_id: breadcrumb.folder_id,
        folder_title: breadcrumb.folder_title,
        full_text: root.text(),
        legal_references: legal_references(root),
        online_services: online_services(root),
        internal_links: internal_links(root),
        last_modified: last_modified(root),
        id,
    })
}

fn semantic_root(tree: &XmlElement) -> Option<&XmlElement> {
    ROOT_CANDIDATES
        .iter()
        .find_map(|name| tree.child(name))
        .or_else(|| tree.child_elements().next())
}

fn audience(root: &XmlElement) -> Option<String> {
    let values: Vec<String> = root
        .find_all("Audience")
        .into_iter()
        .map(|e| e.text())
        .filter(|t| !t.is_empty())
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.join(", "))
    }
}

fn last_modified(root: &XmlElement) -> Option<String> {
    let raw = root.child_text("dc:date")?;
    let value = raw.strip_prefix("modified").unwrap_or(&raw).trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn legal_references(root: &XmlElement) -> Vec<LegalReference> {
    root.find_all("Reference")
        .into_iter()
        .filter_map(|e| {
            let title = e.child_text("Titre").unwrap_or_else(|| e.text());
            if title.is_empty() {
                return None;
            }
            Some(LegalReference {
                title,
                url: e.attr("URL").map(str::to_string),
            })
        })
        .collect()
}

fn online_services(root: &XmlElement) -> Vec<OnlineService> {
    root.find_all("ServiceEnLigne")
        .into_iter()
        .filter_map(|e| {
            let id = e.attr("ID").map(str::to_string);
            let title = e
                .child_text("Titre")
                .or_else(|| Some(e.text()).filter(|t| !t.is_empty()))
                .or_else(|| id.clone())?;
            Some(OnlineService {
                id,
                title,
                url: e.attr("URL").map(str::to_string),
                kind: e.attr("type").map(str::to_string),
            })
        })
        .collect()
}

fn internal_links(root: &XmlElement) -> Vec<String> {
    let mut seen = HashSet::new();
    root.find_all("LienInterne")
        .into_iter()
        .filter_map(|e| e.attr("LienPublication"))
        .filter(|target| !target.is_empty() && seen.insert(*target))
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Default)]
struct Breadcrumb {
    theme_id: Option<String>,
    theme_title: Option<String>,
    subtheme: Option<String>,
    folder_id: Option<String>,
    folder_title: Option<String>,
}

impl Breadcrumb {
    fn from_root(root: &XmlElement) -> Self {
        let mut crumb = Breadcrumb::default();
        let Some(trail) = root.find_first("FilDAriane") else {
            return crumb;
        };

        for level in trail.child_elements().filter(|e| e.name == "Niveau") {
            let Some(kind) = level.attr("type") else {
                continue;
            };
            let title = Some(level.text()).filter(|t| !t.is_empty());
            let id = level.attr("ID").map(str::to_string);

            match fold_discriminator(kind).as_str() {
                "theme" if crumb.theme_id.is_none() && crumb.theme_title.is_none() => {
                    crumb.theme_id = id;
                    crumb.theme_title = title;
                }
                "soustheme" if crumb.subtheme.is_none() => {
                    crumb.subtheme = title;
                }
                "dossier" if crumb.folder_id.is_none() && crumb.folder_title.is_none() => {
                    crumb.folder_id = id;
                    crumb.folder_title = title;
                }
                _ => {}
            }
        }

        crumb
    }
}

/// `Sous-thème` → `soustheme`: lowercase, accents and separators dropped.
fn fold_discriminator(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'à' | 'â' => 'a',
            'î' | 'ï' => 'i',
            'ô' => 'o',
            'ù' | 'û' => 'u',
            other => other,
        })
        .collect()
}
