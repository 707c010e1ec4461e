//! Flattening of the browsing hierarchy entry into parent-linked nodes.

use crate::document::ParseError;
use crate::models::{ThemeKind, ThemeNode};
use crate::xml::{self, XmlElement};

/// Element names that denote a hierarchy node at any level.
const NODE_ELEMENTS: &[&str] = &["Item", "Theme", "SousTheme", "Dossier", "SousDossier"];

/// Parse the hierarchy document into a pre-order list of nodes.
///
/// Descends at most four levels below the root (theme, subtheme, folder,
/// subfolder). A node without an id cannot be referenced, so it is skipped
/// along with everything beneath it.
pub fn parse_hierarchy(bytes: &[u8]) -> Result<Vec<ThemeNode>, ParseError> {
    let tree = xml::parse(bytes)?;
    let root = tree.child_elements().next().ok_or(ParseError::Empty)?;

    let mut nodes = Vec::new();
    let mut stack: Vec<(&XmlElement, usize, Option<String>)> = node_children(root)
        .into_iter()
        .rev()
        .map(|e| (e, 0, None))
        .collect();

    while let Some((element, depth, parent_id)) = stack.pop() {
        let Some(kind) = ThemeKind::from_depth(depth) else {
            continue;
        };
        let Some(id) = node_id(element) else {
            continue;
        };

        let title = element
            .child_text("Titre")
            .or_else(|| element.attr("titre").map(str::to_string))
            .unwrap_or_else(|| id.clone());

        stack.extend(
            node_children(element)
                .into_iter()
                .rev()
                .map(|child| (child, depth + 1, Some(id.clone()))),
        );

        nodes.push(ThemeNode {
            id,
            kind,
            title,
            parent_id,
        });
    }

    Ok(nodes)
}

fn node_children(element: &XmlElement) -> Vec<&XmlElement> {
    element
        .child_elements()
        .filter(|e| NODE_ELEMENTS.contains(&e.name.as_str()))
        .collect()
}

fn node_id(element: &XmlElement) -> Option<String> {
    element
        .attr("ID")
        .or_else(|| element.attr("id"))
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}
