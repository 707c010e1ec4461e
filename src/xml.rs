//! Owned XML element tree with depth-bounded walks.
//!
//! The export's documents come in several root shapes and place repeatable
//! elements at varying depths, so parsing happens in two steps: the
//! `quick-xml` event stream is folded into an [`XmlElement`] tree with an
//! explicit stack, then callers query the tree with walks that never descend
//! past [`MAX_DEPTH`] levels. Neither step recurses.

use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Deepest level any walk visits, counted from the element it starts on.
pub const MAX_DEPTH: usize = 20;

/// Deepest element nesting `parse` accepts. The tree is dropped
/// recursively, so unbounded nesting would exhaust the stack.
pub const MAX_NESTING: usize = MAX_DEPTH * 8;

#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Syntax(#[from] quick_xml::Error),
    #[error("malformed attribute: {0}")]
    Attribute(#[from] AttrError),
    #[error("unclosed element <{0}>")]
    Unclosed(String),
    #[error("elements nested deeper than {MAX_NESTING} levels")]
    TooDeep,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    /// Qualified name as written, e.g. `dc:title`.
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

/// Parse a whole XML document.
///
/// Returns an unnamed document node whose children are the top-level
/// elements. Declarations, comments, processing instructions and doctypes
/// are dropped, so every child of the document node is a real element.
pub fn parse(bytes: &[u8]) -> Result<XmlElement, XmlError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = vec![XmlElement::default()];
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                // stack[0] is the document node
                if stack.len() > MAX_NESTING {
                    return Err(XmlError::TooDeep);
                }
                stack.push(element_from(&e)?);
            }
            Event::Empty(e) => {
                let element = element_from(&e)?;
                push_child(&mut stack, XmlNode::Element(element));
            }
            Event::End(_) => {
                if stack.len() > 1 {
                    if let Some(element) = stack.pop() {
                        push_child(&mut stack, XmlNode::Element(element));
                    }
                }
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map(|c| c.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                if !text.trim().is_empty() {
                    push_child(&mut stack, XmlNode::Text(text));
                }
            }
            Event::CData(c) => {
                let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                if !text.trim().is_empty() {
                    push_child(&mut stack, XmlNode::Text(text));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if stack.len() > 1 {
        let name = stack.last().map(|e| e.name.clone()).unwrap_or_default();
        return Err(XmlError::Unclosed(name));
    }

    Ok(stack.pop().unwrap_or_default())
}

fn element_from(start: &BytesStart<'_>) -> Result<XmlElement, XmlError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attributes.push((key, value));
    }
    Ok(XmlElement {
        name,
        attributes,
        children: Vec::new(),
    })
}

fn push_child(stack: &mut [XmlElement], node: XmlNode) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    }
}

impl XmlElement {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// First direct child with the given name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.child_elements().find(|e| e.name == name)
    }

    /// Text of a direct child, whitespace-collapsed, `None` when absent or blank.
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).map(|e| e.text()).filter(|t| !t.is_empty())
    }

    /// All descendant text joined with single spaces. Attributes are not text.
    pub fn text(&self) -> String {
        let mut pieces: Vec<&str> = Vec::new();
        let mut stack: Vec<(&XmlNode, usize)> =
            self.children.iter().rev().map(|n| (n, 1)).collect();

        while let Some((node, depth)) = stack.pop() {
            match node {
                XmlNode::Text(t) => pieces.push(t),
                XmlNode::Element(e) => {
                    if depth >= MAX_DEPTH {
                        continue;
                    }
                    stack.extend(e.children.iter().rev().map(|n| (n, depth + 1)));
                }
            }
        }

        collapse_whitespace(&pieces.join(" "))
    }

    /// Every descendant element named `name`, in document order.
    pub fn find_all(&self, name: &str) -> Vec<&XmlElement> {
        let mut found = Vec::new();
        let mut stack: Vec<(&XmlElement, usize)> =
            self.child_elements().collect::<Vec<_>>().into_iter().rev().map(|e| (e, 1)).collect();

        while let Some((element, depth)) = stack.pop() {
            if element.name == name {
                found.push(element);
            }
            if depth >= MAX_DEPTH {
                continue;
            }
            let children: Vec<&XmlElement> = element.child_elements().collect();
            stack.extend(children.into_iter().rev().map(|e| (e, depth + 1)));
        }

        found
    }

    pub fn find_first(&self, name: &str) -> Option<&XmlElement> {
        self.find_all(name).into_iter().next()
    }
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
