//! Element sequence of a document.
//!
//! The tree is built by html5ever through `scraper`, so chunked queries see
//! the same elements the assertion engine sees, implied `html`, `head`,
//! `body` and `tbody` included. Start tags are also located in the raw
//! markup and aligned with the tree, which gives the DOM store byte offsets
//! to cut chunks at.

use scraper::{ElementRef, Html, Node};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Elements whose content is raw text up to the matching close tag
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "textarea", "title", "xmp", "iframe", "noembed", "noframes",
];

/// Elements whose text is never rendered
const SCRIPT_ELEMENTS: &[&str] = &["script", "style", "template"];

/// How far ahead of the cursor a tree element looks for its source tag
const ALIGN_WINDOW: usize = 16;

/// A single element of a parsed document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomNode {
    /// Document-order position of the element
    pub index: usize,
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    /// Whitespace-normalized text of the element's own text children.
    /// Descendant elements keep their text on their own nodes.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    pub depth: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<usize>,
}

/// Element plus the byte offset of its start tag, when the markup has one
#[derive(Debug, Clone)]
pub struct ParsedNode {
    pub node: DomNode,
    pub start: Option<usize>,
}

/// Parse a document into elements in document order
pub fn parse_nodes(html: &str) -> Vec<ParsedNode> {
    let document = Html::parse_document(html);
    let tags = start_tags(html);
    let mut cursor = 0;
    let mut nodes = Vec::new();

    // Pre-order walk with an explicit stack; deep documents must not
    // exhaust the call stack.
    let mut stack: Vec<(ElementRef<'_>, Option<usize>, usize)> = vec![(document.root_element(), None, 0)];
    while let Some((element, parent, depth)) = stack.pop() {
        let value = element.value();
        let tag = value.name().to_ascii_lowercase();
        let index = nodes.len();

        let start = align(&tags, &mut cursor, &tag);
        let attributes: BTreeMap<String, String> =
            value.attrs().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let id = value.id().filter(|v| !v.is_empty()).map(str::to_string);
        let classes = value.classes().map(str::to_string).collect();

        let mut own_text = String::new();
        let mut children = Vec::new();
        for child in element.children() {
            match child.value() {
                Node::Text(text) => {
                    if !SCRIPT_ELEMENTS.contains(&tag.as_str()) {
                        own_text.push_str(text);
                    }
                }
                Node::Element(_) => children.extend(ElementRef::wrap(child)),
                _ => {}
            }
        }
        for child in children.into_iter().rev() {
            stack.push((child, Some(index), depth + 1));
        }

        nodes.push(ParsedNode {
            node: DomNode {
                index,
                tag,
                id,
                classes,
                attributes,
                text: normalize_whitespace(&own_text),
                depth,
                parent,
            },
            start,
        });
    }
    nodes
}

/// Offset of the source tag for the next tree element named `tag`.
///
/// Elements the parser implied have no source tag; they leave the cursor
/// where it is.
fn align(tags: &[(usize, String)], cursor: &mut usize, tag: &str) -> Option<usize> {
    let found = tags
        .get(*cursor..)?
        .iter()
        .take(ALIGN_WINDOW)
        .position(|(_, name)| name == tag)?;
    let (offset, _) = tags[*cursor + found];
    *cursor += found + 1;
    Some(offset)
}

/// Byte offsets and lowercased names of the start tags in `html`
pub fn start_tags(html: &str) -> Vec<(usize, String)> {
    let bytes = html.as_bytes();
    let mut tags = Vec::new();
    let mut pos = 0;

    while let Some(lt) = find_byte(bytes, pos, b'<') {
        let rest = &bytes[lt..];
        if rest.starts_with(b"<!--") {
            pos = find_seq(bytes, lt + 4, b"-->").map(|e| e + 3).unwrap_or(bytes.len());
        } else if rest.starts_with(b"<!") || rest.starts_with(b"<?") || rest.starts_with(b"</") {
            pos = find_byte(bytes, lt + 1, b'>').map(|e| e + 1).unwrap_or(bytes.len());
        } else if rest.len() > 1 && rest[1].is_ascii_alphabetic() {
            let name_end = scan_name(bytes, lt + 1);
            let name = html[lt + 1..name_end].to_ascii_lowercase();
            pos = tag_end(bytes, name_end);
            if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
                pos = find_close_tag(bytes, pos, name.as_bytes()).unwrap_or(bytes.len());
            }
            tags.push((lt, name));
        } else {
            pos = lt + 1;
        }
    }
    tags
}

fn find_byte(bytes: &[u8], from: usize, needle: u8) -> Option<usize> {
    bytes
        .get(from..)?
        .iter()
        .position(|&b| b == needle)
        .map(|p| p + from)
}

fn find_seq(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Position of `</name` (case-insensitive) at or after `from`
fn find_close_tag(bytes: &[u8], from: usize, name: &[u8]) -> Option<usize> {
    let mut at = from;
    while let Some(lt) = find_seq(bytes, at, b"</") {
        let candidate = &bytes[lt + 2..];
        if candidate.len() >= name.len() && candidate[..name.len()].eq_ignore_ascii_case(name) {
            let after = candidate.get(name.len()).copied();
            if matches!(after, None | Some(b'>') | Some(b'/')) || after.is_some_and(|b| b.is_ascii_whitespace()) {
                return Some(lt);
            }
        }
        at = lt + 2;
    }
    None
}

fn scan_name(bytes: &[u8], from: usize) -> usize {
    let mut end = from;
    while end < bytes.len() {
        let b = bytes[end];
        if b.is_ascii_whitespace() || b == b'>' || b == b'/' {
            break;
        }
        end += 1;
    }
    end
}

/// Offset just past the `>` closing a start tag; quoted values may hold `>`
fn tag_end(bytes: &[u8], from: usize) -> usize {
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate().skip(from) {
        match (quote, b) {
            (Some(q), b) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"') | (None, b'\'') if bytes[i - 1] == b'=' || bytes[i - 1].is_ascii_whitespace() => {
                quote = Some(b)
            }
            (None, b'>') => return i + 1,
            _ => {}
        }
    }
    bytes.len()
}

pub fn normalize_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
