//! Compound selectors evaluated against the chunk index.
//!
//! Supported: selector lists (`a, b`) of compound selectors made of a type
//! selector or `*`, `#id`, `.class` and attribute selectors (`[attr]`,
//! `[attr=v]`, `[attr^=v]`, `[attr$=v]`, `[attr*=v]`, `[attr~=v]`).
//! Combinators and pseudo-classes are rejected: they need ancestor or
//! layout state that chunks do not carry.

use crate::dom::parse::DomNode;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOp {
    Equals,
    Prefix,
    Suffix,
    Substring,
    Word,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrSelector {
    pub name: String,
    pub condition: Option<(AttrOp, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompoundSelector {
    /// `None` matches any tag
    pub tag: Option<String>,
    pub ids: Vec<String>,
    pub classes: Vec<String>,
    pub attributes: Vec<AttrSelector>,
}

/// Parsed selector list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList(pub Vec<CompoundSelector>);

impl SelectorList {
    pub fn parse(input: &str) -> Result<Self> {
        let mut list = Vec::new();
        for part in split_top_level(input)? {
            list.push(CompoundSelector::parse(part.trim())?);
        }
        if list.is_empty() {
            return Err(Error::InvalidInput("empty selector".into()));
        }
        Ok(Self(list))
    }

    pub fn matches(&self, node: &DomNode) -> bool {
        self.0.iter().any(|c| c.matches(node))
    }
}

/// Split on commas that are outside attribute brackets and quotes
fn split_top_level(input: &str) -> Result<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if quote.is_some() || depth != 0 {
        return Err(Error::InvalidInput(format!("unbalanced selector: {}", input)));
    }
    parts.push(&input[start..]);
    Ok(parts)
}

impl CompoundSelector {
    pub fn parse(input: &str) -> Result<Self> {
        if input.is_empty() {
            return Err(Error::InvalidInput("empty compound selector".into()));
        }

        let chars: Vec<char> = input.chars().collect();
        let mut selector = CompoundSelector::default();
        let mut i = 0;

        if chars[0] == '*' {
            i = 1;
        } else if is_ident_char(chars[0]) {
            let name = read_ident(&chars, &mut i);
            selector.tag = Some(name.to_ascii_lowercase());
        }

        while i < chars.len() {
            match chars[i] {
                '#' => {
                    i += 1;
                    let id = read_ident(&chars, &mut i);
                    if id.is_empty() {
                        return Err(invalid(input, "empty id"));
                    }
                    selector.ids.push(id);
                }
                '.' => {
                    i += 1;
                    let class = read_ident(&chars, &mut i);
                    if class.is_empty() {
                        return Err(invalid(input, "empty class"));
                    }
                    selector.classes.push(class);
                }
                '[' => {
                    i += 1;
                    selector.attributes.push(parse_attribute(input, &chars, &mut i)?);
                }
                c if c.is_whitespace() || c == '>' || c == '+' || c == '~' => {
                    return Err(invalid(input, "combinators are not supported in chunk queries"));
                }
                ':' => return Err(invalid(input, "pseudo-classes are not supported in chunk queries")),
                c => return Err(invalid(input, &format!("unexpected character '{}'", c))),
            }
        }

        Ok(selector)
    }

    /// Index keys a node must carry to possibly match
    pub fn required_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if let Some(tag) = &self.tag {
            keys.push(tag.clone());
        }
        keys.extend(self.ids.iter().map(|id| format!("#{}", id)));
        keys.extend(self.classes.iter().map(|c| format!(".{}", c)));
        keys.extend(self.attributes.iter().map(|a| format!("[{}", a.name)));
        keys
    }

    pub fn matches(&self, node: &DomNode) -> bool {
        if let Some(tag) = &self.tag {
            if &node.tag != tag {
                return false;
            }
        }
        if !self.ids.iter().all(|id| node.id.as_deref() == Some(id.as_str())) {
            return false;
        }
        if !self.classes.iter().all(|c| node.classes.iter().any(|have| have == c)) {
            return false;
        }
        self.attributes.iter().all(|attr| {
            let Some(value) = node.attributes.get(&attr.name) else {
                return false;
            };
            match &attr.condition {
                None => true,
                Some((AttrOp::Equals, want)) => value == want,
                Some((AttrOp::Prefix, want)) => !want.is_empty() && value.starts_with(want.as_str()),
                Some((AttrOp::Suffix, want)) => !want.is_empty() && value.ends_with(want.as_str()),
                Some((AttrOp::Substring, want)) => !want.is_empty() && value.contains(want.as_str()),
                Some((AttrOp::Word, want)) => value.split_ascii_whitespace().any(|w| w == want),
            }
        })
    }
}

/// Index keys a node is filed under
pub fn node_keys(node: &DomNode) -> Vec<String> {
    let mut keys = vec![node.tag.clone()];
    if let Some(id) = &node.id {
        keys.push(format!("#{}", id));
    }
    keys.extend(node.classes.iter().map(|c| format!(".{}", c)));
    keys.extend(node.attributes.keys().map(|a| format!("[{}", a)));
    keys.sort();
    keys.dedup();
    keys
}

fn invalid(input: &str, reason: &str) -> Error {
    Error::InvalidInput(format!("selector '{}': {}", input, reason))
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn read_ident(chars: &[char], i: &mut usize) -> String {
    let start = *i;
    while *i < chars.len() && is_ident_char(chars[*i]) {
        *i += 1;
    }
    chars[start..*i].iter().collect()
}

fn parse_attribute(input: &str, chars: &[char], i: &mut usize) -> Result<AttrSelector> {
    skip_ws(chars, i);
    let name = read_ident(chars, i).to_ascii_lowercase();
    if name.is_empty() {
        return Err(invalid(input, "empty attribute name"));
    }
    skip_ws(chars, i);

    let op = match chars.get(*i) {
        Some(']') => {
            *i += 1;
            return Ok(AttrSelector { name, condition: None });
        }
        Some('=') => {
            *i += 1;
            AttrOp::Equals
        }
        Some(&c) if chars.get(*i + 1) == Some(&'=') => {
            *i += 2;
            match c {
                '^' => AttrOp::Prefix,
                '$' => AttrOp::Suffix,
                '*' => AttrOp::Substring,
                '~' => AttrOp::Word,
                _ => return Err(invalid(input, &format!("unsupported attribute operator '{}='", c))),
            }
        }
        _ => return Err(invalid(input, "malformed attribute selector")),
    };

    skip_ws(chars, i);
    let value = match chars.get(*i) {
        Some(&q) if q == '"' || q == '\'' => {
            *i += 1;
            let start = *i;
            while *i < chars.len() && chars[*i] != q {
                *i += 1;
            }
            if *i >= chars.len() {
                return Err(invalid(input, "unterminated attribute value"));
            }
            let value: String = chars[start..*i].iter().collect();
            *i += 1;
            value
        }
        _ => {
            let start = *i;
            while *i < chars.len() && chars[*i] != ']' && !chars[*i].is_whitespace() {
                *i += 1;
            }
            chars[start..*i].iter().collect()
        }
    };
    skip_ws(chars, i);

    if chars.get(*i) != Some(&']') {
        return Err(invalid(input, "missing ']'"));
    }
    *i += 1;
    Ok(AttrSelector {
        name,
        condition: Some((op, value)),
    })
}

fn skip_ws(chars: &[char], i: &mut usize) {
    while *i < chars.len() && chars[*i].is_whitespace() {
        *i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse::parse_nodes;

    /// First element of the body
    fn first(html: &str) -> DomNode {
        parse_nodes(html).remove(3).node
    }

    #[test]
    fn test_parse_compound() {
        let list = SelectorList::parse("button.primary#save[data-role=\"submit\"], a[href^=http]").unwrap();
        assert_eq!(list.0.len(), 2);
        let c = &list.0[0];
        assert_eq!(c.tag.as_deref(), Some("button"));
        assert_eq!(c.ids, ["save"]);
        assert_eq!(c.classes, ["primary"]);
        assert_eq!(
            c.attributes[0].condition,
            Some((AttrOp::Equals, "submit".to_string()))
        );
        assert_eq!(
            c.required_keys(),
            ["button", "#save", ".primary", "[data-role"]
        );
    }

    #[test]
    fn test_rejects_unsupported() {
        assert!(SelectorList::parse("div p").is_err());
        assert!(SelectorList::parse("ul > li").is_err());
        assert!(SelectorList::parse("a:hover").is_err());
        assert!(SelectorList::parse("[href").is_err());
        assert!(SelectorList::parse("").is_err());
        assert!(SelectorList::parse("a,").is_err());
    }

    #[test]
    fn test_matching() {
        let node = first(r#"<a id="home" class="nav active" href="https://x.test/index.html" rel="noopener external">x</a>"#);

        for sel in [
            "a",
            "*",
            "#home",
            ".nav.active",
            "a[href]",
            "[href^='https']",
            "[href$=\".html\"]",
            "[href*=x.test]",
            "[rel~=external]",
            "div, a.nav",
        ] {
            assert!(SelectorList::parse(sel).unwrap().matches(&node), "{}", sel);
        }
        for sel in ["div", "#other", ".missing", "[target]", "[rel~=noop]", "[href=x]"] {
            assert!(!SelectorList::parse(sel).unwrap().matches(&node), "{}", sel);
        }
    }

    #[test]
    fn test_node_keys() {
        let node = first(r#"<div id="x" class="a b" data-k="1">"#);
        assert_eq!(node_keys(&node), ["#x", ".a", ".b", "[class", "[data-k", "[id", "div"]);
    }
}
