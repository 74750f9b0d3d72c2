//! DOM snapshot storage
//!
//! Markup is parsed into elements, cut into bounded chunks and indexed
//! per chunk by tag, id, class and attribute name. Selector queries read the
//! small indexes first and only load chunks that can contain a match.

pub mod chunk;
pub mod parse;
pub mod selector;
mod store;

pub use chunk::{DomManifest, PendingChunks, SealedManifest};
pub use parse::DomNode;
pub use selector::SelectorList;
pub use store::{DomStats, DomStore, QueryStats};

/// Match a selector directly against a whole document, without chunking
pub fn match_document(html: &str, selector: &str) -> crate::Result<Vec<DomNode>> {
    let selectors = SelectorList::parse(selector)?;
    Ok(parse::parse_nodes(html)
        .into_iter()
        .map(|p| p.node)
        .filter(|n| selectors.matches(n))
        .collect())
}
