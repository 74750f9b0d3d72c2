//! Chunk layout and the two-phase manifest state machine.
//!
//! A document is written as `N` chunk records plus `N` index records, then a
//! manifest. The manifest can only be built from [`ChunkReceipt`]s, which the
//! store hands out after a chunk and its index are on disk, and it can only
//! be persisted once sealed. An index that points at a missing chunk cannot
//! be expressed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::dom::parse::{DomNode, ParsedNode};
use crate::dom::selector::{node_keys, CompoundSelector, SelectorList};
use crate::types::StorageRef;
use crate::{Error, Result};

pub const MANIFEST_VERSION: u32 = 1;

/// Body of a chunk record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomChunk {
    /// Raw source slice; all chunk markups concatenate to the document
    pub markup: String,
    pub nodes: Vec<DomNode>,
}

/// Body of a chunk index record: selector key -> offsets into `DomChunk::nodes`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkIndex {
    pub first_node: usize,
    pub node_count: usize,
    pub keys: BTreeMap<String, Vec<u32>>,
}

impl ChunkIndex {
    pub fn build(first_node: usize, nodes: &[DomNode]) -> Self {
        let mut keys: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        for (offset, node) in nodes.iter().enumerate() {
            for key in node_keys(node) {
                keys.entry(key).or_default().push(offset as u32);
            }
        }
        Self {
            first_node,
            node_count: nodes.len(),
            keys,
        }
    }

    /// Offsets that may match the selector list, ascending. Empty means the
    /// chunk can be skipped.
    pub fn candidates(&self, selectors: &SelectorList) -> Vec<u32> {
        let mut out: Vec<u32> = selectors
            .0
            .iter()
            .flat_map(|c| self.compound_candidates(c))
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    fn compound_candidates(&self, selector: &CompoundSelector) -> Vec<u32> {
        let required = selector.required_keys();
        if required.is_empty() {
            return (0..self.node_count as u32).collect();
        }

        let mut lists = Vec::with_capacity(required.len());
        for key in &required {
            match self.keys.get(key) {
                Some(offsets) => lists.push(offsets),
                None => return Vec::new(),
            }
        }
        lists.sort_by_key(|l| l.len());

        let Some((smallest, rest)) = lists.split_first() else {
            return Vec::new();
        };
        smallest
            .iter()
            .copied()
            .filter(|o| rest.iter().all(|l| l.binary_search(o).is_ok()))
            .collect()
    }
}

/// Cut a document into chunks of at most `chunk_size` elements.
///
/// Chunk `k` starts at the source tag of its first element that has one
/// (chunk 0 at byte 0) and ends where the next chunk starts, so
/// concatenating the markups reproduces `html` exactly. A chunk made only of
/// parser-implied elements starts where the previous one did.
pub fn split_into_chunks(html: &str, parsed: Vec<ParsedNode>, chunk_size: usize) -> Vec<DomChunk> {
    let chunk_size = chunk_size.max(1);
    if parsed.is_empty() {
        return vec![DomChunk {
            markup: html.to_string(),
            nodes: Vec::new(),
        }];
    }

    let mut starts: Vec<usize> = Vec::with_capacity(parsed.len().div_ceil(chunk_size));
    for (k, group) in parsed.chunks(chunk_size).enumerate() {
        let floor = starts.last().copied().unwrap_or(0);
        let start = if k == 0 {
            0
        } else {
            group.iter().find_map(|p| p.start).unwrap_or(floor).max(floor)
        };
        starts.push(start);
    }

    let mut chunks = Vec::with_capacity(starts.len());
    let mut nodes = parsed.into_iter().map(|p| p.node);
    for (k, &start) in starts.iter().enumerate() {
        let end = starts.get(k + 1).copied().unwrap_or(html.len());
        chunks.push(DomChunk {
            markup: html[start..end].to_string(),
            nodes: nodes.by_ref().take(chunk_size).collect(),
        });
    }
    chunks
}

/// Proof that a chunk and its index were durably written
#[derive(Debug, Clone)]
pub struct ChunkReceipt {
    chunk: StorageRef,
    index: StorageRef,
    first_node: usize,
    node_count: usize,
}

impl ChunkReceipt {
    pub(crate) fn new(chunk: StorageRef, index: StorageRef, first_node: usize, node_count: usize) -> Self {
        Self {
            chunk,
            index,
            first_node,
            node_count,
        }
    }

    pub fn chunk_ref(&self) -> &StorageRef {
        &self.chunk
    }

    pub fn index_ref(&self) -> &StorageRef {
        &self.index
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEntry {
    pub chunk: StorageRef,
    pub index: StorageRef,
    pub first_node: usize,
    pub node_count: usize,
}

/// Body of a manifest record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomManifest {
    pub version: u32,
    pub document_hash: String,
    pub document_size: u64,
    pub total_nodes: usize,
    pub chunk_size: usize,
    pub chunks: Vec<ChunkEntry>,
}

/// First phase: chunks are being written
#[derive(Debug)]
pub struct PendingChunks {
    document_hash: String,
    document_size: u64,
    chunk_size: usize,
    expected_chunks: usize,
    entries: Vec<ChunkEntry>,
}

impl PendingChunks {
    pub fn new(document_hash: String, document_size: u64, chunk_size: usize, expected_chunks: usize) -> Self {
        Self {
            document_hash,
            document_size,
            chunk_size,
            expected_chunks,
            entries: Vec::with_capacity(expected_chunks),
        }
    }

    pub fn record(&mut self, receipt: ChunkReceipt) {
        self.entries.push(ChunkEntry {
            chunk: receipt.chunk,
            index: receipt.index,
            first_node: receipt.first_node,
            node_count: receipt.node_count,
        });
    }

    /// Receipts collected so far, for cleanup after a failed write
    pub fn written(&self) -> impl Iterator<Item = &ChunkEntry> {
        self.entries.iter()
    }

    /// Second phase: every expected chunk has a receipt
    pub fn seal(self) -> Result<SealedManifest> {
        if self.entries.len() != self.expected_chunks {
            return Err(Error::InvalidInput(format!(
                "cannot seal manifest: {} of {} chunks written",
                self.entries.len(),
                self.expected_chunks
            )));
        }
        let total_nodes = self.entries.iter().map(|e| e.node_count).sum();
        Ok(SealedManifest(DomManifest {
            version: MANIFEST_VERSION,
            document_hash: self.document_hash,
            document_size: self.document_size,
            total_nodes,
            chunk_size: self.chunk_size,
            chunks: self.entries,
        }))
    }
}

/// A manifest whose chunks are all on disk; the only thing the store persists
#[derive(Debug)]
pub struct SealedManifest(DomManifest);

impl SealedManifest {
    pub fn manifest(&self) -> &DomManifest {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse::parse_nodes;

    const DOC: &str = r#"<!doctype html><html><body><ul class="list"><li class="item">a</li><li class="item hot">b</li><li>c</li></ul><a href="/x">x</a></body></html>"#;

    #[test]
    fn test_chunks_concatenate_to_source() {
        for size in 1..10 {
            let chunks = split_into_chunks(DOC, parse_nodes(DOC), size);
            let joined: String = chunks.iter().map(|c| c.markup.as_str()).collect();
            assert_eq!(joined, DOC);
            assert!(chunks.iter().all(|c| c.nodes.len() <= size));
            assert_eq!(chunks.iter().map(|c| c.nodes.len()).sum::<usize>(), 8);
        }
    }

    #[test]
    fn test_implied_elements_keep_chunks_exact() {
        let doc = "<table><div>fostered</div><tr><td>a</td><td>b</td></tr></table><p>end</p>";
        for size in 1..8 {
            let chunks = split_into_chunks(doc, parse_nodes(doc), size);
            let joined: String = chunks.iter().map(|c| c.markup.as_str()).collect();
            assert_eq!(joined, doc);
            let tags: Vec<&str> = chunks.iter().flat_map(|c| c.nodes.iter().map(|n| n.tag.as_str())).collect();
            assert_eq!(tags, ["html", "head", "body", "div", "table", "tbody", "tr", "td", "td", "p"]);
        }
    }

    #[test]
    fn test_text_only_document() {
        let chunks = split_into_chunks("just text", parse_nodes("just text"), 3);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].markup, "just text");
        assert_eq!(chunks[0].nodes[2].tag, "body");
        assert_eq!(chunks[0].nodes[2].text, "just text");
    }

    #[test]
    fn test_index_candidates() {
        let chunks = split_into_chunks(DOC, parse_nodes(DOC), 100);
        let index = ChunkIndex::build(0, &chunks[0].nodes);

        let hot = SelectorList::parse("li.item.hot").unwrap();
        assert_eq!(index.candidates(&hot), vec![5]);

        let none = SelectorList::parse("table").unwrap();
        assert!(index.candidates(&none).is_empty());

        let all = SelectorList::parse("*").unwrap();
        assert_eq!(index.candidates(&all).len(), 8);

        let union = SelectorList::parse("a, ul, head").unwrap();
        assert_eq!(index.candidates(&union), vec![1, 3, 7]);
    }

    #[test]
    fn test_seal_requires_all_chunks() {
        let pending = PendingChunks::new("h".into(), 1, 10, 2);
        assert!(pending.seal().is_err());

        let empty = PendingChunks::new("h".into(), 0, 10, 0);
        let sealed = empty.seal().unwrap();
        assert_eq!(sealed.manifest().total_nodes, 0);
    }
}
