//! Chunked DOM storage with per-chunk selector indexes

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::content::ContentStore;
use crate::dom::chunk::{split_into_chunks, ChunkIndex, ChunkReceipt, DomChunk, DomManifest, PendingChunks, SealedManifest};
use crate::dom::parse::{parse_nodes, DomNode};
use crate::dom::selector::SelectorList;
use crate::types::{Category, StorageRef, StoreOptions};
use crate::{Error, Result};

const TAG_TOTAL_NODES: &str = "total_nodes";
const TAG_CHUNK_COUNT: &str = "chunk_count";
const TAG_DOCUMENT_HASH: &str = "document_hash";

/// Node and chunk counts of a stored document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomStats {
    pub total_nodes: usize,
    pub chunk_count: usize,
}

/// What a selector query had to read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryStats {
    pub chunks_total: usize,
    pub chunks_loaded: usize,
    pub nodes_matched: usize,
}

/// Markup store that never needs the whole document to answer a query
#[derive(Debug, Clone)]
pub struct DomStore {
    content: Arc<ContentStore>,
    chunk_size: usize,
}

impl DomStore {
    pub fn new(content: Arc<ContentStore>, chunk_size: usize) -> Self {
        Self {
            content,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Store a document and return its manifest ref
    pub async fn store(&self, html: &str, options: StoreOptions) -> Result<StorageRef> {
        let document_hash = ContentStore::hash(html.as_bytes());
        let chunks = split_into_chunks(html, parse_nodes(html), self.chunk_size);
        let mut pending = PendingChunks::new(
            document_hash.clone(),
            html.len() as u64,
            self.chunk_size,
            chunks.len(),
        );

        let mut first_node = 0;
        for chunk in &chunks {
            match self.write_chunk(chunk, first_node, &options.test_id).await {
                Ok(receipt) => pending.record(receipt),
                Err(e) => {
                    self.discard(pending.written().flat_map(|e| [&e.chunk, &e.index])).await;
                    return Err(e);
                }
            }
            first_node += chunk.nodes.len();
        }

        let sealed = pending.seal()?;
        let manifest_ref = match self.write_manifest(&sealed, options).await {
            Ok(r) => r,
            Err(e) => {
                let manifest = sealed.manifest();
                self.discard(manifest.chunks.iter().flat_map(|e| [&e.chunk, &e.index])).await;
                return Err(e);
            }
        };

        debug!(
            "Stored DOM {} ({} nodes in {} chunks)",
            manifest_ref.path, first_node, chunks.len()
        );
        Ok(manifest_ref)
    }

    async fn write_chunk(&self, chunk: &DomChunk, first_node: usize, test_id: &str) -> Result<ChunkReceipt> {
        let body = serde_json::to_vec(chunk)?;
        let chunk_ref = self
            .content
            .store(Category::Html, &body, StoreOptions::new(test_id).with_extension("chunk"))
            .await?;

        let index = ChunkIndex::build(first_node, &chunk.nodes);
        let index_ref = match self
            .content
            .store(
                Category::Metadata,
                &serde_json::to_vec(&index)?,
                StoreOptions::new(test_id).with_extension("idx"),
            )
            .await
        {
            Ok(r) => r,
            Err(e) => {
                self.discard([&chunk_ref]).await;
                return Err(e);
            }
        };

        Ok(ChunkReceipt::new(chunk_ref, index_ref, first_node, chunk.nodes.len()))
    }

    async fn write_manifest(&self, sealed: &SealedManifest, options: StoreOptions) -> Result<StorageRef> {
        let manifest = sealed.manifest();
        let mut tags = options.tags.clone();
        tags.extra.insert(TAG_TOTAL_NODES.into(), manifest.total_nodes.to_string());
        tags.extra.insert(TAG_CHUNK_COUNT.into(), manifest.chunks.len().to_string());
        tags.extra.insert(TAG_DOCUMENT_HASH.into(), manifest.document_hash.clone());

        self.content
            .store(
                Category::Html,
                &serde_json::to_vec(manifest)?,
                StoreOptions {
                    tags,
                    extension: Some("manifest".into()),
                    ..options
                },
            )
            .await
    }

    async fn discard<'a>(&self, refs: impl IntoIterator<Item = &'a StorageRef>) {
        for r in refs {
            if let Err(e) = self.content.delete(r).await {
                warn!("Failed to remove partial DOM record {}: {}", r.path, e);
            }
        }
    }

    /// Load the manifest a DOM ref points at
    pub async fn manifest(&self, storage_ref: &StorageRef) -> Result<DomManifest> {
        let raw = self.content.retrieve(storage_ref).await?;
        let manifest: DomManifest = serde_json::from_slice(&raw)
            .map_err(|e| Error::corrupt(&storage_ref.path, format!("bad DOM manifest: {}", e)))?;
        Ok(manifest)
    }

    async fn load_chunk(&self, chunk_ref: &StorageRef) -> Result<DomChunk> {
        let raw = self.content.retrieve(chunk_ref).await?;
        serde_json::from_slice(&raw)
            .map_err(|e| Error::corrupt(&chunk_ref.path, format!("bad DOM chunk: {}", e)))
    }

    async fn load_index(&self, index_ref: &StorageRef) -> Result<ChunkIndex> {
        let raw = self.content.retrieve(index_ref).await?;
        serde_json::from_slice(&raw)
            .map_err(|e| Error::corrupt(&index_ref.path, format!("bad chunk index: {}", e)))
    }

    /// Reassemble the original document
    pub async fn retrieve(&self, storage_ref: &StorageRef) -> Result<String> {
        let manifest = self.manifest(storage_ref).await?;
        let mut html = String::with_capacity(manifest.document_size as usize);
        for entry in &manifest.chunks {
            html.push_str(&self.load_chunk(&entry.chunk).await?.markup);
        }

        if self.content.verifies_integrity() && ContentStore::hash(html.as_bytes()) != manifest.document_hash {
            return Err(Error::corrupt(&storage_ref.path, "reassembled document hash mismatch"));
        }
        Ok(html)
    }

    /// Elements matching `selector`, in document order
    pub async fn query_by_selector(&self, storage_ref: &StorageRef, selector: &str) -> Result<Vec<DomNode>> {
        Ok(self.query_with_stats(storage_ref, selector).await?.0)
    }

    /// Like [`query_by_selector`](Self::query_by_selector), also reporting how many chunks were read
    pub async fn query_with_stats(
        &self,
        storage_ref: &StorageRef,
        selector: &str,
    ) -> Result<(Vec<DomNode>, QueryStats)> {
        let selectors = SelectorList::parse(selector)?;
        let manifest = self.manifest(storage_ref).await?;

        let mut stats = QueryStats {
            chunks_total: manifest.chunks.len(),
            ..Default::default()
        };
        let mut matched = Vec::new();

        for entry in &manifest.chunks {
            let index = self.load_index(&entry.index).await?;
            let candidates = index.candidates(&selectors);
            if candidates.is_empty() {
                continue;
            }

            let chunk = self.load_chunk(&entry.chunk).await?;
            stats.chunks_loaded += 1;
            for offset in candidates {
                if let Some(node) = chunk.nodes.get(offset as usize) {
                    if selectors.matches(node) {
                        matched.push(node.clone());
                    }
                }
            }
        }

        stats.nodes_matched = matched.len();
        debug!(
            "Selector '{}' on {}: {} nodes, {}/{} chunks loaded",
            selector, storage_ref.path, stats.nodes_matched, stats.chunks_loaded, stats.chunks_total
        );
        Ok((matched, stats))
    }

    /// Node and chunk counts, from ref tags when present
    pub async fn get_stats(&self, storage_ref: &StorageRef) -> Result<DomStats> {
        let extra = &storage_ref.tags.extra;
        let from_tags = extra
            .get(TAG_TOTAL_NODES)
            .and_then(|n| n.parse().ok())
            .zip(extra.get(TAG_CHUNK_COUNT).and_then(|n| n.parse().ok()));
        if let Some((total_nodes, chunk_count)) = from_tags {
            return Ok(DomStats { total_nodes, chunk_count });
        }

        let manifest = self.manifest(storage_ref).await?;
        Ok(DomStats {
            total_nodes: manifest.total_nodes,
            chunk_count: manifest.chunks.len(),
        })
    }

    /// Manifest refs of every stored document
    pub async fn list_documents(&self) -> Result<Vec<StorageRef>> {
        Ok(self
            .content
            .list(Category::Html)
            .await?
            .into_iter()
            .filter(|r| r.path.ends_with(".manifest"))
            .collect())
    }

    /// Hash of the original document, identical for identical markup
    pub fn document_hash(storage_ref: &StorageRef) -> Option<&str> {
        storage_ref.tags.extra.get(TAG_DOCUMENT_HASH).map(String::as_str)
    }

    /// Delete the manifest and every chunk and index it references
    pub async fn delete(&self, storage_ref: &StorageRef) -> Result<()> {
        let manifest = match self.manifest(storage_ref).await {
            Ok(m) => Some(m),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        // Manifest first so no reader follows it to a half-deleted document.
        self.content.delete(storage_ref).await?;
        if let Some(manifest) = manifest {
            for entry in &manifest.chunks {
                self.content.delete(&entry.chunk).await?;
                self.content.delete(&entry.index).await?;
            }
        }
        info!("Deleted DOM {}", storage_ref.path);
        Ok(())
    }
}
