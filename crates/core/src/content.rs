//! Content-addressed record store
//!
//! Every artifact store in the crate sits on top of a [`ContentStore`]:
//! - SHA-256 identity and size accounting for each record
//! - Atomic writes (temp file + rename), so a record is never visible half written
//! - Optional gzip at rest
//! - A `.ref.json` sidecar per record so listings never touch record bodies
//!
//! Unlike a deduplicating CAS, each `store()` call creates a new physical
//! record. The hash is identity metadata, not the storage key.

use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::types::{Category, RefTags, StorageRef, StoreOptions};
use crate::{Error, Result};

const SIDECAR_SUFFIX: &str = ".ref.json";

/// Record store rooted at a directory
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
    verify_integrity: bool,
    compress: bool,
}

impl ContentStore {
    /// Create a new store at the given root directory
    pub async fn new(root: impl AsRef<Path>, verify_integrity: bool, compress: bool) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("objects")).await?;
        fs::create_dir_all(root.join("tmp")).await?;

        info!("Initialized content store at {:?}", root);

        Ok(Self {
            root,
            verify_integrity,
            compress,
        })
    }

    /// Get the root path of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether retrieves check size and hash
    pub fn verifies_integrity(&self) -> bool {
        self.verify_integrity
    }

    /// Get the objects directory
    pub fn objects_dir(&self) -> PathBuf {
        self.root.join("objects")
    }

    /// Compute SHA-256 hash of data
    pub fn hash(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    /// Absolute path of the record a ref points at
    pub fn record_path(&self, path: &str) -> Result<PathBuf> {
        let mut full = self.objects_dir();
        for segment in path.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(Error::InvalidInput(format!("invalid record path: {}", path)));
            }
            full.push(segment);
        }
        Ok(full)
    }

    fn sidecar_path(&self, path: &str) -> Result<PathBuf> {
        self.record_path(&format!("{}{}", path, SIDECAR_SUFFIX))
    }

    /// Store data as a new record and return its ref
    pub async fn store(
        &self,
        category: Category,
        data: &[u8],
        options: StoreOptions,
    ) -> Result<StorageRef> {
        let test_id = sanitize_segment(&options.test_id);
        let extension = options
            .extension
            .as_deref()
            .map(sanitize_segment)
            .unwrap_or_else(|| category.default_extension().to_string());
        let path = format!(
            "{}/{}/{}.{}",
            category.dir_name(),
            test_id,
            Uuid::new_v4(),
            extension
        );

        let storage_ref = StorageRef {
            category,
            test_id,
            path,
            size: data.len() as u64,
            hash: Self::hash(data),
            timestamp: options.timestamp.unwrap_or_else(Utc::now),
            compressed: self.compress,
            tags: options.tags,
        };

        self.write_record(&storage_ref, data).await?;
        debug!(
            "Stored {} record {} ({} bytes)",
            category, storage_ref.path, storage_ref.size
        );
        Ok(storage_ref)
    }

    /// Rewrite an existing record in place and return the ref describing the new bytes.
    ///
    /// The slot (category, test id, path, timestamp) is kept; size, hash and
    /// tags change. The previous ref no longer verifies afterwards.
    pub async fn replace(
        &self,
        existing: &StorageRef,
        data: &[u8],
        tags: RefTags,
    ) -> Result<StorageRef> {
        if !self.exists(existing).await {
            return Err(Error::not_found(existing.category.to_string(), &existing.path));
        }

        let storage_ref = StorageRef {
            size: data.len() as u64,
            hash: Self::hash(data),
            compressed: self.compress,
            tags,
            ..existing.clone()
        };

        self.write_record(&storage_ref, data).await?;
        debug!("Replaced record {} ({} bytes)", storage_ref.path, storage_ref.size);
        Ok(storage_ref)
    }

    async fn write_record(&self, storage_ref: &StorageRef, data: &[u8]) -> Result<()> {
        let path = self.record_path(&storage_ref.path)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let body = if storage_ref.compressed {
            gzip(data)?
        } else {
            data.to_vec()
        };

        // Body first, sidecar second: a listed ref always has its body.
        let tmp_id = Uuid::new_v4();
        let tmp_body = self.root.join("tmp").join(format!("{}.tmp", tmp_id));
        fs::write(&tmp_body, &body).await?;
        fs::rename(&tmp_body, &path).await?;

        let tmp_sidecar = self.root.join("tmp").join(format!("{}.ref.tmp", tmp_id));
        fs::write(&tmp_sidecar, serde_json::to_vec_pretty(storage_ref)?).await?;
        fs::rename(&tmp_sidecar, self.sidecar_path(&storage_ref.path)?).await?;

        Ok(())
    }

    /// Check if the record behind a ref exists
    pub async fn exists(&self, storage_ref: &StorageRef) -> bool {
        match self.record_path(&storage_ref.path) {
            Ok(path) => fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Get the bytes behind a ref
    pub async fn retrieve(&self, storage_ref: &StorageRef) -> Result<Vec<u8>> {
        let path = self.record_path(&storage_ref.path)?;

        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::not_found(storage_ref.category.to_string(), &storage_ref.path));
            }
            Err(e) => return Err(e.into()),
        };

        let data = if storage_ref.compressed {
            gunzip(&raw).map_err(|e| Error::corrupt(&storage_ref.path, e.to_string()))?
        } else {
            raw
        };

        if self.verify_integrity {
            if data.len() as u64 != storage_ref.size {
                return Err(Error::corrupt(
                    &storage_ref.path,
                    format!("size mismatch: expected {}, got {}", storage_ref.size, data.len()),
                ));
            }
            let actual = Self::hash(&data);
            if actual != storage_ref.hash {
                return Err(Error::corrupt(
                    &storage_ref.path,
                    format!("digest mismatch: expected {}, got {}", storage_ref.hash, actual),
                ));
            }
        }

        Ok(data)
    }

    /// Delete the record behind a ref; deleting a missing record is not an error
    pub async fn delete(&self, storage_ref: &StorageRef) -> Result<()> {
        for path in [
            self.record_path(&storage_ref.path)?,
            self.sidecar_path(&storage_ref.path)?,
        ] {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        debug!("Deleted record {}", storage_ref.path);
        Ok(())
    }

    /// Load the ref stored next to a record
    pub async fn load_ref(&self, path: &str) -> Result<StorageRef> {
        let sidecar = self.sidecar_path(path)?;
        match fs::read(&sidecar).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found("ref", path))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Current ref of the slot `storage_ref` names.
    ///
    /// A ref taken before a [`replace`](Self::replace) resolves to the
    /// rewritten record instead of failing verification.
    pub async fn resolve(&self, storage_ref: &StorageRef) -> Result<StorageRef> {
        match self.load_ref(&storage_ref.path).await {
            Err(e) if e.is_not_found() => Err(Error::not_found(storage_ref.category.to_string(), &storage_ref.path)),
            other => other,
        }
    }

    /// List every ref of a category without reading any record body
    pub async fn list(&self, category: Category) -> Result<Vec<StorageRef>> {
        let dir = self.objects_dir().join(category.dir_name());
        let mut refs = Vec::new();

        if !dir.exists() {
            return Ok(refs);
        }

        for entry in walkdir::WalkDir::new(&dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let is_sidecar = entry
                .file_name()
                .to_str()
                .map(|n| n.ends_with(SIDECAR_SUFFIX))
                .unwrap_or(false);
            if !is_sidecar {
                continue;
            }

            let raw = match fs::read(entry.path()).await {
                Ok(raw) => raw,
                // Raced with a delete.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            match serde_json::from_slice::<StorageRef>(&raw) {
                Ok(storage_ref) => refs.push(storage_ref),
                Err(e) => warn!("Skipping unreadable ref sidecar {:?}: {}", entry.path(), e),
            }
        }

        Ok(refs)
    }
}

/// Restrict a caller-supplied string to a single safe path segment
fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

fn gunzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store(tmp: &TempDir, compress: bool) -> ContentStore {
        ContentStore::new(tmp.path(), true, compress).await.unwrap()
    }

    #[tokio::test]
    async fn test_store_retrieve() {
        let tmp = TempDir::new().unwrap();
        let cas = store(&tmp, false).await;

        let data = b"hello world";
        let r = cas
            .store(Category::Html, data, StoreOptions::new("t1"))
            .await
            .unwrap();

        assert_eq!(r.size, 11);
        assert_eq!(r.hash, ContentStore::hash(data));
        assert!(r.path.starts_with("html/t1/"));
        assert!(cas.exists(&r).await);

        let retrieved = cas.retrieve(&r).await.unwrap();
        assert_eq!(data.as_slice(), retrieved.as_slice());
    }

    #[tokio::test]
    async fn test_no_dedup() {
        let tmp = TempDir::new().unwrap();
        let cas = store(&tmp, false).await;

        let a = cas.store(Category::Metadata, b"same", StoreOptions::new("t")).await.unwrap();
        let b = cas.store(Category::Metadata, b"same", StoreOptions::new("t")).await.unwrap();

        assert_eq!(a.hash, b.hash);
        assert_ne!(a.path, b.path);
        assert_eq!(cas.list(Category::Metadata).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_compressed_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let cas = store(&tmp, true).await;

        let data = "<div>repeat</div>".repeat(500);
        let r = cas
            .store(Category::Html, data.as_bytes(), StoreOptions::new("t"))
            .await
            .unwrap();

        assert!(r.compressed);
        assert_eq!(r.size, data.len() as u64);
        let on_disk = std::fs::metadata(cas.record_path(&r.path).unwrap()).unwrap().len();
        assert!(on_disk < r.size);
        assert_eq!(cas.retrieve(&r).await.unwrap(), data.as_bytes());
    }

    #[tokio::test]
    async fn test_integrity_check() {
        let tmp = TempDir::new().unwrap();
        let cas = store(&tmp, false).await;

        let r = cas.store(Category::Html, b"test data", StoreOptions::new("t")).await.unwrap();

        fs::write(cas.record_path(&r.path).unwrap(), b"corrupted").await.unwrap();

        let err = cas.retrieve(&r).await.unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_integrity_check_disabled() {
        let tmp = TempDir::new().unwrap();
        let cas = ContentStore::new(tmp.path(), false, false).await.unwrap();

        let r = cas.store(Category::Html, b"test data", StoreOptions::new("t")).await.unwrap();
        fs::write(cas.record_path(&r.path).unwrap(), b"tampered").await.unwrap();

        assert_eq!(cas.retrieve(&r).await.unwrap(), b"tampered");
    }

    #[tokio::test]
    async fn test_missing_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let cas = store(&tmp, false).await;

        let r = cas.store(Category::Html, b"x", StoreOptions::new("t")).await.unwrap();
        cas.delete(&r).await.unwrap();

        assert!(cas.retrieve(&r).await.unwrap_err().is_not_found());
        // Idempotent
        cas.delete(&r).await.unwrap();
        assert!(cas.list(Category::Html).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_keeps_slot() {
        let tmp = TempDir::new().unwrap();
        let cas = store(&tmp, false).await;

        let old = cas.store(Category::Metadata, b"v1", StoreOptions::new("t")).await.unwrap();
        let new = cas
            .replace(&old, b"version two", RefTags::default().with_extra("rev", "2"))
            .await
            .unwrap();

        assert_eq!(old.path, new.path);
        assert_eq!(old.timestamp, new.timestamp);
        assert_ne!(old.hash, new.hash);
        assert_eq!(cas.retrieve(&new).await.unwrap(), b"version two");
        assert!(matches!(cas.retrieve(&old).await, Err(Error::Corrupt { .. })));
        assert_eq!(cas.load_ref(&new.path).await.unwrap(), new);

        let current = cas.resolve(&old).await.unwrap();
        assert_eq!(current, new);
        assert_eq!(cas.retrieve(&current).await.unwrap(), b"version two");

        cas.delete(&new).await.unwrap();
        assert!(cas.resolve(&old).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_paths_are_sanitized() {
        let tmp = TempDir::new().unwrap();
        let cas = store(&tmp, false).await;

        let r = cas
            .store(Category::Html, b"x", StoreOptions::new("../../etc"))
            .await
            .unwrap();
        assert!(r.path.starts_with("html/______etc/"));
        assert!(cas.record_path("../escape").is_err());
    }
}
