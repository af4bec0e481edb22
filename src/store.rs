//! Key/value blob storage used for intermediate collections and rendered tiles.
//!
//! Keys are `/`-separated relative paths such as `"15/5244/12683.geojson"`.

use std::{collections::BTreeMap, fs, io::{self, Write}, path::{Path, PathBuf}, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};
use parking_lot::RwLock;
use tempfile::NamedTempFile;
use walkdir::WalkDir;

/// Byte storage addressed by relative key.
pub trait BlobStore: Send + Sync {
    fn exists(&self, key: &str) -> Result<bool>;
    fn read(&self, key: &str) -> Result<Arc<[u8]>>;
    /// Create or replace `key`. Readers never observe a partial write.
    fn write(&self, key: &str, bytes: &[u8]) -> Result<()>;
    /// Remove `key`. Removing a key that does not exist is an error.
    fn delete(&self, key: &str) -> Result<()>;
    /// All keys starting with `prefix`, sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

impl<S: BlobStore + ?Sized> BlobStore for &S {
    fn exists(&self, key: &str) -> Result<bool> { (**self).exists(key) }
    fn read(&self, key: &str) -> Result<Arc<[u8]>> { (**self).read(key) }
    fn write(&self, key: &str, bytes: &[u8]) -> Result<()> { (**self).write(key, bytes) }
    fn delete(&self, key: &str) -> Result<()> { (**self).delete(key) }
    fn list(&self, prefix: &str) -> Result<Vec<String>> { (**self).list(prefix) }
}

/// Store rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("[store] Failed to create {}", root.display()))?;
        Ok(Self { root })
    }

    #[inline] pub fn root(&self) -> &Path { &self.root }

    fn full(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        if key.is_empty() || rel.is_absolute() || rel.components().any(|c| !matches!(c, std::path::Component::Normal(_))) {
            bail!("[store] Invalid key {key:?}")
        }
        Ok(self.root.join(rel))
    }
}

impl BlobStore for DiskStore {
    fn exists(&self, key: &str) -> Result<bool> {
        let path = self.full(key)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("[store] Failed to inspect {}", path.display())),
        }
    }

    fn read(&self, key: &str) -> Result<Arc<[u8]>> {
        let path = self.full(key)?;
        let bytes = fs::read(&path)
            .with_context(|| format!("[store] Failed to read {}", path.display()))?;
        Ok(Arc::from(bytes))
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.full(key)?;
        let parent = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent)
            .with_context(|| format!("[store] Failed to create {}", parent.display()))?;

        // Write-then-rename so a concurrent reader sees either the old or the new blob.
        let mut tmp = NamedTempFile::new_in(parent)
            .with_context(|| format!("[store] Failed to create temp file in {}", parent.display()))?;
        tmp.write_all(bytes).context("[store] Failed to write temp file")?;
        tmp.persist(&path)
            .with_context(|| format!("[store] Failed to rename to {}", path.display()))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.full(key)?;
        fs::remove_file(&path)
            .with_context(|| format!("[store] Failed to delete {}", path.display()))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry.with_context(|| format!("[store] Failed to walk {}", self.root.display()))?;
            if !entry.file_type().is_file() { continue }

            let rel = entry.path().strip_prefix(&self.root)
                .with_context(|| format!("[store] {} is outside the store", entry.path().display()))?;
            let key = rel.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            // Skip in-flight temp files from `write`.
            if key.rsplit('/').next().is_some_and(|name| name.starts_with(".tmp")) { continue }
            if key.starts_with(prefix) { keys.push(key) }
        }
        keys.sort();
        Ok(keys)
    }
}

/// In-memory store. Clones share the same contents.
#[derive(Debug, Default, Clone)]
pub struct MemStore {
    blobs: Arc<RwLock<BTreeMap<String, Arc<[u8]>>>>,
}

impl MemStore {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.blobs.read().len() }

    pub fn is_empty(&self) -> bool { self.blobs.read().is_empty() }

    /// Snapshot of every key currently stored.
    pub fn keys(&self) -> Vec<String> { self.blobs.read().keys().cloned().collect() }
}

impl BlobStore for MemStore {
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.blobs.read().contains_key(key))
    }

    fn read(&self, key: &str) -> Result<Arc<[u8]>> {
        self.blobs.read().get(key).cloned()
            .ok_or_else(|| anyhow!("[store] Missing key {key:?}"))
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.blobs.write().insert(key.to_string(), Arc::from(bytes));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        match self.blobs.write().remove(key) {
            Some(_) => Ok(()),
            None => Err(anyhow!("[store] Missing key {key:?}")),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self.blobs.read()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}
