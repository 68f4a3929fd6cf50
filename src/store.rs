//! Object store collaborator.
//!
//! The pipeline only ever sees `bucket/key` paths and the [`ObjectStore`]
//! trait. Two adapters ship with the crate: [`LocalObjectStore`] maps buckets
//! to sub-directories of a root directory, [`InMemoryObjectStore`] keeps
//! objects in a map and is used by the tests.

use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

/// A `bucket/key` object address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectPath {
    pub bucket: String,
    pub key: String,
}

impl ObjectPath {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parses `bucket/key`, tolerating an `s3://` scheme prefix.
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.trim().trim_start_matches("s3://");
        match trimmed.split_once('/') {
            Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
                Ok(Self::new(bucket, key))
            }
            _ => Err(PipelineError::Storage(format!(
                "Object path must look like bucket/key: '{path}'"
            ))),
        }
    }

    /// Last segment of the key.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// Key without its last segment (empty for top-level objects).
    pub fn parent_key(&self) -> &str {
        self.key.rsplit_once('/').map_or("", |(parent, _)| parent)
    }

    pub fn with_key(&self, key: impl Into<String>) -> Self {
        Self::new(self.bucket.clone(), key)
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMeta {
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

/// Blocking object storage primitives used by the pipeline.
///
/// Every call either succeeds or returns an error synchronously; retry
/// policy belongs to the implementation.
pub trait ObjectStore: Send + Sync {
    fn read(&self, path: &ObjectPath) -> Result<Vec<u8>>;

    fn write(&self, path: &ObjectPath, bytes: &[u8]) -> Result<()>;

    fn delete(&self, path: &ObjectPath) -> Result<()>;

    fn head(&self, path: &ObjectPath) -> Result<ObjectMeta>;

    /// Keys under `prefix` in `bucket`, sorted.
    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectPath>>;

    /// Copy then delete.
    fn move_object(&self, src: &ObjectPath, dst: &ObjectPath) -> Result<()> {
        let bytes = self.read(src)?;
        self.write(dst, &bytes)?;
        self.delete(src)?;
        tracing::info!("Moved {src} -> {dst}");
        Ok(())
    }

    /// Deletes every object under `prefix`, returning how many were removed.
    fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<usize> {
        let objects = self.list(bucket, prefix)?;
        for object in &objects {
            self.delete(object)?;
        }
        Ok(objects.len())
    }

    fn exists(&self, path: &ObjectPath) -> bool {
        self.head(path).is_ok()
    }
}

/// Filesystem-backed store: `<root>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &ObjectPath) -> Result<PathBuf> {
        let bucket = Path::new(&path.bucket);
        let key = Path::new(&path.key);
        let is_plain = |p: &Path| p.components().all(|c| matches!(c, Component::Normal(_)));
        if path.bucket.is_empty() || !is_plain(bucket) || !is_plain(key) {
            return Err(PipelineError::Storage(format!(
                "Refusing to resolve object path outside the store: {path}"
            )));
        }
        Ok(self.root.join(bucket).join(key))
    }

    fn storage_err(action: &str, path: &ObjectPath, err: &std::io::Error) -> PipelineError {
        PipelineError::Storage(format!("Failed to {action} {path}: {err}"))
    }

    fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                Self::collect_files(&path, out)?;
            } else {
                out.push(path);
            }
        }
        Ok(())
    }
}

impl ObjectStore for LocalObjectStore {
    fn read(&self, path: &ObjectPath) -> Result<Vec<u8>> {
        let file = self.resolve(path)?;
        std::fs::read(&file).map_err(|e| Self::storage_err("read", path, &e))
    }

    fn write(&self, path: &ObjectPath, bytes: &[u8]) -> Result<()> {
        let file = self.resolve(path)?;
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Self::storage_err("prepare", path, &e))?;
        }
        std::fs::write(&file, bytes).map_err(|e| Self::storage_err("write", path, &e))?;
        tracing::debug!("Wrote {} bytes to {path}", bytes.len());
        Ok(())
    }

    fn delete(&self, path: &ObjectPath) -> Result<()> {
        let file = self.resolve(path)?;
        std::fs::remove_file(&file).map_err(|e| Self::storage_err("delete", path, &e))
    }

    fn head(&self, path: &ObjectPath) -> Result<ObjectMeta> {
        let file = self.resolve(path)?;
        let metadata = std::fs::metadata(&file).map_err(|e| Self::storage_err("stat", path, &e))?;
        let modified = metadata
            .modified()
            .map_err(|e| Self::storage_err("stat", path, &e))?;
        Ok(ObjectMeta {
            last_modified: DateTime::<Utc>::from(modified),
            size: metadata.len(),
        })
    }

    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectPath>> {
        let bucket_dir = self.root.join(bucket);
        if !bucket_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        Self::collect_files(&bucket_dir, &mut files).map_err(|e| {
            PipelineError::Storage(format!("Failed to list {bucket}/{prefix}: {e}"))
        })?;

        let mut objects: Vec<ObjectPath> = files
            .iter()
            .filter_map(|file| file.strip_prefix(&bucket_dir).ok())
            .map(|relative| {
                relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .filter(|key| key.starts_with(prefix))
            .map(|key| ObjectPath::new(bucket, key))
            .collect();
        objects.sort();
        Ok(objects)
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    last_modified: DateTime<Utc>,
}

/// Map-backed store for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<BTreeMap<ObjectPath, StoredObject>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<ObjectPath, StoredObject>>> {
        self.objects
            .lock()
            .map_err(|_poisoned| PipelineError::Storage("In-memory store lock poisoned".to_owned()))
    }

    /// Every stored path, sorted.
    pub fn paths(&self) -> Vec<ObjectPath> {
        self.lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn read(&self, path: &ObjectPath) -> Result<Vec<u8>> {
        self.lock()?
            .get(path)
            .map(|object| object.bytes.clone())
            .ok_or_else(|| PipelineError::Storage(format!("No such object: {path}")))
    }

    fn write(&self, path: &ObjectPath, bytes: &[u8]) -> Result<()> {
        self.lock()?.insert(
            path.clone(),
            StoredObject {
                bytes: bytes.to_vec(),
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    fn delete(&self, path: &ObjectPath) -> Result<()> {
        self.lock()?
            .remove(path)
            .map(|_removed| ())
            .ok_or_else(|| PipelineError::Storage(format!("No such object: {path}")))
    }

    fn head(&self, path: &ObjectPath) -> Result<ObjectMeta> {
        self.lock()?
            .get(path)
            .map(|object| ObjectMeta {
                last_modified: object.last_modified,
                size: object.bytes.len() as u64,
            })
            .ok_or_else(|| PipelineError::Storage(format!("No such object: {path}")))
    }

    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectPath>> {
        Ok(self
            .lock()?
            .keys()
            .filter(|path| path.bucket == bucket && path.key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_path_parse() {
        let path = ObjectPath::parse("s3://bucket/landing-zone/sales/file.csv").unwrap();
        assert_eq!(path.bucket, "bucket");
        assert_eq!(path.key, "landing-zone/sales/file.csv");
        assert_eq!(path.file_name(), "file.csv");
        assert_eq!(path.parent_key(), "landing-zone/sales");
        assert_eq!(path.to_string(), "bucket/landing-zone/sales/file.csv");

        assert!(ObjectPath::parse("no-key").is_err());
    }

    #[test]
    fn test_in_memory_move_and_delete_prefix() {
        let store = InMemoryObjectStore::new();
        let src = ObjectPath::new("b", "landing/a.csv");
        let dst = ObjectPath::new("b", "archive/a.csv");
        store.write(&src, b"x;y").unwrap();
        store.write(&ObjectPath::new("b", "tracking/one"), b"1").unwrap();
        store.write(&ObjectPath::new("b", "tracking/two"), b"2").unwrap();

        store.move_object(&src, &dst).unwrap();
        assert!(!store.exists(&src));
        assert_eq!(store.read(&dst).unwrap(), b"x;y");

        assert_eq!(store.delete_prefix("b", "tracking/").unwrap(), 2);
        assert_eq!(store.paths(), vec![dst]);
    }

    #[test]
    fn test_local_store_round_trip() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp.path());
        let path = ObjectPath::new("bucket", "landing-zone/sales/file.csv");

        store.write(&path, b"a;b\n1;2\n").unwrap();
        assert!(temp.path().join("bucket/landing-zone/sales/file.csv").is_file());
        assert_eq!(store.head(&path).unwrap().size, 8);
        assert_eq!(store.list("bucket", "landing-zone/").unwrap(), vec![path.clone()]);
        assert!(store.list("bucket", "other/").unwrap().is_empty());

        store.delete(&path).unwrap();
        assert!(store.read(&path).is_err());
    }

    #[test]
    fn test_local_store_rejects_escaping_keys() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp.path());
        let result = store.write(&ObjectPath::new("bucket", "../outside.csv"), b"x");
        assert!(result.is_err());
    }
}
