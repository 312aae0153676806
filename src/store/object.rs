//! Durable object storage seam.
//!
//! The worker only needs `get`/`put` over opaque keys: font payloads under
//! `fonts/…` and rendered PNGs under `processed_images/…`. Backends are
//! injected so tests run against the in-memory store.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::Context as _;
use async_trait::async_trait;

use crate::foundation::error::{FeedforgeError, FeedforgeResult};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object's bytes; `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> FeedforgeResult<Option<Vec<u8>>>;

    /// Store an object. Writers for the same key are expected to carry
    /// identical content, so last-writer-wins is acceptable.
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> FeedforgeResult<()>;
}

/// Object key for a rendered output image.
pub fn output_object_key(subject_id: &str, outfeed_id: &str, job_id: &uuid::Uuid) -> String {
    format!("processed_images/{subject_id}/{outfeed_id}/{job_id}.png")
}

/// Filesystem-rooted store used by local/dev deployments.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Reject absolute keys and parent traversal so a hostile key cannot
    /// escape the store root.
    fn path_for(&self, key: &str) -> FeedforgeResult<PathBuf> {
        let normalized = key.replace('\\', "/");
        if normalized.starts_with('/') || normalized.is_empty() {
            return Err(FeedforgeError::storage(format!(
                "object keys must be non-empty and relative: '{key}'"
            )));
        }
        let mut out = self.root.clone();
        for part in normalized.split('/') {
            if part.is_empty() || part == "." {
                continue;
            }
            if part == ".." {
                return Err(FeedforgeError::storage(format!(
                    "object keys must not contain '..': '{key}'"
                )));
            }
            out.push(part);
        }
        Ok(out)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, key: &str) -> FeedforgeResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FeedforgeError::from(anyhow::Error::from(e).context(
                format!("read object '{}'", path.display()),
            ))),
        }
    }

    async fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> FeedforgeResult<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create object dir '{}'", parent.display()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("write object '{}'", path.display()))?;
        Ok(())
    }
}

impl FsObjectStore {
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object outside the trait, for test setup.
    pub fn insert(&self, key: &str, bytes: Vec<u8>, content_type: &str) {
        self.objects
            .lock()
            .expect("object store lock poisoned")
            .insert(key.to_string(), (bytes, content_type.to_string()));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects
            .lock()
            .expect("object store lock poisoned")
            .contains_key(key)
    }

    pub fn content_type_of(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .expect("object store lock poisoned")
            .get(key)
            .map(|(_, ct)| ct.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str) -> FeedforgeResult<Option<Vec<u8>>> {
        Ok(self
            .objects
            .lock()
            .expect("object store lock poisoned")
            .get(key)
            .map(|(bytes, _)| bytes.clone()))
    }

    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> FeedforgeResult<()> {
        self.insert(key, bytes.to_vec(), content_type);
        Ok(())
    }
}
