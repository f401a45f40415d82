use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::info;

use edgar_llm_core::{PipelineError, Result};

/// **Object Store**
///
/// Seam to the configured object-store client. Writes are create-or-replace
/// in one call, so publication is never partial; content type travels with
/// the object. Authentication and bucket provisioning are the operator's
/// concern, per the system boundaries.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Atomic create-or-replace.
    async fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<()>;

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>>;
}

/// Filesystem-backed object store rooted at a local directory. One file
/// per object; the bucket is the root directory.
#[derive(Debug)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.object_path(path)).await?)
    }

    async fn put(&self, path: &str, bytes: &[u8], _content_type: &str) -> Result<()> {
        let target = self.object_path(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write-then-rename keeps the object atomic for readers.
        let tmp = target.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &target).await?;
        info!(path, bytes = bytes.len(), "object written");
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.object_path(path)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::Io(e)),
        }
    }
}

/// In-memory object store for tests; counts writes so idempotence is
/// observable.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    puts: AtomicU64,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::SeqCst)
    }

    pub async fn paths(&self) -> Vec<String> {
        self.objects.lock().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.objects.lock().await.contains_key(path))
    }

    async fn put(&self, path: &str, bytes: &[u8], _content_type: &str) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .await
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.lock().await.get(path).cloned())
    }
}
