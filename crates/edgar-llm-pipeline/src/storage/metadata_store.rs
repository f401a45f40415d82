use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::info;

use edgar_llm_core::{FilingDocument, PipelineError, Result};

/// **Metadata Store**
///
/// Seam to the document database holding the "filings" collection.
/// Documents are keyed by `filing_id`; `upsert` overwrites the full
/// document.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, filing_id: &str) -> Result<Option<FilingDocument>>;
    async fn upsert(&self, document: &FilingDocument) -> Result<()>;
}

/// Directory of `<filing_id>.json` documents; the local stand-in for the
/// configured document database.
#[derive(Debug)]
pub struct JsonMetadataStore {
    root: PathBuf,
}

impl JsonMetadataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn document_path(&self, filing_id: &str) -> PathBuf {
        self.root.join(format!("{filing_id}.json"))
    }
}

#[async_trait]
impl MetadataStore for JsonMetadataStore {
    async fn get(&self, filing_id: &str) -> Result<Option<FilingDocument>> {
        match tokio::fs::read_to_string(self.document_path(filing_id)).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::Io(e)),
        }
    }

    async fn upsert(&self, document: &FilingDocument) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.document_path(&document.filing_id);
        let json = serde_json::to_string_pretty(document)?;
        tokio::fs::write(&path, json).await?;
        info!(filing_id = %document.filing_id, "metadata upserted");
        Ok(())
    }
}

/// In-memory metadata store for tests.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    documents: Mutex<BTreeMap<String, FilingDocument>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.lock().await.is_empty()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get(&self, filing_id: &str) -> Result<Option<FilingDocument>> {
        Ok(self.documents.lock().await.get(filing_id).cloned())
    }

    async fn upsert(&self, document: &FilingDocument) -> Result<()> {
        self.documents
            .lock()
            .await
            .insert(document.filing_id.clone(), document.clone());
        Ok(())
    }
}
