//! JSON-file corpus with case-insensitive substring search.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::core::errors::AgentResult;
use crate::corpus::document::{CorpusStats, Document, DocumentKind, SearchResult, UpsertOutcome};
use crate::corpus::{Corpus, CorpusFuture, stats_for};

/// Corpus held in memory and optionally mirrored to a JSON array on disk.
#[derive(Debug)]
pub struct JsonCorpus {
    path: Option<PathBuf>,
    documents: RwLock<Vec<Document>>,
}

impl JsonCorpus {
    /// Create an empty corpus that is never written to disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            documents: RwLock::new(Vec::new()),
        }
    }

    /// Open the corpus stored at `path`. A missing file yields an empty corpus; an
    /// unparsable one is logged and ignored.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read.
    pub async fn open(path: impl Into<PathBuf>) -> AgentResult<Self> {
        let path = path.into();
        let documents = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<Vec<Document>>(&raw) {
                Ok(documents) => documents,
                Err(err) => {
                    warn!("Corpus file {} is not valid JSON, starting empty: {err}", path.display());
                    Vec::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        info!("Loaded corpus with {} documents from {}", documents.len(), path.display());

        Ok(Self {
            path: Some(path),
            documents: RwLock::new(documents),
        })
    }

    /// File backing this corpus, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Copy of every stored document.
    pub async fn snapshot(&self) -> Vec<Document> {
        self.documents.read().await.clone()
    }

    async fn persist(&self, documents: &[Document]) -> AgentResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(documents)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!("Persisted {} documents to {}", documents.len(), path.display());
        Ok(())
    }
}

impl Corpus for JsonCorpus {
    fn search<'a>(&'a self, query: &'a str, limit: usize) -> CorpusFuture<'a, Vec<SearchResult>> {
        Box::pin(async move {
            let documents = self.documents.read().await;
            substring_search(&documents, query, limit)
        })
    }

    fn upsert(&self, document: Document) -> CorpusFuture<'_, AgentResult<UpsertOutcome>> {
        Box::pin(async move {
            let mut documents = self.documents.write().await;
            let outcome = upsert_into(&mut documents, document);
            if outcome != UpsertOutcome::Unchanged {
                self.persist(&documents).await?;
            }
            Ok(outcome)
        })
    }

    fn count(&self) -> CorpusFuture<'_, usize> {
        Box::pin(async move { self.documents.read().await.len() })
    }

    fn stats(&self) -> CorpusFuture<'_, CorpusStats> {
        Box::pin(async move { stats_for(&self.documents.read().await, "substring") })
    }

    fn documents_by_kind(&self, kind: DocumentKind) -> CorpusFuture<'_, Vec<Document>> {
        Box::pin(async move {
            self.documents
                .read()
                .await
                .iter()
                .filter(|doc| doc.kind == kind)
                .cloned()
                .collect()
        })
    }

    fn clear(&self) -> CorpusFuture<'_, AgentResult<()>> {
        Box::pin(async move {
            let mut documents = self.documents.write().await;
            documents.clear();
            self.persist(&documents).await?;
            info!("Corpus cleared");
            Ok(())
        })
    }
}

/// Case-insensitive containment of the trimmed query in each document's text,
/// first `limit` matches in corpus order.
pub(crate) fn substring_search(
    documents: &[Document],
    query: &str,
    limit: usize,
) -> Vec<SearchResult> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() || limit == 0 {
        return Vec::new();
    }
    documents
        .iter()
        .filter(|doc| doc.searchable_text().to_lowercase().contains(&needle))
        .take(limit)
        .cloned()
        .map(SearchResult::unscored)
        .collect()
}

/// Insert or replace by URL. Replacements keep the original `scraped_at`.
pub(crate) fn upsert_into(documents: &mut Vec<Document>, mut document: Document) -> UpsertOutcome {
    let Some(index) = documents.iter().position(|existing| existing.url == document.url) else {
        documents.push(document);
        return UpsertOutcome::Added;
    };
    let existing = &mut documents[index];
    if !existing.differs_materially(&document) {
        return UpsertOutcome::Unchanged;
    }
    document.scraped_at = existing.scraped_at;
    document.updated_at = Utc::now();
    *existing = document;
    UpsertOutcome::Updated
}
