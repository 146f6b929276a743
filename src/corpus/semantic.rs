//! Embedding-backed corpus search.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Client as ReqwestClient;
use rig::client::{EmbeddingsClient, Nothing};
use rig::embeddings::{Embedding, EmbeddingModel};
use rig::providers::ollama;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::core::config::CorpusConfig;
use crate::core::errors::{AgentError, AgentResult};
use crate::corpus::document::{CorpusStats, Document, DocumentKind, SearchResult, UpsertOutcome};
use crate::corpus::substring::{JsonCorpus, substring_search};
use crate::corpus::{Corpus, CorpusFuture, stats_for};

/// Boxed future type for embedder operations.
pub type EmbedFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait abstraction over embedding models.
pub trait Embedder: Send + Sync {
    /// Embed a single text string.
    ///
    /// # Errors
    /// Returns an error if the embedding request fails.
    fn embed_text(&self, text: &str) -> EmbedFuture<'_, AgentResult<Embedding>>;
    /// Embed multiple texts.
    ///
    /// # Errors
    /// Returns an error if the embedding request fails.
    fn embed_texts(&self, texts: Vec<String>) -> EmbedFuture<'_, AgentResult<Vec<Embedding>>>;
    /// Return embedding dimensionality.
    fn ndims(&self) -> usize;
}

type OllamaEmbeddingModel = ollama::EmbeddingModel<ReqwestClient>;

/// Ollama embedder using the Rig provider.
#[derive(Clone)]
pub struct OllamaEmbedder {
    model: OllamaEmbeddingModel,
    ndims: usize,
}

impl OllamaEmbedder {
    /// Create an embedder against the Ollama server at `base_url`.
    ///
    /// # Errors
    /// Returns an error if the client cannot be built.
    pub fn new(config: &CorpusConfig, base_url: &str) -> AgentResult<Self> {
        let client = ollama::Client::<ReqwestClient>::builder()
            .api_key(Nothing)
            .base_url(base_url)
            .build()
            .map_err(AgentError::from)?;
        let model =
            client.embedding_model_with_ndims(config.embedding_model.clone(), config.embedding_ndims);
        Ok(Self {
            model,
            ndims: config.embedding_ndims,
        })
    }
}

impl Embedder for OllamaEmbedder {
    fn embed_text(&self, text: &str) -> EmbedFuture<'_, AgentResult<Embedding>> {
        let text = text.to_string();
        Box::pin(async move {
            self.model
                .embed_text(&text)
                .await
                .map_err(AgentError::Embedding)
        })
    }

    fn embed_texts(&self, texts: Vec<String>) -> EmbedFuture<'_, AgentResult<Vec<Embedding>>> {
        Box::pin(async move {
            self.model
                .embed_texts(texts)
                .await
                .map_err(AgentError::Embedding)
        })
    }

    fn ndims(&self) -> usize {
        self.ndims
    }
}

#[derive(Clone, Debug)]
struct CachedVector {
    updated_at: DateTime<Utc>,
    vec: Vec<f64>,
}

/// Corpus ranked by cosine similarity between query and document embeddings.
///
/// Documents live in a [`JsonCorpus`]; vectors are computed lazily on the first search
/// after a document changes. When the embedder fails, search falls back to substring
/// containment.
pub struct EmbeddingCorpus {
    store: JsonCorpus,
    embedder: Arc<dyn Embedder>,
    min_similarity: f64,
    vectors: Mutex<HashMap<String, CachedVector>>,
}

impl EmbeddingCorpus {
    /// Wrap a document store with an embedder.
    #[must_use]
    pub fn new(store: JsonCorpus, embedder: Arc<dyn Embedder>, min_similarity: f64) -> Self {
        Self {
            store,
            embedder,
            min_similarity,
            vectors: Mutex::new(HashMap::new()),
        }
    }

    async fn ranked(
        &self,
        documents: &[Document],
        query: &str,
        limit: usize,
    ) -> AgentResult<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() || limit == 0 || documents.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed_text(query).await?.vec;

        let stale: Vec<&Document> = {
            let vectors = self.vectors.lock().await;
            documents
                .iter()
                .filter(|doc| {
                    vectors
                        .get(&doc.url)
                        .is_none_or(|cached| cached.updated_at != doc.updated_at)
                })
                .collect()
        };
        if !stale.is_empty() {
            debug!("Embedding {} corpus documents", stale.len());
            let texts = stale.iter().map(|doc| doc.searchable_text()).collect();
            let embeddings = self.embedder.embed_texts(texts).await?;
            if embeddings.len() != stale.len() {
                return Err(AgentError::MalformedResponse(format!(
                    "expected {} embeddings, got {}",
                    stale.len(),
                    embeddings.len()
                )));
            }
            let mut vectors = self.vectors.lock().await;
            for (doc, embedding) in stale.into_iter().zip(embeddings) {
                vectors.insert(
                    doc.url.clone(),
                    CachedVector {
                        updated_at: doc.updated_at,
                        vec: embedding.vec,
                    },
                );
            }
        }

        let vectors = self.vectors.lock().await;
        let mut results: Vec<SearchResult> = documents
            .iter()
            .filter_map(|doc| {
                let cached = vectors.get(&doc.url)?;
                let score = cosine_similarity(&query_vec, &cached.vec);
                (score >= self.min_similarity).then(|| SearchResult {
                    document: doc.clone(),
                    score: Some(score),
                })
            })
            .collect();
        results.sort_by(|a, b| {
            b.score
                .unwrap_or_default()
                .partial_cmp(&a.score.unwrap_or_default())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        drop(vectors);
        results.truncate(limit);
        Ok(results)
    }
}

impl Corpus for EmbeddingCorpus {
    fn search<'a>(&'a self, query: &'a str, limit: usize) -> CorpusFuture<'a, Vec<SearchResult>> {
        Box::pin(async move {
            let documents = self.store.snapshot().await;
            match self.ranked(&documents, query, limit).await {
                Ok(results) => results,
                Err(err) => {
                    warn!("Semantic search failed, using substring match: {err}");
                    substring_search(&documents, query, limit)
                }
            }
        })
    }

    fn upsert(&self, document: Document) -> CorpusFuture<'_, AgentResult<UpsertOutcome>> {
        Box::pin(async move {
            let url = document.url.clone();
            let outcome = self.store.upsert(document).await?;
            if outcome == UpsertOutcome::Updated {
                self.vectors.lock().await.remove(&url);
            }
            Ok(outcome)
        })
    }

    fn count(&self) -> CorpusFuture<'_, usize> {
        self.store.count()
    }

    fn stats(&self) -> CorpusFuture<'_, CorpusStats> {
        Box::pin(async move { stats_for(&self.store.snapshot().await, "semantic") })
    }

    fn documents_by_kind(&self, kind: DocumentKind) -> CorpusFuture<'_, Vec<Document>> {
        self.store.documents_by_kind(kind)
    }

    fn clear(&self) -> CorpusFuture<'_, AgentResult<()>> {
        Box::pin(async move {
            self.store.clear().await?;
            self.vectors.lock().await.clear();
            Ok(())
        })
    }
}

/// Cosine similarity; zero when either vector is empty, zero-length or sizes differ.
#[must_use]
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
