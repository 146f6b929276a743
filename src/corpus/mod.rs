//! Searchable corpus of storefront pages and products.
//!
//! The orchestrator talks to a [`Corpus`] only; whether matches come from substring
//! containment or embedding similarity is decided at startup.

pub mod document;
pub mod seed;
pub mod semantic;
pub mod substring;

use std::future::Future;
use std::pin::Pin;

pub use document::{
    CorpusStats, Document, DocumentAttributes, DocumentKind, SearchResult, SourceRef,
    UpsertOutcome,
};
pub use seed::{seed_products, seed_products_if_missing};
pub use semantic::{Embedder, EmbeddingCorpus, OllamaEmbedder};
pub use substring::JsonCorpus;

use crate::core::errors::AgentResult;

/// Boxed future type for corpus operations.
pub type CorpusFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A searchable document collection.
pub trait Corpus: Send + Sync {
    /// Best matches for `query`, at most `limit`, best first.
    ///
    /// Never fails: an unavailable corpus yields no results.
    fn search<'a>(&'a self, query: &'a str, limit: usize) -> CorpusFuture<'a, Vec<SearchResult>>;

    /// Insert a document or replace the one stored under the same URL.
    ///
    /// # Errors
    /// Returns an error if the collection cannot be persisted.
    fn upsert(&self, document: Document) -> CorpusFuture<'_, AgentResult<UpsertOutcome>>;

    /// Number of stored documents.
    fn count(&self) -> CorpusFuture<'_, usize>;

    /// Counts by document kind.
    fn stats(&self) -> CorpusFuture<'_, CorpusStats>;

    /// Stored documents of one kind, in insertion order.
    fn documents_by_kind(&self, kind: DocumentKind) -> CorpusFuture<'_, Vec<Document>>;

    /// Remove every document.
    ///
    /// # Errors
    /// Returns an error if the collection cannot be persisted.
    fn clear(&self) -> CorpusFuture<'_, AgentResult<()>>;
}

pub(crate) fn stats_for(documents: &[Document], strategy: &str) -> CorpusStats {
    let mut stats = CorpusStats {
        total_documents: documents.len(),
        strategy: strategy.to_string(),
        ..CorpusStats::default()
    };
    for document in documents {
        *stats
            .by_type
            .entry(document.kind.as_str().to_string())
            .or_default() += 1;
    }
    stats
}
