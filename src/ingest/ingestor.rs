//! Knowledge refresh: scraped pages and catalog products into the corpus.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::errors::{AgentError, AgentResult};
use crate::corpus::Corpus;
use crate::corpus::document::{Document, UpsertOutcome};
use crate::ingest::catalog::ProductCatalog;
use crate::ingest::scraper::PageScraper;
use crate::storage::logger::ConversationLogger;
use crate::storage::records::CorpusAction;

/// Outcome of a website refresh.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Extra pages found through the sitemap.
    pub pages_discovered: usize,
    /// Pages fetched and extracted.
    pub pages_scraped: usize,
    /// Pages that could not be fetched.
    pub pages_failed: usize,
    /// Product documents taken from the backend catalog.
    pub products_ingested: usize,
    /// New documents.
    pub added: usize,
    /// Replaced documents.
    pub updated: usize,
    /// Documents already up to date.
    pub unchanged: usize,
    /// Documents that could not be stored.
    pub failed: usize,
}

impl IngestReport {
    fn record(&mut self, outcome: &AgentResult<UpsertOutcome>) {
        match outcome {
            Ok(UpsertOutcome::Added) => self.added += 1,
            Ok(UpsertOutcome::Updated) => self.updated += 1,
            Ok(UpsertOutcome::Unchanged) => self.unchanged += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Feeds the corpus and records every step in the corpus action log.
pub struct KnowledgeIngestor {
    corpus: Arc<dyn Corpus>,
    scraper: PageScraper,
    catalog: ProductCatalog,
    logger: ConversationLogger,
}

impl KnowledgeIngestor {
    /// Create an ingestor.
    #[must_use]
    pub fn new(
        corpus: Arc<dyn Corpus>,
        scraper: PageScraper,
        catalog: ProductCatalog,
        logger: ConversationLogger,
    ) -> Self {
        Self {
            corpus,
            scraper,
            catalog,
            logger,
        }
    }

    /// Store one document and log the outcome.
    ///
    /// # Errors
    /// Returns [`AgentError::InvalidRequest`] for a document without URL or content,
    /// or an error if the corpus cannot persist the document.
    pub async fn ingest_document(&self, document: Document) -> AgentResult<UpsertOutcome> {
        if document.url.trim().is_empty() {
            return Err(AgentError::InvalidRequest("document url must not be empty".to_string()));
        }
        if document.content.trim().is_empty() {
            return Err(AgentError::InvalidRequest(format!(
                "document {} has no content",
                document.url
            )));
        }
        let url = document.url.clone();
        let title = document.title.clone();
        let result = self.corpus.upsert(document).await;
        let action = match &result {
            Ok(outcome) => CorpusAction::new(outcome.as_str(), Some(url), Some(title), "success"),
            Err(err) => {
                warn!("Error adding document {url}: {err}");
                CorpusAction::new("add", Some(url), Some(title), format!("error: {err}"))
            }
        };
        self.logger.log_corpus_action(action).await;
        result
    }

    /// Scrape configured pages and catalog products into the corpus.
    ///
    /// Individual failures are logged and counted; the refresh itself never fails.
    pub async fn refresh_website(&self) -> IngestReport {
        let mut report = IngestReport::default();

        let mut urls = self.scraper.page_urls();
        match self.scraper.sitemap_urls().await {
            Ok(discovered) => {
                for url in discovered {
                    if !urls.contains(&url) {
                        report.pages_discovered += 1;
                        urls.push(url);
                    }
                }
            }
            Err(err) => debug!("No sitemap available: {err}"),
        }
        let pages = join_all(urls.iter().map(|url| self.scraper.scrape(url))).await;
        for (url, page) in urls.into_iter().zip(pages) {
            match page {
                Ok(document) => {
                    report.pages_scraped += 1;
                    let outcome = self.ingest_document(document).await;
                    report.record(&outcome);
                }
                Err(err) => {
                    warn!("Failed to scrape {url}: {err}");
                    report.pages_failed += 1;
                    self.logger
                        .log_corpus_action(CorpusAction::new(
                            "scrape",
                            Some(url),
                            None,
                            format!("error: {err}"),
                        ))
                        .await;
                }
            }
        }

        match self.catalog.fetch_documents().await {
            Ok(products) => {
                for document in products {
                    report.products_ingested += 1;
                    let outcome = self.ingest_document(document).await;
                    report.record(&outcome);
                }
            }
            Err(err) => {
                warn!("Failed to get products from backend: {err}");
                self.logger
                    .log_corpus_action(CorpusAction::new(
                        "catalog",
                        None,
                        None,
                        format!("error: {err}"),
                    ))
                    .await;
            }
        }

        info!(
            discovered = report.pages_discovered,
            scraped = report.pages_scraped,
            failed = report.pages_failed,
            products = report.products_ingested,
            added = report.added,
            updated = report.updated,
            "Website scraping completed"
        );
        report
    }
}
