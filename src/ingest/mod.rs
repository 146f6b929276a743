//! Corpus ingestion from the storefront and the shop backend.

pub mod catalog;
pub mod ingestor;
pub mod scraper;

pub use catalog::{Bike, ProductCatalog};
pub use ingestor::{IngestReport, KnowledgeIngestor};
pub use scraper::{PageScraper, extract_document};
