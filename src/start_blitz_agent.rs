//! Startup helpers for the BigBikeBlitz assistant server.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info, warn};

use crate::chat::session_store::SessionStore;
use crate::core::config::{AgentConfig, SearchStrategy};
use crate::corpus::{Corpus, EmbeddingCorpus, JsonCorpus, OllamaEmbedder, seed_products_if_missing};
use crate::engine::ChatEngine;
use crate::ingest::{KnowledgeIngestor, PageScraper, ProductCatalog};
use crate::llm::backend::ChatBackend;
use crate::llm::cache::ResponseCache;
use crate::llm::generator::ResponseGenerator;
use crate::llm::ollama::OllamaClient;
use crate::prompt::builder::PromptBudget;
use crate::server::{self, AppState};
use crate::storage::conversation_log::{ConversationLog, SqliteConversationLog};
use crate::storage::logger::ConversationLogger;
use crate::storage::retention::RetentionSweeper;

const OLLAMA_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Run the server until Ctrl-C.
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting BigBikeBlitz AI Agent v{}", env!("CARGO_PKG_VERSION"));

    let config = match AgentConfig::load().and_then(|config| config.validate().map(|()| config)) {
        Ok(config) => config,
        Err(err) => {
            error!("Invalid configuration: {err}");
            return ExitCode::from(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            error!("Failed to create runtime: {err}");
            return ExitCode::from(1);
        }
    };

    match rt.block_on(serve(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Server error: {err:#}");
            ExitCode::from(1)
        }
    }
}

/// Long-lived services built from the configuration.
pub struct Services {
    /// Handler state.
    pub state: Arc<AppState>,
    /// Model client, kept for warm-up.
    pub ollama: Arc<OllamaClient>,
    /// Response cache, shared with the sweeper.
    pub cache: Arc<ResponseCache>,
}

/// Build every service and prepare the corpus.
///
/// # Errors
/// Returns an error if a client or the corpus cannot be initialized.
pub async fn initialize(config: &AgentConfig) -> anyhow::Result<Services> {
    let logger = ConversationLogger::new(open_conversation_log(config).await?);
    let corpus = open_corpus(config).await?;

    let ollama = Arc::new(OllamaClient::new(&config.llm).context("building Ollama client")?);
    info!("Ollama endpoint: {} (model {})", ollama.base_url(), config.llm.model);
    let cache = Arc::new(ResponseCache::new(&config.cache));
    let generator = ResponseGenerator::new(
        Arc::clone(&ollama) as Arc<dyn ChatBackend>,
        Arc::clone(&cache),
        PromptBudget::from(&config.chat),
    )
    .context("building response generator")?;

    let sessions = Arc::new(SessionStore::new(config.chat.max_history_messages));
    let engine = Arc::new(ChatEngine::new(
        sessions,
        Arc::clone(&corpus),
        Arc::new(generator),
        logger.clone(),
        config.chat.search_limit,
    ));

    let scraper = PageScraper::new(&config.scraping).context("building page scraper")?;
    let catalog = ProductCatalog::new(&config.scraping).context("building catalog client")?;
    let ingestor = Arc::new(KnowledgeIngestor::new(
        Arc::clone(&corpus),
        scraper,
        catalog,
        logger,
    ));

    prepare_corpus(config, corpus.as_ref(), &ingestor).await;

    Ok(Services {
        state: AppState::new(engine, ingestor),
        ollama,
        cache,
    })
}

/// Initialize, serve until Ctrl-C, then stop background work.
///
/// # Errors
/// Returns an error if initialization fails or the server cannot run.
pub async fn serve(config: AgentConfig) -> anyhow::Result<()> {
    let services = initialize(&config).await?;

    tokio::spawn(warm_up(Arc::clone(&services.ollama), config.llm.model.clone()));

    let sweeper = RetentionSweeper::new(
        Arc::clone(services.state.engine.sessions()),
        services.state.logger().clone(),
        Arc::clone(&services.cache),
        config.retention.clone(),
        config.chat.session_idle_hours,
    );
    let sweeper_shutdown = sweeper.shutdown_notifier();
    let sweeper_task = sweeper.spawn();

    info!("AI Agent started successfully!");
    let result = server::run_server_with_shutdown(services.state, &config.server, shutdown_signal())
        .await
        .context("HTTP server failed");

    info!("Shutting down AI Agent...");
    sweeper_shutdown.notify_one();
    let _ = sweeper_task.await;
    result
}

async fn open_conversation_log(config: &AgentConfig) -> anyhow::Result<Arc<dyn ConversationLog>> {
    match SqliteConversationLog::open(&config.storage.sqlite_path).await {
        Ok(log) => {
            info!("Database initialized at {}", config.storage.sqlite_path.display());
            Ok(Arc::new(log))
        }
        Err(err) => {
            warn!("Error initializing database, conversation log kept in memory: {err}");
            let log = SqliteConversationLog::open_in_memory()
                .await
                .context("opening in-memory conversation log")?;
            Ok(Arc::new(log))
        }
    }
}

async fn open_corpus(config: &AgentConfig) -> anyhow::Result<Arc<dyn Corpus>> {
    let store = JsonCorpus::open(&config.corpus.path)
        .await
        .with_context(|| format!("opening corpus {}", config.corpus.path.display()))?;
    let corpus: Arc<dyn Corpus> = match config.corpus.strategy {
        SearchStrategy::Substring => Arc::new(store),
        SearchStrategy::Semantic => {
            let embedder = OllamaEmbedder::new(&config.corpus, &config.llm.base_url)
                .context("building embedder")?;
            Arc::new(EmbeddingCorpus::new(
                store,
                Arc::new(embedder),
                config.corpus.min_similarity,
            ))
        }
    };
    info!(
        strategy = ?config.corpus.strategy,
        documents = corpus.count().await,
        "Knowledge base loaded"
    );
    Ok(corpus)
}

async fn prepare_corpus(config: &AgentConfig, corpus: &dyn Corpus, ingestor: &KnowledgeIngestor) {
    if config.scraping.scrape_on_startup && corpus.count().await == 0 {
        info!("Scraping website data...");
        let report = ingestor.refresh_website().await;
        info!(
            pages = report.pages_scraped,
            products = report.products_ingested,
            added = report.added,
            failed = report.pages_failed + report.failed,
            "Startup ingestion finished"
        );
        if report.added + report.updated + report.unchanged == 0 {
            warn!("Storefront ingestion stored nothing; answers rely on seeded products");
        }
    }
    if config.corpus.seed_products {
        let seeded = seed_products_if_missing(corpus).await;
        if seeded > 0 {
            info!("Seeded {seeded} products");
        }
    }
}

async fn warm_up(ollama: Arc<OllamaClient>, model: String) {
    if !ollama.wait_until_reachable(OLLAMA_STARTUP_TIMEOUT).await {
        warn!("Ollama not reachable at {}; answers use the fallback rules", ollama.base_url());
        return;
    }
    match ollama.has_model().await {
        Ok(true) => match ollama.preload().await {
            Ok(()) => info!("Model {model} is ready"),
            Err(err) => warn!("Failed to preload {model}: {err}"),
        },
        Ok(false) => warn!("Model {model} is not installed; run `ollama pull {model}`"),
        Err(err) => warn!("Failed to list Ollama models: {err}"),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {err}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{CorpusConfig, ScrapingConfig, StorageConfig};
    use crate::corpus::DocumentKind;

    fn temp_path(extension: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("blitz-start-{}.{extension}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_initialize_seeds_products_offline() {
        let corpus_path = temp_path("json");
        let db_path = temp_path("db");
        let config = AgentConfig {
            corpus: CorpusConfig {
                path: corpus_path.clone(),
                ..CorpusConfig::default()
            },
            storage: StorageConfig {
                sqlite_path: db_path.clone(),
            },
            scraping: ScrapingConfig {
                scrape_on_startup: false,
                ..ScrapingConfig::default()
            },
            ..AgentConfig::default()
        };

        let Ok(services) = initialize(&config).await else {
            panic!("initialize failed");
        };
        let products = services
            .state
            .corpus()
            .documents_by_kind(DocumentKind::Product)
            .await;
        assert_eq!(products.len(), 5);
        assert!(corpus_path.exists());

        let _ = std::fs::remove_file(&corpus_path);
        let _ = std::fs::remove_file(&db_path);
    }

    #[tokio::test]
    async fn test_startup_ingestion_against_offline_storefront_still_seeds() {
        let corpus_path = temp_path("json");
        let config = AgentConfig {
            corpus: CorpusConfig {
                path: corpus_path.clone(),
                ..CorpusConfig::default()
            },
            storage: StorageConfig {
                sqlite_path: temp_path("db"),
            },
            scraping: ScrapingConfig {
                website_base_url: "http://127.0.0.1:9".to_string(),
                backend_api_url: "http://127.0.0.1:9".to_string(),
                request_timeout_seconds: 2,
                ..ScrapingConfig::default()
            },
            ..AgentConfig::default()
        };

        let Ok(services) = initialize(&config).await else {
            panic!("initialize failed");
        };
        assert_eq!(services.state.corpus().count().await, 5);

        let _ = std::fs::remove_file(&corpus_path);
        let _ = std::fs::remove_file(&config.storage.sqlite_path);
    }
}
