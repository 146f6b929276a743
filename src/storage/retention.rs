//! Background retention sweeper.
//!
//! Periodically drops idle sessions, purges old log rows and evicts expired cache
//! entries until a shutdown notification arrives.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::chat::session_store::SessionStore;
use crate::core::config::RetentionConfig;
use crate::llm::cache::ResponseCache;
use crate::storage::logger::ConversationLogger;

/// Statistics from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Sessions removed for inactivity.
    pub sessions_removed: usize,
    /// Log rows deleted.
    pub log_rows_deleted: usize,
    /// Expired cache entries evicted.
    pub cache_entries_evicted: usize,
    /// Sweep duration in milliseconds.
    pub duration_ms: u64,
}

impl SweepStats {
    const fn is_empty(&self) -> bool {
        self.sessions_removed == 0 && self.log_rows_deleted == 0 && self.cache_entries_evicted == 0
    }
}

/// Background worker enforcing session idleness and log retention.
pub struct RetentionSweeper {
    sessions: Arc<SessionStore>,
    logger: ConversationLogger,
    cache: Arc<ResponseCache>,
    config: RetentionConfig,
    session_idle: chrono::Duration,
    shutdown: Arc<Notify>,
}

impl RetentionSweeper {
    /// Create a sweeper.
    #[must_use]
    pub fn new(
        sessions: Arc<SessionStore>,
        logger: ConversationLogger,
        cache: Arc<ResponseCache>,
        config: RetentionConfig,
        session_idle_hours: u64,
    ) -> Self {
        let session_idle = i64::try_from(session_idle_hours)
            .ok()
            .and_then(chrono::TimeDelta::try_hours)
            .unwrap_or_else(chrono::TimeDelta::max_value);
        Self {
            sessions,
            logger,
            cache,
            config,
            session_idle,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Notifier that stops the worker.
    #[must_use]
    pub fn shutdown_notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Spawn the worker as a tokio task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Retention sweeper is disabled");
            return;
        }

        let interval = Duration::from_secs(self.config.interval_seconds.max(1));
        info!(?interval, "Starting retention sweeper");

        loop {
            tokio::select! {
                () = tokio::time::sleep(interval) => {
                    let stats = self.sweep().await;
                    if stats.is_empty() {
                        debug!("Retention sweep found nothing to remove");
                    } else {
                        info!(
                            sessions = stats.sessions_removed,
                            log_rows = stats.log_rows_deleted,
                            cache_entries = stats.cache_entries_evicted,
                            duration_ms = stats.duration_ms,
                            "Retention sweep completed"
                        );
                    }
                }
                () = self.shutdown.notified() => {
                    info!("Retention sweeper shutting down");
                    break;
                }
            }
        }
    }

    /// Run a single sweep.
    pub async fn sweep(&self) -> SweepStats {
        let start = std::time::Instant::now();
        let sessions_removed = self.sessions.remove_stale(self.session_idle);
        let log_rows_deleted = self
            .logger
            .purge_older_than(self.config.log_retention_days)
            .await
            .total();
        let cache_entries_evicted = self.cache.purge_expired().await;

        SweepStats {
            sessions_removed,
            log_rows_deleted,
            cache_entries_evicted,
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::core::config::CacheConfig;
    use crate::core::ids::SessionId;
    use crate::storage::conversation_log::SqliteConversationLog;
    use crate::storage::records::Exchange;

    async fn sweeper(config: RetentionConfig) -> (RetentionSweeper, ConversationLogger) {
        sweeper_with_idle(config, 24).await
    }

    async fn sweeper_with_idle(
        config: RetentionConfig,
        session_idle_hours: u64,
    ) -> (RetentionSweeper, ConversationLogger) {
        let Ok(sqlite) = SqliteConversationLog::open_in_memory().await else {
            panic!("open");
        };
        let logger = ConversationLogger::new(Arc::new(sqlite));
        let sweeper = RetentionSweeper::new(
            Arc::new(SessionStore::new(20)),
            logger.clone(),
            Arc::new(ResponseCache::new(&CacheConfig::default())),
            config,
            session_idle_hours,
        );
        (sweeper, logger)
    }

    #[tokio::test]
    async fn test_sweep_purges_rows_past_horizon() {
        let (sweeper, logger) = sweeper(RetentionConfig::default()).await;
        for age_days in [45, 1] {
            logger
                .log_conversation(Exchange {
                    session_id: SessionId::new("s1"),
                    user_id: None,
                    user_message: format!("{age_days} days ago"),
                    ai_response: "ok".to_string(),
                    sources: Vec::new(),
                    created_at: Utc::now() - chrono::Duration::days(age_days),
                })
                .await;
        }

        let stats = sweeper.sweep().await;
        assert_eq!(stats.log_rows_deleted, 1);
        assert_eq!(stats.sessions_removed, 0);
        assert_eq!(logger.session_history(&SessionId::new("s1"), 10).await.len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_with_unbounded_horizons_keeps_everything() {
        let (sweeper, logger) = sweeper_with_idle(
            RetentionConfig {
                log_retention_days: u32::MAX,
                ..RetentionConfig::default()
            },
            u64::MAX,
        )
        .await;
        sweeper
            .sessions
            .append_message(&SessionId::new("s1"), crate::chat::message::Role::User, "hi");
        logger
            .log_conversation(Exchange {
                session_id: SessionId::new("s1"),
                user_id: None,
                user_message: "hi".to_string(),
                ai_response: "hello".to_string(),
                sources: Vec::new(),
                created_at: Utc::now() - chrono::Duration::days(400),
            })
            .await;

        let stats = sweeper.sweep().await;
        assert_eq!(stats.sessions_removed, 0);
        assert_eq!(stats.log_rows_deleted, 0);
        assert!(sweeper.sessions.contains(&SessionId::new("s1")));
    }

    #[tokio::test]
    async fn test_worker_stops_on_shutdown() {
        let (sweeper, _) = sweeper(RetentionConfig {
            interval_seconds: 3600,
            ..RetentionConfig::default()
        })
        .await;
        let shutdown = sweeper.shutdown_notifier();
        let handle = sweeper.spawn();

        tokio::task::yield_now().await;
        shutdown.notify_one();
        let joined = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }
}
