//! Infallible logging facade used by the chat path.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, warn};

use crate::core::errors::AgentResult;
use crate::core::ids::SessionId;
use crate::storage::conversation_log::ConversationLog;
use crate::storage::records::{
    AnalyticsEvent, AnalyticsSummary, ConversationRecord, CorpusAction, Exchange, PopularQuery,
    PurgeReport, days_before,
};

/// Storage failures are logged and replaced by empty values.
#[derive(Clone)]
pub struct ConversationLogger {
    log: Arc<dyn ConversationLog>,
}

impl ConversationLogger {
    /// Wrap a log backend.
    #[must_use]
    pub fn new(log: Arc<dyn ConversationLog>) -> Self {
        Self { log }
    }

    /// Record an exchange.
    pub async fn log_conversation(&self, exchange: Exchange) {
        let session_id = exchange.session_id.clone();
        match self.log.append_exchange(exchange).await {
            Ok(()) => debug!(session_id = %session_id, "Logged conversation"),
            Err(err) => error!(session_id = %session_id, "Error logging conversation: {err}"),
        }
    }

    /// Record an analytics event.
    pub async fn log_event(&self, event: AnalyticsEvent) {
        let event_type = event.event_type.clone();
        if let Err(err) = self.log.append_event(event).await {
            error!(event_type = %event_type, "Error logging analytics event: {err}");
        }
    }

    /// Record a corpus ingestion action.
    pub async fn log_corpus_action(&self, action: CorpusAction) {
        let name = action.action.clone();
        if let Err(err) = self.log.append_corpus_action(action).await {
            error!(action = %name, "Error logging knowledge base action: {err}");
        }
    }

    /// Most recent exchanges of a session, newest first.
    pub async fn session_history(&self, session_id: &SessionId, limit: usize) -> Vec<ConversationRecord> {
        self.log
            .session_history(session_id.clone(), limit)
            .await
            .unwrap_or_else(|err| {
                error!(session_id = %session_id, "Error getting conversation history: {err}");
                Vec::new()
            })
    }

    /// Exchanges containing `text`, newest first.
    pub async fn search(&self, text: &str, limit: usize) -> Vec<ConversationRecord> {
        self.log
            .search(text.to_string(), limit)
            .await
            .unwrap_or_else(|err| {
                error!("Error searching conversations: {err}");
                Vec::new()
            })
    }

    /// Aggregates over the trailing `days`.
    pub async fn summary(&self, days: u32) -> AnalyticsSummary {
        self.log
            .summary(days, Utc::now())
            .await
            .unwrap_or_else(|err| {
                error!("Error getting analytics summary: {err}");
                AnalyticsSummary {
                    period_days: days,
                    ..AnalyticsSummary::default()
                }
            })
    }

    /// Most frequent user messages.
    pub async fn popular_queries(&self, limit: usize) -> Vec<PopularQuery> {
        self.log.popular_queries(limit).await.unwrap_or_else(|err| {
            error!("Error getting popular queries: {err}");
            Vec::new()
        })
    }

    /// Delete rows older than `days`.
    pub async fn purge_older_than(&self, days: u32) -> PurgeReport {
        let cutoff = days_before(Utc::now(), days);
        self.log.purge_before(cutoff).await.unwrap_or_else(|err| {
            warn!("Error cleaning up old data: {err}");
            PurgeReport::default()
        })
    }

    /// Copy the database to `path`.
    ///
    /// # Errors
    /// Returns an error if the backup cannot be written.
    pub async fn backup(&self, path: PathBuf) -> AgentResult<()> {
        self.log.backup(path).await
    }
}
