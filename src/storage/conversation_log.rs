//! Append-only conversation log in `SQLite`.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use chrono::{DateTime, TimeZone, Utc};
use tokio_rusqlite::Connection;

use crate::core::errors::{AgentError, AgentResult};
use crate::core::ids::{SessionId, UserId};
use crate::storage::records::{
    AnalyticsEvent, AnalyticsSummary, ConversationRecord, CorpusAction, Exchange, PopularQuery,
    PurgeReport, days_before,
};

/// Boxed future type for log operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Conversation log backend.
pub trait ConversationLog: Send + Sync {
    /// Append an exchange.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn append_exchange(&self, exchange: Exchange) -> StoreFuture<'_, AgentResult<()>>;
    /// Append an analytics event.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn append_event(&self, event: AnalyticsEvent) -> StoreFuture<'_, AgentResult<()>>;
    /// Append a corpus action.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn append_corpus_action(&self, action: CorpusAction) -> StoreFuture<'_, AgentResult<()>>;
    /// Most recent exchanges of a session, newest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn session_history(
        &self,
        session_id: SessionId,
        limit: usize,
    ) -> StoreFuture<'_, AgentResult<Vec<ConversationRecord>>>;
    /// Exchanges whose message or reply contains `text` (case-insensitive), newest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn search(
        &self,
        text: String,
        limit: usize,
    ) -> StoreFuture<'_, AgentResult<Vec<ConversationRecord>>>;
    /// Aggregates over the `days` preceding `now`.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn summary(&self, days: u32, now: DateTime<Utc>) -> StoreFuture<'_, AgentResult<AnalyticsSummary>>;
    /// Most frequent user messages.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn popular_queries(&self, limit: usize) -> StoreFuture<'_, AgentResult<Vec<PopularQuery>>>;
    /// Delete rows created before `cutoff`.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn purge_before(&self, cutoff: DateTime<Utc>) -> StoreFuture<'_, AgentResult<PurgeReport>>;
    /// Write a consistent copy of the database to `path`.
    ///
    /// # Errors
    /// Returns an error if the backup cannot be written.
    fn backup(&self, path: PathBuf) -> StoreFuture<'_, AgentResult<()>>;
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS conversations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL,
        user_id TEXT,
        user_message TEXT NOT NULL,
        ai_response TEXT NOT NULL,
        sources TEXT,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_conversations_session_ts
        ON conversations (session_id, created_at);
    CREATE TABLE IF NOT EXISTS analytics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        event_type TEXT NOT NULL,
        session_id TEXT,
        user_id TEXT,
        data TEXT,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_analytics_ts ON analytics (created_at);
    CREATE TABLE IF NOT EXISTS knowledge_base_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        action TEXT NOT NULL,
        document_url TEXT,
        document_title TEXT,
        status TEXT,
        created_at INTEGER NOT NULL
    );";

const CONVERSATION_COLUMNS: &str =
    "id, session_id, user_id, user_message, ai_response, sources, created_at";

type ConversationRow = (i64, String, Option<String>, String, String, Option<String>, i64);

/// `SQLite` implementation of the conversation log.
pub struct SqliteConversationLog {
    conn: Connection,
}

impl SqliteConversationLog {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(path: &Path) -> AgentResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let conn = Connection::open(path).await?;
        Self::init(conn).await
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub async fn open_in_memory() -> AgentResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> AgentResult<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    async fn query_conversations(
        &self,
        sql: String,
        text: Option<String>,
        session: Option<String>,
        limit: usize,
    ) -> AgentResult<Vec<ConversationRecord>> {
        let limit = to_i64(limit)?;
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<ConversationRow> {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                };
                let rows = match (text, session) {
                    (Some(text), _) => stmt
                        .query_map(rusqlite::params![text, limit], map_row)?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?,
                    (None, Some(session)) => stmt
                        .query_map(rusqlite::params![session, limit], map_row)?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?,
                    (None, None) => stmt
                        .query_map(rusqlite::params![limit], map_row)?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?,
                };
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(record_from_row).collect()
    }
}

impl ConversationLog for SqliteConversationLog {
    fn append_exchange(&self, exchange: Exchange) -> StoreFuture<'_, AgentResult<()>> {
        Box::pin(async move {
            let sources = if exchange.sources.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&exchange.sources)?)
            };
            self.conn
                .call(move |conn| {
                    conn.execute(
                        "INSERT INTO conversations
                        (session_id, user_id, user_message, ai_response, sources, created_at)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        rusqlite::params![
                            exchange.session_id.into_inner(),
                            exchange.user_id.map(UserId::into_inner),
                            exchange.user_message,
                            exchange.ai_response,
                            sources,
                            exchange.created_at.timestamp_millis()
                        ],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }

    fn append_event(&self, event: AnalyticsEvent) -> StoreFuture<'_, AgentResult<()>> {
        Box::pin(async move {
            let data = event.data.as_ref().map(serde_json::to_string).transpose()?;
            self.conn
                .call(move |conn| {
                    conn.execute(
                        "INSERT INTO analytics (event_type, session_id, user_id, data, created_at)
                        VALUES (?1, ?2, ?3, ?4, ?5)",
                        rusqlite::params![
                            event.event_type,
                            event.session_id.map(SessionId::into_inner),
                            event.user_id.map(UserId::into_inner),
                            data,
                            event.created_at.timestamp_millis()
                        ],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }

    fn append_corpus_action(&self, action: CorpusAction) -> StoreFuture<'_, AgentResult<()>> {
        Box::pin(async move {
            self.conn
                .call(move |conn| {
                    conn.execute(
                        "INSERT INTO knowledge_base_logs
                        (action, document_url, document_title, status, created_at)
                        VALUES (?1, ?2, ?3, ?4, ?5)",
                        rusqlite::params![
                            action.action,
                            action.document_url,
                            action.document_title,
                            action.status,
                            action.created_at.timestamp_millis()
                        ],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }

    fn session_history(
        &self,
        session_id: SessionId,
        limit: usize,
    ) -> StoreFuture<'_, AgentResult<Vec<ConversationRecord>>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE session_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2"
            );
            self.query_conversations(sql, None, Some(session_id.into_inner()), limit)
                .await
        })
    }

    fn search(
        &self,
        text: String,
        limit: usize,
    ) -> StoreFuture<'_, AgentResult<Vec<ConversationRecord>>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE instr(lower(user_message), lower(?1)) > 0
                    OR instr(lower(ai_response), lower(?1)) > 0
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2"
            );
            self.query_conversations(sql, Some(text), None, limit).await
        })
    }

    fn summary(&self, days: u32, now: DateTime<Utc>) -> StoreFuture<'_, AgentResult<AnalyticsSummary>> {
        Box::pin(async move {
            let since = days_before(now, days).timestamp_millis();
            let (total, users, events) = self
                .conn
                .call(move |conn| {
                    let total: i64 = conn.query_row(
                        "SELECT COUNT(*) FROM conversations WHERE created_at >= ?1",
                        rusqlite::params![since],
                        |row| row.get(0),
                    )?;
                    let users: i64 = conn.query_row(
                        "SELECT COUNT(DISTINCT user_id) FROM conversations
                         WHERE user_id IS NOT NULL AND created_at >= ?1",
                        rusqlite::params![since],
                        |row| row.get(0),
                    )?;
                    let mut stmt = conn.prepare(
                        "SELECT event_type, COUNT(*) FROM analytics
                         WHERE created_at >= ?1
                         GROUP BY event_type",
                    )?;
                    let events = stmt
                        .query_map(rusqlite::params![since], |row| {
                            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok((total, users, events))
                })
                .await?;

            let event_counts: BTreeMap<String, u64> = events
                .into_iter()
                .map(|(event, count)| (event, to_u64(count)))
                .collect();
            Ok(AnalyticsSummary {
                period_days: days,
                total_conversations: to_u64(total),
                unique_users: to_u64(users),
                event_counts,
            })
        })
    }

    fn popular_queries(&self, limit: usize) -> StoreFuture<'_, AgentResult<Vec<PopularQuery>>> {
        Box::pin(async move {
            let limit = to_i64(limit)?;
            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(
                        "SELECT user_message, COUNT(*) AS count
                         FROM conversations
                         GROUP BY user_message
                         ORDER BY count DESC, MAX(created_at) DESC
                         LIMIT ?1",
                    )?;
                    let rows = stmt
                        .query_map(rusqlite::params![limit], |row| {
                            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;
            Ok(rows
                .into_iter()
                .map(|(query, count)| PopularQuery {
                    query,
                    count: to_u64(count),
                })
                .collect())
        })
    }

    fn purge_before(&self, cutoff: DateTime<Utc>) -> StoreFuture<'_, AgentResult<PurgeReport>> {
        Box::pin(async move {
            let cutoff = cutoff.timestamp_millis();
            let report = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    let conversations =
                        tx.execute("DELETE FROM conversations WHERE created_at < ?1", [cutoff])?;
                    let analytics =
                        tx.execute("DELETE FROM analytics WHERE created_at < ?1", [cutoff])?;
                    let corpus_actions = tx.execute(
                        "DELETE FROM knowledge_base_logs WHERE created_at < ?1",
                        [cutoff],
                    )?;
                    tx.commit()?;
                    Ok(PurgeReport {
                        conversations,
                        analytics,
                        corpus_actions,
                    })
                })
                .await?;
            Ok(report)
        })
    }

    fn backup(&self, path: PathBuf) -> StoreFuture<'_, AgentResult<()>> {
        Box::pin(async move {
            let target = path
                .to_str()
                .ok_or_else(|| AgentError::InvalidRequest("backup path is not UTF-8".to_string()))?
                .to_string();
            self.conn
                .call(move |conn| {
                    conn.execute("VACUUM INTO ?1", [target])?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }
}

fn record_from_row(row: ConversationRow) -> AgentResult<ConversationRecord> {
    let (id, session_id, user_id, user_message, ai_response, sources, created_at) = row;
    let created_at = Utc
        .timestamp_millis_opt(created_at)
        .single()
        .ok_or_else(|| AgentError::MalformedResponse("invalid timestamp".to_string()))?;
    let sources = match sources {
        Some(raw) => serde_json::from_str(&raw)?,
        None => Vec::new(),
    };
    Ok(ConversationRecord {
        id,
        exchange: Exchange {
            session_id: SessionId::new(session_id),
            user_id: user_id.map(UserId::new),
            user_message,
            ai_response,
            sources,
            created_at,
        },
    })
}

fn to_i64(value: usize) -> AgentResult<i64> {
    i64::try_from(value).map_err(|_| AgentError::InvalidRequest("limit exceeds i64".to_string()))
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::corpus::document::SourceRef;

    async fn log() -> SqliteConversationLog {
        match SqliteConversationLog::open_in_memory().await {
            Ok(log) => log,
            Err(err) => panic!("open: {err}"),
        }
    }

    fn exchange(session: &str, user: Option<&str>, message: &str, at: DateTime<Utc>) -> Exchange {
        Exchange {
            session_id: SessionId::new(session),
            user_id: user.map(UserId::new),
            user_message: message.to_string(),
            ai_response: format!("reply to {message}"),
            sources: vec![SourceRef {
                title: "BMW S1000 RR".to_string(),
                url: "https://bigbikeblitz.com/products/bmw-s1000-rr".to_string(),
            }],
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_session_history_newest_first_with_sources() {
        let log = log().await;
        let now = Utc::now();
        for (i, msg) in ["first", "second", "third"].iter().enumerate() {
            let at = now + Duration::seconds(i64::try_from(i).unwrap_or(0));
            assert!(log.append_exchange(exchange("s1", None, msg, at)).await.is_ok());
        }
        assert!(log.append_exchange(exchange("s2", None, "other", now)).await.is_ok());

        let Ok(history) = log.session_history(SessionId::new("s1"), 2).await else {
            panic!("history failed");
        };
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].exchange.user_message, "third");
        assert_eq!(history[1].exchange.user_message, "second");
        assert_eq!(history[0].exchange.sources.len(), 1);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_substring() {
        let log = log().await;
        let now = Utc::now();
        let _ = log.append_exchange(exchange("s1", None, "Price of the R1?", now)).await;
        let _ = log.append_exchange(exchange("s1", None, "Warranty 100%?", now)).await;

        let hits = log.search("r1".to_string(), 10).await.unwrap_or_default();
        assert_eq!(hits.len(), 1);
        let literal = log.search("100%".to_string(), 10).await.unwrap_or_default();
        assert_eq!(literal.len(), 1);
        assert!(log.search("zzz".to_string(), 10).await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_summary_counts_window() {
        let log = log().await;
        let now = Utc::now();
        let _ = log.append_exchange(exchange("s1", Some("u1"), "a", now)).await;
        let _ = log.append_exchange(exchange("s2", Some("u2"), "b", now)).await;
        let _ = log.append_exchange(exchange("s3", Some("u3"), "c", now - Duration::days(10))).await;
        let _ = log.append_event(AnalyticsEvent::new("chat_message", None)).await;
        let _ = log.append_event(AnalyticsEvent::new("chat_message", None)).await;
        let _ = log.append_event(AnalyticsEvent::new("session_connected", None)).await;

        let Ok(summary) = log.summary(7, now).await else {
            panic!("summary failed");
        };
        assert_eq!(summary.period_days, 7);
        assert_eq!(summary.total_conversations, 2);
        assert_eq!(summary.unique_users, 2);
        assert_eq!(summary.event_counts.get("chat_message"), Some(&2));
        assert_eq!(summary.event_counts.get("session_connected"), Some(&1));
    }

    #[tokio::test]
    async fn test_summary_with_unbounded_window_counts_everything() {
        let log = log().await;
        let now = Utc::now();
        let _ = log.append_exchange(exchange("s1", Some("u1"), "a", now - Duration::days(900))).await;
        let _ = log.append_exchange(exchange("s2", Some("u2"), "b", now)).await;

        let Ok(summary) = log.summary(u32::MAX, now).await else {
            panic!("summary failed");
        };
        assert_eq!(summary.period_days, u32::MAX);
        assert_eq!(summary.total_conversations, 2);
        assert_eq!(summary.unique_users, 2);
    }

    #[tokio::test]
    async fn test_popular_queries() {
        let log = log().await;
        let now = Utc::now();
        for _ in 0..3 {
            let _ = log.append_exchange(exchange("s1", None, "financing?", now)).await;
        }
        let _ = log.append_exchange(exchange("s1", None, "hello", now)).await;

        let popular = log.popular_queries(1).await.unwrap_or_default();
        assert_eq!(
            popular,
            vec![PopularQuery {
                query: "financing?".to_string(),
                count: 3
            }]
        );
    }

    #[tokio::test]
    async fn test_purge_before_cutoff() {
        let log = log().await;
        let now = Utc::now();
        let _ = log.append_exchange(exchange("s1", None, "old", now - Duration::days(40))).await;
        let _ = log.append_exchange(exchange("s1", None, "new", now)).await;
        let _ = log
            .append_corpus_action(CorpusAction::new("added", None, None, "success"))
            .await;

        let Ok(report) = log.purge_before(now - Duration::days(30)).await else {
            panic!("purge failed");
        };
        assert_eq!(report.conversations, 1);
        assert_eq!(report.corpus_actions, 0);
        let remaining = log.session_history(SessionId::new("s1"), 10).await.unwrap_or_default();
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn test_backup_writes_file() {
        let log = log().await;
        let _ = log.append_exchange(exchange("s1", None, "hello", Utc::now())).await;
        let path = std::env::temp_dir().join(format!("blitz-backup-{}.db", uuid::Uuid::new_v4()));

        assert!(log.backup(path.clone()).await.is_ok());
        assert!(path.exists());
        let _ = std::fs::remove_file(&path);
    }
}
