//! Records persisted by the conversation log.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::core::ids::{SessionId, UserId};
use crate::corpus::document::SourceRef;

/// One user message and the reply it received.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    /// Session identifier.
    pub session_id: SessionId,
    /// Owning user, when known.
    pub user_id: Option<UserId>,
    /// Customer message.
    pub user_message: String,
    /// Assistant reply.
    pub ai_response: String,
    /// Documents cited by the reply.
    pub sources: Vec<SourceRef>,
    /// Time of the exchange.
    pub created_at: DateTime<Utc>,
}

/// A stored exchange.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConversationRecord {
    /// Row id.
    pub id: i64,
    /// Stored exchange.
    #[serde(flatten)]
    pub exchange: Exchange,
}

/// Coarse lifecycle or usage event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    /// Event name, e.g. `chat_message`.
    pub event_type: String,
    /// Related session.
    pub session_id: Option<SessionId>,
    /// Related user.
    pub user_id: Option<UserId>,
    /// Free-form payload.
    pub data: Option<serde_json::Value>,
    /// Time of the event.
    pub created_at: DateTime<Utc>,
}

impl AnalyticsEvent {
    /// Build an event stamped with the current time.
    #[must_use]
    pub fn new(event_type: impl Into<String>, session_id: Option<SessionId>) -> Self {
        Self {
            event_type: event_type.into(),
            session_id,
            user_id: None,
            data: None,
            created_at: Utc::now(),
        }
    }

    /// Attach a user.
    #[must_use]
    pub fn with_user(mut self, user_id: Option<UserId>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Outcome of a corpus ingestion step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusAction {
    /// Action name, e.g. `added` or `scrape`.
    pub action: String,
    /// Affected document URL.
    pub document_url: Option<String>,
    /// Affected document title.
    pub document_title: Option<String>,
    /// `success` or an error description.
    pub status: String,
    /// Time of the action.
    pub created_at: DateTime<Utc>,
}

impl CorpusAction {
    /// Build an action stamped with the current time.
    #[must_use]
    pub fn new(
        action: impl Into<String>,
        document_url: Option<String>,
        document_title: Option<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            document_url,
            document_title,
            status: status.into(),
            created_at: Utc::now(),
        }
    }
}

/// Aggregates over a trailing window.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AnalyticsSummary {
    /// Window length in days.
    pub period_days: u32,
    /// Exchanges in the window.
    pub total_conversations: u64,
    /// Distinct known users in the window.
    pub unique_users: u64,
    /// Analytics events by type in the window.
    pub event_counts: BTreeMap<String, u64>,
}

/// A frequently asked message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PopularQuery {
    /// Message text.
    pub query: String,
    /// Number of times asked.
    pub count: u64,
}

/// Rows removed by a retention purge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    /// Deleted exchanges.
    pub conversations: usize,
    /// Deleted analytics events.
    pub analytics: usize,
    /// Deleted corpus actions.
    pub corpus_actions: usize,
}

impl PurgeReport {
    /// Total rows deleted.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.conversations + self.analytics + self.corpus_actions
    }
}

/// `now` moved back by `days`, clamped to the earliest representable instant.
#[must_use]
pub fn days_before(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    TimeDelta::try_days(i64::from(days))
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_days_before_clamps_out_of_range_windows() {
        let now = Utc::now();
        assert_eq!(days_before(now, 3), now - Duration::days(3));
        assert_eq!(days_before(now, u32::MAX), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_purge_report_total() {
        let report = PurgeReport {
            conversations: 2,
            analytics: 3,
            corpus_actions: 1,
        };
        assert_eq!(report.total(), 6);
    }
}
