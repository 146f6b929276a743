//! Durable conversation log and retention.

pub mod conversation_log;
pub mod logger;
pub mod records;
pub mod retention;

pub use conversation_log::{ConversationLog, SqliteConversationLog, StoreFuture};
pub use logger::ConversationLogger;
pub use records::{
    AnalyticsEvent, AnalyticsSummary, ConversationRecord, CorpusAction, Exchange, PopularQuery,
    PurgeReport, days_before,
};
pub use retention::{RetentionSweeper, SweepStats};
