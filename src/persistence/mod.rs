//! Thin persistence adapter: history/feedback/pattern/activity writes over a
//! small internal connection pool.
//!
//! Grounded on `src/agent/memory/memory_db.rs`'s `rusqlite::Connection` +
//! WAL pragma setup, adapted from a synchronous-connection-per-call style
//! into a pool of connections bridged into the async runtime via
//! `tokio::task::spawn_blocking` — rusqlite has no async API, so this is
//! the idiomatic bridge the corpus uses wherever a sync DB crate meets an
//! async executor.

mod pool;
mod sqlite;

pub use pool::ConnectionPool;
pub use sqlite::SqliteHistoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::PromptsmithResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub request_id: String,
    pub original_text: String,
    pub enhanced_text: String,
    pub intent: Option<String>,
    pub techniques_applied: Vec<String>,
    pub generation_time_ms: u64,
    pub confidence: f64,
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackUpdate {
    pub request_id: String,
    pub rating: i32,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentPattern {
    pub pattern: String,
    pub intent: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserActivity {
    pub user_id: String,
    pub action: String,
    pub occurred_at_unix: i64,
}

/// The four operations spec §6 names; schema beyond these fields is opaque
/// to the rest of the core.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn save_history(&self, record: HistoryRecord) -> PromptsmithResult<()>;
    async fn update_feedback(&self, update: FeedbackUpdate) -> PromptsmithResult<()>;
    async fn save_intent_pattern(&self, pattern: IntentPattern) -> PromptsmithResult<()>;
    async fn record_user_activity(&self, activity: UserActivity) -> PromptsmithResult<()>;
}
