use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::params;

use crate::config::PersistenceConfig;
use crate::errors::{PromptsmithError, PromptsmithResult};

use super::pool::ConnectionPool;
use super::{FeedbackUpdate, HistoryRecord, HistoryStore, IntentPattern, UserActivity};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS enhancement_history (
    request_id TEXT PRIMARY KEY,
    original_text TEXT NOT NULL,
    enhanced_text TEXT NOT NULL,
    intent TEXT,
    techniques_applied TEXT NOT NULL,
    generation_time_ms INTEGER NOT NULL,
    confidence REAL NOT NULL,
    cached INTEGER NOT NULL,
    rating INTEGER,
    comment TEXT
);
CREATE TABLE IF NOT EXISTS intent_patterns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pattern TEXT NOT NULL,
    intent TEXT NOT NULL,
    confidence REAL NOT NULL
);
CREATE TABLE IF NOT EXISTS user_activity (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    action TEXT NOT NULL,
    occurred_at_unix INTEGER NOT NULL
);
";

/// `HistoryStore` over a pool of sqlite connections. Grounded on
/// `src/agent/memory/memory_db.rs`'s schema-on-open convention.
pub struct SqliteHistoryStore {
    pool: Arc<ConnectionPool>,
}

impl SqliteHistoryStore {
    pub fn open(config: &PersistenceConfig) -> PromptsmithResult<Self> {
        let pool = ConnectionPool::open(config)?;
        Ok(SqliteHistoryStore { pool })
    }

    /// Must run once after `open`, since schema creation is itself an async
    /// pooled operation.
    pub async fn migrate(&self) -> PromptsmithResult<()> {
        self.pool
            .with_connection(|conn| conn.execute_batch(SCHEMA))
            .await
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn save_history(&self, record: HistoryRecord) -> PromptsmithResult<()> {
        let techniques_json = serde_json::to_string(&record.techniques_applied)
            .map_err(|e| PromptsmithError::Internal(anyhow::anyhow!("cannot encode techniques: {e}")))?;
        self.pool
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO enhancement_history
                     (request_id, original_text, enhanced_text, intent, techniques_applied,
                      generation_time_ms, confidence, cached)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        record.request_id,
                        record.original_text,
                        record.enhanced_text,
                        record.intent,
                        techniques_json,
                        record.generation_time_ms,
                        record.confidence,
                        record.cached as i64,
                    ],
                )
                .map(|_| ())
            })
            .await
    }

    async fn update_feedback(&self, update: FeedbackUpdate) -> PromptsmithResult<()> {
        self.pool
            .with_connection(move |conn| {
                conn.execute(
                    "UPDATE enhancement_history SET rating = ?1, comment = ?2 WHERE request_id = ?3",
                    params![update.rating, update.comment, update.request_id],
                )
                .map(|_| ())
            })
            .await
    }

    async fn save_intent_pattern(&self, pattern: IntentPattern) -> PromptsmithResult<()> {
        self.pool
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT INTO intent_patterns (pattern, intent, confidence) VALUES (?1, ?2, ?3)",
                    params![pattern.pattern, pattern.intent, pattern.confidence],
                )
                .map(|_| ())
            })
            .await
    }

    async fn record_user_activity(&self, activity: UserActivity) -> PromptsmithResult<()> {
        self.pool
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT INTO user_activity (user_id, action, occurred_at_unix) VALUES (?1, ?2, ?3)",
                    params![activity.user_id, activity.action, activity.occurred_at_unix],
                )
                .map(|_| ())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteHistoryStore {
        let mut cfg = PersistenceConfig::default();
        cfg.database_path = ":memory:".to_string();
        let store = SqliteHistoryStore::open(&cfg).unwrap();
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    async fn save_and_update_feedback_roundtrip() {
        let store = store().await;
        store
            .save_history(HistoryRecord {
                request_id: "req-1".into(),
                original_text: "hi".into(),
                enhanced_text: "hi there".into(),
                intent: Some("conversation".into()),
                techniques_applied: vec!["role_play".into()],
                generation_time_ms: 12,
                confidence: 0.9,
                cached: false,
            })
            .await
            .unwrap();

        store
            .update_feedback(FeedbackUpdate {
                request_id: "req-1".into(),
                rating: 5,
                comment: Some("great".into()),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn save_intent_pattern_and_user_activity() {
        let store = store().await;
        store
            .save_intent_pattern(IntentPattern {
                pattern: "how do i".into(),
                intent: "question_answering".into(),
                confidence: 0.8,
            })
            .await
            .unwrap();
        store
            .record_user_activity(UserActivity {
                user_id: "u-1".into(),
                action: "enhance".into(),
                occurred_at_unix: 1_700_000_000,
            })
            .await
            .unwrap();
    }
}
