use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rusqlite::Connection;
use tokio::sync::Semaphore;

use crate::config::PersistenceConfig;
use crate::errors::{PromptsmithError, PromptsmithResult};

struct Idle {
    conn: Connection,
    last_used: Instant,
}

/// Bounded pool of `rusqlite::Connection`s. `max_connections` permits cap
/// concurrent checkouts; idle connections older than `max_inactive` are
/// closed and replaced on next acquire rather than reused, per spec §5's
/// idle-eviction requirement.
pub struct ConnectionPool {
    database_path: String,
    idle: Mutex<VecDeque<Idle>>,
    permits: Semaphore,
    max_inactive: Duration,
    acquire_timeout: Duration,
}

impl ConnectionPool {
    pub fn open(config: &PersistenceConfig) -> PromptsmithResult<Arc<Self>> {
        let mut idle = VecDeque::new();
        for _ in 0..config.min_connections {
            idle.push_back(Idle {
                conn: open_connection(&config.database_path)?,
                last_used: Instant::now(),
            });
        }
        Ok(Arc::new(ConnectionPool {
            database_path: config.database_path.clone(),
            idle: Mutex::new(idle),
            permits: Semaphore::new(config.max_connections as usize),
            max_inactive: Duration::from_secs(config.max_inactive_secs),
            acquire_timeout: config.acquire_timeout(),
        }))
    }

    /// Runs `f` against a pooled connection on a blocking thread, returning
    /// the connection to the pool afterward. Acquisition blocks
    /// cooperatively up to the configured deadline, then fails with
    /// `PoolExhausted`.
    pub async fn with_connection<F, T>(&self, f: F) -> PromptsmithResult<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = tokio::time::timeout(self.acquire_timeout, self.permits.acquire())
            .await
            .map_err(|_| PromptsmithError::PoolExhausted)?
            .expect("semaphore is never closed");

        let mut conn = self.take_or_open()?;
        let result = tokio::task::spawn_blocking(move || {
            let out = f(&conn);
            (conn, out)
        })
        .await
        .map_err(|e| PromptsmithError::Internal(anyhow::anyhow!("db task panicked: {e}")))?;

        conn = result.0;
        self.idle.lock().push_back(Idle { conn, last_used: Instant::now() });
        drop(permit);

        result.1.map_err(|e| PromptsmithError::Internal(anyhow::anyhow!("sqlite error: {e}")))
    }

    fn take_or_open(&self) -> PromptsmithResult<Connection> {
        let mut idle = self.idle.lock();
        while let Some(candidate) = idle.pop_front() {
            if candidate.last_used.elapsed() < self.max_inactive {
                return Ok(candidate.conn);
            }
        }
        drop(idle);
        open_connection(&self.database_path)
    }
}

fn open_connection(path: &str) -> PromptsmithResult<Connection> {
    let conn = Connection::open(path)
        .map_err(|e| PromptsmithError::Internal(anyhow::anyhow!("cannot open sqlite db: {e}")))?;
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         PRAGMA busy_timeout=5000;",
    )
    .map_err(|e| PromptsmithError::Internal(anyhow::anyhow!("cannot set sqlite pragmas: {e}")))?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PersistenceConfig {
        let mut c = PersistenceConfig::default();
        c.database_path = ":memory:".to_string();
        c.min_connections = 1;
        c.max_connections = 2;
        c
    }

    #[tokio::test]
    async fn with_connection_runs_query() {
        let pool = ConnectionPool::open(&config()).unwrap();
        let value: i64 = pool
            .with_connection(|conn| conn.query_row("SELECT 1", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn pool_exhausted_when_all_permits_held() {
        let mut cfg = config();
        cfg.max_connections = 1;
        cfg.acquire_timeout_secs = 0;
        let pool = ConnectionPool::open(&cfg).unwrap();

        let pool_clone = pool.clone();
        let hold = tokio::spawn(async move {
            pool_clone
                .with_connection(|_| {
                    std::thread::sleep(Duration::from_millis(200));
                    Ok(())
                })
                .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = pool.with_connection(|_| Ok(())).await.unwrap_err();
        assert_eq!(err.kind(), "PoolExhausted");
        hold.await.unwrap().unwrap();
    }
}
