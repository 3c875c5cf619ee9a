use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::AppError;

/// One immutable entry in the append-only event log. Ordering is by `id`,
/// which the store assigns monotonically on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub id: i64,
    pub user: String,
    #[sqlx(rename = "wasLogin")]
    pub was_login: bool,
    pub time: String,
    pub date: String,
}

/// Durable store for the roster and the event log.
///
/// All mutations go through [`Store::begin_write`], which serializes writers
/// behind a single async mutex. Reads run straight on the pool and never
/// touch the write lock; with WAL journaling they observe either the pre- or
/// post-write state, never a torn row.
pub struct Store {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

/// Exclusive write access: holds the global write lock and an open
/// transaction. Dropping the handle without [`WriteHandle::commit`] rolls the
/// transaction back and releases the lock, so no error path can wedge
/// subsequent writers.
pub struct WriteHandle {
    tx: Transaction<'static, Sqlite>,
    _write_guard: OwnedMutexGuard<()>,
}

impl Store {
    /// Open (or create) the store and ensure the schema exists. Idempotent
    /// across restarts; fails fast if the file is locked or corrupt.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (\
             id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT, \
             name TEXT NOT NULL)",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS log (\
             id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT, \
             user TEXT NOT NULL, \
             wasLogin BOOLEAN NOT NULL, \
             time TEXT NOT NULL, \
             date TEXT NOT NULL)",
        )
        .execute(&pool)
        .await?;

        Ok(Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Acquire exclusive write access. Blocks until every earlier writer has
    /// committed or been dropped.
    pub async fn begin_write(&self) -> Result<WriteHandle, AppError> {
        let guard = self.write_lock.clone().lock_owned().await;
        let tx = self.pool.begin().await?;
        Ok(WriteHandle {
            tx,
            _write_guard: guard,
        })
    }

    pub async fn all_users(&self) -> Result<Vec<String>, AppError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM users ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    pub async fn all_logs(&self) -> Result<Vec<LogEvent>, AppError> {
        let logs = sqlx::query_as::<_, LogEvent>(
            "SELECT id, user, wasLogin, time, date FROM log ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }

    pub async fn logs_for_user(&self, name: &str) -> Result<Vec<LogEvent>, AppError> {
        let logs = sqlx::query_as::<_, LogEvent>(
            "SELECT id, user, wasLogin, time, date FROM log WHERE user = ? ORDER BY id ASC",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }
}

impl WriteHandle {
    pub async fn insert_user(&mut self, name: &str) -> Result<(), AppError> {
        sqlx::query("INSERT INTO users (name) VALUES (?)")
            .bind(name)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    /// Delete a roster row, returning how many rows matched.
    pub async fn delete_user(&mut self, name: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM users WHERE name = ?")
            .bind(name)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn user_exists(&mut self, name: &str) -> Result<bool, AppError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.is_some())
    }

    /// Prior events for a user, read under the write lock so a toggle
    /// decision cannot be invalidated by a concurrent writer.
    pub async fn logs_for_user(&mut self, name: &str) -> Result<Vec<LogEvent>, AppError> {
        let logs = sqlx::query_as::<_, LogEvent>(
            "SELECT id, user, wasLogin, time, date FROM log WHERE user = ? ORDER BY id ASC",
        )
        .bind(name)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(logs)
    }

    pub async fn insert_log_event(
        &mut self,
        user: &str,
        was_login: bool,
        time: &str,
        date: &str,
    ) -> Result<LogEvent, AppError> {
        let result = sqlx::query("INSERT INTO log (user, wasLogin, time, date) VALUES (?, ?, ?, ?)")
            .bind(user)
            .bind(was_login)
            .bind(time)
            .bind(date)
            .execute(&mut *self.tx)
            .await?;
        Ok(LogEvent {
            id: result.last_insert_rowid(),
            user: user.to_string(),
            was_login,
            time: time.to_string(),
            date: date.to_string(),
        })
    }

    /// Persist all buffered changes and release the write lock.
    pub async fn commit(self) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }
}
