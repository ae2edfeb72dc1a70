//! Owns the SQLite handle of one user's collection. All access to a
//! collection file in the process goes through a `CollectionStore` held by the
//! session registry; nothing else opens the file.

use crate::context::RequestContext;
use crate::{CollectionErrorKind, Error, LibraryError, SessionErrorKind};
use futures::future::BoxFuture;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::SqliteConnection;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Copy, Debug)]
pub struct StoreOptions {
    /// Attempts for the SQLITE_BUSY backoff loop (10 ms doubling per retry).
    pub busy_retry_attempts: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_retry_attempts: 5,
        }
    }
}

#[derive(Debug)]
pub struct CollectionStore {
    pool: SqlitePool,
    path: PathBuf,
    options: StoreOptions,
}

impl CollectionStore {
    /// Opens an existing collection with WAL journaling and NORMAL
    /// synchronous mode. The pool holds a single connection; cross-request
    /// serialization is the registry's job.
    pub async fn open(path: &Path, options: StoreOptions) -> Result<Self, Error> {
        if !path.exists() {
            return Err(Error::Library(LibraryError::Collection(
                CollectionErrorKind::Missing,
            )));
        }
        let connect_options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(false)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await
            .map_err(|e| {
                if is_busy_error(&e) {
                    Error::Library(LibraryError::Session(SessionErrorKind::Busy))
                } else {
                    Error::Library(LibraryError::Session(SessionErrorKind::OpenFailed(
                        e.to_string(),
                    )))
                }
            })?;
        Ok(Self {
            pool,
            path: path.to_path_buf(),
            options,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `f` inside `BEGIN IMMEDIATE` … `COMMIT`. Any error rolls the
    /// transaction back and surfaces unchanged. The write lock acquisition is
    /// retried on SQLITE_BUSY.
    pub async fn with_txn<T, F>(&self, ctx: &RequestContext, f: F) -> Result<T, Error>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, Error>>,
    {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| Error::Sqlx { source: e })?;
        self.execute_with_retry(ctx, &mut conn, "BEGIN IMMEDIATE").await?;
        match f(&mut conn).await {
            Ok(value) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| Error::Sqlx { source: e })?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                    log::warn!(
                        "rollback failed for {}: {}",
                        self.path.display(),
                        rollback_err
                    );
                }
                Err(err)
            }
        }
    }

    async fn execute_with_retry(
        &self,
        ctx: &RequestContext,
        conn: &mut SqliteConnection,
        sql: &str,
    ) -> Result<(), Error> {
        let attempts = self.options.busy_retry_attempts.max(1);
        for attempt in 0..attempts {
            match sqlx::query(sql).execute(&mut *conn).await {
                Ok(_) => return Ok(()),
                Err(e) if is_busy_error(&e) => {
                    if attempt + 1 == attempts || ctx.expired() {
                        return Err(Error::Library(LibraryError::Session(
                            SessionErrorKind::Busy,
                        )));
                    }
                    tokio::time::sleep(Duration::from_millis(10 << attempt)).await;
                }
                Err(e) => return Err(Error::Sqlx { source: e }),
            }
        }
        Err(Error::Library(LibraryError::Session(SessionErrorKind::Busy)))
    }

    /// Consistent online copy of the collection into `dst` (which must not
    /// exist yet). No lock beyond SQLite's own is held while the copy runs.
    pub async fn snapshot(&self, dst: &Path) -> Result<(), Error> {
        let dst_str = dst.to_string_lossy().into_owned();
        sqlx::query("VACUUM INTO ?")
            .bind(dst_str)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Sqlx { source: e })?;
        Ok(())
    }

    /// Moves all committed WAL frames into the main database file.
    pub async fn checkpoint(&self) -> Result<(), Error> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE);")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Sqlx { source: e })?;
        Ok(())
    }

    /// Checkpoints and releases the handle. Safe to call more than once.
    pub async fn close(&self) {
        if self.pool.is_closed() {
            return;
        }
        if let Err(e) = self.checkpoint().await {
            log::warn!("checkpoint on close failed for {}: {}", self.path.display(), e);
        }
        self.pool.close().await;
    }
}

/// SQLITE_BUSY and friends (LOCKED, BUSY_RECOVERY, BUSY_SNAPSHOT).
pub(crate) fn is_busy_error(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => {
            matches!(db.code().as_deref(), Some("5" | "6" | "261" | "517"))
                || db.message().contains("database is locked")
        }
        _ => false,
    }
}
