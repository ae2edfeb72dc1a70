//! Typed operations over an open collection. Functions take the
//! [`CollectionStore`](crate::collection::CollectionStore) of the current
//! lease; multi-statement writes run inside `with_txn`.

pub mod cards;
pub mod decks;
pub mod queue;

use crate::collection::blobs::{ColBlobs, ColConf, DeckConfEntry, DeckEntry, ModelEntry};
use crate::{Error, LibraryError};
use sqlx::{Sqlite, SqliteConnection};
use std::collections::HashMap;

/// Tables with timestamp-shaped primary keys.
#[derive(Clone, Copy, Debug)]
pub(crate) enum IdTable {
    Notes,
    Cards,
    Revlog,
}

impl IdTable {
    fn max_id_sql(self) -> &'static str {
        match self {
            IdTable::Notes => "SELECT MAX(id) FROM notes",
            IdTable::Cards => "SELECT MAX(id) FROM cards",
            IdTable::Revlog => "SELECT MAX(id) FROM revlog",
        }
    }
}

/// Next id for `table`: the current time, bumped past the largest existing id
/// so that several rows created within one millisecond stay distinct.
pub(crate) async fn allocate_id(
    conn: &mut SqliteConnection,
    table: IdTable,
    now_ms: i64,
) -> Result<i64, Error> {
    let (max_id,): (Option<i64>,) = sqlx::query_as(table.max_id_sql())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| Error::Sqlx { source: e })?;
    Ok(now_ms.max(max_id.unwrap_or(0) + 1))
}

pub(crate) fn integrity(description: impl Into<String>) -> Error {
    Error::Library(LibraryError::Integrity(description.into()))
}

/// Decodes the four JSON blobs of the single `col` row. A blob that fails to
/// parse means the file is corrupt; the caller must treat this as fatal for
/// the session.
pub async fn load_col<'e, E>(executor: E) -> Result<ColBlobs, Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let (conf, decks, dconf, models): (String, String, String, String) =
        sqlx::query_as("SELECT conf, decks, dconf, models FROM col WHERE id = 1")
            .fetch_one(executor)
            .await
            .map_err(|e| Error::Sqlx { source: e })?;
    let conf: ColConf =
        serde_json::from_str(&conf).map_err(|e| integrity(format!("col.conf: {}", e)))?;
    let decks: HashMap<String, DeckEntry> =
        serde_json::from_str(&decks).map_err(|e| integrity(format!("col.decks: {}", e)))?;
    let dconf: HashMap<String, DeckConfEntry> =
        serde_json::from_str(&dconf).map_err(|e| integrity(format!("col.dconf: {}", e)))?;
    let models: HashMap<String, ModelEntry> =
        serde_json::from_str(&models).map_err(|e| integrity(format!("col.models: {}", e)))?;
    Ok(ColBlobs {
        conf,
        decks,
        dconf,
        models,
    })
}

pub(crate) async fn save_decks<'e, E>(
    executor: E,
    decks: &HashMap<String, DeckEntry>,
    now_ms: i64,
) -> Result<(), Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let blob = serde_json::to_string(decks)
        .map_err(|e| integrity(format!("encoding col.decks: {}", e)))?;
    sqlx::query("UPDATE col SET decks = ?, mod = ? WHERE id = 1")
        .bind(blob)
        .bind(now_ms)
        .execute(executor)
        .await
        .map_err(|e| Error::Sqlx { source: e })?;
    Ok(())
}

pub(crate) async fn save_conf<'e, E>(
    executor: E,
    conf: &ColConf,
    now_ms: i64,
) -> Result<(), Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let blob =
        serde_json::to_string(conf).map_err(|e| integrity(format!("encoding col.conf: {}", e)))?;
    sqlx::query("UPDATE col SET conf = ?, mod = ? WHERE id = 1")
        .bind(blob)
        .bind(now_ms)
        .execute(executor)
        .await
        .map_err(|e| Error::Sqlx { source: e })?;
    Ok(())
}

/// Bumps `col.mod` for writes that do not rewrite any blob.
pub(crate) async fn touch_col<'e, E>(executor: E, now_ms: i64) -> Result<(), Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE col SET mod = ? WHERE id = 1")
        .bind(now_ms)
        .execute(executor)
        .await
        .map_err(|e| Error::Sqlx { source: e })?;
    Ok(())
}
