//! Creation of a fresh collection file: schema, the single `col` row, and the
//! starter deck every new user gets.

use super::blobs::initial_blobs;
use super::ddl::{COLLECTION_DDL, SCHEMA_VERSION};
use crate::clock::{Clock, start_of_day_utc};
use crate::model::DEFAULT_DECK_ID;
use crate::repo::cards::insert_note_with_card;
use crate::{CollectionErrorKind, Error, LibraryError, SessionErrorKind};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;

/// Every fresh collection is seeded with these front/back pairs so a new user
/// has something to review immediately.
pub const SAMPLE_NOTES: &[(&str, &str)] = &[
    ("Welcome! How do you reveal the answer?", "Flip the card."),
    (
        "What does \"Again\" do?",
        "Shows the card once more in about a minute.",
    ),
    (
        "What does \"Good\" do?",
        "Moves the card to its next learning step.",
    ),
    (
        "When does a card graduate?",
        "After its last learning step it becomes a review card.",
    ),
];

/// Creates the collection at `path` and seeds it. Refuses to touch a path
/// that already holds data.
pub async fn initialize(path: &Path, display_name: &str, clock: &dyn Clock) -> Result<(), Error> {
    if let Ok(metadata) = std::fs::metadata(path) {
        if metadata.len() > 0 {
            return Err(Error::Library(LibraryError::Collection(
                CollectionErrorKind::AlreadyInitialized,
            )));
        }
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::Io {
            description: format!("Failed to create {}.", parent.display()),
            source: e,
        })?;
    }

    let connect_options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            Error::Library(LibraryError::Session(SessionErrorKind::OpenFailed(
                e.to_string(),
            )))
        })?;

    let result = seed(&pool, display_name, clock).await;
    pool.close().await;
    if result.is_err() {
        // Leave no half-built file behind; registration retries from scratch.
        let _ = std::fs::remove_file(path);
    }
    result
}

async fn seed(pool: &SqlitePool, display_name: &str, clock: &dyn Clock) -> Result<(), Error> {
    let now_ms = clock.now_ms();
    let crt = start_of_day_utc(clock.now_utc());

    sqlx::raw_sql(COLLECTION_DDL)
        .execute(pool)
        .await
        .map_err(|e| Error::Sqlx { source: e })?;

    let mut blobs = initial_blobs(&format!("{}'s collection", display_name), now_ms / 1000);
    blobs.conf.next_pos = SAMPLE_NOTES.len() as i64 + 1;
    let conf = serde_json::to_string(&blobs.conf)
        .map_err(|e| Error::Library(LibraryError::Integrity(format!("encoding conf: {}", e))))?;
    let models = serde_json::to_string(&blobs.models)
        .map_err(|e| Error::Library(LibraryError::Integrity(format!("encoding models: {}", e))))?;
    let decks = serde_json::to_string(&blobs.decks)
        .map_err(|e| Error::Library(LibraryError::Integrity(format!("encoding decks: {}", e))))?;
    let dconf = serde_json::to_string(&blobs.dconf)
        .map_err(|e| Error::Library(LibraryError::Integrity(format!("encoding dconf: {}", e))))?;
    sqlx::query(
        "INSERT INTO col (id, crt, mod, scm, ver, dty, usn, ls, conf, models, decks, dconf, tags)
         VALUES (1, ?, ?, ?, ?, 0, 0, 0, ?, ?, ?, ?, '{}')",
    )
    .bind(crt)
    .bind(now_ms)
    .bind(now_ms)
    .bind(SCHEMA_VERSION)
    .bind(conf)
    .bind(models)
    .bind(decks)
    .bind(dconf)
    .execute(pool)
    .await
    .map_err(|e| Error::Sqlx { source: e })?;

    let mut conn = pool
        .acquire()
        .await
        .map_err(|e| Error::Sqlx { source: e })?;
    for (position, (front, back)) in SAMPLE_NOTES.iter().enumerate() {
        insert_note_with_card(
            &mut conn,
            now_ms,
            DEFAULT_DECK_ID,
            front,
            back,
            position as i64 + 1,
        )
        .await?;
    }
    Ok(())
}
