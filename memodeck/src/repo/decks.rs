//! Deck operations. Decks live inside the `col.decks` JSON blob, so most of
//! these rewrite the blob; card cascades additionally touch the row tables.

use super::{integrity, load_col, save_conf, save_decks};
use crate::collection::CollectionStore;
use crate::collection::blobs::DeckEntry;
use crate::context::RequestContext;
use crate::model::{
    CardId, CardQueue, CardType, Deck, DeckCounts, DeckId, GRAVE_DECK, MATURE_IVL_DAYS, NoteId,
    DEFAULT_DECK_ID,
};
use crate::repo::cards::bury_in_grave;
use crate::{DeckErrorKind, Error, LibraryError};
use itertools::Itertools;

/// All decks, ascending by name.
pub async fn list_decks(store: &CollectionStore) -> Result<Vec<Deck>, Error> {
    let blobs = load_col(store.pool()).await?;
    let decks = blobs
        .decks
        .values()
        .map(|entry| Deck {
            id: entry.id,
            name: entry.name.clone(),
        })
        .sorted_by(|a, b| a.name.cmp(&b.name))
        .collect();
    Ok(decks)
}

fn name_taken(decks: &std::collections::HashMap<String, DeckEntry>, name: &str) -> bool {
    let lowered = name.to_lowercase();
    decks.values().any(|d| d.name.to_lowercase() == lowered)
}

fn next_deck_id(decks: &std::collections::HashMap<String, DeckEntry>, now_ms: i64) -> DeckId {
    decks
        .values()
        .map(|d| d.id)
        .max()
        .map_or(now_ms, |max| now_ms.max(max + 1))
}

pub async fn create_deck(
    store: &CollectionStore,
    ctx: &RequestContext,
    now_ms: i64,
    name: &str,
) -> Result<Deck, Error> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(Error::Library(LibraryError::Deck(DeckErrorKind::EmptyName)));
    }
    store
        .with_txn(ctx, |conn| {
            Box::pin(async move {
                let mut blobs = load_col(&mut *conn).await?;
                if name_taken(&blobs.decks, &name) {
                    return Err(Error::Library(LibraryError::Deck(DeckErrorKind::Duplicate)));
                }
                let id = next_deck_id(&blobs.decks, now_ms);
                blobs
                    .decks
                    .insert(id.to_string(), DeckEntry::new(id, &name, now_ms / 1000));
                save_decks(&mut *conn, &blobs.decks, now_ms).await?;
                Ok(Deck { id, name })
            })
        })
        .await
}

pub async fn rename_deck(
    store: &CollectionStore,
    ctx: &RequestContext,
    now_ms: i64,
    deck_id: DeckId,
    new_name: &str,
) -> Result<Deck, Error> {
    let new_name = new_name.trim().to_string();
    if new_name.is_empty() {
        return Err(Error::Library(LibraryError::Deck(DeckErrorKind::EmptyName)));
    }
    store
        .with_txn(ctx, |conn| {
            Box::pin(async move {
                let mut blobs = load_col(&mut *conn).await?;
                if !blobs.contains_deck(deck_id) {
                    return Err(Error::Library(LibraryError::Deck(DeckErrorKind::NotFound)));
                }
                // The check runs against every deck, the renamed one
                // included: changing only the casing of a name is a conflict.
                if name_taken(&blobs.decks, &new_name) {
                    return Err(Error::Library(LibraryError::Deck(DeckErrorKind::Duplicate)));
                }
                let entry = blobs
                    .decks
                    .get_mut(&deck_id.to_string())
                    .ok_or_else(|| integrity(format!("deck {} vanished mid-rename", deck_id)))?;
                entry.name = new_name.clone();
                entry.mtime_secs = now_ms / 1000;
                entry.usn = -1;
                save_decks(&mut *conn, &blobs.decks, now_ms).await?;
                Ok(Deck {
                    id: deck_id,
                    name: new_name,
                })
            })
        })
        .await
}

/// Removes a deck, its cards, and any notes orphaned by the cascade, writing
/// tombstones for all of them. Returns how many cards were deleted.
pub async fn delete_deck(
    store: &CollectionStore,
    ctx: &RequestContext,
    now_ms: i64,
    deck_id: DeckId,
) -> Result<u32, Error> {
    if deck_id == DEFAULT_DECK_ID {
        return Err(Error::Library(LibraryError::Deck(
            DeckErrorKind::DefaultProtected,
        )));
    }
    store
        .with_txn(ctx, |conn| {
            Box::pin(async move {
                let mut blobs = load_col(&mut *conn).await?;
                if blobs.decks.remove(&deck_id.to_string()).is_none() {
                    return Err(Error::Library(LibraryError::Deck(DeckErrorKind::NotFound)));
                }

                let card_ids: Vec<(CardId,)> =
                    sqlx::query_as("SELECT id FROM cards WHERE did = ?")
                        .bind(deck_id)
                        .fetch_all(&mut *conn)
                        .await
                        .map_err(|e| Error::Sqlx { source: e })?;
                for (card_id,) in &card_ids {
                    bury_in_grave(conn, crate::model::GRAVE_CARD, *card_id).await?;
                }
                sqlx::query("DELETE FROM cards WHERE did = ?")
                    .bind(deck_id)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| Error::Sqlx { source: e })?;

                let orphaned: Vec<(NoteId,)> = sqlx::query_as(
                    "SELECT n.id FROM notes n
                     WHERE NOT EXISTS (SELECT 1 FROM cards c WHERE c.nid = n.id)",
                )
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| Error::Sqlx { source: e })?;
                for (note_id,) in &orphaned {
                    bury_in_grave(conn, crate::model::GRAVE_NOTE, *note_id).await?;
                }
                sqlx::query(
                    "DELETE FROM notes
                     WHERE NOT EXISTS (SELECT 1 FROM cards c WHERE c.nid = notes.id)",
                )
                .execute(&mut *conn)
                .await
                .map_err(|e| Error::Sqlx { source: e })?;

                bury_in_grave(conn, GRAVE_DECK, deck_id).await?;
                if blobs.conf.cur_deck == deck_id {
                    blobs.conf.cur_deck = DEFAULT_DECK_ID;
                    save_conf(&mut *conn, &blobs.conf, now_ms).await?;
                }
                save_decks(&mut *conn, &blobs.decks, now_ms).await?;
                Ok(card_ids.len() as u32)
            })
        })
        .await
}

/// Makes `deck_id` the target for inserts and review. Re-applying the current
/// value is a no-op and leaves `col.mod` untouched.
pub async fn set_current_deck(
    store: &CollectionStore,
    ctx: &RequestContext,
    now_ms: i64,
    deck_id: DeckId,
) -> Result<(), Error> {
    let blobs = load_col(store.pool()).await?;
    if !blobs.contains_deck(deck_id) {
        return Err(Error::Library(LibraryError::Deck(DeckErrorKind::NotFound)));
    }
    if blobs.conf.cur_deck == deck_id {
        return Ok(());
    }
    store
        .with_txn(ctx, |conn| {
            Box::pin(async move {
                let mut blobs = load_col(&mut *conn).await?;
                if !blobs.contains_deck(deck_id) {
                    return Err(Error::Library(LibraryError::Deck(DeckErrorKind::NotFound)));
                }
                blobs.conf.cur_deck = deck_id;
                save_conf(&mut *conn, &blobs.conf, now_ms).await?;
                Ok(())
            })
        })
        .await
}

/// Bucket counts for one deck, keyed off `(type, queue, ivl)`.
pub async fn deck_stats(store: &CollectionStore, deck_id: DeckId) -> Result<DeckCounts, Error> {
    let blobs = load_col(store.pool()).await?;
    if !blobs.contains_deck(deck_id) {
        return Err(Error::Library(LibraryError::Deck(DeckErrorKind::NotFound)));
    }
    let rows: Vec<(CardType, CardQueue, i64)> =
        sqlx::query_as("SELECT type, queue, ivl FROM cards WHERE did = ?")
            .bind(deck_id)
            .fetch_all(store.pool())
            .await
            .map_err(|e| Error::Sqlx { source: e })?;
    let mut counts = DeckCounts::default();
    for (kind, queue, ivl) in rows {
        match queue {
            CardQueue::Suspended => counts.suspended += 1,
            CardQueue::UserBuried | CardQueue::SchedulerBuried => counts.buried += 1,
            _ => match kind {
                CardType::New => counts.new += 1,
                CardType::Learning => counts.learning += 1,
                CardType::Relearning => counts.relearning += 1,
                CardType::Review => {
                    if ivl < MATURE_IVL_DAYS {
                        counts.young += 1;
                    } else {
                        counts.mature += 1;
                    }
                }
            },
        }
    }
    Ok(counts)
}
