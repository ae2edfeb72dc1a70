//! Note and card operations. Every note carries exactly the two Basic-model
//! fields, so a card and its parent note travel together through this module.

use super::{IdTable, allocate_id, integrity, load_col, touch_col};
use crate::collection::CollectionStore;
use crate::context::RequestContext;
use crate::model::{
    Card, CardId, CardQueue, DeckId, FIELD_SEPARATOR, GRAVE_CARD, GRAVE_NOTE, Note, NoteId,
    BASIC_MODEL_ID,
};
use crate::{CardErrorKind, DeckErrorKind, Error, LibraryError};
use sha1::{Digest, Sha1};
use sqlx::SqliteConnection;

/// First 4 bytes of the SHA-1 of the sort field, as an integer. Anki uses
/// this for duplicate detection; the value is contractual.
pub(crate) fn field_checksum(text: &str) -> i64 {
    let digest = Sha1::digest(text.as_bytes());
    i64::from(u32::from_be_bytes(digest[..4].try_into().unwrap()))
}

/// Note GUIDs are a random u64 in Anki's base-91 alphabet.
pub(crate) fn note_guid() -> String {
    anki_base91(rand::random())
}

fn anki_base91(mut n: u64) -> String {
    let table = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ\
0123456789!#$%&()*+,-./:;<=>?@[]^_`{|}~";
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(table[(n % table.len() as u64) as usize]);
        n /= table.len() as u64;
    }
    buf.iter().rev().map(|&b| b as char).collect()
}

fn validated_fields(front: &str, back: &str) -> Result<(String, String), Error> {
    let front = front.trim();
    let back = back.trim();
    if front.is_empty() || back.is_empty() {
        return Err(Error::Library(LibraryError::Card(CardErrorKind::EmptyField)));
    }
    Ok((front.to_string(), back.to_string()))
}

/// Inserts a note plus its single card. Shared between `add_card` and the
/// sample-deck seeding at collection creation.
pub(crate) async fn insert_note_with_card(
    conn: &mut SqliteConnection,
    now_ms: i64,
    deck_id: DeckId,
    front: &str,
    back: &str,
    due: i64,
) -> Result<(NoteId, CardId), Error> {
    let now_secs = now_ms / 1000;
    let note_id = allocate_id(conn, IdTable::Notes, now_ms).await?;
    let flds = format!("{}{}{}", front, FIELD_SEPARATOR, back);
    sqlx::query(
        "INSERT INTO notes (id, guid, mid, mod, usn, tags, flds, sfld, csum, flags, data)
         VALUES (?, ?, ?, ?, -1, '', ?, ?, ?, 0, '')",
    )
    .bind(note_id)
    .bind(note_guid())
    .bind(BASIC_MODEL_ID)
    .bind(now_secs)
    .bind(&flds)
    .bind(front)
    .bind(field_checksum(front))
    .execute(&mut *conn)
    .await
    .map_err(|e| Error::Sqlx { source: e })?;

    let card_id = allocate_id(conn, IdTable::Cards, now_ms).await?;
    sqlx::query(
        "INSERT INTO cards (id, nid, did, ord, mod, usn, type, queue, due, ivl,
                            factor, reps, lapses, left, odue, odid, flags, data)
         VALUES (?, ?, ?, 0, ?, -1, 0, 0, ?, 0, 0, 0, 0, 0, 0, 0, 0, '')",
    )
    .bind(card_id)
    .bind(note_id)
    .bind(deck_id)
    .bind(now_secs)
    .bind(due)
    .execute(&mut *conn)
    .await
    .map_err(|e| Error::Sqlx { source: e })?;
    Ok((note_id, card_id))
}

/// Creates a note/card pair in `deck_id`. The new card queues behind the
/// deck's existing new cards.
pub async fn add_card(
    store: &CollectionStore,
    ctx: &RequestContext,
    now_ms: i64,
    deck_id: DeckId,
    front: &str,
    back: &str,
) -> Result<(NoteId, CardId), Error> {
    let (front, back) = validated_fields(front, back)?;
    store
        .with_txn(ctx, |conn| {
            Box::pin(async move {
                let blobs = load_col(&mut *conn).await?;
                if !blobs.contains_deck(deck_id) {
                    return Err(Error::Library(LibraryError::Deck(DeckErrorKind::NotFound)));
                }
                let (max_due,): (Option<i64>,) =
                    sqlx::query_as("SELECT MAX(due) FROM cards WHERE did = ?")
                        .bind(deck_id)
                        .fetch_one(&mut *conn)
                        .await
                        .map_err(|e| Error::Sqlx { source: e })?;
                let due = max_due.unwrap_or(0) + 1;
                let ids =
                    insert_note_with_card(conn, now_ms, deck_id, &front, &back, due).await?;
                touch_col(&mut *conn, now_ms).await?;
                Ok(ids)
            })
        })
        .await
}

/// A card joined with its note content.
pub async fn get_card(store: &CollectionStore, card_id: CardId) -> Result<(Card, Note), Error> {
    let card: Option<Card> = sqlx::query_as("SELECT * FROM cards WHERE id = ?")
        .bind(card_id)
        .fetch_optional(store.pool())
        .await
        .map_err(|e| Error::Sqlx { source: e })?;
    let Some(card) = card else {
        return Err(Error::Library(LibraryError::Card(CardErrorKind::NotFound)));
    };
    let note: Option<Note> = sqlx::query_as("SELECT * FROM notes WHERE id = ?")
        .bind(card.nid)
        .fetch_optional(store.pool())
        .await
        .map_err(|e| Error::Sqlx { source: e })?;
    let Some(note) = note else {
        return Err(integrity(format!("card {} has no note {}", card.id, card.nid)));
    };
    Ok((card, note))
}

/// Rewrites the parent note's fields, re-deriving the sort field and
/// checksum.
pub async fn update_card_content(
    store: &CollectionStore,
    ctx: &RequestContext,
    now_ms: i64,
    card_id: CardId,
    front: &str,
    back: &str,
) -> Result<(), Error> {
    let (front, back) = validated_fields(front, back)?;
    store
        .with_txn(ctx, |conn| {
            Box::pin(async move {
                let nid: Option<(NoteId,)> =
                    sqlx::query_as("SELECT nid FROM cards WHERE id = ?")
                        .bind(card_id)
                        .fetch_optional(&mut *conn)
                        .await
                        .map_err(|e| Error::Sqlx { source: e })?;
                let Some((nid,)) = nid else {
                    return Err(Error::Library(LibraryError::Card(CardErrorKind::NotFound)));
                };
                let flds = format!("{}{}{}", front, FIELD_SEPARATOR, back);
                sqlx::query(
                    "UPDATE notes SET flds = ?, sfld = ?, csum = ?, mod = ?, usn = -1 WHERE id = ?",
                )
                .bind(&flds)
                .bind(&front)
                .bind(field_checksum(&front))
                .bind(now_ms / 1000)
                .bind(nid)
                .execute(&mut *conn)
                .await
                .map_err(|e| Error::Sqlx { source: e })?;
                touch_col(&mut *conn, now_ms).await?;
                Ok(())
            })
        })
        .await
}

/// Deletes a card, tombstoning it; a note left without cards goes with it.
pub async fn delete_card(
    store: &CollectionStore,
    ctx: &RequestContext,
    now_ms: i64,
    card_id: CardId,
) -> Result<(), Error> {
    store
        .with_txn(ctx, |conn| {
            Box::pin(async move {
                let nid: Option<(NoteId,)> =
                    sqlx::query_as("SELECT nid FROM cards WHERE id = ?")
                        .bind(card_id)
                        .fetch_optional(&mut *conn)
                        .await
                        .map_err(|e| Error::Sqlx { source: e })?;
                let Some((nid,)) = nid else {
                    return Err(Error::Library(LibraryError::Card(CardErrorKind::NotFound)));
                };
                bury_in_grave(conn, GRAVE_CARD, card_id).await?;
                sqlx::query("DELETE FROM cards WHERE id = ?")
                    .bind(card_id)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| Error::Sqlx { source: e })?;
                let (remaining,): (i64,) =
                    sqlx::query_as("SELECT COUNT(*) FROM cards WHERE nid = ?")
                        .bind(nid)
                        .fetch_one(&mut *conn)
                        .await
                        .map_err(|e| Error::Sqlx { source: e })?;
                if remaining == 0 {
                    bury_in_grave(conn, GRAVE_NOTE, nid).await?;
                    sqlx::query("DELETE FROM notes WHERE id = ?")
                        .bind(nid)
                        .execute(&mut *conn)
                        .await
                        .map_err(|e| Error::Sqlx { source: e })?;
                }
                touch_col(&mut *conn, now_ms).await?;
                Ok(())
            })
        })
        .await
}

pub(crate) async fn bury_in_grave(
    conn: &mut SqliteConnection,
    grave_type: i64,
    oid: i64,
) -> Result<(), Error> {
    sqlx::query("INSERT INTO graves (usn, oid, type) VALUES (-1, ?, ?)")
        .bind(oid)
        .bind(grave_type)
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::Sqlx { source: e })?;
    Ok(())
}

#[derive(Clone, Debug)]
pub struct CardListing {
    pub card_id: CardId,
    pub front: String,
    pub back: String,
    pub queue: CardQueue,
}

#[derive(Clone, Debug)]
pub struct DeckCardPage {
    pub total: i64,
    pub cards: Vec<CardListing>,
}

/// Cards of one deck, ordered by sort field, one page at a time.
pub async fn list_deck_cards(
    store: &CollectionStore,
    deck_id: DeckId,
    page: u32,
    per_page: u32,
) -> Result<DeckCardPage, Error> {
    let blobs = load_col(store.pool()).await?;
    if !blobs.contains_deck(deck_id) {
        return Err(Error::Library(LibraryError::Deck(DeckErrorKind::NotFound)));
    }
    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cards WHERE did = ?")
        .bind(deck_id)
        .fetch_one(store.pool())
        .await
        .map_err(|e| Error::Sqlx { source: e })?;
    let page = page.max(1);
    let per_page = per_page.clamp(1, 200);
    let offset = i64::from(page - 1) * i64::from(per_page);
    let rows: Vec<(CardId, String, CardQueue)> = sqlx::query_as(
        "SELECT c.id, n.flds, c.queue
         FROM cards c JOIN notes n ON n.id = c.nid
         WHERE c.did = ?
         ORDER BY n.sfld ASC, c.id ASC
         LIMIT ? OFFSET ?",
    )
    .bind(deck_id)
    .bind(i64::from(per_page))
    .bind(offset)
    .fetch_all(store.pool())
    .await
    .map_err(|e| Error::Sqlx { source: e })?;
    let cards = rows
        .into_iter()
        .map(|(card_id, flds, queue)| {
            let (front, back) = split_fields(&flds);
            CardListing {
                card_id,
                front,
                back,
                queue,
            }
        })
        .collect();
    Ok(DeckCardPage { total, cards })
}

/// Front/back halves of a `flds` blob.
pub fn split_fields(flds: &str) -> (String, String) {
    match flds.split_once(FIELD_SEPARATOR) {
        Some((front, back)) => (front.to_string(), back.to_string()),
        None => (flds.to_string(), String::new()),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::collection::{CollectionStore, StoreOptions, initialize};
    use crate::model::CardType;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    pub(crate) async fn open_seeded_collection() -> (TempDir, CollectionStore, ManualClock) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collection.anki2");
        let clock = ManualClock::new(1_700_000_000_000);
        initialize(&path, "tester", &clock).await.unwrap();
        let store = CollectionStore::open(&path, StoreOptions::default())
            .await
            .unwrap();
        (dir, store, clock)
    }

    #[test]
    fn base91_matches_anki_alphabet() {
        assert_eq!(anki_base91(0), "");
        assert_eq!(anki_base91(1), "b");
        assert_eq!(anki_base91(1_234_567_890), "saAKk");
        assert_eq!(anki_base91(u64::MAX), "Rj&Z5m[>Zp");
    }

    #[test]
    fn checksum_uses_sha1_prefix() {
        // sha1("abc") = a9993e36...; first 4 bytes as a big-endian integer.
        assert_eq!(field_checksum("abc"), 0xa999_3e36);
        assert_ne!(field_checksum("abc"), field_checksum("abd"));
    }

    #[tokio::test]
    async fn add_card_round_trips_content() {
        let (_dir, store, clock) = open_seeded_collection().await;
        let ctx = RequestContext::background();
        let (note_id, card_id) = add_card(&store, &ctx, clock.now_ms(), 1, " hola ", "hello")
            .await
            .unwrap();

        let (card, note) = get_card(&store, card_id).await.unwrap();
        assert_eq!(card.nid, note_id);
        assert_eq!(card.kind, CardType::New);
        assert_eq!(card.queue, CardQueue::New);
        assert_eq!(note.fields(), vec!["hola", "hello"]);
        assert_eq!(note.sfld, "hola");
        assert_eq!(note.csum, field_checksum("hola"));
        assert!(!note.guid.is_empty());
    }

    #[tokio::test]
    async fn empty_fields_are_rejected() {
        let (_dir, store, clock) = open_seeded_collection().await;
        let ctx = RequestContext::background();
        let result = add_card(&store, &ctx, clock.now_ms(), 1, "   ", "back").await;
        assert!(matches!(
            result,
            Err(Error::Library(LibraryError::Card(CardErrorKind::EmptyField)))
        ));
    }

    #[tokio::test]
    async fn rapid_inserts_get_distinct_ids() {
        let (_dir, store, clock) = open_seeded_collection().await;
        let ctx = RequestContext::background();
        // The clock never advances: every insert happens in the same
        // millisecond and still has to produce unique, increasing ids.
        let mut note_ids = Vec::new();
        let mut card_ids = Vec::new();
        for i in 0..5 {
            let (nid, cid) = add_card(
                &store,
                &ctx,
                clock.now_ms(),
                1,
                &format!("front {}", i),
                "back",
            )
            .await
            .unwrap();
            note_ids.push(nid);
            card_ids.push(cid);
        }
        for window in note_ids.windows(2) {
            assert!(window[0] < window[1]);
        }
        for window in card_ids.windows(2) {
            assert!(window[0] < window[1]);
        }
    }

    #[tokio::test]
    async fn update_content_rewrites_sort_field_and_checksum() {
        let (_dir, store, clock) = open_seeded_collection().await;
        let ctx = RequestContext::background();
        let (_, card_id) = add_card(&store, &ctx, clock.now_ms(), 1, "alt", "old")
            .await
            .unwrap();
        update_card_content(&store, &ctx, clock.now_ms(), card_id, "neu", "new")
            .await
            .unwrap();

        let (_, note) = get_card(&store, card_id).await.unwrap();
        assert_eq!(note.sfld, "neu");
        assert_eq!(note.csum, field_checksum("neu"));
        assert_eq!(note.usn, -1);
        assert_eq!(note.fields(), vec!["neu", "new"]);
    }

    #[tokio::test]
    async fn deleting_last_card_cascades_to_note() {
        let (_dir, store, clock) = open_seeded_collection().await;
        let ctx = RequestContext::background();
        let (note_id, card_id) = add_card(&store, &ctx, clock.now_ms(), 1, "uno", "one")
            .await
            .unwrap();

        delete_card(&store, &ctx, clock.now_ms(), card_id).await.unwrap();

        let (note_rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notes WHERE id = ?")
            .bind(note_id)
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(note_rows, 0);
        let graves: Vec<(i64, i64)> =
            sqlx::query_as("SELECT oid, type FROM graves ORDER BY type ASC")
                .fetch_all(store.pool())
                .await
                .unwrap();
        assert_eq!(graves, vec![(card_id, GRAVE_CARD), (note_id, GRAVE_NOTE)]);

        // A second delete finds nothing and must not add another grave.
        let second = delete_card(&store, &ctx, clock.now_ms(), card_id).await;
        assert!(matches!(
            second,
            Err(Error::Library(LibraryError::Card(CardErrorKind::NotFound)))
        ));
        let (grave_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM graves")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(grave_count, 2);
    }

    #[tokio::test]
    async fn listing_orders_by_sort_field() {
        let (_dir, store, clock) = open_seeded_collection().await;
        let ctx = RequestContext::background();
        let deck = crate::repo::decks::create_deck(&store, &ctx, clock.now_ms(), "Sorted")
            .await
            .unwrap();
        for front in ["zebra", "apple", "mango"] {
            add_card(&store, &ctx, clock.now_ms(), deck.id, front, "x")
                .await
                .unwrap();
        }

        let page = list_deck_cards(&store, deck.id, 1, 25).await.unwrap();
        assert_eq!(page.total, 3);
        let fronts: Vec<_> = page.cards.iter().map(|c| c.front.as_str()).collect();
        assert_eq!(fronts, vec!["apple", "mango", "zebra"]);

        let second_page = list_deck_cards(&store, deck.id, 2, 2).await.unwrap();
        assert_eq!(second_page.total, 3);
        assert_eq!(second_page.cards.len(), 1);
        assert_eq!(second_page.cards[0].front, "zebra");
    }
}
