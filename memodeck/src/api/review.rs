//! Review flow: pick the next due card, and commit an answer together with
//! its revlog row in one transaction.

use super::with_collection;
use crate::clock::Clock;
use crate::context::RequestContext;
use crate::model::{Card, CardId, DeckId, Note};
use crate::repo::cards::split_fields;
use crate::repo::queue::{day_cutoff_days, next_due_card, unbury_for_day};
use crate::repo::{allocate_id, integrity, load_col, touch_col, IdTable};
use crate::scheduler::{advance, revlog_entry, Ease};
use crate::session::{CollectionRef, SessionRegistry};
use crate::{CardErrorKind, Error, LibraryError};

/// What the UI needs to show one card.
#[derive(Clone, Debug)]
pub struct CardView {
    pub card_id: CardId,
    pub front: String,
    pub back: String,
    pub queue: i64,
}

/// The next due card of the current deck (or `deck_override`). `None` means
/// nothing is due right now.
pub async fn get_next(
    registry: &SessionRegistry,
    ctx: &RequestContext,
    coll: &CollectionRef,
    clock: &dyn Clock,
    deck_override: Option<DeckId>,
) -> Result<Option<CardView>, Error> {
    let now_ms = clock.now_ms();
    let ctx_inner = *ctx;
    with_collection(registry, ctx, coll, |lease| {
        Box::pin(async move {
            let store = lease.store();
            let blobs = load_col(store.pool()).await?;
            let deck_id = deck_override.unwrap_or(blobs.conf.cur_deck);
            let cutoff = day_cutoff_days(store, now_ms).await?;
            if unbury_for_day(store, &ctx_inner, now_ms, cutoff).await? {
                lease.mark_dirty();
            }
            let Some(card) = next_due_card(store, deck_id, now_ms, cutoff).await? else {
                return Ok(None);
            };
            let note: Option<Note> = sqlx::query_as("SELECT * FROM notes WHERE id = ?")
                .bind(card.nid)
                .fetch_optional(store.pool())
                .await
                .map_err(|e| Error::Sqlx { source: e })?;
            let Some(note) = note else {
                return Err(integrity(format!("card {} has no note {}", card.id, card.nid)));
            };
            let (front, back) = split_fields(&note.flds);
            Ok(Some(CardView {
                card_id: card.id,
                front,
                back,
                queue: card.queue as i64,
            }))
        })
    })
    .await
}

/// Applies an ease rating to a card. The card row update and the revlog
/// append commit atomically; `CardNotFound` means the card vanished between
/// `get_next` and now (cascade delete from another request).
pub async fn answer(
    registry: &SessionRegistry,
    ctx: &RequestContext,
    coll: &CollectionRef,
    clock: &dyn Clock,
    card_id: CardId,
    ease_raw: u8,
    time_taken_ms: i64,
) -> Result<(), Error> {
    let ease = Ease::try_from(ease_raw)?;
    let time_taken_ms = time_taken_ms.max(0);
    let now_ms = clock.now_ms();
    let ctx_inner = *ctx;
    with_collection(registry, ctx, coll, |lease| {
        Box::pin(async move {
            let store = lease.store();
            let cutoff = day_cutoff_days(store, now_ms).await?;
            store
                .with_txn(&ctx_inner, |conn| {
                    Box::pin(async move {
                        let card: Option<Card> =
                            sqlx::query_as("SELECT * FROM cards WHERE id = ?")
                                .bind(card_id)
                                .fetch_optional(&mut *conn)
                                .await
                                .map_err(|e| Error::Sqlx { source: e })?;
                        let Some(card) = card else {
                            return Err(Error::Library(LibraryError::Card(
                                CardErrorKind::NotFound,
                            )));
                        };
                        let blobs = load_col(&mut *conn).await?;
                        let deck = blobs
                            .deck(card.did)
                            .ok_or_else(|| {
                                integrity(format!("card {} references deck {}", card.id, card.did))
                            })?;
                        let dconf = blobs
                            .dconf
                            .get(&deck.conf.to_string())
                            .ok_or_else(|| {
                                integrity(format!("deck {} references dconf {}", deck.id, deck.conf))
                            })?;

                        let outcome = advance(&card, ease, dconf, now_ms, cutoff);
                        let revlog_id = allocate_id(conn, IdTable::Revlog, now_ms).await?;
                        let log = revlog_entry(revlog_id, &card, &outcome, ease, time_taken_ms);

                        sqlx::query(
                            "UPDATE cards
                             SET type = ?, queue = ?, due = ?, ivl = ?, factor = ?, left = ?,
                                 reps = reps + 1, lapses = lapses + ?, mod = ?, usn = -1
                             WHERE id = ?",
                        )
                        .bind(outcome.kind)
                        .bind(outcome.queue)
                        .bind(outcome.due)
                        .bind(outcome.ivl)
                        .bind(outcome.factor)
                        .bind(outcome.left)
                        .bind(outcome.lapses_delta)
                        .bind(now_ms / 1000)
                        .bind(card.id)
                        .execute(&mut *conn)
                        .await
                        .map_err(|e| Error::Sqlx { source: e })?;

                        sqlx::query(
                            "INSERT INTO revlog (id, cid, usn, ease, ivl, lastIvl, factor, time, type)
                             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                        )
                        .bind(log.id)
                        .bind(log.cid)
                        .bind(log.usn)
                        .bind(log.ease)
                        .bind(log.ivl)
                        .bind(log.last_ivl)
                        .bind(log.factor)
                        .bind(log.time)
                        .bind(log.kind)
                        .execute(&mut *conn)
                        .await
                        .map_err(|e| Error::Sqlx { source: e })?;

                        touch_col(&mut *conn, now_ms).await?;
                        Ok(())
                    })
                })
                .await?;
            lease.mark_dirty();
            Ok(())
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::collection::initialize;
    use crate::model::{CardQueue, CardType, RevlogEntry};
    use crate::schema;
    use crate::session::RegistryOptions;
    use crate::SchedulerErrorKind;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    async fn service_fixture() -> (
        tempfile::TempDir,
        Arc<SessionRegistry>,
        Arc<ManualClock>,
        CollectionRef,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_1.anki2");
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        initialize(&path, "alice", clock.as_ref()).await.unwrap();
        let registry = Arc::new(SessionRegistry::new(
            RegistryOptions::default(),
            clock.clone(),
        ));
        let coll = CollectionRef {
            username: "alice".to_string(),
            path,
        };
        (dir, registry, clock, coll)
    }

    #[tokio::test]
    async fn review_new_card_moves_it_into_learning() {
        let (_dir, registry, clock, coll) = service_fixture().await;
        let ctx = RequestContext::background();

        // Work in a fresh current deck so the welcome samples stay out of
        // the queue.
        let deck = crate::api::deck::create_deck(
            &registry,
            &ctx,
            &coll,
            clock.as_ref(),
            "Study".to_string(),
        )
        .await
        .unwrap();
        crate::api::deck::set_current_deck(&registry, &ctx, &coll, clock.as_ref(), deck.id)
            .await
            .unwrap();
        let (_, card_id) = crate::api::card::add_card(
            &registry,
            &ctx,
            &coll,
            clock.as_ref(),
            "hola".to_string(),
            "hello".to_string(),
        )
        .await
        .unwrap();

        let before = crate::api::deck::deck_stats(&registry, &ctx, &coll, deck.id)
            .await
            .unwrap();
        assert_eq!(before.new, 1);

        let view = get_next(&registry, &ctx, &coll, clock.as_ref(), None)
            .await
            .unwrap()
            .expect("the new card is due");
        let response = schema::review::ReviewCardResponse::new(&view);
        assert_eq!(response.queue, 0);
        assert_eq!(view.card_id, card_id);
        assert_eq!(view.front, "hola");
        assert_eq!(view.back, "hello");

        answer(&registry, &ctx, &coll, clock.as_ref(), card_id, 3, 2_500)
            .await
            .unwrap();

        let after = crate::api::deck::deck_stats(&registry, &ctx, &coll, deck.id)
            .await
            .unwrap();
        assert_eq!(after.new, 0);
        assert_eq!(after.learning, 1);

        let lease = registry.acquire(&ctx, &coll).await.unwrap();
        let card: Card = sqlx::query_as("SELECT * FROM cards WHERE id = ?")
            .bind(card_id)
            .fetch_one(lease.store().pool())
            .await
            .unwrap();
        assert_eq!(card.kind, CardType::Learning);
        assert_eq!(card.queue, CardQueue::Learning);
        assert_eq!(card.reps, 1);
        let logs: Vec<RevlogEntry> =
            sqlx::query_as("SELECT * FROM revlog WHERE cid = ? ORDER BY id")
                .bind(card_id)
                .fetch_all(lease.store().pool())
                .await
                .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].ease, 3);
        assert_eq!(logs[0].time, 2_500);
    }

    #[tokio::test]
    async fn lapse_updates_card_and_revlog() {
        let (_dir, registry, clock, coll) = service_fixture().await;
        let ctx = RequestContext::background();
        let (_, card_id) = crate::api::card::add_card(
            &registry,
            &ctx,
            &coll,
            clock.as_ref(),
            "faux".to_string(),
            "false friend".to_string(),
        )
        .await
        .unwrap();

        {
            let lease = registry.acquire(&ctx, &coll).await.unwrap();
            sqlx::query(
                "UPDATE cards SET type = 2, queue = 2, due = 0, ivl = 10, factor = 2500 WHERE id = ?",
            )
            .bind(card_id)
            .execute(lease.store().pool())
            .await
            .unwrap();
        }

        answer(&registry, &ctx, &coll, clock.as_ref(), card_id, 1, 4_000)
            .await
            .unwrap();

        let lease = registry.acquire(&ctx, &coll).await.unwrap();
        let card: Card = sqlx::query_as("SELECT * FROM cards WHERE id = ?")
            .bind(card_id)
            .fetch_one(lease.store().pool())
            .await
            .unwrap();
        assert_eq!(card.kind, CardType::Relearning);
        assert_eq!(card.queue, CardQueue::Learning);
        assert_eq!(card.lapses, 1);
        assert_eq!(card.factor, 2300);

        let log: RevlogEntry = sqlx::query_as("SELECT * FROM revlog WHERE cid = ?")
            .bind(card_id)
            .fetch_one(lease.store().pool())
            .await
            .unwrap();
        assert_eq!(log.ease, 1);
        assert_eq!(log.last_ivl, 10);
        assert_eq!(log.kind, 1);
    }

    #[tokio::test]
    async fn revlog_ids_stay_monotonic_within_one_millisecond() {
        let (_dir, registry, clock, coll) = service_fixture().await;
        let ctx = RequestContext::background();

        for _ in 0..3 {
            let view = get_next(&registry, &ctx, &coll, clock.as_ref(), None)
                .await
                .unwrap()
                .expect("sample cards are due");
            // The clock is frozen: every review happens in the same
            // millisecond and the ids must still increase.
            answer(&registry, &ctx, &coll, clock.as_ref(), view.card_id, 4, 500)
                .await
                .unwrap();
        }

        let lease = registry.acquire(&ctx, &coll).await.unwrap();
        let ids: Vec<(i64,)> = sqlx::query_as("SELECT id FROM revlog ORDER BY id")
            .fetch_all(lease.store().pool())
            .await
            .unwrap();
        assert_eq!(ids.len(), 3);
        for window in ids.windows(2) {
            assert!(window[0].0 < window[1].0);
        }
    }

    #[tokio::test]
    async fn invalid_ease_and_missing_card_are_rejected() {
        let (_dir, registry, clock, coll) = service_fixture().await;
        let ctx = RequestContext::background();

        let invalid = answer(&registry, &ctx, &coll, clock.as_ref(), 1, 5, 0).await;
        assert!(matches!(
            invalid,
            Err(Error::Library(LibraryError::Scheduler(
                SchedulerErrorKind::InvalidEase(5)
            )))
        ));

        let missing = answer(&registry, &ctx, &coll, clock.as_ref(), 987_654_321, 3, 0).await;
        assert!(matches!(
            missing,
            Err(Error::Library(LibraryError::Card(CardErrorKind::NotFound)))
        ));
    }

    #[tokio::test]
    async fn deck_override_selects_other_deck() {
        let (_dir, registry, clock, coll) = service_fixture().await;
        let ctx = RequestContext::background();
        let deck = crate::api::deck::create_deck(
            &registry,
            &ctx,
            &coll,
            clock.as_ref(),
            "Empty".to_string(),
        )
        .await
        .unwrap();

        let none = get_next(&registry, &ctx, &coll, clock.as_ref(), Some(deck.id))
            .await
            .unwrap();
        assert!(none.is_none());

        let default_deck = get_next(&registry, &ctx, &coll, clock.as_ref(), None)
            .await
            .unwrap();
        assert!(default_deck.is_some());
    }
}
