//! Review queue selection: which card of a deck is studied next.

use super::{load_col, save_conf};
use crate::collection::CollectionStore;
use crate::context::RequestContext;
use crate::model::{Card, DeckId};
use crate::Error;

/// Days elapsed since the collection epoch; review-card `due` values are
/// compared against this.
pub async fn day_cutoff_days(store: &CollectionStore, now_ms: i64) -> Result<i64, Error> {
    let (crt,): (i64,) = sqlx::query_as("SELECT crt FROM col WHERE id = 1")
        .fetch_one(store.pool())
        .await
        .map_err(|e| Error::Sqlx { source: e })?;
    Ok((now_ms / 1000 - crt) / 86_400)
}

/// Buried cards come back at day rollover: once per collection day, every
/// card in a buried queue returns to the queue its type implies. Returns
/// whether anything was written.
pub async fn unbury_for_day(
    store: &CollectionStore,
    ctx: &RequestContext,
    now_ms: i64,
    day_cutoff: i64,
) -> Result<bool, Error> {
    let blobs = load_col(store.pool()).await?;
    if blobs.conf.last_unburied >= day_cutoff {
        return Ok(false);
    }
    let ctx = *ctx;
    store
        .with_txn(&ctx, |conn| {
            Box::pin(async move {
                let mut blobs = load_col(&mut *conn).await?;
                if blobs.conf.last_unburied >= day_cutoff {
                    return Ok(false);
                }
                let unburied = sqlx::query(
                    "UPDATE cards
                     SET queue = CASE type WHEN 0 THEN 0 WHEN 2 THEN 2 ELSE 1 END,
                         mod = ?, usn = -1
                     WHERE queue IN (-2, -3)",
                )
                .bind(now_ms / 1000)
                .execute(&mut *conn)
                .await
                .map_err(|e| Error::Sqlx { source: e })?;
                blobs.conf.last_unburied = day_cutoff;
                save_conf(&mut *conn, &blobs.conf, now_ms).await?;
                Ok(unburied.rows_affected() > 0)
            })
        })
        .await
}

/// The next card due in `deck_id`, if any. Priority order:
/// 1. (re)learning cards whose step timer has elapsed,
/// 2. review cards due today or earlier,
/// 3. new cards in insertion order.
/// Suspended and buried cards are never picked.
pub async fn next_due_card(
    store: &CollectionStore,
    deck_id: DeckId,
    now_ms: i64,
    day_cutoff: i64,
) -> Result<Option<Card>, Error> {
    let now_secs = now_ms / 1000;
    let learning: Option<Card> = sqlx::query_as(
        "SELECT * FROM cards
         WHERE did = ? AND queue IN (1, 3) AND due <= ?
         ORDER BY due ASC LIMIT 1",
    )
    .bind(deck_id)
    .bind(now_secs)
    .fetch_optional(store.pool())
    .await
    .map_err(|e| Error::Sqlx { source: e })?;
    if learning.is_some() {
        return Ok(learning);
    }

    let review: Option<Card> = sqlx::query_as(
        "SELECT * FROM cards
         WHERE did = ? AND queue = 2 AND due <= ?
         ORDER BY due ASC LIMIT 1",
    )
    .bind(deck_id)
    .bind(day_cutoff)
    .fetch_optional(store.pool())
    .await
    .map_err(|e| Error::Sqlx { source: e })?;
    if review.is_some() {
        return Ok(review);
    }

    sqlx::query_as(
        "SELECT * FROM cards
         WHERE did = ? AND queue = 0
         ORDER BY due ASC LIMIT 1",
    )
    .bind(deck_id)
    .fetch_optional(store.pool())
    .await
    .map_err(|e| Error::Sqlx { source: e })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::context::RequestContext;
    use crate::model::{CardId, CardQueue, CardType};
    use crate::repo::cards::{add_card, tests::open_seeded_collection};
    use crate::repo::decks::create_deck;

    async fn force_card_state(
        store: &CollectionStore,
        card_id: CardId,
        kind: i64,
        queue: i64,
        due: i64,
        ivl: i64,
    ) {
        sqlx::query("UPDATE cards SET type = ?, queue = ?, due = ?, ivl = ? WHERE id = ?")
            .bind(kind)
            .bind(queue)
            .bind(due)
            .bind(ivl)
            .bind(card_id)
            .execute(store.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn learning_beats_review_beats_new() {
        let (_dir, store, clock) = open_seeded_collection().await;
        let ctx = RequestContext::background();
        let deck = create_deck(&store, &ctx, clock.now_ms(), "Queue").await.unwrap();
        let (_, new_card) = add_card(&store, &ctx, clock.now_ms(), deck.id, "new", "x")
            .await
            .unwrap();
        let (_, review_card) = add_card(&store, &ctx, clock.now_ms(), deck.id, "rev", "x")
            .await
            .unwrap();
        let (_, learning_card) = add_card(&store, &ctx, clock.now_ms(), deck.id, "lrn", "x")
            .await
            .unwrap();

        let now_ms = clock.now_ms();
        let cutoff = day_cutoff_days(&store, now_ms).await.unwrap();
        force_card_state(&store, review_card, 2, 2, cutoff, 3).await;
        force_card_state(&store, learning_card, 1, 1, now_ms / 1000 - 60, 60).await;

        let first = next_due_card(&store, deck.id, now_ms, cutoff).await.unwrap().unwrap();
        assert_eq!(first.id, learning_card);
        assert_eq!(first.queue, CardQueue::Learning);

        force_card_state(&store, learning_card, 1, 1, now_ms / 1000 + 600, 60).await;
        let second = next_due_card(&store, deck.id, now_ms, cutoff).await.unwrap().unwrap();
        assert_eq!(second.id, review_card);
        assert_eq!(second.kind, CardType::Review);

        force_card_state(&store, review_card, 2, 2, cutoff + 5, 3).await;
        let third = next_due_card(&store, deck.id, now_ms, cutoff).await.unwrap().unwrap();
        assert_eq!(third.id, new_card);
        assert_eq!(third.queue, CardQueue::New);
    }

    #[tokio::test]
    async fn suspended_and_buried_are_skipped() {
        let (_dir, store, clock) = open_seeded_collection().await;
        let ctx = RequestContext::background();
        let deck = create_deck(&store, &ctx, clock.now_ms(), "Frozen").await.unwrap();
        let (_, suspended) = add_card(&store, &ctx, clock.now_ms(), deck.id, "a", "x")
            .await
            .unwrap();
        let (_, buried) = add_card(&store, &ctx, clock.now_ms(), deck.id, "b", "x")
            .await
            .unwrap();

        force_card_state(&store, suspended, 0, -1, 1, 0).await;
        force_card_state(&store, buried, 0, -2, 2, 0).await;

        let now_ms = clock.now_ms();
        let cutoff = day_cutoff_days(&store, now_ms).await.unwrap();
        let next = next_due_card(&store, deck.id, now_ms, cutoff).await.unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn day_rollover_restores_buried_cards() {
        let (_dir, store, clock) = open_seeded_collection().await;
        let ctx = RequestContext::background();
        let deck = create_deck(&store, &ctx, clock.now_ms(), "Buried").await.unwrap();
        let (_, buried) = add_card(&store, &ctx, clock.now_ms(), deck.id, "a", "x")
            .await
            .unwrap();
        force_card_state(&store, buried, 0, -2, 1, 0).await;

        // Same collection day: nothing to do.
        let now_ms = clock.now_ms();
        let cutoff = day_cutoff_days(&store, now_ms).await.unwrap();
        assert!(!unbury_for_day(&store, &ctx, now_ms, cutoff).await.unwrap());

        clock.advance_days(1);
        let now_ms = clock.now_ms();
        let cutoff = day_cutoff_days(&store, now_ms).await.unwrap();
        assert!(unbury_for_day(&store, &ctx, now_ms, cutoff).await.unwrap());

        let next = next_due_card(&store, deck.id, now_ms, cutoff).await.unwrap();
        assert_eq!(next.unwrap().id, buried);

        // Only once per day.
        assert!(!unbury_for_day(&store, &ctx, now_ms, cutoff).await.unwrap());
    }

    #[tokio::test]
    async fn new_cards_come_in_insertion_order() {
        let (_dir, store, clock) = open_seeded_collection().await;
        let ctx = RequestContext::background();
        let deck = create_deck(&store, &ctx, clock.now_ms(), "Ordered").await.unwrap();
        let (_, first) = add_card(&store, &ctx, clock.now_ms(), deck.id, "uno", "x")
            .await
            .unwrap();
        add_card(&store, &ctx, clock.now_ms(), deck.id, "dos", "x")
            .await
            .unwrap();

        let now_ms = clock.now_ms();
        let cutoff = day_cutoff_days(&store, now_ms).await.unwrap();
        let next = next_due_card(&store, deck.id, now_ms, cutoff).await.unwrap().unwrap();
        assert_eq!(next.id, first);
    }
}
