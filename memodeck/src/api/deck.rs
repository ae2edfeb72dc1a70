use super::with_collection;
use crate::clock::Clock;
use crate::context::RequestContext;
use crate::model::{Deck, DeckCounts, DeckId};
use crate::repo::cards::DeckCardPage;
use crate::repo::{cards, decks};
use crate::session::{CollectionRef, SessionRegistry};
use crate::Error;

pub async fn list_decks(
    registry: &SessionRegistry,
    ctx: &RequestContext,
    coll: &CollectionRef,
) -> Result<Vec<Deck>, Error> {
    with_collection(registry, ctx, coll, |lease| {
        Box::pin(async move { decks::list_decks(lease.store()).await })
    })
    .await
}

pub async fn create_deck(
    registry: &SessionRegistry,
    ctx: &RequestContext,
    coll: &CollectionRef,
    clock: &dyn Clock,
    name: String,
) -> Result<Deck, Error> {
    let now_ms = clock.now_ms();
    let ctx_inner = *ctx;
    with_collection(registry, ctx, coll, |lease| {
        Box::pin(async move {
            let deck = decks::create_deck(lease.store(), &ctx_inner, now_ms, &name).await?;
            lease.mark_dirty();
            Ok(deck)
        })
    })
    .await
}

pub async fn rename_deck(
    registry: &SessionRegistry,
    ctx: &RequestContext,
    coll: &CollectionRef,
    clock: &dyn Clock,
    deck_id: DeckId,
    name: String,
) -> Result<Deck, Error> {
    let now_ms = clock.now_ms();
    let ctx_inner = *ctx;
    with_collection(registry, ctx, coll, |lease| {
        Box::pin(async move {
            let deck = decks::rename_deck(lease.store(), &ctx_inner, now_ms, deck_id, &name).await?;
            lease.mark_dirty();
            Ok(deck)
        })
    })
    .await
}

/// Returns the number of cards removed by the cascade.
pub async fn delete_deck(
    registry: &SessionRegistry,
    ctx: &RequestContext,
    coll: &CollectionRef,
    clock: &dyn Clock,
    deck_id: DeckId,
) -> Result<u32, Error> {
    let now_ms = clock.now_ms();
    let ctx_inner = *ctx;
    with_collection(registry, ctx, coll, |lease| {
        Box::pin(async move {
            let deleted = decks::delete_deck(lease.store(), &ctx_inner, now_ms, deck_id).await?;
            lease.mark_dirty();
            Ok(deleted)
        })
    })
    .await
}

pub async fn set_current_deck(
    registry: &SessionRegistry,
    ctx: &RequestContext,
    coll: &CollectionRef,
    clock: &dyn Clock,
    deck_id: DeckId,
) -> Result<(), Error> {
    let now_ms = clock.now_ms();
    let ctx_inner = *ctx;
    with_collection(registry, ctx, coll, |lease| {
        Box::pin(async move {
            decks::set_current_deck(lease.store(), &ctx_inner, now_ms, deck_id).await?;
            lease.mark_dirty();
            Ok(())
        })
    })
    .await
}

pub async fn deck_stats(
    registry: &SessionRegistry,
    ctx: &RequestContext,
    coll: &CollectionRef,
    deck_id: DeckId,
) -> Result<DeckCounts, Error> {
    with_collection(registry, ctx, coll, |lease| {
        Box::pin(async move { decks::deck_stats(lease.store(), deck_id).await })
    })
    .await
}

pub async fn list_deck_cards(
    registry: &SessionRegistry,
    ctx: &RequestContext,
    coll: &CollectionRef,
    deck_id: DeckId,
    page: u32,
    per_page: u32,
) -> Result<DeckCardPage, Error> {
    with_collection(registry, ctx, coll, |lease| {
        Box::pin(async move { cards::list_deck_cards(lease.store(), deck_id, page, per_page).await })
    })
    .await
}
