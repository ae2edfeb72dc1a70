use super::with_collection;
use crate::clock::Clock;
use crate::context::RequestContext;
use crate::model::{CardId, NoteId};
use crate::repo::cards::{self, split_fields};
use crate::repo::load_col;
use crate::session::{CollectionRef, SessionRegistry};
use crate::Error;

/// Card content as the UI sees it.
#[derive(Clone, Debug)]
pub struct CardContent {
    pub card_id: CardId,
    pub front: String,
    pub back: String,
}

/// Inserts a front/back pair into the user's current deck.
pub async fn add_card(
    registry: &SessionRegistry,
    ctx: &RequestContext,
    coll: &CollectionRef,
    clock: &dyn Clock,
    front: String,
    back: String,
) -> Result<(NoteId, CardId), Error> {
    let now_ms = clock.now_ms();
    let ctx_inner = *ctx;
    with_collection(registry, ctx, coll, |lease| {
        Box::pin(async move {
            let store = lease.store();
            let blobs = load_col(store.pool()).await?;
            let ids = cards::add_card(
                store,
                &ctx_inner,
                now_ms,
                blobs.conf.cur_deck,
                &front,
                &back,
            )
            .await?;
            lease.mark_dirty();
            Ok(ids)
        })
    })
    .await
}

pub async fn get_card(
    registry: &SessionRegistry,
    ctx: &RequestContext,
    coll: &CollectionRef,
    card_id: CardId,
) -> Result<CardContent, Error> {
    with_collection(registry, ctx, coll, |lease| {
        Box::pin(async move {
            let (card, note) = cards::get_card(lease.store(), card_id).await?;
            let (front, back) = split_fields(&note.flds);
            Ok(CardContent {
                card_id: card.id,
                front,
                back,
            })
        })
    })
    .await
}

pub async fn update_card(
    registry: &SessionRegistry,
    ctx: &RequestContext,
    coll: &CollectionRef,
    clock: &dyn Clock,
    card_id: CardId,
    front: String,
    back: String,
) -> Result<(), Error> {
    let now_ms = clock.now_ms();
    let ctx_inner = *ctx;
    with_collection(registry, ctx, coll, |lease| {
        Box::pin(async move {
            cards::update_card_content(lease.store(), &ctx_inner, now_ms, card_id, &front, &back)
                .await?;
            lease.mark_dirty();
            Ok(())
        })
    })
    .await
}

pub async fn delete_card(
    registry: &SessionRegistry,
    ctx: &RequestContext,
    coll: &CollectionRef,
    clock: &dyn Clock,
    card_id: CardId,
) -> Result<(), Error> {
    let now_ms = clock.now_ms();
    let ctx_inner = *ctx;
    with_collection(registry, ctx, coll, |lease| {
        Box::pin(async move {
            cards::delete_card(lease.store(), &ctx_inner, now_ms, card_id).await?;
            lease.mark_dirty();
            Ok(())
        })
    })
    .await
}
