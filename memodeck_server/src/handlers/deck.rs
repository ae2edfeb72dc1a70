use crate::auth::AuthUser;
use crate::handlers::{collection_ref, error_to_response, request_ctx};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use memodeck::api::deck::{
    create_deck, deck_stats, delete_deck, list_deck_cards, list_decks, rename_deck,
    set_current_deck,
};
use memodeck::schema::card::CardSummary;
use memodeck::schema::deck::{
    CardPageQuery, CreateDeckRequest, DeckCardsResponse, DeckResponse, DeckStatsResponse,
    DeleteDeckResponse, Pagination, RenameDeckRequest, SetCurrentDeckRequest,
};
use memodeck::schema::MessageResponse;
use serde_json::Value;
use std::sync::Arc;

pub async fn list_decks_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let decks = list_decks(&state.registry, &request_ctx(), &collection_ref(&state, &auth))
        .await
        .map_err(error_to_response)?;
    let response: Vec<DeckResponse> = decks.iter().map(DeckResponse::new).collect();
    Ok(Json(response))
}

pub async fn create_deck_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateDeckRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let deck = create_deck(
        &state.registry,
        &request_ctx(),
        &collection_ref(&state, &auth),
        state.clock.as_ref(),
        body.name,
    )
    .await
    .map_err(error_to_response)?;
    Ok((StatusCode::CREATED, Json(DeckResponse::new(&deck))))
}

pub async fn set_current_deck_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<SetCurrentDeckRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    set_current_deck(
        &state.registry,
        &request_ctx(),
        &collection_ref(&state, &auth),
        state.clock.as_ref(),
        body.deck_id,
    )
    .await
    .map_err(error_to_response)?;
    Ok(Json(MessageResponse::new("Current deck updated")))
}

pub async fn delete_deck_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(deck_id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let deleted_cards = delete_deck(
        &state.registry,
        &request_ctx(),
        &collection_ref(&state, &auth),
        state.clock.as_ref(),
        deck_id,
    )
    .await
    .map_err(error_to_response)?;
    Ok(Json(DeleteDeckResponse {
        message: "Deck deleted".to_string(),
        deleted_cards,
    }))
}

pub async fn rename_deck_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(deck_id): Path<i64>,
    Json(body): Json<RenameDeckRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let deck = rename_deck(
        &state.registry,
        &request_ctx(),
        &collection_ref(&state, &auth),
        state.clock.as_ref(),
        deck_id,
        body.name,
    )
    .await
    .map_err(error_to_response)?;
    Ok(Json(DeckResponse::new(&deck)))
}

pub async fn deck_stats_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(deck_id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let counts = deck_stats(
        &state.registry,
        &request_ctx(),
        &collection_ref(&state, &auth),
        deck_id,
    )
    .await
    .map_err(error_to_response)?;
    Ok(Json(DeckStatsResponse::new(&counts)))
}

pub async fn deck_cards_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(deck_id): Path<i64>,
    opts: Option<Query<CardPageQuery>>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let Query(opts) = opts.unwrap_or_default();
    let page = opts.page.unwrap_or(1).max(1);
    let per_page = opts.per_page.unwrap_or(25).clamp(1, 200);
    let result = list_deck_cards(
        &state.registry,
        &request_ctx(),
        &collection_ref(&state, &auth),
        deck_id,
        page,
        per_page,
    )
    .await
    .map_err(error_to_response)?;
    let total_pages = (result.total + i64::from(per_page) - 1) / i64::from(per_page);
    Ok(Json(DeckCardsResponse {
        cards: result.cards.iter().map(CardSummary::new).collect(),
        pagination: Pagination {
            page,
            per_page,
            total: result.total,
            total_pages,
        },
    }))
}
