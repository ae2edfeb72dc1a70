use crate::auth::AuthUser;
use crate::handlers::{collection_ref, error_to_response, request_ctx};
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use memodeck::api::card::{add_card, delete_card, get_card, update_card};
use memodeck::schema::card::{
    AddCardRequest, AddCardResponse, CardContentResponse, SuccessResponse, UpdateCardRequest,
};
use serde_json::Value;
use std::sync::Arc;

pub async fn add_card_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<AddCardRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let (note_id, card_id) = add_card(
        &state.registry,
        &request_ctx(),
        &collection_ref(&state, &auth),
        state.clock.as_ref(),
        body.front,
        body.back,
    )
    .await
    .map_err(error_to_response)?;
    Ok((
        StatusCode::CREATED,
        Json(AddCardResponse { note_id, card_id }),
    ))
}

pub async fn get_card_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(card_id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let content = get_card(
        &state.registry,
        &request_ctx(),
        &collection_ref(&state, &auth),
        card_id,
    )
    .await
    .map_err(error_to_response)?;
    Ok(Json(CardContentResponse {
        card_id: content.card_id,
        front: content.front,
        back: content.back,
    }))
}

pub async fn update_card_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(card_id): Path<i64>,
    Json(body): Json<UpdateCardRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    update_card(
        &state.registry,
        &request_ctx(),
        &collection_ref(&state, &auth),
        state.clock.as_ref(),
        card_id,
        body.front,
        body.back,
    )
    .await
    .map_err(error_to_response)?;
    Ok(Json(SuccessResponse { success: true }))
}

pub async fn delete_card_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(card_id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    delete_card(
        &state.registry,
        &request_ctx(),
        &collection_ref(&state, &auth),
        state.clock.as_ref(),
        card_id,
    )
    .await
    .map_err(error_to_response)?;
    Ok(Json(SuccessResponse { success: true }))
}
