use crate::auth::AuthUser;
use crate::handlers::{collection_ref, error_to_response, request_ctx};
use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use memodeck::api::review::{answer, get_next};
use memodeck::schema::review::{AnswerRequest, ReviewCardResponse};
use memodeck::schema::MessageResponse;
use memodeck::{CardErrorKind, Error, LibraryError};
use serde_json::Value;
use std::sync::Arc;

/// Hands out the next due card of the current deck and remembers it in the
/// auth session so `/answer` knows what is being rated.
pub async fn review_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let view = get_next(
        &state.registry,
        &request_ctx(),
        &collection_ref(&state, &auth),
        state.clock.as_ref(),
        None,
    )
    .await
    .map_err(error_to_response)?;
    match view {
        Some(view) => {
            state.gate.set_pending_card(&auth.token, Some(view.card_id));
            Ok(Json(ReviewCardResponse::new(&view)).into_response())
        }
        None => {
            state.gate.set_pending_card(&auth.token, None);
            Ok(Json(MessageResponse::new("No cards due right now")).into_response())
        }
    }
}

pub async fn answer_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<AnswerRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let pending = state
        .gate
        .resolve(&auth.token)
        .and_then(|session| session.pending_card);
    let Some(card_id) = pending else {
        return Err(error_to_response(Error::Library(LibraryError::Card(
            CardErrorKind::NothingPending,
        ))));
    };
    answer(
        &state.registry,
        &request_ctx(),
        &collection_ref(&state, &auth),
        state.clock.as_ref(),
        card_id,
        body.ease,
        body.time_taken,
    )
    .await
    .map_err(error_to_response)?;
    state.gate.set_pending_card(&auth.token, None);
    Ok(Json(MessageResponse::new("Answer recorded")))
}
