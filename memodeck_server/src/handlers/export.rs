use crate::auth::AuthUser;
use crate::handlers::{collection_ref, error_to_response, request_ctx};
use crate::AppState;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use memodeck::api::export::export;
use serde_json::Value;
use std::sync::Arc;

/// Streams the user's collection as a `.apkg` attachment.
pub async fn export_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let (bytes, filename) = export(
        &state.registry,
        &request_ctx(),
        &collection_ref(&state, &auth),
        state.clock.as_ref(),
        state.config.export_zip_level,
    )
    .await
    .map_err(error_to_response)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        "application/zip".parse().expect("static header value"),
    );
    if let Ok(value) = format!("attachment; filename=\"{}\"", filename).parse() {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok((headers, bytes))
}
