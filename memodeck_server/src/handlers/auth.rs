use crate::auth::{AuthUser, UserStore, UserStoreError, SESSION_COOKIE};
use crate::handlers::request_ctx;
use crate::AppState;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use memodeck::collection::initialize;
use memodeck::schema::auth::{
    LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, UserView,
};
use memodeck::schema::MessageResponse;
use serde_json::{json, Value};
use std::sync::Arc;

fn validation_error(message: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn validate_registration(body: &RegisterRequest) -> Result<(), (StatusCode, Json<Value>)> {
    let username = body.username.trim();
    if username.is_empty() || username.len() > 10 {
        return Err(validation_error("Username must be 1-10 characters"));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(validation_error(
            "Username may only contain letters, digits and underscores",
        ));
    }
    let name = body.name.trim();
    if name.is_empty() || name.len() > 40 {
        return Err(validation_error("Name must be 1-40 characters"));
    }
    if body.password.len() < 10 || body.password.len() > 20 {
        return Err(validation_error("Password must be 10-20 characters"));
    }
    Ok(())
}

pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    validate_registration(&body)?;
    let username = body.username.trim();
    let name = body.name.trim();

    let user = state
        .users
        .create(username, name, &body.password)
        .await
        .map_err(|e| match e {
            UserStoreError::Duplicate => (
                StatusCode::CONFLICT,
                Json(json!({ "error": "Username already taken" })),
            ),
            UserStoreError::Storage(detail) => {
                log::error!("user store failure: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
            }
        })?;

    let path = state.config.collection_path(user.id);
    if let Err(e) = initialize(&path, name, state.clock.as_ref()).await {
        log::error!("failed to create collection for {}: {}", username, e);
        let _ = state.users.remove(user.id).await;
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Internal server error" })),
        ));
    }

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { user_id: user.id }),
    ))
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let user = state
        .users
        .verify_password(body.username.trim(), &body.password)
        .await
        .map_err(|e| {
            log::error!("user store failure: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
        })?
        .ok_or((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid username or password" })),
        ))?;

    let token = state.gate.issue(&user);
    let mut headers = HeaderMap::new();
    let cookie = format!("{}={}; HttpOnly; Path=/; SameSite=Lax", SESSION_COOKIE, token);
    if let Ok(value) = cookie.parse() {
        headers.insert(header::SET_COOKIE, value);
    }
    let response = LoginResponse {
        user: UserView {
            user_id: user.id,
            username: user.username,
            name: user.name,
        },
        token,
    };
    Ok((headers, Json(response)))
}

pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    auth: Option<AuthUser>,
) -> impl IntoResponse {
    if let Some(auth) = auth {
        state.gate.revoke(&auth.token);
        // Push committed work to the main file before the session goes cold.
        if let Err(e) = state
            .registry
            .flush(&request_ctx(), &auth.user.username)
            .await
        {
            log::warn!("flush on logout failed for {}: {}", auth.user.username, e);
        }
    }
    Json(MessageResponse::new("Logged out"))
}
