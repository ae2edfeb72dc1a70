use crate::auth::AuthUser;
use crate::AppState;
use axum::{http::StatusCode, Json};
use memodeck::context::RequestContext;
use memodeck::session::CollectionRef;
use memodeck::{
    CardErrorKind, CollectionErrorKind, DeckErrorKind, Error, LibraryError,
};
use serde_json::{json, Value};
use std::time::Duration;

pub mod auth;
pub mod card;
pub mod deck;
pub mod export;
pub mod review;

/// Upper bound for one request's storage work, including time parked on the
/// per-user session lock.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn request_ctx() -> RequestContext {
    RequestContext::with_timeout(REQUEST_TIMEOUT)
}

pub(crate) fn collection_ref(state: &AppState, auth: &AuthUser) -> CollectionRef {
    CollectionRef {
        username: auth.user.username.clone(),
        path: state.config.collection_path(auth.user.id),
    }
}

/// Maps the error taxonomy onto status codes. The `error` strings are stable:
/// the browser UI switches on them.
#[allow(
    clippy::needless_pass_by_value,
    reason = "can easily call `.map_err()`"
)]
pub(crate) fn error_to_response(e: Error) -> (StatusCode, Json<Value>) {
    let status = match &e {
        Error::Library(library) => match library {
            LibraryError::Deck(kind) => match kind {
                DeckErrorKind::NotFound => StatusCode::NOT_FOUND,
                DeckErrorKind::Duplicate => StatusCode::CONFLICT,
                DeckErrorKind::EmptyName | DeckErrorKind::DefaultProtected => {
                    StatusCode::BAD_REQUEST
                }
            },
            LibraryError::Card(kind) => match kind {
                CardErrorKind::NotFound => StatusCode::NOT_FOUND,
                CardErrorKind::EmptyField | CardErrorKind::NothingPending => {
                    StatusCode::BAD_REQUEST
                }
            },
            LibraryError::Scheduler(_) | LibraryError::Validation(_) => StatusCode::BAD_REQUEST,
            LibraryError::Collection(kind) => match kind {
                CollectionErrorKind::Missing => StatusCode::NOT_FOUND,
                CollectionErrorKind::AlreadyInitialized => StatusCode::INTERNAL_SERVER_ERROR,
            },
            LibraryError::Session(_) | LibraryError::Integrity(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
        Error::Sqlx { .. } | Error::Io { .. } | Error::Zip { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let message = match &e {
        // Storage internals never leak to clients.
        Error::Sqlx { .. } | Error::Io { .. } | Error::Zip { .. } => {
            log::error!("storage failure: {}", e);
            "Internal server error".to_string()
        }
        Error::Library(LibraryError::Integrity(_)) => {
            log::error!("{}", e);
            "Internal server error".to_string()
        }
        Error::Library(library) => library.to_string(),
        _ => {
            log::error!("storage failure: {}", e);
            "Internal server error".to_string()
        }
    };
    (status, Json(json!({ "error": message })))
}

pub async fn root_handler() -> &'static str {
    "Running"
}
