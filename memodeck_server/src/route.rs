use crate::handlers::{
    auth::{login_handler, logout_handler, register_handler},
    card::{add_card_handler, delete_card_handler, get_card_handler, update_card_handler},
    deck::{
        create_deck_handler, deck_cards_handler, deck_stats_handler, delete_deck_handler,
        list_decks_handler, rename_deck_handler, set_current_deck_handler,
    },
    export::export_handler,
    review::{answer_handler, review_handler},
    root_handler,
};
use crate::AppState;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        // Auth
        .route("/register", post(register_handler))
        .route("/login", post(login_handler))
        .route("/logout", post(logout_handler))
        // Deck
        .route("/decks", get(list_decks_handler))
        .route("/decks", post(create_deck_handler))
        .route("/decks/current", put(set_current_deck_handler))
        .route("/decks/:id", delete(delete_deck_handler))
        .route("/decks/:id/rename", put(rename_deck_handler))
        .route("/decks/:id/stats", get(deck_stats_handler))
        .route("/decks/:id/cards", get(deck_cards_handler))
        // Review
        .route("/review", get(review_handler))
        .route("/answer", post(answer_handler))
        // Card
        .route("/add_card", post(add_card_handler))
        .route("/cards/:id", get(get_card_handler))
        .route("/cards/:id", put(update_card_handler))
        .route("/cards/:id", delete(delete_card_handler))
        // Export
        .route("/export", get(export_handler))
        .with_state(app_state)
}
