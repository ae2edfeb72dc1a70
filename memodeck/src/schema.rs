//! Request and response bodies of the HTTP surface. Wire names are
//! camelCase; the strings in `MessageResponse`/error bodies are stable and
//! part of the client contract.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub mod auth {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct RegisterRequest {
        pub username: String,
        pub name: String,
        pub password: String,
    }

    #[derive(Clone, Debug, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct RegisterResponse {
        pub user_id: i64,
    }

    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct LoginRequest {
        pub username: String,
        pub password: String,
    }

    #[derive(Clone, Debug, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct UserView {
        pub user_id: i64,
        pub username: String,
        pub name: String,
    }

    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct LoginResponse {
        pub user: UserView,
        pub token: String,
    }
}

pub mod deck {
    use crate::model::{Deck, DeckCounts, DeckId};
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct CreateDeckRequest {
        pub name: String,
    }

    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct RenameDeckRequest {
        pub name: String,
    }

    #[derive(Clone, Debug, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SetCurrentDeckRequest {
        pub deck_id: DeckId,
    }

    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct DeckResponse {
        pub id: DeckId,
        pub name: String,
    }

    impl DeckResponse {
        pub fn new(deck: &Deck) -> Self {
            Self {
                id: deck.id,
                name: deck.name.clone(),
            }
        }
    }

    /// Stats bucket names are capitalized on the wire, matching what the
    /// browser UI renders verbatim.
    #[derive(Clone, Copy, Debug, Deserialize, Serialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct DeckCountsView {
        pub new: u32,
        pub learning: u32,
        pub relearning: u32,
        pub young: u32,
        pub mature: u32,
        pub suspended: u32,
        pub buried: u32,
    }

    #[derive(Clone, Copy, Debug, Deserialize, Serialize)]
    pub struct DeckStatsResponse {
        pub counts: DeckCountsView,
        pub total: u32,
    }

    impl DeckStatsResponse {
        pub fn new(counts: &DeckCounts) -> Self {
            Self {
                counts: DeckCountsView {
                    new: counts.new,
                    learning: counts.learning,
                    relearning: counts.relearning,
                    young: counts.young,
                    mature: counts.mature,
                    suspended: counts.suspended,
                    buried: counts.buried,
                },
                total: counts.total(),
            }
        }
    }

    #[derive(Clone, Copy, Debug, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Pagination {
        pub page: u32,
        pub per_page: u32,
        pub total: i64,
        pub total_pages: i64,
    }

    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct DeckCardsResponse {
        pub cards: Vec<super::card::CardSummary>,
        pub pagination: Pagination,
    }

    #[derive(Clone, Debug, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct DeleteDeckResponse {
        pub message: String,
        pub deleted_cards: u32,
    }

    #[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CardPageQuery {
        pub page: Option<u32>,
        pub per_page: Option<u32>,
    }
}

pub mod card {
    use crate::model::{CardId, NoteId};
    use crate::repo::cards::CardListing;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct AddCardRequest {
        pub front: String,
        pub back: String,
    }

    #[derive(Clone, Debug, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AddCardResponse {
        pub note_id: NoteId,
        pub card_id: CardId,
    }

    #[derive(Clone, Debug, Deserialize, Serialize)]
    pub struct UpdateCardRequest {
        pub front: String,
        pub back: String,
    }

    #[derive(Clone, Debug, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CardContentResponse {
        pub card_id: CardId,
        pub front: String,
        pub back: String,
    }

    #[derive(Clone, Debug, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CardSummary {
        pub card_id: CardId,
        pub front: String,
        pub back: String,
        pub queue: i64,
    }

    impl CardSummary {
        pub fn new(listing: &CardListing) -> Self {
            Self {
                card_id: listing.card_id,
                front: listing.front.clone(),
                back: listing.back.clone(),
                queue: listing.queue as i64,
            }
        }
    }

    #[derive(Clone, Copy, Debug, Deserialize, Serialize)]
    pub struct SuccessResponse {
        pub success: bool,
    }
}

pub mod review {
    use crate::api::review::CardView;
    use crate::model::CardId;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ReviewCardResponse {
        pub card_id: CardId,
        pub front: String,
        pub back: String,
        pub queue: i64,
    }

    impl ReviewCardResponse {
        pub fn new(view: &CardView) -> Self {
            Self {
                card_id: view.card_id,
                front: view.front.clone(),
                back: view.back.clone(),
                queue: view.queue,
            }
        }
    }

    #[derive(Clone, Copy, Debug, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AnswerRequest {
        pub ease: u8,
        pub time_taken: i64,
    }
}
