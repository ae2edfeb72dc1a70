//! Row and domain types matching the on-disk Anki v11 layout. These must stay
//! in lockstep with the DDL in [`crate::collection::ddl`]; the column types
//! follow <https://docs.rs/sqlx/latest/sqlx/sqlite/types/index.html>.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub type DeckId = i64;
pub type NoteId = i64;
pub type CardId = i64;
pub type ModelId = i64;
pub type EpochMillis = i64;

/// Deck 1 always exists and acts as the catch-all; it cannot be deleted.
pub const DEFAULT_DECK_ID: DeckId = 1;
/// The single fixed Basic (front/back) note type every note uses.
pub const BASIC_MODEL_ID: ModelId = 1_607_392_319;
/// Anki joins note fields with the ASCII unit separator.
pub const FIELD_SEPARATOR: char = '\u{1f}';
/// Review cards at or above this interval count as mature.
pub const MATURE_IVL_DAYS: i64 = 21;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize, sqlx::Type)]
#[repr(i64)]
pub enum CardType {
    New = 0,
    Learning = 1,
    Review = 2,
    Relearning = 3,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize, sqlx::Type)]
#[repr(i64)]
pub enum CardQueue {
    SchedulerBuried = -3,
    UserBuried = -2,
    Suspended = -1,
    New = 0,
    Learning = 1,
    Review = 2,
    DayLearning = 3,
    Preview = 4,
}

#[derive(Clone, Debug, Deserialize, FromRow, Serialize)]
pub struct Card {
    pub id: CardId,
    pub nid: NoteId,
    pub did: DeckId,
    pub ord: i64,
    /// Seconds of the last modification (`cards.mod`).
    #[sqlx(rename = "mod")]
    #[serde(rename = "mod")]
    pub mtime_secs: i64,
    pub usn: i64,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: CardType,
    pub queue: CardQueue,
    /// Days since `col.crt` for review cards, Unix seconds while learning,
    /// insertion position while new.
    pub due: i64,
    pub ivl: i64,
    /// Ease factor times 1000; 0 until the card graduates.
    pub factor: i64,
    pub reps: i64,
    pub lapses: i64,
    /// Packed remaining learning steps (`today*1000 + total`).
    pub left: i64,
    pub odue: i64,
    pub odid: i64,
    pub flags: i64,
    pub data: String,
}

#[derive(Clone, Debug, Deserialize, FromRow, Serialize)]
pub struct Note {
    pub id: NoteId,
    pub guid: String,
    pub mid: ModelId,
    #[sqlx(rename = "mod")]
    #[serde(rename = "mod")]
    pub mtime_secs: i64,
    pub usn: i64,
    /// Space-delimited.
    pub tags: String,
    /// Fields joined by [`FIELD_SEPARATOR`].
    pub flds: String,
    /// Sort field: the substring of `flds` before the first separator.
    pub sfld: String,
    /// First 4 bytes of the SHA-1 of the sort field, as an integer.
    pub csum: i64,
    pub flags: i64,
    pub data: String,
}

impl Note {
    pub fn fields(&self) -> Vec<&str> {
        self.flds.split(FIELD_SEPARATOR).collect()
    }
}

/// One row of the append-only review log.
#[derive(Clone, Debug, Deserialize, Eq, FromRow, PartialEq, Serialize)]
pub struct RevlogEntry {
    /// Milliseconds of the review; strictly monotonic per card.
    pub id: EpochMillis,
    pub cid: CardId,
    pub usn: i64,
    /// 1 Again, 2 Hard, 3 Good, 4 Easy.
    pub ease: i64,
    /// Interval after the review.
    pub ivl: i64,
    #[sqlx(rename = "lastIvl")]
    #[serde(rename = "lastIvl")]
    pub last_ivl: i64,
    pub factor: i64,
    /// How long the answer took, in milliseconds.
    pub time: i64,
    /// 0 learn, 1 review, 2 relearn.
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: i64,
}

/// Tombstone kinds in `graves.type`.
pub const GRAVE_CARD: i64 = 0;
pub const GRAVE_NOTE: i64 = 1;
pub const GRAVE_DECK: i64 = 2;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Deck {
    pub id: DeckId,
    pub name: String,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct DeckCounts {
    pub new: u32,
    pub learning: u32,
    pub relearning: u32,
    pub young: u32,
    pub mature: u32,
    pub suspended: u32,
    pub buried: u32,
}

impl DeckCounts {
    pub fn total(&self) -> u32 {
        self.new
            + self.learning
            + self.relearning
            + self.young
            + self.mature
            + self.suspended
            + self.buried
    }
}

/// What the scheduler decided for an answered card. Applying it to the card
/// row and appending the matching revlog entry happen in one transaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReviewOutcome {
    pub kind: CardType,
    pub queue: CardQueue,
    pub due: i64,
    pub ivl: i64,
    pub factor: i64,
    pub left: i64,
    pub lapses_delta: i64,
}
