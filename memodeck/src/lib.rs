pub mod api;
pub mod clock;
pub mod collection;
pub mod config;
pub mod context;
pub mod model;
pub mod repo;
pub mod scheduler;
pub mod schema;
pub mod session;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Sqlx Error: {source}")]
    Sqlx { source: sqlx::Error },
    #[error("Io Error: {description}, {source}")]
    Io {
        description: String,
        source: std::io::Error,
    },
    #[error("Zip Error: {source}")]
    Zip { source: zip::result::ZipError },
    #[error(transparent)]
    #[diagnostic(transparent)]
    Library(#[from] LibraryError),
}

impl Error {
    pub fn is_integrity(&self) -> bool {
        matches!(self, Error::Library(LibraryError::Integrity(_)))
    }
}

// Note that `LibraryError` is `Clone` while `Error` is not. The `Display`
// strings of the kind enums are stable: clients switch on them.
#[derive(Clone, Debug, Diagnostic, Error)]
pub enum LibraryError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Deck(#[from] DeckErrorKind),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Card(#[from] CardErrorKind),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Scheduler(#[from] SchedulerErrorKind),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Session(#[from] SessionErrorKind),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Collection(#[from] CollectionErrorKind),
    #[error("{0}")]
    Validation(String),
    /// An on-disk invariant did not hold. Treated as fatal for the request;
    /// the owning session entry must be invalidated so the file is re-opened.
    #[error("Collection integrity violated: {0}")]
    Integrity(String),
}

#[derive(Clone, Debug, Diagnostic, Error)]
pub enum DeckErrorKind {
    #[error("Deck not found")]
    NotFound,
    #[error("A deck with this name already exists")]
    Duplicate,
    #[error("Deck name must not be empty")]
    EmptyName,
    #[error("The default deck cannot be deleted")]
    DefaultProtected,
}

#[derive(Clone, Debug, Diagnostic, Error)]
pub enum CardErrorKind {
    #[error("Card not found")]
    NotFound,
    #[error("Front and back must not be empty")]
    EmptyField,
    #[error("No card is currently under review")]
    NothingPending,
}

#[derive(Clone, Debug, Diagnostic, Error)]
pub enum SchedulerErrorKind {
    #[error("Invalid ease rating (must be 1..4)")]
    InvalidEase(u8),
    #[error("Invalid card state. Received `{0}`.")]
    InvalidState(i64),
}

#[derive(Clone, Debug, Diagnostic, Error)]
pub enum SessionErrorKind {
    #[error("Operation cancelled")]
    Cancelled,
    #[error("The collection is busy; try again")]
    Busy,
    #[error("Timed out waiting for the session to become idle")]
    EvictionTimeout,
    #[error("Failed to open the collection: {0}")]
    OpenFailed(String),
}

#[derive(Clone, Debug, Diagnostic, Error)]
pub enum CollectionErrorKind {
    #[error("Collection not found")]
    Missing,
    #[error("A collection already exists at this path")]
    AlreadyInitialized,
}
