use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("Malformed record payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Ambiguous short ID. Did you mean one of these?")]
    AmbiguousId(Vec<(String, String)>), // Vec of (ID, Name)

    #[error("No realm is resolved for this session.")]
    RealmUnresolved,

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Change feed subscription failed: {0}")]
    Subscription(String),

    #[error("Cascading delete finished with {failed} of {total} step(s) failing: {first_error}")]
    PartialCascade {
        failed: usize,
        total: usize,
        first_error: String,
    },

    #[error("The live store writer has shut down.")]
    WriterClosed,
}
