use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("invalid collection name: {0}")]
    InvalidName(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("collection not found: {0}")]
    NoSuchCollection(String),

    #[error("document not found: {0}")]
    NoSuchDocument(String),

    #[error("no documents matched the query")]
    NoMatches,

    #[error("index already exists: {0}")]
    IndexExists(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DbError {
    /// Envelope code carried across the public boundary.
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::InvalidName(_) | Self::Validation(_) => 400,
            Self::NoSuchCollection(_) | Self::NoSuchDocument(_) | Self::NoMatches => 404,
            Self::IndexExists(_) => 409,
            Self::Io(_) | Self::Json(_) | Self::Internal(_) => 500,
        }
    }
}
