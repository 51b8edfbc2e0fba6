use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Generative service error: {0}")]
    Generative(#[from] GenerativeError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Schema validation error: {0}")]
    Schema(String),

    #[error("Database corruption detected: {0}")]
    Corruption(String),

    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),

    #[error("Predicate construction error: {0}")]
    Predicate(String),
}

#[derive(Error, Debug)]
pub enum GenerativeError {
    #[error("Generative call timed out")]
    Timeout,

    #[error("Generative service returned empty text")]
    EmptyCompletion,

    #[error("Generative service failure: {0}")]
    Service(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
