//! Error types for the agent.
//!
//! Leaf-level dispatch failures are deliberately NOT represented here — they
//! are data (`dispatch::outcome::DispatchOutcome` nodes), so a failed comment
//! never aborts its sibling tasks. Only cycle-level faults live in this file.

/// Top-level error type for the agent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Registry-feed acquisition errors.
///
/// Any of these aborts the current acquisition step without advancing the
/// resume timestamp; the next cycle retries from the same anchor.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Feed request failed: {0}")]
    Request(String),

    #[error("Feed returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Authentication rejected by the feed")]
    AuthRejected,

    #[error("Malformed feed response: {0}")]
    MalformedResponse(String),

    #[error("Пустое сообщение.")]
    EmptyPayload,
}

/// Bulletin content that cannot be parsed at all.
///
/// Terminal for the bulletin: the raw error text is recorded as its
/// diagnostic and the bulletin is never retried.
#[derive(Debug, thiserror::Error)]
#[error("Unparseable bulletin content: {0}")]
pub struct ParseError(pub String);

/// Result type alias for the agent.
pub type Result<T> = std::result::Result<T, Error>;
