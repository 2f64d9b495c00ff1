use thiserror::Error;

/// Typed error surface for the migration engine core.
///
/// Every fallible engine operation returns this type directly rather than
/// `anyhow::Error`; the CLI layer (see `main.rs`) is the only place that
/// wraps an `EngineError` in `anyhow` context for display to the user.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bounds violation on `{field}`: {value} clamped to {clamped}")]
    BoundsViolation {
        field: String,
        value: String,
        clamped: String,
    },

    #[error("database error while running `{statement}`: {source}")]
    DbError {
        statement: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("version mismatch: {0}")]
    VersionMismatch(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::InvalidInput(format!("json error: {e}"))
    }
}

impl EngineError {
    pub fn db(statement: impl Into<String>, source: sqlx::Error) -> Self {
        EngineError::DbError {
            statement: statement.into(),
            source,
        }
    }

    /// True for the one error class the orchestrator treats as recoverable
    /// (logged as a warning, the operation still succeeds).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EngineError::BoundsViolation { .. })
    }
}
