use thiserror::Error;

/// Error taxonomy for the engine.
///
/// `InvalidInput` is a client-input failure: reported synchronously, no
/// state mutated. `Database` is a retryable upstream/data failure; the
/// previous mirror snapshot keeps serving reads.
#[derive(Error, Debug)]
pub enum CurioError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] curio_model::ModelError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("catalog refresh already in progress")]
    RefreshInProgress,
}

impl CurioError {
    /// Whether a retry may succeed without the caller changing anything.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CurioError::Database(_) | CurioError::RefreshInProgress)
    }
}

pub type Result<T> = std::result::Result<T, CurioError>;
