use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("invalid filter value for `{field}`: {reason}")]
    InvalidFilterValue { field: String, reason: String },

    #[error("unknown entity kind: {0}")]
    UnknownEntityKind(String),

    #[error("invalid page request: {0}")]
    InvalidPage(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
