use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Network failure, rejected credentials or an unusable response from the CRM.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// The query references an unknown object or field, or is not well formed.
    #[error("query syntax error: {0}")]
    QuerySyntax(String),

    #[error("malformed timestamp in `{field}`: {value:?}")]
    MalformedTimestamp { field: String, value: String },

    #[error("table has no column `{0}`")]
    MissingField(String),

    #[error("config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl Error {
    pub(crate) fn unavailable(context: &str, err: impl std::fmt::Display) -> Self {
        Error::SourceUnavailable(format!("{}: {}", context, err))
    }
}
