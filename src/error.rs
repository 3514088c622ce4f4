use crate::properties::ParseError;

/// Result type of every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the signal generator drivers and their collaborators.
///
/// All of them are terminal for the current call: nothing is retried and no
/// partial output is produced.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("already initialized")]
    AlreadyInitialized,

    #[error("not initialized")]
    NotInitialized,

    #[error("missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("unsupported model '{0}'")]
    UnsupportedModel(String),

    #[error("out of range: {0}")]
    Range(String),

    #[error("no random source attached")]
    MissingRandomSource,

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("geometry lookup failed: {0}")]
    Geometry(String),

    #[error("unknown driver type '{0}'")]
    UnknownDriver(String),

    #[error("invalid configuration text:\n{0}")]
    Parse(#[from] ParseError),
}

impl Error {
    pub(crate) fn invalid_value(key: &str, reason: impl Into<String>) -> Self {
        Error::InvalidValue {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}
