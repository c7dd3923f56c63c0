use thiserror::Error;

/// Errors returned by microtime decoders.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MicrotimeError {
    /// The payload is not a JSON string where one is required.
    #[error("{0}")]
    MalformedJson(String),

    #[error("{0}")]
    InvalidDuration(String),

    /// No known layout matched the input. `reason` carries the parser detail.
    #[error("Could not find format for {input:?}")]
    UnparseableTimestamp { input: String, reason: String },

    #[error("This date has ambiguous mm/dd vs dd/mm type format: {0:?}")]
    AmbiguousTimestamp(String),

    #[error("cache scan: invalid time: {0}")]
    InvalidTimestamp(String),

    #[error("microtime: cannot convert value '{value}({type_name})' to microtime")]
    UnsupportedSourceType { value: String, type_name: &'static str },
}

impl MicrotimeError {
    pub(crate) fn unparseable(input: &str, reason: impl Into<String>) -> Self {
        Self::UnparseableTimestamp {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for microtime operations.
pub type Result<T> = std::result::Result<T, MicrotimeError>;
