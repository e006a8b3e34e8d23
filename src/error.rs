use std::sync::mpsc::TrySendError;

use google_logging2::api::WriteLogEntriesRequest;

/// Errors raised while encoding entries or handing them to a sink.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to read the 'default_labels' object from the JSON value, is it an object of strings? Parse error: {0}")]
    DefaultLabelsError(serde_json::Error),
    #[error("Failed to read the 'resource_labels' object from the JSON value, is it an object of strings? Parse error: {0}")]
    ResourceLabelsError(serde_json::Error),
    #[error("Failed to read the encoder configuration. Parse error: {0}")]
    ConfigError(serde_json::Error),
    /// A value could not be serialized through the reflection fallback
    #[error("Serde JSON serialization failed with context '{context}'. Error: {source}")]
    SerializeError {
        context: String,
        source: serde_json::Error,
    },
    /// A marshaler refused to encode itself
    #[error("{0}")]
    Marshal(String),
    #[error("the log entry payload is not a JSON object: {0}")]
    PayloadError(serde_json::Error),
    #[error("the sink channel is full, log entry dropped")]
    SinkFull,
    #[error("the sink channel is disconnected, log entry dropped")]
    SinkDisconnected,
    #[error("I/O error with context '{context}'. Error: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
    #[error("slog serializer error: {0}")]
    Slog(String),
}

impl Error {
    /// Creates the error a marshaler returns when it cannot encode itself.
    pub fn marshal(msg: impl Into<String>) -> Self {
        Self::Marshal(msg.into())
    }
}

impl From<TrySendError<WriteLogEntriesRequest>> for Error {
    fn from(err: TrySendError<WriteLogEntriesRequest>) -> Self {
        match err {
            TrySendError::Full(_) => Self::SinkFull,
            TrySendError::Disconnected(_) => Self::SinkDisconnected,
        }
    }
}

impl From<slog::Error> for Error {
    fn from(err: slog::Error) -> Self {
        Self::Slog(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
