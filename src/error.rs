use thiserror::Error;

use crate::OBS_NOT_READY;

/// Result type for obstools operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for obstools
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Missing or invalid connection settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// A request was answered with a failing request status
    #[error("Request failed with code {code}: {}", comment.as_deref().unwrap_or("no comment"))]
    Request {
        /// Status code reported by the remote application
        code: u16,
        /// Optional human readable explanation
        comment: Option<String>,
    },

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Websocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialize(String),

    /// A requested scene, game or input does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Trigger manager misuse
    #[error("Trigger error: {0}")]
    Trigger(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Numeric request status code, if this error came from a failed request
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Request { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the remote application rejected the request because it is still starting up
    pub fn is_not_ready(&self) -> bool {
        self.code() == Some(OBS_NOT_READY)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Deserialize(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Self::Other(err)
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Self {
        Self::Other(err.to_string())
    }
}
