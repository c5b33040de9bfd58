use shared::error::ProtocolError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Failure to establish, identify, or keep the connection to the mixer.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("invalid websocket url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("failed to connect websocket {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: Box<tungstenite::Error>,
    },
    #[error("websocket transport failed: {0}")]
    Transport(#[from] Box<tungstenite::Error>),
    #[error("connection closed by remote")]
    Closed,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl From<tungstenite::Error> for ConnectionError {
    fn from(value: tungstenite::Error) -> Self {
        match value {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Self::Closed
            }
            other => Self::Transport(Box::new(other)),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    /// Well-formed remote rejection; code and comment are passed through unchanged.
    #[error("request {request_type} failed (code={code:?}, comment={comment})")]
    Request {
        request_type: String,
        code: Option<i64>,
        comment: String,
    },
    /// A lookup the caller cannot proceed without came back empty.
    #[error("{0}")]
    Resolution(String),
    #[error("unexpected response payload for {request_type}: {source}")]
    Decode {
        request_type: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ClientError {
    pub fn resolution(message: impl Into<String>) -> Self {
        Self::Resolution(message.into())
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
