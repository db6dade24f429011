//! Realtime hub error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    /// The registry actor has stopped
    #[error("Realtime hub is closed")]
    Closed,

    /// The client is not (or no longer) registered
    #[error("Client {0} is not connected")]
    ClientGone(uuid::Uuid),

    /// Writing to a client transport failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// An event could not be encoded
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl HubError {
    pub fn code(&self) -> &'static str {
        match self {
            HubError::Closed => "HUB_CLOSED",
            HubError::ClientGone(_) => "CLIENT_GONE",
            HubError::Transport(_) | HubError::Encode(_) => "INTERNAL_ERROR",
        }
    }

    pub fn client_message(&self) -> String {
        match self {
            HubError::Closed => self.to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

pub type HubResult<T> = Result<T, HubError>;
