use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControlError {
    // Another call already owns this reply slot
    #[error("A call is already waiting for reply '{0}'")]
    ReplyPending(String),
    #[error("Failed to decode {context}: {message}")]
    Decode { context: String, message: String },
    #[error("Transport Error: {0}")]
    Transport(String),
    #[error("Engine.IO protocol Error: {0}")]
    Protocol(String),
    #[error("{0} failed with HTTP status {1} and body: {2}")]
    HttpStatus(String, u16, String),
    #[error("HTTP Error: {0}")]
    Http(String),
    #[error("Transport is closed")]
    Closed,
}

impl ControlError {
    pub fn decode(context: &str, err: impl std::fmt::Display) -> Self {
        ControlError::Decode {
            context: context.to_string(),
            message: err.to_string(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        ControlError::Transport(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        ControlError::Protocol(message.into())
    }

    /// True for failures that say nothing about the payload itself
    /// (network, HTTP status, closed transport).
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            ControlError::Transport(_)
                | ControlError::HttpStatus(..)
                | ControlError::Http(_)
                | ControlError::Closed
        )
    }
}

pub type Result<T> = std::result::Result<T, ControlError>;
