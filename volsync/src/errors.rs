use std::path::PathBuf;

use thiserror::Error;
use volcontrol::ControlError;

/// Invalid playlist rules document.
#[derive(Error, Debug)]
pub enum RulesError {
    #[error("Cannot access rules file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed rules document: {0}")]
    Malformed(String),
    #[error("Playlist '{0}' is declared more than once")]
    DuplicatePlaylist(String),
    #[error("Playlist '{0}' has no pattern")]
    NoPatterns(String),
    #[error("Playlist '{0}' has an empty pattern")]
    EmptyPattern(String),
    #[error("Playlist name cannot be empty")]
    EmptyName,
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error(transparent)]
    Rules(#[from] RulesError),
    #[error("Cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode {0}")]
    Encode(String),
    #[error("Invalid rotation policy: {0}")]
    Rotation(String),
}

impl SyncError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
