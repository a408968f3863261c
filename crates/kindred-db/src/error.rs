use std::fmt;

use kindred_types::error::ErrorKind;
use kindred_types::models::ConnectionRequest;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures of the connection graph and chat store.
///
/// Every variant except `Database` and `Internal` is a data-state violation
/// the caller caused; none of them are worth retrying.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cannot pair a user with themselves")]
    SelfReference,

    /// A request already exists for this pair, in either direction.
    #[error("a connection request already exists between these users")]
    Conflict(Box<ConnectionRequest>),

    #[error("username is already taken")]
    UsernameTaken,

    #[error("{0} not found")]
    NotFound(Entity),

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("malformed identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("{0}")]
    Internal(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SelfReference => ErrorKind::SelfReference,
            Self::Conflict(_) | Self::UsernameTaken => ErrorKind::Conflict,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::InvalidIdentifier(_) => ErrorKind::InvalidIdentifier,
            Self::InvalidMessage(_) => ErrorKind::InvalidMessage,
            Self::Database(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Request,
    Chat,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::Request => "connection request",
            Self::Chat => "chat",
        })
    }
}
