use serde::{Deserialize, Serialize};

/// Error kinds shared by the HTTP layer and the WebSocket gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    SelfReference,
    Conflict,
    NotFound,
    Forbidden,
    InvalidIdentifier,
    InvalidMessage,
    Unauthorized,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelfReference => "SELF_REFERENCE",
            Self::Conflict => "CONFLICT",
            Self::NotFound => "NOT_FOUND",
            Self::Forbidden => "FORBIDDEN",
            Self::InvalidIdentifier => "INVALID_IDENTIFIER",
            Self::InvalidMessage => "INVALID_MESSAGE",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Internal => "INTERNAL",
        }
    }
}
