use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle status of a connection request.
///
/// `Interested` is the only open state. Cancellation is not a status: a
/// cancelled request is deleted so the pair can be requested again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Interested,
    Ignored,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interested => "interested",
            Self::Ignored => "ignored",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    /// Transition table for a stored request.
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        match (self, next) {
            (Self::Interested, Self::Accepted | Self::Rejected) => true,
            (Self::Interested, Self::Interested | Self::Ignored) => false,
            (Self::Ignored | Self::Accepted | Self::Rejected, _) => false,
        }
    }

    /// Only the sender of a still-open request may withdraw it.
    pub fn can_cancel(&self) -> bool {
        matches!(self, Self::Interested)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for RequestStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interested" => Ok(Self::Interested),
            "ignored" => Ok(Self::Ignored),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Status a sender may open a request with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestIntent {
    Interested,
    Ignored,
}

impl From<RequestIntent> for RequestStatus {
    fn from(intent: RequestIntent) -> Self {
        match intent {
            RequestIntent::Interested => Self::Interested,
            RequestIntent::Ignored => Self::Ignored,
        }
    }
}

impl FromStr for RequestIntent {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<RequestStatus>()? {
            RequestStatus::Interested => Ok(Self::Interested),
            RequestStatus::Ignored => Ok(Self::Ignored),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Decision a receiver may apply to an open request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Accepted,
    Rejected,
}

impl From<ReviewDecision> for RequestStatus {
    fn from(decision: ReviewDecision) -> Self {
        match decision {
            ReviewDecision::Accepted => Self::Accepted,
            ReviewDecision::Rejected => Self::Rejected,
        }
    }
}

impl FromStr for ReviewDecision {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<RequestStatus>()? {
            RequestStatus::Accepted => Ok(Self::Accepted),
            RequestStatus::Rejected => Ok(Self::Rejected),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    pub id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persistent two-party conversation. Participants are stored in
/// canonical (ascending) order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: Uuid,
    pub participants: [Uuid; 2],
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }

    /// The other participant, or `None` if `user_id` is not in this chat.
    pub fn peer_of(&self, user_id: Uuid) -> Option<Uuid> {
        match self.participants {
            [a, b] if a == user_id => Some(b),
            [a, b] if b == user_id => Some(a),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender: Uuid,
    pub text: String,
    pub seen_by: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    /// Last change to the message, i.e. its latest read receipt.
    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn is_unread_for(&self, user_id: Uuid) -> bool {
        self.sender != user_id && !self.seen_by.contains(&user_id)
    }
}

/// One row of a user's chat list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub chat_id: Uuid,
    pub peer: Peer,
    pub last_message: Option<Message>,
    pub unread_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Peer {
    pub id: Uuid,
    pub username: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [RequestStatus; 4] = [
        RequestStatus::Interested,
        RequestStatus::Ignored,
        RequestStatus::Accepted,
        RequestStatus::Rejected,
    ];

    #[test]
    fn only_interested_has_outgoing_transitions() {
        for from in ALL {
            for to in ALL {
                let allowed = from.can_transition_to(to);
                let expected = from == RequestStatus::Interested
                    && matches!(to, RequestStatus::Accepted | RequestStatus::Rejected);
                assert_eq!(allowed, expected, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn terminal_statuses_cannot_be_cancelled() {
        assert!(RequestStatus::Interested.can_cancel());
        assert!(!RequestStatus::Ignored.can_cancel());
        assert!(!RequestStatus::Accepted.can_cancel());
        assert!(!RequestStatus::Rejected.can_cancel());
    }

    #[test]
    fn intent_and_decision_reject_foreign_statuses() {
        assert_eq!("ignored".parse::<RequestIntent>(), Ok(RequestIntent::Ignored));
        assert!("accepted".parse::<RequestIntent>().is_err());
        assert_eq!("rejected".parse::<ReviewDecision>(), Ok(ReviewDecision::Rejected));
        assert!("interested".parse::<ReviewDecision>().is_err());
        assert!("maybe".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn peer_of_returns_other_participant() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let chat = Chat {
            id: Uuid::new_v4(),
            participants: [a, b],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(chat.peer_of(a), Some(b));
        assert_eq!(chat.peer_of(b), Some(a));
        assert_eq!(chat.peer_of(Uuid::new_v4()), None);
    }
}
