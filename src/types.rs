use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Kind tag for a polymorphic party reference; only users exist today.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PartyKind {
    User,
}

impl PartyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartyKind::User => "user",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(PartyKind::User),
            _ => None,
        }
    }
}

/// Opaque sender/receiver reference; equality only.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartyRef {
    pub kind: PartyKind,
    pub id: i64,
}

impl PartyRef {
    pub fn user(id: i64) -> Self {
        Self {
            kind: PartyKind::User,
            id,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageState {
    #[default]
    Unsent,
    Queued,
    Sent,
}

impl MessageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageState::Unsent => "unsent",
            MessageState::Queued => "queued",
            MessageState::Sent => "sent",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "unsent" => Some(MessageState::Unsent),
            "queued" => Some(MessageState::Queued),
            "sent" => Some(MessageState::Sent),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum RecipientState {
    #[default]
    Unsent,
    Unread,
    Deleted,
}

impl RecipientState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientState::Unsent => "unsent",
            RecipientState::Unread => "unread",
            RecipientState::Deleted => "deleted",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "unsent" => Some(RecipientState::Unsent),
            "unread" => Some(RecipientState::Unread),
            "deleted" => Some(RecipientState::Deleted),
            _ => None,
        }
    }
}

/// Combined listings always run To, then Cc, then Bcc.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum RecipientKind {
    To,
    Cc,
    Bcc,
}

impl RecipientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientKind::To => "to",
            RecipientKind::Cc => "cc",
            RecipientKind::Bcc => "bcc",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "to" => Some(RecipientKind::To),
            "cc" => Some(RecipientKind::Cc),
            "bcc" => Some(RecipientKind::Bcc),
            _ => None,
        }
    }
}

/// Join record between a message and one receiver, with its own delivery
/// state so each copy can be read or deleted independently.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Recipient {
    pub id: Option<i64>,
    pub message_id: Option<i64>,
    pub receiver: PartyRef,
    pub kind: RecipientKind,
    pub state: RecipientState,
    pub hidden_at: Option<i64>,
    /// Insertion order within the recipient's kind.
    pub position: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// None until the store has assigned a row id.
    pub id: Option<i64>,
    pub sender: Option<PartyRef>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub state: MessageState,
    pub hidden_at: Option<i64>,
    pub deleted_at: Option<i64>,
    /// Thread parent; replies point at the message they answer.
    pub original_message_id: Option<i64>,
    pub recipients: Vec<Recipient>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl User {
    pub fn party(&self) -> PartyRef {
        PartyRef::user(self.id)
    }
}

pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}
