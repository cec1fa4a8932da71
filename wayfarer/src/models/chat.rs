use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::GeneratedItinerary;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Active,
    Closed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "closed" => Ok(Self::Closed),
            _ => Err(format!("Unknown session status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(format!("Unknown message role: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Response,
    ModificationRequest,
    Clarification,
    Error,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Response => write!(f, "response"),
            Self::ModificationRequest => write!(f, "modification_request"),
            Self::Clarification => write!(f, "clarification"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "response" => Ok(Self::Response),
            "modification_request" => Ok(Self::ModificationRequest),
            "clarification" => Ok(Self::Clarification),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown message type: {s}")),
        }
    }
}

/// A single entry of a session's conversation history. Never mutated once
/// appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub message_type: MessageType,
}

impl ConversationMessage {
    pub fn new(role: MessageRole, content: impl Into<String>, message_type: MessageType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            message_type,
        }
    }

    pub fn user(content: impl Into<String>, message_type: MessageType) -> Self {
        Self::new(MessageRole::User, content, message_type)
    }

    pub fn assistant(content: impl Into<String>, message_type: MessageType) -> Self {
        Self::new(MessageRole::Assistant, content, message_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatSession {
    pub id: String,
    pub user_id: String,
    pub profile_id: Option<String>,
    pub city_name: String,
    pub conversation_history: Vec<ConversationMessage>,
    pub current_itinerary: Option<GeneratedItinerary>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Longest expiry horizon a session can be given.
pub fn max_session_ttl() -> Duration {
    Duration::days(36_500)
}

fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    now.checked_add_signed(ttl.min(max_session_ttl()))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl ChatSession {
    pub fn new(
        user_id: impl Into<String>,
        profile_id: Option<String>,
        city_name: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            profile_id,
            city_name: city_name.into(),
            conversation_history: Vec::new(),
            current_itinerary: None,
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
            expires_at: expiry_after(now, ttl),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Active and not yet past its expiry.
    pub fn accepts_turns(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Active && !self.is_expired(now)
    }

    /// Closes the session if it is active but past its expiry. Returns whether
    /// the status changed.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == SessionStatus::Active && self.is_expired(now) {
            self.status = SessionStatus::Closed;
            self.updated_at = now;
            return true;
        }
        false
    }

    /// Bumps `updated_at` and slides `expires_at` forward by `ttl`.
    pub fn touch(&mut self, ttl: Duration) {
        let now = Utc::now();
        self.updated_at = now;
        self.expires_at = expiry_after(now, ttl);
    }

    pub fn push_message(&mut self, message: ConversationMessage) {
        self.conversation_history.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_active() {
        let session = ChatSession::new("user-1", None, "Lisbon", Duration::hours(1));
        assert_eq!(session.status, SessionStatus::Active);
        assert!(session.accepts_turns(Utc::now()));
        assert!(session.conversation_history.is_empty());
    }

    #[test]
    fn test_expire_if_due_closes_lazily() {
        let mut session = ChatSession::new("user-1", None, "Lisbon", Duration::hours(1));
        session.expires_at = Utc::now() - Duration::seconds(5);

        assert!(!session.accepts_turns(Utc::now()));
        assert!(session.expire_if_due(Utc::now()));
        assert_eq!(session.status, SessionStatus::Closed);
        assert!(!session.expire_if_due(Utc::now()));
    }

    #[test]
    fn test_touch_slides_expiry() {
        let mut session = ChatSession::new("user-1", None, "Lisbon", Duration::seconds(10));
        let before = session.expires_at;
        std::thread::sleep(std::time::Duration::from_millis(5));
        session.touch(Duration::hours(2));
        assert!(session.expires_at > before);
        assert!(session.updated_at >= session.created_at);
    }

    #[test]
    fn test_huge_ttl_is_capped() {
        let huge = Duration::seconds(i64::MAX / 1000);
        let mut session = ChatSession::new("user-1", None, "Lisbon", huge);
        assert!(session.expires_at <= Utc::now() + max_session_ttl());
        assert!(session.accepts_turns(Utc::now()));

        session.touch(huge);
        assert!(session.expires_at > session.updated_at + Duration::days(365));
        assert!(session.expires_at <= session.updated_at + max_session_ttl());
    }

    #[test]
    fn test_message_type_serializes_snake_case() {
        let msg = ConversationMessage::user("hi", MessageType::ModificationRequest);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["message_type"], "modification_request");
        assert_eq!(json["role"], "user");
    }
}
