//! Chat request/response DTOs for the v1 API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    ChatSession, ConversationMessage, GeneratedItinerary, Location, MessageRole, MessageType,
    SessionStatus,
};
use crate::services::{ChatTurnResult, ContinueChatRequest, StartChatRequest};

// ---------------------------------------------------------------------------
// Request DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LocationDto {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<LocationDto> for Location {
    fn from(dto: LocationDto) -> Self {
        Location::new(dto.latitude, dto.longitude)
    }
}

/// Request body for `POST /v1/chat/sessions` and its streaming variant.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartChatBody {
    pub user_id: String,
    pub profile_id: Option<String>,
    pub city_name: String,
    pub message: String,
    /// Enables distance-aware recommendations.
    pub location: Option<LocationDto>,
    #[serde(default)]
    pub preferences: Vec<String>,
}

impl From<StartChatBody> for StartChatRequest {
    fn from(body: StartChatBody) -> Self {
        StartChatRequest {
            user_id: body.user_id,
            profile_id: body.profile_id,
            city_name: body.city_name,
            message: body.message,
            location: body.location.map(Into::into),
            preferences: body.preferences,
        }
    }
}

/// Request body for `POST /v1/chat/sessions/{sessionId}/messages`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueChatBody {
    pub message: String,
    pub location: Option<LocationDto>,
}

impl ContinueChatBody {
    pub fn into_request(self, session_id: String) -> ContinueChatRequest {
        ContinueChatRequest {
            session_id,
            message: self.message,
            location: self.location.map(Into::into),
        }
    }
}

// ---------------------------------------------------------------------------
// Response DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurnResponse {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub itinerary: Option<GeneratedItinerary>,
}

impl From<ChatTurnResult> for ChatTurnResponse {
    fn from(result: ChatTurnResult) -> Self {
        Self {
            session_id: result.session_id,
            message: result.message,
            itinerary: result.itinerary,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
}

impl From<ConversationMessage> for MessageResponse {
    fn from(message: ConversationMessage) -> Self {
        Self {
            id: message.id,
            role: message.role,
            content: message.content,
            message_type: message.message_type,
            timestamp: message.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    pub city_name: String,
    pub status: SessionStatus,
    pub conversation_history: Vec<MessageResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_itinerary: Option<GeneratedItinerary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<ChatSession> for SessionResponse {
    fn from(session: ChatSession) -> Self {
        Self {
            id: session.id,
            user_id: session.user_id,
            profile_id: session.profile_id,
            city_name: session.city_name,
            status: session.status,
            conversation_history: session
                .conversation_history
                .into_iter()
                .map(MessageResponse::from)
                .collect(),
            current_itinerary: session.current_itinerary,
            created_at: session.created_at,
            updated_at: session.updated_at,
            expires_at: session.expires_at,
        }
    }
}
