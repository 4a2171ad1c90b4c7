//! API request and response types

use crate::db::{ChatSession, Message};
use crate::state_machine::ChatContext;
use crate::studio::UserId;
use serde::{Deserialize, Serialize};

/// Request to open a new session
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub user_id: UserId,
}

/// Caller identity for reading a session
#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub user_id: UserId,
}

/// Request to post a chat message
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub user_id: UserId,
    pub message: String,
    #[serde(default)]
    pub context: Option<ChatContext>,
}

/// Response with a single session
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session: ChatSession,
}

/// Response with a session and its history
#[derive(Debug, Serialize)]
pub struct SessionWithMessagesResponse {
    pub session: ChatSession,
    pub messages: Vec<Message>,
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
