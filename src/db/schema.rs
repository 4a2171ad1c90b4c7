//! Database schema and types

pub use crate::state_machine::FlowState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS chat_sessions (
    id TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL,
    intent TEXT,
    step TEXT,
    state_data TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chat_sessions_user ON chat_sessions(user_id, updated_at DESC);

CREATE TABLE IF NOT EXISTS chat_messages (
    message_id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    sequence_id INTEGER NOT NULL,
    sender TEXT NOT NULL,
    content TEXT NOT NULL,
    metadata TEXT,
    created_at TEXT NOT NULL,

    FOREIGN KEY (session_id) REFERENCES chat_sessions(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_chat_messages_session ON chat_messages(session_id, sequence_id);
";

/// Chat session record
///
/// `step` and `state` only mean something relative to `intent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub user_id: i64,
    pub intent: Option<String>,
    pub step: Option<String>,
    pub state: Option<FlowState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Flow position written back after each turn
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionFlow {
    pub intent: Option<String>,
    pub step: Option<String>,
    pub state: Option<FlowState>,
}

impl SessionFlow {
    pub fn cleared() -> Self {
        Self::default()
    }
}

impl From<&ChatSession> for SessionFlow {
    fn from(session: &ChatSession) -> Self {
        Self {
            intent: session.intent.clone(),
            step: session.step.clone(),
            state: session.state.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Assistant,
    System,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Assistant => write!(f, "assistant"),
            Sender::System => write!(f, "system"),
        }
    }
}

/// Message about to be stored; the database assigns sequence and timestamp
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub message_id: String,
    pub sender: Sender,
    pub content: String,
    pub metadata: Value,
}

/// Message record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "id")]
    pub message_id: String,
    pub session_id: String,
    pub sequence_id: i64,
    pub sender: Sender,
    pub content: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}
