//! Database module for Robbie
//!
//! Provides persistence for chat sessions and their messages.

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_migrations(&self) -> DbResult<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Session Operations ====================

    /// Create a new session with no flow in progress
    pub fn create_session(&self, id: &str, user_id: i64) -> DbResult<ChatSession> {
        let conn = self.conn();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO chat_sessions (id, user_id, intent, step, state_data, created_at, updated_at)
             VALUES (?1, ?2, NULL, NULL, NULL, ?3, ?3)",
            params![id, user_id, now.to_rfc3339()],
        )?;

        Ok(ChatSession {
            id: id.to_string(),
            user_id,
            intent: None,
            step: None,
            state: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get session by ID
    pub fn get_session(&self, id: &str) -> DbResult<ChatSession> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, intent, step, state_data, created_at, updated_at
             FROM chat_sessions WHERE id = ?1",
        )?;

        stmt.query_row(params![id], |row| {
            let state_json: Option<String> = row.get(4)?;
            Ok(ChatSession {
                id: row.get(0)?,
                user_id: row.get(1)?,
                intent: row.get(2)?,
                step: row.get(3)?,
                state: state_json
                    .filter(|s| !s.is_empty())
                    .and_then(|s| serde_json::from_str(&s).ok()),
                created_at: parse_datetime(&row.get::<_, String>(5)?),
                updated_at: parse_datetime(&row.get::<_, String>(6)?),
            })
        })
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::SessionNotFound(id.to_string()),
            other => DbError::Sqlite(other),
        })
    }

    /// Get a session only when `user_id` owns it
    ///
    /// Someone else's session reads as missing so its id leaks nothing.
    pub fn get_owned_session(&self, id: &str, user_id: i64) -> DbResult<ChatSession> {
        let session = self.get_session(id)?;
        if session.user_id != user_id {
            return Err(DbError::SessionNotFound(id.to_string()));
        }
        Ok(session)
    }

    /// Get a session owned by `user_id`, creating it when missing
    pub fn get_or_create_session(&self, id: &str, user_id: i64) -> DbResult<ChatSession> {
        match self.get_owned_session(id, user_id) {
            Err(DbError::SessionNotFound(_)) if !self.session_exists(id)? => {
                self.create_session(id, user_id)
            }
            other => other,
        }
    }

    fn session_exists(&self, id: &str) -> DbResult<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM chat_sessions WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Persist intent, step and flow state together
    #[allow(dead_code)] // Used in tests
    pub fn update_session_flow(&self, id: &str, flow: &SessionFlow) -> DbResult<()> {
        write_session_flow(&self.conn(), id, flow)
    }

    // ==================== Message Operations ====================

    /// Append a message to a session
    pub fn add_message(
        &self,
        message_id: &str,
        session_id: &str,
        sender: Sender,
        content: &str,
        metadata: &serde_json::Value,
    ) -> DbResult<Message> {
        let message = NewMessage {
            message_id: message_id.to_string(),
            sender,
            content: content.to_string(),
            metadata: metadata.clone(),
        };
        insert_message(&self.conn(), session_id, &message)
    }

    /// Store a turn's replies and the session's new flow position atomically
    ///
    /// Either every reply lands together with the flow update, or nothing does.
    pub fn append_reply(
        &self,
        session_id: &str,
        replies: &[NewMessage],
        flow: &SessionFlow,
    ) -> DbResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        for reply in replies {
            insert_message(&tx, session_id, reply)?;
        }
        write_session_flow(&tx, session_id, flow)?;
        tx.commit()?;
        Ok(())
    }

    /// Get all messages for a session in sequence order
    pub fn get_messages(&self, session_id: &str) -> DbResult<Vec<Message>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT message_id, session_id, sequence_id, sender, content, metadata, created_at
             FROM chat_messages WHERE session_id = ?1 ORDER BY sequence_id ASC",
        )?;

        let messages = stmt
            .query_map(params![session_id], parse_message_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }
}

fn write_session_flow(conn: &Connection, id: &str, flow: &SessionFlow) -> DbResult<()> {
    let state_json = flow.state.as_ref().map(serde_json::to_string).transpose()?;
    let updated = conn.execute(
        "UPDATE chat_sessions SET intent = ?1, step = ?2, state_data = ?3, updated_at = ?4 WHERE id = ?5",
        params![
            flow.intent,
            flow.step,
            state_json,
            Utc::now().to_rfc3339(),
            id
        ],
    )?;
    if updated == 0 {
        return Err(DbError::SessionNotFound(id.to_string()));
    }
    Ok(())
}

fn insert_message(conn: &Connection, session_id: &str, message: &NewMessage) -> DbResult<Message> {
    let now = Utc::now();

    // Get next sequence ID
    let sequence_id: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sequence_id), 0) + 1 FROM chat_messages WHERE session_id = ?1",
        params![session_id],
        |row| row.get(0),
    )?;

    let metadata_str = serde_json::to_string(&message.metadata)?;

    conn.execute(
        "INSERT INTO chat_messages (message_id, session_id, sequence_id, sender, content, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            message.message_id,
            session_id,
            sequence_id,
            message.sender.to_string(),
            message.content,
            metadata_str,
            now.to_rfc3339(),
        ],
    )?;

    // Update session timestamp
    conn.execute(
        "UPDATE chat_sessions SET updated_at = ?1 WHERE id = ?2",
        params![now.to_rfc3339(), session_id],
    )?;

    Ok(Message {
        message_id: message.message_id.clone(),
        session_id: session_id.to_string(),
        sequence_id,
        sender: message.sender,
        content: message.content.clone(),
        metadata: message.metadata.clone(),
        created_at: now,
    })
}

fn parse_message_row(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    let sender_str: String = row.get(3)?;
    let metadata: Option<String> = row.get(5)?;
    Ok(Message {
        message_id: row.get(0)?,
        session_id: row.get(1)?,
        sequence_id: row.get(2)?,
        sender: parse_sender(&sender_str),
        content: row.get(4)?,
        metadata: metadata
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or(serde_json::Value::Null),
        created_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

fn parse_sender(s: &str) -> Sender {
    match s {
        "user" => Sender::User,
        "assistant" => Sender::Assistant,
        _ => Sender::System,
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::{BookShootData, BookShootStep};
    use crate::state_machine::Progress;
    use serde_json::json;

    #[test]
    fn test_create_and_get_session() {
        let db = Database::open_in_memory().unwrap();
        db.create_session("s-1", 7).unwrap();

        let session = db.get_session("s-1").unwrap();
        assert_eq!(session.user_id, 7);
        assert!(session.intent.is_none());
        assert!(session.step.is_none());
        assert!(session.state.is_none());
    }

    #[test]
    fn test_missing_session_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.get_session("nope"),
            Err(DbError::SessionNotFound(id)) if id == "nope"
        ));
        let created = db.get_or_create_session("nope", 3).unwrap();
        assert_eq!(created.user_id, 3);
    }

    #[test]
    fn test_flow_state_round_trip() {
        let db = Database::open_in_memory().unwrap();
        db.create_session("s-1", 1).unwrap();

        let state = FlowState::BookShoot(Progress {
            step: BookShootStep::AskDate,
            data: BookShootData {
                property_label: Some("123 Main St, Austin, TX".to_string()),
                ..BookShootData::default()
            },
        });
        let flow = SessionFlow {
            intent: Some("book_shoot".to_string()),
            step: Some("ask_date".to_string()),
            state: Some(state.clone()),
        };
        db.update_session_flow("s-1", &flow).unwrap();

        let session = db.get_session("s-1").unwrap();
        assert_eq!(SessionFlow::from(&session), flow);

        db.update_session_flow("s-1", &SessionFlow::cleared()).unwrap();
        let session = db.get_session("s-1").unwrap();
        assert!(session.intent.is_none());
        assert!(session.state.is_none());
    }

    #[test]
    fn test_update_unknown_session_fails() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.update_session_flow("ghost", &SessionFlow::cleared()),
            Err(DbError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_message_sequence_is_per_session() {
        let db = Database::open_in_memory().unwrap();
        db.create_session("a", 1).unwrap();
        db.create_session("b", 1).unwrap();

        db.add_message("m1", "a", Sender::User, "hello", &json!({}))
            .unwrap();
        db.add_message("m2", "a", Sender::Assistant, "hi there", &json!({"step": "menu"}))
            .unwrap();
        let other = db
            .add_message("m3", "b", Sender::User, "book a shoot", &json!({}))
            .unwrap();
        assert_eq!(other.sequence_id, 1);

        let messages = db.get_messages("a").unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sequence_id, 1);
        assert_eq!(messages[1].sequence_id, 2);
        assert_eq!(messages[1].sender, Sender::Assistant);
        assert_eq!(messages[1].metadata["step"], "menu");
    }

    #[test]
    fn test_sessions_are_scoped_to_their_owner() {
        let db = Database::open_in_memory().unwrap();
        db.create_session("s-1", 1).unwrap();

        assert_eq!(db.get_owned_session("s-1", 1).unwrap().user_id, 1);
        assert!(matches!(
            db.get_owned_session("s-1", 2),
            Err(DbError::SessionNotFound(_))
        ));
        // Another user's id is never taken over or recreated
        assert!(matches!(
            db.get_or_create_session("s-1", 2),
            Err(DbError::SessionNotFound(_))
        ));
        assert_eq!(db.get_session("s-1").unwrap().user_id, 1);
    }

    #[test]
    fn test_append_reply_writes_messages_and_flow_together() {
        let db = Database::open_in_memory().unwrap();
        db.create_session("s-1", 1).unwrap();
        let replies = vec![
            NewMessage {
                message_id: "r1".to_string(),
                sender: Sender::Assistant,
                content: "Which property?".to_string(),
                metadata: json!({"step": "ask_property"}),
            },
            NewMessage {
                message_id: "r2".to_string(),
                sender: Sender::Assistant,
                content: "Or type a new address.".to_string(),
                metadata: json!({}),
            },
        ];
        let flow = SessionFlow {
            intent: Some("book_shoot".to_string()),
            step: Some("ask_property".to_string()),
            state: None,
        };
        db.append_reply("s-1", &replies, &flow).unwrap();

        let messages = db.get_messages("s-1").unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].sequence_id, 2);
        assert_eq!(db.get_session("s-1").unwrap().step.as_deref(), Some("ask_property"));
    }

    #[test]
    fn test_append_reply_rolls_back_when_flow_update_fails() {
        let db = Database::open_in_memory().unwrap();
        let replies = vec![NewMessage {
            message_id: "r1".to_string(),
            sender: Sender::Assistant,
            content: "orphan".to_string(),
            metadata: json!({}),
        }];
        assert!(matches!(
            db.append_reply("ghost", &replies, &SessionFlow::cleared()),
            Err(DbError::SessionNotFound(_))
        ));
        assert!(db.get_messages("ghost").unwrap().is_empty());
    }

    #[test]
    fn test_append_reply_rolls_back_on_duplicate_message() {
        let db = Database::open_in_memory().unwrap();
        db.create_session("s-1", 1).unwrap();
        db.add_message("taken", "s-1", Sender::User, "hi", &json!({}))
            .unwrap();
        let replies = vec![
            NewMessage {
                message_id: "fresh".to_string(),
                sender: Sender::Assistant,
                content: "first".to_string(),
                metadata: json!({}),
            },
            NewMessage {
                message_id: "taken".to_string(),
                sender: Sender::Assistant,
                content: "second".to_string(),
                metadata: json!({}),
            },
        ];
        let flow = SessionFlow {
            intent: Some("accounting".to_string()),
            step: Some("ask_period".to_string()),
            state: None,
        };
        assert!(db.append_reply("s-1", &replies, &flow).is_err());

        assert_eq!(db.get_messages("s-1").unwrap().len(), 1);
        assert!(db.get_session("s-1").unwrap().intent.is_none());
    }

    #[test]
    fn test_on_disk_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("robbie.db");
        {
            let db = Database::open(&path).unwrap();
            db.create_session("s-1", 9).unwrap();
            db.add_message("m1", "s-1", Sender::User, "hi", &json!({}))
                .unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.get_session("s-1").unwrap().user_id, 9);
        assert_eq!(db.get_messages("s-1").unwrap().len(), 1);
    }
}
