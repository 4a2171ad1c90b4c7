//! HTTP request handlers
//!
//! Storage and flows are blocking, so every handler hands its work to
//! `spawn_blocking`.

use super::types::{
    CreateSessionRequest, ErrorResponse, MessageRequest, SessionQuery, SessionResponse,
    SessionWithMessagesResponse,
};
use super::AppState;
use crate::db::DbError;
use crate::dispatcher::{ChatResponse, DispatchError};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id/messages", post(post_message))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Sessions
// ============================================================

async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = blocking(move || {
        let id = Uuid::new_v4().to_string();
        state
            .dispatcher
            .db()
            .create_session(&id, req.user_id)
            .map_err(AppError::from)
    })
    .await?;
    tracing::info!(session_id = %session.id, user_id = session.user_id, "Session created");
    Ok(Json(SessionResponse { session }))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<SessionWithMessagesResponse>, AppError> {
    blocking(move || {
        let db = state.dispatcher.db();
        let session = db.get_owned_session(&id, query.user_id)?;
        let messages = db.get_messages(&id)?;
        Ok(Json(SessionWithMessagesResponse { session, messages }))
    })
    .await
}

// ============================================================
// Messages
// ============================================================

async fn post_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.message.trim().is_empty() {
        return Err(AppError::BadRequest("Message must not be empty".to_string()));
    }
    blocking(move || {
        let context = req.context.unwrap_or_default();
        let response = state
            .dispatcher
            .handle(&id, req.user_id, &req.message, &context)?;
        Ok(Json(response))
    })
    .await
}

async fn get_version() -> &'static str {
    concat!("robbie ", env!("CARGO_PKG_VERSION"))
}

async fn blocking<T, F>(work: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<DbError> for AppError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::SessionNotFound(_) => AppError::NotFound(e.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<DispatchError> for AppError {
    fn from(e: DispatchError) -> Self {
        if e.is_not_found() {
            return AppError::NotFound(e.to_string());
        }
        tracing::error!(error = %e, "Dispatch failed");
        AppError::Internal(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::dispatcher::Dispatcher;
    use crate::studio::testing::demo_studio;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        let (studio, _) = demo_studio();
        let db = Database::open_in_memory().unwrap();
        create_router(AppState::new(Dispatcher::new(db, studio)))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| json!({ "raw": String::from_utf8_lossy(&bytes).to_string() }));
        (status, json)
    }

    #[tokio::test]
    async fn test_create_session_then_chat() {
        let app = app();
        let (status, body) = call(&app, "POST", "/api/sessions", Some(json!({"user_id": 1}))).await;
        assert_eq!(status, StatusCode::OK);
        let id = body["session"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["session"]["user_id"], 1);

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/sessions/{id}/messages"),
            Some(json!({"user_id": 1, "message": "I want to book a shoot"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session_id"], id.as_str());
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][0]["sender"], "user");
        assert_eq!(body["messages"][1]["metadata"]["step"], "ask_property");
        assert!(body["meta"]["suggestions"]
            .as_array()
            .unwrap()
            .contains(&json!("Enter new address")));

        let (status, body) = call(&app, "GET", &format!("/api/sessions/{id}?user_id=1"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session"]["intent"], "book_shoot");
        assert_eq!(body["session"]["step"], "ask_property");
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_message_creates_unknown_session_and_accepts_context() {
        let app = app();
        let (status, body) = call(
            &app,
            "POST",
            "/api/sessions/fresh/messages",
            Some(json!({
                "user_id": 1,
                "message": "hello",
                "context": {"page": "invoices", "entityType": "shoot", "entityId": "101"}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let reply = body["messages"][1]["content"].as_str().unwrap();
        assert!(reply.contains("I can help with invoices"));
        assert_eq!(body["messages"][0]["metadata"]["context"]["page"], "invoices");
    }

    #[tokio::test]
    async fn test_errors_are_json() {
        let app = app();
        let (status, body) = call(&app, "GET", "/api/sessions/missing?user_id=1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("missing"));

        let (status, body) = call(
            &app,
            "POST",
            "/api/sessions/s-1/messages",
            Some(json!({"user_id": 1, "message": "   "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Message must not be empty");
    }

    #[tokio::test]
    async fn test_sessions_are_private_to_their_owner() {
        let app = app();
        for message in ["Book a shoot", "123 Main St, Austin, TX"] {
            let (status, _) = call(
                &app,
                "POST",
                "/api/sessions/s-1/messages",
                Some(json!({"user_id": 1, "message": message})),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, body) = call(
            &app,
            "POST",
            "/api/sessions/s-1/messages",
            Some(json!({"user_id": 2, "message": "Tomorrow"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.get("messages").is_none());

        let (status, _) = call(&app, "GET", "/api/sessions/s-1?user_id=2", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&app, "GET", "/api/sessions/s-1?user_id=1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session"]["step"], "ask_date");
        assert_eq!(body["messages"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_version() {
        let (status, body) = call(&app(), "GET", "/version", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["raw"].as_str().unwrap().starts_with("robbie "));
    }
}
