//! Routes each inbound message to the flow its session is committed to
//!
//! One call handles one message end to end: persist it, settle the intent,
//! run the flow, fall back on failure, persist the reply and the new flow
//! position. Messages for the same session are handled one at a time.

use crate::db::{Database, DbError, Message, NewMessage, Sender, SessionFlow};
use crate::flows::{fallback_reply, FlowRegistry};
use crate::intent::{detect_switch, resolve, route_chip, Intent, Switch};
use crate::state_machine::{Action, ChatContext, FlowReply, FlowState, Turn};
use crate::studio::{Studio, UserId};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Session storage failed: {0}")]
    Db(#[from] DbError),
}

impl DispatchError {
    /// The session is missing or belongs to someone else
    pub fn is_not_found(&self) -> bool {
        matches!(self, DispatchError::Db(DbError::SessionNotFound(_)))
    }
}

/// Quick replies and actions that accompany the latest reply
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResponseMeta {
    pub suggestions: Vec<String>,
    pub actions: Vec<Action>,
}

/// Full history after the turn, plus what the client should offer next
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub messages: Vec<Message>,
    pub meta: ResponseMeta,
}

pub struct Dispatcher {
    db: Database,
    studio: Studio,
    registry: FlowRegistry,
    /// Attach handler errors to fallback replies
    debug: bool,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Dispatcher {
    pub fn new(db: Database, studio: Studio) -> Self {
        Self {
            db,
            studio,
            registry: FlowRegistry::standard(),
            debug: false,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[allow(dead_code)] // Used in tests
    pub fn with_registry(mut self, registry: FlowRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the session's lock entry once no other turn holds or awaits it
    fn release_lock(&self, session_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks
            .get(session_id)
            .is_some_and(|held| Arc::strong_count(held) == 1)
        {
            locks.remove(session_id);
        }
    }

    /// Handle one user message and return the session's full history
    ///
    /// A session owned by another user reads as not found.
    pub fn handle(
        &self,
        session_id: &str,
        user_id: UserId,
        message: &str,
        context: &ChatContext,
    ) -> Result<ChatResponse, DispatchError> {
        let lock = self.session_lock(session_id);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.handle_locked(session_id, user_id, message, context)
        };
        self.release_lock(session_id, lock);
        result
    }

    fn handle_locked(
        &self,
        session_id: &str,
        user_id: UserId,
        message: &str,
        context: &ChatContext,
    ) -> Result<ChatResponse, DispatchError> {
        let session = self.db.get_or_create_session(session_id, user_id)?;
        let before = SessionFlow::from(&session);

        let context_json = serde_json::to_value(context).unwrap_or(Value::Null);
        self.db.add_message(
            &Uuid::new_v4().to_string(),
            session_id,
            Sender::User,
            message,
            &serde_json::json!({ "context": context_json }),
        )?;

        let (intent, state) = settle_intent(&before, message, context);
        tracing::debug!(session_id, intent = %intent, "Intent settled");

        let (reply, flow) = match self.registry.get(intent) {
            None => (fallback_reply(context.page.as_deref()), SessionFlow::cleared()),
            Some(handler) => {
                let mut turn = Turn::new(session_id, user_id, message, context, &self.studio);
                match handler.handle(state, &mut turn) {
                    Ok(outcome) if outcome.reply.is_well_formed() => {
                        (outcome.reply, flow_after(intent, outcome.state))
                    }
                    Ok(outcome) => {
                        tracing::warn!(
                            session_id,
                            intent = %intent,
                            step = outcome.state.as_ref().map(FlowState::step_name),
                            "Flow produced an empty reply"
                        );
                        (fallback_reply(context.page.as_deref()), before)
                    }
                    Err(e) => {
                        tracing::error!(
                            session_id,
                            intent = %intent,
                            step = before.step.as_deref(),
                            error = %e,
                            "Flow failed"
                        );
                        let mut reply = fallback_reply(context.page.as_deref());
                        if self.debug {
                            reply = reply.with_metadata("error", e.to_string());
                        }
                        (reply, before)
                    }
                }
            }
        };

        self.persist_reply(session_id, intent, &reply, &flow)?;

        Ok(ChatResponse {
            session_id: session_id.to_string(),
            messages: self.db.get_messages(session_id)?,
            meta: ResponseMeta {
                suggestions: reply.suggestions,
                actions: reply.actions,
            },
        })
    }

    fn persist_reply(
        &self,
        session_id: &str,
        intent: Intent,
        reply: &FlowReply,
        flow: &SessionFlow,
    ) -> Result<(), DispatchError> {
        let replies: Vec<NewMessage> = reply
            .messages
            .iter()
            .map(|message| {
                let mut metadata = message.metadata.clone();
                metadata
                    .entry("intent")
                    .or_insert_with(|| Value::from(intent.as_str()));
                if let Some(step) = &flow.step {
                    metadata
                        .entry("step")
                        .or_insert_with(|| Value::from(step.as_str()));
                }
                NewMessage {
                    message_id: Uuid::new_v4().to_string(),
                    sender: Sender::Assistant,
                    content: message.content.clone(),
                    metadata: Value::Object(metadata),
                }
            })
            .collect();
        self.db.append_reply(session_id, &replies, flow)?;
        Ok(())
    }
}

/// Decide which flow runs this message and with what state
///
/// Switch and reset phrases, and chips naming another flow, drop the
/// committed flow. Without one, an explicit context intent wins over
/// classifying the message. Stored state is only handed to the flow it belongs to.
fn settle_intent(
    before: &SessionFlow,
    message: &str,
    context: &ChatContext,
) -> (Intent, Option<FlowState>) {
    let mut committed = before.intent.as_deref().and_then(Intent::parse);
    let mut state = before.state.clone();

    match detect_switch(message) {
        Some(Switch::Reset) => {
            committed = None;
            state = None;
        }
        Some(Switch::To(target)) if committed != Some(target) => {
            committed = Some(target);
            state = None;
        }
        _ => {}
    }

    if let (Some(current), Some(chip)) = (committed, route_chip(message)) {
        if chip != current {
            committed = Some(chip);
            state = None;
        }
    }

    // An explicit intent the router doesn't know gets the small-talk fallback
    let intent = committed.unwrap_or_else(|| {
        match context.intent.as_deref().map(str::trim).filter(|i| !i.is_empty()) {
            Some(explicit) => Intent::parse(explicit).unwrap_or(Intent::General),
            None => resolve(message, context.page.as_deref()),
        }
    });
    let state = state.filter(|s| s.intent() == intent);
    (intent, state)
}

/// Where the session stands after a successful turn
fn flow_after(intent: Intent, state: Option<FlowState>) -> SessionFlow {
    match state {
        Some(state) => SessionFlow {
            intent: Some(intent.as_str().to_string()),
            step: Some(state.step_name().to_string()),
            state: Some(state),
        },
        None => SessionFlow::cleared(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{FlowError, FlowHandler, FlowOutcome};
    use crate::studio::testing::demo_studio;
    use crate::studio::{InMemoryStudio, ShootStore};

    fn dispatcher() -> (Dispatcher, Arc<InMemoryStudio>) {
        let (studio, backend) = demo_studio();
        let db = Database::open_in_memory().unwrap();
        (Dispatcher::new(db, studio), backend)
    }

    fn send(dispatcher: &Dispatcher, message: &str) -> ChatResponse {
        dispatcher
            .handle("s-1", 1, message, &ChatContext::default())
            .unwrap()
    }

    fn session_flow(dispatcher: &Dispatcher) -> SessionFlow {
        SessionFlow::from(&dispatcher.db().get_session("s-1").unwrap())
    }

    fn last_reply(response: &ChatResponse) -> &str {
        &response.messages.last().unwrap().content
    }

    /// Handler that fails on every message
    struct Broken(Intent);

    impl FlowHandler for Broken {
        fn intent(&self) -> Intent {
            self.0
        }

        fn handle(&self, _state: Option<FlowState>, _turn: &mut Turn<'_>) -> Result<FlowOutcome, FlowError> {
            Err(FlowError::InvalidState("slots out of sync".to_string()))
        }
    }

    /// Handler that answers with nothing
    struct Silent;

    impl FlowHandler for Silent {
        fn intent(&self) -> Intent {
            Intent::Accounting
        }

        fn handle(&self, _state: Option<FlowState>, _turn: &mut Turn<'_>) -> Result<FlowOutcome, FlowError> {
            Ok(FlowOutcome {
                state: None,
                reply: FlowReply::default(),
            })
        }
    }

    #[test]
    fn test_fresh_booking_commits_intent_and_asks_for_property() {
        let (dispatcher, _) = dispatcher();
        let response = send(&dispatcher, "I want to book a shoot");

        let flow = session_flow(&dispatcher);
        assert_eq!(flow.intent.as_deref(), Some("book_shoot"));
        assert_eq!(flow.step.as_deref(), Some("ask_property"));
        assert!(last_reply(&response).contains("Which property"));
        assert!(response
            .meta
            .suggestions
            .contains(&"Enter new address".to_string()));

        assert_eq!(response.messages.len(), 2);
        assert_eq!(response.messages[0].sender, Sender::User);
        assert_eq!(response.messages[1].sender, Sender::Assistant);
        assert_eq!(response.messages[1].metadata["step"], "ask_property");
        assert_eq!(response.messages[1].metadata["intent"], "book_shoot");
    }

    #[test]
    fn test_terminal_step_clears_session_and_next_message_is_reclassified() {
        let (dispatcher, backend) = dispatcher();
        for message in [
            "Book a shoot",
            "123 Main St, Austin, TX",
            "Tomorrow",
            "Golden hour",
            "Photos + video",
        ] {
            send(&dispatcher, message);
        }
        assert_eq!(session_flow(&dispatcher).step.as_deref(), Some("confirm"));

        let done = send(&dispatcher, "Yes, confirm booking");
        assert!(last_reply(&done).contains("You're all set"));
        assert_eq!(session_flow(&dispatcher), SessionFlow::cleared());
        assert!(backend.shoot(106).is_ok());
        assert!(done
            .meta
            .actions
            .contains(&Action::OpenShoot { shoot_id: 106 }));

        send(&dispatcher, "accounting");
        let flow = session_flow(&dispatcher);
        assert_eq!(flow.intent.as_deref(), Some("accounting"));
        assert_eq!(flow.step.as_deref(), Some("ask_period"));
    }

    #[test]
    fn test_switch_phrase_discards_previous_flow_state() {
        let (dispatcher, _) = dispatcher();
        send(&dispatcher, "Book a shoot");
        send(&dispatcher, "123 Main St, Austin, TX");
        assert!(matches!(
            session_flow(&dispatcher).state,
            Some(FlowState::BookShoot(_))
        ));

        send(&dispatcher, "Check availability");
        let flow = session_flow(&dispatcher);
        assert_eq!(flow.intent.as_deref(), Some("availability"));
        assert!(!matches!(flow.state, Some(FlowState::BookShoot(_))));

        send(&dispatcher, "book another shoot");
        let flow = session_flow(&dispatcher);
        assert_eq!(flow.step.as_deref(), Some("ask_property"));
        match flow.state {
            Some(FlowState::BookShoot(progress)) => assert!(progress.data.property_label.is_none()),
            other => panic!("expected a fresh booking, got {other:?}"),
        }
    }

    #[test]
    fn test_switch_phrase_for_current_flow_reaches_the_flow() {
        let (dispatcher, _) = dispatcher();
        send(&dispatcher, "I want to book a shoot");
        send(&dispatcher, "I want to book 123 Main St, Austin, TX");
        assert_eq!(session_flow(&dispatcher).step.as_deref(), Some("ask_date"));
    }

    #[test]
    fn test_reset_phrases_clear_the_session() {
        for phrase in ["start over", "Never mind", "back to the main menu"] {
            let (dispatcher, _) = dispatcher();
            send(&dispatcher, "Book a shoot");
            let response = send(&dispatcher, phrase);
            assert_eq!(session_flow(&dispatcher), SessionFlow::cleared(), "{phrase}");
            assert!(last_reply(&response).starts_with("Hi! I'm Robbie"));
        }
    }

    #[test]
    fn test_context_intent_is_adopted_when_nothing_is_committed() {
        let (dispatcher, _) = dispatcher();
        let context = ChatContext {
            intent: Some("accounting".to_string()),
            ..ChatContext::default()
        };
        dispatcher.handle("s-1", 1, "hello there", &context).unwrap();
        assert_eq!(
            session_flow(&dispatcher).intent.as_deref(),
            Some("accounting")
        );

        let context = ChatContext {
            intent: Some("book_shoot".to_string()),
            ..ChatContext::default()
        };
        dispatcher.handle("s-1", 1, "this month", &context).unwrap();
        assert_eq!(
            session_flow(&dispatcher).intent.as_deref(),
            Some("accounting")
        );
    }

    #[test]
    fn test_unknown_context_intent_gets_fallback() {
        let (dispatcher, _) = dispatcher();
        let context = ChatContext {
            intent: Some("bogus".to_string()),
            ..ChatContext::default()
        };
        let response = dispatcher.handle("s-1", 1, "Book a shoot", &context).unwrap();
        assert!(last_reply(&response).starts_with("Hi! I'm Robbie"));
        assert_eq!(session_flow(&dispatcher), SessionFlow::cleared());

        // Blank counts as absent
        let context = ChatContext {
            intent: Some("  ".to_string()),
            ..ChatContext::default()
        };
        dispatcher.handle("s-1", 1, "Book a shoot", &context).unwrap();
        assert_eq!(
            session_flow(&dispatcher).intent.as_deref(),
            Some("book_shoot")
        );
    }

    #[test]
    fn test_other_users_cannot_drive_or_read_a_session() {
        let (dispatcher, _) = dispatcher();
        send(&dispatcher, "Book a shoot");
        send(&dispatcher, "123 Main St, Austin, TX");
        let before = session_flow(&dispatcher);

        let err = dispatcher
            .handle("s-1", 2, "Tomorrow", &ChatContext::default())
            .unwrap_err();
        assert!(err.is_not_found());

        assert_eq!(session_flow(&dispatcher), before);
        assert_eq!(before.step.as_deref(), Some("ask_date"));
        let messages = dispatcher.db().get_messages("s-1").unwrap();
        assert_eq!(messages.len(), 4);
        assert!(messages.iter().all(|m| m.content != "Tomorrow"));
        assert_eq!(dispatcher.db().get_session("s-1").unwrap().user_id, 1);
    }

    #[test]
    fn test_session_locks_are_released_after_each_turn() {
        let (dispatcher, _) = dispatcher();
        send(&dispatcher, "Book a shoot");
        dispatcher
            .handle("s-2", 1, "hello", &ChatContext::default())
            .unwrap();
        let _ = dispatcher.handle("s-1", 2, "hello", &ChatContext::default());
        assert!(dispatcher.locks.lock().unwrap().is_empty());
    }

    #[test]
    fn test_fallback_is_page_aware_and_leaves_no_intent() {
        let (dispatcher, _) = dispatcher();
        let context = ChatContext {
            page: Some("invoices".to_string()),
            ..ChatContext::default()
        };
        let response = dispatcher.handle("s-1", 1, "hey", &context).unwrap();
        assert!(last_reply(&response).contains("I can help with invoices"));
        assert_eq!(session_flow(&dispatcher).intent, None);
    }

    #[test]
    fn test_failing_handler_gets_fallback_and_keeps_state() {
        let (studio, _) = demo_studio();
        let mut registry = FlowRegistry::standard();
        registry.register(Box::new(Broken(Intent::BookShoot)));
        let dispatcher = Dispatcher::new(Database::open_in_memory().unwrap(), studio)
            .with_registry(registry)
            .with_debug(true);

        let response = send(&dispatcher, "Book a shoot");
        let last = response.messages.last().unwrap();
        assert_eq!(last.sender, Sender::Assistant);
        assert!(last.content.starts_with("Hi! I'm Robbie"));
        assert!(last.metadata["error"]
            .as_str()
            .unwrap()
            .contains("slots out of sync"));
        assert!(!response.meta.suggestions.is_empty());
        assert_eq!(session_flow(&dispatcher), SessionFlow::cleared());
    }

    #[test]
    fn test_failure_mid_flow_leaves_previous_state() {
        let (studio, _) = demo_studio();
        let db = Database::open_in_memory().unwrap();
        let healthy = Dispatcher::new(db.clone(), studio.clone());
        send(&healthy, "Book a shoot");
        send(&healthy, "123 Main St, Austin, TX");
        let before = session_flow(&healthy);

        let mut registry = FlowRegistry::standard();
        registry.register(Box::new(Broken(Intent::BookShoot)));
        let broken = Dispatcher::new(db, studio).with_registry(registry);
        let response = send(&broken, "Tomorrow");

        assert_eq!(session_flow(&broken), before);
        assert!(response.messages.last().unwrap().metadata.get("error").is_none());
    }

    #[test]
    fn test_empty_reply_is_replaced_by_fallback() {
        let (studio, _) = demo_studio();
        let mut registry = FlowRegistry::standard();
        registry.register(Box::new(Silent));
        let dispatcher =
            Dispatcher::new(Database::open_in_memory().unwrap(), studio).with_registry(registry);

        let response = send(&dispatcher, "accounting summary");
        assert!(last_reply(&response).starts_with("Hi! I'm Robbie"));
    }

    #[test]
    fn test_messages_for_one_session_are_serialized() {
        let (dispatcher, _) = dispatcher();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                let dispatcher = &dispatcher;
                scope.spawn(move || {
                    dispatcher
                        .handle("s-1", 1, "hello", &ChatContext::default())
                        .unwrap();
                });
            }
        });

        let messages = dispatcher.db().get_messages("s-1").unwrap();
        assert_eq!(messages.len(), 16);
        for (i, message) in messages.iter().enumerate() {
            assert_eq!(message.sequence_id, i64::try_from(i).unwrap() + 1);
        }
        for pair in messages.chunks(2) {
            assert_eq!(pair[0].sender, Sender::User);
            assert_eq!(pair[1].sender, Sender::Assistant);
        }
        assert!(dispatcher.locks.lock().unwrap().is_empty());
    }
}
