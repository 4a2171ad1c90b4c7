//! Replies and client-side actions produced by flows

use crate::intent::Intent;
use crate::studio::{InvoiceId, ShootId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Directive for the chat client, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    OpenShoot { shoot_id: ShootId },
    Payment { shoot_id: ShootId, url: String },
    SwitchFlow { flow: Intent, context: Value },
    Download { url: String },
    ViewInvoice { invoice_id: InvoiceId },
}

/// One assistant message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowMessage {
    pub content: String,
    pub metadata: Map<String, Value>,
}

/// What a turn says back: messages in order, quick replies, and actions
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowReply {
    pub messages: Vec<FlowMessage>,
    pub suggestions: Vec<String>,
    pub actions: Vec<Action>,
}

impl FlowReply {
    pub fn say(content: impl Into<String>) -> Self {
        Self::default().with_message(content)
    }

    pub fn with_message(mut self, content: impl Into<String>) -> Self {
        self.messages.push(FlowMessage {
            content: content.into(),
            metadata: Map::new(),
        });
        self
    }

    /// Attach a metadata entry to the most recent message
    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        if let Some(last) = self.messages.last_mut() {
            last.metadata.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn with_suggestions<I, S>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggestions.extend(suggestions.into_iter().map(Into::into));
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// At least one message and no blank ones
    pub fn is_well_formed(&self) -> bool {
        !self.messages.is_empty() && self.messages.iter().all(|m| !m.content.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_attaches_metadata_to_last_message() {
        let reply = FlowReply::say("first")
            .with_message("second")
            .with_metadata("shoot_id", 7)
            .with_suggestions(["A", "B"])
            .with_action(Action::OpenShoot { shoot_id: 7 });
        assert!(reply.messages[0].metadata.is_empty());
        assert_eq!(reply.messages[1].metadata["shoot_id"], 7);
        assert_eq!(reply.suggestions, vec!["A", "B"]);
        assert!(reply.is_well_formed());
    }

    #[test]
    fn test_empty_or_blank_reply_is_malformed() {
        assert!(!FlowReply::default().is_well_formed());
        assert!(!FlowReply::say("  ").is_well_formed());
    }

    #[test]
    fn test_action_wire_format() {
        let action = Action::SwitchFlow {
            flow: Intent::BookShoot,
            context: json!({"date": "2025-06-17"}),
        };
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            json!({"type": "switch_flow", "flow": "book_shoot", "context": {"date": "2025-06-17"}})
        );
        assert_eq!(
            serde_json::to_value(Action::Payment {
                shoot_id: 3,
                url: "u".into()
            })
            .unwrap(),
            json!({"type": "payment", "shoot_id": 3, "url": "u"})
        );
    }
}
