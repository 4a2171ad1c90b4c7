//! Per-message input handed to flow steps

use crate::studio::{ShootId, Studio, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::Range;

/// UI context sent along with a message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatContext {
    /// Explicit intent; skips classification when no flow is committed
    pub intent: Option<String>,
    pub page: Option<String>,
    pub route: Option<String>,
    pub tab: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<Value>,
    pub property_address: Option<String>,
    pub property_city: Option<String>,
    pub property_state: Option<String>,
    pub property_zip: Option<String>,
    /// ISO date chosen elsewhere, e.g. an availability slot
    pub date: Option<String>,
    /// Time label chosen elsewhere, e.g. "11:00 AM"
    pub time: Option<String>,
    pub photographer_id: Option<UserId>,
}

impl ChatContext {
    /// The shoot the UI is showing, if any
    pub fn shoot_id(&self) -> Option<ShootId> {
        if self.entity_type.as_deref() != Some("shoot") {
            return None;
        }
        match self.entity_id.as_ref()? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().trim_start_matches('#').parse().ok(),
            _ => None,
        }
    }
}

/// One inbound message as seen by the steps of a flow
///
/// Extractors consume the spans they match from `rest`, so a later step in
/// the same cascade only sees what earlier steps left over.
pub struct Turn<'a> {
    pub session_id: &'a str,
    pub user_id: UserId,
    pub message: &'a str,
    rest: String,
    pub context: &'a ChatContext,
    pub studio: &'a Studio,
    pub now: DateTime<Utc>,
    /// The step being run asked the question this message answers
    pub answering: bool,
}

impl<'a> Turn<'a> {
    pub fn new(
        session_id: &'a str,
        user_id: UserId,
        message: &'a str,
        context: &'a ChatContext,
        studio: &'a Studio,
    ) -> Self {
        Self {
            session_id,
            user_id,
            message,
            rest: message.to_string(),
            context,
            studio,
            now: studio.now(),
            answering: false,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    /// Unconsumed input, lowercased with byte offsets preserved
    pub fn text(&self) -> String {
        self.rest.to_ascii_lowercase()
    }

    /// Nothing meaningful left to read
    pub fn is_spent(&self) -> bool {
        !self.rest.chars().any(char::is_alphanumeric)
    }

    /// Any of `needles` appears in the unconsumed input
    pub fn mentions(&self, needles: &[&str]) -> bool {
        let text = self.text();
        needles.iter().any(|n| text.contains(n))
    }

    /// Whole message equals `label`, ignoring case and surrounding space
    pub fn picked(&self, label: &str) -> bool {
        self.message.trim().eq_ignore_ascii_case(label.trim())
    }

    /// Run an extractor over the unconsumed input and consume its match
    pub fn take<T>(&mut self, extract: impl FnOnce(&str) -> Option<(T, Range<usize>)>) -> Option<T> {
        self.take_span(extract).map(|(value, _)| value)
    }

    /// Like [`Turn::take`], also returning the matched text in its original case
    pub fn take_span<T>(
        &mut self,
        extract: impl FnOnce(&str) -> Option<(T, Range<usize>)>,
    ) -> Option<(T, String)> {
        let lower = self.text();
        let (value, range) = extract(&lower)?;
        let original = self.rest.get(range.clone()).unwrap_or_default().trim().to_string();
        self.consume(range);
        Some((value, original))
    }

    /// Free-text answer: everything left, only while answering
    pub fn take_answer(&mut self) -> Option<String> {
        if !self.answering || self.is_spent() {
            return None;
        }
        let answer = self.rest.trim().to_string();
        self.consume(0..self.rest.len());
        Some(answer)
    }

    fn consume(&mut self, range: Range<usize>) {
        if range.end > self.rest.len()
            || !self.rest.is_char_boundary(range.start)
            || !self.rest.is_char_boundary(range.end)
        {
            return;
        }
        let blank = " ".repeat(range.len());
        self.rest.replace_range(range, &blank);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::extract;
    use crate::studio::testing::demo_studio;
    use serde_json::json;

    #[test]
    fn test_take_consumes_matched_span() {
        let (studio, _) = demo_studio();
        let context = ChatContext::default();
        let mut turn = Turn::new("s", 1, "Tomorrow MORNING please", &context, &studio);

        let span = turn.take_span(|t| extract::find_phrase(t, "morning").map(|r| ((), r)));
        assert_eq!(span.map(|(_, s)| s), Some("MORNING".to_string()));
        assert!(!turn.mentions(&["morning"]));
        assert!(turn.mentions(&["tomorrow"]));
    }

    #[test]
    fn test_take_answer_only_when_answering() {
        let (studio, _) = demo_studio();
        let context = ChatContext::default();
        let mut turn = Turn::new("s", 1, "  the beach house ", &context, &studio);
        assert_eq!(turn.take_answer(), None);

        turn.answering = true;
        assert_eq!(turn.take_answer(), Some("the beach house".to_string()));
        assert!(turn.is_spent());
        assert_eq!(turn.take_answer(), None);
    }

    #[test]
    fn test_context_shoot_id_accepts_number_or_string() {
        let context: ChatContext =
            serde_json::from_value(json!({"entityType": "shoot", "entityId": "#104"})).unwrap();
        assert_eq!(context.shoot_id(), Some(104));

        let context: ChatContext =
            serde_json::from_value(json!({"entityType": "shoot", "entityId": 7})).unwrap();
        assert_eq!(context.shoot_id(), Some(7));

        let context: ChatContext =
            serde_json::from_value(json!({"entityType": "invoice", "entityId": 7})).unwrap();
        assert_eq!(context.shoot_id(), None);
    }
}
