//! Conversation flows
//!
//! One step machine per intent, plus the small-talk fallback used when no
//! flow applies. [`FlowRegistry`] maps intents to their handlers.

mod accounting;
mod availability;
mod book_shoot;
mod client_crm;
mod client_stats;
mod invoice_billing;
mod manage_booking;
mod media_delivery;
mod photographer;
mod small_talk;
mod support_faq;

pub use accounting::{Accounting, AccountingData, AccountingStep, Period};
pub use availability::{Availability, AvailabilityData, AvailabilityStep};
pub use book_shoot::{BookShoot, BookShootData, BookShootStep};
pub use client_crm::{ClientCrm, ClientCrmData, ClientCrmStep};
pub use client_stats::{ClientStats, ClientStatsData, ClientStatsStep};
pub use invoice_billing::{InvoiceBilling, InvoiceBillingData, InvoiceBillingStep};
pub use manage_booking::{ManageBooking, ManageBookingData, ManageBookingStep};
pub use media_delivery::{MediaDelivery, MediaDeliveryData, MediaDeliveryStep};
pub use photographer::{PhotographerData, PhotographerManagement, PhotographerStep};
pub use small_talk::fallback_reply;
pub use support_faq::{SupportFaq, SupportFaqData, SupportFaqStep};

use crate::intent::Intent;
use crate::state_machine::extract::{self, find_phrase};
use crate::state_machine::{FlowHandler, FlowReply, Turn};
use crate::studio::{
    CollaboratorError, Role, Service, ServiceId, Shoot, ShootFilter, User,
};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;

/// Handlers keyed by the intent they serve
pub struct FlowRegistry {
    handlers: HashMap<Intent, Box<dyn FlowHandler>>,
}

impl FlowRegistry {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Every built-in flow
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(BookShoot));
        registry.register(Box::new(ManageBooking));
        registry.register(Box::new(Availability));
        registry.register(Box::new(ClientStats));
        registry.register(Box::new(Accounting));
        registry.register(Box::new(InvoiceBilling));
        registry.register(Box::new(MediaDelivery));
        registry.register(Box::new(PhotographerManagement));
        registry.register(Box::new(ClientCrm));
        registry.register(Box::new(SupportFaq));
        registry
    }

    /// Replaces any handler already registered for the same intent
    pub fn register(&mut self, handler: Box<dyn FlowHandler>) {
        self.handlers.insert(handler.intent(), handler);
    }

    pub fn get(&self, intent: Intent) -> Option<&dyn FlowHandler> {
        self.handlers.get(&intent).map(AsRef::as_ref)
    }
}

// ============================================================================
// Shared step helpers
// ============================================================================

/// Outcome of looking for a record in the user's message
pub(crate) enum Pick<T> {
    Found(T),
    /// An explicit reference that matched nothing
    Missing(String),
    Nothing,
}

/// Staff see the whole studio; everyone else only their own shoots
pub(crate) fn scope(turn: &Turn<'_>) -> ShootFilter {
    if is_staff(turn) {
        ShootFilter::default()
    } else {
        ShootFilter::default().involving(turn.user_id)
    }
}

pub(crate) fn is_staff(turn: &Turn<'_>) -> bool {
    turn.studio
        .directory
        .user(turn.user_id)
        .is_ok_and(|user| user.role != Role::Client)
}

/// "Wednesday, June 18, 2025 at 11:00 AM"
pub(crate) fn when(shoot: &Shoot) -> String {
    shoot.scheduled_at.map_or_else(
        || "Not scheduled yet".to_string(),
        |at| {
            format!(
                "{} at {}",
                extract::format_date(at.date_naive()),
                at.format("%-I:%M %p")
            )
        },
    )
}

/// "#101 - 123 Main St, Austin - Jun 18"
pub(crate) fn shoot_label(shoot: &Shoot) -> String {
    let mut label = format!("#{} - {}", shoot.id, shoot.address);
    if !shoot.city.is_empty() {
        label.push_str(", ");
        label.push_str(&shoot.city);
    }
    if let Some(date) = shoot.scheduled_date() {
        label.push_str(" - ");
        label.push_str(&extract::format_short_date(date));
    }
    label
}

pub(crate) fn shoot_labels(shoots: &[Shoot]) -> Vec<String> {
    shoots.iter().map(shoot_label).collect()
}

/// Find a shoot by UI context, "#id", street address or city
pub(crate) fn pick_shoot(turn: &mut Turn<'_>, candidates: &[Shoot]) -> Pick<Shoot> {
    if let Some(id) = turn.context.shoot_id() {
        if let Some(shoot) = candidates.iter().find(|s| s.id == id) {
            return Pick::Found(shoot.clone());
        }
    }
    if let Some(id) = turn.take(extract::shoot_ref) {
        return candidates
            .iter()
            .find(|s| s.id == id)
            .map_or_else(|| Pick::Missing(format!("#{id}")), |s| Pick::Found(s.clone()));
    }
    for shoot in candidates {
        let address = shoot.address.to_ascii_lowercase();
        if !address.is_empty() && turn.take(|t| find_phrase(t, &address).map(|r| ((), r))).is_some() {
            return Pick::Found(shoot.clone());
        }
    }
    for shoot in candidates {
        let city = shoot.city.to_ascii_lowercase();
        if !city.is_empty() && turn.take(|t| find_phrase(t, &city).map(|r| ((), r))).is_some() {
            return Pick::Found(shoot.clone());
        }
    }
    Pick::Nothing
}

/// Find a person by full name, then by any name part of three letters or more
pub(crate) fn pick_user(turn: &mut Turn<'_>, candidates: &[User]) -> Option<User> {
    for user in candidates {
        let name = user.name.to_ascii_lowercase();
        if turn.take(|t| find_phrase(t, &name).map(|r| ((), r))).is_some() {
            return Some(user.clone());
        }
    }
    for user in candidates {
        let name = user.name.to_ascii_lowercase();
        for part in name.split_whitespace().filter(|p| p.len() >= 3) {
            if turn.take(|t| find_phrase(t, part).map(|r| ((), r))).is_some() {
                return Some(user.clone());
            }
        }
    }
    None
}

/// Apology for a reference that matched nothing
pub(crate) fn unknown_reference(what: &str, reference: &str, options: Vec<String>) -> FlowReply {
    FlowReply::say(format!(
        "Sorry, I couldn't find {what} {reference}. Pick one from the list, or start over."
    ))
    .with_suggestions(options)
    .with_suggestions(["Start over"])
}

/// Catalog services mentioned in the text
///
/// Matches catalog names in either direction, then generic keywords.
/// "full package" selects everything.
pub(crate) fn infer_services(text: &str, catalog: &[Service]) -> Vec<ServiceId> {
    if ["full package", "everything", "all services"]
        .iter()
        .any(|p| text.contains(p))
    {
        return catalog.iter().map(|s| s.id).collect();
    }
    let trimmed = text.trim();
    let keywords = ["photo", "video", "drone", "floor"];
    catalog
        .iter()
        .filter(|service| {
            let name = service.name.to_ascii_lowercase();
            text.contains(&name)
                || (trimmed.len() >= 3 && name.contains(trimmed))
                || keywords
                    .iter()
                    .any(|k| text.contains(k) && name.contains(k))
        })
        .map(|s| s.id)
        .collect()
}

/// Random token for share and download links
pub(crate) fn link_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Log a collaborator failure that the user only sees as a soft message
pub(crate) fn log_soft_failure(turn: &Turn<'_>, intent: Intent, step: &str, err: &CollaboratorError) {
    tracing::warn!(
        session_id = %turn.session_id,
        intent = %intent,
        step,
        kind = ?err.kind,
        error = %err,
        "Collaborator call failed"
    );
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Drives a single flow the way the dispatcher would

    use crate::state_machine::{ChatContext, FlowHandler, FlowOutcome, FlowState, Turn};
    use crate::studio::Studio;

    pub struct Harness<'a, F: FlowHandler> {
        pub flow: F,
        pub studio: &'a Studio,
        pub user_id: i64,
        pub context: ChatContext,
        pub state: Option<FlowState>,
    }

    impl<'a, F: FlowHandler> Harness<'a, F> {
        pub fn new(flow: F, studio: &'a Studio, user_id: i64) -> Self {
            Self {
                flow,
                studio,
                user_id,
                context: ChatContext::default(),
                state: None,
            }
        }

        /// Send one message and keep the resulting state
        pub fn send(&mut self, message: &str) -> FlowOutcome {
            let mut turn = Turn::new("test-session", self.user_id, message, &self.context, self.studio);
            let outcome = self.flow.handle(self.state.take(), &mut turn).unwrap();
            self.state.clone_from(&outcome.state);
            outcome
        }

        pub fn step(&self) -> Option<&'static str> {
            self.state.as_ref().map(FlowState::step_name)
        }
    }

    pub fn text(outcome: &FlowOutcome) -> String {
        outcome
            .reply
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::studio::testing::demo_studio;

    #[test]
    fn test_standard_registry_covers_every_flow_intent() {
        let registry = FlowRegistry::standard();
        for intent in Intent::ALL {
            let expected = !matches!(intent, Intent::Greeting | Intent::General);
            assert_eq!(registry.get(intent).is_some(), expected, "{intent}");
        }
    }

    #[test]
    fn test_infer_services() {
        let (studio, _) = demo_studio();
        let catalog = studio.services.services().unwrap();
        assert_eq!(infer_services("photos only", &catalog), vec![1]);
        assert_eq!(infer_services("photos + video", &catalog), vec![1, 2]);
        assert_eq!(infer_services("add drone and a floorplan", &catalog), vec![3, 4]);
        assert_eq!(
            infer_services("full package (photos, video, drone, floorplan)", &catalog),
            vec![1, 2, 3, 4]
        );
        assert_eq!(infer_services("vid", &catalog), vec![2]);
        assert!(infer_services("tomorrow", &catalog).is_empty());
    }

    #[test]
    fn test_link_token_shape() {
        let token = link_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, link_token());
    }
}
