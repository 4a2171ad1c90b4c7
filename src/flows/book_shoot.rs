//! Booking a new shoot
//!
//! Collects property, date, time and services, shows a summary, and books on
//! an explicit confirmation. Slots already known (from the UI context or the
//! first message) are skipped.

use super::{infer_services, log_soft_failure};
use crate::intent::Intent;
use crate::money::{format_usd, round2};
use crate::state_machine::extract::{self, find_any, AddressParts, BOOKING_DATES};
use crate::state_machine::{
    Action, FlowError, FlowReply, FlowState, Progress, StepMachine, StepName, Transition, Turn,
};
use crate::studio::{at_time, NewBooking, ServiceId, ShootFilter, ShootOrder, UserId};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookShootStep {
    AskProperty,
    AskDate,
    AskTime,
    AskServices,
    Confirm,
}

impl StepName for BookShootStep {
    fn name(self) -> &'static str {
        match self {
            BookShootStep::AskProperty => "ask_property",
            BookShootStep::AskDate => "ask_date",
            BookShootStep::AskTime => "ask_time",
            BookShootStep::AskServices => "ask_services",
            BookShootStep::Confirm => "confirm",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookShootData {
    pub property_label: Option<String>,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    /// `None` with a label set means the user gave a date we could not parse
    pub date: Option<NaiveDate>,
    pub date_label: Option<String>,
    pub time: Option<NaiveTime>,
    pub time_label: Option<String>,
    pub service_ids: Vec<ServiceId>,
    pub services_label: Option<String>,
    pub photographer_id: Option<UserId>,
}

impl BookShootData {
    fn set_property(&mut self, parts: AddressParts) {
        self.property_label = Some(parts.label());
        self.address = parts.address;
        self.city = parts.city;
        self.state = parts.state;
        self.zip = parts.zip;
    }

    fn set_date(&mut self, date: NaiveDate) {
        self.date = Some(date);
        self.date_label = Some(extract::format_date(date));
    }

    fn clear_property(&mut self) {
        self.property_label = None;
        self.address.clear();
        self.city.clear();
        self.state.clear();
        self.zip.clear();
    }
}

const DATE_SUGGESTIONS: [&str; 3] = ["Tomorrow", "This weekend", "Next week"];
const TIME_SUGGESTIONS: [&str; 3] = ["Morning", "Afternoon", "Golden hour"];
const SERVICE_SUGGESTIONS: [&str; 4] = [
    "Photos only",
    "Photos + video",
    "Photos + drone",
    "Full package (photos, video, drone, floorplan)",
];
const CONFIRM_SUGGESTIONS: [&str; 4] = [
    "Yes, confirm booking",
    "Change the date",
    "Change the services",
    "Start over",
];

const CONFIRM_WORDS: &[&str] = &[
    "yes", "yeah", "yep", "sure", "ok", "okay", "confirm", "book", "proceed", "go ahead",
    "try again", "looks good",
];
const CHANGE_WORDS: &[&str] = &["change", "different", "switch", "edit", "update"];

pub struct BookShoot;

impl StepMachine for BookShoot {
    type Step = BookShootStep;
    type Data = BookShootData;

    const INTENT: Intent = Intent::BookShoot;

    fn initial_step(&self) -> BookShootStep {
        BookShootStep::AskProperty
    }

    fn step(
        &self,
        step: BookShootStep,
        data: &mut BookShootData,
        turn: &mut Turn<'_>,
    ) -> Result<Transition<BookShootStep>, FlowError> {
        match step {
            BookShootStep::AskProperty => ask_property(data, turn),
            BookShootStep::AskDate => Ok(ask_date(data, turn)),
            BookShootStep::AskTime => Ok(ask_time(data, turn)),
            BookShootStep::AskServices => ask_services(data, turn),
            BookShootStep::Confirm => confirm(data, turn),
        }
    }

    fn pack(step: BookShootStep, data: BookShootData) -> FlowState {
        FlowState::BookShoot(Progress { step, data })
    }

    fn unpack(state: FlowState) -> Option<(BookShootStep, BookShootData)> {
        match state {
            FlowState::BookShoot(p) => Some((p.step, p.data)),
            _ => None,
        }
    }
}

/// Pre-fill slots the UI already knows about
fn prefill_from_context(data: &mut BookShootData, turn: &Turn<'_>) {
    let context = turn.context;
    if let Some(address) = context.property_address.as_deref().filter(|a| !a.trim().is_empty()) {
        data.set_property(AddressParts {
            address: address.trim().to_string(),
            city: context.property_city.clone().unwrap_or_default(),
            state: context.property_state.clone().unwrap_or_default(),
            zip: context.property_zip.clone().unwrap_or_default(),
        });
    }
    if let Some(date) = context
        .date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
    {
        data.set_date(date);
    }
    if let Some(label) = context.time.as_deref().filter(|t| !t.trim().is_empty()) {
        data.time = Some(extract::window_start(label));
        data.time_label = Some(label.trim().to_string());
    }
    if data.photographer_id.is_none() {
        data.photographer_id = context.photographer_id;
    }
}

/// Up to five distinct properties from the user's recent shoots
fn recent_properties(turn: &Turn<'_>) -> Result<Vec<AddressParts>, FlowError> {
    let shoots = turn.studio.shoots.shoots(
        &ShootFilter::default()
            .involving(turn.user_id)
            .order(ShootOrder::CreatedDesc),
    )?;
    let mut seen = Vec::new();
    let mut properties = Vec::new();
    for shoot in shoots {
        if shoot.address.trim().is_empty() {
            continue;
        }
        let key = shoot.location_label().to_ascii_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        properties.push(AddressParts {
            address: shoot.address,
            city: shoot.city,
            state: shoot.state,
            zip: shoot.zip,
        });
        if properties.len() == 5 {
            break;
        }
    }
    Ok(properties)
}

fn ask_property(
    data: &mut BookShootData,
    turn: &mut Turn<'_>,
) -> Result<Transition<BookShootStep>, FlowError> {
    if !turn.answering {
        prefill_from_context(data, turn);
    }
    if data.property_label.is_some() {
        return Ok(Transition::Advance(BookShootStep::AskDate));
    }

    let recent = recent_properties(turn)?;
    if let Some(parts) = recent.iter().find(|p| turn.picked(&p.label())) {
        data.set_property(parts.clone());
        turn.take(|t| Some(((), 0..t.len())));
        return Ok(Transition::Advance(BookShootStep::AskDate));
    }
    if turn.picked("Enter new address") {
        return Ok(Transition::Await(
            BookShootStep::AskProperty,
            FlowReply::say("Sure. What's the property address?"),
        ));
    }
    if let Some(((), span)) = turn.take_span(extract::street_address) {
        data.set_property(extract::split_address(&span));
        return Ok(Transition::Advance(BookShootStep::AskDate));
    }
    if let Some(answer) = turn.take_answer() {
        data.set_property(extract::split_address(&answer));
        return Ok(Transition::Advance(BookShootStep::AskDate));
    }

    let mut options: Vec<String> = recent.iter().map(AddressParts::label).collect();
    options.push("Enter new address".to_string());
    Ok(Transition::Await(
        BookShootStep::AskProperty,
        FlowReply::say("Great! Let's book a new shoot. Which property is this for?")
            .with_suggestions(options),
    ))
}

fn ask_date(data: &mut BookShootData, turn: &mut Turn<'_>) -> Transition<BookShootStep> {
    if data.date_label.is_some() {
        return Transition::Advance(BookShootStep::AskTime);
    }
    let today = turn.today();
    if let Some(date) = turn.take(|t| extract::date(t, today, BOOKING_DATES)) {
        data.set_date(date);
        return Transition::Advance(BookShootStep::AskTime);
    }
    if let Some(answer) = turn.take_answer() {
        data.date = None;
        data.date_label = Some(answer);
        return Transition::Advance(BookShootStep::AskTime);
    }
    let property = data.property_label.as_deref().unwrap_or("this property");
    Transition::Await(
        BookShootStep::AskDate,
        FlowReply::say(format!(
            "Got it. When would you like to schedule the shoot at **{property}**?"
        ))
        .with_suggestions(DATE_SUGGESTIONS),
    )
}

fn ask_time(data: &mut BookShootData, turn: &mut Turn<'_>) -> Transition<BookShootStep> {
    if data.time_label.is_some() {
        return Transition::Advance(BookShootStep::AskServices);
    }
    if let Some(time) = turn.take(extract::time_of_day) {
        data.time = Some(time.time);
        data.time_label = Some(time.label);
        return Transition::Advance(BookShootStep::AskServices);
    }
    if let Some(answer) = turn.take_answer() {
        data.time = Some(extract::window_start(&answer));
        data.time_label = Some(answer);
        return Transition::Advance(BookShootStep::AskServices);
    }
    Transition::Await(
        BookShootStep::AskTime,
        FlowReply::say("What time of day works best?").with_suggestions(TIME_SUGGESTIONS),
    )
}

fn ask_services(
    data: &mut BookShootData,
    turn: &mut Turn<'_>,
) -> Result<Transition<BookShootStep>, FlowError> {
    if !data.service_ids.is_empty() {
        return Ok(Transition::Advance(BookShootStep::Confirm));
    }
    let catalog = turn.studio.services.services()?;
    let mut ids = infer_services(&turn.text(), &catalog);
    if ids.is_empty() && turn.answering && !turn.is_spent() {
        // Unrecognized answer: fall back to the first catalog service
        ids.extend(catalog.first().map(|s| s.id));
    }
    if ids.is_empty() {
        return Ok(Transition::Await(
            BookShootStep::AskServices,
            FlowReply::say("What would you like us to capture?")
                .with_suggestions(SERVICE_SUGGESTIONS),
        ));
    }
    turn.take_answer();
    data.services_label = Some(
        catalog
            .iter()
            .filter(|s| ids.contains(&s.id))
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    );
    data.service_ids = ids;
    Ok(Transition::Advance(BookShootStep::Confirm))
}

fn summary(data: &BookShootData, turn: &Turn<'_>) -> Result<FlowReply, FlowError> {
    let catalog = turn.studio.services.services()?;
    let total = round2(
        catalog
            .iter()
            .filter(|s| data.service_ids.contains(&s.id))
            .map(|s| s.price)
            .sum(),
    );
    let text = format!(
        "📋 **Booking Summary**\n\n\
         • Property: {}\n\
         • Date: {}\n\
         • Time: {}\n\
         • Services: {}\n\
         • Estimated total: {}\n\n\
         Does everything look right?",
        data.property_label.as_deref().unwrap_or("Not set"),
        data.date_label.as_deref().unwrap_or("Not set"),
        data.time_label.as_deref().unwrap_or("Not set"),
        data.services_label.as_deref().unwrap_or("Not set"),
        format_usd(total),
    );
    Ok(FlowReply::say(text).with_suggestions(CONFIRM_SUGGESTIONS))
}

fn confirm(
    data: &mut BookShootData,
    turn: &mut Turn<'_>,
) -> Result<Transition<BookShootStep>, FlowError> {
    if !turn.answering {
        return Ok(Transition::Await(BookShootStep::Confirm, summary(data, turn)?));
    }

    let text = turn.text();
    if find_any(&text, CHANGE_WORDS).is_some() {
        if let Some(transition) = revise(data, turn)? {
            return Ok(transition);
        }
    }
    if extract::is_negative(&text) {
        return Ok(Transition::Await(
            BookShootStep::Confirm,
            FlowReply::say("No problem. What would you like to change?").with_suggestions([
                "Change the date",
                "Change the time",
                "Change the services",
                "Change the property",
            ]),
        ));
    }
    if find_any(&text, CONFIRM_WORDS).is_none() {
        return Ok(Transition::Await(
            BookShootStep::Confirm,
            FlowReply::say("Should I go ahead and book this shoot?")
                .with_suggestions(CONFIRM_SUGGESTIONS),
        ));
    }

    book(data, turn)
}

/// Clear the slot the user wants to change and ask for it again
fn revise(
    data: &mut BookShootData,
    turn: &mut Turn<'_>,
) -> Result<Option<Transition<BookShootStep>>, FlowError> {
    if turn.mentions(&["date", "day", "when"]) {
        data.date = None;
        data.date_label = None;
        let today = turn.today();
        if let Some(date) = turn.take(|t| extract::date(t, today, BOOKING_DATES)) {
            data.set_date(date);
            return Ok(Some(Transition::Advance(BookShootStep::AskDate)));
        }
        return Ok(Some(Transition::Await(
            BookShootStep::AskDate,
            FlowReply::say("No problem. What date works better?").with_suggestions(DATE_SUGGESTIONS),
        )));
    }
    if turn.mentions(&["time"]) {
        data.time = None;
        data.time_label = None;
        return Ok(Some(Transition::Await(
            BookShootStep::AskTime,
            FlowReply::say("Sure. What time works better?").with_suggestions(TIME_SUGGESTIONS),
        )));
    }
    if turn.mentions(&["service", "package"]) {
        data.service_ids.clear();
        data.services_label = None;
        return Ok(Some(Transition::Await(
            BookShootStep::AskServices,
            FlowReply::say("Sure. Which services would you like instead?")
                .with_suggestions(SERVICE_SUGGESTIONS),
        )));
    }
    if turn.mentions(&["property", "address", "location"]) {
        data.clear_property();
        let options: Vec<String> = recent_properties(turn)?.iter().map(AddressParts::label).collect();
        return Ok(Some(Transition::Await(
            BookShootStep::AskProperty,
            FlowReply::say("Sure. Which property should we shoot instead?")
                .with_suggestions(options)
                .with_suggestions(["Enter new address"]),
        )));
    }
    Ok(None)
}

fn book(
    data: &mut BookShootData,
    turn: &mut Turn<'_>,
) -> Result<Transition<BookShootStep>, FlowError> {
    let time = data
        .time
        .unwrap_or_else(|| extract::window_start(data.time_label.as_deref().unwrap_or_default()));
    let booking = NewBooking {
        client_id: turn.user_id,
        rep_id: None,
        photographer_id: data.photographer_id,
        address: data.address.clone(),
        city: data.city.clone(),
        state: data.state.clone(),
        zip: data.zip.clone(),
        scheduled_at: data.date.map(|date| at_time(date, time)),
        service_ids: data.service_ids.clone(),
    };

    let shoot = match turn.studio.shoots.create_booking(&booking) {
        Ok(shoot) => shoot,
        Err(err) => {
            log_soft_failure(turn, Intent::BookShoot, "confirm", &err);
            return Ok(Transition::Await(
                BookShootStep::Confirm,
                FlowReply::say(format!(
                    "I ran into a problem creating the booking: {err}. Would you like to try again?"
                ))
                .with_suggestions(["Try again", "Start over"]),
            ));
        }
    };
    tracing::info!(
        session_id = %turn.session_id,
        shoot_id = shoot.id,
        client_id = shoot.client_id,
        "Shoot booked"
    );

    let mut actions = vec![Action::OpenShoot { shoot_id: shoot.id }];
    let payment_note = match turn.studio.payments.create_checkout_link(shoot.id) {
        Ok(link) => match link.checkout_url {
            Some(url) => {
                actions.push(Action::Payment {
                    shoot_id: shoot.id,
                    url,
                });
                format!(
                    " You can pay the {} balance now with the payment link.",
                    format_usd(link.amount_remaining)
                )
            }
            None => " This shoot is already paid in full.".to_string(),
        },
        Err(err) => {
            log_soft_failure(turn, Intent::BookShoot, "confirm", &err);
            " You can pay later from the shoot details page.".to_string()
        }
    };

    let when = match data.date {
        Some(date) => format!(
            "on **{}** at **{}**",
            extract::format_date(date),
            time.format("%-I:%M %p")
        ),
        None => format!(
            "for **{}** ({}). We'll confirm the exact date with you",
            data.date_label.as_deref().unwrap_or("a date to be confirmed"),
            data.time_label.as_deref().unwrap_or("time to be confirmed"),
        ),
    };
    let services = data.services_label.as_deref().unwrap_or("your");
    let property = data.property_label.as_deref().unwrap_or("your property");
    let mut reply = FlowReply::say(format!(
        "🎉 You're all set! I've booked **{services}** at **{property}** {when}. \
         Total: {}.{payment_note}\n\nYou can track it anytime in Shoot History.",
        format_usd(shoot.total_quote),
    ))
    .with_metadata("shoot_id", shoot.id)
    .with_suggestions(["View this shoot", "Book another shoot"]);
    for action in actions {
        reply = reply.with_action(action);
    }
    Ok(Transition::Finish(reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::test_support::{text, Harness};
    use crate::studio::testing::{demo_studio, FailingPayments, RejectingBookings};
    use crate::studio::{ShootStatus, ShootStore};
    use std::sync::Arc;

    fn booking_data(state: Option<&FlowState>) -> BookShootData {
        match state {
            Some(FlowState::BookShoot(p)) => p.data.clone(),
            other => panic!("expected book_shoot state, got {other:?}"),
        }
    }

    #[test]
    fn test_fresh_booking_asks_for_property_with_recent_addresses() {
        let (studio, _) = demo_studio();
        let mut flow = Harness::new(BookShoot, &studio, 1);
        let outcome = flow.send("I want to book a shoot");

        assert_eq!(flow.step(), Some("ask_property"));
        assert!(text(&outcome).contains("Which property"));
        assert_eq!(
            outcome.reply.suggestions,
            vec![
                "45 Oak Ave, Austin, TX",
                "123 Main St, Austin, TX",
                "9 Pine Rd, Round Rock, TX",
                "Enter new address"
            ]
        );
    }

    #[test]
    fn test_one_shot_message_fills_every_slot_it_mentions() {
        let (studio, _) = demo_studio();
        let mut flow = Harness::new(BookShoot, &studio, 1);
        let outcome = flow.send("Book a shoot at 500 Congress Ave tomorrow morning, photos and drone");

        assert_eq!(flow.step(), Some("confirm"));
        let data = booking_data(flow.state.as_ref());
        assert_eq!(data.address, "500 Congress Ave");
        assert_eq!(data.date, NaiveDate::from_ymd_opt(2025, 6, 17));
        assert_eq!(data.time_label.as_deref(), Some("Morning"));
        assert_eq!(data.service_ids, vec![1, 3]);
        assert!(text(&outcome).contains("Estimated total: $400.00"));
    }

    #[test]
    fn test_context_prefills_property() {
        let (studio, _) = demo_studio();
        let mut flow = Harness::new(BookShoot, &studio, 1);
        flow.context.property_address = Some("77 Lake Dr".to_string());
        flow.context.property_city = Some("Dallas".to_string());
        flow.send("Book a shoot");

        assert_eq!(flow.step(), Some("ask_date"));
        let data = booking_data(flow.state.as_ref());
        assert_eq!(data.property_label.as_deref(), Some("77 Lake Dr, Dallas"));
    }

    #[test]
    fn test_full_conversation_books_once_and_finishes() {
        let (studio, backend) = demo_studio();
        let mut flow = Harness::new(BookShoot, &studio, 1);
        flow.send("Book a shoot");
        flow.send("123 Main St, Austin, TX");
        assert_eq!(flow.step(), Some("ask_date"));
        flow.send("Tomorrow");
        assert_eq!(flow.step(), Some("ask_time"));
        flow.send("Golden hour");
        assert_eq!(flow.step(), Some("ask_services"));
        let summary = flow.send("Photos + video");
        assert_eq!(flow.step(), Some("confirm"));
        assert!(text(&summary).contains("Booking Summary"));

        let done = flow.send("Yes, confirm booking");
        assert!(flow.state.is_none());
        assert!(text(&done).contains("You're all set"));
        assert_eq!(done.reply.messages[0].metadata["shoot_id"], 106);
        assert_eq!(done.reply.actions[0], Action::OpenShoot { shoot_id: 106 });
        assert!(matches!(
            &done.reply.actions[1],
            Action::Payment { shoot_id: 106, url } if url == "https://studio.test/pay/106"
        ));

        let shoot = backend.shoot(106).unwrap();
        assert_eq!(shoot.status, ShootStatus::Scheduled);
        assert_eq!(shoot.service_ids, vec![1, 2]);
        assert_eq!(shoot.scheduled_at, Some(crate::studio::at_hour(NaiveDate::from_ymd_opt(2025, 6, 17).unwrap(), 17)));
    }

    #[test]
    fn test_cascade_into_confirm_only_shows_summary() {
        let (studio, backend) = demo_studio();
        let mut flow = Harness::new(BookShoot, &studio, 1);
        // "book" is a confirm word, but arriving at confirm by cascade never books
        flow.send("book 9 Pine Rd tomorrow afternoon photos");
        assert_eq!(flow.step(), Some("confirm"));
        assert!(backend.shoot(106).is_err());
    }

    #[test]
    fn test_change_date_clears_only_the_date() {
        let (studio, _) = demo_studio();
        let mut flow = Harness::new(BookShoot, &studio, 1);
        flow.send("Book a shoot at 9 Pine Rd tomorrow morning with video");
        assert_eq!(flow.step(), Some("confirm"));

        let outcome = flow.send("Change the date");
        assert_eq!(flow.step(), Some("ask_date"));
        assert!(text(&outcome).contains("What date works better"));
        let data = booking_data(flow.state.as_ref());
        assert_eq!(data.date_label, None);
        assert_eq!(data.time_label.as_deref(), Some("Morning"));
        assert_eq!(data.service_ids, vec![2]);
        assert_eq!(data.address, "9 Pine Rd");

        flow.send("next week");
        assert_eq!(flow.step(), Some("confirm"));
        let data = booking_data(flow.state.as_ref());
        assert_eq!(data.date, NaiveDate::from_ymd_opt(2025, 6, 23));
    }

    #[test]
    fn test_free_text_answers_are_kept_as_labels() {
        let (studio, _) = demo_studio();
        let mut flow = Harness::new(BookShoot, &studio, 1);
        flow.send("Book a shoot");
        flow.send("the lake house");
        flow.send("sometime after the 4th");
        let data = booking_data(flow.state.as_ref());
        assert_eq!(data.property_label.as_deref(), Some("the lake house"));
        assert_eq!(data.date, None);
        assert_eq!(data.date_label.as_deref(), Some("sometime after the 4th"));
        assert_eq!(flow.step(), Some("ask_time"));
    }

    #[test]
    fn test_booking_failure_stays_at_confirm() {
        let (studio, backend) = demo_studio();
        let rejecting = Arc::new(RejectingBookings::new(backend.clone()));
        let studio = studio.with_shoots(rejecting.clone());
        let mut flow = Harness::new(BookShoot, &studio, 1);
        flow.send("Book a shoot at 9 Pine Rd tomorrow morning with photos");

        let outcome = flow.send("yes");
        assert_eq!(flow.step(), Some("confirm"));
        assert!(text(&outcome).contains("Scheduling service is down"));
        assert_eq!(outcome.reply.suggestions, vec!["Try again", "Start over"]);

        flow.send("Try again");
        assert_eq!(rejecting.recorded_attempts(), 2);
    }

    #[test]
    fn test_payment_failure_still_books() {
        let (studio, backend) = demo_studio();
        let studio = studio.with_payments(Arc::new(FailingPayments));
        let mut flow = Harness::new(BookShoot, &studio, 1);
        flow.send("Book a shoot at 9 Pine Rd tomorrow morning with photos");

        let done = flow.send("confirm");
        assert!(flow.state.is_none());
        assert!(text(&done).contains("pay later"));
        assert_eq!(done.reply.actions, vec![Action::OpenShoot { shoot_id: 106 }]);
        assert!(backend.shoot(106).is_ok());
    }
}
