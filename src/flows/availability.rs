//! Open slots for a photographer, or for the whole team, on one day

use super::pick_user;
use crate::intent::Intent;
use crate::state_machine::extract::{self, find_any, AVAILABILITY_DATES};
use crate::state_machine::{
    Action, FlowError, FlowReply, FlowState, Progress, StepMachine, StepName, Transition, Turn,
};
use crate::studio::{at_hour, open_slots, Role, ShootFilter, ShootStatus, User, UserId};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityStep {
    AskPhotographer,
    AskDateRange,
    ShowSlots,
}

impl StepName for AvailabilityStep {
    fn name(self) -> &'static str {
        match self {
            AvailabilityStep::AskPhotographer => "ask_photographer",
            AvailabilityStep::AskDateRange => "ask_date_range",
            AvailabilityStep::ShowSlots => "show_slots",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvailabilityData {
    pub photographer_id: Option<UserId>,
    pub photographer_name: Option<String>,
    /// Check the whole team rather than one photographer
    pub everyone: bool,
    pub date: Option<NaiveDate>,
}

impl AvailabilityData {
    fn who(&self) -> &str {
        self.photographer_name.as_deref().unwrap_or("the team")
    }
}

const EVERYONE: &[&str] = &["all photographers", "anyone", "any photographer", "everyone", "all"];

pub struct Availability;

impl StepMachine for Availability {
    type Step = AvailabilityStep;
    type Data = AvailabilityData;

    const INTENT: Intent = Intent::Availability;

    fn initial_step(&self) -> AvailabilityStep {
        AvailabilityStep::AskPhotographer
    }

    fn step(
        &self,
        step: AvailabilityStep,
        data: &mut AvailabilityData,
        turn: &mut Turn<'_>,
    ) -> Result<Transition<AvailabilityStep>, FlowError> {
        match step {
            AvailabilityStep::AskPhotographer => ask_photographer(data, turn),
            AvailabilityStep::AskDateRange => Ok(ask_date(data, turn)),
            AvailabilityStep::ShowSlots => show_slots(data, turn),
        }
    }

    fn pack(step: AvailabilityStep, data: AvailabilityData) -> FlowState {
        FlowState::Availability(Progress { step, data })
    }

    fn unpack(state: FlowState) -> Option<(AvailabilityStep, AvailabilityData)> {
        match state {
            FlowState::Availability(p) => Some((p.step, p.data)),
            _ => None,
        }
    }
}

fn photographers(turn: &Turn<'_>) -> Result<Vec<User>, FlowError> {
    Ok(turn
        .studio
        .directory
        .users_with_role(Role::Photographer)?
        .into_iter()
        .filter(|u| u.active)
        .collect())
}

fn ask_photographer(
    data: &mut AvailabilityData,
    turn: &mut Turn<'_>,
) -> Result<Transition<AvailabilityStep>, FlowError> {
    if data.everyone || data.photographer_id.is_some() {
        return Ok(Transition::Advance(AvailabilityStep::AskDateRange));
    }
    let team = photographers(turn)?;
    if let Some(id) = turn.context.photographer_id {
        if let Some(user) = team.iter().find(|u| u.id == id) {
            data.photographer_id = Some(user.id);
            data.photographer_name = Some(user.name.clone());
            return Ok(Transition::Advance(AvailabilityStep::AskDateRange));
        }
    }
    if let Some(user) = pick_user(turn, &team) {
        data.photographer_id = Some(user.id);
        data.photographer_name = Some(user.name);
        return Ok(Transition::Advance(AvailabilityStep::AskDateRange));
    }
    if turn.take(|t| find_any(t, EVERYONE)).is_some() {
        data.everyone = true;
        return Ok(Transition::Advance(AvailabilityStep::AskDateRange));
    }

    let mut options: Vec<String> = team.iter().take(10).map(|u| u.name.clone()).collect();
    options.push("All photographers".to_string());
    Ok(Transition::Await(
        AvailabilityStep::AskPhotographer,
        FlowReply::say("Whose availability would you like to check?").with_suggestions(options),
    ))
}

fn ask_date(data: &mut AvailabilityData, turn: &mut Turn<'_>) -> Transition<AvailabilityStep> {
    if data.date.is_some() {
        return Transition::Advance(AvailabilityStep::ShowSlots);
    }
    let today = turn.today();
    if let Some(date) = turn.take(|t| extract::date(t, today, AVAILABILITY_DATES)) {
        data.date = Some(date);
        return Transition::Advance(AvailabilityStep::ShowSlots);
    }
    Transition::Await(
        AvailabilityStep::AskDateRange,
        FlowReply::say(format!("Which day should I check for {}?", data.who()))
            .with_suggestions(["Today", "Tomorrow", "This week", "Next week"]),
    )
}

fn show_slots(
    data: &mut AvailabilityData,
    turn: &mut Turn<'_>,
) -> Result<Transition<AvailabilityStep>, FlowError> {
    let Some(date) = data.date else {
        return Ok(Transition::Advance(AvailabilityStep::AskDateRange));
    };

    if turn.answering {
        if turn.mentions(&["different date", "another date", "other day", "check "]) {
            data.date = None;
            return Ok(Transition::Advance(AvailabilityStep::AskDateRange));
        }
        if turn.mentions(&["book"]) {
            return Ok(Transition::Finish(hand_off_to_booking(data, date, turn)));
        }
    }

    let day_start = at_hour(date, 0);
    let booked = turn.studio.shoots.shoots(
        &ShootFilter::default()
            .scheduled_between(day_start, day_start + Duration::days(1) - Duration::seconds(1))
            .excluding(&[ShootStatus::Cancelled]),
    )?;
    let blocked = match data.photographer_id {
        Some(id) => turn.studio.availability.is_blocked(id, date)?,
        None => false,
    };
    let slots = open_slots(date, data.photographer_id, &booked, blocked);
    let day = extract::format_date(date);

    let reply = if slots.is_empty() {
        let reason = if blocked { " (the day is blocked)" } else { "" };
        FlowReply::say(format!(
            "😕 No open slots for {} on **{day}**{reason}.",
            data.who()
        ))
        .with_suggestions(["Check tomorrow", "Check next week", "Book a shoot anyway"])
    } else {
        let lines: Vec<String> = slots.iter().map(|s| format!("• {}", s.display)).collect();
        FlowReply::say(format!(
            "📅 Open slots for {} on **{day}**:\n\n{}",
            data.who(),
            lines.join("\n")
        ))
        .with_metadata("date", date.to_string())
        .with_suggestions(slots.iter().take(3).map(|s| format!("Book at {}", s.display)))
        .with_suggestions(["Check different date"])
    };
    Ok(Transition::Await(AvailabilityStep::ShowSlots, reply))
}

/// Hand the chosen slot to the booking flow on the client
fn hand_off_to_booking(data: &AvailabilityData, date: NaiveDate, turn: &mut Turn<'_>) -> FlowReply {
    let time = turn.take(extract::time_of_day);
    let mut context = json!({ "date": date.to_string() });
    if let Some(id) = data.photographer_id {
        context["photographerId"] = json!(id);
    }
    if let Some(time) = &time {
        context["time"] = json!(time.label);
    }
    let when = match &time {
        Some(time) => format!("{} at {}", extract::format_date(date), time.label),
        None => extract::format_date(date),
    };
    FlowReply::say(format!("Great, let's book **{when}**. I'll take you to booking."))
        .with_action(Action::SwitchFlow {
            flow: Intent::BookShoot,
            context,
        })
        .with_suggestions(["Book a new shoot"])
}
