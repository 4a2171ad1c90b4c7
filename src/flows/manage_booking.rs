//! Rescheduling, cancelling and changing services on an existing booking

use super::{infer_services, log_soft_failure, pick_shoot, scope, shoot_label, shoot_labels, unknown_reference, when, Pick};
use crate::intent::Intent;
use crate::money::format_usd;
use crate::state_machine::extract::{self, RESCHEDULE_DATES};
use crate::state_machine::{
    Action, FlowError, FlowReply, FlowState, Progress, StepMachine, StepName, Transition, Turn,
};
use crate::studio::{
    at_time, CollaboratorErrorKind, Shoot, ShootId, ShootOrder, ShootStatus, ShootUpdate,
};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManageBookingStep {
    AskBooking,
    ShowOptions,
    Reschedule,
    ChangeServices,
    ConfirmCancel,
}

impl StepName for ManageBookingStep {
    fn name(self) -> &'static str {
        match self {
            ManageBookingStep::AskBooking => "ask_booking",
            ManageBookingStep::ShowOptions => "show_options",
            ManageBookingStep::Reschedule => "reschedule",
            ManageBookingStep::ChangeServices => "change_services",
            ManageBookingStep::ConfirmCancel => "confirm_cancel",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManageBookingData {
    pub shoot_id: Option<ShootId>,
    pub new_date: Option<NaiveDate>,
    pub new_time: Option<NaiveTime>,
}

const OPTIONS: [&str; 4] = ["Reschedule", "Cancel booking", "Change services", "View details"];
const CLOSING: [&str; 2] = ["Manage another booking", "Book a new shoot"];

pub struct ManageBooking;

impl StepMachine for ManageBooking {
    type Step = ManageBookingStep;
    type Data = ManageBookingData;

    const INTENT: Intent = Intent::ManageBooking;

    fn initial_step(&self) -> ManageBookingStep {
        ManageBookingStep::AskBooking
    }

    fn step(
        &self,
        step: ManageBookingStep,
        data: &mut ManageBookingData,
        turn: &mut Turn<'_>,
    ) -> Result<Transition<ManageBookingStep>, FlowError> {
        if step == ManageBookingStep::AskBooking {
            return ask_booking(data, turn);
        }
        let Some(shoot) = selected_shoot(data, turn)? else {
            data.shoot_id = None;
            return Ok(Transition::Await(
                ManageBookingStep::AskBooking,
                FlowReply::say("Sorry, I can't find that booking anymore.")
                    .with_suggestions(["Manage another booking", "Start over"]),
            ));
        };
        match step {
            ManageBookingStep::AskBooking | ManageBookingStep::ShowOptions => {
                Ok(show_options(&shoot, turn))
            }
            ManageBookingStep::Reschedule => reschedule(&shoot, data, turn),
            ManageBookingStep::ChangeServices => change_services(&shoot, turn),
            ManageBookingStep::ConfirmCancel => confirm_cancel(&shoot, turn),
        }
    }

    fn pack(step: ManageBookingStep, data: ManageBookingData) -> FlowState {
        FlowState::ManageBooking(Progress { step, data })
    }

    fn unpack(state: FlowState) -> Option<(ManageBookingStep, ManageBookingData)> {
        match state {
            FlowState::ManageBooking(p) => Some((p.step, p.data)),
            _ => None,
        }
    }
}

fn selected_shoot(data: &ManageBookingData, turn: &Turn<'_>) -> Result<Option<Shoot>, FlowError> {
    let Some(id) = data.shoot_id else {
        return Ok(None);
    };
    match turn.studio.shoots.shoot(id) {
        Ok(shoot) => Ok(Some(shoot)),
        Err(err) if err.kind == CollaboratorErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Upcoming bookings first, most recent past ones when nothing is upcoming
fn candidates(turn: &Turn<'_>) -> Result<Vec<Shoot>, FlowError> {
    let open = [ShootStatus::Cancelled, ShootStatus::Completed, ShootStatus::Delivered];
    let upcoming = turn.studio.shoots.shoots(
        &scope(turn)
            .scheduled_after(turn.now)
            .excluding(&open)
            .limit(10),
    )?;
    if !upcoming.is_empty() {
        return Ok(upcoming);
    }
    Ok(turn.studio.shoots.shoots(
        &scope(turn)
            .excluding(&[ShootStatus::Cancelled])
            .order(ShootOrder::ScheduledDesc)
            .limit(10),
    )?)
}

fn ask_booking(
    data: &mut ManageBookingData,
    turn: &mut Turn<'_>,
) -> Result<Transition<ManageBookingStep>, FlowError> {
    if data.shoot_id.is_some() {
        return Ok(Transition::Advance(ManageBookingStep::ShowOptions));
    }
    let candidates = candidates(turn)?;
    if candidates.is_empty() {
        return Ok(Transition::Finish(
            FlowReply::say("You don't have any bookings to manage right now.")
                .with_suggestions(["Book a new shoot", "Check availability"]),
        ));
    }
    match pick_shoot(turn, &candidates) {
        Pick::Found(shoot) => {
            data.shoot_id = Some(shoot.id);
            Ok(Transition::Advance(ManageBookingStep::ShowOptions))
        }
        Pick::Missing(reference) => Ok(Transition::Await(
            ManageBookingStep::AskBooking,
            unknown_reference("booking", &reference, shoot_labels(&candidates)),
        )),
        Pick::Nothing => Ok(Transition::Await(
            ManageBookingStep::AskBooking,
            FlowReply::say("Which booking would you like to manage?")
                .with_suggestions(shoot_labels(&candidates)),
        )),
    }
}

fn show_options(shoot: &Shoot, turn: &mut Turn<'_>) -> Transition<ManageBookingStep> {
    if turn.mentions(&["reschedule", "move", "new date", "different date", "new time"]) {
        return Transition::Advance(ManageBookingStep::Reschedule);
    }
    if turn.mentions(&["cancel"]) {
        return Transition::Advance(ManageBookingStep::ConfirmCancel);
    }
    if turn.mentions(&["service", "add ", "remove "]) {
        return Transition::Advance(ManageBookingStep::ChangeServices);
    }

    let services = turn
        .studio
        .service_names(&shoot.service_ids)
        .map_or_else(|_| "Unknown".to_string(), |names| names.join(", "));
    let reply = FlowReply::say(format!(
        "**Booking #{}**\n\n\
         • Property: {}\n\
         • When: {}\n\
         • Services: {}\n\
         • Total: {}\n\
         • Status: {}\n\n\
         What would you like to do?",
        shoot.id,
        shoot.location_label(),
        when(shoot),
        services,
        format_usd(shoot.total_quote),
        shoot.status,
    ))
    .with_metadata("shoot_id", shoot.id)
    .with_suggestions(OPTIONS);
    let reply = if turn.mentions(&["detail", "view"]) {
        reply.with_action(Action::OpenShoot { shoot_id: shoot.id })
    } else {
        reply
    };
    Transition::Await(ManageBookingStep::ShowOptions, reply)
}

fn reschedule(
    shoot: &Shoot,
    data: &mut ManageBookingData,
    turn: &mut Turn<'_>,
) -> Result<Transition<ManageBookingStep>, FlowError> {
    let had_date = data.new_date.is_some();
    let today = turn.today();
    if let Some(date) = turn.take(|t| extract::date(t, today, RESCHEDULE_DATES)) {
        data.new_date = Some(date);
        data.new_time = None;
    }
    let Some(date) = data.new_date else {
        return Ok(Transition::Await(
            ManageBookingStep::Reschedule,
            FlowReply::say(format!(
                "When would you like to move **{}** to?",
                shoot_label(shoot)
            ))
            .with_suggestions(["Tomorrow", "This weekend", "Next week"]),
        ));
    };

    if let Some(time) = turn.take(extract::time_of_day) {
        data.new_time = Some(time.time);
    } else if turn.mentions(&["flexible", "any time", "anytime"]) {
        data.new_time = Some(extract::window_start("flexible"));
    } else if had_date {
        if let Some(answer) = turn.take_answer() {
            data.new_time = Some(extract::window_start(&answer));
        }
    }
    let Some(time) = data.new_time else {
        return Ok(Transition::Await(
            ManageBookingStep::Reschedule,
            FlowReply::say(format!(
                "What time works best on **{}**?",
                extract::format_date(date)
            ))
            .with_suggestions(["Morning (10 AM)", "Afternoon (2 PM)", "Evening (5 PM)", "Flexible"]),
        ));
    };

    let update = ShootUpdate {
        scheduled_at: Some(at_time(date, time)),
        ..ShootUpdate::default()
    };
    match turn.studio.shoots.update_shoot(shoot.id, &update) {
        Ok(updated) => Ok(Transition::Finish(
            FlowReply::say(format!(
                "✅ Done! Booking #{} at {} is now set for **{}**.",
                updated.id,
                updated.location_label(),
                when(&updated)
            ))
            .with_metadata("shoot_id", updated.id)
            .with_action(Action::OpenShoot { shoot_id: updated.id })
            .with_suggestions(CLOSING),
        )),
        Err(err) => {
            log_soft_failure(turn, Intent::ManageBooking, "reschedule", &err);
            Ok(Transition::Await(
                ManageBookingStep::Reschedule,
                FlowReply::say("I couldn't reschedule that booking just now. Want me to try again?")
                    .with_suggestions(["Try again", "Start over"]),
            ))
        }
    }
}

fn change_services(shoot: &Shoot, turn: &mut Turn<'_>) -> Result<Transition<ManageBookingStep>, FlowError> {
    let catalog = turn.studio.services.services()?;
    let ids = infer_services(&turn.text(), &catalog);
    if ids.is_empty() {
        let mut options: Vec<String> = catalog.iter().map(|s| s.name.clone()).collect();
        options.push("Full package".to_string());
        return Ok(Transition::Await(
            ManageBookingStep::ChangeServices,
            FlowReply::say(format!(
                "Which services should booking #{} include?",
                shoot.id
            ))
            .with_suggestions(options),
        ));
    }
    turn.take_answer();

    let update = ShootUpdate {
        service_ids: Some(ids),
        ..ShootUpdate::default()
    };
    match turn.studio.shoots.update_shoot(shoot.id, &update) {
        Ok(updated) => {
            let names = turn.studio.service_names(&updated.service_ids)?.join(", ");
            Ok(Transition::Finish(
                FlowReply::say(format!(
                    "✅ Booking #{} now includes **{}**. New total: {}.",
                    updated.id,
                    names,
                    format_usd(updated.total_quote)
                ))
                .with_metadata("shoot_id", updated.id)
                .with_suggestions(CLOSING),
            ))
        }
        Err(err) => {
            log_soft_failure(turn, Intent::ManageBooking, "change_services", &err);
            Ok(Transition::Await(
                ManageBookingStep::ChangeServices,
                FlowReply::say("I couldn't update the services just now. Want me to try again?")
                    .with_suggestions(["Try again", "Start over"]),
            ))
        }
    }
}

fn confirm_cancel(shoot: &Shoot, turn: &mut Turn<'_>) -> Result<Transition<ManageBookingStep>, FlowError> {
    if turn.answering {
        let text = turn.text();
        if extract::is_negative(&text) {
            return Ok(Transition::Await(
                ManageBookingStep::ShowOptions,
                FlowReply::say(format!(
                    "No problem, booking #{} stays as it is. Anything else?",
                    shoot.id
                ))
                .with_suggestions(OPTIONS),
            ));
        }
        if extract::is_affirmative(&text) || turn.mentions(&["cancel it"]) {
            let update = ShootUpdate {
                status: Some(ShootStatus::Cancelled),
                ..ShootUpdate::default()
            };
            return match turn.studio.shoots.update_shoot(shoot.id, &update) {
                Ok(_) => {
                    tracing::info!(session_id = %turn.session_id, shoot_id = shoot.id, "Booking cancelled");
                    Ok(Transition::Finish(
                        FlowReply::say(format!(
                            "✅ Booking #{} at {} has been cancelled.",
                            shoot.id,
                            shoot.location_label()
                        ))
                        .with_metadata("shoot_id", shoot.id)
                        .with_suggestions(CLOSING),
                    ))
                }
                Err(err) => {
                    log_soft_failure(turn, Intent::ManageBooking, "confirm_cancel", &err);
                    Ok(Transition::Await(
                        ManageBookingStep::ConfirmCancel,
                        FlowReply::say("I couldn't cancel that booking just now. Try again?")
                            .with_suggestions(["Yes, cancel it", "No, keep it"]),
                    ))
                }
            };
        }
    }
    Ok(Transition::Await(
        ManageBookingStep::ConfirmCancel,
        FlowReply::say(format!(
            "Are you sure you want to cancel booking #{} at {} ({})?",
            shoot.id,
            shoot.location_label(),
            when(shoot)
        ))
        .with_suggestions(["Yes, cancel it", "No, keep it"]),
    ))
}
