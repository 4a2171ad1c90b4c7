//! Photographer assignment, schedules, blocked days and earnings

use super::{
    log_soft_failure, pick_shoot, pick_user, scope, shoot_label, shoot_labels, unknown_reference,
    when, Period, Pick,
};
use crate::intent::Intent;
use crate::money::{format_usd, round2};
use crate::state_machine::extract::{self, find_any, BLOCK_DATES};
use crate::state_machine::{
    FlowError, FlowReply, FlowState, Progress, StepMachine, StepName, Transition, Turn,
};
use crate::studio::{
    at_hour, Email, InvoiceFilter, Role, Service, Shoot, ShootFilter, ShootId, ShootOrder,
    ShootStatus, ShootUpdate, User, UserId,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotographerStep {
    AskAction,
    AssignPhotographer,
    ViewSchedule,
    UpdateAvailability,
    ViewEarnings,
}

impl StepName for PhotographerStep {
    fn name(self) -> &'static str {
        match self {
            PhotographerStep::AskAction => "ask_action",
            PhotographerStep::AssignPhotographer => "assign_photographer",
            PhotographerStep::ViewSchedule => "view_schedule",
            PhotographerStep::UpdateAvailability => "update_availability",
            PhotographerStep::ViewEarnings => "view_earnings",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotographerData {
    pub shoot_id: Option<ShootId>,
    pub photographer_id: Option<UserId>,
    /// `Some(true)` to block a day, `Some(false)` to free it
    pub block: Option<bool>,
    pub date: Option<NaiveDate>,
}

const MENU: [&str; 4] = [
    "Assign photographer",
    "View photographer schedule",
    "Update photographer availability",
    "Photographer earnings",
];

const AUTO_WORDS: &[&str] = &["auto", "best", "recommend"];

pub struct PhotographerManagement;

impl StepMachine for PhotographerManagement {
    type Step = PhotographerStep;
    type Data = PhotographerData;

    const INTENT: Intent = Intent::PhotographerManagement;

    fn initial_step(&self) -> PhotographerStep {
        PhotographerStep::AskAction
    }

    fn step(
        &self,
        step: PhotographerStep,
        data: &mut PhotographerData,
        turn: &mut Turn<'_>,
    ) -> Result<Transition<PhotographerStep>, FlowError> {
        match step {
            PhotographerStep::AskAction => Ok(ask_action(turn)),
            PhotographerStep::AssignPhotographer => assign_photographer(data, turn),
            PhotographerStep::ViewSchedule => view_schedule(turn),
            PhotographerStep::UpdateAvailability => update_availability(data, turn),
            PhotographerStep::ViewEarnings => view_earnings(data, turn),
        }
    }

    fn pack(step: PhotographerStep, data: PhotographerData) -> FlowState {
        FlowState::PhotographerManagement(Progress { step, data })
    }

    fn unpack(state: FlowState) -> Option<(PhotographerStep, PhotographerData)> {
        match state {
            FlowState::PhotographerManagement(p) => Some((p.step, p.data)),
            _ => None,
        }
    }
}

fn ask_action(turn: &Turn<'_>) -> Transition<PhotographerStep> {
    if turn.mentions(&["assign"]) {
        Transition::Advance(PhotographerStep::AssignPhotographer)
    } else if turn.mentions(&["earning", "payout", "pay"]) {
        Transition::Advance(PhotographerStep::ViewEarnings)
    } else if turn.mentions(&["availability", "block", "day off", "time off", "unavailable"]) {
        Transition::Advance(PhotographerStep::UpdateAvailability)
    } else if turn.mentions(&["schedule", "calendar"]) {
        Transition::Advance(PhotographerStep::ViewSchedule)
    } else {
        Transition::Await(
            PhotographerStep::AskAction,
            FlowReply::say("What would you like to do for your photographers?")
                .with_suggestions(MENU),
        )
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

/// The user themself when they are a photographer, else the one named or in context
fn choose_photographer(
    data: &mut PhotographerData,
    team: &[User],
    turn: &mut Turn<'_>,
) -> Option<User> {
    let wanted = data
        .photographer_id
        .or(turn.context.photographer_id)
        .or_else(|| team.iter().any(|u| u.id == turn.user_id).then_some(turn.user_id));
    let chosen = match wanted.and_then(|id| team.iter().find(|u| u.id == id)) {
        Some(user) => Some(user.clone()),
        None => pick_user(turn, team),
    };
    if let Some(user) = &chosen {
        data.photographer_id = Some(user.id);
    }
    chosen
}

fn ask_for_photographer(step: PhotographerStep, question: &str, team: &[User]) -> Transition<PhotographerStep> {
    Transition::Await(
        step,
        FlowReply::say(question).with_suggestions(team.iter().map(|u| u.name.clone())),
    )
}

// ==================== Assignment ====================

fn assign_photographer(
    data: &mut PhotographerData,
    turn: &mut Turn<'_>,
) -> Result<Transition<PhotographerStep>, FlowError> {
    if data.shoot_id.is_none() {
        let candidates = turn.studio.shoots.shoots(
            &scope(turn)
                .unassigned()
                .excluding(&[ShootStatus::Cancelled, ShootStatus::Completed, ShootStatus::Delivered])
                .order(ShootOrder::ScheduledAsc)
                .limit(10),
        )?;
        match pick_shoot(turn, &candidates) {
            Pick::Found(shoot) => data.shoot_id = Some(shoot.id),
            Pick::Missing(reference) => {
                return Ok(Transition::Await(
                    PhotographerStep::AssignPhotographer,
                    unknown_reference("an unassigned shoot", &reference, shoot_labels(&candidates)),
                ));
            }
            Pick::Nothing if candidates.is_empty() => {
                return Ok(Transition::Finish(
                    FlowReply::say("Every upcoming shoot already has a photographer. 🎉")
                        .with_suggestions(["View photographer schedule"]),
                ));
            }
            Pick::Nothing => {
                return Ok(Transition::Await(
                    PhotographerStep::AssignPhotographer,
                    FlowReply::say("Which shoot needs a photographer?")
                        .with_suggestions(shoot_labels(&candidates)),
                ));
            }
        }
    }
    let Some(shoot_id) = data.shoot_id else {
        return Err(FlowError::InvalidState("assignment without a shoot".to_string()));
    };
    let shoot = turn.studio.shoots.shoot(shoot_id)?;
    let team = photographers(turn)?;
    let loads = day_loads(&shoot, &team, turn)?;

    let chosen = if turn.take(|t| find_any(t, AUTO_WORDS)).is_some() {
        let best = loads
            .iter()
            .filter(|load| !load.blocked)
            .min_by_key(|load| load.shoots)
            .map(|load| load.user.clone());
        let Some(best) = best else {
            return Ok(Transition::Await(
                PhotographerStep::AssignPhotographer,
                FlowReply::say("Every photographer has that day blocked. Pick a different shoot, or start over.")
                    .with_suggestions(["Start over"]),
            ));
        };
        best
    } else if let Some(user) = pick_user(turn, &team) {
        if loads.iter().any(|load| load.user.id == user.id && load.blocked) {
            return Ok(Transition::Await(
                PhotographerStep::AssignPhotographer,
                FlowReply::say(format!("{} has that day blocked. Who else should take it?", user.name))
                    .with_suggestions(load_options(&loads)),
            ));
        }
        user
    } else {
        return Ok(Transition::Await(
            PhotographerStep::AssignPhotographer,
            FlowReply::say(format!("Who should shoot **{}**?", shoot_label(&shoot)))
                .with_suggestions(load_options(&loads)),
        ));
    };

    let update = ShootUpdate {
        photographer_id: Some(chosen.id),
        ..ShootUpdate::default()
    };
    if let Err(err) = turn.studio.shoots.update_shoot(shoot.id, &update) {
        log_soft_failure(turn, Intent::PhotographerManagement, "assign_photographer", &err);
        return Ok(Transition::Await(
            PhotographerStep::AssignPhotographer,
            FlowReply::say("I couldn't save that assignment just now. Want me to try again?")
                .with_suggestions(["Try again", "Start over"]),
        ));
    }
    tracing::info!(session_id = %turn.session_id, shoot_id = shoot.id, photographer_id = chosen.id, "Photographer assigned");

    let email = Email {
        to: chosen.email.clone(),
        subject: format!("New shoot assigned: {}", shoot.address),
        body: format!(
            "Hi {},\n\nYou're booked for {} on {}.",
            chosen.name,
            shoot.location_label(),
            when(&shoot)
        ),
    };
    if let Err(err) = turn.studio.messenger.send_email(&email) {
        log_soft_failure(turn, Intent::PhotographerManagement, "assign_photographer", &err);
    }

    Ok(Transition::Finish(
        FlowReply::say(format!(
            "📸 **{}** is assigned to **{}** ({}).",
            chosen.name,
            shoot_label(&shoot),
            when(&shoot)
        ))
        .with_metadata("shoot_id", shoot.id)
        .with_suggestions(["Assign another photographer", "View photographer schedule"]),
    ))
}

struct DayLoad {
    user: User,
    shoots: usize,
    blocked: bool,
}

/// Each photographer's bookings and blocked status on the shoot's day
fn day_loads(shoot: &Shoot, team: &[User], turn: &Turn<'_>) -> Result<Vec<DayLoad>, FlowError> {
    let Some(date) = shoot.scheduled_date() else {
        return Ok(team
            .iter()
            .map(|user| DayLoad {
                user: user.clone(),
                shoots: 0,
                blocked: false,
            })
            .collect());
    };
    let start = at_hour(date, 0);
    let booked = turn.studio.shoots.shoots(
        &ShootFilter::default()
            .scheduled_between(start, start + Duration::days(1) - Duration::seconds(1))
            .excluding(&[ShootStatus::Cancelled]),
    )?;
    team.iter()
        .map(|user| {
            Ok(DayLoad {
                user: user.clone(),
                shoots: booked
                    .iter()
                    .filter(|s| s.photographer_id == Some(user.id))
                    .count(),
                blocked: turn.studio.availability.is_blocked(user.id, date)?,
            })
        })
        .collect()
}

fn load_options(loads: &[DayLoad]) -> Vec<String> {
    let mut options = vec!["Auto-assign best match".to_string()];
    options.extend(loads.iter().map(|load| {
        if load.blocked {
            format!("{} (blocked)", load.user.name)
        } else {
            format!("{} ({} shoots that day)", load.user.name, load.shoots)
        }
    }));
    options
}

// ==================== Schedule ====================

fn view_schedule(turn: &mut Turn<'_>) -> Result<Transition<PhotographerStep>, FlowError> {
    let team = photographers(turn)?;
    let mut filter = ShootFilter::default()
        .scheduled_after(turn.now)
        .excluding(&[ShootStatus::Cancelled])
        .order(ShootOrder::ScheduledAsc)
        .limit(15);
    let mut title = "Upcoming shoots".to_string();
    let focus = match team.iter().find(|u| u.id == turn.user_id) {
        Some(me) => Some(me.clone()),
        None => pick_user(turn, &team),
    };
    if let Some(user) = &focus {
        filter = filter.photographer(user.id);
        title = format!("Upcoming shoots for {}", user.name);
    }
    let shoots = turn.studio.shoots.shoots(&filter)?;
    if shoots.is_empty() {
        return Ok(Transition::Finish(
            FlowReply::say("Nothing on the schedule yet.").with_suggestions(["Book a new shoot"]),
        ));
    }

    let mut days: BTreeMap<NaiveDate, Vec<String>> = BTreeMap::new();
    for shoot in &shoots {
        let Some(at) = shoot.scheduled_at else { continue };
        let who = shoot
            .photographer_id
            .and_then(|id| team.iter().find(|u| u.id == id))
            .map_or("Unassigned", |u| u.name.as_str());
        days.entry(at.date_naive()).or_default().push(format!(
            "• {} · #{} {} · {who}",
            at.format("%-I:%M %p"),
            shoot.id,
            shoot.location_label()
        ));
    }
    let sections: Vec<String> = days
        .into_iter()
        .map(|(day, lines)| format!("**{}**\n{}", extract::format_date(day), lines.join("\n")))
        .collect();

    Ok(Transition::Finish(
        FlowReply::say(format!("🗓️ **{title}**\n\n{}", sections.join("\n\n")))
            .with_suggestions(["Assign photographer", "Update photographer availability"]),
    ))
}

// ==================== Blocked days ====================

fn update_availability(
    data: &mut PhotographerData,
    turn: &mut Turn<'_>,
) -> Result<Transition<PhotographerStep>, FlowError> {
    let team = photographers(turn)?;
    let Some(photographer) = choose_photographer(data, &team, turn) else {
        return Ok(ask_for_photographer(
            PhotographerStep::UpdateAvailability,
            "Whose availability should I update?",
            &team,
        ));
    };

    if data.block.is_none() {
        data.block = if turn.mentions(&["unblock", "free up", "available again"]) {
            Some(false)
        } else if turn.mentions(&["block", "unavailable", "not available", "day off", "time off", "vacation"]) {
            Some(true)
        } else if turn.mentions(&["available"]) {
            Some(false)
        } else {
            None
        };
    }
    let Some(block) = data.block else {
        return Ok(Transition::Await(
            PhotographerStep::UpdateAvailability,
            FlowReply::say(format!("Should I block a day for {} or open one back up?", photographer.name))
                .with_suggestions(["Block a day", "Unblock a day"]),
        ));
    };

    if data.date.is_none() {
        let today = turn.today();
        data.date = turn.take(|t| extract::date(t, today, BLOCK_DATES));
    }
    let Some(date) = data.date else {
        let verb = if block { "block" } else { "unblock" };
        return Ok(Transition::Await(
            PhotographerStep::UpdateAvailability,
            FlowReply::say(format!("Which day should I {verb} for {}?", photographer.name))
                .with_suggestions(["Today", "Tomorrow", "This weekend", "Next week"]),
        ));
    };
    let day = extract::format_date(date);

    let result = if block {
        turn.studio
            .availability
            .block(photographer.id, date, None)
            .map(|()| format!("🚫 Blocked **{day}** for {}.", photographer.name))
    } else {
        turn.studio
            .availability
            .unblock(photographer.id, date)
            .map(|freed| {
                if freed {
                    format!("✅ **{day}** is open again for {}.", photographer.name)
                } else {
                    format!("{} didn't have **{day}** blocked.", photographer.name)
                }
            })
    };
    match result {
        Ok(message) => {
            tracing::info!(session_id = %turn.session_id, photographer_id = photographer.id, %date, block, "Availability updated");
            Ok(Transition::Finish(FlowReply::say(message).with_suggestions([
                "Update photographer availability",
                "View photographer schedule",
            ])))
        }
        Err(err) => {
            log_soft_failure(turn, Intent::PhotographerManagement, "update_availability", &err);
            Ok(Transition::Await(
                PhotographerStep::UpdateAvailability,
                FlowReply::say("I couldn't update the calendar just now. Want me to try again?")
                    .with_suggestions(["Try again", "Start over"]),
            ))
        }
    }
}

// ==================== Earnings ====================

fn view_earnings(
    data: &mut PhotographerData,
    turn: &mut Turn<'_>,
) -> Result<Transition<PhotographerStep>, FlowError> {
    let team = photographers(turn)?;
    let Some(photographer) = choose_photographer(data, &team, turn) else {
        return Ok(ask_for_photographer(
            PhotographerStep::ViewEarnings,
            "Whose earnings would you like to see?",
            &team,
        ));
    };

    let catalog = turn.studio.services.services()?;
    let completed = turn.studio.shoots.shoots(
        &ShootFilter::default()
            .photographer(photographer.id)
            .with_status(&[ShootStatus::Completed, ShootStatus::Delivered]),
    )?;
    let earned_between = |(start, end): (DateTime<Utc>, DateTime<Utc>)| {
        round2(
            completed
                .iter()
                .filter(|s| {
                    s.completed_at
                        .or(s.scheduled_at)
                        .is_some_and(|at| at >= start && at <= end)
                })
                .map(|s| payout(s, &catalog))
                .sum(),
        )
    };
    let this_month = earned_between(Period::ThisMonth.bounds(turn.now));
    let last_month = earned_between(Period::LastMonth.bounds(turn.now));
    let all_time = round2(completed.iter().map(|s| payout(s, &catalog)).sum());

    let unpaid = turn.studio.invoices.invoices(&InvoiceFilter {
        photographer_id: Some(photographer.id),
        unpaid_only: true,
        ..InvoiceFilter::default()
    })?;
    let mut pending = 0.0;
    for invoice in &unpaid {
        if let Some(shoot_id) = invoice.shoot_id {
            pending += payout(&turn.studio.shoots.shoot(shoot_id)?, &catalog);
        }
    }

    Ok(Transition::Finish(
        FlowReply::say(format!(
            "💵 **Earnings: {}**\n\n\
             **This month:** {}\n\
             **Last month:** {}\n\
             **All time:** {} ({} shoots)\n\
             **Pending payout:** {} ({} unpaid invoices)",
            photographer.name,
            format_usd(this_month),
            format_usd(last_month),
            format_usd(all_time),
            completed.len(),
            format_usd(round2(pending)),
            unpaid.len(),
        ))
        .with_metadata("photographer_id", photographer.id)
        .with_suggestions(["View photographer schedule", "See accounting summary"]),
    ))
}

/// Photographer's share of the services on a shoot
fn payout(shoot: &Shoot, catalog: &[Service]) -> f64 {
    catalog
        .iter()
        .filter(|s| shoot.service_ids.contains(&s.id))
        .map(|s| s.photographer_pay)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::test_support::{text, Harness};
    use crate::studio::testing::demo_studio;
    use crate::studio::{AvailabilityStore, ShootStore};

    #[test]
    fn test_assign_by_name() {
        let (studio, backend) = demo_studio();
        let mut flow = Harness::new(PhotographerManagement, &studio, 3);
        let ask = flow.send("Assign photographer");
        assert_eq!(flow.step(), Some("assign_photographer"));
        assert_eq!(ask.reply.suggestions, vec!["#102 - 45 Oak Ave, Austin - Jun 26"]);

        let who = flow.send("#102");
        assert_eq!(
            who.reply.suggestions,
            vec![
                "Auto-assign best match",
                "Alex Chen (0 shoots that day)",
                "Maria Gomez (0 shoots that day)"
            ]
        );

        let done = flow.send("Maria Gomez (0 shoots that day)");
        assert!(flow.state.is_none());
        assert!(text(&done).contains("**Maria Gomez** is assigned to **#102"));
        assert_eq!(backend.shoot(102).unwrap().photographer_id, Some(11));
        assert_eq!(backend.outbox()[0].to, "maria@example.com");
    }

    #[test]
    fn test_auto_assign_skips_blocked() {
        let (studio, backend) = demo_studio();
        let shoot_day = NaiveDate::from_ymd_opt(2025, 6, 26).unwrap();
        backend.block(10, shoot_day, None).unwrap();
        let mut flow = Harness::new(PhotographerManagement, &studio, 3);
        flow.send("Assign photographer to #102");
        let done = flow.send("Auto-assign best match");
        assert!(flow.state.is_none());
        assert!(text(&done).contains("Maria Gomez"));
        assert_eq!(backend.shoot(102).unwrap().photographer_id, Some(11));
    }

    #[test]
    fn test_schedule_groups_by_day() {
        let (studio, _) = demo_studio();
        let mut flow = Harness::new(PhotographerManagement, &studio, 3);
        let outcome = flow.send("View photographer schedule");
        assert!(flow.state.is_none());
        let schedule = text(&outcome);
        assert!(schedule.contains("**Wednesday, June 18, 2025**\n• 11:00 AM · #101 123 Main St, Austin, TX · Alex Chen"));
        assert!(schedule.contains("#102 45 Oak Ave, Austin, TX · Unassigned"));
    }

    #[test]
    fn test_photographer_blocks_own_day() {
        let (studio, backend) = demo_studio();
        let mut flow = Harness::new(PhotographerManagement, &studio, 10);
        let outcome = flow.send("Block tomorrow, I have a day off");
        assert!(flow.state.is_none());
        assert!(text(&outcome).contains("Blocked **Tuesday, June 17, 2025** for Alex Chen"));
        let tomorrow = NaiveDate::from_ymd_opt(2025, 6, 17).unwrap();
        assert!(backend.is_blocked(10, tomorrow).unwrap());
    }

    #[test]
    fn test_unblock_day_that_was_not_blocked() {
        let (studio, _) = demo_studio();
        let mut flow = Harness::new(PhotographerManagement, &studio, 3);
        flow.send("Update photographer availability");
        assert_eq!(flow.step(), Some("update_availability"));
        flow.send("Maria");
        flow.send("Unblock a day");
        let outcome = flow.send("2025-06-20");
        assert!(text(&outcome).contains("Maria Gomez didn't have **Friday, June 20, 2025** blocked."));
    }

    #[test]
    fn test_earnings() {
        let (studio, _) = demo_studio();
        let mut flow = Harness::new(PhotographerManagement, &studio, 3);
        let outcome = flow.send("Photographer earnings for Maria");
        assert!(flow.state.is_none());
        let summary = text(&outcome);
        assert!(summary.contains("**This month:** $100.00"));
        assert!(summary.contains("**Last month:** $0.00"));
        assert!(summary.contains("**All time:** $200.00 (2 shoots)"));
        assert!(summary.contains("**Pending payout:** $100.00 (1 unpaid invoices)"));
    }
}
