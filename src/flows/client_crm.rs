//! Client relationship tools: history, follow-ups, notes and at-risk clients

use super::{log_soft_failure, pick_user, shoot_label};
use crate::intent::Intent;
use crate::money::{format_usd, round2};
use crate::state_machine::{
    FlowError, FlowReply, FlowState, Progress, StepMachine, StepName, Transition, Turn,
};
use crate::studio::{Email, Role, Shoot, ShootFilter, ShootOrder, ShootStatus, Studio, User, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientCrmStep {
    AskAction,
    ClientHistory,
    SendFollowUp,
    CreateNote,
    AtRiskClients,
}

impl StepName for ClientCrmStep {
    fn name(self) -> &'static str {
        match self {
            ClientCrmStep::AskAction => "ask_action",
            ClientCrmStep::ClientHistory => "client_history",
            ClientCrmStep::SendFollowUp => "send_follow_up",
            ClientCrmStep::CreateNote => "create_note",
            ClientCrmStep::AtRiskClients => "at_risk_clients",
        }
    }
}

/// Canned follow-up emails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpKind {
    ThankYou,
    Feedback,
    Referral,
    Rebook,
}

impl FollowUpKind {
    fn parse(text: &str) -> Option<Self> {
        if text.contains("thank") {
            Some(FollowUpKind::ThankYou)
        } else if text.contains("feedback") || text.contains("review") {
            Some(FollowUpKind::Feedback)
        } else if text.contains("refer") {
            Some(FollowUpKind::Referral)
        } else if text.contains("rebook") || text.contains("book again") || text.contains("remind") {
            Some(FollowUpKind::Rebook)
        } else {
            None
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FollowUpKind::ThankYou => "thank-you note",
            FollowUpKind::Feedback => "feedback request",
            FollowUpKind::Referral => "referral request",
            FollowUpKind::Rebook => "rebooking reminder",
        }
    }

    fn email(self, client: &User, studio: &Studio) -> Email {
        let (subject, body) = match self {
            FollowUpKind::ThankYou => (
                "Thank you for your shoot!".to_string(),
                "Thanks for trusting us with your property. We hope the photos help it shine, and we'd love to work with you again.".to_string(),
            ),
            FollowUpKind::Feedback => (
                "How did we do?".to_string(),
                "We'd love to hear how your recent shoot went. Reply to this email with any feedback, good or bad.".to_string(),
            ),
            FollowUpKind::Referral => (
                "Know someone who needs great listing photos?".to_string(),
                "If you know an agent or homeowner who could use our help, send them our way. We take good care of referrals.".to_string(),
            ),
            FollowUpKind::Rebook => (
                "Ready for your next shoot?".to_string(),
                format!(
                    "Have another listing coming up? Book your next shoot here: {}",
                    studio.link("/book")
                ),
            ),
        };
        Email {
            to: client.email.clone(),
            subject,
            body: format!("Hi {},\n\n{body}", client.name),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientCrmData {
    pub client_id: Option<UserId>,
    pub follow_up: Option<FollowUpKind>,
}

const MENU: [&str; 4] = [
    "View client history",
    "Send follow-up",
    "Add client note",
    "View at-risk clients",
];

/// Days without a shoot before a client counts as at risk
const AT_RISK_DAYS: i64 = 60;
/// Days without a shoot before an at-risk client is flagged red
const SEVERE_DAYS: i64 = 90;
const AT_RISK_LIMIT: usize = 15;
/// Follow-ups go to clients with a shoot completed this recently
const FOLLOW_UP_DAYS: i64 = 30;

pub struct ClientCrm;

impl StepMachine for ClientCrm {
    type Step = ClientCrmStep;
    type Data = ClientCrmData;

    const INTENT: Intent = Intent::ClientCrm;

    fn initial_step(&self) -> ClientCrmStep {
        ClientCrmStep::AskAction
    }

    fn step(
        &self,
        step: ClientCrmStep,
        data: &mut ClientCrmData,
        turn: &mut Turn<'_>,
    ) -> Result<Transition<ClientCrmStep>, FlowError> {
        match step {
            ClientCrmStep::AskAction => Ok(ask_action(turn)),
            ClientCrmStep::ClientHistory => client_history(data, turn),
            ClientCrmStep::SendFollowUp => send_follow_up(data, turn),
            ClientCrmStep::CreateNote => create_note(data, turn),
            ClientCrmStep::AtRiskClients => at_risk_clients(turn),
        }
    }

    fn pack(step: ClientCrmStep, data: ClientCrmData) -> FlowState {
        FlowState::ClientCrm(Progress { step, data })
    }

    fn unpack(state: FlowState) -> Option<(ClientCrmStep, ClientCrmData)> {
        match state {
            FlowState::ClientCrm(p) => Some((p.step, p.data)),
            _ => None,
        }
    }
}

fn ask_action(turn: &Turn<'_>) -> Transition<ClientCrmStep> {
    if turn.mentions(&["at risk", "at-risk", "inactive", "lapsed"]) {
        Transition::Advance(ClientCrmStep::AtRiskClients)
    } else if turn.mentions(&["follow", "send"]) {
        Transition::Advance(ClientCrmStep::SendFollowUp)
    } else if turn.mentions(&["note"]) {
        Transition::Advance(ClientCrmStep::CreateNote)
    } else if turn.mentions(&["history", "profile"]) {
        Transition::Advance(ClientCrmStep::ClientHistory)
    } else {
        Transition::Await(
            ClientCrmStep::AskAction,
            FlowReply::say("What would you like to do for your clients?").with_suggestions(MENU),
        )
    }
}

/// The client already chosen, else one named in the message
fn choose_client(data: &mut ClientCrmData, candidates: &[User], turn: &mut Turn<'_>) -> Option<User> {
    let chosen = match data.client_id {
        Some(id) => candidates.iter().find(|u| u.id == id).cloned(),
        None => pick_user(turn, candidates),
    };
    data.client_id = chosen.as_ref().map(|u| u.id);
    chosen
}

fn ask_for_client(step: ClientCrmStep, question: &str, candidates: &[User]) -> Transition<ClientCrmStep> {
    Transition::Await(
        step,
        FlowReply::say(question).with_suggestions(candidates.iter().take(10).map(|u| u.name.clone())),
    )
}

fn client_shoots(studio: &Studio, client_id: UserId) -> Result<Vec<Shoot>, FlowError> {
    Ok(studio.shoots.shoots(
        &ShootFilter::default()
            .client(client_id)
            .excluding(&[ShootStatus::Cancelled])
            .order(ShootOrder::ScheduledDesc),
    )?)
}

// ==================== History ====================

fn client_history(data: &mut ClientCrmData, turn: &mut Turn<'_>) -> Result<Transition<ClientCrmStep>, FlowError> {
    let clients = turn.studio.directory.users_with_role(Role::Client)?;
    let Some(client) = choose_client(data, &clients, turn) else {
        return Ok(ask_for_client(
            ClientCrmStep::ClientHistory,
            "Whose history would you like to see?",
            &clients,
        ));
    };

    let shoots = client_shoots(turn.studio, client.id)?;
    let billed = round2(shoots.iter().map(|s| s.total_quote).sum());
    let paid = round2(shoots.iter().map(|s| s.total_paid).sum());
    let outstanding = round2(shoots.iter().map(|s| (s.total_quote - s.total_paid).max(0.0)).sum());

    let mut counts: HashMap<i64, usize> = HashMap::new();
    for id in shoots.iter().flat_map(|s| s.service_ids.iter()) {
        *counts.entry(*id).or_default() += 1;
    }
    let mut ranked: Vec<(i64, usize)> = counts.into_iter().collect();
    ranked.sort_by_key(|(id, count)| (std::cmp::Reverse(*count), *id));
    let catalog = turn.studio.services.services()?;
    let top: Vec<&str> = ranked
        .iter()
        .take(3)
        .filter_map(|(id, _)| catalog.iter().find(|s| s.id == *id).map(|s| s.name.as_str()))
        .collect();
    let notes = turn.studio.directory.client_notes(client.id)?.len();

    let recent: Vec<String> = shoots
        .iter()
        .take(5)
        .map(|s| format!("• {} · {}", shoot_label(s), s.status))
        .collect();
    let recent = if recent.is_empty() {
        "No shoots yet.".to_string()
    } else {
        recent.join("\n")
    };
    let top = if top.is_empty() { "n/a".to_string() } else { top.join(", ") };

    Ok(Transition::Finish(
        FlowReply::say(format!(
            "👤 **{}**\n{}\n\n\
             **Shoots:** {}\n\
             **Total billed:** {}\n\
             **Paid:** {}\n\
             **Outstanding:** {}\n\
             **Top services:** {top}\n\
             **Notes:** {notes}\n\n\
             **Recent shoots:**\n{recent}",
            client.name,
            client.email,
            shoots.len(),
            format_usd(billed),
            format_usd(paid),
            format_usd(outstanding),
        ))
        .with_metadata("client_id", client.id)
        .with_suggestions(["Send follow-up", "Add client note", "Book a shoot for this client"]),
    ))
}

// ==================== Follow-ups ====================

fn send_follow_up(data: &mut ClientCrmData, turn: &mut Turn<'_>) -> Result<Transition<ClientCrmStep>, FlowError> {
    let since = turn.now - Duration::days(FOLLOW_UP_DAYS);
    let recent = turn.studio.shoots.shoots(&ShootFilter::default())?;
    let mut candidates = Vec::new();
    for client in turn.studio.directory.users_with_role(Role::Client)? {
        let completed_lately = recent
            .iter()
            .any(|s| s.client_id == client.id && s.completed_at.is_some_and(|at| at >= since));
        if completed_lately {
            candidates.push(client);
        }
    }
    if candidates.is_empty() {
        return Ok(Transition::Finish(
            FlowReply::say("No clients have wrapped up a shoot in the last 30 days.")
                .with_suggestions(["View at-risk clients"]),
        ));
    }

    if data.follow_up.is_none() {
        data.follow_up = FollowUpKind::parse(&turn.text());
    }
    let Some(client) = choose_client(data, &candidates, turn) else {
        return Ok(ask_for_client(
            ClientCrmStep::SendFollowUp,
            "Who should get a follow-up? These clients finished a shoot in the last 30 days.",
            &candidates,
        ));
    };
    let Some(kind) = data.follow_up else {
        return Ok(Transition::Await(
            ClientCrmStep::SendFollowUp,
            FlowReply::say(format!("What kind of follow-up should I send {}?", client.name)).with_suggestions([
                "Thank you",
                "Feedback request",
                "Referral request",
                "Rebooking reminder",
            ]),
        ));
    };

    match turn.studio.messenger.send_email(&kind.email(&client, turn.studio)) {
        Ok(()) => {
            tracing::info!(session_id = %turn.session_id, client_id = client.id, kind = ?kind, "Follow-up sent");
            Ok(Transition::Finish(
                FlowReply::say(format!("✉️ Sent a {} to {} ({}).", kind.label(), client.name, client.email))
                    .with_metadata("client_id", client.id)
                    .with_suggestions(["Send to another client", "View client history"]),
            ))
        }
        Err(err) => {
            log_soft_failure(turn, Intent::ClientCrm, "send_follow_up", &err);
            Ok(Transition::Finish(
                FlowReply::say(format!(
                    "I couldn't send the {} to {} right now. Please try again in a little while.",
                    kind.label(),
                    client.name
                ))
                .with_suggestions(["Send follow-up"]),
            ))
        }
    }
}

// ==================== Notes ====================

fn create_note(data: &mut ClientCrmData, turn: &mut Turn<'_>) -> Result<Transition<ClientCrmStep>, FlowError> {
    let had_client = data.client_id.is_some();
    let clients = turn.studio.directory.users_with_role(Role::Client)?;
    let Some(client) = choose_client(data, &clients, turn) else {
        return Ok(ask_for_client(
            ClientCrmStep::CreateNote,
            "Which client is this note for?",
            &clients,
        ));
    };
    let note = if had_client { turn.take_answer() } else { None };
    let Some(note) = note else {
        return Ok(Transition::Await(
            ClientCrmStep::CreateNote,
            FlowReply::say(format!("What should the note about {} say?", client.name)),
        ));
    };

    match turn.studio.directory.add_client_note(client.id, turn.user_id, &note) {
        Ok(()) => Ok(Transition::Finish(
            FlowReply::say(format!("📝 Note saved for {}.", client.name))
                .with_metadata("client_id", client.id)
                .with_suggestions(["View client history", "Add client note"]),
        )),
        Err(err) => {
            log_soft_failure(turn, Intent::ClientCrm, "create_note", &err);
            Ok(Transition::Await(
                ClientCrmStep::CreateNote,
                FlowReply::say("I couldn't save that note just now. Send it again and I'll retry."),
            ))
        }
    }
}

// ==================== At risk ====================

fn at_risk_clients(turn: &mut Turn<'_>) -> Result<Transition<ClientCrmStep>, FlowError> {
    let shoots = turn
        .studio
        .shoots
        .shoots(&ShootFilter::default().excluding(&[ShootStatus::Cancelled]))?;
    let mut activity: HashMap<UserId, (usize, DateTime<Utc>)> = HashMap::new();
    for shoot in &shoots {
        let at = shoot.scheduled_at.unwrap_or(shoot.created_at);
        let entry = activity.entry(shoot.client_id).or_insert((0, at));
        entry.0 += 1;
        entry.1 = entry.1.max(at);
    }

    let mut at_risk = Vec::new();
    for client in turn.studio.directory.users_with_role(Role::Client)? {
        let Some((count, last)) = activity.get(&client.id) else { continue };
        let days = (turn.now - *last).num_days();
        if days > AT_RISK_DAYS {
            at_risk.push((client, *count, days));
        }
    }
    if at_risk.is_empty() {
        return Ok(Transition::Finish(
            FlowReply::say("🎉 No at-risk clients. Everyone has booked in the last 60 days."),
        ));
    }
    at_risk.sort_by_key(|(_, count, days)| (std::cmp::Reverse(*count), std::cmp::Reverse(*days)));

    let lines: Vec<String> = at_risk
        .iter()
        .take(AT_RISK_LIMIT)
        .map(|(client, count, days)| {
            let marker = if *days > SEVERE_DAYS { "🔴" } else { "🟡" };
            format!("{marker} **{}**: last shoot {days} days ago ({count} shoots)", client.name)
        })
        .collect();
    Ok(Transition::Finish(
        FlowReply::say(format!(
            "⚠️ **At-risk clients** (no shoot in {AT_RISK_DAYS}+ days)\n\n{}",
            lines.join("\n")
        ))
        .with_suggestions(["Send follow-up", "View client history"]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::test_support::{text, Harness};
    use crate::studio::testing::{demo_studio, fixed_now, studio_with, FailingMessenger};
    use crate::studio::Directory;
    use std::sync::Arc;

    #[test]
    fn test_client_history() {
        let (studio, _) = demo_studio();
        let mut flow = Harness::new(ClientCrm, &studio, 3);
        let outcome = flow.send("View client history for Jordan");
        assert!(flow.state.is_none());
        let profile = text(&outcome);
        assert!(profile.contains("👤 **Jordan Lee**\njordan@example.com"));
        assert!(profile.contains("**Shoots:** 3"));
        assert!(profile.contains("**Total billed:** $1,200.00"));
        assert!(profile.contains("**Outstanding:** $650.00"));
        assert!(profile.contains("**Top services:** Photos, Video, Drone"));
        assert!(profile.contains("• #102 - 45 Oak Ave, Austin - Jun 26 · Scheduled"));
    }

    #[test]
    fn test_follow_up_conversation() {
        let (studio, backend) = demo_studio();
        let mut flow = Harness::new(ClientCrm, &studio, 3);
        let ask = flow.send("Send follow-up");
        assert_eq!(flow.step(), Some("send_follow_up"));
        assert_eq!(ask.reply.suggestions, vec!["Jordan Lee", "Priya Patel"]);

        flow.send("Priya Patel");
        let done = flow.send("Thank you");
        assert!(flow.state.is_none());
        assert!(text(&done).contains("Sent a thank-you note to Priya Patel"));
        let outbox = backend.outbox();
        assert_eq!(outbox[0].to, "priya@example.com");
        assert!(outbox[0].body.starts_with("Hi Priya Patel,"));
    }

    #[test]
    fn test_follow_up_failure_is_soft() {
        let (studio, _) = demo_studio();
        let studio = studio.with_messenger(Arc::new(FailingMessenger));
        let mut flow = Harness::new(ClientCrm, &studio, 3);
        let done = flow.send("Send Jordan a referral follow-up");
        assert!(flow.state.is_none());
        assert!(text(&done).contains("couldn't send the referral request to Jordan Lee"));
        assert!(!text(&done).contains("unreachable"));
    }

    #[test]
    fn test_note_taken_only_after_client_chosen() {
        let (studio, backend) = demo_studio();
        let mut flow = Harness::new(ClientCrm, &studio, 3);
        flow.send("Add client note");
        let ask = flow.send("Morgan");
        assert_eq!(flow.step(), Some("create_note"));
        assert!(text(&ask).contains("note about Morgan Blake"));

        flow.send("Prefers weekend shoots");
        assert!(flow.state.is_none());
        let notes = backend.client_notes(4).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].body, "Prefers weekend shoots");
        assert_eq!(notes[0].author_id, 3);
    }

    #[test]
    fn test_at_risk_clients() {
        let (studio, _) = demo_studio();
        let mut flow = Harness::new(ClientCrm, &studio, 3);
        let outcome = flow.send("View at-risk clients");
        let report = text(&outcome);
        assert!(report.contains("🔴 **Morgan Blake**: last shoot 100 days ago (1 shoots)"));
        assert!(!report.contains("Priya"));
        assert!(!report.contains("Jordan"));
    }

    #[test]
    fn test_at_risk_bands_and_boundaries() {
        let clients = [
            (30, "Sixty Days", 60),
            (31, "Seventy Five", 75),
            (32, "Ninety Days", 90),
            (33, "Ninety One", 91),
        ];
        let (studio, _) = studio_with(|data| {
            let template = data.shoots[0].clone();
            for (id, name, days) in clients {
                data.users.push(User {
                    id,
                    name: name.to_string(),
                    email: format!("client{id}@example.com"),
                    role: Role::Client,
                    active: true,
                });
                data.shoots.push(Shoot {
                    id: 300 + id,
                    client_id: id,
                    scheduled_at: Some(fixed_now() - Duration::days(days)),
                    status: ShootStatus::Completed,
                    ..template.clone()
                });
            }
        });
        let mut flow = Harness::new(ClientCrm, &studio, 3);
        let report = text(&flow.send("View at-risk clients"));

        assert!(!report.contains("Sixty Days"));
        assert!(report.contains("🟡 **Seventy Five**: last shoot 75 days ago (1 shoots)"));
        assert!(report.contains("🟡 **Ninety Days**: last shoot 90 days ago (1 shoots)"));
        assert!(report.contains("🔴 **Ninety One**: last shoot 91 days ago (1 shoots)"));
        assert!(report.contains("🔴 **Morgan Blake**"));
    }
}
