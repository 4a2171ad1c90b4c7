//! Booking and payment stats for one client

use super::pick_user;
use crate::intent::Intent;
use crate::money::{format_usd, round2};
use crate::state_machine::extract::find_any;
use crate::state_machine::{
    FlowError, FlowReply, FlowState, Progress, StepMachine, StepName, Transition, Turn,
};
use crate::studio::{PaymentStatus, Role, Shoot, ShootFilter, ShootStatus, Studio, User, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatsStep {
    AskClient,
    ShowSummary,
}

impl StepName for ClientStatsStep {
    fn name(self) -> &'static str {
        match self {
            ClientStatsStep::AskClient => "ask_client",
            ClientStatsStep::ShowSummary => "show_summary",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientStatsData {
    pub client_id: Option<UserId>,
    pub client_name: Option<String>,
}

const SELF_WORDS: &[&str] = &["my", "me", "mine", "myself"];

/// Clients offered as quick replies
const CLIENT_OPTIONS: usize = 10;

pub struct ClientStats;

impl StepMachine for ClientStats {
    type Step = ClientStatsStep;
    type Data = ClientStatsData;

    const INTENT: Intent = Intent::ClientStats;

    fn initial_step(&self) -> ClientStatsStep {
        ClientStatsStep::AskClient
    }

    fn step(
        &self,
        step: ClientStatsStep,
        data: &mut ClientStatsData,
        turn: &mut Turn<'_>,
    ) -> Result<Transition<ClientStatsStep>, FlowError> {
        match step {
            ClientStatsStep::AskClient => {
                if data.client_id.is_none() {
                    choose_client(data, turn)?;
                }
                if data.client_id.is_some() {
                    return Ok(Transition::Advance(ClientStatsStep::ShowSummary));
                }
                let options = client_options(turn.studio)?;
                Ok(Transition::Await(
                    ClientStatsStep::AskClient,
                    FlowReply::say("Whose stats would you like to see?").with_suggestions(options),
                ))
            }
            ClientStatsStep::ShowSummary => {
                if turn.answering {
                    if turn.mentions(&["another client", "other client"]) {
                        *data = ClientStatsData::default();
                        return Ok(Transition::Advance(ClientStatsStep::AskClient));
                    }
                    choose_client(data, turn)?;
                }
                let (Some(client_id), Some(name)) = (data.client_id, data.client_name.clone()) else {
                    return Ok(Transition::Advance(ClientStatsStep::AskClient));
                };
                let stats = Stats::collect(turn.studio, client_id, turn.now)?;
                Ok(Transition::Await(
                    ClientStatsStep::ShowSummary,
                    stats
                        .reply(&name)
                        .with_metadata("client_id", client_id)
                        .with_suggestions([
                            "View another client",
                            "Book a shoot for this client",
                            "See accounting summary",
                        ]),
                ))
            }
        }
    }

    fn pack(step: ClientStatsStep, data: ClientStatsData) -> FlowState {
        FlowState::ClientStats(Progress { step, data })
    }

    fn unpack(state: FlowState) -> Option<(ClientStatsStep, ClientStatsData)> {
        match state {
            FlowState::ClientStats(p) => Some((p.step, p.data)),
            _ => None,
        }
    }
}

/// Set the client from "my stats" or a client's name
fn choose_client(data: &mut ClientStatsData, turn: &mut Turn<'_>) -> Result<(), FlowError> {
    if turn.take(|t| find_any(t, SELF_WORDS)).is_some() {
        let me = turn.studio.directory.user(turn.user_id)?;
        data.client_id = Some(me.id);
        data.client_name = Some(me.name);
        return Ok(());
    }
    let clients = turn.studio.directory.users_with_role(Role::Client)?;
    if let Some(client) = pick_user(turn, &clients) {
        data.client_id = Some(client.id);
        data.client_name = Some(client.name);
    }
    Ok(())
}

/// "My stats" plus the ten busiest clients with their shoot counts
fn client_options(studio: &Studio) -> Result<Vec<String>, FlowError> {
    let shoots = studio.shoots.shoots(&ShootFilter::default())?;
    let mut clients: Vec<(User, usize)> = studio
        .directory
        .users_with_role(Role::Client)?
        .into_iter()
        .map(|client| {
            let count = shoots.iter().filter(|s| s.client_id == client.id).count();
            (client, count)
        })
        .collect();
    clients.sort_by_key(|(client, count)| (Reverse(*count), client.id));

    let mut options = vec!["My stats".to_string()];
    options.extend(
        clients
            .iter()
            .take(CLIENT_OPTIONS)
            .map(|(client, count)| format!("{} ({count} shoots)", client.name)),
    );
    Ok(options)
}

struct Stats {
    last_30: (usize, f64),
    last_90: (usize, f64),
    total: usize,
    completed: usize,
    revenue: f64,
    pending: f64,
    turnaround_days: Option<f64>,
    top_service: Option<String>,
}

impl Stats {
    #[allow(clippy::cast_precision_loss)]
    fn collect(studio: &Studio, client_id: UserId, now: DateTime<Utc>) -> Result<Stats, FlowError> {
        let shoots: Vec<Shoot> = studio
            .shoots
            .shoots(&ShootFilter::default().client(client_id))?
            .into_iter()
            .filter(|s| s.status != ShootStatus::Cancelled)
            .collect();
        let window = |days: i64| {
            let since = now - Duration::days(days);
            let recent: Vec<&Shoot> = shoots.iter().filter(|s| s.created_at >= since).collect();
            (recent.len(), round2(recent.iter().map(|s| s.total_quote).sum()))
        };

        let turnarounds: Vec<f64> = shoots
            .iter()
            .filter_map(|s| Some((s.completed_at? - s.scheduled_at?).num_hours()))
            .map(|hours| hours as f64 / 24.0)
            .collect();
        let turnaround_days = (!turnarounds.is_empty())
            .then(|| (turnarounds.iter().sum::<f64>() / turnarounds.len() as f64 * 10.0).round() / 10.0);

        let mut counts: HashMap<i64, usize> = HashMap::new();
        for id in shoots.iter().flat_map(|s| s.service_ids.iter()) {
            *counts.entry(*id).or_default() += 1;
        }
        let top_id = counts
            .into_iter()
            .max_by_key(|(id, count)| (*count, std::cmp::Reverse(*id)))
            .map(|(id, _)| id);
        let top_service = match top_id {
            Some(id) => studio.service_names(&[id])?.into_iter().next(),
            None => None,
        };

        Ok(Stats {
            last_30: window(30),
            last_90: window(90),
            total: shoots.len(),
            completed: shoots
                .iter()
                .filter(|s| matches!(s.status, ShootStatus::Completed | ShootStatus::Delivered))
                .count(),
            revenue: round2(shoots.iter().map(|s| s.total_quote).sum()),
            pending: round2(
                shoots
                    .iter()
                    .filter(|s| s.payment_status != PaymentStatus::Paid)
                    .map(|s| (s.total_quote - s.total_paid).max(0.0))
                    .sum(),
            ),
            turnaround_days,
            top_service,
        })
    }

    fn reply(&self, name: &str) -> FlowReply {
        let turnaround = self
            .turnaround_days
            .map_or_else(|| "n/a".to_string(), |d| format!("{d:.1} days"));
        FlowReply::say(format!(
            "📊 **Client Stats: {name}**\n\n\
             **Last 30 days:** {} shoots, {}\n\
             **Last 90 days:** {} shoots, {}\n\
             **All time:** {} shoots ({} completed), {}\n\
             **Pending payments:** {}\n\
             **Avg turnaround:** {}\n\
             **Top service:** {}",
            self.last_30.0,
            format_usd(self.last_30.1),
            self.last_90.0,
            format_usd(self.last_90.1),
            self.total,
            self.completed,
            format_usd(self.revenue),
            format_usd(self.pending),
            turnaround,
            self.top_service.as_deref().unwrap_or("n/a"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::test_support::{text, Harness};
    use crate::studio::testing::{demo_studio, studio_with};

    #[test]
    fn test_my_stats() {
        let (studio, _) = demo_studio();
        let mut flow = Harness::new(ClientStats, &studio, 1);
        let outcome = flow.send("show my stats");
        assert_eq!(flow.step(), Some("show_summary"));
        let summary = text(&outcome);
        assert!(summary.contains("Client Stats: Jordan Lee"));
        assert!(summary.contains("**Last 30 days:** 3 shoots, $1,200.00"));
        assert!(summary.contains("**All time:** 3 shoots (1 completed), $1,200.00"));
        assert!(summary.contains("**Pending payments:** $650.00"));
        // 103 was shot on the 27th and finished two days and six hours later
        assert!(summary.contains("**Avg turnaround:** 2.3 days"));
        assert!(summary.contains("**Top service:** Photos"));
    }

    #[test]
    fn test_pick_client_from_list() {
        let (studio, _) = demo_studio();
        let mut flow = Harness::new(ClientStats, &studio, 3);
        let ask = flow.send("Client stats");
        assert_eq!(flow.step(), Some("ask_client"));
        assert_eq!(
            ask.reply.suggestions,
            vec![
                "My stats",
                "Jordan Lee (3 shoots)",
                "Priya Patel (1 shoots)",
                "Morgan Blake (1 shoots)"
            ]
        );

        let outcome = flow.send("Morgan Blake (1 shoots)");
        let summary = text(&outcome);
        assert!(summary.contains("Client Stats: Morgan Blake"));
        assert!(summary.contains("**Last 30 days:** 0 shoots, $0.00"));
        assert!(summary.contains("**Pending payments:** $0.00"));
    }

    #[test]
    fn test_client_list_is_busiest_first_and_capped() {
        let (studio, _) = studio_with(|data| {
            for id in 20..29 {
                data.users.push(User {
                    id,
                    name: format!("Client {id}"),
                    email: format!("client{id}@example.com"),
                    role: Role::Client,
                    active: true,
                });
            }
            // Client 28 sorts last by name but has two shoots
            let template = data.shoots[0].clone();
            for id in [201, 202] {
                data.shoots.push(Shoot {
                    id,
                    client_id: 28,
                    ..template.clone()
                });
            }
        });
        let mut flow = Harness::new(ClientStats, &studio, 3);
        let ask = flow.send("Client stats");
        assert_eq!(
            ask.reply.suggestions,
            vec![
                "My stats",
                "Jordan Lee (3 shoots)",
                "Client 28 (2 shoots)",
                "Priya Patel (1 shoots)",
                "Morgan Blake (1 shoots)",
                "Client 20 (0 shoots)",
                "Client 21 (0 shoots)",
                "Client 22 (0 shoots)",
                "Client 23 (0 shoots)",
                "Client 24 (0 shoots)",
                "Client 25 (0 shoots)",
            ]
        );
    }

    #[test]
    fn test_requery_is_stable() {
        let (studio, _) = demo_studio();
        let mut flow = Harness::new(ClientStats, &studio, 1);
        let first = flow.send("my stats");
        let state = flow.state.clone();
        let second = flow.send("my stats");
        assert_eq!(text(&first), text(&second));
        assert_eq!(flow.state, state);

        let other = flow.send("Priya");
        assert!(text(&other).contains("Client Stats: Priya Patel"));
    }
}
