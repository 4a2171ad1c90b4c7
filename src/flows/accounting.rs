//! Revenue and invoice summary for a period

use crate::intent::Intent;
use crate::money::{format_usd, round2};
use crate::state_machine::extract::find_phrase;
use crate::state_machine::{
    FlowError, FlowReply, FlowState, Progress, StepMachine, StepName, Transition, Turn,
};
use crate::studio::{InvoiceFilter, InvoiceStatus, ShootFilter, ShootStatus};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountingStep {
    AskPeriod,
    ShowSummary,
}

impl StepName for AccountingStep {
    fn name(self) -> &'static str {
        match self {
            AccountingStep::AskPeriod => "ask_period",
            AccountingStep::ShowSummary => "show_summary",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    ThisMonth,
    LastMonth,
    ThisQuarter,
    ThisYear,
    AllTime,
}

/// First instant counted by `all_time`
const EPOCH_YEAR: i32 = 2020;

impl Period {
    /// Period named in the text; "last month" wins over "month"
    pub fn parse(text: &str) -> Option<Period> {
        if text.contains("last month") || text.contains("previous month") {
            Some(Period::LastMonth)
        } else if text.contains("month") {
            Some(Period::ThisMonth)
        } else if text.contains("quarter") {
            Some(Period::ThisQuarter)
        } else if text.contains("year") || text.contains("ytd") {
            Some(Period::ThisYear)
        } else if text.contains("all-time") || find_phrase(text, "all").is_some() {
            Some(Period::AllTime)
        } else {
            None
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Period::ThisMonth => "This month",
            Period::LastMonth => "Last month",
            Period::ThisQuarter => "This quarter",
            Period::ThisYear => "This year",
            Period::AllTime => "All time",
        }
    }

    /// Inclusive bounds, from midnight on the first day to the last second
    /// of the last day
    pub fn bounds(self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let today = now.date_naive();
        let (year, month) = (today.year(), today.month());
        let (first, next) = match self {
            Period::ThisMonth => (month_start(year, month), month_start_after(year, month, 1)),
            Period::LastMonth => {
                let first = month_start_after(year, month, -1);
                (first, month_start(year, month))
            }
            Period::ThisQuarter => {
                let start_month = (month - 1) / 3 * 3 + 1;
                (
                    month_start(year, start_month),
                    month_start_after(year, start_month, 3),
                )
            }
            Period::ThisYear => (month_start(year, 1), month_start(year + 1, 1)),
            Period::AllTime => {
                return (month_start(EPOCH_YEAR, 1).and_time(NaiveTime::MIN).and_utc(), now);
            }
        };
        (
            first.and_time(NaiveTime::MIN).and_utc(),
            next.and_time(NaiveTime::MIN).and_utc() - Duration::seconds(1),
        )
    }
}

fn month_start(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

/// First day of the month `offset` months away from `year`-`month`
fn month_start_after(year: i32, month: u32, offset: i32) -> NaiveDate {
    let index = year * 12 + month.cast_signed() - 1 + offset;
    month_start(index.div_euclid(12), index.rem_euclid(12).cast_unsigned() + 1)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountingData {
    pub period: Option<Period>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl AccountingData {
    pub fn select(&mut self, period: Period, now: DateTime<Utc>) {
        let (start, end) = period.bounds(now);
        self.period = Some(period);
        self.start = Some(start);
        self.end = Some(end);
    }
}

const PERIOD_SUGGESTIONS: [&str; 5] = [
    "This month",
    "Last month",
    "This quarter",
    "This year",
    "All time",
];

pub struct Accounting;

impl StepMachine for Accounting {
    type Step = AccountingStep;
    type Data = AccountingData;

    const INTENT: Intent = Intent::Accounting;

    fn initial_step(&self) -> AccountingStep {
        AccountingStep::AskPeriod
    }

    fn step(
        &self,
        step: AccountingStep,
        data: &mut AccountingData,
        turn: &mut Turn<'_>,
    ) -> Result<Transition<AccountingStep>, FlowError> {
        match step {
            AccountingStep::AskPeriod => {
                if data.period.is_none() {
                    if let Some(period) = Period::parse(&turn.text()) {
                        data.select(period, turn.now);
                    }
                }
                if data.period.is_some() {
                    return Ok(Transition::Advance(AccountingStep::ShowSummary));
                }
                Ok(Transition::Await(
                    AccountingStep::AskPeriod,
                    FlowReply::say("Which period would you like to see?")
                        .with_suggestions(PERIOD_SUGGESTIONS),
                ))
            }
            AccountingStep::ShowSummary => {
                if turn.answering {
                    if let Some(period) = Period::parse(&turn.text()) {
                        data.select(period, turn.now);
                    }
                }
                let reply = summary(data, turn)?;
                Ok(Transition::Await(AccountingStep::ShowSummary, reply))
            }
        }
    }

    fn pack(step: AccountingStep, data: AccountingData) -> FlowState {
        FlowState::Accounting(Progress { step, data })
    }

    fn unpack(state: FlowState) -> Option<(AccountingStep, AccountingData)> {
        match state {
            FlowState::Accounting(p) => Some((p.step, p.data)),
            _ => None,
        }
    }
}

fn summary(data: &AccountingData, turn: &Turn<'_>) -> Result<FlowReply, FlowError> {
    let (Some(period), Some(start), Some(end)) = (data.period, data.start, data.end) else {
        return Err(FlowError::InvalidState("summary without a period".to_string()));
    };

    let shoots = turn.studio.shoots.shoots(
        &ShootFilter::default()
            .involving(turn.user_id)
            .created_between(start, end)
            .excluding(&[ShootStatus::Cancelled]),
    )?;
    let billed = round2(shoots.iter().map(|s| s.total_quote).sum());
    let collected = round2(shoots.iter().map(|s| s.total_paid).sum());
    let pending = round2((billed - collected).max(0.0));

    let own_shoots: Vec<_> = turn
        .studio
        .shoots
        .shoots(&ShootFilter::default().involving(turn.user_id))?
        .into_iter()
        .map(|s| s.id)
        .collect();
    let invoices: Vec<_> = turn
        .studio
        .invoices
        .invoices(&InvoiceFilter::default())?
        .into_iter()
        .filter(|i| {
            i.client_id == turn.user_id || i.shoot_id.is_some_and(|id| own_shoots.contains(&id))
        })
        .filter(|i| i.created_at >= start && i.created_at <= end)
        .collect();
    let invoiced = round2(invoices.iter().map(|i| i.total).sum());
    let invoices_paid = round2(
        invoices
            .iter()
            .filter(|i| i.status == InvoiceStatus::Paid)
            .map(|i| i.total)
            .sum(),
    );
    let last_payment = invoices
        .iter()
        .filter_map(|i| i.paid_at)
        .max()
        .map_or_else(|| "None yet".to_string(), |at| at.format("%b %-d, %Y").to_string());

    let text = format!(
        "💰 **Accounting Summary: {}**\n_{} to {}_\n\n\
         **Revenue:** {} ({} paid, {} pending)\n\
         **Invoices:** {} ({} paid, {} outstanding)\n\
         **Shoots:** {}\n\
         **Last payment:** {}",
        period.label(),
        start.format("%b %-d, %Y"),
        end.format("%b %-d, %Y"),
        format_usd(billed),
        format_usd(collected),
        format_usd(pending),
        format_usd(invoiced),
        format_usd(invoices_paid),
        format_usd(round2(invoiced - invoices_paid)),
        shoots.len(),
        last_payment,
    );
    Ok(FlowReply::say(text)
        .with_metadata("period", period.label())
        .with_suggestions([
            "View this month",
            "View last month",
            "View this quarter",
            "Check client stats",
        ]))
}
