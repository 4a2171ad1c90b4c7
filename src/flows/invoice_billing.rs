//! Invoices and discounts

use super::{
    is_staff, log_soft_failure, pick_shoot, scope, shoot_label, shoot_labels, unknown_reference,
    Pick,
};
use crate::intent::Intent;
use crate::money::format_usd;
use crate::state_machine::extract::{self, Discount};
use crate::state_machine::{
    Action, FlowError, FlowReply, FlowState, Progress, StepMachine, StepName, Transition, Turn,
};
use crate::studio::{
    Email, Invoice, InvoiceFilter, InvoiceId, InvoiceStatus, NewInvoice, ShootId, ShootOrder,
    ShootStatus, ShootUpdate,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceBillingStep {
    AskAction,
    CreateInvoice,
    SendInvoice,
    OutstandingInvoices,
    ApplyDiscount,
}

impl StepName for InvoiceBillingStep {
    fn name(self) -> &'static str {
        match self {
            InvoiceBillingStep::AskAction => "ask_action",
            InvoiceBillingStep::CreateInvoice => "create_invoice",
            InvoiceBillingStep::SendInvoice => "send_invoice",
            InvoiceBillingStep::OutstandingInvoices => "outstanding_invoices",
            InvoiceBillingStep::ApplyDiscount => "apply_discount",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceBillingData {
    pub shoot_id: Option<ShootId>,
    /// Invoice created or picked in this flow
    pub invoice_id: Option<InvoiceId>,
    pub discount: Option<Discount>,
}

/// Days until a new invoice is due
const PAYMENT_TERMS_DAYS: i64 = 30;

const MENU: [&str; 4] = [
    "Create invoice for a shoot",
    "Send invoice to client",
    "View outstanding invoices",
    "Apply discount to booking",
];

pub struct InvoiceBilling;

impl StepMachine for InvoiceBilling {
    type Step = InvoiceBillingStep;
    type Data = InvoiceBillingData;

    const INTENT: Intent = Intent::InvoiceBilling;

    fn initial_step(&self) -> InvoiceBillingStep {
        InvoiceBillingStep::AskAction
    }

    fn step(
        &self,
        step: InvoiceBillingStep,
        data: &mut InvoiceBillingData,
        turn: &mut Turn<'_>,
    ) -> Result<Transition<InvoiceBillingStep>, FlowError> {
        match step {
            InvoiceBillingStep::AskAction => Ok(ask_action(turn)),
            InvoiceBillingStep::CreateInvoice => create_invoice(data, turn),
            InvoiceBillingStep::SendInvoice => send_invoice(data, turn),
            InvoiceBillingStep::OutstandingInvoices => outstanding(turn),
            InvoiceBillingStep::ApplyDiscount => apply_discount(data, turn),
        }
    }

    fn pack(step: InvoiceBillingStep, data: InvoiceBillingData) -> FlowState {
        FlowState::InvoiceBilling(Progress { step, data })
    }

    fn unpack(state: FlowState) -> Option<(InvoiceBillingStep, InvoiceBillingData)> {
        match state {
            FlowState::InvoiceBilling(p) => Some((p.step, p.data)),
            _ => None,
        }
    }
}

fn ask_action(turn: &Turn<'_>) -> Transition<InvoiceBillingStep> {
    if turn.mentions(&["discount", "promo", "% off", "$ off"]) {
        Transition::Advance(InvoiceBillingStep::ApplyDiscount)
    } else if turn.mentions(&["outstanding", "unpaid", "overdue", "owed"]) {
        Transition::Advance(InvoiceBillingStep::OutstandingInvoices)
    } else if turn.mentions(&["send"]) {
        Transition::Advance(InvoiceBillingStep::SendInvoice)
    } else if turn.mentions(&["create", "new invoice", "generate", "make"]) {
        Transition::Advance(InvoiceBillingStep::CreateInvoice)
    } else {
        Transition::Await(
            InvoiceBillingStep::AskAction,
            FlowReply::say("What would you like to do with billing?").with_suggestions(MENU),
        )
    }
}

// ==================== Create & send ====================

fn create_invoice(
    data: &mut InvoiceBillingData,
    turn: &mut Turn<'_>,
) -> Result<Transition<InvoiceBillingStep>, FlowError> {
    let invoiced: Vec<ShootId> = turn
        .studio
        .invoices
        .invoices(&InvoiceFilter::default())?
        .into_iter()
        .filter_map(|i| i.shoot_id)
        .collect();
    let candidates: Vec<_> = turn
        .studio
        .shoots
        .shoots(
            &scope(turn)
                .with_status(&[ShootStatus::Completed, ShootStatus::Delivered, ShootStatus::Ready])
                .order(ShootOrder::ScheduledDesc),
        )?
        .into_iter()
        .filter(|s| !invoiced.contains(&s.id))
        .take(10)
        .collect();

    let retry = data
        .shoot_id
        .and_then(|id| candidates.iter().find(|s| s.id == id).cloned());
    let picked = match retry {
        Some(shoot) => Pick::Found(shoot),
        None => pick_shoot(turn, &candidates),
    };
    let shoot = match picked {
        Pick::Found(shoot) => shoot,
        Pick::Missing(reference) => {
            return Ok(Transition::Await(
                InvoiceBillingStep::CreateInvoice,
                unknown_reference("an uninvoiced shoot", &reference, shoot_labels(&candidates)),
            ));
        }
        Pick::Nothing if candidates.is_empty() => {
            return Ok(Transition::Finish(
                FlowReply::say("Every completed shoot already has an invoice. 🎉")
                    .with_suggestions(["View outstanding invoices", "Send invoice to client"]),
            ));
        }
        Pick::Nothing => {
            return Ok(Transition::Await(
                InvoiceBillingStep::CreateInvoice,
                FlowReply::say("Which shoot should I invoice?")
                    .with_suggestions(shoot_labels(&candidates)),
            ));
        }
    };
    data.shoot_id = Some(shoot.id);

    let today = turn.today();
    let request = NewInvoice {
        number: format!("INV-{}-{:04}", today.format("%Y%m%d"), shoot.id),
        shoot_id: Some(shoot.id),
        client_id: shoot.client_id,
        photographer_id: shoot.photographer_id,
        total: shoot.total_quote,
        due_date: today + Duration::days(PAYMENT_TERMS_DAYS),
    };
    let invoice = match turn.studio.invoices.create_invoice(&request) {
        Ok(invoice) => invoice,
        Err(err) => {
            log_soft_failure(turn, Intent::InvoiceBilling, "create_invoice", &err);
            return Ok(Transition::Await(
                InvoiceBillingStep::CreateInvoice,
                FlowReply::say("I couldn't create that invoice just now. Want me to try again?")
                    .with_suggestions(["Try again", "Start over"]),
            ));
        }
    };
    data.invoice_id = Some(invoice.id);

    Ok(Transition::Await(
        InvoiceBillingStep::SendInvoice,
        FlowReply::say(format!(
            "🧾 Created invoice **{}** for {} ({}), due {}.\n\nShould I send it to the client?",
            invoice.number,
            shoot_label(&shoot),
            format_usd(invoice.total),
            invoice.due_date.format("%b %-d, %Y"),
        ))
        .with_metadata("invoice_id", invoice.id)
        .with_action(Action::ViewInvoice {
            invoice_id: invoice.id,
        })
        .with_suggestions([
            "Yes, send to client",
            "Create another invoice",
            "View outstanding invoices",
        ]),
    ))
}

fn invoice_label(invoice: &Invoice, turn: &Turn<'_>) -> String {
    let client = turn
        .studio
        .directory
        .user(invoice.client_id)
        .map_or_else(|_| format!("client {}", invoice.client_id), |u| u.name);
    format!("{} · {} · {}", invoice.number, client, format_usd(invoice.total))
}

fn send_invoice(
    data: &mut InvoiceBillingData,
    turn: &mut Turn<'_>,
) -> Result<Transition<InvoiceBillingStep>, FlowError> {
    if let Some(invoice_id) = data.invoice_id {
        if turn.mentions(&["create", "another"]) {
            *data = InvoiceBillingData::default();
            return Ok(Transition::Advance(InvoiceBillingStep::CreateInvoice));
        }
        if turn.mentions(&["outstanding"]) {
            return Ok(Transition::Advance(InvoiceBillingStep::OutstandingInvoices));
        }
        let text = turn.text();
        if extract::is_negative(&text) {
            return Ok(Transition::Finish(
                FlowReply::say("Okay, I'll leave it as a draft. You can send it any time.")
                    .with_suggestions(["Send invoice to client", "View outstanding invoices"]),
            ));
        }
        if extract::is_affirmative(&text) || turn.mentions(&["send"]) {
            return deliver(invoice_id, turn);
        }
        return Ok(Transition::Await(
            InvoiceBillingStep::SendInvoice,
            FlowReply::say("Should I send this invoice to the client?")
                .with_suggestions(["Yes, send to client", "No, keep as draft"]),
        ));
    }

    let drafts = turn.studio.invoices.invoices(&InvoiceFilter {
        status: Some(InvoiceStatus::Draft),
        ..InvoiceFilter::default()
    })?;
    if drafts.is_empty() {
        return Ok(Transition::Finish(
            FlowReply::say("There are no draft invoices waiting to be sent.")
                .with_suggestions(["Create invoice", "View outstanding invoices"]),
        ));
    }
    let labels: Vec<String> = drafts.iter().map(|i| invoice_label(i, turn)).collect();
    if let Some(number) = turn.take(extract::invoice_number) {
        return match drafts.iter().find(|i| i.number == number) {
            Some(invoice) => deliver(invoice.id, turn),
            None => Ok(Transition::Await(
                InvoiceBillingStep::SendInvoice,
                unknown_reference("draft invoice", &number, labels),
            )),
        };
    }
    Ok(Transition::Await(
        InvoiceBillingStep::SendInvoice,
        FlowReply::say("Which invoice should I send?").with_suggestions(labels),
    ))
}

/// Mark the invoice sent and email the client
fn deliver(invoice_id: InvoiceId, turn: &mut Turn<'_>) -> Result<Transition<InvoiceBillingStep>, FlowError> {
    let invoice = match turn.studio.invoices.mark_invoice_sent(invoice_id) {
        Ok(invoice) => invoice,
        Err(err) => {
            log_soft_failure(turn, Intent::InvoiceBilling, "send_invoice", &err);
            return Ok(Transition::Finish(
                FlowReply::say(format!("I couldn't send that invoice: {}.", err.message))
                    .with_suggestions(["View outstanding invoices", "Create invoice"]),
            ));
        }
    };
    let client = turn.studio.directory.user(invoice.client_id)?;
    let link = turn.studio.link(&format!("/invoices/{}", invoice.id));
    let email = Email {
        to: client.email.clone(),
        subject: format!("Invoice {}", invoice.number),
        body: format!(
            "Hi {},\n\nYour invoice {} for {} is ready and due {}.\nView and pay it here: {link}\n\nThank you!",
            client.name,
            invoice.number,
            format_usd(invoice.total),
            invoice.due_date.format("%B %-d, %Y"),
        ),
    };
    let text = match turn.studio.messenger.send_email(&email) {
        Ok(()) => format!(
            "📨 Sent invoice **{}** to {} ({}).",
            invoice.number, client.name, client.email
        ),
        Err(err) => {
            log_soft_failure(turn, Intent::InvoiceBilling, "send_invoice", &err);
            format!(
                "Invoice **{}** is marked as sent, but I couldn't email {} right now. Please share it manually.",
                invoice.number, client.name
            )
        }
    };
    Ok(Transition::Finish(
        FlowReply::say(text)
            .with_metadata("invoice_id", invoice.id)
            .with_suggestions(["View outstanding invoices", "Create another invoice"]),
    ))
}

// ==================== Outstanding ====================

fn outstanding(turn: &Turn<'_>) -> Result<Transition<InvoiceBillingStep>, FlowError> {
    let mut filter = InvoiceFilter {
        unpaid_only: true,
        ..InvoiceFilter::default()
    };
    if !is_staff(turn) {
        filter.client_id = Some(turn.user_id);
    }
    let invoices = turn.studio.invoices.invoices(&filter)?;
    if invoices.is_empty() {
        return Ok(Transition::Finish(
            FlowReply::say("🎉 No outstanding invoices. Everything is paid up!")
                .with_suggestions(["Create invoice", "Accounting summary"]),
        ));
    }

    let today = turn.today();
    let total: f64 = invoices.iter().map(|i| i.total).sum();
    let overdue = invoices.iter().filter(|i| i.is_overdue(today)).count();
    let lines: Vec<String> = invoices
        .iter()
        .take(10)
        .map(|i| {
            let state = if i.is_overdue(today) {
                "⚠️ overdue".to_string()
            } else if i.status == InvoiceStatus::Draft {
                "draft".to_string()
            } else {
                "sent".to_string()
            };
            format!(
                "• {} · due {} · {}",
                invoice_label(i, turn),
                i.due_date.format("%b %-d"),
                state
            )
        })
        .collect();
    Ok(Transition::Finish(
        FlowReply::say(format!(
            "**Outstanding invoices:** {} totaling {} ({overdue} overdue)\n\n{}",
            invoices.len(),
            format_usd(total),
            lines.join("\n")
        ))
        .with_suggestions(["Send invoice to client", "Create invoice", "Apply discount"]),
    ))
}

// ==================== Discounts ====================

fn apply_discount(
    data: &mut InvoiceBillingData,
    turn: &mut Turn<'_>,
) -> Result<Transition<InvoiceBillingStep>, FlowError> {
    let had_shoot = data.shoot_id.is_some();
    if !had_shoot {
        let candidates = turn.studio.shoots.shoots(
            &scope(turn)
                .excluding(&[ShootStatus::Cancelled])
                .order(ShootOrder::CreatedDesc)
                .limit(10),
        )?;
        match pick_shoot(turn, &candidates) {
            Pick::Found(shoot) => data.shoot_id = Some(shoot.id),
            Pick::Missing(reference) => {
                return Ok(Transition::Await(
                    InvoiceBillingStep::ApplyDiscount,
                    unknown_reference("booking", &reference, shoot_labels(&candidates)),
                ));
            }
            Pick::Nothing => {
                // Hold on to a discount given before the booking
                if data.discount.is_none() {
                    data.discount = turn.take(|t| extract::discount(t, false));
                }
                return Ok(Transition::Await(
                    InvoiceBillingStep::ApplyDiscount,
                    FlowReply::say("Which booking should get the discount?")
                        .with_suggestions(shoot_labels(&candidates)),
                ));
            }
        }
    }
    let Some(shoot_id) = data.shoot_id else {
        return Err(FlowError::InvalidState("discount without a booking".to_string()));
    };

    // A bare number only counts once we are waiting for the amount
    let allow_bare = had_shoot && turn.answering;
    if let Some(discount) = turn.take(|t| extract::discount(t, allow_bare)) {
        data.discount = Some(discount);
    }
    let Some(discount) = data.discount else {
        return Ok(Transition::Await(
            InvoiceBillingStep::ApplyDiscount,
            FlowReply::say(
                "How much of a discount? Say a percentage like 15% or an amount like $50.",
            )
            .with_suggestions(["10%", "15%", "20%", "$50", "$100"]),
        ));
    };

    let shoot = turn.studio.shoots.shoot(shoot_id)?;
    let original = shoot.total_quote;
    let discounted = discount.apply(original);
    let update = ShootUpdate {
        total_quote: Some(discounted),
        ..ShootUpdate::default()
    };
    if let Err(err) = turn.studio.shoots.update_shoot(shoot_id, &update) {
        log_soft_failure(turn, Intent::InvoiceBilling, "apply_discount", &err);
        return Ok(Transition::Await(
            InvoiceBillingStep::ApplyDiscount,
            FlowReply::say("I couldn't apply that discount just now. Want me to try again?")
                .with_suggestions(["Try again", "Start over"]),
        ));
    }
    Ok(Transition::Finish(
        FlowReply::say(format!(
            "✅ Applied a **{}** discount to {}. {} → **{}** (saved {}).",
            discount.label(),
            shoot_label(&shoot),
            format_usd(original),
            format_usd(discounted),
            format_usd(discount.amount_off(original)),
        ))
        .with_metadata("shoot_id", shoot_id)
        .with_suggestions(["Create invoice", "View outstanding invoices"]),
    ))
}
