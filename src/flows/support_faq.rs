//! Help desk: canned answers, hand-off to a person and support tickets

use super::log_soft_failure;
use crate::intent::Intent;
use crate::state_machine::{
    FlowError, FlowReply, FlowState, Progress, StepMachine, StepName, Transition, Turn,
};
use crate::studio::Email;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportFaqStep {
    AskQuestion,
    Escalate,
    CreateTicket,
}

impl StepName for SupportFaqStep {
    fn name(self) -> &'static str {
        match self {
            SupportFaqStep::AskQuestion => "ask_question",
            SupportFaqStep::Escalate => "escalate",
            SupportFaqStep::CreateTicket => "create_ticket",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportFaqData {
    /// What the user wants a person to help with
    pub reason: Option<String>,
    pub subject: Option<String>,
    pub description: Option<String>,
}

/// A canned answer and the words that point to it
pub struct FaqTopic {
    pub topic: &'static str,
    pub keywords: &'static [&'static str],
    /// `{support}` is replaced with the support inbox
    pub answer: &'static str,
}

const fn faq(topic: &'static str, keywords: &'static [&'static str], answer: &'static str) -> FaqTopic {
    FaqTopic { topic, keywords, answer }
}

/// Scored by keyword hits; earlier topics win ties
pub const FAQ_TOPICS: &[FaqTopic] = &[
    faq(
        "booking",
        &["book", "schedule", "appointment", "reserve"],
        "📅 **How do I book a shoot?**\n\nSay **\"Book a new shoot\"** right here and I'll walk you through it: the property, a date, a time and the services you need. You can also email {support}.",
    ),
    faq(
        "turnaround",
        &["how long", "turnaround", "when ready", "delivery time", "how fast", "get my photos"],
        "⏱️ **How long until I get my photos?**\n\n• Photos and video: within 24 hours\n• Floor plans and drone edits: up to 48 hours\n• Custom projects: we'll agree on a delivery date up front",
    ),
    faq(
        "copyright",
        &["copyright", "rights", "ownership", "license", "resell"],
        "📜 **Who owns the images?**\n\nThe studio keeps the copyright. You can use the images without limit to list and market the property, but you can't resell or transfer them. Contact {support} if you need a full release.",
    ),
    faq(
        "staging",
        &["stage", "staging", "furniture", "declutter"],
        "🏠 **Will the photographer stage the property?**\n\nNo. Photographers work on tight schedules and won't move furniture or belongings. They're happy to switch on lights and open blinds, but the property should be photo ready when they arrive.",
    ),
    faq(
        "login",
        &["password", "login", "log in", "portal", "sign in"],
        "🔐 **How do I log in to the portal?**\n\nUse **Forgot password** on the login page, enter your email, and follow the reset link we send you.",
    ),
    faq(
        "download",
        &["download", "save photos", "export"],
        "📥 **How do I download my images?**\n\nOpen the shoot in your portal and use **Download**, or say **\"Download all photos\"** here and I'll prepare a link.",
    ),
    faq(
        "mls",
        &["mls", "multiple listing"],
        "📤 **How do I upload images to the MLS?**\n\nDownload the images first, then use your MLS listing's photo upload. Our files are web-ready JPGs sized for MLS limits.",
    ),
    faq(
        "prepare",
        &["prepare", "preparation", "checklist", "photo ready", "before the shoot"],
        "✅ **Shoot preparation checklist**\n\n• Every light on\n• Blinds and curtains open\n• Clutter and personal items put away\n• Cars out of the driveway\n• Pets secured\n• Lawn mowed for exterior shots",
    ),
    faq(
        "pricing",
        &["price", "pricing", "cost", "how much", "rates"],
        "💲 **How much does a shoot cost?**\n\nPricing depends on the services you pick. Start a booking and I'll show the total before you confirm anything.",
    ),
    faq(
        "contact",
        &["contact", "phone", "call", "reach you", "email address"],
        "📞 **Contacting the studio**\n\nEmail {support} or just ask me here. I'm always around.",
    ),
];

const ESCALATION_WORDS: &[&str] = &["human", "person", "representative", "agent", "escalate", "speak to"];
const TICKET_WORDS: &[&str] = &["ticket", "report", "issue", "problem", "complaint", "bug"];
const MENU_WORDS: &[&str] = &["help", "faq", "topics", "question"];

/// Best-scoring topic, if any keyword matched
pub fn match_topic(text: &str) -> Option<&'static FaqTopic> {
    let mut best: Option<(&FaqTopic, usize)> = None;
    for topic in FAQ_TOPICS {
        let score = topic.keywords.iter().filter(|k| text.contains(*k)).count();
        if score > 0 && best.is_none_or(|(_, top)| score > top) {
            best = Some((topic, score));
        }
    }
    best.map(|(topic, _)| topic)
}

pub struct SupportFaq;

impl StepMachine for SupportFaq {
    type Step = SupportFaqStep;
    type Data = SupportFaqData;

    const INTENT: Intent = Intent::SupportFaq;

    fn initial_step(&self) -> SupportFaqStep {
        SupportFaqStep::AskQuestion
    }

    fn step(
        &self,
        step: SupportFaqStep,
        data: &mut SupportFaqData,
        turn: &mut Turn<'_>,
    ) -> Result<Transition<SupportFaqStep>, FlowError> {
        match step {
            SupportFaqStep::AskQuestion => Ok(ask_question(turn)),
            SupportFaqStep::Escalate => Ok(escalate(data, turn)),
            SupportFaqStep::CreateTicket => Ok(create_ticket(data, turn)),
        }
    }

    fn pack(step: SupportFaqStep, data: SupportFaqData) -> FlowState {
        FlowState::SupportFaq(Progress { step, data })
    }

    fn unpack(state: FlowState) -> Option<(SupportFaqStep, SupportFaqData)> {
        match state {
            FlowState::SupportFaq(p) => Some((p.step, p.data)),
            _ => None,
        }
    }
}

fn ask_question(turn: &Turn<'_>) -> Transition<SupportFaqStep> {
    if turn.mentions(ESCALATION_WORDS) {
        return Transition::Advance(SupportFaqStep::Escalate);
    }
    if turn.mentions(TICKET_WORDS) {
        return Transition::Advance(SupportFaqStep::CreateTicket);
    }
    if let Some(topic) = match_topic(&turn.text()) {
        return Transition::Finish(
            FlowReply::say(topic.answer.replace("{support}", &turn.studio.support_email))
                .with_metadata("topic", topic.topic)
                .with_suggestions(["Ask another question", "Book a new shoot", "Speak to a human"]),
        );
    }
    if turn.is_spent() || turn.mentions(MENU_WORDS) {
        return Transition::Await(
            SupportFaqStep::AskQuestion,
            FlowReply::say(
                "❓ **Help & FAQ**\n\nI can answer questions about:\n\n\
                 • 📅 Booking a shoot\n\
                 • ⏱️ Turnaround times\n\
                 • 📜 Copyright and image use\n\
                 • 🏠 Staging\n\
                 • 🔐 Portal login\n\
                 • 📥 Downloading images\n\
                 • 📤 Uploading to the MLS\n\
                 • ✅ Preparing for a shoot\n\n\
                 What would you like to know?",
            )
            .with_suggestions([
                "How long to get my photos?",
                "Who owns the copyright?",
                "How do I prepare for a shoot?",
                "How do I download images?",
                "Speak to a human",
            ]),
        );
    }
    Transition::Await(
        SupportFaqStep::AskQuestion,
        FlowReply::say(
            "🤔 I'm not sure I understood that. You can ask about **pricing**, **turnaround** or **policies**, \
             open a **support ticket**, or **speak to a human**.",
        )
        .with_metadata("unmatched", true)
        .with_suggestions(["View FAQ topics", "Create a support ticket", "Speak to a human"]),
    )
}

/// Name and email of the person chatting, for the support inbox
fn requester(turn: &Turn<'_>) -> (String, String) {
    turn.studio.directory.user(turn.user_id).map_or_else(
        |_| (format!("User {}", turn.user_id), "not on file".to_string()),
        |user| (user.name, user.email),
    )
}

// ==================== Escalation ====================

fn escalate(data: &mut SupportFaqData, turn: &mut Turn<'_>) -> Transition<SupportFaqStep> {
    if data.reason.is_none() {
        data.reason = turn.take_answer();
    }
    let Some(reason) = data.reason.clone() else {
        return Transition::Await(
            SupportFaqStep::Escalate,
            FlowReply::say(
                "👤 Happy to connect you with someone on the team. What do you need help with, so I can route it to the right person?",
            )
            .with_suggestions(["Billing question", "Technical issue", "Scheduling help", "Other"]),
        );
    };

    let (name, email) = requester(turn);
    let support = turn.studio.support_email.clone();
    let message = Email {
        to: support.clone(),
        subject: format!("Chat escalation: {reason}"),
        body: format!(
            "{name} <{email}> asked to speak with someone.\n\nTopic: {reason}\nSession: {}",
            turn.session_id
        ),
    };
    if let Err(err) = turn.studio.messenger.send_email(&message) {
        log_soft_failure(turn, Intent::SupportFaq, "escalate", &err);
        return Transition::Finish(
            FlowReply::say(format!(
                "I couldn't reach the support team just now. Please email {support} and mention \"{reason}\"."
            ))
            .with_suggestions(["Ask another question"]),
        );
    }
    tracing::info!(session_id = %turn.session_id, reason = %reason, "Escalated to support");

    Transition::Finish(
        FlowReply::say(format!(
            "✅ **Escalation requested**\n\n\
             I've passed your request to our support team.\n\n\
             📋 **Topic:** {reason}\n\
             👤 **Name:** {name}\n\
             📧 **Email:** {email}\n\n\
             Someone will reply by email, usually within a few business hours."
        ))
        .with_metadata("reason", reason)
        .with_suggestions(["Ask another question", "Book a new shoot", "Manage a booking"]),
    )
}

// ==================== Tickets ====================

fn create_ticket(data: &mut SupportFaqData, turn: &mut Turn<'_>) -> Transition<SupportFaqStep> {
    if data.subject.is_none() {
        data.subject = turn.take_answer();
        return match data.subject {
            Some(_) => Transition::Await(
                SupportFaqStep::CreateTicket,
                FlowReply::say("📝 Please describe the issue in detail."),
            ),
            None => Transition::Await(
                SupportFaqStep::CreateTicket,
                FlowReply::say("🎫 **New support ticket**\n\nWhat's the subject of your issue?")
                    .with_suggestions([
                        "Photo quality issue",
                        "Missing shots",
                        "Billing problem",
                        "Technical issue",
                    ]),
            ),
        };
    }
    if data.description.is_none() {
        data.description = turn.take_answer();
    }
    let (Some(subject), Some(description)) = (data.subject.clone(), data.description.clone()) else {
        return Transition::Await(
            SupportFaqStep::CreateTicket,
            FlowReply::say("📝 Please describe the issue in detail."),
        );
    };

    let number = format!(
        "TKT-{}-{:04}",
        turn.today().format("%Y%m%d"),
        rand::thread_rng().gen_range(1..=9999)
    );
    let (name, email) = requester(turn);
    let message = Email {
        to: turn.studio.support_email.clone(),
        subject: format!("[{number}] {subject}"),
        body: format!("From: {name} <{email}>\nSession: {}\n\n{description}", turn.session_id),
    };
    if let Err(err) = turn.studio.messenger.send_email(&message) {
        log_soft_failure(turn, Intent::SupportFaq, "create_ticket", &err);
        return Transition::Await(
            SupportFaqStep::CreateTicket,
            FlowReply::say("I couldn't file the ticket just now. Want me to try again?")
                .with_suggestions(["Try again", "Start over"]),
        );
    }
    tracing::info!(session_id = %turn.session_id, ticket = %number, "Support ticket created");

    Transition::Finish(
        FlowReply::say(format!(
            "✅ **Support ticket created**\n\n\
             🎫 **Ticket:** {number}\n\
             📋 **Subject:** {subject}\n\
             📝 **Description:** {description}\n\n\
             We'll reply to {email} within one business day."
        ))
        .with_metadata("ticket_number", number)
        .with_suggestions(["Create another ticket", "Ask another question", "Book a new shoot"]),
    )
}
