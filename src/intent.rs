//! Intent classification
//!
//! Keyword routing is expressed as ordered rule tables. [`classify`] is the
//! primary seven-rule classifier; the chip, secondary and page tables give
//! the flows without a primary rule a way in.

#[cfg(test)]
mod proptests;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Purpose of a conversation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    BookShoot,
    ManageBooking,
    Availability,
    ClientStats,
    Accounting,
    InvoiceBilling,
    MediaDelivery,
    PhotographerManagement,
    ClientCrm,
    SupportFaq,
    Greeting,
    General,
}

impl Intent {
    pub const ALL: [Intent; 12] = [
        Intent::BookShoot,
        Intent::ManageBooking,
        Intent::Availability,
        Intent::ClientStats,
        Intent::Accounting,
        Intent::InvoiceBilling,
        Intent::MediaDelivery,
        Intent::PhotographerManagement,
        Intent::ClientCrm,
        Intent::SupportFaq,
        Intent::Greeting,
        Intent::General,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Intent::BookShoot => "book_shoot",
            Intent::ManageBooking => "manage_booking",
            Intent::Availability => "availability",
            Intent::ClientStats => "client_stats",
            Intent::Accounting => "accounting",
            Intent::InvoiceBilling => "invoice_billing",
            Intent::MediaDelivery => "media_delivery",
            Intent::PhotographerManagement => "photographer_management",
            Intent::ClientCrm => "client_crm",
            Intent::SupportFaq => "support_faq",
            Intent::Greeting => "greeting",
            Intent::General => "general",
        }
    }

    /// `None` for names no flow answers to
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.into_iter().find(|i| i.as_str() == name)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An intent and the keyword sets that select it
///
/// The rule matches when every word of any one set is contained in the text.
pub struct Rule {
    pub intent: Intent,
    pub any_of: &'static [&'static [&'static str]],
}

impl Rule {
    fn matches(&self, text: &str) -> bool {
        self.any_of
            .iter()
            .any(|all| all.iter().all(|word| text.contains(word)))
    }
}

const fn rule(intent: Intent, any_of: &'static [&'static [&'static str]]) -> Rule {
    Rule { intent, any_of }
}

/// Primary rules, first match wins
pub const RULES: &[Rule] = &[
    rule(Intent::BookShoot, &[&["book", "shoot"], &["schedule"]]),
    rule(Intent::ManageBooking, &[&["cancel"], &["reschedule"], &["change"]]),
    rule(Intent::Availability, &[&["availability"], &["available"]]),
    rule(Intent::ClientStats, &[&["stats"], &["client"]]),
    rule(Intent::Accounting, &[&["invoice"], &["revenue"], &["accounting"]]),
    rule(Intent::Greeting, &[&["hi"], &["hello"], &["hey"]]),
];

/// Consulted only when the primary rules fall through to `general`
pub const SECONDARY_RULES: &[Rule] = &[
    rule(
        Intent::MediaDelivery,
        &[
            &["delivery"],
            &["deliver"],
            &["gallery"],
            &["reshoot"],
            &["re-shoot"],
            &["download"],
            &["photos ready"],
        ],
    ),
    rule(
        Intent::ClientCrm,
        &[
            &["follow-up"],
            &["follow up"],
            &["at risk"],
            &["at-risk"],
            &["inactive"],
            &["crm"],
        ],
    ),
    rule(
        Intent::PhotographerManagement,
        &[
            &["assign", "photographer"],
            &["photographer", "earning"],
            &["photographer", "schedule"],
            &["payout"],
            &["block", "date"],
        ],
    ),
    rule(
        Intent::InvoiceBilling,
        &[&["discount"], &["promo"], &["billing"], &["outstanding"], &["unpaid"]],
    ),
    rule(
        Intent::SupportFaq,
        &[
            &["faq"],
            &["help"],
            &["ticket"],
            &["human"],
            &["support"],
            &["question"],
            &["turnaround"],
            &["copyright"],
            &["pricing"],
        ],
    ),
];

/// Quick-reply labels the assistant itself offers
const CHIPS: &[(&str, Intent)] = &[
    ("book a shoot", Intent::BookShoot),
    ("book a new shoot", Intent::BookShoot),
    ("book a shoot for this client", Intent::BookShoot),
    ("manage a booking", Intent::ManageBooking),
    ("manage booking", Intent::ManageBooking),
    ("view this shoot", Intent::ManageBooking),
    ("check availability", Intent::Availability),
    ("my stats", Intent::ClientStats),
    ("client stats", Intent::ClientStats),
    ("check client stats", Intent::ClientStats),
    ("accounting summary", Intent::Accounting),
    ("see accounting summary", Intent::Accounting),
    ("create invoice", Intent::InvoiceBilling),
    ("create invoice for a shoot", Intent::InvoiceBilling),
    ("send invoice", Intent::InvoiceBilling),
    ("send invoice to client", Intent::InvoiceBilling),
    ("view outstanding invoices", Intent::InvoiceBilling),
    ("apply discount", Intent::InvoiceBilling),
    ("apply discount to booking", Intent::InvoiceBilling),
    ("share gallery", Intent::MediaDelivery),
    ("share gallery with client", Intent::MediaDelivery),
    ("check delivery status", Intent::MediaDelivery),
    ("request reshoot", Intent::MediaDelivery),
    ("download all photos", Intent::MediaDelivery),
    ("assign photographer", Intent::PhotographerManagement),
    ("view photographer schedule", Intent::PhotographerManagement),
    ("update photographer availability", Intent::PhotographerManagement),
    ("photographer earnings", Intent::PhotographerManagement),
    ("view client history", Intent::ClientCrm),
    ("send follow-up", Intent::ClientCrm),
    ("add client note", Intent::ClientCrm),
    ("view at-risk clients", Intent::ClientCrm),
    ("help", Intent::SupportFaq),
    ("faq", Intent::SupportFaq),
    ("help & faq", Intent::SupportFaq),
    ("speak to a human", Intent::SupportFaq),
    ("create support ticket", Intent::SupportFaq),
];

/// Pages of the studio app and the intent each implies
const PAGE_INTENTS: &[(&str, Intent)] = &[
    ("book_shoot", Intent::BookShoot),
    ("availability", Intent::Availability),
    ("accounting", Intent::Accounting),
    ("invoices", Intent::Accounting),
    ("shoot_history", Intent::ManageBooking),
    ("shoot_details", Intent::ManageBooking),
    ("ai_editing", Intent::MediaDelivery),
];

/// Phrases that abandon the current flow
const RESET_PHRASES: &[&str] = &["start over", "go back", "nevermind", "never mind", "main menu"];

/// Phrases that restart a particular flow
const SWITCH_PHRASES: &[(&str, Intent)] = &[
    ("book a new shoot", Intent::BookShoot),
    ("book another shoot", Intent::BookShoot),
    ("let's book", Intent::BookShoot),
    ("i want to book", Intent::BookShoot),
    ("manage another booking", Intent::ManageBooking),
    ("check different date", Intent::Availability),
    ("view another client", Intent::ClientStats),
    ("assign another photographer", Intent::PhotographerManagement),
    ("create another invoice", Intent::InvoiceBilling),
    ("send another invoice", Intent::InvoiceBilling),
    ("share another gallery", Intent::MediaDelivery),
    ("download another shoot", Intent::MediaDelivery),
    ("send to another client", Intent::ClientCrm),
];

fn normalize(message: &str) -> String {
    message.trim().to_lowercase()
}

/// Primary classifier: substring rules over the lowercased message
pub fn classify(message: &str) -> Intent {
    let text = normalize(message);
    RULES
        .iter()
        .find(|r| r.matches(&text))
        .map_or(Intent::General, |r| r.intent)
}

pub fn classify_secondary(message: &str) -> Option<Intent> {
    let text = normalize(message);
    SECONDARY_RULES
        .iter()
        .find(|r| r.matches(&text))
        .map(|r| r.intent)
}

/// Exact match against an offered quick reply
pub fn route_chip(message: &str) -> Option<Intent> {
    let text = normalize(message);
    let text = text.trim_end_matches(['.', '!', '?']);
    CHIPS
        .iter()
        .find(|(label, _)| *label == text)
        .map(|(_, intent)| *intent)
}

pub fn page_intent(page: &str) -> Option<Intent> {
    PAGE_INTENTS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(page.trim()))
        .map(|(_, intent)| *intent)
}

/// Intent for a session with nothing committed
///
/// Chip labels first, then the primary rules; a `general` result falls
/// through to the secondary rules and finally the page the user is on.
pub fn resolve(message: &str, page: Option<&str>) -> Intent {
    if let Some(intent) = route_chip(message) {
        return intent;
    }
    match classify(message) {
        Intent::General => classify_secondary(message)
            .or_else(|| page.and_then(page_intent))
            .unwrap_or(Intent::General),
        intent => intent,
    }
}

/// Request to leave the current flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    Reset,
    To(Intent),
}

pub fn detect_switch(message: &str) -> Option<Switch> {
    let text = normalize(message);
    if RESET_PHRASES.iter().any(|p| text.contains(p)) {
        return Some(Switch::Reset);
    }
    SWITCH_PHRASES
        .iter()
        .find(|(phrase, _)| text.contains(phrase))
        .map(|(_, intent)| Switch::To(*intent))
}
