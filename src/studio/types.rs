//! Studio records shared by the collaborators and the flows

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type UserId = i64;
pub type ShootId = i64;
pub type ServiceId = i64;
pub type InvoiceId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Photographer,
    Rep,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default = "active_default")]
    pub active: bool,
}

fn active_default() -> bool {
    true
}

/// A bookable line item from the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub price: f64,
    /// Share of the price paid out to the photographer
    #[serde(default)]
    pub photographer_pay: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShootStatus {
    Scheduled,
    HoldOn,
    Editing,
    Ready,
    Delivered,
    Completed,
    Cancelled,
    ReshootNeeded,
}

impl fmt::Display for ShootStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ShootStatus::Scheduled => "Scheduled",
            ShootStatus::HoldOn => "On hold",
            ShootStatus::Editing => "Editing",
            ShootStatus::Ready => "Ready",
            ShootStatus::Delivered => "Delivered",
            ShootStatus::Completed => "Completed",
            ShootStatus::Cancelled => "Cancelled",
            ShootStatus::ReshootNeeded => "Reshoot needed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Partial,
    Paid,
}

/// Uploaded photo or video belonging to a shoot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFile {
    pub name: String,
    /// Editing finished and the file is deliverable
    #[serde(default)]
    pub processed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShootNote {
    pub author_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shoot {
    pub id: ShootId,
    pub client_id: UserId,
    #[serde(default)]
    pub rep_id: Option<UserId>,
    #[serde(default)]
    pub photographer_id: Option<UserId>,
    pub address: String,
    pub city: String,
    pub state: String,
    #[serde(default)]
    pub zip: String,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub service_ids: Vec<ServiceId>,
    pub base_quote: f64,
    pub total_quote: f64,
    #[serde(default)]
    pub total_paid: f64,
    pub status: ShootStatus,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub media: Vec<MediaFile>,
    #[serde(default)]
    pub notes: Vec<ShootNote>,
    #[serde(default)]
    pub share_token: Option<String>,
    #[serde(default)]
    pub download_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Shoot {
    /// "address, city, state" with empty parts left out
    pub fn location_label(&self) -> String {
        [&self.address, &self.city, &self.state]
            .into_iter()
            .filter(|part| !part.trim().is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn involves(&self, user_id: UserId) -> bool {
        self.client_id == user_id || self.rep_id == Some(user_id)
    }

    pub fn processed_media(&self) -> usize {
        self.media.iter().filter(|m| m.processed).count()
    }

    pub fn scheduled_date(&self) -> Option<NaiveDate> {
        self.scheduled_at.map(|at| at.date_naive())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientNote {
    pub client_id: UserId,
    pub author_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub number: String,
    #[serde(default)]
    pub shoot_id: Option<ShootId>,
    pub client_id: UserId,
    #[serde(default)]
    pub photographer_id: Option<UserId>,
    pub total: f64,
    pub status: InvoiceStatus,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status != InvoiceStatus::Paid && self.due_date < today
    }
}

/// A day a photographer is not taking shoots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedDate {
    pub photographer_id: UserId,
    pub date: NaiveDate,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Outbound mail handed to the messenger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Result of asking the payment provider for a checkout page
#[derive(Debug, Clone)]
pub struct CheckoutLink {
    pub checkout_url: Option<String>,
    pub amount_remaining: f64,
}

/// Everything needed to create a booking
#[derive(Debug, Clone, Default)]
pub struct NewBooking {
    pub client_id: UserId,
    pub rep_id: Option<UserId>,
    pub photographer_id: Option<UserId>,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub service_ids: Vec<ServiceId>,
}

/// Partial update applied to a shoot; `None` leaves a field alone
#[derive(Debug, Clone, Default)]
pub struct ShootUpdate {
    pub scheduled_at: Option<DateTime<Utc>>,
    pub status: Option<ShootStatus>,
    pub photographer_id: Option<UserId>,
    pub service_ids: Option<Vec<ServiceId>>,
    pub total_quote: Option<f64>,
    pub share_token: Option<String>,
    pub download_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub number: String,
    pub shoot_id: Option<ShootId>,
    pub client_id: UserId,
    pub photographer_id: Option<UserId>,
    pub total: f64,
    pub due_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShootOrder {
    #[default]
    ScheduledAsc,
    ScheduledDesc,
    CreatedDesc,
}

/// Query over shoots; every set field narrows the result
#[derive(Debug, Clone, Default)]
pub struct ShootFilter {
    pub involving: Option<UserId>,
    pub client_id: Option<UserId>,
    pub photographer_id: Option<UserId>,
    pub statuses: Vec<ShootStatus>,
    pub excluded: Vec<ShootStatus>,
    pub scheduled_from: Option<DateTime<Utc>>,
    pub scheduled_to: Option<DateTime<Utc>>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub unassigned: bool,
    pub order: ShootOrder,
    pub limit: Option<usize>,
}

impl ShootFilter {
    pub fn involving(mut self, user_id: UserId) -> Self {
        self.involving = Some(user_id);
        self
    }

    pub fn client(mut self, client_id: UserId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn photographer(mut self, photographer_id: UserId) -> Self {
        self.photographer_id = Some(photographer_id);
        self
    }

    pub fn with_status(mut self, statuses: &[ShootStatus]) -> Self {
        self.statuses.extend_from_slice(statuses);
        self
    }

    pub fn excluding(mut self, statuses: &[ShootStatus]) -> Self {
        self.excluded.extend_from_slice(statuses);
        self
    }

    pub fn scheduled_between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.scheduled_from = Some(from);
        self.scheduled_to = Some(to);
        self
    }

    pub fn scheduled_after(mut self, from: DateTime<Utc>) -> Self {
        self.scheduled_from = Some(from);
        self
    }

    pub fn created_between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.created_from = Some(from);
        self.created_to = Some(to);
        self
    }

    pub fn unassigned(mut self) -> Self {
        self.unassigned = true;
        self
    }

    pub fn order(mut self, order: ShootOrder) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, shoot: &Shoot) -> bool {
        if self.involving.is_some_and(|u| !shoot.involves(u)) {
            return false;
        }
        if self.client_id.is_some_and(|c| shoot.client_id != c) {
            return false;
        }
        if self.photographer_id.is_some() && shoot.photographer_id != self.photographer_id {
            return false;
        }
        if self.unassigned && shoot.photographer_id.is_some() {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&shoot.status) {
            return false;
        }
        if self.excluded.contains(&shoot.status) {
            return false;
        }
        if self.scheduled_from.is_some() || self.scheduled_to.is_some() {
            let Some(at) = shoot.scheduled_at else {
                return false;
            };
            if self.scheduled_from.is_some_and(|from| at < from)
                || self.scheduled_to.is_some_and(|to| at > to)
            {
                return false;
            }
        }
        if self.created_from.is_some_and(|from| shoot.created_at < from)
            || self.created_to.is_some_and(|to| shoot.created_at > to)
        {
            return false;
        }
        true
    }
}

/// Query over invoices
#[derive(Debug, Clone, Copy, Default)]
pub struct InvoiceFilter {
    pub shoot_id: Option<ShootId>,
    pub client_id: Option<UserId>,
    pub photographer_id: Option<UserId>,
    pub status: Option<InvoiceStatus>,
    pub unpaid_only: bool,
}

impl InvoiceFilter {
    pub fn matches(&self, invoice: &Invoice) -> bool {
        (self.shoot_id.is_none() || invoice.shoot_id == self.shoot_id)
            && self.client_id.is_none_or(|c| invoice.client_id == c)
            && (self.photographer_id.is_none() || invoice.photographer_id == self.photographer_id)
            && self.status.is_none_or(|s| invoice.status == s)
            && !(self.unpaid_only && invoice.status == InvoiceStatus::Paid)
    }
}
