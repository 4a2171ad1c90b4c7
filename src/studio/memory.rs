//! In-memory studio backend
//!
//! Holds every studio record behind one mutex. Loaded from a JSON seed file
//! or built from the demo data set.

use super::error::{CollabResult, CollaboratorError};
use super::traits::{
    AvailabilityStore, Clock, Directory, InvoiceStore, Messenger, PaymentGateway, ServiceCatalog,
    ShootStore,
};
use super::types::{
    BlockedDate, CheckoutLink, ClientNote, Email, Invoice, InvoiceFilter, InvoiceId, InvoiceStatus,
    MediaFile, NewBooking, NewInvoice, PaymentStatus, Role, Service, Shoot, ShootFilter, ShootId,
    ShootNote, ShootOrder, ShootStatus, ShootUpdate, User, UserId,
};
use crate::money::round2;
use crate::studio::at_hour;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeedError {
    #[error("Failed to read seed file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid seed file: {0}")]
    Json(#[from] serde_json::Error),
}

/// All studio records, in the shape of the seed file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudioData {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub shoots: Vec<Shoot>,
    #[serde(default)]
    pub invoices: Vec<Invoice>,
    #[serde(default)]
    pub blocked_dates: Vec<BlockedDate>,
    #[serde(default)]
    pub client_notes: Vec<ClientNote>,
}

pub struct InMemoryStudio {
    data: Mutex<StudioData>,
    outbox: Mutex<Vec<Email>>,
    clock: Arc<dyn Clock>,
    public_url: String,
}

impl InMemoryStudio {
    pub fn new(data: StudioData, clock: Arc<dyn Clock>) -> Self {
        Self {
            data: Mutex::new(data),
            outbox: Mutex::new(Vec::new()),
            clock,
            public_url: "http://localhost:8000".to_string(),
        }
    }

    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = url.into();
        self
    }

    pub fn from_seed_file<P: AsRef<Path>>(path: P, clock: Arc<dyn Clock>) -> Result<Self, SeedError> {
        let raw = std::fs::read_to_string(path)?;
        let data: StudioData = serde_json::from_str(&raw)?;
        Ok(Self::new(data, clock))
    }

    /// Mail accepted by the messenger so far
    #[allow(dead_code)] // Used in tests
    pub fn outbox(&self) -> Vec<Email> {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn data(&self) -> MutexGuard<'_, StudioData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn shoot_mut(data: &mut StudioData, id: ShootId) -> CollabResult<&mut Shoot> {
    data.shoots
        .iter_mut()
        .find(|s| s.id == id)
        .ok_or_else(|| CollaboratorError::not_found(format!("Shoot #{id} not found")))
}

// ==================== Shoots ====================

impl ShootStore for InMemoryStudio {
    fn shoot(&self, id: ShootId) -> CollabResult<Shoot> {
        self.data()
            .shoots
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| CollaboratorError::not_found(format!("Shoot #{id} not found")))
    }

    fn shoots(&self, filter: &ShootFilter) -> CollabResult<Vec<Shoot>> {
        let mut shoots: Vec<Shoot> = self
            .data()
            .shoots
            .iter()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        match filter.order {
            ShootOrder::ScheduledAsc => shoots.sort_by_key(|s| (s.scheduled_at, s.id)),
            ShootOrder::ScheduledDesc => {
                shoots.sort_by_key(|s| std::cmp::Reverse((s.scheduled_at, s.id)));
            }
            ShootOrder::CreatedDesc => {
                shoots.sort_by_key(|s| std::cmp::Reverse((s.created_at, s.id)));
            }
        }
        if let Some(limit) = filter.limit {
            shoots.truncate(limit);
        }
        Ok(shoots)
    }

    fn create_booking(&self, booking: &NewBooking) -> CollabResult<Shoot> {
        if booking.service_ids.is_empty() {
            return Err(CollaboratorError::rejected("No services selected"));
        }
        let mut data = self.data();
        let prices: Option<Vec<f64>> = booking
            .service_ids
            .iter()
            .map(|id| data.services.iter().find(|s| s.id == *id).map(|s| s.price))
            .collect();
        let Some(prices) = prices else {
            return Err(CollaboratorError::rejected("Invalid services selected"));
        };
        let quote = round2(prices.iter().sum());

        let id = data.shoots.iter().map(|s| s.id).max().unwrap_or(0) + 1;
        let shoot = Shoot {
            id,
            client_id: booking.client_id,
            rep_id: booking.rep_id,
            photographer_id: booking.photographer_id,
            address: booking.address.clone(),
            city: booking.city.clone(),
            state: booking.state.clone(),
            zip: booking.zip.clone(),
            scheduled_at: booking.scheduled_at,
            completed_at: None,
            service_ids: booking.service_ids.clone(),
            base_quote: quote,
            total_quote: quote,
            total_paid: 0.0,
            status: if booking.scheduled_at.is_some() {
                ShootStatus::Scheduled
            } else {
                ShootStatus::HoldOn
            },
            payment_status: PaymentStatus::Unpaid,
            media: Vec::new(),
            notes: Vec::new(),
            share_token: None,
            download_token: None,
            created_at: self.clock.now(),
        };
        data.shoots.push(shoot.clone());
        Ok(shoot)
    }

    fn update_shoot(&self, id: ShootId, update: &ShootUpdate) -> CollabResult<Shoot> {
        let mut data = self.data();
        let repriced = match &update.service_ids {
            Some(ids) if ids.is_empty() => {
                return Err(CollaboratorError::rejected("No services selected"));
            }
            Some(ids) => {
                let prices: Option<Vec<f64>> = ids
                    .iter()
                    .map(|id| data.services.iter().find(|s| s.id == *id).map(|s| s.price))
                    .collect();
                let prices =
                    prices.ok_or_else(|| CollaboratorError::rejected("Invalid services selected"))?;
                Some(round2(prices.iter().sum()))
            }
            None => None,
        };

        let shoot = shoot_mut(&mut data, id)?;
        if let Some(at) = update.scheduled_at {
            shoot.scheduled_at = Some(at);
            if shoot.status == ShootStatus::HoldOn {
                shoot.status = ShootStatus::Scheduled;
            }
        }
        if let Some(status) = update.status {
            shoot.status = status;
        }
        if let Some(photographer_id) = update.photographer_id {
            shoot.photographer_id = Some(photographer_id);
        }
        if let (Some(ids), Some(quote)) = (&update.service_ids, repriced) {
            shoot.service_ids.clone_from(ids);
            shoot.base_quote = quote;
            shoot.total_quote = quote;
        }
        if let Some(total) = update.total_quote {
            shoot.total_quote = round2(total);
        }
        if let Some(token) = &update.share_token {
            shoot.share_token = Some(token.clone());
        }
        if let Some(token) = &update.download_token {
            shoot.download_token = Some(token.clone());
        }
        Ok(shoot.clone())
    }

    fn add_shoot_note(&self, id: ShootId, author_id: UserId, body: &str) -> CollabResult<()> {
        let now = self.clock.now();
        let mut data = self.data();
        shoot_mut(&mut data, id)?.notes.push(ShootNote {
            author_id,
            body: body.to_string(),
            created_at: now,
        });
        Ok(())
    }
}

// ==================== Catalog & Directory ====================

impl ServiceCatalog for InMemoryStudio {
    fn services(&self) -> CollabResult<Vec<Service>> {
        Ok(self.data().services.clone())
    }
}

impl Directory for InMemoryStudio {
    fn user(&self, id: UserId) -> CollabResult<User> {
        self.data()
            .users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or_else(|| CollaboratorError::not_found(format!("User {id} not found")))
    }

    fn users_with_role(&self, role: Role) -> CollabResult<Vec<User>> {
        let mut users: Vec<User> = self
            .data()
            .users
            .iter()
            .filter(|u| u.role == role)
            .cloned()
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    fn add_client_note(&self, client_id: UserId, author_id: UserId, body: &str) -> CollabResult<()> {
        let now = self.clock.now();
        let mut data = self.data();
        if !data.users.iter().any(|u| u.id == client_id) {
            return Err(CollaboratorError::not_found(format!("User {client_id} not found")));
        }
        data.client_notes.push(ClientNote {
            client_id,
            author_id,
            body: body.to_string(),
            created_at: now,
        });
        Ok(())
    }

    fn client_notes(&self, client_id: UserId) -> CollabResult<Vec<ClientNote>> {
        Ok(self
            .data()
            .client_notes
            .iter()
            .filter(|n| n.client_id == client_id)
            .cloned()
            .collect())
    }
}

// ==================== Invoices ====================

impl InvoiceStore for InMemoryStudio {
    fn invoice(&self, id: InvoiceId) -> CollabResult<Invoice> {
        self.data()
            .invoices
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or_else(|| CollaboratorError::not_found(format!("Invoice {id} not found")))
    }

    fn invoices(&self, filter: &InvoiceFilter) -> CollabResult<Vec<Invoice>> {
        let mut invoices: Vec<Invoice> = self
            .data()
            .invoices
            .iter()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        invoices.sort_by_key(|i| (i.due_date, i.id));
        Ok(invoices)
    }

    fn create_invoice(&self, invoice: &NewInvoice) -> CollabResult<Invoice> {
        let now = self.clock.now();
        let mut data = self.data();
        let id = data.invoices.iter().map(|i| i.id).max().unwrap_or(0) + 1;
        let created = Invoice {
            id,
            number: invoice.number.clone(),
            shoot_id: invoice.shoot_id,
            client_id: invoice.client_id,
            photographer_id: invoice.photographer_id,
            total: round2(invoice.total),
            status: InvoiceStatus::Draft,
            due_date: invoice.due_date,
            sent_at: None,
            paid_at: None,
            created_at: now,
        };
        data.invoices.push(created.clone());
        Ok(created)
    }

    fn mark_invoice_sent(&self, id: InvoiceId) -> CollabResult<Invoice> {
        let now = self.clock.now();
        let mut data = self.data();
        let invoice = data
            .invoices
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| CollaboratorError::not_found(format!("Invoice {id} not found")))?;
        if invoice.status == InvoiceStatus::Paid {
            return Err(CollaboratorError::rejected("Invoice is already paid"));
        }
        invoice.status = InvoiceStatus::Sent;
        invoice.sent_at = Some(now);
        Ok(invoice.clone())
    }
}

// ==================== Availability ====================

impl AvailabilityStore for InMemoryStudio {
    fn is_blocked(&self, photographer_id: UserId, date: NaiveDate) -> CollabResult<bool> {
        Ok(self
            .data()
            .blocked_dates
            .iter()
            .any(|b| b.photographer_id == photographer_id && b.date == date))
    }

    fn block(
        &self,
        photographer_id: UserId,
        date: NaiveDate,
        reason: Option<&str>,
    ) -> CollabResult<()> {
        let mut data = self.data();
        if !data
            .blocked_dates
            .iter()
            .any(|b| b.photographer_id == photographer_id && b.date == date)
        {
            data.blocked_dates.push(BlockedDate {
                photographer_id,
                date,
                reason: reason.map(String::from),
            });
        }
        Ok(())
    }

    fn unblock(&self, photographer_id: UserId, date: NaiveDate) -> CollabResult<bool> {
        let mut data = self.data();
        let before = data.blocked_dates.len();
        data.blocked_dates
            .retain(|b| !(b.photographer_id == photographer_id && b.date == date));
        Ok(data.blocked_dates.len() != before)
    }

    fn blocked_dates(&self, photographer_id: UserId) -> CollabResult<Vec<BlockedDate>> {
        let mut dates: Vec<BlockedDate> = self
            .data()
            .blocked_dates
            .iter()
            .filter(|b| b.photographer_id == photographer_id)
            .cloned()
            .collect();
        dates.sort_by_key(|b| b.date);
        Ok(dates)
    }
}

// ==================== Messaging & Payments ====================

impl Messenger for InMemoryStudio {
    fn send_email(&self, email: &Email) -> CollabResult<()> {
        if email.to.trim().is_empty() {
            return Err(CollaboratorError::rejected("No recipient address"));
        }
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(email.clone());
        Ok(())
    }
}

impl PaymentGateway for InMemoryStudio {
    fn create_checkout_link(&self, shoot_id: ShootId) -> CollabResult<CheckoutLink> {
        let shoot = self.shoot(shoot_id)?;
        let amount_remaining = round2((shoot.total_quote - shoot.total_paid).max(0.0));
        let checkout_url = (amount_remaining > 0.0)
            .then(|| format!("{}/pay/{shoot_id}", self.public_url.trim_end_matches('/')));
        Ok(CheckoutLink {
            checkout_url,
            amount_remaining,
        })
    }
}

// ============================================================================
// Demo data
// ============================================================================

impl StudioData {
    /// Small studio used when no seed file is configured
    pub fn demo(now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        let day = |offset: i64| today + Duration::days(offset);
        let user = |id, name: &str, email: &str, role| User {
            id,
            name: name.to_string(),
            email: email.to_string(),
            role,
            active: true,
        };
        let service = |id, name: &str, price, photographer_pay| Service {
            id,
            name: name.to_string(),
            price,
            photographer_pay,
        };
        let photos = |count: usize| -> Vec<MediaFile> {
            (1..=count)
                .map(|n| MediaFile {
                    name: format!("IMG_{n:04}.jpg"),
                    processed: true,
                })
                .collect()
        };

        let shoot = |id, client_id, address: &str, city: &str, scheduled: DateTime<Utc>| Shoot {
            id,
            client_id,
            rep_id: None,
            photographer_id: None,
            address: address.to_string(),
            city: city.to_string(),
            state: "TX".to_string(),
            zip: String::new(),
            scheduled_at: Some(scheduled),
            completed_at: None,
            service_ids: vec![1],
            base_quote: 250.0,
            total_quote: 250.0,
            total_paid: 0.0,
            status: ShootStatus::Scheduled,
            payment_status: PaymentStatus::Unpaid,
            media: Vec::new(),
            notes: Vec::new(),
            share_token: None,
            download_token: None,
            created_at: scheduled - Duration::days(5),
        };

        let upcoming = Shoot {
            photographer_id: Some(10),
            zip: "78701".to_string(),
            created_at: now - Duration::days(5),
            ..shoot(101, 1, "123 Main St", "Austin", at_hour(day(2), 11))
        };
        let unassigned = Shoot {
            service_ids: vec![1, 3],
            base_quote: 400.0,
            total_quote: 400.0,
            created_at: now - Duration::days(3),
            ..shoot(102, 1, "45 Oak Ave", "Austin", at_hour(day(10), 14))
        };
        let delivered = Shoot {
            photographer_id: Some(10),
            service_ids: vec![1, 2],
            base_quote: 550.0,
            total_quote: 550.0,
            total_paid: 550.0,
            status: ShootStatus::Completed,
            payment_status: PaymentStatus::Paid,
            completed_at: Some(at_hour(day(-18), 16)),
            media: photos(25),
            ..shoot(103, 1, "9 Pine Rd", "Round Rock", at_hour(day(-20), 10))
        };
        let awaiting_photos = Shoot {
            photographer_id: Some(11),
            status: ShootStatus::Completed,
            completed_at: Some(at_hour(day(-8), 15)),
            ..shoot(104, 2, "77 Lake Dr", "Dallas", at_hour(day(-10), 10))
        };
        let lapsed = Shoot {
            photographer_id: Some(11),
            total_paid: 250.0,
            status: ShootStatus::Completed,
            payment_status: PaymentStatus::Paid,
            completed_at: Some(at_hour(day(-98), 12)),
            media: photos(18),
            ..shoot(105, 4, "5 Elm Ct", "Houston", at_hour(day(-100), 10))
        };

        Self {
            users: vec![
                user(1, "Jordan Lee", "jordan@example.com", Role::Client),
                user(2, "Priya Patel", "priya@example.com", Role::Client),
                user(3, "Sam Rivera", "sam@example.com", Role::Rep),
                user(4, "Morgan Blake", "morgan@example.com", Role::Client),
                user(10, "Alex Chen", "alex@example.com", Role::Photographer),
                user(11, "Maria Gomez", "maria@example.com", Role::Photographer),
            ],
            services: vec![
                service(1, "Photos", 250.0, 100.0),
                service(2, "Video", 300.0, 150.0),
                service(3, "Drone", 150.0, 75.0),
                service(4, "Floor Plan", 100.0, 40.0),
            ],
            shoots: vec![upcoming, unassigned, delivered, awaiting_photos, lapsed],
            invoices: vec![
                Invoice {
                    id: 1,
                    number: format!("INV-{}-0103", day(-17).format("%Y%m%d")),
                    shoot_id: Some(103),
                    client_id: 1,
                    photographer_id: Some(10),
                    total: 550.0,
                    status: InvoiceStatus::Paid,
                    due_date: day(13),
                    sent_at: Some(now - Duration::days(17)),
                    paid_at: Some(now - Duration::days(15)),
                    created_at: now - Duration::days(17),
                },
                Invoice {
                    id: 2,
                    number: format!("INV-{}-0105", day(-97).format("%Y%m%d")),
                    shoot_id: Some(105),
                    client_id: 4,
                    photographer_id: Some(11),
                    total: 250.0,
                    status: InvoiceStatus::Sent,
                    due_date: day(-67),
                    sent_at: Some(now - Duration::days(97)),
                    paid_at: None,
                    created_at: now - Duration::days(97),
                },
            ],
            blocked_dates: Vec::new(),
            client_notes: Vec::new(),
        }
    }
}
