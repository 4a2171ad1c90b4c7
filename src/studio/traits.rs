//! Trait abstractions for studio collaborators
//!
//! Flows only see these traits, so tests can swap in failing or recording
//! implementations.

use super::error::CollabResult;
use super::types::{
    BlockedDate, CheckoutLink, ClientNote, Email, Invoice, InvoiceFilter, InvoiceId, NewBooking,
    NewInvoice, Role, Service, Shoot, ShootFilter, ShootId, ShootUpdate, User, UserId,
};
use chrono::{DateTime, NaiveDate, Utc};

/// Shoot records
pub trait ShootStore: Send + Sync {
    fn shoot(&self, id: ShootId) -> CollabResult<Shoot>;

    fn shoots(&self, filter: &ShootFilter) -> CollabResult<Vec<Shoot>>;

    /// Create a shoot priced from the catalog
    fn create_booking(&self, booking: &NewBooking) -> CollabResult<Shoot>;

    fn update_shoot(&self, id: ShootId, update: &ShootUpdate) -> CollabResult<Shoot>;

    fn add_shoot_note(&self, id: ShootId, author_id: UserId, body: &str) -> CollabResult<()>;
}

/// Bookable services and their prices
pub trait ServiceCatalog: Send + Sync {
    fn services(&self) -> CollabResult<Vec<Service>>;
}

/// Users of every role
pub trait Directory: Send + Sync {
    fn user(&self, id: UserId) -> CollabResult<User>;

    fn users_with_role(&self, role: Role) -> CollabResult<Vec<User>>;

    fn add_client_note(&self, client_id: UserId, author_id: UserId, body: &str) -> CollabResult<()>;

    fn client_notes(&self, client_id: UserId) -> CollabResult<Vec<ClientNote>>;
}

pub trait InvoiceStore: Send + Sync {
    fn invoice(&self, id: InvoiceId) -> CollabResult<Invoice>;

    fn invoices(&self, filter: &InvoiceFilter) -> CollabResult<Vec<Invoice>>;

    fn create_invoice(&self, invoice: &NewInvoice) -> CollabResult<Invoice>;

    fn mark_invoice_sent(&self, id: InvoiceId) -> CollabResult<Invoice>;
}

/// Photographer blocked days
pub trait AvailabilityStore: Send + Sync {
    fn is_blocked(&self, photographer_id: UserId, date: NaiveDate) -> CollabResult<bool>;

    fn block(&self, photographer_id: UserId, date: NaiveDate, reason: Option<&str>)
        -> CollabResult<()>;

    /// Returns false when the day was not blocked
    fn unblock(&self, photographer_id: UserId, date: NaiveDate) -> CollabResult<bool>;

    fn blocked_dates(&self, photographer_id: UserId) -> CollabResult<Vec<BlockedDate>>;
}

/// Outbound mail
pub trait Messenger: Send + Sync {
    fn send_email(&self, email: &Email) -> CollabResult<()>;
}

/// Checkout link provider
pub trait PaymentGateway: Send + Sync {
    fn create_checkout_link(&self, shoot_id: ShootId) -> CollabResult<CheckoutLink>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Combined storage trait for backends that hold all studio records
pub trait StudioBackend:
    ShootStore + ServiceCatalog + Directory + InvoiceStore + AvailabilityStore
{
}
impl<T: ShootStore + ServiceCatalog + Directory + InvoiceStore + AvailabilityStore> StudioBackend
    for T
{
}

// ============================================================================
// Clocks
// ============================================================================

/// Wall clock
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant
#[allow(dead_code)] // Used in tests
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

