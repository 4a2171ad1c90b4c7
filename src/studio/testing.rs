//! Mock collaborators for testing

use super::error::{CollabResult, CollaboratorError};
use super::memory::{InMemoryStudio, StudioData};
use super::traits::{FixedClock, Messenger, PaymentGateway, ShootStore};
use super::types::{
    CheckoutLink, Email, NewBooking, Shoot, ShootFilter, ShootId, ShootUpdate, UserId,
};
use super::Studio;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex};

/// Monday 2025-06-16 10:00 UTC
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 16, 10, 0, 0).unwrap()
}

pub fn demo_backend() -> Arc<InMemoryStudio> {
    backend_with(|_| {})
}

/// Demo records after `edit`, for fixtures the demo data lacks
pub fn backend_with(edit: impl FnOnce(&mut StudioData)) -> Arc<InMemoryStudio> {
    let mut data = StudioData::demo(fixed_now());
    edit(&mut data);
    Arc::new(
        InMemoryStudio::new(data, Arc::new(FixedClock(fixed_now())))
            .with_public_url("https://studio.test"),
    )
}

/// Demo studio plus the backend behind it, for inspecting side effects
pub fn demo_studio() -> (Studio, Arc<InMemoryStudio>) {
    studio_with(|_| {})
}

pub fn studio_with(edit: impl FnOnce(&mut StudioData)) -> (Studio, Arc<InMemoryStudio>) {
    let backend = backend_with(edit);
    let studio = Studio::from_backend(
        &backend,
        Arc::new(FixedClock(fixed_now())),
        "https://studio.test",
    );
    (studio, backend)
}

// ============================================================================
// Failing collaborators
// ============================================================================

/// Messenger whose provider is always down
pub struct FailingMessenger;

impl Messenger for FailingMessenger {
    fn send_email(&self, _email: &Email) -> CollabResult<()> {
        Err(CollaboratorError::unavailable("Mail provider unreachable"))
    }
}

/// Payment gateway that refuses every request
pub struct FailingPayments;

impl PaymentGateway for FailingPayments {
    fn create_checkout_link(&self, _shoot_id: ShootId) -> CollabResult<CheckoutLink> {
        Err(CollaboratorError::unavailable("Payment provider unreachable"))
    }
}

/// Shoot store that reads through to a backend but refuses new bookings
pub struct RejectingBookings {
    inner: Arc<InMemoryStudio>,
    /// Bookings that were attempted
    pub attempts: Mutex<Vec<NewBooking>>,
}

impl RejectingBookings {
    pub fn new(inner: Arc<InMemoryStudio>) -> Self {
        Self {
            inner,
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded_attempts(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }
}

impl ShootStore for RejectingBookings {
    fn shoot(&self, id: ShootId) -> CollabResult<Shoot> {
        self.inner.shoot(id)
    }

    fn shoots(&self, filter: &ShootFilter) -> CollabResult<Vec<Shoot>> {
        self.inner.shoots(filter)
    }

    fn create_booking(&self, booking: &NewBooking) -> CollabResult<Shoot> {
        self.attempts.lock().unwrap().push(booking.clone());
        Err(CollaboratorError::unavailable("Scheduling service is down"))
    }

    fn update_shoot(&self, id: ShootId, update: &ShootUpdate) -> CollabResult<Shoot> {
        self.inner.update_shoot(id, update)
    }

    fn add_shoot_note(&self, id: ShootId, author_id: UserId, body: &str) -> CollabResult<()> {
        self.inner.add_shoot_note(id, author_id, body)
    }
}
