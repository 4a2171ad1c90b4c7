//! Studio collaborators
//!
//! Shoots, services, people, invoices, availability blocks, mail and
//! payments. The flow engine reaches all of them through [`Studio`].

mod availability;
mod error;
mod memory;
#[cfg(test)]
pub mod testing;
mod traits;
mod types;

pub use availability::open_slots;
pub use error::{CollabResult, CollaboratorError, CollaboratorErrorKind};
pub use memory::{InMemoryStudio, StudioData};
pub use traits::*;
pub use types::*;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::sync::Arc;

/// Handles to every collaborator a flow may call
#[derive(Clone)]
pub struct Studio {
    pub shoots: Arc<dyn ShootStore>,
    pub services: Arc<dyn ServiceCatalog>,
    pub directory: Arc<dyn Directory>,
    pub invoices: Arc<dyn InvoiceStore>,
    pub availability: Arc<dyn AvailabilityStore>,
    pub messenger: Arc<dyn Messenger>,
    pub payments: Arc<dyn PaymentGateway>,
    pub clock: Arc<dyn Clock>,
    /// Base URL for gallery, download and payment links
    pub public_url: String,
    /// Inbox for escalations and support tickets
    pub support_email: String,
}

impl Studio {
    /// Wire every collaborator to one backend
    pub fn from_backend<B>(backend: &Arc<B>, clock: Arc<dyn Clock>, public_url: impl Into<String>) -> Self
    where
        B: StudioBackend + Messenger + PaymentGateway + 'static,
    {
        Self {
            shoots: backend.clone(),
            services: backend.clone(),
            directory: backend.clone(),
            invoices: backend.clone(),
            availability: backend.clone(),
            messenger: backend.clone(),
            payments: backend.clone(),
            clock,
            public_url: public_url.into(),
            support_email: "support@localhost".to_string(),
        }
    }

    pub fn with_support_email(mut self, email: impl Into<String>) -> Self {
        self.support_email = email.into();
        self
    }

    #[allow(dead_code)] // Used in tests
    pub fn with_messenger(mut self, messenger: Arc<dyn Messenger>) -> Self {
        self.messenger = messenger;
        self
    }

    #[allow(dead_code)] // Used in tests
    pub fn with_payments(mut self, payments: Arc<dyn PaymentGateway>) -> Self {
        self.payments = payments;
        self
    }

    #[allow(dead_code)] // Used in tests
    pub fn with_shoots(mut self, shoots: Arc<dyn ShootStore>) -> Self {
        self.shoots = shoots;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Catalog names for the given ids, in catalog order
    pub fn service_names(&self, ids: &[ServiceId]) -> CollabResult<Vec<String>> {
        Ok(self
            .services
            .services()?
            .into_iter()
            .filter(|s| ids.contains(&s.id))
            .map(|s| s.name)
            .collect())
    }

    /// Link with a fresh path under the public URL
    pub fn link(&self, path: &str) -> String {
        format!("{}{path}", self.public_url.trim_end_matches('/'))
    }
}

/// The instant `hour:00` UTC on `date`
pub fn at_hour(date: NaiveDate, hour: u32) -> DateTime<Utc> {
    at_time(date, NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN))
}

pub fn at_time(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    date.and_time(time).and_utc()
}
