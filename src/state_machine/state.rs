//! Persisted flow state
//!
//! One tagged variant per flow, so switching flows can never leave another
//! flow's slots behind.

use super::StepName;
use crate::flows::{
    AccountingData, AccountingStep, AvailabilityData, AvailabilityStep, BookShootData,
    BookShootStep, ClientCrmData, ClientCrmStep, ClientStatsData, ClientStatsStep,
    InvoiceBillingData, InvoiceBillingStep, ManageBookingData, ManageBookingStep,
    MediaDeliveryData, MediaDeliveryStep, PhotographerData, PhotographerStep, SupportFaqData,
    SupportFaqStep,
};
use crate::intent::Intent;
use serde::{Deserialize, Serialize};

/// Current step plus the slots collected so far
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress<S, D> {
    pub step: S,
    pub data: D,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "flow", rename_all = "snake_case")]
pub enum FlowState {
    BookShoot(Progress<BookShootStep, BookShootData>),
    ManageBooking(Progress<ManageBookingStep, ManageBookingData>),
    Availability(Progress<AvailabilityStep, AvailabilityData>),
    ClientStats(Progress<ClientStatsStep, ClientStatsData>),
    Accounting(Progress<AccountingStep, AccountingData>),
    InvoiceBilling(Progress<InvoiceBillingStep, InvoiceBillingData>),
    MediaDelivery(Progress<MediaDeliveryStep, MediaDeliveryData>),
    PhotographerManagement(Progress<PhotographerStep, PhotographerData>),
    ClientCrm(Progress<ClientCrmStep, ClientCrmData>),
    SupportFaq(Progress<SupportFaqStep, SupportFaqData>),
}

impl FlowState {
    pub fn intent(&self) -> Intent {
        match self {
            FlowState::BookShoot(_) => Intent::BookShoot,
            FlowState::ManageBooking(_) => Intent::ManageBooking,
            FlowState::Availability(_) => Intent::Availability,
            FlowState::ClientStats(_) => Intent::ClientStats,
            FlowState::Accounting(_) => Intent::Accounting,
            FlowState::InvoiceBilling(_) => Intent::InvoiceBilling,
            FlowState::MediaDelivery(_) => Intent::MediaDelivery,
            FlowState::PhotographerManagement(_) => Intent::PhotographerManagement,
            FlowState::ClientCrm(_) => Intent::ClientCrm,
            FlowState::SupportFaq(_) => Intent::SupportFaq,
        }
    }

    pub fn step_name(&self) -> &'static str {
        match self {
            FlowState::BookShoot(p) => p.step.name(),
            FlowState::ManageBooking(p) => p.step.name(),
            FlowState::Availability(p) => p.step.name(),
            FlowState::ClientStats(p) => p.step.name(),
            FlowState::Accounting(p) => p.step.name(),
            FlowState::InvoiceBilling(p) => p.step.name(),
            FlowState::MediaDelivery(p) => p.step.name(),
            FlowState::PhotographerManagement(p) => p.step.name(),
            FlowState::ClientCrm(p) => p.step.name(),
            FlowState::SupportFaq(p) => p.step.name(),
        }
    }
}
