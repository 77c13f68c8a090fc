//! Seams between the booking session and the world around it: the remote
//! booking backend, the browser history surface, the signed-in identity and
//! the calendar.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use uuid::Uuid;

use shared_models::auth::User;

use crate::models::{
    AppointmentLimitStatus, BookingRequest, CommitOutcome, DoctorRef, ServiceRef, TimeSlotsResponse,
    WizardStep,
};

#[async_trait]
pub trait BookingBackend: Send + Sync {
    async fn list_available_doctors(&self, clinic_id: Uuid) -> Result<Vec<DoctorRef>>;

    async fn list_services(&self, clinic_id: Uuid) -> Result<Vec<ServiceRef>>;

    async fn compute_time_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        service_ids: &[Uuid],
    ) -> Result<TimeSlotsResponse>;

    async fn check_appointment_limit(
        &self,
        patient_id: &str,
        clinic_id: Uuid,
        date: NaiveDate,
    ) -> Result<AppointmentLimitStatus>;

    /// `Ok(CommitOutcome::Rejected)` is a business-rule refusal; `Err` is a hard failure.
    async fn commit_booking(&self, request: &BookingRequest) -> Result<CommitOutcome>;
}

/// Browser history as seen by the wizard.
pub trait StepNavigator: Send + Sync {
    fn push(&self, step: WizardStep);

    fn replace(&self, step: WizardStep);

    /// Hand control to the default back navigation.
    fn back(&self);
}

pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<User>;
}

/// Fixed identity for the lifetime of a session.
pub struct StaticIdentity(pub Option<User>);

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<User> {
        self.0.clone()
    }
}

pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}
