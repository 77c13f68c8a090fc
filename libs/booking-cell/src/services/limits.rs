use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::auth::User;

use crate::error::BookingError;
use crate::models::{
    AppointmentLimitStatus, AppointmentRef, BookingDraft, BookingRejection, LimitReason, RejectionReason,
};
use crate::ports::BookingBackend;
use crate::services::resolution::{KeyedResolution, Ticket};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimitKey {
    pub clinic_id: Uuid,
    pub date: NaiveDate,
}

impl LimitKey {
    pub fn from_draft(draft: &BookingDraft) -> Option<Self> {
        Some(Self {
            clinic_id: draft.clinic.as_ref()?.id,
            date: draft.date?,
        })
    }
}

/// Advisory snapshot of the patient's one-per-day and pending-count limits
/// for the draft's (clinic, date). Commit re-validates server-side.
#[derive(Debug, Default)]
pub struct LimitGuard {
    resolution: KeyedResolution<LimitKey, AppointmentLimitStatus>,
}

impl LimitGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_for(&mut self, draft: &BookingDraft) -> Option<Ticket<LimitKey>> {
        match LimitKey::from_draft(draft) {
            Some(key) => self.resolution.schedule(key),
            None => {
                if self.resolution.resolved_key().is_some() || self.resolution.is_in_flight() {
                    self.resolution.invalidate();
                }
                None
            }
        }
    }

    pub fn apply(&mut self, ticket: Ticket<LimitKey>, status: AppointmentLimitStatus) -> bool {
        self.resolution.apply(ticket, status)
    }

    pub fn invalidate(&mut self) {
        self.resolution.invalidate();
    }

    pub fn abandon(&mut self, ticket: &Ticket<LimitKey>) {
        self.resolution.abandon(ticket);
    }

    pub fn is_checking(&self) -> bool {
        self.resolution.is_in_flight()
    }

    /// Latest applied snapshot, for display.
    pub fn status(&self) -> Option<&AppointmentLimitStatus> {
        self.resolution.value()
    }

    /// Snapshot for the draft's current (clinic, date), if one exists.
    pub fn status_for(&self, draft: &BookingDraft) -> Option<&AppointmentLimitStatus> {
        let key = LimitKey::from_draft(draft)?;
        self.resolution.value_for(&key)
    }

    pub fn conflicting_appointment(&self) -> Option<&AppointmentRef> {
        self.status().and_then(|status| status.conflicting_appointment.as_ref())
    }

    /// Store a status obtained outside the scheduled refresh path.
    pub fn record(&mut self, draft: &BookingDraft, status: AppointmentLimitStatus) {
        if let Some(key) = LimitKey::from_draft(draft) {
            self.resolution.override_current(key, status);
        }
    }

    /// Fold a commit-time rejection back into the snapshot for the draft's key.
    pub fn record_rejection(&mut self, draft: &BookingDraft, rejection: &BookingRejection) {
        let status = if rejection.reason.is_date_conflict() {
            AppointmentLimitStatus::daily_limit_exceeded(rejection.conflicting_appointment.clone())
        } else if rejection.reason == RejectionReason::PendingLimitExceeded {
            AppointmentLimitStatus::pending_limit_exceeded()
        } else {
            return;
        };
        if let Some(key) = LimitKey::from_draft(draft) {
            info!("Recording {:?} rejection for clinic {} on {}", status.reason, key.clinic_id, key.date);
            self.resolution.override_current(key, status);
        }
    }
}

/// Turn a snapshot into a submit-gate verdict.
pub fn gate(status: &AppointmentLimitStatus) -> Result<(), BookingError> {
    if status.allowed {
        return Ok(());
    }
    match status.reason {
        LimitReason::PendingLimitExceeded => Err(BookingError::PendingLimitExceeded),
        _ => Err(BookingError::DailyLimitExceeded {
            conflicting: status.conflicting_appointment.clone(),
        }),
    }
}

/// Both policies are independent gates: either reason denies.
fn normalize(mut status: AppointmentLimitStatus) -> AppointmentLimitStatus {
    if matches!(status.reason, LimitReason::DailyLimitExceeded | LimitReason::PendingLimitExceeded) {
        status.allowed = false;
    }
    status
}

/// One remote limit check. Non-patients are not subject to the policy here.
pub async fn check_limits(
    backend: &dyn BookingBackend,
    user: Option<&User>,
    key: &LimitKey,
    timeout: Duration,
) -> AppointmentLimitStatus {
    let Some(patient_id) = user.and_then(User::patient_id) else {
        debug!("No signed-in patient, skipping limit check");
        return AppointmentLimitStatus::allowed();
    };

    debug!("Checking appointment limits for patient {} at clinic {} on {}",
           patient_id, key.clinic_id, key.date);

    let check = backend.check_appointment_limit(patient_id, key.clinic_id, key.date);
    match tokio::time::timeout(timeout, check).await {
        Ok(Ok(status)) => {
            let status = normalize(status);
            if !status.allowed {
                warn!("Patient {} blocked on {}: {:?}", patient_id, key.date, status.reason);
            }
            status
        }
        Ok(Err(e)) => {
            warn!("Appointment limit check failed for patient {}: {}", patient_id, e);
            AppointmentLimitStatus::check_failed()
        }
        Err(_) => {
            warn!("Appointment limit check timed out after {:?}", timeout);
            AppointmentLimitStatus::check_failed()
        }
    }
}
