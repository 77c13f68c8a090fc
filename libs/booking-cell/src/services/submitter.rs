use chrono::NaiveDate;
use tracing::{error, info, warn};

use crate::error::BookingError;
use crate::models::{
    AppointmentLimitStatus, BookingDraft, BookingRejection, BookingRequest, BookingResult, CommitOutcome,
    RejectionReason, WizardStep,
};
use crate::ports::BookingBackend;
use crate::services::draft::is_step_complete;
use crate::services::limits;

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Booked(Box<BookingResult>),
    /// A submission was already in flight; nothing was sent.
    Ignored,
}

/// At most one commit in flight per session.
#[derive(Debug, Default)]
pub struct SubmitGuard {
    in_flight: bool,
}

impl SubmitGuard {
    pub fn try_begin(&mut self) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    pub fn finish(&mut self) {
        self.in_flight = false;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }
}

/// Local preconditions on the draft itself.
pub fn build_request(
    draft: &BookingDraft,
    max_services: usize,
    today: NaiveDate,
) -> Result<BookingRequest, BookingError> {
    if !is_step_complete(draft, WizardStep::Confirm) {
        let incomplete = WizardStep::ALL
            .into_iter()
            .find(|step| !is_step_complete(draft, *step))
            .unwrap_or(WizardStep::Confirm);
        return Err(BookingError::StepIncomplete(incomplete));
    }
    if draft.services.len() > max_services {
        return Err(BookingError::TooManyServices { max: max_services });
    }
    if let Some(date) = draft.date.filter(|date| *date < today) {
        return Err(BookingError::PastDate(date));
    }

    match (&draft.clinic, &draft.doctor, draft.date, draft.time) {
        (Some(clinic), Some(doctor), Some(date), Some(time)) => Ok(BookingRequest {
            clinic_id: clinic.id,
            doctor_id: doctor.id,
            date,
            time,
            service_ids: draft.services.clone(),
            notes: Some(draft.notes.trim().to_string()).filter(|notes| !notes.is_empty()),
        }),
        _ => Err(BookingError::StepIncomplete(WizardStep::Confirm)),
    }
}

/// Preconditions from the derived views: limit snapshot and slot availability.
pub fn check_gates(
    request: &BookingRequest,
    limit_status: &AppointmentLimitStatus,
    time_available: Option<bool>,
) -> Result<(), BookingError> {
    limits::gate(limit_status)?;
    if time_available == Some(false) {
        return Err(BookingError::SlotUnavailable(request.time));
    }
    Ok(())
}

pub fn rejection_error(rejection: &BookingRejection) -> BookingError {
    if rejection.reason.is_date_conflict() {
        return BookingError::DailyLimitExceeded {
            conflicting: rejection.conflicting_appointment.clone(),
        };
    }
    match rejection.reason {
        RejectionReason::PendingLimitExceeded => BookingError::PendingLimitExceeded,
        _ => BookingError::Rejected {
            reason: rejection.reason.clone(),
            message: rejection.message.clone(),
        },
    }
}

/// Issue the commit call. Business rejections come back as `Ok`.
pub async fn commit(
    backend: &dyn BookingBackend,
    request: &BookingRequest,
) -> Result<CommitOutcome, BookingError> {
    info!("Committing booking with doctor {} at clinic {} on {} {}",
          request.doctor_id, request.clinic_id, request.date, request.time.format("%H:%M"));

    match backend.commit_booking(request).await {
        Ok(CommitOutcome::Booked(result)) => {
            info!("Appointment {} booked ({})", result.appointment_id, result.status);
            Ok(CommitOutcome::Booked(result))
        }
        Ok(CommitOutcome::Rejected(rejection)) => {
            warn!("Booking rejected: {:?} {:?}", rejection.reason, rejection.message);
            Ok(CommitOutcome::Rejected(rejection))
        }
        Err(e) => {
            error!("Booking commit failed: {}", e);
            Err(BookingError::CommitFailed(e.to_string()))
        }
    }
}
