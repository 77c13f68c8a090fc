use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;

use crate::models::{AppointmentRef, RejectionReason, WizardStep};

/// Every variant's message is shown to the user as-is.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BookingError {
    #[error("Please complete the current step ({0}) before continuing")]
    StepIncomplete(WizardStep),

    #[error("You can select at most {max} services per appointment")]
    TooManyServices { max: usize },

    #[error("Appointment date {0} is in the past")]
    PastDate(NaiveDate),

    #[error("Only patients can book appointments")]
    NotPatient,

    #[error("{}", daily_limit_message(.conflicting))]
    DailyLimitExceeded { conflicting: Option<AppointmentRef> },

    #[error("You have reached the maximum number of pending appointments")]
    PendingLimitExceeded,

    #[error("The selected time {} is no longer available", time_label(.0))]
    SlotUnavailable(NaiveTime),

    #[error("{}", rejection_message(.reason, .message))]
    Rejected { reason: RejectionReason, message: Option<String> },

    #[error("Unable to complete your booking right now. Please try again.")]
    CommitFailed(String),
}

fn time_label(time: &NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

fn daily_limit_message(conflicting: &Option<AppointmentRef>) -> String {
    match conflicting {
        Some(appointment) => format!(
            "You already have an {} (appointment {}). Only one appointment per day is allowed; please choose a different date.",
            appointment, appointment.id
        ),
        None => "You already have an appointment on this date. Only one appointment per day is allowed; please choose a different date.".to_string(),
    }
}

fn rejection_message(reason: &RejectionReason, message: &Option<String>) -> String {
    match (reason, message) {
        (RejectionReason::SlotUnavailable, _) => {
            "That time was just taken. Please pick another time.".to_string()
        }
        (RejectionReason::PendingLimitExceeded, _) => {
            "You have reached the maximum number of pending appointments".to_string()
        }
        (_, Some(message)) if !message.trim().is_empty() => message.clone(),
        _ => "The clinic could not accept this booking".to_string(),
    }
}
