// libs/booking-cell/src/models.rs
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// WIZARD MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    Clinic,
    Services,
    Doctor,
    Datetime,
    Confirm,
}

impl WizardStep {
    pub const ALL: [WizardStep; 5] = [
        WizardStep::Clinic,
        WizardStep::Services,
        WizardStep::Doctor,
        WizardStep::Datetime,
        WizardStep::Confirm,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn previous(self) -> Option<Self> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    pub fn is_first(self) -> bool {
        self == WizardStep::Clinic
    }

    /// Identifier written into history entries.
    pub fn tag(self) -> &'static str {
        match self {
            WizardStep::Clinic => "clinic",
            WizardStep::Services => "services",
            WizardStep::Doctor => "doctor",
            WizardStep::Datetime => "datetime",
            WizardStep::Confirm => "confirm",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|step| step.tag() == tag)
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// ==============================================================================
// CATALOG MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicRef {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorRef {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub specialization: Option<String>,
    #[serde(default)]
    pub fee: Option<f64>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub availability: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl PriceRange {
    pub fn fixed(amount: f64) -> Self {
        Self { min: amount, max: amount }
    }

    pub fn combine(self, other: PriceRange) -> Self {
        Self {
            min: self.min + other.min,
            max: self.max + other.max,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRef {
    pub id: Uuid,
    pub name: String,
    pub duration_minutes: i32,
    #[serde(default)]
    pub price_range: Option<PriceRange>,
}

// ==============================================================================
// DRAFT MODELS
// ==============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingDraft {
    pub clinic: Option<ClinicRef>,
    pub doctor: Option<DoctorRef>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub services: Vec<Uuid>,
    pub notes: String,
}

impl BookingDraft {
    pub fn is_empty(&self) -> bool {
        *self == BookingDraft::default()
    }
}

/// Partial draft update. `None` leaves a field alone; `Some(None)` clears it.
/// `services` replaces the whole list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DraftUpdate {
    pub clinic: Option<Option<ClinicRef>>,
    pub doctor: Option<Option<DoctorRef>>,
    pub date: Option<Option<NaiveDate>>,
    pub time: Option<Option<NaiveTime>>,
    pub services: Option<Vec<Uuid>>,
    pub notes: Option<String>,
}

impl DraftUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clinic(mut self, clinic: ClinicRef) -> Self {
        self.clinic = Some(Some(clinic));
        self
    }

    pub fn doctor(mut self, doctor: DoctorRef) -> Self {
        self.doctor = Some(Some(doctor));
        self
    }

    pub fn date(mut self, date: NaiveDate) -> Self {
        self.date = Some(Some(date));
        self
    }

    pub fn time(mut self, time: NaiveTime) -> Self {
        self.time = Some(Some(time));
        self
    }

    pub fn services(mut self, services: Vec<Uuid>) -> Self {
        self.services = Some(services);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn clear_clinic(mut self) -> Self {
        self.clinic = Some(None);
        self
    }

    pub fn clear_doctor(mut self) -> Self {
        self.doctor = Some(None);
        self
    }

    pub fn clear_date(mut self) -> Self {
        self.date = Some(None);
        self
    }

    pub fn clear_time(mut self) -> Self {
        self.time = Some(None);
        self
    }
}

// ==============================================================================
// AVAILABILITY MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    #[serde(with = "time_of_day")]
    pub time: NaiveTime,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlotsResponse {
    pub date: NaiveDate,
    pub doctor_id: Uuid,
    #[serde(default)]
    pub total_duration_minutes: i32,
    #[serde(default)]
    pub slots: Vec<TimeSlot>,
}

// ==============================================================================
// LIMIT / CONFLICT MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
    Rescheduled,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
            AppointmentStatus::Rescheduled => write!(f, "rescheduled"),
            AppointmentStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// An existing appointment that blocks the candidate date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentRef {
    pub id: Uuid,
    #[serde(default)]
    pub clinic_name: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default, with = "optional_time_of_day")]
    pub time: Option<NaiveTime>,
    #[serde(default)]
    pub status: Option<AppointmentStatus>,
}

impl fmt::Display for AppointmentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "appointment")?;
        if let Some(date) = self.date {
            write!(f, " on {}", date)?;
        }
        if let Some(time) = self.time {
            write!(f, " at {}", time.format("%H:%M"))?;
        }
        if let Some(clinic) = &self.clinic_name {
            write!(f, " at {}", clinic)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitReason {
    #[default]
    None,
    DailyLimitExceeded,
    PendingLimitExceeded,
    #[serde(other)]
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentLimitStatus {
    pub allowed: bool,
    pub reason: LimitReason,
    pub conflicting_appointment: Option<AppointmentRef>,
}

impl AppointmentLimitStatus {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: LimitReason::None,
            conflicting_appointment: None,
        }
    }

    /// The check itself failed. Commit re-validates server-side, so this stays allowed.
    pub fn check_failed() -> Self {
        Self {
            allowed: true,
            reason: LimitReason::Error,
            conflicting_appointment: None,
        }
    }

    pub fn daily_limit_exceeded(conflicting: Option<AppointmentRef>) -> Self {
        Self {
            allowed: false,
            reason: LimitReason::DailyLimitExceeded,
            conflicting_appointment: conflicting,
        }
    }

    pub fn pending_limit_exceeded() -> Self {
        Self {
            allowed: false,
            reason: LimitReason::PendingLimitExceeded,
            conflicting_appointment: None,
        }
    }
}

// ==============================================================================
// COMMIT MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingRequest {
    pub clinic_id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "time_of_day")]
    pub time: NaiveTime,
    pub service_ids: Vec<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingEstimate {
    pub min_total: f64,
    pub max_total: f64,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationPolicy {
    #[serde(default)]
    pub hours_before: Option<i32>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilitySignal {
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub risk_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingResult {
    pub appointment_id: Uuid,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub patient_info: Option<Value>,
    #[serde(default)]
    pub clinic: Option<Value>,
    #[serde(default)]
    pub doctor: Option<Value>,
    #[serde(default)]
    pub services: Vec<Value>,
    #[serde(default)]
    pub pricing_estimate: Option<PricingEstimate>,
    #[serde(default)]
    pub cancellation_policy: Option<CancellationPolicy>,
    #[serde(default)]
    pub reliability: Option<ReliabilitySignal>,
    #[serde(default)]
    pub cross_clinic_context: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    DailyLimitExceeded,
    SameDayConflict,
    PendingLimitExceeded,
    SlotUnavailable,
    #[serde(other)]
    Unknown,
}

impl RejectionReason {
    /// Rejections caused by another appointment on the same day.
    pub fn is_date_conflict(&self) -> bool {
        matches!(self, RejectionReason::DailyLimitExceeded | RejectionReason::SameDayConflict)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookingRejection {
    pub reason: RejectionReason,
    pub message: Option<String>,
    pub conflicting_appointment: Option<AppointmentRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Booked(BookingResult),
    Rejected(BookingRejection),
}

// ==============================================================================
// SUMMARY MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingSummary {
    pub clinic: Option<ClinicRef>,
    pub doctor: Option<DoctorRef>,
    pub date: Option<NaiveDate>,
    #[serde(with = "optional_time_of_day")]
    pub time: Option<NaiveTime>,
    pub services: Vec<ServiceRef>,
    pub total_duration_minutes: i32,
    pub estimated_price: Option<PriceRange>,
}

// ==============================================================================
// SERDE HELPERS
// ==============================================================================

pub fn parse_time_of_day(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

/// `HH:MM` on output; `HH:MM` or `HH:MM:SS` on input.
pub mod time_of_day {
    use chrono::NaiveTime;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_time_of_day(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid time of day: {}", raw)))
    }
}

pub mod optional_time_of_day {
    use chrono::NaiveTime;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error> {
        match time {
            Some(time) => super::time_of_day::serialize(time, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveTime>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => super::parse_time_of_day(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid time of day: {}", raw))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_order_and_tags() {
        assert_eq!(WizardStep::Clinic.next(), Some(WizardStep::Services));
        assert_eq!(WizardStep::Confirm.next(), None);
        assert_eq!(WizardStep::Clinic.previous(), None);
        assert_eq!(WizardStep::Confirm.previous(), Some(WizardStep::Datetime));
        assert!(WizardStep::Doctor < WizardStep::Datetime);

        for step in WizardStep::ALL {
            assert_eq!(WizardStep::from_tag(step.tag()), Some(step));
        }
        assert_eq!(WizardStep::from_tag("payment"), None);
    }

    #[test]
    fn test_time_slot_accepts_seconds_and_short_form() {
        let slots: Vec<TimeSlot> = serde_json::from_value(json!([
            { "time": "09:00", "available": true },
            { "time": "09:30:00", "available": false }
        ])).expect("slots should parse");

        assert_eq!(slots[0].time, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(slots[1].time, NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        assert_eq!(serde_json::to_value(slots[1]).unwrap()["time"], "09:30");

        let bad: Result<TimeSlot, _> = serde_json::from_value(json!({ "time": "9am", "available": true }));
        assert!(bad.is_err());
    }

    #[test]
    fn test_unknown_rejection_reason_is_tolerated() {
        let reason: RejectionReason = serde_json::from_value(json!("clinic_closed")).unwrap();
        assert_eq!(reason, RejectionReason::Unknown);
        assert!(RejectionReason::SameDayConflict.is_date_conflict());
        assert!(!RejectionReason::PendingLimitExceeded.is_date_conflict());
    }

    #[test]
    fn test_appointment_ref_display() {
        let appointment = AppointmentRef {
            id: Uuid::new_v4(),
            clinic_name: Some("Northside Clinic".to_string()),
            date: NaiveDate::from_ymd_opt(2025, 3, 10),
            time: NaiveTime::from_hms_opt(10, 0, 0),
            status: Some(AppointmentStatus::Confirmed),
        };
        assert_eq!(appointment.to_string(), "appointment on 2025-03-10 at 10:00 at Northside Clinic");
    }
}
