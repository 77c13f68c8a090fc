use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    AppointmentLimitStatus, AppointmentRef, BookingRejection, BookingRequest, BookingResult, CommitOutcome,
    DoctorRef, LimitReason, RejectionReason, ServiceRef, TimeSlotsResponse,
};
use crate::ports::BookingBackend;

const FN_AVAILABLE_DOCTORS: &str = "get_available_doctors";
const FN_CLINIC_SERVICES: &str = "get_clinic_services";
const FN_TIME_SLOTS: &str = "get_available_time_slots";
const FN_APPOINTMENT_LIMIT: &str = "check_appointment_limit";
const FN_BOOK_APPOINTMENT: &str = "book_appointment";

/// Response shape shared by the booking functions.
#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
    reason: Option<RejectionReason>,
    conflicting_appointment: Option<AppointmentRef>,
}

impl<T> RpcEnvelope<T> {
    fn into_data(self, function: &str) -> Result<T> {
        if !self.success {
            return Err(anyhow!(
                "{} failed: {}",
                function,
                self.error.unwrap_or_else(|| "unknown error".to_string())
            ));
        }
        self.data.ok_or_else(|| anyhow!("{} returned no data", function))
    }
}

#[derive(Debug, Deserialize)]
struct LimitCheckRow {
    allowed: bool,
    reason: Option<LimitReason>,
    conflicting_appointment: Option<AppointmentRef>,
}

impl From<LimitCheckRow> for AppointmentLimitStatus {
    fn from(row: LimitCheckRow) -> Self {
        Self {
            allowed: row.allowed,
            reason: row.reason.unwrap_or_default(),
            conflicting_appointment: row.conflicting_appointment,
        }
    }
}

/// `BookingBackend` over the Supabase booking functions.
pub struct SupabaseBookingBackend {
    supabase: Arc<SupabaseClient>,
    auth_token: Option<String>,
}

impl SupabaseBookingBackend {
    pub fn new(config: &AppConfig, auth_token: Option<String>) -> Self {
        Self::with_client(Arc::new(SupabaseClient::new(config)), auth_token)
    }

    pub fn with_client(supabase: Arc<SupabaseClient>, auth_token: Option<String>) -> Self {
        Self { supabase, auth_token }
    }

    async fn call<T: DeserializeOwned>(&self, function: &str, params: Value) -> Result<RpcEnvelope<T>> {
        debug!("Calling booking function {}", function);
        self.supabase.rpc(function, params, self.auth_token.as_deref()).await
    }
}

#[async_trait]
impl BookingBackend for SupabaseBookingBackend {
    async fn list_available_doctors(&self, clinic_id: Uuid) -> Result<Vec<DoctorRef>> {
        self.call::<Vec<DoctorRef>>(FN_AVAILABLE_DOCTORS, json!({ "p_clinic_id": clinic_id }))
            .await?
            .into_data(FN_AVAILABLE_DOCTORS)
    }

    async fn list_services(&self, clinic_id: Uuid) -> Result<Vec<ServiceRef>> {
        self.call::<Vec<ServiceRef>>(FN_CLINIC_SERVICES, json!({ "p_clinic_id": clinic_id }))
            .await?
            .into_data(FN_CLINIC_SERVICES)
    }

    async fn compute_time_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        service_ids: &[Uuid],
    ) -> Result<TimeSlotsResponse> {
        let params = json!({
            "p_doctor_id": doctor_id,
            "p_date": date,
            "p_service_ids": service_ids,
        });
        self.call::<TimeSlotsResponse>(FN_TIME_SLOTS, params)
            .await?
            .into_data(FN_TIME_SLOTS)
    }

    async fn check_appointment_limit(
        &self,
        patient_id: &str,
        clinic_id: Uuid,
        date: NaiveDate,
    ) -> Result<AppointmentLimitStatus> {
        let params = json!({
            "p_patient_id": patient_id,
            "p_clinic_id": clinic_id,
            "p_date": date,
        });
        let row = self
            .call::<LimitCheckRow>(FN_APPOINTMENT_LIMIT, params)
            .await?
            .into_data(FN_APPOINTMENT_LIMIT)?;
        Ok(row.into())
    }

    async fn commit_booking(&self, request: &BookingRequest) -> Result<CommitOutcome> {
        let params = json!({
            "p_clinic_id": request.clinic_id,
            "p_doctor_id": request.doctor_id,
            "p_appointment_date": request.date,
            "p_appointment_time": request.time.format("%H:%M").to_string(),
            "p_service_ids": request.service_ids,
            "p_notes": request.notes,
        });
        let mut envelope = self.call::<BookingResult>(FN_BOOK_APPOINTMENT, params).await?;

        if !envelope.success {
            if let Some(reason) = envelope.reason.take() {
                return Ok(CommitOutcome::Rejected(BookingRejection {
                    reason,
                    message: envelope.error.take(),
                    conflicting_appointment: envelope.conflicting_appointment.take(),
                }));
            }
        }
        envelope.into_data(FN_BOOK_APPOINTMENT).map(CommitOutcome::Booked)
    }
}
