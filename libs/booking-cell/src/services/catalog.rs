use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{BookingDraft, BookingSummary, DoctorRef, PriceRange, ServiceRef};
use crate::ports::BookingBackend;
use crate::services::resolution::{KeyedResolution, Ticket};

/// Result of one catalog fetch. A failed fetch is an empty list plus an error.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogList<T> {
    pub items: Vec<T>,
    pub error: Option<String>,
}

impl<T> CatalogList<T> {
    fn failed(error: String) -> Self {
        Self { items: Vec::new(), error: Some(error) }
    }
}

fn schedule_for_clinic<T>(
    resolution: &mut KeyedResolution<Uuid, CatalogList<T>>,
    draft: &BookingDraft,
) -> Option<Ticket<Uuid>> {
    match &draft.clinic {
        Some(clinic) => resolution.schedule(clinic.id),
        None => {
            if resolution.resolved_key().is_some() || resolution.is_in_flight() {
                debug!("Clinic cleared, dropping catalog");
                resolution.invalidate();
            }
            None
        }
    }
}

/// Services and doctors offered by the draft's clinic.
#[derive(Debug, Default)]
pub struct ClinicCatalog {
    services: KeyedResolution<Uuid, CatalogList<ServiceRef>>,
    doctors: KeyedResolution<Uuid, CatalogList<DoctorRef>>,
}

impl ClinicCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ticket for the draft's clinic. No clinic clears the list.
    pub fn schedule_services(&mut self, draft: &BookingDraft) -> Option<Ticket<Uuid>> {
        schedule_for_clinic(&mut self.services, draft)
    }

    pub fn schedule_doctors(&mut self, draft: &BookingDraft) -> Option<Ticket<Uuid>> {
        schedule_for_clinic(&mut self.doctors, draft)
    }

    pub fn abandon_services(&mut self, ticket: &Ticket<Uuid>) {
        self.services.abandon(ticket);
    }

    pub fn abandon_doctors(&mut self, ticket: &Ticket<Uuid>) {
        self.doctors.abandon(ticket);
    }

    pub fn apply_services(&mut self, ticket: Ticket<Uuid>, list: CatalogList<ServiceRef>) -> bool {
        self.services.apply(ticket, list)
    }

    pub fn apply_doctors(&mut self, ticket: Ticket<Uuid>, list: CatalogList<DoctorRef>) -> bool {
        self.doctors.apply(ticket, list)
    }

    pub fn invalidate(&mut self) {
        self.services.invalidate();
        self.doctors.invalidate();
    }

    pub fn services(&self) -> &[ServiceRef] {
        self.services.value().map(|list| list.items.as_slice()).unwrap_or(&[])
    }

    pub fn doctors(&self) -> &[DoctorRef] {
        self.doctors.value().map(|list| list.items.as_slice()).unwrap_or(&[])
    }

    /// First error of the latest service or doctor fetch.
    pub fn error(&self) -> Option<&str> {
        self.services
            .value()
            .and_then(|list| list.error.as_deref())
            .or_else(|| self.doctors.value().and_then(|list| list.error.as_deref()))
    }

    /// Confirm-step summary. Services missing from the catalog are left out of
    /// the totals.
    pub fn summarize(&self, draft: &BookingDraft) -> BookingSummary {
        let services: Vec<ServiceRef> = draft
            .services
            .iter()
            .filter_map(|id| self.services().iter().find(|service| service.id == *id).cloned())
            .collect();

        let total_duration_minutes = services.iter().map(|service| service.duration_minutes).sum();

        let service_price = services
            .iter()
            .filter_map(|service| service.price_range)
            .reduce(PriceRange::combine);
        let doctor_fee = draft.doctor.as_ref().and_then(|doctor| doctor.fee).map(PriceRange::fixed);
        let estimated_price = match (service_price, doctor_fee) {
            (Some(services), Some(fee)) => Some(services.combine(fee)),
            (price, fee) => price.or(fee),
        };

        BookingSummary {
            clinic: draft.clinic.clone(),
            doctor: draft.doctor.clone(),
            date: draft.date,
            time: draft.time,
            services,
            total_duration_minutes,
            estimated_price,
        }
    }
}

pub async fn fetch_services(
    backend: &dyn BookingBackend,
    clinic_id: Uuid,
    timeout: Duration,
) -> CatalogList<ServiceRef> {
    debug!("Loading services for clinic {}", clinic_id);
    match tokio::time::timeout(timeout, backend.list_services(clinic_id)).await {
        Ok(Ok(items)) => CatalogList { items, error: None },
        Ok(Err(e)) => {
            warn!("Failed to load services for clinic {}: {}", clinic_id, e);
            CatalogList::failed("Services could not be loaded".to_string())
        }
        Err(_) => CatalogList::failed("Loading services timed out".to_string()),
    }
}

pub async fn fetch_doctors(
    backend: &dyn BookingBackend,
    clinic_id: Uuid,
    timeout: Duration,
) -> CatalogList<DoctorRef> {
    debug!("Loading doctors for clinic {}", clinic_id);
    match tokio::time::timeout(timeout, backend.list_available_doctors(clinic_id)).await {
        Ok(Ok(items)) => CatalogList { items, error: None },
        Ok(Err(e)) => {
            warn!("Failed to load doctors for clinic {}: {}", clinic_id, e);
            CatalogList::failed("Doctors could not be loaded".to_string())
        }
        Err(_) => CatalogList::failed("Loading doctors timed out".to_string()),
    }
}
