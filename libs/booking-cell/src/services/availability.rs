use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{BookingDraft, TimeSlot};
use crate::ports::BookingBackend;
use crate::services::resolution::{KeyedResolution, Ticket};

/// Trigger key for slot resolution. Service ids are kept sorted so that
/// reordering a selection does not count as a change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub service_ids: Vec<Uuid>,
}

impl SlotKey {
    pub fn new(doctor_id: Uuid, date: NaiveDate, mut service_ids: Vec<Uuid>) -> Self {
        service_ids.sort();
        Self { doctor_id, date, service_ids }
    }

    /// `None` until doctor, date and at least one service are chosen.
    pub fn from_draft(draft: &BookingDraft) -> Option<Self> {
        let doctor = draft.doctor.as_ref()?;
        let date = draft.date?;
        if draft.services.is_empty() {
            return None;
        }
        Some(Self::new(doctor.id, date, draft.services.clone()))
    }
}

#[derive(Debug, Default)]
pub struct AvailabilityResolver {
    resolution: KeyedResolution<SlotKey, Vec<TimeSlot>>,
}

impl AvailabilityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ticket for a new query when the draft's slot key changed. An
    /// incomplete key clears the slot list.
    pub fn schedule_for(&mut self, draft: &BookingDraft) -> Option<Ticket<SlotKey>> {
        match SlotKey::from_draft(draft) {
            Some(key) => self.resolution.schedule(key),
            None => {
                if self.resolution.resolved_key().is_some() || self.resolution.is_in_flight() {
                    debug!("Slot key incomplete, clearing availability");
                    self.resolution.invalidate();
                }
                None
            }
        }
    }

    pub fn apply(&mut self, ticket: Ticket<SlotKey>, slots: Vec<TimeSlot>) -> bool {
        self.resolution.apply(ticket, slots)
    }

    pub fn invalidate(&mut self) {
        self.resolution.invalidate();
    }

    pub fn abandon(&mut self, ticket: &Ticket<SlotKey>) {
        self.resolution.abandon(ticket);
    }

    /// Every slot of the latest applied resolution, for display.
    pub fn slots(&self) -> &[TimeSlot] {
        self.resolution.value().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn available_slots(&self) -> Vec<TimeSlot> {
        self.slots().iter().copied().filter(|slot| slot.available).collect()
    }

    pub fn is_loading(&self) -> bool {
        self.resolution.is_in_flight()
    }

    pub fn is_stale(&self) -> bool {
        self.resolution.is_stale()
    }

    pub fn resolved_key(&self) -> Option<&SlotKey> {
        self.resolution.resolved_key()
    }

    /// Whether the draft's time is bookable according to a resolution for
    /// the draft's own key. `None` when no such resolution exists.
    pub fn is_time_available(&self, draft: &BookingDraft) -> Option<bool> {
        let key = SlotKey::from_draft(draft)?;
        let time = draft.time?;
        let slots = self.resolution.value_for(&key)?;
        Some(slots.iter().any(|slot| slot.time == time && slot.available))
    }
}

/// One remote slot query. Failures degrade to an empty list.
pub async fn resolve_slots(
    backend: &dyn BookingBackend,
    key: &SlotKey,
    timeout: Duration,
) -> Vec<TimeSlot> {
    debug!("Resolving slots for doctor {} on {} ({} services)",
           key.doctor_id, key.date, key.service_ids.len());

    let query = backend.compute_time_slots(key.doctor_id, key.date, &key.service_ids);
    match tokio::time::timeout(timeout, query).await {
        Ok(Ok(response)) => {
            if response.doctor_id != key.doctor_id || response.date != key.date {
                warn!("Slot response for doctor {} on {} does not match request for doctor {} on {}",
                      response.doctor_id, response.date, key.doctor_id, key.date);
            }
            response.slots
        }
        Ok(Err(e)) => {
            warn!("Time slot computation failed for doctor {} on {}: {}", key.doctor_id, key.date, e);
            Vec::new()
        }
        Err(_) => {
            warn!("Time slot computation timed out after {:?} for doctor {}", timeout, key.doctor_id);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DoctorRef;
    use chrono::NaiveTime;

    fn draft(doctor_id: Uuid, services: Vec<Uuid>) -> BookingDraft {
        BookingDraft {
            doctor: Some(DoctorRef {
                id: doctor_id,
                name: "Dr. Santos".to_string(),
                specialization: None,
                fee: None,
                rating: None,
                availability: None,
            }),
            date: NaiveDate::from_ymd_opt(2025, 3, 10),
            time: NaiveTime::from_hms_opt(9, 0, 0),
            services,
            ..BookingDraft::default()
        }
    }

    fn slot(hour: u32, available: bool) -> TimeSlot {
        TimeSlot { time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(), available }
    }

    #[test]
    fn test_service_order_does_not_change_key() {
        let doctor = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(SlotKey::from_draft(&draft(doctor, vec![a, b])), SlotKey::from_draft(&draft(doctor, vec![b, a])));

        let mut resolver = AvailabilityResolver::new();
        let ticket = resolver.schedule_for(&draft(doctor, vec![a, b])).unwrap();
        resolver.apply(ticket, vec![slot(9, true)]);
        assert!(resolver.schedule_for(&draft(doctor, vec![b, a])).is_none());
    }

    #[test]
    fn test_incomplete_key_clears_slots() {
        let doctor = Uuid::new_v4();
        let mut resolver = AvailabilityResolver::new();
        let ticket = resolver.schedule_for(&draft(doctor, vec![Uuid::new_v4()])).unwrap();
        resolver.apply(ticket, vec![slot(9, true)]);

        assert!(resolver.schedule_for(&draft(doctor, vec![])).is_none());
        assert!(resolver.slots().is_empty());
    }

    #[test]
    fn test_only_available_slots_pass_the_gate() {
        let doctor = Uuid::new_v4();
        let service = Uuid::new_v4();
        let mut resolver = AvailabilityResolver::new();
        let current = draft(doctor, vec![service]);
        let ticket = resolver.schedule_for(&current).unwrap();
        resolver.apply(ticket, vec![slot(9, false), slot(10, true)]);

        assert_eq!(resolver.slots().len(), 2);
        assert_eq!(resolver.available_slots(), vec![slot(10, true)]);
        assert_eq!(resolver.is_time_available(&current), Some(false));

        let mut moved = current.clone();
        moved.time = NaiveTime::from_hms_opt(10, 0, 0);
        assert_eq!(resolver.is_time_available(&moved), Some(true));

        let other_doctor = draft(Uuid::new_v4(), vec![service]);
        assert_eq!(resolver.is_time_available(&other_doctor), None);
    }
}
