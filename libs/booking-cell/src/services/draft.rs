use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use crate::error::BookingError;
use crate::models::{BookingDraft, DraftUpdate, WizardStep};

/// Completion predicate of a single wizard step.
pub fn is_step_complete(draft: &BookingDraft, step: WizardStep) -> bool {
    match step {
        WizardStep::Clinic => draft.clinic.is_some(),
        WizardStep::Services => !draft.services.is_empty(),
        WizardStep::Doctor => draft.doctor.is_some(),
        WizardStep::Datetime => draft.date.is_some() && draft.time.is_some(),
        WizardStep::Confirm => {
            draft.clinic.is_some()
                && draft.doctor.is_some()
                && draft.date.is_some()
                && draft.time.is_some()
                && !draft.services.is_empty()
        }
    }
}

/// In-progress booking plus the current wizard step.
#[derive(Debug, Clone)]
pub struct DraftStore {
    draft: BookingDraft,
    step: WizardStep,
    max_services: usize,
}

impl DraftStore {
    pub fn new(max_services: usize) -> Self {
        Self {
            draft: BookingDraft::default(),
            step: WizardStep::Clinic,
            max_services,
        }
    }

    pub fn draft(&self) -> &BookingDraft {
        &self.draft
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn max_services(&self) -> usize {
        self.max_services
    }

    /// Shallow per-field merge. Nothing is applied if the result is invalid.
    pub fn update(&mut self, update: DraftUpdate, today: NaiveDate) -> Result<(), BookingError> {
        let mut candidate = self.draft.clone();

        if let Some(clinic) = update.clinic {
            candidate.clinic = clinic;
        }
        if let Some(doctor) = update.doctor {
            candidate.doctor = doctor;
        }
        if let Some(date) = update.date {
            candidate.date = date;
        }
        if let Some(time) = update.time {
            candidate.time = time;
        }
        if let Some(services) = update.services {
            candidate.services = dedupe(services);
        }
        if let Some(notes) = update.notes {
            candidate.notes = notes;
        }

        if let Some(date) = candidate.date.filter(|date| *date < today) {
            return Err(BookingError::PastDate(date));
        }
        if candidate.services.len() > self.max_services {
            return Err(BookingError::TooManyServices { max: self.max_services });
        }

        self.draft = candidate;
        let reachable = self.furthest_reachable();
        if self.step > reachable {
            debug!("Draft edit made {} unreachable, moving to {}", self.step, reachable);
            self.step = reachable;
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.draft = BookingDraft::default();
        self.step = WizardStep::Clinic;
    }

    pub fn completion(&self, step: WizardStep) -> bool {
        is_step_complete(&self.draft, step)
    }

    pub fn can_advance(&self) -> bool {
        self.completion(self.step)
    }

    /// Latest step whose predecessors are all complete.
    pub fn furthest_reachable(&self) -> WizardStep {
        WizardStep::ALL
            .into_iter()
            .take_while(|step| step.is_first() || self.all_complete_before(*step))
            .last()
            .unwrap_or(WizardStep::Clinic)
    }

    fn all_complete_before(&self, target: WizardStep) -> bool {
        self.first_incomplete_before(target).is_none()
    }

    fn first_incomplete_before(&self, target: WizardStep) -> Option<WizardStep> {
        WizardStep::ALL
            .into_iter()
            .take_while(|step| *step < target)
            .find(|step| !self.completion(*step))
    }

    /// Move one step forward. `Ok(None)` at the last step.
    pub fn advance(&mut self) -> Result<Option<WizardStep>, BookingError> {
        if !self.can_advance() {
            return Err(BookingError::StepIncomplete(self.step));
        }
        match self.step.next() {
            Some(next) => {
                debug!("Wizard advancing {} -> {}", self.step, next);
                self.step = next;
                Ok(Some(next))
            }
            None => Ok(None),
        }
    }

    /// Move one step back. `None` at the first step.
    pub fn retreat(&mut self) -> Option<WizardStep> {
        let previous = self.step.previous()?;
        debug!("Wizard retreating {} -> {}", self.step, previous);
        self.step = previous;
        Some(previous)
    }

    /// Direct jump. Backward is always allowed; forward requires every earlier step complete.
    pub fn jump_to(&mut self, target: WizardStep) -> Result<bool, BookingError> {
        if target > self.step {
            if let Some(incomplete) = self.first_incomplete_before(target) {
                return Err(BookingError::StepIncomplete(incomplete));
            }
        }
        let changed = target != self.step;
        self.step = target;
        Ok(changed)
    }

    /// Apply a step restored from history, clamped to what the draft allows.
    pub fn restore(&mut self, target: WizardStep) -> WizardStep {
        let reachable = self.furthest_reachable();
        self.step = target.min(reachable);
        self.step
    }
}

fn dedupe(services: Vec<Uuid>) -> Vec<Uuid> {
    let mut unique = Vec::with_capacity(services.len());
    for id in services {
        if !unique.contains(&id) {
            unique.push(id);
        }
    }
    unique
}
