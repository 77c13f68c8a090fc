//! The booking session: one instance per booking flow, created when the
//! patient starts booking and dropped after a successful commit or when the
//! host leaves the flow. All synchronous operations complete immediately;
//! the async ones (`refresh_*`, `load_catalog`, `submit`) only hold the state
//! lock between suspension points, so several may be polled concurrently.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

use crate::error::BookingError;
use crate::models::{
    AppointmentLimitStatus, AppointmentRef, BookingDraft, BookingRequest, BookingSummary, CommitOutcome, DoctorRef, DraftUpdate,
    RejectionReason, ServiceRef, TimeSlot, WizardStep,
};
use crate::ports::{BookingBackend, Clock, IdentityProvider, StepNavigator, SystemClock};
use crate::services::availability::{self, AvailabilityResolver};
use crate::services::catalog::{self, ClinicCatalog};
use crate::services::draft::DraftStore;
use crate::services::limits::{self, LimitGuard, LimitKey};
use crate::services::navigation::{self, NavigationSync, RestoreOutcome, StepChange};
use crate::services::submitter::{self, SubmitGuard, SubmitOutcome};

struct SessionState {
    drafts: DraftStore,
    navigation: NavigationSync,
    availability: AvailabilityResolver,
    limits: LimitGuard,
    catalog: ClinicCatalog,
    submit: SubmitGuard,
    error: Option<String>,
}

impl SessionState {
    fn fail(&mut self, error: BookingError) -> BookingError {
        self.error = Some(error.to_string());
        error
    }

    fn invalidate_derived(&mut self) {
        self.availability.invalidate();
        self.limits.invalidate();
        self.catalog.invalidate();
    }
}

/// Runs the closure when dropped unless disarmed first.
struct OnDrop<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> OnDrop<F> {
    fn new(on_drop: F) -> Self {
        Self(Some(on_drop))
    }

    fn disarm(mut self) {
        self.0 = None;
    }
}

impl<F: FnOnce()> Drop for OnDrop<F> {
    fn drop(&mut self) {
        if let Some(on_drop) = self.0.take() {
            on_drop();
        }
    }
}

/// Everything a view needs to render the wizard.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub step: WizardStep,
    pub draft: BookingDraft,
    pub can_advance: bool,
    pub slots: Vec<TimeSlot>,
    pub slots_loading: bool,
    pub limit_status: Option<AppointmentLimitStatus>,
    pub limits_checking: bool,
    pub services: Vec<ServiceRef>,
    pub doctors: Vec<DoctorRef>,
    pub catalog_error: Option<String>,
    pub submitting: bool,
    pub error: Option<String>,
}

pub struct BookingSession {
    backend: Arc<dyn BookingBackend>,
    navigator: Arc<dyn StepNavigator>,
    identity: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
    resolver_timeout: Duration,
    state: Mutex<SessionState>,
}

impl BookingSession {
    pub fn new(
        config: &AppConfig,
        backend: Arc<dyn BookingBackend>,
        navigator: Arc<dyn StepNavigator>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self::with_clock(config, backend, navigator, identity, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: &AppConfig,
        backend: Arc<dyn BookingBackend>,
        navigator: Arc<dyn StepNavigator>,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut state = SessionState {
            drafts: DraftStore::new(config.max_services_per_booking),
            navigation: NavigationSync::new(),
            availability: AvailabilityResolver::new(),
            limits: LimitGuard::new(),
            catalog: ClinicCatalog::new(),
            submit: SubmitGuard::default(),
            error: None,
        };
        // Tag the entry the flow is mounted on.
        state.navigation.record(state.drafts.step(), navigator.as_ref());
        info!("Booking session started");

        Self {
            backend,
            navigator,
            identity,
            clock,
            resolver_timeout: Duration::from_secs(config.resolver_timeout_seconds),
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --------------------------------------------------------------------
    // Read side
    // --------------------------------------------------------------------

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock();
        SessionSnapshot {
            step: state.drafts.step(),
            draft: state.drafts.draft().clone(),
            can_advance: state.drafts.can_advance(),
            slots: state.availability.slots().to_vec(),
            slots_loading: state.availability.is_loading(),
            limit_status: state.limits.status().cloned(),
            limits_checking: state.limits.is_checking(),
            services: state.catalog.services().to_vec(),
            doctors: state.catalog.doctors().to_vec(),
            catalog_error: state.catalog.error().map(str::to_string),
            submitting: state.submit.is_in_flight(),
            error: state.error.clone(),
        }
    }

    pub fn step(&self) -> WizardStep {
        self.lock().drafts.step()
    }

    pub fn draft(&self) -> BookingDraft {
        self.lock().drafts.draft().clone()
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn clear_error(&self) {
        self.lock().error = None;
    }

    pub fn completion(&self, step: WizardStep) -> bool {
        self.lock().drafts.completion(step)
    }

    pub fn can_advance(&self) -> bool {
        self.lock().drafts.can_advance()
    }

    /// All slots of the latest resolution, available or not.
    pub fn slots(&self) -> Vec<TimeSlot> {
        self.lock().availability.slots().to_vec()
    }

    pub fn available_slots(&self) -> Vec<TimeSlot> {
        self.lock().availability.available_slots()
    }

    pub fn limit_status(&self) -> Option<AppointmentLimitStatus> {
        self.lock().limits.status().cloned()
    }

    pub fn conflicting_appointment(&self) -> Option<AppointmentRef> {
        self.lock().limits.conflicting_appointment().cloned()
    }

    pub fn is_submitting(&self) -> bool {
        self.lock().submit.is_in_flight()
    }

    pub fn summary(&self) -> BookingSummary {
        let state = self.lock();
        state.catalog.summarize(state.drafts.draft())
    }

    // --------------------------------------------------------------------
    // Draft
    // --------------------------------------------------------------------

    pub fn update_draft(&self, update: DraftUpdate) -> Result<(), BookingError> {
        let today = self.clock.today();
        let mut state = self.lock();
        let step_before = state.drafts.step();
        match state.drafts.update(update, today) {
            Ok(()) => {
                state.error = None;
                let step = state.drafts.step();
                if step != step_before {
                    state.navigation.retag(step, self.navigator.as_ref());
                }
                Ok(())
            }
            Err(e) => {
                debug!("Draft update rejected: {}", e);
                Err(state.fail(e))
            }
        }
    }

    /// Add the service if absent, remove it if present.
    pub fn toggle_service(&self, service_id: Uuid) -> Result<(), BookingError> {
        let mut services = self.lock().drafts.draft().services.clone();
        match services.iter().position(|id| *id == service_id) {
            Some(index) => {
                services.remove(index);
            }
            None => services.push(service_id),
        }
        self.update_draft(DraftUpdate::new().services(services))
    }

    pub fn reset_draft(&self) {
        let mut state = self.lock();
        self.reset_locked(&mut state);
    }

    fn reset_locked(&self, state: &mut SessionState) {
        state.drafts.reset();
        state.invalidate_derived();
        state.error = None;
        state.navigation.restart(WizardStep::Clinic, self.navigator.as_ref());
        info!("Booking draft reset");
    }

    // --------------------------------------------------------------------
    // Steps and history
    // --------------------------------------------------------------------

    pub fn next_step(&self) -> Result<WizardStep, BookingError> {
        let mut state = self.lock();
        match state.drafts.advance() {
            Ok(Some(step)) => {
                state.error = None;
                state.navigation.record(step, self.navigator.as_ref());
                Ok(step)
            }
            Ok(None) => Ok(state.drafts.step()),
            Err(e) => Err(state.fail(e)),
        }
    }

    pub fn previous_step(&self) -> StepChange {
        let mut state = self.lock();
        match state.drafts.retreat() {
            Some(step) => {
                state.error = None;
                state.navigation.record(step, self.navigator.as_ref());
                StepChange::Moved(step)
            }
            None => {
                drop(state);
                debug!("Previous on first step, deferring to history");
                self.navigator.back();
                StepChange::DeferredToBrowser
            }
        }
    }

    pub fn go_to_step(&self, step: WizardStep) -> Result<StepChange, BookingError> {
        let mut state = self.lock();
        match state.drafts.jump_to(step) {
            Ok(true) => {
                state.error = None;
                state.navigation.record(step, self.navigator.as_ref());
                Ok(StepChange::Moved(step))
            }
            Ok(false) => Ok(StepChange::Unchanged(step)),
            Err(e) => Err(state.fail(e)),
        }
    }

    /// Back/forward landed on an entry carrying `tag`.
    pub fn handle_history_restore(&self, tag: Option<&str>) -> RestoreOutcome {
        let mut state = self.lock();
        let restored = navigation::step_from_entry(tag).filter(|_| state.navigation.accepts_restore());
        match restored {
            Some(requested) => {
                let step = state.drafts.restore(requested);
                state.error = None;
                if step != requested {
                    warn!("Restored step {} not reachable, showing {}", requested, step);
                    state.navigation.retag(step, self.navigator.as_ref());
                }
                debug!("History restored step {}", step);
                RestoreOutcome::Step(step)
            }
            None => {
                info!("History left the booking flow");
                state.invalidate_derived();
                RestoreOutcome::ExitFlow
            }
        }
    }

    // --------------------------------------------------------------------
    // Derived views
    // --------------------------------------------------------------------

    /// Re-resolve time slots if the (doctor, date, services) key changed.
    /// Returns whether a new slot list was applied.
    pub async fn refresh_availability(&self) -> bool {
        let ticket = {
            let mut state = self.lock();
            let SessionState { drafts, availability, .. } = &mut *state;
            availability.schedule_for(drafts.draft())
        };
        let Some(ticket) = ticket else {
            return false;
        };

        let pending = ticket.clone();
        let abandon = OnDrop::new(move || self.lock().availability.abandon(&pending));
        let slots = availability::resolve_slots(self.backend.as_ref(), ticket.key(), self.resolver_timeout).await;
        abandon.disarm();
        let applied = self.lock().availability.apply(ticket, slots);
        applied
    }

    /// Re-check patient limits if the (clinic, date) key changed.
    pub async fn refresh_limits(&self) -> bool {
        let ticket = {
            let mut state = self.lock();
            let SessionState { drafts, limits, .. } = &mut *state;
            limits.schedule_for(drafts.draft())
        };
        let Some(ticket) = ticket else {
            return false;
        };

        let pending = ticket.clone();
        let abandon = OnDrop::new(move || self.lock().limits.abandon(&pending));
        let user = self.identity.current_user();
        let status = limits::check_limits(
            self.backend.as_ref(),
            user.as_ref(),
            ticket.key(),
            self.resolver_timeout,
        ).await;
        abandon.disarm();
        let applied = self.lock().limits.apply(ticket, status);
        applied
    }

    /// Load the selected clinic's services if the clinic changed.
    pub async fn load_services(&self) -> bool {
        let ticket = {
            let mut state = self.lock();
            let SessionState { drafts, catalog, .. } = &mut *state;
            catalog.schedule_services(drafts.draft())
        };
        let Some(ticket) = ticket else {
            return false;
        };

        let pending = ticket.clone();
        let abandon = OnDrop::new(move || self.lock().catalog.abandon_services(&pending));
        let list = catalog::fetch_services(self.backend.as_ref(), *ticket.key(), self.resolver_timeout).await;
        abandon.disarm();
        let applied = self.lock().catalog.apply_services(ticket, list);
        applied
    }

    /// Load the selected clinic's doctors if the clinic changed.
    pub async fn load_doctors(&self) -> bool {
        let ticket = {
            let mut state = self.lock();
            let SessionState { drafts, catalog, .. } = &mut *state;
            catalog.schedule_doctors(drafts.draft())
        };
        let Some(ticket) = ticket else {
            return false;
        };

        let pending = ticket.clone();
        let abandon = OnDrop::new(move || self.lock().catalog.abandon_doctors(&pending));
        let list = catalog::fetch_doctors(self.backend.as_ref(), *ticket.key(), self.resolver_timeout).await;
        abandon.disarm();
        let applied = self.lock().catalog.apply_doctors(ticket, list);
        applied
    }

    pub async fn load_catalog(&self) -> bool {
        let (services, doctors) = futures::join!(self.load_services(), self.load_doctors());
        services || doctors
    }

    /// Run every derived-view resolver whose key changed, concurrently.
    pub async fn refresh(&self) {
        futures::join!(self.refresh_availability(), self.refresh_limits(), self.load_catalog());
    }

    // --------------------------------------------------------------------
    // Submit
    // --------------------------------------------------------------------

    pub async fn submit(&self) -> Result<SubmitOutcome, BookingError> {
        let user = self.identity.current_user();

        let request = {
            let mut state = self.lock();
            if state.submit.is_in_flight() {
                info!("Submission already in flight, ignoring");
                return Ok(SubmitOutcome::Ignored);
            }
            if !user.as_ref().is_some_and(|user| user.is_patient()) {
                return Err(state.fail(BookingError::NotPatient));
            }
            let max_services = state.drafts.max_services();
            match submitter::build_request(state.drafts.draft(), max_services, self.clock.today()) {
                Ok(request) => {
                    state.submit.try_begin();
                    request
                }
                Err(e) => return Err(state.fail(e)),
            }
        };

        // Released on drop too, so a caller abandoning this future does not
        // leave the session stuck in "submitting".
        let release = OnDrop::new(move || self.lock().submit.finish());
        let result = self.run_submission(user.as_ref(), request).await;
        drop(release);

        let mut state = self.lock();
        result.map_err(|e| state.fail(e))
    }

    async fn run_submission(
        &self,
        user: Option<&User>,
        request: BookingRequest,
    ) -> Result<SubmitOutcome, BookingError> {
        let known_status = {
            let state = self.lock();
            let status = state.limits.status_for(state.drafts.draft()).cloned();
            status
        };
        let limit_status = match known_status {
            Some(status) => status,
            None => {
                debug!("No limit snapshot for the current date, checking before commit");
                let key = LimitKey { clinic_id: request.clinic_id, date: request.date };
                let status = limits::check_limits(self.backend.as_ref(), user, &key, self.resolver_timeout).await;
                let mut state = self.lock();
                let SessionState { drafts, limits, .. } = &mut *state;
                limits.record(drafts.draft(), status.clone());
                status
            }
        };

        let time_available = {
            let state = self.lock();
            let available = state.availability.is_time_available(state.drafts.draft());
            available
        };
        submitter::check_gates(&request, &limit_status, time_available)?;

        let outcome = submitter::commit(self.backend.as_ref(), &request).await?;

        let mut state = self.lock();
        match outcome {
            CommitOutcome::Booked(result) => {
                self.reset_locked(&mut state);
                Ok(SubmitOutcome::Booked(Box::new(result)))
            }
            CommitOutcome::Rejected(rejection) => {
                let SessionState { drafts, limits, availability, .. } = &mut *state;
                limits.record_rejection(drafts.draft(), &rejection);
                if rejection.reason == RejectionReason::SlotUnavailable {
                    availability.invalidate();
                }
                Err(submitter::rejection_error(&rejection))
            }
        }
    }
}
