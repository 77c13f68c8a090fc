use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::models::WizardStep;
use crate::ports::StepNavigator;

/// Mirrors wizard step changes onto the history stack.
///
/// The first write of a session replaces the entry the flow was mounted on,
/// every later write pushes. Restores coming from the history surface never
/// write back.
///
/// After a restart the entries behind the current one belong to the previous
/// draft; restores land outside the flow until the wizard pushes again.
#[derive(Debug, Default)]
pub struct NavigationSync {
    mounted: bool,
    restarted: bool,
}

impl NavigationSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Whether a restored entry can still be mapped onto the current draft.
    pub fn accepts_restore(&self) -> bool {
        !self.restarted
    }

    pub fn record(&mut self, step: WizardStep, navigator: &dyn StepNavigator) {
        self.restarted = false;
        if self.mounted {
            debug!("History push: {}", step);
            navigator.push(step);
        } else {
            debug!("History replace (mount): {}", step);
            navigator.replace(step);
            self.mounted = true;
        }
    }

    /// Re-tag the current entry without adding one.
    pub fn retag(&mut self, step: WizardStep, navigator: &dyn StepNavigator) {
        debug!("History replace: {}", step);
        navigator.replace(step);
        self.mounted = true;
    }

    /// Start over on `step` in the current entry, detaching the older ones.
    pub fn restart(&mut self, step: WizardStep, navigator: &dyn StepNavigator) {
        self.retag(step, navigator);
        self.restarted = true;
    }
}

/// Step carried by a restored history entry, if it belongs to the booking flow.
pub fn step_from_entry(tag: Option<&str>) -> Option<WizardStep> {
    tag.and_then(WizardStep::from_tag)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The wizard now shows this step.
    Step(WizardStep),
    /// The entry is outside the booking flow; the host should navigate normally.
    ExitFlow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepChange {
    Moved(WizardStep),
    Unchanged(WizardStep),
    /// "Previous" on the first step was handed to the history surface.
    DeferredToBrowser,
}

#[derive(Debug)]
struct HistoryStack {
    entries: Vec<Option<WizardStep>>,
    cursor: usize,
}

/// In-memory history stack with browser semantics: pushing drops any
/// forward entries. Starts on one untagged entry, the page hosting the flow.
#[derive(Debug)]
pub struct MemoryHistory {
    inner: Mutex<HistoryStack>,
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::with_entries(vec![None])
    }

    /// Start with a prior untagged page behind the booking page.
    pub fn after_page() -> Self {
        Self::with_entries(vec![None, None])
    }

    fn with_entries(entries: Vec<Option<WizardStep>>) -> Self {
        let cursor = entries.len() - 1;
        Self {
            inner: Mutex::new(HistoryStack { entries, cursor }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HistoryStack> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> Option<WizardStep> {
        let stack = self.lock();
        stack.entries[stack.cursor]
    }

    pub fn current_tag(&self) -> Option<&'static str> {
        self.current().map(WizardStep::tag)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn entries(&self) -> Vec<Option<WizardStep>> {
        self.lock().entries.clone()
    }

    /// Move back one entry. Returns `false` at the start of history.
    pub fn go_back(&self) -> bool {
        let mut stack = self.lock();
        if stack.cursor == 0 {
            return false;
        }
        stack.cursor -= 1;
        true
    }

    pub fn go_forward(&self) -> bool {
        let mut stack = self.lock();
        if stack.cursor + 1 >= stack.entries.len() {
            return false;
        }
        stack.cursor += 1;
        true
    }
}

impl StepNavigator for MemoryHistory {
    fn push(&self, step: WizardStep) {
        let mut stack = self.lock();
        let keep = stack.cursor + 1;
        stack.entries.truncate(keep);
        stack.entries.push(Some(step));
        stack.cursor = stack.entries.len() - 1;
    }

    fn replace(&self, step: WizardStep) {
        let mut stack = self.lock();
        let cursor = stack.cursor;
        stack.entries[cursor] = Some(step);
    }

    fn back(&self) {
        self.go_back();
    }
}
