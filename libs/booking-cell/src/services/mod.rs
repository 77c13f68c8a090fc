pub mod availability;
pub mod backend;
pub mod catalog;
pub mod draft;
pub mod limits;
pub mod navigation;
pub mod resolution;
pub mod submitter;

pub use availability::{AvailabilityResolver, SlotKey};
pub use backend::SupabaseBookingBackend;
pub use catalog::ClinicCatalog;
pub use draft::DraftStore;
pub use limits::{LimitGuard, LimitKey};
pub use navigation::{MemoryHistory, NavigationSync, RestoreOutcome, StepChange};
pub use submitter::{SubmitGuard, SubmitOutcome};
