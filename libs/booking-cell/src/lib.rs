pub mod models;
pub mod error;
pub mod ports;
pub mod services;
pub mod session;

pub use models::*;
pub use error::*;
pub use ports::*;
pub use services::*;
pub use session::{BookingSession, SessionSnapshot};
