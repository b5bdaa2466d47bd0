pub mod manager;
pub mod models;
pub mod orchestrator;
pub mod passenger;

pub use manager::{BookingError, BookingLifecycleManager};
pub use models::{Booking, BookingStatus, ContactInfo, Gender, Passenger};
pub use orchestrator::{Coordinator, CoordinatorError, RefundPolicy};
