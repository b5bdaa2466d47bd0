pub mod manager;
pub mod models;

pub use manager::{InventoryError, SeatInventoryManager};
pub use models::{CabinClass, FlightClass, Seat};
