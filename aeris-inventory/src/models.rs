use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const FLIGHT_CLASSES: &str = "flight_classes";
pub const SEATS: &str = "seats";

/// Cabin class on a specific flight, with its own seat pool and price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CabinClass {
    Economy,
    Business,
    First,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightClass {
    pub id: Uuid,
    pub flight_id: Uuid,
    pub cabin: CabinClass,
    /// Total seats; never changes after provisioning
    pub capacity: i32,
    /// Unreserved seats; 0 <= available <= capacity
    pub available: i32,
    /// Per-seat price in NUC cents
    pub price_nuc: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seat {
    pub id: Uuid,
    pub flight_class_id: Uuid,
    /// Unique within the flight class
    pub seat_number: String,
    pub is_available: bool,
    /// Kept consistent with the flag: available seats carry no passenger
    pub passenger_id: Option<Uuid>,
}

impl Seat {
    pub fn new(flight_class_id: Uuid, seat_number: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            flight_class_id,
            seat_number,
            is_available: true,
            passenger_id: None,
        }
    }
}
