use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const BOOKINGS: &str = "bookings";
pub const PASSENGERS: &str = "passengers";

/// Booking lifecycle status. The integer codes are part of the persisted
/// contract and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum BookingStatus {
    Unpaid,
    Paid,
    Cancelled,
    Rescheduled,
}

impl BookingStatus {
    pub fn code(self) -> i32 {
        match self {
            BookingStatus::Unpaid => 1,
            BookingStatus::Paid => 2,
            BookingStatus::Cancelled => 3,
            BookingStatus::Rescheduled => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BookingStatus::Unpaid => "UNPAID",
            BookingStatus::Paid => "PAID",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Rescheduled => "RESCHEDULED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Rescheduled)
    }

    /// The complete transition table; checked centrally by the lifecycle
    /// manager, never by ad hoc comparisons.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Unpaid, BookingStatus::Paid)
                | (BookingStatus::Unpaid, BookingStatus::Cancelled)
                | (BookingStatus::Paid, BookingStatus::Cancelled)
                | (BookingStatus::Paid, BookingStatus::Rescheduled)
        )
    }
}

impl From<BookingStatus> for i32 {
    fn from(status: BookingStatus) -> i32 {
        status.code()
    }
}

impl TryFrom<i32> for BookingStatus {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(BookingStatus::Unpaid),
            2 => Ok(BookingStatus::Paid),
            3 => Ok(BookingStatus::Cancelled),
            4 => Ok(BookingStatus::Rescheduled),
            other => Err(format!("unknown booking status code {other}")),
        }
    }
}

/// Gender codes are likewise fixed in the persisted contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl From<Gender> for i32 {
    fn from(gender: Gender) -> i32 {
        match gender {
            Gender::Male => 1,
            Gender::Female => 2,
            Gender::Other => 3,
        }
    }
}

impl TryFrom<i32> for Gender {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Gender::Male),
            2 => Ok(Gender::Female),
            3 => Ok(Gender::Other),
            other => Err(format!("unknown gender code {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Shared across bookings; identity fields change only through
/// administrative correction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passenger {
    pub id: Uuid,
    pub name: String,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    pub document_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub flight_class_id: Uuid,
    pub contact: ContactInfo,
    /// Always equals passenger_ids.len()
    pub passenger_count: i32,
    pub total_price_nuc: i32,
    pub status: BookingStatus,
    pub passenger_ids: Vec<Uuid>,
    /// Empty once the booking leaves {Unpaid, Paid}
    pub seat_ids: Vec<Uuid>,
    /// Set when a coupon discount was applied at payment
    pub applied_coupon_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}
