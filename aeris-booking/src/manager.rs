use crate::models::{Booking, BookingStatus, ContactInfo, BOOKINGS, PASSENGERS};
use aeris_core::ledger::{decode, encode, LedgerStore, LedgerTx, StoreError};
use aeris_core::{Clock, RetryPolicy, RetryableError};
use aeris_inventory::models::FLIGHT_CLASSES;
use aeris_inventory::{FlightClass, InventoryError, SeatInventoryManager};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Drives bookings through their status lifecycle and keeps seat and
/// passenger invariants intact. Every state change that touches seats runs
/// in the same transaction as the seat mutation.
pub struct BookingLifecycleManager {
    pub(crate) ledger: Arc<dyn LedgerStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) inventory: Arc<SeatInventoryManager>,
    pub(crate) retry: RetryPolicy,
}

impl BookingLifecycleManager {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        inventory: Arc<SeatInventoryManager>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            ledger,
            clock,
            inventory,
            retry,
        }
    }

    /// Reserve one seat per passenger and persist the booking as Unpaid,
    /// all in one atomic unit. A seat reservation failure propagates
    /// unchanged and leaves no booking behind.
    pub async fn create_booking(
        &self,
        flight_class_id: Uuid,
        passenger_ids: &[Uuid],
        contact: ContactInfo,
    ) -> Result<Booking, BookingError> {
        Self::validate_passenger_set(passenger_ids)?;

        let contact = &contact;
        self.retry
            .run(|| async move {
                let mut tx = self.ledger.begin().await?;
                let booking = self
                    .create_in(tx.as_mut(), flight_class_id, passenger_ids, contact.clone())
                    .await?;
                tx.commit().await?;
                tracing::info!(booking_id = %booking.id, passengers = booking.passenger_count, "booking created");
                Ok(booking)
            })
            .await
    }

    async fn create_in(
        &self,
        tx: &mut dyn LedgerTx,
        flight_class_id: Uuid,
        passenger_ids: &[Uuid],
        contact: ContactInfo,
    ) -> Result<Booking, BookingError> {
        for passenger_id in passenger_ids {
            if tx.read(PASSENGERS, *passenger_id).await?.is_none() {
                return Err(BookingError::NotFound(format!("passenger {passenger_id}")));
            }
        }

        let fc_row = tx
            .read(FLIGHT_CLASSES, flight_class_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("flight class {flight_class_id}")))?;
        let flight_class: FlightClass = decode(&fc_row)?;

        let count = passenger_ids.len() as i32;
        let seats = self
            .inventory
            .reserve_in(tx, flight_class_id, count)
            .await?;
        for (seat, passenger_id) in seats.iter().zip(passenger_ids) {
            self.inventory.assign_in(tx, seat.id, *passenger_id).await?;
        }

        let now = self.clock.now();
        let booking = Booking {
            id: Uuid::new_v4(),
            flight_class_id,
            contact,
            passenger_count: count,
            total_price_nuc: flight_class.price_nuc * count,
            status: BookingStatus::Unpaid,
            passenger_ids: passenger_ids.to_vec(),
            seat_ids: seats.iter().map(|s| s.id).collect(),
            applied_coupon_code: None,
            created_at: now,
            updated_at: now,
            is_deleted: false,
        };
        self.put_in(tx, &booking)?;
        Ok(booking)
    }

    pub async fn mark_paid(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        self.retry
            .run(|| async move {
                let mut tx = self.ledger.begin().await?;
                let mut booking = self.load_in(tx.as_mut(), booking_id).await?;
                Self::apply_transition(&mut booking, BookingStatus::Paid, self.clock.now())?;
                self.put_in(tx.as_mut(), &booking)?;
                tx.commit().await?;
                tracing::info!(%booking_id, "booking paid");
                Ok(booking)
            })
            .await
    }

    /// Cancel from Unpaid or Paid; bound seats are released in the same
    /// atomic unit.
    pub async fn cancel(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        self.retry
            .run(|| async move {
                let mut tx = self.ledger.begin().await?;
                let booking = self.cancel_in(tx.as_mut(), booking_id).await?;
                tx.commit().await?;
                tracing::info!(%booking_id, "booking cancelled");
                Ok(booking)
            })
            .await
    }

    pub(crate) async fn cancel_in(
        &self,
        tx: &mut dyn LedgerTx,
        booking_id: Uuid,
    ) -> Result<Booking, BookingError> {
        let mut booking = self.load_in(tx, booking_id).await?;
        Self::apply_transition(&mut booking, BookingStatus::Cancelled, self.clock.now())?;
        self.inventory.release_in(tx, &booking.seat_ids).await?;
        booking.seat_ids.clear();
        self.put_in(tx, &booking)?;
        Ok(booking)
    }

    /// Move a paid booking to another flight class: release the old seats,
    /// reserve on the new class, mark the old booking Rescheduled and create
    /// a replacement Unpaid booking carrying passengers and contact over.
    /// Either everything commits or nothing does.
    pub async fn reschedule(
        &self,
        booking_id: Uuid,
        new_flight_class_id: Uuid,
    ) -> Result<Booking, BookingError> {
        self.retry
            .run(|| async move {
                let mut tx = self.ledger.begin().await?;
                let mut old = self.load_in(tx.as_mut(), booking_id).await?;
                Self::apply_transition(&mut old, BookingStatus::Rescheduled, self.clock.now())?;

                self.inventory.release_in(tx.as_mut(), &old.seat_ids).await?;
                old.seat_ids.clear();
                self.put_in(tx.as_mut(), &old)?;

                let replacement = self
                    .create_in(
                        tx.as_mut(),
                        new_flight_class_id,
                        &old.passenger_ids,
                        old.contact.clone(),
                    )
                    .await?;
                tx.commit().await?;
                tracing::info!(
                    old_booking = %booking_id,
                    new_booking = %replacement.id,
                    "booking rescheduled"
                );
                Ok(replacement)
            })
            .await
    }

    /// Swap the passenger list while Unpaid, re-reserving seats to match.
    /// Paid and terminal bookings have an immutable passenger list.
    pub async fn update_passengers(
        &self,
        booking_id: Uuid,
        passenger_ids: &[Uuid],
    ) -> Result<Booking, BookingError> {
        Self::validate_passenger_set(passenger_ids)?;

        self.retry
            .run(|| async move {
                let mut tx = self.ledger.begin().await?;
                let mut booking = self.load_in(tx.as_mut(), booking_id).await?;

                if booking.status != BookingStatus::Unpaid {
                    return Err(BookingError::PassengersLocked(booking.status.label().to_string()));
                }
                for passenger_id in passenger_ids {
                    if tx.read(PASSENGERS, *passenger_id).await?.is_none() {
                        return Err(BookingError::NotFound(format!("passenger {passenger_id}")));
                    }
                }

                self.inventory.release_in(tx.as_mut(), &booking.seat_ids).await?;
                let count = passenger_ids.len() as i32;
                let seats = self
                    .inventory
                    .reserve_in(tx.as_mut(), booking.flight_class_id, count)
                    .await?;
                for (seat, passenger_id) in seats.iter().zip(passenger_ids) {
                    self.inventory
                        .assign_in(tx.as_mut(), seat.id, *passenger_id)
                        .await?;
                }

                let fc_row = tx
                    .read(FLIGHT_CLASSES, booking.flight_class_id)
                    .await?
                    .ok_or_else(|| {
                        BookingError::NotFound(format!("flight class {}", booking.flight_class_id))
                    })?;
                let flight_class: FlightClass = decode(&fc_row)?;

                booking.passenger_ids = passenger_ids.to_vec();
                booking.passenger_count = count;
                booking.seat_ids = seats.iter().map(|s| s.id).collect();
                booking.total_price_nuc = flight_class.price_nuc * count;
                booking.updated_at = self.clock.now();
                self.put_in(tx.as_mut(), &booking)?;
                tx.commit().await?;
                Ok(booking)
            })
            .await
    }

    /// Soft-delete a terminal booking; it then reads as absent
    pub async fn archive(&self, booking_id: Uuid) -> Result<(), BookingError> {
        self.retry
            .run(|| async move {
                let mut tx = self.ledger.begin().await?;
                let mut booking = self.load_in(tx.as_mut(), booking_id).await?;
                if !booking.status.is_terminal() {
                    return Err(BookingError::Validation(
                        "only cancelled or rescheduled bookings can be archived".to_string(),
                    ));
                }
                booking.is_deleted = true;
                booking.updated_at = self.clock.now();
                self.put_in(tx.as_mut(), &booking)?;
                tx.commit().await?;
                Ok(())
            })
            .await
    }

    pub async fn get_booking(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        let row = self
            .ledger
            .read(BOOKINGS, booking_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(booking_id.to_string()))?;
        let booking: Booking = decode(&row)?;
        if booking.is_deleted {
            return Err(BookingError::NotFound(booking_id.to_string()));
        }
        Ok(booking)
    }

    pub(crate) async fn load_in(
        &self,
        tx: &mut dyn LedgerTx,
        booking_id: Uuid,
    ) -> Result<Booking, BookingError> {
        let row = tx
            .read(BOOKINGS, booking_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(booking_id.to_string()))?;
        let booking: Booking = decode(&row)?;
        if booking.is_deleted {
            return Err(BookingError::NotFound(booking_id.to_string()));
        }
        Ok(booking)
    }

    pub(crate) fn put_in(&self, tx: &mut dyn LedgerTx, booking: &Booking) -> Result<(), BookingError> {
        tx.put(BOOKINGS, booking.id, encode(booking)?);
        Ok(())
    }

    pub(crate) fn apply_transition(
        booking: &mut Booking,
        next: BookingStatus,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        if !booking.status.can_transition_to(next) {
            return Err(BookingError::InvalidTransition {
                from: booking.status.label().to_string(),
                to: next.label().to_string(),
            });
        }
        booking.status = next;
        booking.updated_at = now;
        Ok(())
    }

    fn validate_passenger_set(passenger_ids: &[Uuid]) -> Result<(), BookingError> {
        if passenger_ids.is_empty() {
            return Err(BookingError::Validation(
                "a booking needs at least one passenger".to_string(),
            ));
        }
        let unique: HashSet<&Uuid> = passenger_ids.iter().collect();
        if unique.len() != passenger_ids.len() {
            return Err(BookingError::Validation(
                "duplicate passengers in booking".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("passenger list is immutable in status {0}")]
    PassengersLocked(String),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error("booking contention: retry budget exhausted")]
    Contention,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RetryableError for BookingError {
    fn is_conflict(&self) -> bool {
        match self {
            BookingError::Store(StoreError::Conflict) => true,
            BookingError::Inventory(inner) => inner.is_conflict(),
            _ => false,
        }
    }

    fn contention_exhausted() -> Self {
        BookingError::Contention
    }
}
