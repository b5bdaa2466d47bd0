use crate::models::{CabinClass, FlightClass, Seat, FLIGHT_CLASSES, SEATS};
use aeris_core::ledger::{decode, encode, LedgerStore, LedgerTx, StoreError};
use aeris_core::{RetryPolicy, RetryableError};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Owns per-flight-class capacity counters and per-seat assignment state.
///
/// All mutating operations run as one optimistic transaction: the capacity
/// counter read is version-checked at commit, so two reservations racing on
/// the same flight class can never together exceed capacity.
pub struct SeatInventoryManager {
    ledger: Arc<dyn LedgerStore>,
    retry: RetryPolicy,
}

impl SeatInventoryManager {
    pub fn new(ledger: Arc<dyn LedgerStore>, retry: RetryPolicy) -> Self {
        Self { ledger, retry }
    }

    /// Provision a flight class together with its seat map.
    /// Capacity is the number of seats supplied.
    pub async fn open_flight_class(
        &self,
        flight_id: Uuid,
        cabin: CabinClass,
        seat_numbers: &[&str],
        price_nuc: i32,
    ) -> Result<FlightClass, InventoryError> {
        if seat_numbers.is_empty() {
            return Err(InventoryError::Validation(
                "a flight class needs at least one seat".to_string(),
            ));
        }
        let mut deduped: Vec<&str> = seat_numbers.to_vec();
        deduped.sort_unstable();
        deduped.dedup();
        if deduped.len() != seat_numbers.len() {
            return Err(InventoryError::Validation(
                "duplicate seat numbers in seat map".to_string(),
            ));
        }
        if price_nuc < 0 {
            return Err(InventoryError::Validation("price must not be negative".to_string()));
        }

        let flight_class = FlightClass {
            id: Uuid::new_v4(),
            flight_id,
            cabin,
            capacity: seat_numbers.len() as i32,
            available: seat_numbers.len() as i32,
            price_nuc,
        };

        let mut tx = self.ledger.begin().await?;
        tx.put(FLIGHT_CLASSES, flight_class.id, encode(&flight_class)?);
        for number in seat_numbers {
            let seat = Seat::new(flight_class.id, number.to_string());
            tx.put(SEATS, seat.id, encode(&seat)?);
        }
        tx.commit().await?;

        tracing::info!(
            flight_class_id = %flight_class.id,
            capacity = flight_class.capacity,
            "flight class opened"
        );
        Ok(flight_class)
    }

    /// Atomically take `count` seats off the availability counter and mark
    /// the lowest-numbered free seats unavailable. Fails with
    /// [`InventoryError::InsufficientCapacity`] when the class cannot cover
    /// the request.
    pub async fn reserve_seats(
        &self,
        flight_class_id: Uuid,
        count: i32,
    ) -> Result<Vec<Seat>, InventoryError> {
        self.retry
            .run(|| async move {
                let mut tx = self.ledger.begin().await?;
                let seats = self.reserve_in(tx.as_mut(), flight_class_id, count).await?;
                tx.commit().await?;
                Ok(seats)
            })
            .await
    }

    /// Transaction-scoped reservation, for composition into larger atomic
    /// units (e.g. reserve + create booking). The caller owns the commit.
    pub async fn reserve_in(
        &self,
        tx: &mut dyn LedgerTx,
        flight_class_id: Uuid,
        count: i32,
    ) -> Result<Vec<Seat>, InventoryError> {
        if count < 1 {
            return Err(InventoryError::Validation(
                "reservation count must be at least 1".to_string(),
            ));
        }

        let row = tx
            .read(FLIGHT_CLASSES, flight_class_id)
            .await?
            .ok_or_else(|| InventoryError::NotFound(flight_class_id.to_string()))?;
        let mut flight_class: FlightClass = decode(&row)?;

        if flight_class.available < count {
            return Err(InventoryError::InsufficientCapacity {
                requested: count,
                available: flight_class.available,
            });
        }

        // Scoped to the class so unrelated reservations never conflict
        let mut free: Vec<Seat> = Vec::new();
        for seat_row in tx
            .scan_where(SEATS, "flight_class_id", &serde_json::json!(flight_class_id))
            .await?
        {
            let seat: Seat = decode(&seat_row)?;
            if seat.is_available {
                free.push(seat);
            }
        }
        // Deterministic tie-break: lowest seat number first
        free.sort_by(|a, b| a.seat_number.cmp(&b.seat_number));

        if (free.len() as i32) < count {
            return Err(StoreError::Unavailable(
                "seat records out of step with availability counter".to_string(),
            )
            .into());
        }

        let mut reserved = Vec::with_capacity(count as usize);
        for mut seat in free.into_iter().take(count as usize) {
            seat.is_available = false;
            tx.put(SEATS, seat.id, encode(&seat)?);
            reserved.push(seat);
        }

        flight_class.available -= count;
        tx.put(FLIGHT_CLASSES, flight_class.id, encode(&flight_class)?);

        tracing::debug!(
            flight_class_id = %flight_class_id,
            count,
            remaining = flight_class.available,
            "seats reserved"
        );
        Ok(reserved)
    }

    /// Bind a reserved seat to a passenger. Rebinding to the same passenger
    /// is a no-op; binding to a different one fails.
    pub async fn assign_passenger(
        &self,
        seat_id: Uuid,
        passenger_id: Uuid,
    ) -> Result<Seat, InventoryError> {
        self.retry
            .run(|| async move {
                let mut tx = self.ledger.begin().await?;
                let seat = self.assign_in(tx.as_mut(), seat_id, passenger_id).await?;
                tx.commit().await?;
                Ok(seat)
            })
            .await
    }

    pub async fn assign_in(
        &self,
        tx: &mut dyn LedgerTx,
        seat_id: Uuid,
        passenger_id: Uuid,
    ) -> Result<Seat, InventoryError> {
        let row = tx
            .read(SEATS, seat_id)
            .await?
            .ok_or_else(|| InventoryError::NotFound(seat_id.to_string()))?;
        let mut seat: Seat = decode(&row)?;

        if seat.is_available {
            return Err(InventoryError::SeatNotReserved(seat.seat_number));
        }
        match seat.passenger_id {
            Some(existing) if existing == passenger_id => return Ok(seat),
            Some(_) => return Err(InventoryError::SeatAlreadyAssigned(seat.seat_number)),
            None => {}
        }

        seat.passenger_id = Some(passenger_id);
        tx.put(SEATS, seat.id, encode(&seat)?);
        Ok(seat)
    }

    /// Return seats to the pool and restore the availability counters.
    /// Already-available seats are skipped, so replays are harmless.
    pub async fn release_seats(&self, seat_ids: &[Uuid]) -> Result<usize, InventoryError> {
        self.retry
            .run(|| async move {
                let mut tx = self.ledger.begin().await?;
                let released = self.release_in(tx.as_mut(), seat_ids).await?;
                tx.commit().await?;
                Ok(released)
            })
            .await
    }

    pub async fn release_in(
        &self,
        tx: &mut dyn LedgerTx,
        seat_ids: &[Uuid],
    ) -> Result<usize, InventoryError> {
        let mut released_per_class: HashMap<Uuid, i32> = HashMap::new();

        for seat_id in seat_ids {
            let row = tx
                .read(SEATS, *seat_id)
                .await?
                .ok_or_else(|| InventoryError::NotFound(seat_id.to_string()))?;
            let mut seat: Seat = decode(&row)?;

            if seat.is_available {
                continue;
            }
            seat.is_available = true;
            seat.passenger_id = None;
            tx.put(SEATS, seat.id, encode(&seat)?);
            *released_per_class.entry(seat.flight_class_id).or_insert(0) += 1;
        }

        let mut released = 0usize;
        for (flight_class_id, count) in released_per_class {
            let row = tx
                .read(FLIGHT_CLASSES, flight_class_id)
                .await?
                .ok_or_else(|| InventoryError::NotFound(flight_class_id.to_string()))?;
            let mut flight_class: FlightClass = decode(&row)?;
            flight_class.available += count;
            tx.put(FLIGHT_CLASSES, flight_class.id, encode(&flight_class)?);
            released += count as usize;
        }

        if released > 0 {
            tracing::debug!(released, "seats released");
        }
        Ok(released)
    }

    pub async fn flight_class(&self, id: Uuid) -> Result<FlightClass, InventoryError> {
        let row = self
            .ledger
            .read(FLIGHT_CLASSES, id)
            .await?
            .ok_or_else(|| InventoryError::NotFound(id.to_string()))?;
        Ok(decode(&row)?)
    }

    /// Seats of a flight class in seat-number order
    pub async fn seats_for(&self, flight_class_id: Uuid) -> Result<Vec<Seat>, InventoryError> {
        let mut seats = Vec::new();
        for row in self.ledger.scan(SEATS).await? {
            let seat: Seat = decode(&row)?;
            if seat.flight_class_id == flight_class_id {
                seats.push(seat);
            }
        }
        seats.sort_by(|a, b| a.seat_number.cmp(&b.seat_number));
        Ok(seats)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("flight class or seat not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("insufficient capacity: requested {requested}, available {available}")]
    InsufficientCapacity { requested: i32, available: i32 },

    #[error("seat {0} is not reserved")]
    SeatNotReserved(String),

    #[error("seat {0} is already assigned to another passenger")]
    SeatAlreadyAssigned(String),

    #[error("reservation contention: retry budget exhausted")]
    Contention,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RetryableError for InventoryError {
    fn is_conflict(&self) -> bool {
        matches!(self, InventoryError::Store(StoreError::Conflict))
    }

    fn contention_exhausted() -> Self {
        InventoryError::Contention
    }
}
