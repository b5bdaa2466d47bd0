use crate::manager::{BookingError, BookingLifecycleManager};
use crate::models::{Gender, Passenger, PASSENGERS};
use aeris_core::ledger::{decode, encode};
use chrono::NaiveDate;
use uuid::Uuid;

/// Passenger registry. Passengers are shared across bookings and change
/// only through administrative correction.
impl BookingLifecycleManager {
    pub async fn register_passenger(
        &self,
        name: &str,
        birth_date: NaiveDate,
        gender: Gender,
        document_number: &str,
    ) -> Result<Passenger, BookingError> {
        Self::validate_identity(name, document_number)?;

        let passenger = Passenger {
            id: Uuid::new_v4(),
            name: name.to_string(),
            birth_date,
            gender,
            document_number: document_number.to_string(),
        };

        let mut tx = self.ledger.begin().await?;
        tx.put(PASSENGERS, passenger.id, encode(&passenger)?);
        tx.commit().await?;
        Ok(passenger)
    }

    /// Administrative correction of identity fields
    pub async fn correct_passenger(
        &self,
        passenger_id: Uuid,
        name: &str,
        birth_date: NaiveDate,
        gender: Gender,
        document_number: &str,
    ) -> Result<Passenger, BookingError> {
        Self::validate_identity(name, document_number)?;

        self.retry
            .run(|| async move {
                let mut tx = self.ledger.begin().await?;
                let row = tx
                    .read(PASSENGERS, passenger_id)
                    .await?
                    .ok_or_else(|| BookingError::NotFound(passenger_id.to_string()))?;
                let mut passenger: Passenger = decode(&row)?;
                passenger.name = name.to_string();
                passenger.birth_date = birth_date;
                passenger.gender = gender;
                passenger.document_number = document_number.to_string();
                tx.put(PASSENGERS, passenger.id, encode(&passenger)?);
                tx.commit().await?;
                Ok(passenger)
            })
            .await
    }

    pub async fn passenger(&self, passenger_id: Uuid) -> Result<Passenger, BookingError> {
        let row = self
            .ledger
            .read(PASSENGERS, passenger_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(passenger_id.to_string()))?;
        Ok(decode(&row)?)
    }

    fn validate_identity(name: &str, document_number: &str) -> Result<(), BookingError> {
        if name.trim().is_empty() {
            return Err(BookingError::Validation("passenger name is required".to_string()));
        }
        if document_number.trim().is_empty() {
            return Err(BookingError::Validation(
                "identity document number is required".to_string(),
            ));
        }
        Ok(())
    }
}
