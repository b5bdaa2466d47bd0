use crate::manager::{BookingError, BookingLifecycleManager};
use crate::models::{Booking, BookingStatus};
use aeris_core::ledger::{LedgerStore, StoreError};
use aeris_core::{RetryPolicy, RetryableError};
use aeris_loyalty::{LoyaltyError, LoyaltyLedgerManager};
use std::sync::Arc;
use uuid::Uuid;

/// What happens to loyalty points when a booking paid with a coupon is
/// cancelled. A business decision, so it is configuration, not code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefundPolicy {
    /// The coupon stays consumed; no points come back
    #[default]
    KeepCoupon,
    /// Credit the coupon's cost back to the owning customer
    RefundPoints,
}

impl RefundPolicy {
    /// Maps the `booking.refund_policy` config value
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "keep_coupon" => Some(RefundPolicy::KeepCoupon),
            "refund_points" => Some(RefundPolicy::RefundPoints),
            _ => None,
        }
    }
}

/// Composes cross-manager operations that must commit as one unit.
/// Holds no persistent state of its own.
pub struct Coordinator {
    ledger: Arc<dyn LedgerStore>,
    bookings: Arc<BookingLifecycleManager>,
    loyalty: Arc<LoyaltyLedgerManager>,
    refund_policy: RefundPolicy,
    retry: RetryPolicy,
}

impl Coordinator {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        bookings: Arc<BookingLifecycleManager>,
        loyalty: Arc<LoyaltyLedgerManager>,
        refund_policy: RefundPolicy,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            ledger,
            bookings,
            loyalty,
            refund_policy,
            retry,
        }
    }

    pub async fn pay_booking(&self, booking_id: Uuid) -> Result<Booking, CoordinatorError> {
        Ok(self.bookings.mark_paid(booking_id).await?)
    }

    /// Redeem the coupon, apply its percent-off to the booking total and
    /// mark the booking paid, all in one transaction. The booking's status
    /// is re-checked before the redemption inside the same atomic unit, so
    /// a concurrently cancelled booking never consumes the coupon.
    pub async fn pay_booking_with_coupon(
        &self,
        booking_id: Uuid,
        coupon_code: &str,
    ) -> Result<Booking, CoordinatorError> {
        self.retry
            .run(|| async move {
                let mut tx = self.ledger.begin().await?;
                let mut booking = self.bookings.load_in(tx.as_mut(), booking_id).await?;

                if booking.status != BookingStatus::Unpaid {
                    return Err(BookingError::InvalidTransition {
                        from: booking.status.label().to_string(),
                        to: BookingStatus::Paid.label().to_string(),
                    }
                    .into());
                }

                let purchased = self.loyalty.redeem_in(tx.as_mut(), coupon_code).await?;
                let coupon = self.loyalty.coupon_in(tx.as_mut(), purchased.coupon_id).await?;

                // Widened so large totals cannot overflow the product
                let discount =
                    (i64::from(booking.total_price_nuc) * i64::from(coupon.percent_off) / 100) as i32;
                booking.total_price_nuc -= discount;
                booking.applied_coupon_code = Some(coupon_code.to_string());
                BookingLifecycleManager::apply_transition(
                    &mut booking,
                    BookingStatus::Paid,
                    self.bookings.clock.now(),
                )?;
                self.bookings.put_in(tx.as_mut(), &booking)?;
                tx.commit().await?;

                tracing::info!(
                    %booking_id,
                    coupon_code,
                    discount,
                    total = booking.total_price_nuc,
                    "booking paid with coupon"
                );
                Ok(booking)
            })
            .await
    }

    /// Cancel a booking, release its seats and apply the configured refund
    /// policy, atomically. Returns the cancelled booking and the number of
    /// points credited back (zero under [`RefundPolicy::KeepCoupon`]).
    pub async fn cancel_booking_and_refund(
        &self,
        booking_id: Uuid,
    ) -> Result<(Booking, i64), CoordinatorError> {
        self.retry
            .run(|| async move {
                let mut tx = self.ledger.begin().await?;
                let booking = self.bookings.cancel_in(tx.as_mut(), booking_id).await?;

                let mut refunded = 0i64;
                if self.refund_policy == RefundPolicy::RefundPoints {
                    if let Some(code) = &booking.applied_coupon_code {
                        if let Some(purchased) =
                            self.loyalty.purchased_by_code_in(tx.as_mut(), code).await?
                        {
                            let coupon =
                                self.loyalty.coupon_in(tx.as_mut(), purchased.coupon_id).await?;
                            self.loyalty
                                .credit_in(
                                    tx.as_mut(),
                                    purchased.customer_id,
                                    coupon.cost_points,
                                    &format!("refund {code}"),
                                )
                                .await?;
                            refunded = coupon.cost_points;
                        }
                    }
                }

                tx.commit().await?;
                tracing::info!(%booking_id, refunded, "booking cancelled");
                Ok((booking, refunded))
            })
            .await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error(transparent)]
    Loyalty(#[from] LoyaltyError),

    #[error("coordinator contention: retry budget exhausted")]
    Contention,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RetryableError for CoordinatorError {
    fn is_conflict(&self) -> bool {
        match self {
            CoordinatorError::Booking(inner) => inner.is_conflict(),
            CoordinatorError::Loyalty(inner) => inner.is_conflict(),
            CoordinatorError::Store(StoreError::Conflict) => true,
            _ => false,
        }
    }

    fn contention_exhausted() -> Self {
        CoordinatorError::Contention
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContactInfo, Gender};
    use aeris_core::{SystemClock, ThreadRngSource};
    use aeris_inventory::models::SEATS;
    use aeris_inventory::{CabinClass, SeatInventoryManager};
    use aeris_loyalty::models::PURCHASED_COUPONS;
    use aeris_loyalty::CodeSettings;
    use aeris_store::MemoryLedger;
    use chrono::NaiveDate;

    struct Harness {
        inventory: Arc<SeatInventoryManager>,
        bookings: Arc<BookingLifecycleManager>,
        loyalty: Arc<LoyaltyLedgerManager>,
        ledger: Arc<dyn LedgerStore>,
    }

    async fn harness() -> Harness {
        let store = Arc::new(MemoryLedger::new());
        store.unique_index(SEATS, &["flight_class_id", "seat_number"]).await;
        store.unique_index(PURCHASED_COUPONS, &["code"]).await;
        let ledger: Arc<dyn LedgerStore> = store;

        let clock = Arc::new(SystemClock);
        let inventory = Arc::new(SeatInventoryManager::new(
            ledger.clone(),
            RetryPolicy::default(),
        ));
        let bookings = Arc::new(BookingLifecycleManager::new(
            ledger.clone(),
            clock.clone(),
            inventory.clone(),
            RetryPolicy::default(),
        ));
        let loyalty = Arc::new(LoyaltyLedgerManager::new(
            ledger.clone(),
            clock,
            Arc::new(ThreadRngSource),
            RetryPolicy::default(),
            CodeSettings::default(),
        ));
        Harness {
            inventory,
            bookings,
            loyalty,
            ledger,
        }
    }

    impl Harness {
        fn coordinator(&self, refund_policy: RefundPolicy) -> Coordinator {
            Coordinator::new(
                self.ledger.clone(),
                self.bookings.clone(),
                self.loyalty.clone(),
                refund_policy,
                RetryPolicy::default(),
            )
        }

        async fn unpaid_booking(&self) -> Booking {
            let fc = self
                .inventory
                .open_flight_class(Uuid::new_v4(), CabinClass::Economy, &["1A", "1B"], 10000)
                .await
                .unwrap();
            let p = self
                .bookings
                .register_passenger(
                    "Jean Rider",
                    NaiveDate::from_ymd_opt(1985, 6, 1).unwrap(),
                    Gender::Other,
                    "PX-0001",
                )
                .await
                .unwrap();
            self.bookings
                .create_booking(
                    fc.id,
                    &[p.id],
                    ContactInfo {
                        name: "Jean Rider".to_string(),
                        email: "jean@example.com".to_string(),
                        phone: "+1-555-0123".to_string(),
                    },
                )
                .await
                .unwrap()
        }

        async fn coupon_for(&self, customer: Uuid, cost: i64, percent_off: i32) -> String {
            self.loyalty.add_points(customer, cost, "signup").await.unwrap();
            let coupon = self
                .loyalty
                .create_coupon("discount", "", cost, percent_off)
                .await
                .unwrap();
            self.loyalty
                .purchase_coupon(customer, coupon.id)
                .await
                .unwrap()
                .code
        }
    }

    #[tokio::test]
    async fn test_pay_with_coupon_applies_discount() {
        let h = harness().await;
        let coordinator = h.coordinator(RefundPolicy::KeepCoupon);
        let booking = h.unpaid_booking().await;
        let customer = Uuid::new_v4();
        let code = h.coupon_for(customer, 100, 25).await;

        let paid = coordinator
            .pay_booking_with_coupon(booking.id, &code)
            .await
            .unwrap();
        assert_eq!(paid.status, BookingStatus::Paid);
        assert_eq!(paid.total_price_nuc, 7500);
        assert_eq!(paid.applied_coupon_code.as_deref(), Some(code.as_str()));

        // The code is consumed exactly once
        let err = coordinator
            .pay_booking_with_coupon(booking.id, &code)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Booking(BookingError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_discount_on_large_totals_does_not_overflow() {
        let h = harness().await;
        let coordinator = h.coordinator(RefundPolicy::KeepCoupon);

        // 30M NUC cents at 100% off: the raw i32 product would wrap
        let fc = h
            .inventory
            .open_flight_class(Uuid::new_v4(), CabinClass::First, &["1A"], 30_000_000)
            .await
            .unwrap();
        let p = h
            .bookings
            .register_passenger(
                "Big Spender",
                NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
                Gender::Other,
                "PX-9999",
            )
            .await
            .unwrap();
        let booking = h
            .bookings
            .create_booking(
                fc.id,
                &[p.id],
                ContactInfo {
                    name: "Big Spender".to_string(),
                    email: "big@example.com".to_string(),
                    phone: "+1-555-0199".to_string(),
                },
            )
            .await
            .unwrap();
        let customer = Uuid::new_v4();
        let code = h.coupon_for(customer, 100, 100).await;

        let paid = coordinator
            .pay_booking_with_coupon(booking.id, &code)
            .await
            .unwrap();
        assert_eq!(paid.total_price_nuc, 0);
    }

    #[tokio::test]
    async fn test_unknown_code_leaves_booking_untouched() {
        let h = harness().await;
        let coordinator = h.coordinator(RefundPolicy::KeepCoupon);
        let booking = h.unpaid_booking().await;

        let err = coordinator
            .pay_booking_with_coupon(booking.id, "AER-NOSUCH")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Loyalty(LoyaltyError::CodeNotFound(_))
        ));

        let booking = h.bookings.get_booking(booking.id).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Unpaid);
        assert_eq!(booking.total_price_nuc, 10000);
    }

    #[tokio::test]
    async fn test_redeemed_code_is_rejected() {
        let h = harness().await;
        let coordinator = h.coordinator(RefundPolicy::KeepCoupon);
        let booking = h.unpaid_booking().await;
        let customer = Uuid::new_v4();
        let code = h.coupon_for(customer, 100, 10).await;
        h.loyalty.redeem_coupon(&code).await.unwrap();

        let err = coordinator
            .pay_booking_with_coupon(booking.id, &code)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Loyalty(LoyaltyError::AlreadyRedeemed(_))
        ));
    }

    #[tokio::test]
    async fn test_status_recheck_spares_the_coupon() {
        let h = harness().await;
        let coordinator = h.coordinator(RefundPolicy::KeepCoupon);
        let booking = h.unpaid_booking().await;
        let customer = Uuid::new_v4();
        let code = h.coupon_for(customer, 100, 10).await;

        // Another actor cancels first
        h.bookings.cancel(booking.id).await.unwrap();

        let err = coordinator
            .pay_booking_with_coupon(booking.id, &code)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Booking(BookingError::InvalidTransition { .. })
        ));

        // The coupon survived and is still redeemable
        let redeemed = h.loyalty.redeem_coupon(&code).await.unwrap();
        assert!(redeemed.used_at.is_some());
    }

    #[tokio::test]
    async fn test_cancel_keeps_coupon_by_default() {
        let h = harness().await;
        let coordinator = h.coordinator(RefundPolicy::KeepCoupon);
        let booking = h.unpaid_booking().await;
        let customer = Uuid::new_v4();
        let code = h.coupon_for(customer, 100, 10).await;
        coordinator
            .pay_booking_with_coupon(booking.id, &code)
            .await
            .unwrap();

        let (cancelled, refunded) = coordinator
            .cancel_booking_and_refund(booking.id)
            .await
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(refunded, 0);
        assert_eq!(h.loyalty.get_balance(customer).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancel_with_refund_policy_restores_points() {
        let h = harness().await;
        let coordinator = h.coordinator(RefundPolicy::RefundPoints);
        let booking = h.unpaid_booking().await;
        let customer = Uuid::new_v4();
        let code = h.coupon_for(customer, 100, 10).await;
        coordinator
            .pay_booking_with_coupon(booking.id, &code)
            .await
            .unwrap();
        assert_eq!(h.loyalty.get_balance(customer).await.unwrap(), 0);

        let (_, refunded) = coordinator
            .cancel_booking_and_refund(booking.id)
            .await
            .unwrap();
        assert_eq!(refunded, 100);
        assert_eq!(h.loyalty.get_balance(customer).await.unwrap(), 100);
    }

    #[test]
    fn test_refund_policy_from_config_name() {
        assert_eq!(RefundPolicy::from_name("keep_coupon"), Some(RefundPolicy::KeepCoupon));
        assert_eq!(RefundPolicy::from_name("refund_points"), Some(RefundPolicy::RefundPoints));
        assert_eq!(RefundPolicy::from_name("other"), None);
    }
}
