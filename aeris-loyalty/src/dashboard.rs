use crate::manager::{LoyaltyError, LoyaltyLedgerManager};
use crate::models::{Coupon, PurchasedCoupon, COUPONS, PURCHASED_COUPONS};
use aeris_core::ledger::decode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Read-side projection over a customer's coupon state.
/// Carries no invariants of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoyaltySummary {
    pub customer_id: Uuid,
    pub total_purchased: usize,
    /// Purchased but not yet redeemed
    pub active: usize,
    pub redeemed: usize,
    /// Catalog entries currently purchasable
    pub available_catalog: usize,
}

impl LoyaltyLedgerManager {
    pub async fn summary(&self, customer_id: Uuid) -> Result<LoyaltySummary, LoyaltyError> {
        let mut total_purchased = 0;
        let mut redeemed = 0;
        for row in self.ledger.scan(PURCHASED_COUPONS).await? {
            let purchased: PurchasedCoupon = decode(&row)?;
            if purchased.customer_id != customer_id {
                continue;
            }
            total_purchased += 1;
            if purchased.used_at.is_some() {
                redeemed += 1;
            }
        }

        let mut available_catalog = 0;
        for row in self.ledger.scan(COUPONS).await? {
            let _coupon: Coupon = decode(&row)?;
            available_catalog += 1;
        }

        Ok(LoyaltySummary {
            customer_id,
            total_purchased,
            active: total_purchased - redeemed,
            redeemed,
            available_catalog,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::CodeSettings;
    use aeris_core::{RetryPolicy, SystemClock, ThreadRngSource};
    use aeris_store::MemoryLedger;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_summary_counts() {
        let store = MemoryLedger::new();
        store.unique_index(PURCHASED_COUPONS, &["code"]).await;
        let loyalty = LoyaltyLedgerManager::new(
            Arc::new(store),
            Arc::new(SystemClock),
            Arc::new(ThreadRngSource),
            RetryPolicy::default(),
            CodeSettings::default(),
        );

        let customer = Uuid::new_v4();
        loyalty.add_points(customer, 500, "signup").await.unwrap();
        let cheap = loyalty.create_coupon("5% off", "", 100, 5).await.unwrap();
        let _dear = loyalty.create_coupon("25% off", "", 400, 25).await.unwrap();

        let a = loyalty.purchase_coupon(customer, cheap.id).await.unwrap();
        let _b = loyalty.purchase_coupon(customer, cheap.id).await.unwrap();
        loyalty.redeem_coupon(&a.code).await.unwrap();

        // Another customer's purchases stay out of the projection
        let other = Uuid::new_v4();
        loyalty.add_points(other, 100, "signup").await.unwrap();
        loyalty.purchase_coupon(other, cheap.id).await.unwrap();

        let summary = loyalty.summary(customer).await.unwrap();
        assert_eq!(summary.total_purchased, 2);
        assert_eq!(summary.active, 1);
        assert_eq!(summary.redeemed, 1);
        assert_eq!(summary.available_catalog, 2);
    }
}
