use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const LOYALTY_ACCOUNTS: &str = "loyalty_accounts";
pub const COUPONS: &str = "coupons";
pub const PURCHASED_COUPONS: &str = "purchased_coupons";
pub const POINTS_ENTRIES: &str = "points_entries";

/// Per-customer points balance, created lazily on first use and never deleted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoyaltyAccount {
    pub customer_id: Uuid,
    pub balance: i64,
}

impl LoyaltyAccount {
    pub fn new(customer_id: Uuid) -> Self {
        Self {
            customer_id,
            balance: 0,
        }
    }
}

/// Catalog entry purchasable with points
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub cost_points: i64,
    /// Discount applied at payment time, 1..=100
    pub percent_off: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One purchased coupon instance. The code is globally unique and the
/// `used_at` marker moves from None to a timestamp exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchasedCoupon {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub coupon_id: Uuid,
    pub code: String,
    pub purchased_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

/// Immutable audit record for every balance mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsEntry {
    pub id: Uuid,
    pub customer_id: Uuid,
    /// Positive for credits, negative for coupon purchases
    pub delta: i64,
    pub reference: String,
    pub created_at: DateTime<Utc>,
}
