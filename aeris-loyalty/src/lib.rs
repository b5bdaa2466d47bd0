pub mod dashboard;
pub mod manager;
pub mod models;

pub use dashboard::LoyaltySummary;
pub use manager::{CodeSettings, LoyaltyError, LoyaltyLedgerManager};
pub use models::{Coupon, LoyaltyAccount, PointsEntry, PurchasedCoupon};
