use crate::models::{
    Coupon, LoyaltyAccount, PointsEntry, PurchasedCoupon, COUPONS, LOYALTY_ACCOUNTS,
    POINTS_ENTRIES, PURCHASED_COUPONS,
};
use aeris_core::ledger::{decode, encode, LedgerStore, LedgerTx, StoreError};
use aeris_core::{Clock, RandomSource, RetryPolicy, RetryableError};
use std::sync::Arc;
use uuid::Uuid;

/// Coupon redemption code generation settings
#[derive(Debug, Clone)]
pub struct CodeSettings {
    pub length: usize,
    /// Fresh random draws before giving up on a unique code
    pub attempts: u32,
}

impl Default for CodeSettings {
    fn default() -> Self {
        Self {
            length: 10,
            attempts: 8,
        }
    }
}

/// Owns per-customer points balances and the coupon purchase/redemption
/// ledger. Balance deductions and purchased-coupon creation share one
/// transaction, so a failed commit leaves the pre-operation state intact.
pub struct LoyaltyLedgerManager {
    pub(crate) ledger: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    codes: Arc<dyn RandomSource>,
    retry: RetryPolicy,
    code_settings: CodeSettings,
}

impl LoyaltyLedgerManager {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        codes: Arc<dyn RandomSource>,
        retry: RetryPolicy,
        code_settings: CodeSettings,
    ) -> Self {
        Self {
            ledger,
            clock,
            codes,
            retry,
            code_settings,
        }
    }

    /// Zero for customers with no prior record; never fails on absence
    pub async fn get_balance(&self, customer_id: Uuid) -> Result<i64, LoyaltyError> {
        let row = self.ledger.read(LOYALTY_ACCOUNTS, customer_id).await?;
        Ok(match row {
            Some(row) => decode::<LoyaltyAccount>(&row)?.balance,
            None => 0,
        })
    }

    /// Credit points to a customer, creating the account lazily.
    /// Returns the new balance.
    pub async fn add_points(
        &self,
        customer_id: Uuid,
        amount: i64,
        reference: &str,
    ) -> Result<i64, LoyaltyError> {
        if amount < 1 {
            return Err(LoyaltyError::InvalidAmount(amount));
        }

        self.retry
            .run(|| async move {
                let mut tx = self.ledger.begin().await?;
                let balance = self
                    .credit_in(tx.as_mut(), customer_id, amount, reference)
                    .await?;
                tx.commit().await?;
                Ok(balance)
            })
            .await
    }

    pub async fn credit_in(
        &self,
        tx: &mut dyn LedgerTx,
        customer_id: Uuid,
        amount: i64,
        reference: &str,
    ) -> Result<i64, LoyaltyError> {
        if amount < 1 {
            return Err(LoyaltyError::InvalidAmount(amount));
        }

        let mut account = match tx.read(LOYALTY_ACCOUNTS, customer_id).await? {
            Some(row) => decode(&row)?,
            None => LoyaltyAccount::new(customer_id),
        };
        account.balance += amount;
        tx.put(LOYALTY_ACCOUNTS, customer_id, encode(&account)?);
        self.append_entry(tx, customer_id, amount, reference)?;

        tracing::debug!(%customer_id, amount, balance = account.balance, "points credited");
        Ok(account.balance)
    }

    /// Add a coupon to the catalog
    pub async fn create_coupon(
        &self,
        name: &str,
        description: &str,
        cost_points: i64,
        percent_off: i32,
    ) -> Result<Coupon, LoyaltyError> {
        Self::validate_coupon(cost_points, percent_off)?;

        let now = self.clock.now();
        let coupon = Coupon {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.to_string(),
            cost_points,
            percent_off,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.ledger.begin().await?;
        tx.put(COUPONS, coupon.id, encode(&coupon)?);
        tx.commit().await?;
        Ok(coupon)
    }

    /// Administrative edit of a catalog entry
    pub async fn update_coupon(
        &self,
        coupon_id: Uuid,
        name: &str,
        description: &str,
        cost_points: i64,
        percent_off: i32,
    ) -> Result<Coupon, LoyaltyError> {
        Self::validate_coupon(cost_points, percent_off)?;

        self.retry
            .run(|| async move {
                let mut tx = self.ledger.begin().await?;
                let row = tx
                    .read(COUPONS, coupon_id)
                    .await?
                    .ok_or_else(|| LoyaltyError::NotFound(coupon_id.to_string()))?;
                let mut coupon: Coupon = decode(&row)?;
                coupon.name = name.to_string();
                coupon.description = description.to_string();
                coupon.cost_points = cost_points;
                coupon.percent_off = percent_off;
                coupon.updated_at = self.clock.now();
                tx.put(COUPONS, coupon.id, encode(&coupon)?);
                tx.commit().await?;
                Ok(coupon)
            })
            .await
    }

    pub async fn coupon(&self, coupon_id: Uuid) -> Result<Coupon, LoyaltyError> {
        let row = self
            .ledger
            .read(COUPONS, coupon_id)
            .await?
            .ok_or_else(|| LoyaltyError::NotFound(coupon_id.to_string()))?;
        Ok(decode(&row)?)
    }

    /// Exchange points for a coupon instance with a fresh unique code.
    /// Deduction and purchase record commit together or not at all.
    pub async fn purchase_coupon(
        &self,
        customer_id: Uuid,
        coupon_id: Uuid,
    ) -> Result<PurchasedCoupon, LoyaltyError> {
        self.retry
            .run(|| async move {
                let mut tx = self.ledger.begin().await?;
                let purchased = self.purchase_in(tx.as_mut(), customer_id, coupon_id).await?;
                tx.commit().await?;
                Ok(purchased)
            })
            .await
    }

    pub async fn purchase_in(
        &self,
        tx: &mut dyn LedgerTx,
        customer_id: Uuid,
        coupon_id: Uuid,
    ) -> Result<PurchasedCoupon, LoyaltyError> {
        let coupon_row = tx
            .read(COUPONS, coupon_id)
            .await?
            .ok_or_else(|| LoyaltyError::NotFound(coupon_id.to_string()))?;
        let coupon: Coupon = decode(&coupon_row)?;

        let mut account = match tx.read(LOYALTY_ACCOUNTS, customer_id).await? {
            Some(row) => decode(&row)?,
            None => LoyaltyAccount::new(customer_id),
        };
        if account.balance < coupon.cost_points {
            return Err(LoyaltyError::InsufficientPoints {
                required: coupon.cost_points,
                balance: account.balance,
            });
        }

        let code = self.draw_unique_code(tx).await?;

        account.balance -= coupon.cost_points;
        tx.put(LOYALTY_ACCOUNTS, customer_id, encode(&account)?);

        let purchased = PurchasedCoupon {
            id: Uuid::new_v4(),
            customer_id,
            coupon_id,
            code: code.clone(),
            purchased_at: self.clock.now(),
            used_at: None,
        };
        tx.put(PURCHASED_COUPONS, purchased.id, encode(&purchased)?);
        self.append_entry(tx, customer_id, -coupon.cost_points, &code)?;

        tracing::info!(%customer_id, coupon = %coupon.name, code, "coupon purchased");
        Ok(purchased)
    }

    /// Consume a redemption code exactly once. Concurrent attempts on the
    /// same code serialize through the store: one caller wins, the rest see
    /// [`LoyaltyError::AlreadyRedeemed`].
    pub async fn redeem_coupon(&self, code: &str) -> Result<PurchasedCoupon, LoyaltyError> {
        self.retry
            .run(|| async move {
                let mut tx = self.ledger.begin().await?;
                let purchased = self.redeem_in(tx.as_mut(), code).await?;
                tx.commit().await?;
                Ok(purchased)
            })
            .await
    }

    pub async fn redeem_in(
        &self,
        tx: &mut dyn LedgerTx,
        code: &str,
    ) -> Result<PurchasedCoupon, LoyaltyError> {
        let mut purchased = self
            .find_by_code(tx, code)
            .await?
            .ok_or_else(|| LoyaltyError::CodeNotFound(code.to_string()))?;

        if purchased.used_at.is_some() {
            return Err(LoyaltyError::AlreadyRedeemed(code.to_string()));
        }
        purchased.used_at = Some(self.clock.now());
        tx.put(PURCHASED_COUPONS, purchased.id, encode(&purchased)?);

        tracing::info!(code, "coupon redeemed");
        Ok(purchased)
    }

    pub async fn coupon_in(
        &self,
        tx: &mut dyn LedgerTx,
        coupon_id: Uuid,
    ) -> Result<Coupon, LoyaltyError> {
        let row = tx
            .read(COUPONS, coupon_id)
            .await?
            .ok_or_else(|| LoyaltyError::NotFound(coupon_id.to_string()))?;
        Ok(decode(&row)?)
    }

    pub async fn purchased_by_code_in(
        &self,
        tx: &mut dyn LedgerTx,
        code: &str,
    ) -> Result<Option<PurchasedCoupon>, LoyaltyError> {
        self.find_by_code(tx, code).await
    }

    pub async fn purchased_coupon(&self, id: Uuid) -> Result<PurchasedCoupon, LoyaltyError> {
        let row = self
            .ledger
            .read(PURCHASED_COUPONS, id)
            .await?
            .ok_or_else(|| LoyaltyError::NotFound(id.to_string()))?;
        Ok(decode(&row)?)
    }

    /// Audit trail for a customer, oldest first
    pub async fn entries_for(&self, customer_id: Uuid) -> Result<Vec<PointsEntry>, LoyaltyError> {
        let mut entries = Vec::new();
        for row in self.ledger.scan(POINTS_ENTRIES).await? {
            let entry: PointsEntry = decode(&row)?;
            if entry.customer_id == customer_id {
                entries.push(entry);
            }
        }
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    async fn find_by_code(
        &self,
        tx: &mut dyn LedgerTx,
        code: &str,
    ) -> Result<Option<PurchasedCoupon>, LoyaltyError> {
        // Scoped to the one code so unrelated purchases never conflict
        let rows = tx
            .scan_where(PURCHASED_COUPONS, "code", &serde_json::json!(code))
            .await?;
        match rows.first() {
            Some(row) => Ok(Some(decode(row)?)),
            None => Ok(None),
        }
    }

    async fn draw_unique_code(&self, tx: &mut dyn LedgerTx) -> Result<String, LoyaltyError> {
        for _ in 0..self.code_settings.attempts {
            let code = format!("AER-{}", self.codes.next_token(self.code_settings.length));
            if self.find_by_code(tx, &code).await?.is_none() {
                return Ok(code);
            }
            tracing::warn!(code, "redemption code collision, drawing again");
        }
        Err(LoyaltyError::CodeGenerationExhausted)
    }

    fn append_entry(
        &self,
        tx: &mut dyn LedgerTx,
        customer_id: Uuid,
        delta: i64,
        reference: &str,
    ) -> Result<(), LoyaltyError> {
        let entry = PointsEntry {
            id: Uuid::new_v4(),
            customer_id,
            delta,
            reference: reference.to_string(),
            created_at: self.clock.now(),
        };
        tx.put(POINTS_ENTRIES, entry.id, encode(&entry)?);
        Ok(())
    }

    fn validate_coupon(cost_points: i64, percent_off: i32) -> Result<(), LoyaltyError> {
        if cost_points < 1 {
            return Err(LoyaltyError::Validation(
                "coupon cost must be at least 1 point".to_string(),
            ));
        }
        if !(1..=100).contains(&percent_off) {
            return Err(LoyaltyError::Validation(
                "percent off must be between 1 and 100".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoyaltyError {
    #[error("amount must be at least 1, got {0}")]
    InvalidAmount(i64),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("coupon or account not found: {0}")]
    NotFound(String),

    #[error("insufficient points: required {required}, balance {balance}")]
    InsufficientPoints { required: i64, balance: i64 },

    #[error("redemption code not found: {0}")]
    CodeNotFound(String),

    #[error("coupon already redeemed: {0}")]
    AlreadyRedeemed(String),

    #[error("could not generate a unique redemption code")]
    CodeGenerationExhausted,

    #[error("loyalty ledger contention: retry budget exhausted")]
    Contention,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RetryableError for LoyaltyError {
    fn is_conflict(&self) -> bool {
        matches!(self, LoyaltyError::Store(StoreError::Conflict))
    }

    fn contention_exhausted() -> Self {
        LoyaltyError::Contention
    }
}
