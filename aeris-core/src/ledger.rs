use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// A versioned document row. The version is the store's optimistic-concurrency
/// token: a transaction that read version `v` only commits if the row is still
/// at `v`.
#[derive(Debug, Clone)]
pub struct Row {
    pub key: Uuid,
    pub version: u64,
    pub value: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("transactional conflict on concurrent update")]
    Conflict,

    #[error("unique constraint violated on {table}: {detail}")]
    UniqueViolation { table: String, detail: String },

    #[error("row codec failure: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Transactional persistence boundary for all managers. Mutations to shared
/// counters (seat availability, points balances, redemption markers) go
/// through a transaction so they commit as a single conditional update.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError>;

    /// Read a committed row outside any transaction
    async fn read(&self, table: &str, key: Uuid) -> Result<Option<Row>, StoreError>;

    /// Snapshot of a table's committed rows, for read-side projections
    async fn scan(&self, table: &str) -> Result<Vec<Row>, StoreError>;
}

/// One atomic unit of work. Reads record the observed row versions; `commit`
/// validates every recorded version and applies all staged writes
/// all-or-nothing, failing with [`StoreError::Conflict`] when a concurrent
/// commit got there first.
#[async_trait]
pub trait LedgerTx: Send {
    async fn read(&mut self, table: &str, key: Uuid) -> Result<Option<Row>, StoreError>;

    async fn scan(&mut self, table: &str) -> Result<Vec<Row>, StoreError>;

    /// Like `scan`, but only rows whose `field` equals `value` enter the
    /// result and the read set, so commits touching unrelated rows of the
    /// same table cannot conflict this transaction
    async fn scan_where(
        &mut self,
        table: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Row>, StoreError>;

    /// Stage an insert or full-row update
    fn put(&mut self, table: &str, key: Uuid, value: Value);

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

pub fn decode<T: DeserializeOwned>(row: &Row) -> Result<T, StoreError> {
    Ok(serde_json::from_value(row.value.clone())?)
}

pub fn encode<T: Serialize>(value: &T) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(value)?)
}
