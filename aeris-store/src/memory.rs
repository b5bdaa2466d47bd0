use aeris_core::ledger::{LedgerStore, LedgerTx, Row, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredRow {
    version: u64,
    value: Value,
}

#[derive(Debug, Clone)]
struct UniqueIndex {
    table: String,
    fields: Vec<String>,
}

#[derive(Default)]
struct Shared {
    tables: HashMap<String, BTreeMap<Uuid, StoredRow>>,
    indexes: Vec<UniqueIndex>,
}

/// In-memory ledger store with optimistic transactions.
///
/// Every transaction records the version of each row it read; `commit`
/// revalidates those versions under one lock before applying the staged
/// writes, so a racing commit on the same row surfaces as
/// [`StoreError::Conflict`] rather than a lost update. Declared unique
/// indexes are enforced at the same point.
pub struct MemoryLedger {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    /// Declare a unique constraint over the given document fields.
    /// Rows where any indexed field is absent or null are not indexed.
    pub async fn unique_index(&self, table: &str, fields: &[&str]) {
        let mut shared = self.shared.lock().await;
        shared.indexes.push(UniqueIndex {
            table: table.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        });
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn index_key(value: &Value, fields: &[String]) -> Option<String> {
    let mut parts = Vec::with_capacity(fields.len());
    for field in fields {
        match value.get(field) {
            Some(v) if !v.is_null() => parts.push(v.to_string()),
            _ => return None,
        }
    }
    Some(parts.join("\u{1f}"))
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        Ok(Box::new(MemoryTx {
            shared: self.shared.clone(),
            reads: HashMap::new(),
            writes: HashMap::new(),
        }))
    }

    async fn read(&self, table: &str, key: Uuid) -> Result<Option<Row>, StoreError> {
        let shared = self.shared.lock().await;
        Ok(shared.tables.get(table).and_then(|rows| {
            rows.get(&key).map(|r| Row {
                key,
                version: r.version,
                value: r.value.clone(),
            })
        }))
    }

    async fn scan(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        let shared = self.shared.lock().await;
        Ok(shared
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .map(|(key, r)| Row {
                        key: *key,
                        version: r.version,
                        value: r.value.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

struct MemoryTx {
    shared: Arc<Mutex<Shared>>,
    /// Observed version per row; `None` records that the row was absent
    reads: HashMap<(String, Uuid), Option<u64>>,
    writes: HashMap<(String, Uuid), Value>,
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn read(&mut self, table: &str, key: Uuid) -> Result<Option<Row>, StoreError> {
        let slot = (table.to_string(), key);
        if let Some(staged) = self.writes.get(&slot) {
            let version = self.reads.get(&slot).copied().flatten().unwrap_or(0);
            return Ok(Some(Row {
                key,
                version,
                value: staged.clone(),
            }));
        }

        let shared = self.shared.lock().await;
        let committed = shared.tables.get(table).and_then(|rows| rows.get(&key));
        self.reads
            .entry(slot)
            .or_insert_with(|| committed.map(|r| r.version));

        Ok(committed.map(|r| Row {
            key,
            version: r.version,
            value: r.value.clone(),
        }))
    }

    async fn scan(&mut self, table: &str) -> Result<Vec<Row>, StoreError> {
        let mut result: BTreeMap<Uuid, Row> = BTreeMap::new();
        {
            let shared = self.shared.lock().await;
            if let Some(rows) = shared.tables.get(table) {
                for (key, r) in rows {
                    self.reads
                        .entry((table.to_string(), *key))
                        .or_insert(Some(r.version));
                    result.insert(
                        *key,
                        Row {
                            key: *key,
                            version: r.version,
                            value: r.value.clone(),
                        },
                    );
                }
            }
        }

        // Overlay this transaction's own staged writes
        for ((t, key), staged) in &self.writes {
            if t == table {
                let version = result.get(key).map(|r| r.version).unwrap_or(0);
                result.insert(
                    *key,
                    Row {
                        key: *key,
                        version,
                        value: staged.clone(),
                    },
                );
            }
        }

        Ok(result.into_values().collect())
    }

    async fn scan_where(
        &mut self,
        table: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Row>, StoreError> {
        let mut result: BTreeMap<Uuid, Row> = BTreeMap::new();
        {
            let shared = self.shared.lock().await;
            if let Some(rows) = shared.tables.get(table) {
                for (key, r) in rows {
                    if r.value.get(field) != Some(value) {
                        continue;
                    }
                    self.reads
                        .entry((table.to_string(), *key))
                        .or_insert(Some(r.version));
                    result.insert(
                        *key,
                        Row {
                            key: *key,
                            version: r.version,
                            value: r.value.clone(),
                        },
                    );
                }
            }
        }

        for ((t, key), staged) in &self.writes {
            if t != table {
                continue;
            }
            if staged.get(field) == Some(value) {
                let version = result.get(key).map(|r| r.version).unwrap_or(0);
                result.insert(
                    *key,
                    Row {
                        key: *key,
                        version,
                        value: staged.clone(),
                    },
                );
            } else {
                result.remove(key);
            }
        }

        Ok(result.into_values().collect())
    }

    fn put(&mut self, table: &str, key: Uuid, value: Value) {
        self.writes.insert((table.to_string(), key), value);
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut shared = self.shared.lock().await;

        // Validate the read set: every observed version must still hold
        for ((table, key), observed) in &self.reads {
            let current = shared
                .tables
                .get(table)
                .and_then(|rows| rows.get(key))
                .map(|r| r.version);
            if current != *observed {
                tracing::debug!(table = table.as_str(), %key, "commit conflict on stale read");
                return Err(StoreError::Conflict);
            }
        }

        // Enforce unique indexes against the post-commit state of each
        // touched table
        let indexes = shared.indexes.clone();
        for index in &indexes {
            if !self.writes.keys().any(|(t, _)| t == &index.table) {
                continue;
            }

            let mut seen: HashMap<String, Uuid> = HashMap::new();
            let committed = shared.tables.get(&index.table);
            let final_rows = committed
                .into_iter()
                .flat_map(|rows| rows.iter())
                .map(|(key, r)| (*key, &r.value))
                .filter(|(key, _)| !self.writes.contains_key(&(index.table.clone(), *key)))
                .chain(
                    self.writes
                        .iter()
                        .filter(|((t, _), _)| t == &index.table)
                        .map(|((_, key), value)| (*key, value)),
                );

            for (key, value) in final_rows {
                if let Some(ik) = index_key(value, &index.fields) {
                    if let Some(other) = seen.insert(ik, key) {
                        if other != key {
                            return Err(StoreError::UniqueViolation {
                                table: index.table.clone(),
                                detail: format!("({})", index.fields.join(", ")),
                            });
                        }
                    }
                }
            }
        }

        // Apply all staged writes atomically
        for ((table, key), value) in self.writes {
            let rows = shared.tables.entry(table).or_default();
            let version = rows.get(&key).map(|r| r.version + 1).unwrap_or(1);
            rows.insert(key, StoredRow { version, value });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_then_read_back() {
        let store = MemoryLedger::new();
        let key = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        tx.put("flights", key, json!({"code": "AE101"}));
        tx.commit().await.unwrap();

        let row = store.read("flights", key).await.unwrap().unwrap();
        assert_eq!(row.version, 1);
        assert_eq!(row.value["code"], "AE101");
    }

    #[tokio::test]
    async fn test_stale_read_conflicts_on_commit() {
        let store = MemoryLedger::new();
        let key = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        tx.put("counters", key, json!({"n": 0}));
        tx.commit().await.unwrap();

        let mut tx_a = store.begin().await.unwrap();
        let mut tx_b = store.begin().await.unwrap();
        tx_a.read("counters", key).await.unwrap();
        tx_b.read("counters", key).await.unwrap();

        tx_a.put("counters", key, json!({"n": 1}));
        tx_a.commit().await.unwrap();

        tx_b.put("counters", key, json!({"n": 2}));
        let err = tx_b.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));

        // The winner's write is intact
        let row = store.read("counters", key).await.unwrap().unwrap();
        assert_eq!(row.value["n"], 1);
    }

    #[tokio::test]
    async fn test_absent_row_read_is_validated() {
        let store = MemoryLedger::new();
        let key = Uuid::new_v4();

        // Tx observes the row as absent
        let mut tx = store.begin().await.unwrap();
        assert!(tx.read("codes", key).await.unwrap().is_none());

        // Another writer creates it first
        let mut other = store.begin().await.unwrap();
        other.put("codes", key, json!({"used": true}));
        other.commit().await.unwrap();

        tx.put("codes", key, json!({"used": false}));
        assert!(matches!(tx.commit().await, Err(StoreError::Conflict)));
    }

    #[tokio::test]
    async fn test_unique_index_rejects_duplicates() {
        let store = MemoryLedger::new();
        store.unique_index("seats", &["flight_class_id", "seat_number"]).await;
        let class_id = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        tx.put(
            "seats",
            Uuid::new_v4(),
            json!({"flight_class_id": class_id, "seat_number": "1A"}),
        );
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.put(
            "seats",
            Uuid::new_v4(),
            json!({"flight_class_id": class_id, "seat_number": "1A"}),
        );
        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_scoped_scan_keeps_unrelated_rows_out_of_the_read_set() {
        let store = MemoryLedger::new();
        let class_a = Uuid::new_v4();
        let class_b = Uuid::new_v4();
        let seat_a = Uuid::new_v4();
        let seat_b = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        tx.put("seats", seat_a, json!({"flight_class_id": class_a, "taken": false}));
        tx.put("seats", seat_b, json!({"flight_class_id": class_b, "taken": false}));
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let rows = tx
            .scan_where("seats", "flight_class_id", &json!(class_a))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, seat_a);

        // A commit on the other class's row does not invalidate this tx
        let mut other = store.begin().await.unwrap();
        other.read("seats", seat_b).await.unwrap();
        other.put("seats", seat_b, json!({"flight_class_id": class_b, "taken": true}));
        other.commit().await.unwrap();

        tx.put("seats", seat_a, json!({"flight_class_id": class_a, "taken": true}));
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_scoped_scan_still_conflicts_on_matching_rows() {
        let store = MemoryLedger::new();
        let class_id = Uuid::new_v4();
        let seat = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        tx.put("seats", seat, json!({"flight_class_id": class_id, "taken": false}));
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.scan_where("seats", "flight_class_id", &json!(class_id))
            .await
            .unwrap();

        let mut other = store.begin().await.unwrap();
        other.read("seats", seat).await.unwrap();
        other.put("seats", seat, json!({"flight_class_id": class_id, "taken": true}));
        other.commit().await.unwrap();

        tx.put("seats", seat, json!({"flight_class_id": class_id, "taken": false}));
        assert!(matches!(tx.commit().await, Err(StoreError::Conflict)));
    }

    #[tokio::test]
    async fn test_scan_sees_own_staged_writes() {
        let store = MemoryLedger::new();
        let key = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        tx.put("rows", key, json!({"v": 1}));
        let rows = tx.scan("rows").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value["v"], 1);

        // Nothing visible to other readers before commit
        assert!(store.scan("rows").await.unwrap().is_empty());
        tx.commit().await.unwrap();
        assert_eq!(store.scan("rows").await.unwrap().len(), 1);
    }
}
