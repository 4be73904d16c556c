// In-memory adapter — HashMap-based store implementing the core Adapter trait.
//
// Documents live in `HashMap<String, Vec<serde_json::Value>>` keyed by
// collection name, behind a `tokio::sync::RwLock`. Upsert runs under a
// single write lock, so it is atomic the same way the MongoDB
// find-one-and-update is. Transactions snapshot the store; commit swaps the
// snapshot back into the parent, rollback discards it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use devrelay_core::db::adapter::{
    nested_transactions_unsupported, Adapter, AdapterResult, FindManyQuery, Operator,
    SortDirection, TransactionAdapter, WhereClause,
};
use devrelay_core::db::schema::RelaySchema;

/// Type alias for the in-memory store.
type Store = HashMap<String, Vec<serde_json::Value>>;

/// In-memory document-store adapter. Data is lost when dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryAdapter {
    store: Arc<RwLock<Store>>,
}

impl MemoryAdapter {
    /// Create a new empty in-memory adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record count for a collection (test helper).
    pub async fn collection_count(&self, model: &str) -> usize {
        self.store
            .read()
            .await
            .get(model)
            .map(|v| v.len())
            .unwrap_or(0)
    }

    /// Clear all data.
    pub async fn clear(&self) {
        self.store.write().await.clear();
    }
}

/// Check if a document matches a set of WHERE clauses (ANDed).
fn matches_where(record: &serde_json::Value, clauses: &[WhereClause]) -> bool {
    clauses.iter().all(|clause| {
        let field_val = record
            .get(&clause.field)
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        match clause.operator {
            Operator::Eq => field_val == clause.value,
            Operator::Ne => field_val != clause.value,
            Operator::In => match &clause.value {
                serde_json::Value::Array(arr) => arr.contains(&field_val),
                _ => false,
            },
        }
    })
}

/// Compare two JSON values for sorting.
fn compare_json(a: &serde_json::Value, b: &serde_json::Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (serde_json::Value::Number(an), serde_json::Value::Number(bn)) => {
            match (an.as_f64(), bn.as_f64()) {
                (Some(af), Some(bf)) => af.partial_cmp(&bf).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            }
        }
        (serde_json::Value::String(a_s), serde_json::Value::String(b_s)) => a_s.cmp(b_s),
        _ => Ordering::Equal,
    }
}

/// Apply sorting, offset, and limit from a query.
fn apply_query(mut records: Vec<serde_json::Value>, query: &FindManyQuery) -> Vec<serde_json::Value> {
    if let Some(ref sort) = query.sort_by {
        records.sort_by(|a, b| {
            let cmp = match (a.get(&sort.field), b.get(&sort.field)) {
                (Some(av), Some(bv)) => compare_json(av, bv),
                (Some(_), None) => std::cmp::Ordering::Greater,
                (None, Some(_)) => std::cmp::Ordering::Less,
                (None, None) => std::cmp::Ordering::Equal,
            };
            match sort.direction {
                SortDirection::Asc => cmp,
                SortDirection::Desc => cmp.reverse(),
            }
        });
    }

    if let Some(offset) = query.offset {
        if (offset as usize) < records.len() {
            records = records.split_off(offset as usize);
        } else {
            records.clear();
        }
    }

    if let Some(limit) = query.limit {
        records.truncate(limit as usize);
    }

    records
}

/// Merge update data into an existing document.
fn merge_update(record: &mut serde_json::Value, data: &serde_json::Value) {
    if let (Some(rec_obj), Some(data_obj)) = (record.as_object_mut(), data.as_object()) {
        for (k, v) in data_obj {
            rec_obj.insert(k.clone(), v.clone());
        }
    }
}

/// Ensure a document carries an id, generating one if absent.
fn ensure_id(record: &mut serde_json::Value) {
    let missing = match record.get("id") {
        None | Some(serde_json::Value::Null) => true,
        Some(_) => false,
    };
    if missing {
        if let Some(obj) = record.as_object_mut() {
            obj.insert(
                "id".to_string(),
                serde_json::Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }
    }
}

/// Shared op implementations over any locked store.
async fn store_create(
    store: &RwLock<Store>,
    model: &str,
    data: serde_json::Value,
) -> AdapterResult<serde_json::Value> {
    let mut record = data;
    ensure_id(&mut record);
    let mut guard = store.write().await;
    guard
        .entry(model.to_string())
        .or_default()
        .push(record.clone());
    Ok(record)
}

async fn store_find_one(
    store: &RwLock<Store>,
    model: &str,
    where_clauses: &[WhereClause],
) -> AdapterResult<Option<serde_json::Value>> {
    let guard = store.read().await;
    Ok(guard
        .get(model)
        .and_then(|recs| recs.iter().find(|r| matches_where(r, where_clauses)).cloned()))
}

async fn store_find_many(
    store: &RwLock<Store>,
    model: &str,
    query: FindManyQuery,
) -> AdapterResult<Vec<serde_json::Value>> {
    let guard = store.read().await;
    let records: Vec<serde_json::Value> = guard
        .get(model)
        .map(|recs| {
            recs.iter()
                .filter(|r| matches_where(r, &query.where_clauses))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    Ok(apply_query(records, &query))
}

async fn store_update(
    store: &RwLock<Store>,
    model: &str,
    where_clauses: &[WhereClause],
    data: serde_json::Value,
) -> AdapterResult<Option<serde_json::Value>> {
    let mut guard = store.write().await;
    if let Some(recs) = guard.get_mut(model) {
        if let Some(record) = recs.iter_mut().find(|r| matches_where(r, where_clauses)) {
            merge_update(record, &data);
            return Ok(Some(record.clone()));
        }
    }
    Ok(None)
}

async fn store_upsert(
    store: &RwLock<Store>,
    model: &str,
    where_clauses: &[WhereClause],
    data: serde_json::Value,
    on_insert: serde_json::Value,
) -> AdapterResult<serde_json::Value> {
    // Single write lock makes find-and-update-or-insert one atomic step.
    let mut guard = store.write().await;
    let recs = guard.entry(model.to_string()).or_default();
    if let Some(record) = recs.iter_mut().find(|r| matches_where(r, where_clauses)) {
        merge_update(record, &data);
        return Ok(record.clone());
    }
    let mut record = on_insert;
    merge_update(&mut record, &data);
    ensure_id(&mut record);
    recs.push(record.clone());
    Ok(record)
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn create(
        &self,
        model: &str,
        data: serde_json::Value,
    ) -> AdapterResult<serde_json::Value> {
        store_create(&self.store, model, data).await
    }

    async fn find_one(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<Option<serde_json::Value>> {
        store_find_one(&self.store, model, where_clauses).await
    }

    async fn find_many(
        &self,
        model: &str,
        query: FindManyQuery,
    ) -> AdapterResult<Vec<serde_json::Value>> {
        store_find_many(&self.store, model, query).await
    }

    async fn update(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<Option<serde_json::Value>> {
        store_update(&self.store, model, where_clauses, data).await
    }

    async fn upsert(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
        on_insert: serde_json::Value,
    ) -> AdapterResult<serde_json::Value> {
        store_upsert(&self.store, model, where_clauses, data, on_insert).await
    }

    async fn ensure_schema(&self, _schema: &RelaySchema) -> AdapterResult<()> {
        // No persistent indexes in memory; uniqueness is the service's
        // pre-check plus the store backend in production.
        Ok(())
    }

    async fn begin_transaction(&self) -> AdapterResult<Box<dyn TransactionAdapter>> {
        let snapshot = self.store.read().await.clone();
        Ok(Box::new(MemoryTransactionAdapter {
            parent: self.store.clone(),
            snapshot: Arc::new(RwLock::new(snapshot)),
        }))
    }
}

// ─── Transaction Adapter ─────────────────────────────────────────

/// Snapshot transaction: operations run against a copy of the store. On
/// commit, the copy replaces the parent store; on rollback (or drop) the
/// copy is discarded.
struct MemoryTransactionAdapter {
    parent: Arc<RwLock<Store>>,
    snapshot: Arc<RwLock<Store>>,
}

impl std::fmt::Debug for MemoryTransactionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransactionAdapter").finish()
    }
}

#[async_trait]
impl Adapter for MemoryTransactionAdapter {
    async fn create(
        &self,
        model: &str,
        data: serde_json::Value,
    ) -> AdapterResult<serde_json::Value> {
        store_create(&self.snapshot, model, data).await
    }

    async fn find_one(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<Option<serde_json::Value>> {
        store_find_one(&self.snapshot, model, where_clauses).await
    }

    async fn find_many(
        &self,
        model: &str,
        query: FindManyQuery,
    ) -> AdapterResult<Vec<serde_json::Value>> {
        store_find_many(&self.snapshot, model, query).await
    }

    async fn update(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<Option<serde_json::Value>> {
        store_update(&self.snapshot, model, where_clauses, data).await
    }

    async fn upsert(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
        on_insert: serde_json::Value,
    ) -> AdapterResult<serde_json::Value> {
        store_upsert(&self.snapshot, model, where_clauses, data, on_insert).await
    }

    async fn ensure_schema(&self, _schema: &RelaySchema) -> AdapterResult<()> {
        Ok(())
    }

    async fn begin_transaction(&self) -> AdapterResult<Box<dyn TransactionAdapter>> {
        Err(nested_transactions_unsupported())
    }
}

#[async_trait]
impl TransactionAdapter for MemoryTransactionAdapter {
    async fn commit(self: Box<Self>) -> AdapterResult<()> {
        let snapshot = self.snapshot.read().await.clone();
        let mut parent = self.parent.write().await;
        *parent = snapshot;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AdapterResult<()> {
        // Snapshot is simply discarded.
        Ok(())
    }
}
