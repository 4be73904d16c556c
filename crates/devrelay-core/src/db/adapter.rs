// Document-store adapter trait — the abstraction every backend implements.
//
// The adapter works with `serde_json::Value` documents so the backends stay
// schema-agnostic; the service layer owns the typed views. The trait carries
// exactly the operations the relay needs: create, find, conditional update,
// atomic upsert, and transactions. There is no delete — no record in this
// system is ever deleted.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::db::schema::RelaySchema;
use crate::error::RelayError;

/// Result type for adapter operations.
pub type AdapterResult<T> = std::result::Result<T, RelayError>;

// ─── Where Clause ────────────────────────────────────────────────

/// Comparison operators for WHERE clauses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Equal (default).
    #[default]
    Eq,
    /// Not equal.
    Ne,
    /// Value is in the given list.
    In,
}

/// A single WHERE condition. Clauses in a slice are ANDed together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhereClause {
    /// The field name to filter on.
    pub field: String,
    /// The comparison value.
    pub value: serde_json::Value,
    /// The comparison operator (default: Eq).
    #[serde(default)]
    pub operator: Operator,
}

impl WhereClause {
    /// Simple equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            operator: Operator::Eq,
        }
    }
}

// ─── Sort / Pagination ───────────────────────────────────────────

/// Sort direction for ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Sort specification (field + direction).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortBy {
    pub field: String,
    pub direction: SortDirection,
}

/// Query parameters for `find_many`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindManyQuery {
    pub where_clauses: Vec<WhereClause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<SortBy>,
}

impl FindManyQuery {
    /// All records of a model, newest first by `createdAt`.
    pub fn newest_first() -> Self {
        Self {
            sort_by: Some(SortBy {
                field: "createdAt".into(),
                direction: SortDirection::Desc,
            }),
            ..Self::default()
        }
    }
}

// ─── Adapter Trait ───────────────────────────────────────────────

/// The core document-store adapter trait.
///
/// `update` and `upsert` are required to be atomic at the store level: the
/// registry's consume-once mailbox relies on a conditional `update`, and the
/// device upsert must never duplicate a record for the same key even when
/// two creators race.
#[async_trait]
pub trait Adapter: Send + Sync + fmt::Debug {
    /// Insert a new document. Returns the stored document.
    async fn create(
        &self,
        model: &str,
        data: serde_json::Value,
    ) -> AdapterResult<serde_json::Value>;

    /// Find a single document matching the WHERE clauses.
    async fn find_one(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<Option<serde_json::Value>>;

    /// Find documents matching the query parameters.
    async fn find_many(
        &self,
        model: &str,
        query: FindManyQuery,
    ) -> AdapterResult<Vec<serde_json::Value>>;

    /// Atomically update the first document matching the WHERE clauses.
    /// Returns the post-update document, or `None` if nothing matched.
    async fn update(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<Option<serde_json::Value>>;

    /// Atomic find-and-update-or-insert.
    ///
    /// When a document matches, `data` fields are merged into it. When none
    /// matches, a new document is created from `on_insert` merged with
    /// `data` (the two field sets must be disjoint). Returns the post-image.
    async fn upsert(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
        on_insert: serde_json::Value,
    ) -> AdapterResult<serde_json::Value>;

    /// Create the unique indexes the schema declares. Idempotent.
    async fn ensure_schema(&self, schema: &RelaySchema) -> AdapterResult<()>;

    /// Begin a new transaction. All writes through the returned adapter are
    /// committed together or rolled back together.
    async fn begin_transaction(&self) -> AdapterResult<Box<dyn TransactionAdapter>>;
}

/// Extension of [`Adapter`] for transaction scopes.
#[async_trait]
pub trait TransactionAdapter: Adapter {
    /// Commit the transaction.
    async fn commit(self: Box<Self>) -> AdapterResult<()>;

    /// Roll back the transaction, discarding all writes made through it.
    async fn rollback(self: Box<Self>) -> AdapterResult<()>;
}

/// Helper for backends without nested-transaction support.
pub fn nested_transactions_unsupported() -> RelayError {
    RelayError::internal("nested transactions are not supported")
}
