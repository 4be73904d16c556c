// MongoAdapter — the production Adapter backed by MongoDB.
//
// Duplicate-key failures (server code 11000) map to `RelayError::Conflict`
// so the HTTP layer can answer 409. Transactions use a `ClientSession`
// behind a `tokio::sync::Mutex`; adapter calls within a transaction are
// sequential per request, so the mutex is never contended.

use async_trait::async_trait;
use mongodb::bson::{doc, Document};
use mongodb::options::ReturnDocument;
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use tokio::sync::Mutex;

use devrelay_core::db::adapter::{
    nested_transactions_unsupported, Adapter, AdapterResult, FindManyQuery, TransactionAdapter,
    WhereClause,
};
use devrelay_core::db::schema::RelaySchema;
use devrelay_core::error::RelayError;

use crate::query;

/// MongoDB document-store adapter.
#[derive(Debug, Clone)]
pub struct MongoAdapter {
    client: Client,
    db: Database,
}

impl MongoAdapter {
    /// Create an adapter from an existing client and database name.
    pub fn new(client: Client, db_name: &str) -> Self {
        let db = client.database(db_name);
        Self { client, db }
    }

    /// Connect to a MongoDB URI and select a database.
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self, RelayError> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| RelayError::internal(format!("MongoDB connection failed: {e}")))?;
        Ok(Self::new(client, db_name))
    }

    fn collection(&self, model: &str) -> Collection<Document> {
        self.db.collection(model)
    }
}

/// True when the error is a unique-index violation.
fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};
    match &*err.kind {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        ErrorKind::Command(command_error) => command_error.code == 11000,
        _ => false,
    }
}

fn map_store_err(context: &str, err: mongodb::error::Error) -> RelayError {
    if is_duplicate_key(&err) {
        RelayError::conflict(format!("duplicate key: {err}"))
    } else {
        RelayError::internal(format!("{context}: {err}"))
    }
}

#[async_trait]
impl Adapter for MongoAdapter {
    async fn create(
        &self,
        model: &str,
        data: serde_json::Value,
    ) -> AdapterResult<serde_json::Value> {
        let document = query::build_insert_doc(&data);
        self.collection(model)
            .insert_one(document)
            .await
            .map_err(|e| map_store_err("insert failed", e))?;
        Ok(data)
    }

    async fn find_one(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<Option<serde_json::Value>> {
        let filter = query::build_filter(where_clauses);
        let result = self
            .collection(model)
            .find_one(filter)
            .await
            .map_err(|e| map_store_err("find_one failed", e))?;
        Ok(result.map(|document| query::doc_to_json(&document)))
    }

    async fn find_many(
        &self,
        model: &str,
        find_query: FindManyQuery,
    ) -> AdapterResult<Vec<serde_json::Value>> {
        let filter = query::build_filter(&find_query.where_clauses);
        let collection = self.collection(model);
        let mut find = collection.find(filter);
        if let Some(limit) = find_query.limit {
            find = find.limit(limit);
        }
        if let Some(offset) = find_query.offset {
            find = find.skip(offset as u64);
        }
        if let Some(sort) = query::build_sort(&find_query) {
            find = find.sort(sort);
        }

        let mut cursor = find
            .await
            .map_err(|e| map_store_err("find failed", e))?;

        let mut results = Vec::new();
        use futures_util::StreamExt;
        while let Some(document) = cursor.next().await {
            let document = document.map_err(|e| map_store_err("cursor error", e))?;
            results.push(query::doc_to_json(&document));
        }
        Ok(results)
    }

    async fn update(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<Option<serde_json::Value>> {
        let filter = query::build_filter(where_clauses);
        let update = query::build_update_doc(&data);
        let result = self
            .collection(model)
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| map_store_err("update failed", e))?;
        Ok(result.map(|document| query::doc_to_json(&document)))
    }

    async fn upsert(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
        on_insert: serde_json::Value,
    ) -> AdapterResult<serde_json::Value> {
        let filter = query::build_filter(where_clauses);
        let update = query::build_upsert_doc(&data, &on_insert);
        let result = self
            .collection(model)
            .find_one_and_update(filter, update)
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| map_store_err("upsert failed", e))?;
        result
            .map(|document| query::doc_to_json(&document))
            .ok_or_else(|| RelayError::internal("upsert returned no document"))
    }

    async fn ensure_schema(&self, schema: &RelaySchema) -> AdapterResult<()> {
        for collection_spec in &schema.collections {
            let coll = self.collection(collection_spec.name);
            for index in collection_spec.unique {
                let field = index.field;
                let model = IndexModel::builder()
                    .keys(doc! { field: 1 })
                    .options(
                        mongodb::options::IndexOptions::builder()
                            .unique(true)
                            .sparse(index.sparse)
                            .build(),
                    )
                    .build();
                coll.create_index(model)
                    .await
                    .map_err(|e| map_store_err("create_index failed", e))?;
                tracing::debug!(
                    collection = collection_spec.name,
                    field = index.field,
                    "ensured unique index"
                );
            }
        }
        Ok(())
    }

    async fn begin_transaction(&self) -> AdapterResult<Box<dyn TransactionAdapter>> {
        let mut session = self
            .client
            .start_session()
            .await
            .map_err(|e| RelayError::Transaction(format!("start_session failed: {e}")))?;
        session
            .start_transaction()
            .await
            .map_err(|e| RelayError::Transaction(format!("start_transaction failed: {e}")))?;
        Ok(Box::new(MongoTransactionAdapter {
            db: self.db.clone(),
            session: Mutex::new(session),
        }))
    }
}

// ─── Transaction Adapter ─────────────────────────────────────────

/// Session-scoped adapter: every operation runs inside the transaction the
/// session opened; commit/abort settle all of them together.
struct MongoTransactionAdapter {
    db: Database,
    session: Mutex<ClientSession>,
}

impl std::fmt::Debug for MongoTransactionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoTransactionAdapter").finish()
    }
}

impl MongoTransactionAdapter {
    fn collection(&self, model: &str) -> Collection<Document> {
        self.db.collection(model)
    }
}

#[async_trait]
impl Adapter for MongoTransactionAdapter {
    async fn create(
        &self,
        model: &str,
        data: serde_json::Value,
    ) -> AdapterResult<serde_json::Value> {
        let document = query::build_insert_doc(&data);
        let mut session = self.session.lock().await;
        self.collection(model)
            .insert_one(document)
            .session(&mut *session)
            .await
            .map_err(|e| map_store_err("insert failed", e))?;
        Ok(data)
    }

    async fn find_one(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<Option<serde_json::Value>> {
        let filter = query::build_filter(where_clauses);
        let mut session = self.session.lock().await;
        let result = self
            .collection(model)
            .find_one(filter)
            .session(&mut *session)
            .await
            .map_err(|e| map_store_err("find_one failed", e))?;
        Ok(result.map(|document| query::doc_to_json(&document)))
    }

    async fn find_many(
        &self,
        model: &str,
        find_query: FindManyQuery,
    ) -> AdapterResult<Vec<serde_json::Value>> {
        let filter = query::build_filter(&find_query.where_clauses);
        let mut session = self.session.lock().await;
        let collection = self.collection(model);
        let mut find = collection.find(filter);
        if let Some(limit) = find_query.limit {
            find = find.limit(limit);
        }
        if let Some(offset) = find_query.offset {
            find = find.skip(offset as u64);
        }
        if let Some(sort) = query::build_sort(&find_query) {
            find = find.sort(sort);
        }

        let mut cursor = find
            .session(&mut *session)
            .await
            .map_err(|e| map_store_err("find failed", e))?;

        let mut results = Vec::new();
        while let Some(document) = cursor.next(&mut session).await {
            let document = document.map_err(|e| map_store_err("cursor error", e))?;
            results.push(query::doc_to_json(&document));
        }
        Ok(results)
    }

    async fn update(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<Option<serde_json::Value>> {
        let filter = query::build_filter(where_clauses);
        let update = query::build_update_doc(&data);
        let mut session = self.session.lock().await;
        let result = self
            .collection(model)
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After)
            .session(&mut *session)
            .await
            .map_err(|e| map_store_err("update failed", e))?;
        Ok(result.map(|document| query::doc_to_json(&document)))
    }

    async fn upsert(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
        on_insert: serde_json::Value,
    ) -> AdapterResult<serde_json::Value> {
        let filter = query::build_filter(where_clauses);
        let update = query::build_upsert_doc(&data, &on_insert);
        let mut session = self.session.lock().await;
        let result = self
            .collection(model)
            .find_one_and_update(filter, update)
            .upsert(true)
            .return_document(ReturnDocument::After)
            .session(&mut *session)
            .await
            .map_err(|e| map_store_err("upsert failed", e))?;
        result
            .map(|document| query::doc_to_json(&document))
            .ok_or_else(|| RelayError::internal("upsert returned no document"))
    }

    async fn ensure_schema(&self, _schema: &RelaySchema) -> AdapterResult<()> {
        // Index creation is not a transactional operation.
        Ok(())
    }

    async fn begin_transaction(&self) -> AdapterResult<Box<dyn TransactionAdapter>> {
        Err(nested_transactions_unsupported())
    }
}

#[async_trait]
impl TransactionAdapter for MongoTransactionAdapter {
    async fn commit(self: Box<Self>) -> AdapterResult<()> {
        let mut session = self.session.into_inner();
        session
            .commit_transaction()
            .await
            .map_err(|e| RelayError::Transaction(format!("commit failed: {e}")))
    }

    async fn rollback(self: Box<Self>) -> AdapterResult<()> {
        let mut session = self.session.into_inner();
        session
            .abort_transaction()
            .await
            .map_err(|e| RelayError::Transaction(format!("abort failed: {e}")))
    }
}
