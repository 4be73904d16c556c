// MessageLog — append-only message records, written transactionally.
//
// Every ingest path must also guarantee that a device record exists for the
// attributed `deviceId`. The existence-check-and-create plus the message
// insert run inside one transaction scope: either both land or neither does.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use devrelay_core::db::adapter::{Adapter, FindManyQuery, WhereClause};
use devrelay_core::db::models::{collections, ForwardingState};
use devrelay_core::error::{RelayError, Result};
use devrelay_core::utils::id::generate_record_id;
use devrelay_core::utils::time::now_rfc3339;

/// One message as submitted by a client. Batch entries arrive with any
/// subset of these fields; incomplete entries are skipped, not rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IncomingMessage {
    pub sender_phone_number: Option<String>,
    #[serde(rename = "recieverPhoneNumber", alias = "receiverPhoneNumber")]
    pub reciever_phone_number: Option<String>,
    pub message: Option<String>,
    pub time: Option<String>,
}

impl IncomingMessage {
    /// An entry is storable when sender, message, and time are all present
    /// and non-blank.
    fn is_complete(&self) -> bool {
        [&self.sender_phone_number, &self.message, &self.time]
            .iter()
            .all(|f| f.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }
}

/// Result of a batch ingest: the stored records plus how many entries were
/// dropped for missing required fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub saved: Vec<serde_json::Value>,
    pub skipped: usize,
}

/// The transactional message log service.
#[derive(Debug, Clone)]
pub struct MessageLog {
    adapter: Arc<dyn Adapter>,
}

impl MessageLog {
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self { adapter }
    }

    /// Record a single message. All five fields are required.
    pub async fn record_message(
        &self,
        sender_phone_number: &str,
        reciever_phone_number: &str,
        message: &str,
        time: &str,
        device_id: &str,
    ) -> Result<serde_json::Value> {
        let sender_phone_number = sender_phone_number.trim();
        let reciever_phone_number = reciever_phone_number.trim();
        let message = message.trim();
        let time = time.trim();
        let device_id = device_id.trim();
        if [sender_phone_number, reciever_phone_number, message, time, device_id]
            .iter()
            .any(|f| f.is_empty())
        {
            return Err(RelayError::validation("All fields are required"));
        }

        let tx = self.adapter.begin_transaction().await?;

        let outcome: Result<serde_json::Value> = async {
            ensure_device(&*tx, device_id, None).await?;
            tx.create(
                collections::MESSAGE,
                serde_json::json!({
                    "id": generate_record_id(),
                    "senderPhoneNumber": sender_phone_number,
                    "recieverPhoneNumber": reciever_phone_number,
                    "message": message,
                    "time": time,
                    "deviceId": device_id,
                    "createdAt": now_rfc3339(),
                }),
            )
            .await
        }
        .await;

        match outcome {
            Ok(record) => {
                tx.commit().await.map_err(as_transaction_failure)?;
                Ok(record)
            }
            Err(err) => {
                rollback_logged(tx).await;
                Err(as_transaction_failure(err))
            }
        }
    }

    /// Record a batch of messages for one device.
    ///
    /// Incomplete entries are dropped and counted in the outcome. If no
    /// entry survives the filter, nothing is written and the call fails
    /// with a validation error. Device creation and the inserts commit as
    /// one unit. Entries without their own receiver inherit the batch-level
    /// `reciever_phone_number`. On creation only, the device's
    /// `mobileNumber` is taken from the batch-level receiver or, failing
    /// that, the first entry's receiver.
    pub async fn record_message_batch(
        &self,
        device_id: &str,
        reciever_phone_number: Option<&str>,
        messages: &[IncomingMessage],
    ) -> Result<BatchOutcome> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(RelayError::validation("deviceId is required"));
        }
        if messages.is_empty() {
            return Err(RelayError::validation("messages must be a non-empty array"));
        }

        let complete: Vec<&IncomingMessage> =
            messages.iter().filter(|m| m.is_complete()).collect();
        let skipped = messages.len() - complete.len();
        if complete.is_empty() {
            return Err(RelayError::validation(
                "messages contained no storable entries",
            ));
        }
        if skipped > 0 {
            tracing::debug!(device_id, skipped, "dropping incomplete batch entries");
        }

        let batch_receiver = reciever_phone_number
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let mobile_number = batch_receiver.or_else(|| {
            messages[0]
                .reciever_phone_number
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
        });

        let tx = self.adapter.begin_transaction().await?;

        let outcome: Result<Vec<serde_json::Value>> = async {
            ensure_device(&*tx, device_id, mobile_number).await?;
            let mut saved = Vec::with_capacity(complete.len());
            for entry in &complete {
                let receiver = entry
                    .reciever_phone_number
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .or(batch_receiver);
                let record = tx
                    .create(
                        collections::MESSAGE,
                        serde_json::json!({
                            "id": generate_record_id(),
                            "senderPhoneNumber": entry.sender_phone_number.as_deref().map(str::trim),
                            "recieverPhoneNumber": receiver,
                            "message": entry.message.as_deref().map(str::trim),
                            "time": entry.time.as_deref().map(str::trim),
                            "deviceId": device_id,
                            "createdAt": now_rfc3339(),
                        }),
                    )
                    .await?;
                saved.push(record);
            }
            Ok(saved)
        }
        .await;

        match outcome {
            Ok(saved) => {
                tx.commit().await.map_err(as_transaction_failure)?;
                Ok(BatchOutcome { saved, skipped })
            }
            Err(err) => {
                rollback_logged(tx).await;
                Err(as_transaction_failure(err))
            }
        }
    }

    /// All logged messages, newest first.
    pub async fn list_messages(&self) -> Result<Vec<serde_json::Value>> {
        self.adapter
            .find_many(collections::MESSAGE, FindManyQuery::newest_first())
            .await
    }
}

/// Upsert a bare device record inside the transaction so the message has a
/// parent. Field defaults only apply on insert; an existing record is left
/// alone apart from its `updatedAt` stamp.
async fn ensure_device(
    tx: &dyn Adapter,
    device_id: &str,
    mobile_number: Option<&str>,
) -> Result<()> {
    let mut on_insert = serde_json::json!({
        "id": generate_record_id(),
        "isForwarded": ForwardingState::Deactive,
        "messageFetched": false,
        "createdAt": now_rfc3339(),
    });
    if let (Some(number), Some(map)) = (mobile_number, on_insert.as_object_mut()) {
        map.insert("mobileNumber".into(), serde_json::json!(number));
    }

    tx.upsert(
        collections::DEVICE,
        &[WhereClause::eq("deviceId", device_id)],
        serde_json::json!({
            "deviceId": device_id,
            "updatedAt": now_rfc3339(),
        }),
        on_insert,
    )
    .await?;
    Ok(())
}

/// Any error escaping a transaction scope reports as a transaction failure,
/// unless it already is one.
fn as_transaction_failure(err: RelayError) -> RelayError {
    match err {
        RelayError::Transaction(_) => err,
        other => RelayError::Transaction(other.to_string()),
    }
}

async fn rollback_logged(tx: Box<dyn devrelay_core::db::adapter::TransactionAdapter>) {
    if let Err(abort_err) = tx.rollback().await {
        tracing::warn!(error = %abort_err, "transaction rollback failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use devrelay_core::db::adapter::{AdapterResult, TransactionAdapter};
    use devrelay_core::db::schema::RelaySchema;
    use devrelay_memory::MemoryAdapter;

    fn log() -> (MessageLog, Arc<MemoryAdapter>) {
        let adapter = Arc::new(MemoryAdapter::new());
        (MessageLog::new(adapter.clone()), adapter)
    }

    fn entry(sender: &str, message: &str, time: &str) -> IncomingMessage {
        IncomingMessage {
            sender_phone_number: Some(sender.into()),
            message: Some(message.into()),
            time: Some(time.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn record_message_creates_device_and_message() {
        let (log, adapter) = log();

        let record = log
            .record_message("111", "222", "hello", "2024-01-01T00:00:00Z", "dev_1_1")
            .await
            .unwrap();
        assert_eq!(record["senderPhoneNumber"], "111");
        assert_eq!(record["recieverPhoneNumber"], "222");
        assert_eq!(record["deviceId"], "dev_1_1");

        let device = adapter
            .find_one(collections::DEVICE, &[WhereClause::eq("deviceId", "dev_1_1")])
            .await
            .unwrap();
        assert!(device.is_some());
        assert_eq!(adapter.collection_count(collections::MESSAGE).await, 1);
    }

    #[tokio::test]
    async fn record_message_requires_all_fields() {
        let (log, adapter) = log();
        let err = log
            .record_message("111", "222", "", "2024-01-01T00:00:00Z", "dev_1_1")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)));
        assert_eq!(adapter.collection_count(collections::MESSAGE).await, 0);
        assert_eq!(adapter.collection_count(collections::DEVICE).await, 0);
    }

    #[tokio::test]
    async fn record_message_reuses_existing_device() {
        let (log, adapter) = log();
        log.record_message("1", "2", "a", "t1", "dev_1_1").await.unwrap();
        log.record_message("1", "2", "b", "t2", "dev_1_1").await.unwrap();
        assert_eq!(adapter.collection_count(collections::DEVICE).await, 1);
        assert_eq!(adapter.collection_count(collections::MESSAGE).await, 2);
    }

    #[tokio::test]
    async fn batch_drops_incomplete_entries() {
        let (log, adapter) = log();

        let messages = vec![
            entry("111", "first", "t1"),
            IncomingMessage {
                sender_phone_number: Some("111".into()),
                message: Some("no time".into()),
                ..Default::default()
            },
            entry("222", "third", "t3"),
        ];

        let outcome = log
            .record_message_batch("dev_b", None, &messages)
            .await
            .unwrap();
        assert_eq!(outcome.saved.len(), 2);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(adapter.collection_count(collections::MESSAGE).await, 2);
        assert_eq!(adapter.collection_count(collections::DEVICE).await, 1);
    }

    #[tokio::test]
    async fn batch_with_no_storable_entries_writes_nothing() {
        let (log, adapter) = log();

        let messages = vec![IncomingMessage::default(), IncomingMessage::default()];
        let err = log
            .record_message_batch("dev_b", None, &messages)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)));
        assert_eq!(adapter.collection_count(collections::DEVICE).await, 0);
    }

    #[tokio::test]
    async fn batch_rejects_empty_array() {
        let (log, _) = log();
        let err = log.record_message_batch("dev_b", None, &[]).await.unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)));
    }

    #[tokio::test]
    async fn batch_sets_mobile_number_only_on_creation() {
        let (log, adapter) = log();

        log.record_message_batch("dev_b", Some("555-1111"), &[entry("1", "a", "t")])
            .await
            .unwrap();
        let device = adapter
            .find_one(collections::DEVICE, &[WhereClause::eq("deviceId", "dev_b")])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(device["mobileNumber"], "555-1111");

        // A later batch with a different receiver does not move the number.
        log.record_message_batch("dev_b", Some("555-2222"), &[entry("1", "b", "t")])
            .await
            .unwrap();
        let device = adapter
            .find_one(collections::DEVICE, &[WhereClause::eq("deviceId", "dev_b")])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(device["mobileNumber"], "555-1111");
    }

    #[tokio::test]
    async fn batch_seeds_mobile_number_from_first_entry_only() {
        let (log, adapter) = log();

        let mut first = entry("1", "a", "t");
        first.reciever_phone_number = Some("555-9999".into());
        log.record_message_batch("dev_b", None, &[first, entry("1", "z", "t")])
            .await
            .unwrap();

        let device = adapter
            .find_one(collections::DEVICE, &[WhereClause::eq("deviceId", "dev_b")])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(device["mobileNumber"], "555-9999");

        // A receiver on a later entry is not consulted for the seed.
        let mut second = entry("1", "b", "t");
        second.reciever_phone_number = Some("555-8888".into());
        log.record_message_batch("dev_c", None, &[entry("1", "a", "t"), second])
            .await
            .unwrap();
        let device = adapter
            .find_one(collections::DEVICE, &[WhereClause::eq("deviceId", "dev_c")])
            .await
            .unwrap()
            .unwrap();
        assert!(device.get("mobileNumber").is_none());
    }

    #[tokio::test]
    async fn batch_entries_inherit_batch_receiver() {
        let (log, adapter) = log();

        let mut with_own = entry("2", "second", "t2");
        with_own.reciever_phone_number = Some("555-2222".into());
        log.record_message_batch(
            "dev_r",
            Some("555-0001"),
            &[entry("1", "first", "t1"), with_own],
        )
        .await
        .unwrap();

        let inherited = adapter
            .find_one(collections::MESSAGE, &[WhereClause::eq("message", "first")])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(inherited["recieverPhoneNumber"], "555-0001");

        // An entry-level receiver wins over the batch-level one.
        let own = adapter
            .find_one(collections::MESSAGE, &[WhereClause::eq("message", "second")])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(own["recieverPhoneNumber"], "555-2222");
    }

    #[tokio::test]
    async fn list_messages_newest_first() {
        let (log, _) = log();
        log.record_message("1", "2", "first", "t1", "dev_1").await.unwrap();
        log.record_message("1", "2", "second", "t2", "dev_1").await.unwrap();

        let messages = log.list_messages().await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["message"], "second");
        assert_eq!(messages[1]["message"], "first");
    }

    // ─── Atomicity ───────────────────────────────────────────────

    /// Delegates to a memory adapter but rejects message inserts, to prove
    /// the device upsert rolls back with the failed insert.
    #[derive(Debug)]
    struct FlakyAdapter {
        inner: Arc<MemoryAdapter>,
    }

    #[derive(Debug)]
    struct FlakyTx {
        inner: Box<dyn TransactionAdapter>,
    }

    #[async_trait]
    impl Adapter for FlakyAdapter {
        async fn create(&self, model: &str, data: serde_json::Value) -> AdapterResult<serde_json::Value> {
            self.inner.create(model, data).await
        }
        async fn find_one(
            &self,
            model: &str,
            where_clauses: &[WhereClause],
        ) -> AdapterResult<Option<serde_json::Value>> {
            self.inner.find_one(model, where_clauses).await
        }
        async fn find_many(
            &self,
            model: &str,
            query: FindManyQuery,
        ) -> AdapterResult<Vec<serde_json::Value>> {
            self.inner.find_many(model, query).await
        }
        async fn update(
            &self,
            model: &str,
            where_clauses: &[WhereClause],
            data: serde_json::Value,
        ) -> AdapterResult<Option<serde_json::Value>> {
            self.inner.update(model, where_clauses, data).await
        }
        async fn upsert(
            &self,
            model: &str,
            where_clauses: &[WhereClause],
            data: serde_json::Value,
            on_insert: serde_json::Value,
        ) -> AdapterResult<serde_json::Value> {
            self.inner.upsert(model, where_clauses, data, on_insert).await
        }
        async fn ensure_schema(&self, schema: &RelaySchema) -> AdapterResult<()> {
            self.inner.ensure_schema(schema).await
        }
        async fn begin_transaction(&self) -> AdapterResult<Box<dyn TransactionAdapter>> {
            let inner = self.inner.begin_transaction().await?;
            Ok(Box::new(FlakyTx { inner }))
        }
    }

    #[async_trait]
    impl Adapter for FlakyTx {
        async fn create(&self, model: &str, data: serde_json::Value) -> AdapterResult<serde_json::Value> {
            if model == collections::MESSAGE {
                return Err(RelayError::internal("insert rejected"));
            }
            self.inner.create(model, data).await
        }
        async fn find_one(
            &self,
            model: &str,
            where_clauses: &[WhereClause],
        ) -> AdapterResult<Option<serde_json::Value>> {
            self.inner.find_one(model, where_clauses).await
        }
        async fn find_many(
            &self,
            model: &str,
            query: FindManyQuery,
        ) -> AdapterResult<Vec<serde_json::Value>> {
            self.inner.find_many(model, query).await
        }
        async fn update(
            &self,
            model: &str,
            where_clauses: &[WhereClause],
            data: serde_json::Value,
        ) -> AdapterResult<Option<serde_json::Value>> {
            self.inner.update(model, where_clauses, data).await
        }
        async fn upsert(
            &self,
            model: &str,
            where_clauses: &[WhereClause],
            data: serde_json::Value,
            on_insert: serde_json::Value,
        ) -> AdapterResult<serde_json::Value> {
            self.inner.upsert(model, where_clauses, data, on_insert).await
        }
        async fn ensure_schema(&self, schema: &RelaySchema) -> AdapterResult<()> {
            self.inner.ensure_schema(schema).await
        }
        async fn begin_transaction(&self) -> AdapterResult<Box<dyn TransactionAdapter>> {
            self.inner.begin_transaction().await
        }
    }

    #[async_trait]
    impl TransactionAdapter for FlakyTx {
        async fn commit(self: Box<Self>) -> AdapterResult<()> {
            self.inner.commit().await
        }
        async fn rollback(self: Box<Self>) -> AdapterResult<()> {
            self.inner.rollback().await
        }
    }

    #[tokio::test]
    async fn failed_message_insert_rolls_back_device_creation() {
        let memory = Arc::new(MemoryAdapter::new());
        let log = MessageLog::new(Arc::new(FlakyAdapter {
            inner: memory.clone(),
        }));

        let err = log
            .record_message("1", "2", "msg", "t", "dev_new")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Transaction(_)));

        // The device upsert inside the scope must not be observable.
        assert_eq!(memory.collection_count(collections::DEVICE).await, 0);
        assert_eq!(memory.collection_count(collections::MESSAGE).await, 0);
    }

    #[tokio::test]
    async fn failed_batch_insert_rolls_back_everything() {
        let memory = Arc::new(MemoryAdapter::new());
        let log = MessageLog::new(Arc::new(FlakyAdapter {
            inner: memory.clone(),
        }));

        let err = log
            .record_message_batch("dev_new", Some("555"), &[entry("1", "a", "t")])
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Transaction(_)));
        assert_eq!(memory.collection_count(collections::DEVICE).await, 0);
    }
}
