// DeviceRegistry — upsert, forwarding state, and the one-time mailbox.
//
// A record can be addressed by `deviceId` (device-reported paths) or by
// `mobileNumber` (admin paths). The two lookup paths are independent and
// intentionally not reconciled.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use devrelay_core::db::adapter::{Adapter, Operator, WhereClause};
use devrelay_core::db::models::{collections, DeviceRecord, ForwardingState, ForwardingStatus};
use devrelay_core::error::{RelayError, Result};
use devrelay_core::utils::id::{device_id_candidate, generate_record_id};
use devrelay_core::utils::time::now_rfc3339;

/// Maximum device-id candidates generated before giving up.
const MAX_ID_ATTEMPTS: usize = 5;

/// Partial update for a device record. Absent fields are left untouched.
/// Limit fields accept whatever JSON type the client sends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DevicePatch {
    pub device_id: Option<String>,
    pub mobile_number: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub state: Option<String>,
    pub working_state: Option<String>,
    pub total_limit: Option<serde_json::Value>,
    pub available_limit: Option<serde_json::Value>,
    pub card_holder_name: Option<String>,
    pub card_number: Option<String>,
    pub expiry_date: Option<String>,
    pub cvv: Option<String>,
    pub forward_phone_number: Option<String>,
    pub otp: Option<String>,
}

impl DevicePatch {
    /// Provided fields as a JSON object, with every string value trimmed.
    fn to_set_map(&self) -> serde_json::Map<String, serde_json::Value> {
        let value = serde_json::to_value(self).unwrap_or_default();
        let mut map = serde_json::Map::new();
        if let serde_json::Value::Object(obj) = value {
            for (key, field) in obj {
                match field {
                    serde_json::Value::Null => {}
                    serde_json::Value::String(s) => {
                        map.insert(key, serde_json::Value::String(s.trim().to_string()));
                    }
                    other => {
                        map.insert(key, other);
                    }
                }
            }
        }
        map
    }
}

/// Forwarding status as reported to devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardingReport {
    pub status: ForwardingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forward_phone_number: Option<String>,
}

/// Contents of a consumed mailbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mailbox {
    pub to: Option<String>,
    pub message: Option<String>,
}

/// The device registry service.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    adapter: Arc<dyn Adapter>,
}

impl DeviceRegistry {
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self { adapter }
    }

    /// Resolve a supplied device id, or allocate a fresh one.
    ///
    /// A supplied id is accepted verbatim even if unknown — it becomes a new
    /// record on first write. Generated candidates are pre-checked against
    /// the registry; after `MAX_ID_ATTEMPTS` collisions the call fails. The
    /// pre-check is best-effort only; the eventual write is an atomic upsert
    /// keyed by the id, so a race cannot duplicate a record.
    pub async fn resolve_or_create_device_id(&self, supplied: Option<&str>) -> Result<String> {
        if let Some(id) = supplied {
            let id = id.trim();
            if !id.is_empty() {
                return Ok(id.to_string());
            }
        }

        for attempt in 1..=MAX_ID_ATTEMPTS {
            let candidate = device_id_candidate();
            let taken = self
                .adapter
                .find_one(collections::DEVICE, &[WhereClause::eq("deviceId", candidate.clone())])
                .await?
                .is_some();
            if !taken {
                tracing::debug!(device_id = %candidate, attempt, "allocated device id");
                return Ok(candidate);
            }
        }

        tracing::warn!("device id generation exhausted {MAX_ID_ATTEMPTS} candidates");
        Err(RelayError::ExhaustedRetries)
    }

    /// Atomic find-and-update-or-insert keyed by `deviceId`.
    ///
    /// Only fields present in the patch are written; string values are
    /// trimmed. Returns the post-image and whether the call created the
    /// record (prior-existence check; the narrow concurrent-creators race
    /// is accepted, the upsert itself never duplicates).
    pub async fn upsert(
        &self,
        device_id: &str,
        patch: &DevicePatch,
    ) -> Result<(serde_json::Value, bool)> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(RelayError::validation("deviceId is required"));
        }

        let mut set = patch.to_set_map();
        set.insert("deviceId".into(), serde_json::json!(device_id));
        set.insert("updatedAt".into(), serde_json::json!(now_rfc3339()));

        let clauses = [WhereClause::eq("deviceId", device_id)];
        let existed = self
            .adapter
            .find_one(collections::DEVICE, &clauses)
            .await?
            .is_some();

        let on_insert = serde_json::json!({
            "id": generate_record_id(),
            "isForwarded": ForwardingState::Deactive,
            "messageFetched": false,
            "createdAt": now_rfc3339(),
        });

        let record = self
            .adapter
            .upsert(
                collections::DEVICE,
                &clauses,
                serde_json::Value::Object(set),
                on_insert,
            )
            .await?;

        Ok((record, !existed))
    }

    /// Derive the forwarding status for a device.
    pub async fn forwarding_status(&self, device_id: &str) -> Result<ForwardingReport> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(RelayError::validation("deviceId is required"));
        }

        let found = self
            .adapter
            .find_one(collections::DEVICE, &[WhereClause::eq("deviceId", device_id)])
            .await?;

        let Some(raw) = found else {
            return Ok(ForwardingReport {
                status: ForwardingStatus::Disabled,
                forward_phone_number: None,
            });
        };

        let device: DeviceRecord = serde_json::from_value(raw)
            .map_err(|e| RelayError::internal(format!("malformed device record: {e}")))?;

        Ok(ForwardingReport {
            status: device.forwarding_status(),
            forward_phone_number: device
                .forward_phone_number
                .filter(|s| !s.trim().is_empty()),
        })
    }

    /// Flip the forwarding switch for the record addressed by mobile number.
    pub async fn set_forwarding_status(
        &self,
        mobile_number: &str,
        is_forwarded: &str,
    ) -> Result<DeviceRecord> {
        let mobile_number = mobile_number.trim();
        if mobile_number.is_empty() {
            return Err(RelayError::validation("mobileNumber is required"));
        }
        let state: ForwardingState = is_forwarded.parse()?;

        let updated = self
            .adapter
            .update(
                collections::DEVICE,
                &[WhereClause::eq("mobileNumber", mobile_number)],
                serde_json::json!({
                    "isForwarded": state,
                    "updatedAt": now_rfc3339(),
                }),
            )
            .await?;

        let Some(raw) = updated else {
            return Err(RelayError::not_found("device not found"));
        };

        serde_json::from_value(raw)
            .map_err(|e| RelayError::internal(format!("malformed device record: {e}")))
    }

    /// Write the mailbox for the record addressed by mobile number,
    /// creating the record if needed. A new instruction always resets
    /// `messageFetched`, invalidating any prior fetch.
    pub async fn set_mailbox(
        &self,
        mobile_number: &str,
        to: &str,
        message: &str,
    ) -> Result<(serde_json::Value, bool)> {
        let mobile_number = mobile_number.trim();
        let to = to.trim();
        let message = message.trim();
        if mobile_number.is_empty() || to.is_empty() || message.is_empty() {
            return Err(RelayError::validation(
                "phoneNo, to, and message are required fields",
            ));
        }

        let clauses = [WhereClause::eq("mobileNumber", mobile_number)];
        let existed = self
            .adapter
            .find_one(collections::DEVICE, &clauses)
            .await?
            .is_some();

        let record = self
            .adapter
            .upsert(
                collections::DEVICE,
                &clauses,
                serde_json::json!({
                    "mobileNumber": mobile_number,
                    "to": to,
                    "message": message,
                    "messageFetched": false,
                    "updatedAt": now_rfc3339(),
                }),
                serde_json::json!({
                    "id": generate_record_id(),
                    "isForwarded": ForwardingState::Deactive,
                    "createdAt": now_rfc3339(),
                }),
            )
            .await?;

        Ok((record, !existed))
    }

    /// Consume the mailbox at most once.
    ///
    /// The fetched mark is set by a conditional update whose filter requires
    /// the mailbox to be unfetched, so two concurrent consumers can never
    /// both succeed.
    pub async fn consume_mailbox(&self, device_id: &str) -> Result<Mailbox> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(RelayError::validation("deviceId is required"));
        }

        let exists = self
            .adapter
            .find_one(collections::DEVICE, &[WhereClause::eq("deviceId", device_id)])
            .await?
            .is_some();
        if !exists {
            return Err(RelayError::not_found("device not found"));
        }

        let updated = self
            .adapter
            .update(
                collections::DEVICE,
                &[
                    WhereClause::eq("deviceId", device_id),
                    WhereClause {
                        field: "messageFetched".into(),
                        value: serde_json::json!(true),
                        operator: Operator::Ne,
                    },
                ],
                serde_json::json!({
                    "messageFetched": true,
                    "updatedAt": now_rfc3339(),
                }),
            )
            .await?;

        let Some(raw) = updated else {
            return Err(RelayError::AlreadyFetched);
        };

        let device: DeviceRecord = serde_json::from_value(raw)
            .map_err(|e| RelayError::internal(format!("malformed device record: {e}")))?;

        Ok(Mailbox {
            to: device.to,
            message: device.message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use devrelay_core::db::adapter::{AdapterResult, FindManyQuery, TransactionAdapter};
    use devrelay_core::db::schema::RelaySchema;
    use devrelay_memory::MemoryAdapter;

    fn registry() -> (DeviceRegistry, Arc<MemoryAdapter>) {
        let adapter = Arc::new(MemoryAdapter::new());
        (DeviceRegistry::new(adapter.clone()), adapter)
    }

    #[tokio::test]
    async fn supplied_device_id_is_accepted_verbatim() {
        let (registry, _) = registry();
        let id = registry
            .resolve_or_create_device_id(Some("  custom-id "))
            .await
            .unwrap();
        assert_eq!(id, "custom-id");
    }

    #[tokio::test]
    async fn generated_device_id_matches_pattern() {
        let (registry, _) = registry();
        let id = registry.resolve_or_create_device_id(None).await.unwrap();
        assert!(id.starts_with("dev_"));
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert!(parts[2].chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn sequential_generated_ids_differ() {
        let (registry, _) = registry();
        let first = registry.resolve_or_create_device_id(None).await.unwrap();
        registry
            .upsert(&first, &DevicePatch::default())
            .await
            .unwrap();
        let second = registry.resolve_or_create_device_id(None).await.unwrap();
        assert_ne!(first, second);
    }

    /// An adapter where every candidate already exists.
    #[derive(Debug)]
    struct SaturatedAdapter;

    #[async_trait]
    impl Adapter for SaturatedAdapter {
        async fn create(&self, _: &str, data: serde_json::Value) -> AdapterResult<serde_json::Value> {
            Ok(data)
        }
        async fn find_one(
            &self,
            _: &str,
            _: &[WhereClause],
        ) -> AdapterResult<Option<serde_json::Value>> {
            Ok(Some(serde_json::json!({})))
        }
        async fn find_many(
            &self,
            _: &str,
            _: FindManyQuery,
        ) -> AdapterResult<Vec<serde_json::Value>> {
            Ok(vec![])
        }
        async fn update(
            &self,
            _: &str,
            _: &[WhereClause],
            _: serde_json::Value,
        ) -> AdapterResult<Option<serde_json::Value>> {
            Ok(None)
        }
        async fn upsert(
            &self,
            _: &str,
            _: &[WhereClause],
            data: serde_json::Value,
            _: serde_json::Value,
        ) -> AdapterResult<serde_json::Value> {
            Ok(data)
        }
        async fn ensure_schema(&self, _: &RelaySchema) -> AdapterResult<()> {
            Ok(())
        }
        async fn begin_transaction(&self) -> AdapterResult<Box<dyn TransactionAdapter>> {
            Err(RelayError::internal("no transactions"))
        }
    }

    #[tokio::test]
    async fn exhausted_retries_after_five_collisions() {
        let registry = DeviceRegistry::new(Arc::new(SaturatedAdapter));
        let err = registry.resolve_or_create_device_id(None).await.unwrap_err();
        assert!(matches!(err, RelayError::ExhaustedRetries));
    }

    #[tokio::test]
    async fn upsert_creates_then_updates() {
        let (registry, _) = registry();
        let patch = DevicePatch {
            name: Some("  Alice  ".into()),
            ..Default::default()
        };
        let (record, created) = registry.upsert("dev_1_1", &patch).await.unwrap();
        assert!(created);
        assert_eq!(record["name"], "Alice");
        assert_eq!(record["isForwarded"], "deactive");
        assert_eq!(record["messageFetched"], false);
        assert!(record["createdAt"].is_string());

        let (record, created) = registry
            .upsert(
                "dev_1_1",
                &DevicePatch {
                    email: Some("alice@example.com".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!created);
        // Earlier fields survive a partial update.
        assert_eq!(record["name"], "Alice");
        assert_eq!(record["email"], "alice@example.com");
    }

    #[tokio::test]
    async fn two_partial_upserts_equal_one_union_upsert() {
        let (registry, _) = registry();

        let first = DevicePatch {
            name: Some("Alice".into()),
            state: Some("NY".into()),
            ..Default::default()
        };
        let second = DevicePatch {
            state: Some("CA".into()),
            email: Some("a@b.c".into()),
            ..Default::default()
        };
        registry.upsert("dev_a", &first).await.unwrap();
        let (split, _) = registry.upsert("dev_a", &second).await.unwrap();

        let union = DevicePatch {
            name: Some("Alice".into()),
            state: Some("CA".into()),
            email: Some("a@b.c".into()),
            ..Default::default()
        };
        let (merged, _) = registry.upsert("dev_b", &union).await.unwrap();

        for field in ["name", "state", "email"] {
            assert_eq!(split[field], merged[field], "field {field} diverged");
        }
    }

    #[tokio::test]
    async fn forwarding_status_tri_state() {
        let (registry, _) = registry();

        // No record at all.
        let report = registry.forwarding_status("dev_x").await.unwrap();
        assert_eq!(report.status, ForwardingStatus::Disabled);

        // Record without a forward number.
        registry
            .upsert("dev_x", &DevicePatch::default())
            .await
            .unwrap();
        let report = registry.forwarding_status("dev_x").await.unwrap();
        assert_eq!(report.status, ForwardingStatus::Disabled);

        // Forward number present, switch off.
        registry
            .upsert(
                "dev_x",
                &DevicePatch {
                    mobile_number: Some("555-1234".into()),
                    forward_phone_number: Some("555-9999".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let report = registry.forwarding_status("dev_x").await.unwrap();
        assert_eq!(report.status, ForwardingStatus::Deactive);
        assert_eq!(report.forward_phone_number.as_deref(), Some("555-9999"));

        // Switch on.
        registry
            .set_forwarding_status("555-1234", "active")
            .await
            .unwrap();
        let report = registry.forwarding_status("dev_x").await.unwrap();
        assert_eq!(report.status, ForwardingStatus::Active);
    }

    #[tokio::test]
    async fn blank_forward_number_reports_disabled() {
        let (registry, _) = registry();

        // Whitespace trims to an empty string on write.
        registry
            .upsert(
                "dev_blank",
                &DevicePatch {
                    mobile_number: Some("555-3333".into()),
                    forward_phone_number: Some("   ".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        registry
            .set_forwarding_status("555-3333", "active")
            .await
            .unwrap();

        let report = registry.forwarding_status("dev_blank").await.unwrap();
        assert_eq!(report.status, ForwardingStatus::Disabled);
        assert!(report.forward_phone_number.is_none());
    }

    #[tokio::test]
    async fn set_forwarding_status_validates_input() {
        let (registry, adapter) = registry();
        registry
            .upsert(
                "dev_x",
                &DevicePatch {
                    mobile_number: Some("555-1234".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = registry
            .set_forwarding_status("555-1234", "bogus")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)));

        // Nothing was mutated.
        let record = adapter
            .find_one(collections::DEVICE, &[WhereClause::eq("mobileNumber", "555-1234")])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record["isForwarded"], "deactive");
    }

    #[tokio::test]
    async fn set_forwarding_status_unknown_number() {
        let (registry, _) = registry();
        let err = registry
            .set_forwarding_status("555-0000", "active")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::NotFound(_)));
    }

    #[tokio::test]
    async fn set_mailbox_creates_record_when_number_unknown() {
        let (registry, adapter) = registry();

        let (record, created) = registry
            .set_mailbox(" 555-1234 ", "+1-555-2222", " forward this ")
            .await
            .unwrap();
        assert!(created);
        assert_eq!(record["mobileNumber"], "555-1234");
        assert_eq!(record["to"], "+1-555-2222");
        assert_eq!(record["message"], "forward this");
        assert_eq!(record["messageFetched"], false);
        assert_eq!(record["isForwarded"], "deactive");

        // Second write targets the same record.
        let (_, created) = registry
            .set_mailbox("555-1234", "+1-555-3333", "again")
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(adapter.collection_count(collections::DEVICE).await, 1);
    }

    #[tokio::test]
    async fn set_mailbox_rejects_blank_fields() {
        let (registry, _) = registry();
        let err = registry.set_mailbox("555-1234", "  ", "msg").await.unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)));
    }

    #[tokio::test]
    async fn consume_mailbox_is_one_shot() {
        let (registry, _) = registry();

        // Device registers first, then the admin targets its mobile number.
        registry
            .upsert(
                "dev_mb",
                &DevicePatch {
                    mobile_number: Some("555-7777".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        registry
            .set_mailbox("555-7777", "+1-555-0000", "instruction one")
            .await
            .unwrap();

        let mailbox = registry.consume_mailbox("dev_mb").await.unwrap();
        assert_eq!(mailbox.to.as_deref(), Some("+1-555-0000"));
        assert_eq!(mailbox.message.as_deref(), Some("instruction one"));

        let err = registry.consume_mailbox("dev_mb").await.unwrap_err();
        assert!(matches!(err, RelayError::AlreadyFetched));
    }

    #[tokio::test]
    async fn new_instruction_rearms_mailbox() {
        let (registry, _) = registry();
        registry
            .upsert(
                "dev_mb",
                &DevicePatch {
                    mobile_number: Some("555-7777".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        registry
            .set_mailbox("555-7777", "to-1", "first")
            .await
            .unwrap();
        registry.consume_mailbox("dev_mb").await.unwrap();

        // Overwriting the mailbox resets the fetch mark.
        registry
            .set_mailbox("555-7777", "to-2", "second")
            .await
            .unwrap();
        let mailbox = registry.consume_mailbox("dev_mb").await.unwrap();
        assert_eq!(mailbox.to.as_deref(), Some("to-2"));
        assert_eq!(mailbox.message.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn consume_mailbox_unknown_device() {
        let (registry, _) = registry();
        let err = registry.consume_mailbox("dev_missing").await.unwrap_err();
        assert!(matches!(err, RelayError::NotFound(_)));
    }
}
