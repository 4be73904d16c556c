// Phonebook — bare admin-created phone numbers, unique and create-only.

use std::sync::Arc;

use devrelay_core::db::adapter::{Adapter, WhereClause};
use devrelay_core::db::models::collections;
use devrelay_core::error::{RelayError, Result};
use devrelay_core::utils::id::generate_record_id;
use devrelay_core::utils::time::now_rfc3339;

#[derive(Debug, Clone)]
pub struct Phonebook {
    adapter: Arc<dyn Adapter>,
}

impl Phonebook {
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self { adapter }
    }

    /// Create a phone number record. Duplicates are rejected; the pre-check
    /// gives a clean message, and the store's unique index backs it up under
    /// races.
    pub async fn add_phone_number(&self, phone_number: &str) -> Result<serde_json::Value> {
        let phone_number = phone_number.trim();
        if phone_number.is_empty() {
            return Err(RelayError::validation("phoneNumber is required"));
        }

        let exists = self
            .adapter
            .find_one(
                collections::PHONE_NUMBER,
                &[WhereClause::eq("phoneNumber", phone_number)],
            )
            .await?
            .is_some();
        if exists {
            return Err(RelayError::conflict("Duplicate phone number"));
        }

        self.adapter
            .create(
                collections::PHONE_NUMBER,
                serde_json::json!({
                    "id": generate_record_id(),
                    "phoneNumber": phone_number,
                    "createdAt": now_rfc3339(),
                }),
            )
            .await
    }
}
