// devrelay — service layer for the device-identity + message relay backend.
//
// The four services here own all business logic:
// - `DeviceRegistry`: device upsert, forwarding state, one-time mailbox
// - `MessageLog`: transactional message ingest (single and batch)
// - `Phonebook`: create-only unique phone-number directory
// - `AdminAuth`: credential verification and bearer tokens
//
// Each service holds an `Arc<dyn Adapter>`; which store backs it is the
// caller's choice (memory for tests, MongoDB in production).

pub mod admin;
pub mod crypto;
pub mod message_log;
pub mod options;
pub mod phonebook;
pub mod registry;

pub use admin::{AdminAuth, AdminClaims};
pub use message_log::{BatchOutcome, IncomingMessage, MessageLog};
pub use options::RelayOptions;
pub use phonebook::Phonebook;
pub use registry::{DevicePatch, DeviceRegistry};
