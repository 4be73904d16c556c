// devrelay-core — shared foundation for the device relay backend.
//
// Holds the error type, the document-store adapter abstraction, the typed
// record models, the storage schema (unique indexes), environment helpers,
// and id generation. Backend crates (memory, mongodb) and the service layer
// all build on this crate.

pub mod db;
pub mod env;
pub mod error;
pub mod utils;

pub use error::{RelayError, Result};
