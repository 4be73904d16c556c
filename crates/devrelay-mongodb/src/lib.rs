// MongoDB backend for the relay's document-store adapter.
//
// Collections map to adapter models, documents to JSON records, and the
// `id` field to `_id`. Transactions use client sessions and require a
// replica set (or a single-node replica set in development).

mod adapter;
pub mod query;

pub use adapter::MongoAdapter;
