// In-memory document store for tests and local development.

mod adapter;

pub use adapter::MemoryAdapter;
