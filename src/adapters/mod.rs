// Adapters layer: concrete implementations of the store ports.

pub mod memory;
pub mod rest;

pub use memory::{Failure, MemoryClaimsStore, MemoryRecordStore};
pub use rest::RestRecordStore;
