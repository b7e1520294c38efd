//! Persistence module
//!
//! Users and deals survive restarts as JSON records behind the `Store`
//! trait. The engine snapshots into a store on the autosave interval and at
//! shutdown, and rebuilds itself from one at startup.

pub mod json_file;
pub mod store;

pub use json_file::JsonFileStore;
pub use store::{Collection, MemoryStore, Store, StoreError, StoreResult};
