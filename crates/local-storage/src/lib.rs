//! Local dashboard persistence for the Presto datasource
//!
//! Dashboards are kept in a [`KeyValueStorage`] backend: memory, a JSON file
//! on disk, or the browser's `localStorage` when compiled for wasm32.

pub mod local_db;
pub mod storage;

#[cfg(target_arch = "wasm32")]
pub mod browser;

pub use local_db::{LocalDashboardStore, StoredDashboard};
pub use storage::{FileStorage, JsonStorageExt, KeyValueStorage, MemoryStorage};

#[cfg(target_arch = "wasm32")]
pub use browser::BrowserStorage;
