//! # cstore-sqlite
//!
//! SQLite record store for consent headers and their versioned records.
//!
//! `SqliteConsentStore` implements `cstore_core::ConsentStore`. Writes run in
//! one transaction per call; reads run directly against the connection.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cstore_config::ConsentStoreConfig;
//! use cstore_sqlite::SqliteConsentStore;
//!
//! let store = SqliteConsentStore::open(&ConsentStoreConfig::default())?;
//! ```

pub mod schema;
pub mod store;

mod rows;
mod write;

pub use store::SqliteConsentStore;

// ── Tests ─────────────────────────────────────────────────────────────────────
