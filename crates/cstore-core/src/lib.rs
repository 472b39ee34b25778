//! # cstore-core
//!
//! Storage-agnostic logic for the consent store.
//!
//! This crate provides:
//! - The `ConsentStore` trait every backend implements
//! - The chain resolver (`chain`) that numbers versions and finds the
//!   latest member of a chain
//! - The point-in-time selection (`select`) shared by authorization checks
//!   and queries
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cstore_core::{ConsentStore, select::is_authorized};
//! ```

pub mod chain;
pub mod select;
pub mod traits;

pub use traits::ConsentStore;
