//! # cstore-config
//!
//! TOML-driven configuration for the consent store, with `CSTORE_*`
//! environment overrides.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use cstore_config::ConsentStoreConfig;
//!
//! let mut config = ConsentStoreConfig::from_file(Path::new("cstore.toml"))?;
//! config.apply_env()?;
//! config.validate()?;
//! ```
//!
//! Precedence, lowest first: built-in defaults, the TOML file, the
//! environment, then whatever the caller sets explicitly (CLI flags).

pub mod config;

pub use config::{ConsentStoreConfig, EngineMode, DEFAULT_ADDRESS, DEFAULT_CONNECTION_STRING};

// ── Tests ─────────────────────────────────────────────────────────────────────
