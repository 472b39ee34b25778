//! Error types for the consent store.
//!
//! All fallible operations return `ConsentResult<T>`. Variants carry enough
//! context to produce useful log lines; `ErrorKind` folds them into the
//! categories callers branch on.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// The unified error type for every consent store backend.
#[derive(Debug, Error)]
pub enum ConsentError {
    /// Caller input failed a precondition.
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    /// A record's `valid_to` is not strictly after its `valid_from`.
    #[error("consent record '{hash}' has an invalid validity window: valid_to {valid_to} must come after valid_from {valid_from}")]
    InvalidValidityWindow {
        hash: String,
        valid_from: DateTime<Utc>,
        valid_to: DateTime<Utc>,
    },

    /// A referenced entity does not exist.
    #[error("{entity} '{key}' not found")]
    NotFound { entity: String, key: String },

    /// The record exists but a newer version supersedes it.
    #[error("consent record '{hash}' is not the latest in its chain (latest is '{latest_hash}')")]
    NotLatestInChain { hash: String, latest_hash: String },

    /// Stored chain data violates the one-version-per-step invariant.
    #[error("chain '{chain_id}' is inconsistent: {reason}")]
    ChainInconsistency { chain_id: String, reason: String },

    /// The underlying store failed.
    #[error("storage error: {reason}")]
    Storage { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// A remote consent store could not be reached or answered garbage.
    #[error("transport error: {reason}")]
    Transport { reason: String },
}

/// Coarse classification used at the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    NotLatestInChain,
    Storage,
    Config,
    Transport,
}

impl ConsentError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } | Self::InvalidValidityWindow { .. } => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::NotLatestInChain { .. } => ErrorKind::NotLatestInChain,
            Self::ChainInconsistency { .. } | Self::Storage { .. } => ErrorKind::Storage,
            Self::Config { .. } => ErrorKind::Config,
            Self::Transport { .. } => ErrorKind::Transport,
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation { reason: reason.into() }
    }

    /// A consent record looked up by hash is missing.
    pub fn record_not_found(hash: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "consent record".to_string(),
            key: hash.into(),
        }
    }

    pub fn storage(reason: impl Into<String>) -> Self {
        Self::Storage { reason: reason.into() }
    }
}

/// Convenience alias used throughout the consent store crates.
pub type ConsentResult<T> = Result<T, ConsentError>;
