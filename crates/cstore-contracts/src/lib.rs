//! # cstore-contracts
//!
//! Shared types, inputs, and error taxonomy for the consent store.
//!
//! Every crate in the workspace imports from here. No storage or transport
//! logic lives in this crate, only data definitions, the small invariant
//! helpers that belong to them, and error types.

pub mod consent;
pub mod diagnostics;
pub mod error;
pub mod query;

pub use consent::{ChainId, ConsentHeader, ConsentHeaderInput, ConsentRecord, ConsentRecordInput};
pub use diagnostics::DiagnosticResult;
pub use error::{ConsentError, ConsentResult, ErrorKind};
pub use query::{AuthRequest, ConsentQuery};
