//! # cstore-api
//!
//! HTTP surface of the consent store.
//!
//! - `server`: an axum router that exposes any `ConsentStore` as JSON routes
//! - `client`: `HttpConsentClient`, a `ConsentStore` that forwards to such a
//!   server, so callers can swap a local store for a remote one
//! - `dto`: the camelCase wire types shared by both sides
//!
//! | route | operation |
//! |---|---|
//! | `POST /consent` | record one header with its records (201) |
//! | `POST /consent/check` | authorization check |
//! | `POST /consent/query` | query by actor/custodian/subject |
//! | `GET /consent/:proofHash?latest=` | find a record by hash |
//! | `DELETE /consent/:proofHash` | delete a record by hash (202) |
//! | `GET /diagnostics` | backend health probes |

pub mod client;
pub mod dto;
pub mod error;
pub mod server;

pub use client::HttpConsentClient;
pub use error::ApiError;
pub use server::{router, serve};
