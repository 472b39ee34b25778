//! The consent store contract.
//!
//! Every backend satisfies the same trait: the SQLite record store, and the
//! HTTP client that proxies to a remote instance of this service. Callers
//! (HTTP handlers, CLI commands) hold an `Arc<dyn ConsentStore>` and never
//! learn which one they talk to.

use cstore_contracts::{
    AuthRequest, ConsentHeader, ConsentHeaderInput, ConsentQuery, ConsentRecord, ConsentResult,
    DiagnosticResult,
};

/// Record, version, query and authorize consent.
///
/// Implementations are shared across threads; every method takes `&self`.
pub trait ConsentStore: Send + Sync {
    /// Persist a batch of headers and their records atomically.
    ///
    /// Headers are found or created by id. A record whose hash is already
    /// stored is skipped silently. A record with a `previous_hash` is chained
    /// onto that record (version + 1, same chain). Any failure rolls back the
    /// whole batch, including headers created by this call.
    fn record_consent(&self, headers: &[ConsentHeaderInput]) -> ConsentResult<()>;

    /// Return true iff a latest-version record for the exact
    /// (custodian, subject, actor) triple is valid at the request checkpoint
    /// and covers the requested data class.
    ///
    /// No match is `Ok(false)`, never an error.
    fn consent_auth(&self, request: &AuthRequest) -> ConsentResult<bool>;

    /// Return the headers matching the query filters, each carrying only the
    /// latest-version records per chain that are valid at the query
    /// checkpoint. Headers left without records are omitted.
    fn query_consent(&self, query: &ConsentQuery) -> ConsentResult<Vec<ConsentHeader>>;

    /// Look up a record by hash.
    ///
    /// With `latest = true` the record must also be the newest version of its
    /// chain, otherwise `ConsentError::NotLatestInChain` is returned.
    fn find_consent_record_by_hash(&self, hash: &str, latest: bool) -> ConsentResult<ConsentRecord>;

    /// Delete a single record by hash. Other versions in its chain stay.
    ///
    /// Returns `Ok(true)` on success and `ConsentError::NotFound` when no
    /// record carries `hash`.
    fn delete_consent_record_by_hash(&self, hash: &str) -> ConsentResult<bool>;

    /// Report backend health. Backends without probes return nothing.
    fn diagnostics(&self) -> Vec<DiagnosticResult> {
        Vec::new()
    }
}
