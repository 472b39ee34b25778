//! Point-in-time selection shared by the authorization and query paths.
//!
//! Both paths apply the same rule: keep the latest version of every chain,
//! then keep those whose validity window contains the checkpoint. A
//! superseded version never counts, even when it is valid at the checkpoint
//! and its successor is not.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use cstore_contracts::{ConsentHeader, ConsentRecord, ConsentResult};

use crate::chain::latest_per_chain;

/// Latest-version records that are valid at `checkpoint`.
pub fn current_records(
    records: Vec<ConsentRecord>,
    checkpoint: DateTime<Utc>,
) -> ConsentResult<Vec<ConsentRecord>> {
    let latest = latest_per_chain(records)?;
    Ok(latest
        .into_iter()
        .filter(|r| r.is_valid_at(checkpoint))
        .collect())
}

/// True iff some current record among `records` covers `data_class`.
pub fn is_authorized(
    records: Vec<ConsentRecord>,
    data_class: &str,
    checkpoint: DateTime<Utc>,
) -> ConsentResult<bool> {
    let current = current_records(records, checkpoint)?;
    let granted = current.iter().any(|r| r.grants(data_class));

    debug!(
        data_class = %data_class,
        checkpoint = %checkpoint,
        current_records = current.len(),
        granted,
        "authorization evaluated"
    );

    Ok(granted)
}

/// Attach the current records to their owning headers.
///
/// `headers` are the filter matches (their `records` are ignored and
/// replaced); `records` are all stored records of those headers. Headers
/// without a current record are dropped.
pub fn assemble_headers(
    headers: Vec<ConsentHeader>,
    records: Vec<ConsentRecord>,
    checkpoint: DateTime<Utc>,
) -> ConsentResult<Vec<ConsentHeader>> {
    let mut by_header: HashMap<String, Vec<ConsentRecord>> = HashMap::new();
    for record in current_records(records, checkpoint)? {
        by_header.entry(record.header_id.clone()).or_default().push(record);
    }

    Ok(headers
        .into_iter()
        .filter_map(|mut header| {
            let mut records = by_header.remove(&header.id)?;
            records.sort_by_key(|r| r.id);
            header.records = records;
            Some(header)
        })
        .collect())
}
