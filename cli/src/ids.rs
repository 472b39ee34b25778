//! Identifiers derived when the `record` command is not given explicit ones.
//!
//! Both are lowercase hex SHA-256 digests over `|`-separated fields, so the
//! same input always yields the same identifier. Resubmitting a record is a
//! no-op in the store only when its validity start is given explicitly: the
//! default start is the current time, which changes the hash on every run.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use cstore_contracts::ConsentRecordInput;

fn digest(fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            hasher.update(b"|");
        }
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Header id for a subject/custodian/actor triple.
pub fn header_id(subject: &str, custodian: &str, actor: &str) -> String {
    digest(&[subject, custodian, actor])
}

/// Record hash over the owning header and the record content.
///
/// Data classes are hashed in sorted order.
pub fn record_hash(
    header_id: &str,
    previous_hash: Option<&str>,
    valid_from: DateTime<Utc>,
    valid_to: Option<DateTime<Utc>>,
    data_classes: &[&str],
) -> String {
    let from = valid_from.to_rfc3339();
    let to = valid_to.map(|t| t.to_rfc3339()).unwrap_or_default();
    let mut classes = data_classes.to_vec();
    classes.sort_unstable();
    let classes = classes.join(",");

    digest(&[header_id, previous_hash.unwrap_or(""), &from, &to, &classes])
}

/// `record_hash` for an already assembled record input.
pub fn hash_of(header_id: &str, record: &ConsentRecordInput) -> String {
    let classes: Vec<&str> = record.data_classes.iter().map(String::as_str).collect();
    record_hash(
        header_id,
        record.previous_hash.as_deref(),
        record.valid_from,
        record.valid_to,
        &classes,
    )
}
