//! Consent header and record types.
//!
//! A `ConsentHeader` names one subject/custodian/actor relationship. Its
//! `ConsentRecord`s are the immutable versions of that consent, linked into
//! hash chains through `previous_hash`.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Internal grouping token shared by every version of one logical record.
///
/// Allocated fresh for a record without a predecessor and inherited from the
/// predecessor otherwise. Never supplied by callers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainId(pub uuid::Uuid);

impl ChainId {
    /// Allocate a new, unique chain identifier.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ChainId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One subject x custodian x actor consent relationship with its records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentHeader {
    /// Externally assigned identifier. Immutable once created.
    pub id: String,
    /// URN of the party the consent is given to.
    pub actor: String,
    /// URN of the party holding the data.
    pub custodian: String,
    /// URN of the person the data is about.
    pub subject: String,
    /// Records owned by this header. Query results only carry the versions
    /// that survived selection.
    pub records: Vec<ConsentRecord>,
}

impl ConsentHeader {
    /// True when `other` names the same actor, custodian and subject.
    pub fn same_triple(&self, other: &ConsentHeader) -> bool {
        self.actor == other.actor
            && self.custodian == other.custodian
            && self.subject == other.subject
    }

    /// Union of the data classes of every record carried by this header.
    pub fn data_classes(&self) -> BTreeSet<&str> {
        self.records
            .iter()
            .flat_map(|r| r.data_classes.iter().map(String::as_str))
            .collect()
    }
}

impl fmt::Display for ConsentHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} for {}", self.subject, self.custodian, self.actor)
    }
}

/// An immutable version within a hash chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    /// Surrogate key assigned by the store.
    pub id: i64,
    /// Owning header.
    pub header_id: String,
    /// Caller-supplied, globally unique identity of this version.
    pub hash: String,
    /// Hash of the version this record supersedes, if any.
    pub previous_hash: Option<String>,
    /// Chain this version belongs to.
    pub chain_id: ChainId,
    /// 1 for the first version, predecessor + 1 afterwards.
    pub version: u32,
    /// Start of the validity window (inclusive).
    pub valid_from: DateTime<Utc>,
    /// End of the validity window (exclusive). `None` means open-ended.
    pub valid_to: Option<DateTime<Utc>>,
    /// Semantic codes of the data covered by this record.
    pub data_classes: BTreeSet<String>,
}

impl ConsentRecord {
    /// True when `checkpoint` falls inside `[valid_from, valid_to)`.
    pub fn is_valid_at(&self, checkpoint: DateTime<Utc>) -> bool {
        self.valid_from <= checkpoint && self.valid_to.map_or(true, |to| to > checkpoint)
    }

    /// True when this record covers `data_class`.
    pub fn grants(&self, data_class: &str) -> bool {
        self.data_classes.contains(data_class)
    }
}

/// A header as submitted to `RecordConsent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentHeaderInput {
    pub id: String,
    pub actor: String,
    pub custodian: String,
    pub subject: String,
    pub records: Vec<ConsentRecordInput>,
}

/// A record as submitted to `RecordConsent`.
///
/// Version and chain are derived by the store from `previous_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecordInput {
    pub hash: String,
    pub previous_hash: Option<String>,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
    pub data_classes: BTreeSet<String>,
}

impl ConsentRecordInput {
    /// True when the window is well formed: `valid_to`, if set, is strictly
    /// after `valid_from`.
    pub fn has_valid_window(&self) -> bool {
        self.valid_to.map_or(true, |to| to > self.valid_from)
    }
}
