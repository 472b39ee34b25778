//! Read-side inputs: query filters and authorization checks.
//!
//! Absent filters are modeled as `None`, never as empty strings. An empty
//! string is a real value and only matches an empty column.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Filters for `QueryConsent`.
///
/// Every identity filter is an exact match when present and a wildcard when
/// absent. `valid_at` defaults to "now" at evaluation time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentQuery {
    pub actor: Option<String>,
    pub custodian: Option<String>,
    pub subject: Option<String>,
    pub valid_at: Option<DateTime<Utc>>,
}

impl ConsentQuery {
    /// A query with every filter unset, matching all headers.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn custodian(mut self, custodian: impl Into<String>) -> Self {
        self.custodian = Some(custodian.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn valid_at(mut self, at: DateTime<Utc>) -> Self {
        self.valid_at = Some(at);
        self
    }

    /// The point in time the query is evaluated at.
    pub fn checkpoint(&self) -> DateTime<Utc> {
        self.valid_at.unwrap_or_else(Utc::now)
    }
}

/// Input for `ConsentAuth`: may `actor` access `data_class` of `subject`
/// held by `custodian` at `checkpoint`?
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    pub custodian: String,
    pub subject: String,
    pub actor: String,
    pub data_class: String,
    /// Defaults to "now" when absent.
    pub checkpoint: Option<DateTime<Utc>>,
}

impl AuthRequest {
    pub fn new(
        custodian: impl Into<String>,
        subject: impl Into<String>,
        actor: impl Into<String>,
        data_class: impl Into<String>,
    ) -> Self {
        Self {
            custodian: custodian.into(),
            subject: subject.into(),
            actor: actor.into(),
            data_class: data_class.into(),
            checkpoint: None,
        }
    }

    /// Evaluate at `at` instead of now.
    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.checkpoint = Some(at);
        self
    }

    /// The point in time the check is evaluated at.
    pub fn checkpoint(&self) -> DateTime<Utc> {
        self.checkpoint.unwrap_or_else(Utc::now)
    }
}
