//! Health reporting types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The outcome of one health probe, e.g. a database ping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticResult {
    /// Short probe name ("DB", "API").
    pub name: String,
    /// Human-readable outcome.
    pub outcome: String,
}

impl DiagnosticResult {
    pub fn new(name: impl Into<String>, outcome: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: outcome.into(),
        }
    }
}

impl fmt::Display for DiagnosticResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.outcome)
    }
}
