//! JSON wire types.
//!
//! Field names are camelCase. Timestamps are strings: requests accept RFC 3339
//! date-times or plain `YYYY-MM-DD` dates (midnight UTC), responses always
//! carry RFC 3339.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use cstore_contracts::{
    ChainId, ConsentError, ConsentHeader, ConsentHeaderInput, ConsentRecord, ConsentRecordInput,
    ConsentResult, ErrorKind,
};

/// Parse a wire timestamp. `field` names the offending field in the error.
pub fn parse_timestamp(field: &str, value: &str) -> ConsentResult<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Ok(at.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .ok_or_else(|| ConsentError::validation(format!("invalid value for {}: {}", field, value)))
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_optional(field: &str, value: Option<&str>) -> ConsentResult<Option<DateTime<Utc>>> {
    value
        .filter(|v| !v.is_empty())
        .map(|v| parse_timestamp(field, v))
        .transpose()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

// ── Records ───────────────────────────────────────────────────────────────────

/// A consent record on the wire.
///
/// `id`, `patientConsentId`, `chainId` and `version` are assigned by the
/// store; they are present in responses and ignored in requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsentRecordDto {
    pub record_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_record_hash: Option<String>,
    pub valid_from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<String>,
    pub data_classes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_consent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

impl ConsentRecordDto {
    /// Convert a submitted record into store input.
    pub fn to_input(&self) -> ConsentResult<ConsentRecordInput> {
        Ok(ConsentRecordInput {
            hash: self.record_hash.clone(),
            previous_hash: non_empty(self.previous_record_hash.clone()),
            valid_from: parse_timestamp("validFrom", &self.valid_from)?,
            valid_to: parse_optional("validTo", self.valid_to.as_deref())?,
            data_classes: self.data_classes.iter().cloned().collect(),
        })
    }

    /// Rebuild a stored record from a response. Fails when the store-assigned
    /// fields are missing.
    pub fn to_record(&self) -> ConsentResult<ConsentRecord> {
        let missing = |field: &str| ConsentError::Transport {
            reason: format!("consent record response is missing {}", field),
        };
        let chain = self.chain_id.as_deref().ok_or_else(|| missing("chainId"))?;
        let chain_id = uuid_chain(chain)?;

        Ok(ConsentRecord {
            id: self.id.ok_or_else(|| missing("id"))?,
            header_id: self.patient_consent_id.clone().ok_or_else(|| missing("patientConsentId"))?,
            hash: self.record_hash.clone(),
            previous_hash: non_empty(self.previous_record_hash.clone()),
            chain_id,
            version: self.version.ok_or_else(|| missing("version"))?,
            valid_from: parse_timestamp("validFrom", &self.valid_from)?,
            valid_to: parse_optional("validTo", self.valid_to.as_deref())?,
            data_classes: self.data_classes.iter().cloned().collect::<BTreeSet<_>>(),
        })
    }
}

fn uuid_chain(value: &str) -> ConsentResult<ChainId> {
    value
        .parse()
        .map(ChainId)
        .map_err(|e| ConsentError::Transport {
            reason: format!("invalid chainId '{}': {}", value, e),
        })
}

impl From<&ConsentRecord> for ConsentRecordDto {
    fn from(record: &ConsentRecord) -> Self {
        Self {
            record_hash: record.hash.clone(),
            previous_record_hash: record.previous_hash.clone(),
            valid_from: format_timestamp(record.valid_from),
            valid_to: record.valid_to.map(format_timestamp),
            data_classes: record.data_classes.iter().cloned().collect(),
            id: Some(record.id),
            patient_consent_id: Some(record.header_id.clone()),
            chain_id: Some(record.chain_id.to_string()),
            version: Some(record.version),
        }
    }
}

impl From<&ConsentRecordInput> for ConsentRecordDto {
    fn from(input: &ConsentRecordInput) -> Self {
        Self {
            record_hash: input.hash.clone(),
            previous_record_hash: input.previous_hash.clone(),
            valid_from: format_timestamp(input.valid_from),
            valid_to: input.valid_to.map(format_timestamp),
            data_classes: input.data_classes.iter().cloned().collect(),
            ..Self::default()
        }
    }
}

// ── Create ────────────────────────────────────────────────────────────────────

/// Body of `POST /consent`: one header with the records to add to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateConsentRequest {
    pub id: String,
    pub actor: String,
    pub custodian: String,
    pub subject: String,
    pub records: Vec<ConsentRecordDto>,
}

impl CreateConsentRequest {
    /// Check required fields, then convert into store input.
    pub fn into_input(self) -> ConsentResult<ConsentHeaderInput> {
        let required = [
            (&self.id, "missing ID in createRequest"),
            (&self.subject, "missing subject in createRequest"),
            (&self.custodian, "missing custodian in createRequest"),
            (&self.actor, "missing actor in createRequest"),
        ];
        for (value, message) in required {
            if value.is_empty() {
                return Err(ConsentError::validation(message));
            }
        }
        if self.records.is_empty() {
            return Err(ConsentError::validation("missing records in createRequest"));
        }
        for record in &self.records {
            if record.data_classes.is_empty() {
                return Err(ConsentError::validation(
                    "missing dataClasses in one or more records within createRequest",
                ));
            }
            if record.record_hash.is_empty() {
                return Err(ConsentError::validation(
                    "missing recordHash in one or more records within createRequest",
                ));
            }
        }

        let records = self
            .records
            .iter()
            .map(ConsentRecordDto::to_input)
            .collect::<ConsentResult<Vec<_>>>()?;

        Ok(ConsentHeaderInput {
            id: self.id,
            actor: self.actor,
            custodian: self.custodian,
            subject: self.subject,
            records,
        })
    }
}

impl From<&ConsentHeaderInput> for CreateConsentRequest {
    fn from(header: &ConsentHeaderInput) -> Self {
        Self {
            id: header.id.clone(),
            actor: header.actor.clone(),
            custodian: header.custodian.clone(),
            subject: header.subject.clone(),
            records: header.records.iter().map(ConsentRecordDto::from).collect(),
        }
    }
}

// ── Check ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsentCheckRequest {
    pub actor: String,
    pub custodian: String,
    pub subject: String,
    pub data_class: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentCheckResponse {
    pub consent_given: bool,
}

// ── Query ─────────────────────────────────────────────────────────────────────

/// Echoed back in query responses; the store does not paginate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageDefinition {
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsentQueryRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custodian: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<PageDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_at: Option<String>,
}

/// A header with its selected records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientConsentDto {
    pub id: String,
    pub actor: String,
    pub custodian: String,
    pub subject: String,
    pub records: Vec<ConsentRecordDto>,
}

impl From<&ConsentHeader> for PatientConsentDto {
    fn from(header: &ConsentHeader) -> Self {
        Self {
            id: header.id.clone(),
            actor: header.actor.clone(),
            custodian: header.custodian.clone(),
            subject: header.subject.clone(),
            records: header.records.iter().map(ConsentRecordDto::from).collect(),
        }
    }
}

impl PatientConsentDto {
    pub fn to_header(&self) -> ConsentResult<ConsentHeader> {
        Ok(ConsentHeader {
            id: self.id.clone(),
            actor: self.actor.clone(),
            custodian: self.custodian.clone(),
            subject: self.subject.clone(),
            records: self
                .records
                .iter()
                .map(ConsentRecordDto::to_record)
                .collect::<ConsentResult<Vec<_>>>()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentQueryResponse {
    pub page: PageDefinition,
    pub results: Vec<PatientConsentDto>,
    pub total_results: usize,
}

// ── Find ──────────────────────────────────────────────────────────────────────

/// Query string of `GET /consent/:proofHash`.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct FindParams {
    pub latest: Option<bool>,
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Body of every non-2xx response.
///
/// `entity`, `key` and `latestHash` carry the fields needed to rebuild a
/// `NotFound` or `NotLatestInChain` error on the client side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_hash: Option<String>,
}

impl From<&ConsentError> for ErrorResponse {
    fn from(err: &ConsentError) -> Self {
        let message = err.to_string();
        match err {
            ConsentError::NotFound { entity, key } => Self {
                message,
                entity: Some(entity.clone()),
                key: Some(key.clone()),
                latest_hash: None,
            },
            ConsentError::NotLatestInChain { hash, latest_hash } => Self {
                message,
                entity: None,
                key: Some(hash.clone()),
                latest_hash: Some(latest_hash.clone()),
            },
            _ => Self {
                message,
                ..Self::default()
            },
        }
    }
}

impl ErrorResponse {
    /// Rebuild the error a remote store raised, given its error kind.
    pub fn into_error(self, kind: ErrorKind) -> ConsentError {
        match kind {
            ErrorKind::Validation => ConsentError::Validation { reason: self.message },
            ErrorKind::NotFound => ConsentError::NotFound {
                entity: self.entity.unwrap_or_else(|| "consent record".to_string()),
                key: self.key.unwrap_or_default(),
            },
            ErrorKind::NotLatestInChain => ConsentError::NotLatestInChain {
                hash: self.key.unwrap_or_default(),
                latest_hash: self.latest_hash.unwrap_or_default(),
            },
            ErrorKind::Config => ConsentError::Config { reason: self.message },
            ErrorKind::Transport => ConsentError::Transport { reason: self.message },
            ErrorKind::Storage => ConsentError::Storage { reason: self.message },
        }
    }
}
