//! Subcommand implementations.
//!
//! Each command runs against a `ConsentStore` and returns the lines to print,
//! so the same code serves a local store and a remote one.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{info, warn};

use cstore_api::dto::{format_timestamp, parse_timestamp};
use cstore_api::HttpConsentClient;
use cstore_config::{ConsentStoreConfig, EngineMode};
use cstore_contracts::{
    AuthRequest, ConsentError, ConsentHeaderInput, ConsentQuery, ConsentRecord, ConsentRecordInput,
    ConsentResult,
};
use cstore_core::ConsentStore;
use cstore_sqlite::SqliteConsentStore;

use crate::ids;

/// Open the backend selected by `config.mode`.
pub fn connect(config: &ConsentStoreConfig) -> ConsentResult<Arc<dyn ConsentStore>> {
    match config.mode {
        EngineMode::Server => Ok(Arc::new(SqliteConsentStore::open(config)?)),
        EngineMode::Client => {
            let timeout = Duration::from_millis(config.client_timeout_ms);
            Ok(Arc::new(HttpConsentClient::new(&config.address, timeout)?))
        }
    }
}

fn parse_at(field: &str, value: Option<&str>) -> ConsentResult<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(field, v)).transpose()
}

/// Split a comma-separated data class list, dropping blanks.
pub fn parse_data_classes(value: &str) -> ConsentResult<BTreeSet<String>> {
    let classes: BTreeSet<String> = value
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();

    if classes.is_empty() {
        return Err(ConsentError::validation("at least one data class is required"));
    }
    Ok(classes)
}

fn describe(record: &ConsentRecord) -> String {
    let to = record
        .valid_to
        .map(format_timestamp)
        .unwrap_or_else(|| "open".to_string());
    let classes: Vec<&str> = record.data_classes.iter().map(String::as_str).collect();
    format!(
        "  {} v{} [{} .. {}) {}",
        record.hash,
        record.version,
        format_timestamp(record.valid_from),
        to,
        classes.join(",")
    )
}

// ── list ──────────────────────────────────────────────────────────────────────

pub fn list(
    store: &dyn ConsentStore,
    actor: &str,
    subject: Option<&str>,
    at: Option<&str>,
) -> ConsentResult<Vec<String>> {
    let mut query = ConsentQuery::new().actor(actor);
    if let Some(subject) = subject {
        query = query.subject(subject);
    }
    if let Some(at) = parse_at("at", at)? {
        query = query.valid_at(at);
    }

    let headers = store.query_consent(&query)?;
    let mut lines = vec![format!("Found {} records", headers.len())];
    for header in &headers {
        lines.push(format!("{} ({})", header, header.id));
        lines.extend(header.records.iter().map(describe));
    }
    Ok(lines)
}

// ── record ────────────────────────────────────────────────────────────────────

/// Arguments of `record` after clap parsing.
#[derive(Debug, Clone, Default)]
pub struct RecordRequest {
    pub subject: String,
    pub custodian: String,
    pub actor: String,
    pub data_classes: String,
    pub id: Option<String>,
    pub hash: Option<String>,
    pub previous_hash: Option<String>,
    pub valid_from: Option<String>,
    pub valid_to: Option<String>,
}

impl RecordRequest {
    /// Build the header to submit, deriving the id and hash when absent.
    pub fn to_input(&self, now: DateTime<Utc>) -> ConsentResult<ConsentHeaderInput> {
        let id = self
            .id
            .clone()
            .unwrap_or_else(|| ids::header_id(&self.subject, &self.custodian, &self.actor));

        let mut record = ConsentRecordInput {
            hash: String::new(),
            previous_hash: self.previous_hash.clone(),
            valid_from: parse_at("valid-from", self.valid_from.as_deref())?.unwrap_or(now),
            valid_to: parse_at("valid-to", self.valid_to.as_deref())?,
            data_classes: parse_data_classes(&self.data_classes)?,
        };
        record.hash = match &self.hash {
            Some(hash) => hash.clone(),
            None => ids::hash_of(&id, &record),
        };

        Ok(ConsentHeaderInput {
            id,
            actor: self.actor.clone(),
            custodian: self.custodian.clone(),
            subject: self.subject.clone(),
            records: vec![record],
        })
    }
}

pub fn record(store: &dyn ConsentStore, request: &RecordRequest) -> ConsentResult<Vec<String>> {
    // Stored timestamps keep millisecond precision.
    let header = request.to_input(Utc::now().trunc_subsecs(3))?;
    store.record_consent(std::slice::from_ref(&header))?;

    let hash = header.records.first().map(|r| r.hash.as_str()).unwrap_or_default();
    info!(header_id = %header.id, hash = %hash, "consent recorded from command line");
    Ok(vec![
        "Consent recorded".to_string(),
        format!("  id:   {}", header.id),
        format!("  hash: {}", hash),
    ])
}

// ── check ─────────────────────────────────────────────────────────────────────

pub fn check(
    store: &dyn ConsentStore,
    subject: &str,
    custodian: &str,
    actor: &str,
    data_class: &str,
    at: Option<&str>,
) -> ConsentResult<Vec<String>> {
    let mut request = AuthRequest::new(custodian, subject, actor, data_class);
    if let Some(at) = parse_at("at", at)? {
        request = request.at(at);
    }

    let line = if store.consent_auth(&request)? {
        "Consent given"
    } else {
        "No consent given"
    };
    Ok(vec![line.to_string()])
}

// ── find / delete / diagnostics ───────────────────────────────────────────────

pub fn find(store: &dyn ConsentStore, hash: &str, latest: bool) -> ConsentResult<Vec<String>> {
    let record = store.find_consent_record_by_hash(hash, latest)?;
    Ok(vec![
        format!("Consent record of {}", record.header_id),
        describe(&record),
        format!("  chain {} previous {}", record.chain_id, record.previous_hash.as_deref().unwrap_or("-")),
    ])
}

pub fn delete(store: &dyn ConsentStore, hash: &str) -> ConsentResult<Vec<String>> {
    store.delete_consent_record_by_hash(hash)?;
    Ok(vec![format!("Consent record {} deleted", hash)])
}

pub fn diagnostics(store: &dyn ConsentStore) -> Vec<String> {
    store.diagnostics().iter().map(|d| d.to_string()).collect()
}

// ── server ────────────────────────────────────────────────────────────────────

/// Serve the HTTP API on `bind` until Ctrl-C, then close the store.
pub fn server(config: &ConsentStoreConfig, bind: Option<&str>) -> ConsentResult<()> {
    if config.mode != EngineMode::Server {
        return Err(ConsentError::Config {
            reason: "the server command requires mode = \"server\"".to_string(),
        });
    }

    let store = Arc::new(SqliteConsentStore::open(config)?);
    let bind = bind.unwrap_or(&config.address).to_string();
    let transport = |e: std::io::Error| ConsentError::Transport { reason: e.to_string() };

    let runtime = tokio::runtime::Runtime::new().map_err(transport)?;
    let served = runtime.block_on({
        let store: Arc<dyn ConsentStore> = store.clone();
        async move {
            let listener = tokio::net::TcpListener::bind(&bind).await?;
            cstore_api::serve(listener, store, shutdown_signal()).await
        }
    });

    store.shutdown()?;
    served.map_err(transport)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const SUBJECT: &str = "urn:oid:2.16.840.1.113883.2.4.6.3:999999990";
    const CUSTODIAN: &str = "urn:oid:2.16.840.1.113883.2.4.6.1:00000007";
    const ACTOR: &str = "urn:oid:2.16.840.1.113883.2.4.6.1:00000008";

    fn store() -> Arc<dyn ConsentStore> {
        connect(&ConsentStoreConfig::default()).unwrap()
    }

    fn request(classes: &str) -> RecordRequest {
        RecordRequest {
            subject: SUBJECT.to_string(),
            custodian: CUSTODIAN.to_string(),
            actor: ACTOR.to_string(),
            data_classes: classes.to_string(),
            valid_from: Some("2024-01-01".to_string()),
            ..RecordRequest::default()
        }
    }

    #[test]
    fn test_data_classes_are_split_and_trimmed() {
        let classes = parse_data_classes("Observation, Patient,,").unwrap();
        assert_eq!(classes.len(), 2);
        assert!(classes.contains("Patient"));
        assert!(parse_data_classes(" , ").is_err());
    }

    #[test]
    fn test_record_derives_id_and_hash() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let header = request("Observation").to_input(now).unwrap();

        assert_eq!(header.id, ids::header_id(SUBJECT, CUSTODIAN, ACTOR));
        let record = &header.records[0];
        assert_eq!(record.hash, ids::hash_of(&header.id, record));
        assert_eq!(record.valid_from, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_record_keeps_explicit_identifiers_and_defaults_to_now() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut req = request("X");
        req.id = Some("consent-1".to_string());
        req.hash = Some("abc".to_string());
        req.valid_from = None;

        let header = req.to_input(now).unwrap();
        assert_eq!(header.id, "consent-1");
        assert_eq!(header.records[0].hash, "abc");
        assert_eq!(header.records[0].valid_from, now);
    }

    #[test]
    fn test_record_then_check_then_delete() {
        let store = store();

        let lines = record(store.as_ref(), &request("Observation,Patient")).unwrap();
        assert_eq!(lines[0], "Consent recorded");
        let hash = lines[2].trim_start_matches("  hash: ").to_string();

        let given = check(store.as_ref(), SUBJECT, CUSTODIAN, ACTOR, "Patient", Some("2024-02-01")).unwrap();
        assert_eq!(given, vec!["Consent given"]);
        let denied = check(store.as_ref(), SUBJECT, CUSTODIAN, ACTOR, "Medication", None).unwrap();
        assert_eq!(denied, vec!["No consent given"]);

        let listed = list(store.as_ref(), ACTOR, Some(SUBJECT), None).unwrap();
        assert_eq!(listed[0], "Found 1 records");
        assert!(listed.iter().any(|l| l.contains(&hash)));

        let found = find(store.as_ref(), &hash, true).unwrap();
        assert!(found[1].contains(" v1 "));

        delete(store.as_ref(), &hash).unwrap();
        let after = check(store.as_ref(), SUBJECT, CUSTODIAN, ACTOR, "Patient", None).unwrap();
        assert_eq!(after, vec!["No consent given"]);
    }

    #[test]
    fn test_default_start_reads_back_unchanged() {
        let store = store();
        let mut req = request("X");
        req.valid_from = None;

        let lines = record(store.as_ref(), &req).unwrap();
        let hash = lines[2].trim_start_matches("  hash: ");
        let stored = store.find_consent_record_by_hash(hash, false).unwrap();

        let input = ConsentRecordInput {
            hash: String::new(),
            previous_hash: None,
            valid_from: stored.valid_from,
            valid_to: stored.valid_to,
            data_classes: stored.data_classes.clone(),
        };
        assert_eq!(ids::hash_of(&stored.header_id, &input), hash);
    }

    #[test]
    fn test_recording_twice_is_idempotent() {
        let store = store();
        record(store.as_ref(), &request("X")).unwrap();
        record(store.as_ref(), &request("X")).unwrap();

        let listed = list(store.as_ref(), ACTOR, None, None).unwrap();
        assert_eq!(listed.len(), 3, "summary, header, one record");
    }

    #[test]
    fn test_bad_timestamp_is_validation_error() {
        let store = store();
        let err = check(store.as_ref(), SUBJECT, CUSTODIAN, ACTOR, "X", Some("soon")).unwrap_err();
        assert!(matches!(err, ConsentError::Validation { .. }));
    }

    #[test]
    fn test_diagnostics_lines() {
        let lines = diagnostics(store().as_ref());
        assert_eq!(lines, vec!["DB: connection string: :memory:, ping: ok"]);
    }

    #[test]
    fn test_server_command_requires_server_mode() {
        let config = ConsentStoreConfig {
            mode: EngineMode::Client,
            ..ConsentStoreConfig::default()
        };
        let err = server(&config, None).unwrap_err();
        assert!(matches!(err, ConsentError::Config { .. }));
    }
}
