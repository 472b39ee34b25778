//! End-to-end: a SQLite-backed server on an ephemeral port, driven through
//! `HttpConsentClient`.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use cstore_api::{serve, HttpConsentClient};
use cstore_contracts::{
    AuthRequest, ConsentError, ConsentHeaderInput, ConsentQuery, ConsentRecordInput, ErrorKind,
};
use cstore_core::ConsentStore;
use cstore_sqlite::SqliteConsentStore;

const ACTOR: &str = "urn:actor";
const CUSTODIAN: &str = "urn:custodian";
const SUBJECT: &str = "urn:subject";

/// Start a server on its own runtime thread and return a client for it.
fn start() -> HttpConsentClient {
    start_with(Arc::new(SqliteConsentStore::open_in_memory().unwrap()))
}

/// Serve `store` and return a client for it.
fn start_with(store: Arc<dyn ConsentStore>) -> HttpConsentClient {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            serve(listener, store, std::future::pending()).await.unwrap();
        });
    });

    HttpConsentClient::new(&address, Duration::from_secs(5)).unwrap()
}

fn day(n: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, n, 0, 0, 0).unwrap()
}

fn record(hash: &str, previous: Option<&str>, from: u32, to: Option<u32>, classes: &[&str]) -> ConsentRecordInput {
    ConsentRecordInput {
        hash: hash.to_string(),
        previous_hash: previous.map(str::to_string),
        valid_from: day(from),
        valid_to: to.map(day),
        data_classes: classes.iter().map(|c| c.to_string()).collect::<BTreeSet<_>>(),
    }
}

fn header(records: Vec<ConsentRecordInput>) -> ConsentHeaderInput {
    ConsentHeaderInput {
        id: "h1".to_string(),
        actor: ACTOR.to_string(),
        custodian: CUSTODIAN.to_string(),
        subject: SUBJECT.to_string(),
        records,
    }
}

fn auth(data_class: &str, at: u32) -> AuthRequest {
    AuthRequest::new(CUSTODIAN, SUBJECT, ACTOR, data_class).at(day(at))
}

#[test]
fn remote_authorization_follows_the_window() {
    let client = start();
    client
        .record_consent(&[header(vec![record("r1", None, 1, Some(11), &["X"])])])
        .unwrap();

    assert!(client.consent_auth(&auth("X", 6)).unwrap());
    assert!(!client.consent_auth(&auth("X", 16)).unwrap());
    assert!(!client.consent_auth(&auth("Y", 6)).unwrap());
}

#[test]
fn remote_resubmission_is_idempotent() {
    let client = start();
    let batch = [header(vec![record("r1", None, 1, None, &["X"])])];

    client.record_consent(&batch).unwrap();
    client.record_consent(&batch).unwrap();

    let headers = client
        .query_consent(&ConsentQuery::new().actor(ACTOR).valid_at(day(2)))
        .unwrap();
    assert_eq!(headers.len(), 1);
    assert_eq!(headers[0].records.len(), 1);
}

#[test]
fn remote_chain_versioning_and_latest_lookup() {
    let client = start();
    client
        .record_consent(&[header(vec![
            record("H1", None, 1, None, &["X"]),
            record("H2", Some("H1"), 1, None, &["Y"]),
        ])])
        .unwrap();

    let h1 = client.find_consent_record_by_hash("H1", false).unwrap();
    let h2 = client.find_consent_record_by_hash("H2", true).unwrap();
    assert_eq!(h2.version, h1.version + 1);
    assert_eq!(h2.chain_id, h1.chain_id);

    match client.find_consent_record_by_hash("H1", true) {
        Err(ConsentError::NotLatestInChain { hash, latest_hash }) => {
            assert_eq!(hash, "H1");
            assert_eq!(latest_hash, "H2");
        }
        other => panic!("expected NotLatestInChain, got {:?}", other),
    }

    assert!(!client.consent_auth(&auth("X", 5)).unwrap(), "superseded version must not grant");
    let headers = client
        .query_consent(&ConsentQuery::new().custodian(CUSTODIAN).valid_at(day(5)))
        .unwrap();
    let hashes: Vec<&str> = headers[0].records.iter().map(|r| r.hash.as_str()).collect();
    assert_eq!(hashes, vec!["H2"]);
}

#[test]
fn remote_errors_keep_their_kind() {
    let client = start();

    let err = client
        .record_consent(&[header(vec![record("r2", Some("missing"), 1, None, &["X"])])])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = client
        .record_consent(&[header(vec![record("r3", None, 5, Some(2), &["X"])])])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = client.find_consent_record_by_hash("nope", false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let headers = client
        .query_consent(&ConsentQuery::new().actor(ACTOR).valid_at(day(6)))
        .unwrap();
    assert!(headers.is_empty(), "failed writes leave nothing behind");
}

#[test]
fn remote_delete_then_authorize() {
    let client = start();
    client
        .record_consent(&[header(vec![record("r1", None, 1, None, &["X"])])])
        .unwrap();
    assert!(client.consent_auth(&auth("X", 5)).unwrap());

    assert!(client.delete_consent_record_by_hash("r1").unwrap());
    assert!(!client.consent_auth(&auth("X", 5)).unwrap());

    let err = client.delete_consent_record_by_hash("r1").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn remote_diagnostics_include_server_probe() {
    let client = start();
    let names: Vec<String> = client.diagnostics().into_iter().map(|d| d.name).collect();
    assert_eq!(names, vec!["API".to_string(), "DB".to_string()]);
}

#[test]
fn remote_query_filters_match_local_ones() {
    let store: Arc<dyn ConsentStore> = Arc::new(SqliteConsentStore::open_in_memory().unwrap());
    let client = start_with(Arc::clone(&store));
    client
        .record_consent(&[header(vec![record("r1", None, 1, None, &["X"])])])
        .unwrap();

    let queries = [
        ConsentQuery::new().actor("").custodian(CUSTODIAN).valid_at(day(2)),
        ConsentQuery::new().custodian(CUSTODIAN).subject("").valid_at(day(2)),
        ConsentQuery::new().custodian(CUSTODIAN).valid_at(day(2)),
    ];
    for query in &queries {
        let local = store.query_consent(query).unwrap();
        let remote = client.query_consent(query).unwrap();
        assert_eq!(remote.len(), local.len(), "query {:?}", query);
    }

    let empty_actor = client.query_consent(&queries[0]).unwrap();
    assert!(empty_actor.is_empty(), "an empty actor is not a wildcard");
}
