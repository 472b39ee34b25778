//! `SqliteConsentStore`: the SQLite-backed `ConsentStore`.
//!
//! The store owns one connection behind a `Mutex`, so calls are serialized
//! in-process and SQLite's own locking guards other processes sharing the
//! file. `shutdown()` takes the connection out; every call after that fails
//! with `ConsentError::Storage`.

use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use tracing::{debug, info};

use cstore_config::ConsentStoreConfig;
use cstore_contracts::{
    AuthRequest, ConsentError, ConsentHeader, ConsentHeaderInput, ConsentQuery, ConsentRecord,
    ConsentResult, DiagnosticResult,
};
use cstore_core::chain::latest_in_chain;
use cstore_core::select::{assemble_headers, is_authorized};
use cstore_core::ConsentStore;

use crate::rows::{chain_members, db_error, find_record, matching_headers, matching_records, HeaderFilter};
use crate::schema::run_migrations;
use crate::write::{delete_record, record_consent};

const IN_MEMORY: &str = ":memory:";

pub struct SqliteConsentStore {
    conn: Mutex<Option<Connection>>,
    connection_string: String,
}

impl SqliteConsentStore {
    /// Open the database named by `config.connection_string`, apply the
    /// connection pragmas and bring the schema up to date.
    pub fn open(config: &ConsentStoreConfig) -> ConsentResult<Self> {
        let conn = Connection::open(&config.connection_string).map_err(db_error)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .map_err(db_error)?;
        Self::initialize(conn, config.connection_string.clone())
    }

    /// A private in-memory store with the schema applied.
    pub fn open_in_memory() -> ConsentResult<Self> {
        let conn = Connection::open_in_memory().map_err(db_error)?;
        Self::initialize(conn, IN_MEMORY.to_string())
    }

    fn initialize(mut conn: Connection, connection_string: String) -> ConsentResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(db_error)?;
        let applied = run_migrations(&mut conn)?;

        info!(
            connection_string = %connection_string,
            migrations_applied = applied,
            "consent store opened"
        );

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            connection_string,
        })
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Close the connection. Later calls fail; calling twice is a no-op.
    pub fn shutdown(&self) -> ConsentResult<()> {
        let mut guard = self.conn.lock().map_err(|e| ConsentError::Storage {
            reason: format!("connection lock poisoned: {}", e),
        })?;

        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| db_error(e))?;
            info!(connection_string = %self.connection_string, "consent store shut down");
        }
        Ok(())
    }

    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> ConsentResult<T>) -> ConsentResult<T> {
        let mut guard = self.conn.lock().map_err(|e| ConsentError::Storage {
            reason: format!("connection lock poisoned: {}", e),
        })?;
        let conn = guard
            .as_mut()
            .ok_or_else(|| ConsentError::storage("consent store is shut down"))?;
        f(conn)
    }
}

impl ConsentStore for SqliteConsentStore {
    fn record_consent(&self, headers: &[ConsentHeaderInput]) -> ConsentResult<()> {
        self.with_conn(|conn| record_consent(conn, headers))
    }

    fn consent_auth(&self, request: &AuthRequest) -> ConsentResult<bool> {
        let filter = HeaderFilter {
            actor: Some(request.actor.as_str()),
            custodian: Some(request.custodian.as_str()),
            subject: Some(request.subject.as_str()),
        };
        let records = self.with_conn(|conn| matching_records(conn, &filter))?;
        is_authorized(records, &request.data_class, request.checkpoint())
    }

    fn query_consent(&self, query: &ConsentQuery) -> ConsentResult<Vec<ConsentHeader>> {
        let filter = HeaderFilter {
            actor: query.actor.as_deref(),
            custodian: query.custodian.as_deref(),
            subject: query.subject.as_deref(),
        };
        let (headers, records) = self.with_conn(|conn| {
            Ok((matching_headers(conn, &filter)?, matching_records(conn, &filter)?))
        })?;

        let result = assemble_headers(headers, records, query.checkpoint())?;
        debug!(headers = result.len(), "consent query evaluated");
        Ok(result)
    }

    fn find_consent_record_by_hash(&self, hash: &str, latest: bool) -> ConsentResult<ConsentRecord> {
        self.with_conn(|conn| {
            let record = find_record(conn, hash)?.ok_or_else(|| ConsentError::record_not_found(hash))?;
            if !latest {
                return Ok(record);
            }

            let members = chain_members(conn, &record.chain_id)?;
            let newest = latest_in_chain(&members)?;
            if newest.hash != record.hash {
                return Err(ConsentError::NotLatestInChain {
                    hash: record.hash,
                    latest_hash: newest.hash.clone(),
                });
            }
            Ok(record)
        })
    }

    fn delete_consent_record_by_hash(&self, hash: &str) -> ConsentResult<bool> {
        self.with_conn(|conn| delete_record(conn, hash))
    }

    fn diagnostics(&self) -> Vec<DiagnosticResult> {
        let ping = self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(db_error)
        });
        let outcome = match ping {
            Ok(_) => format!("connection string: {}, ping: ok", self.connection_string),
            Err(e) => format!("connection string: {}, ping: {}", self.connection_string, e),
        };
        vec![DiagnosticResult::new("DB", outcome)]
    }
}
