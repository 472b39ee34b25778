//! SQLite schema and migrations.
//!
//! Migrations are applied in order, each in its own transaction, and the
//! number applied so far is kept in `PRAGMA user_version`. Running them on
//! an up-to-date database is a no-op.

use rusqlite::Connection;
use tracing::info;

use cstore_contracts::ConsentResult;

use crate::rows::db_error;

/// Version 1: headers, versioned records and their data classes.
///
/// Timestamps are UTC epoch milliseconds.
const V1_CONSENT_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS patient_consent (
    id         TEXT PRIMARY KEY,
    actor      TEXT NOT NULL,
    custodian  TEXT NOT NULL,
    subject    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS consent_record (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_consent_id  TEXT NOT NULL REFERENCES patient_consent(id) ON DELETE CASCADE,
    hash                TEXT NOT NULL UNIQUE,
    previous_hash       TEXT,
    uuid                TEXT NOT NULL,
    version             INTEGER NOT NULL CHECK (version >= 1),
    valid_from          INTEGER NOT NULL,
    valid_to            INTEGER
);

CREATE TABLE IF NOT EXISTS data_class (
    consent_record_id  INTEGER NOT NULL REFERENCES consent_record(id) ON DELETE CASCADE,
    code               TEXT NOT NULL,
    PRIMARY KEY (consent_record_id, code)
);

CREATE INDEX IF NOT EXISTS idx_patient_consent_triple
    ON patient_consent(actor, custodian, subject);
CREATE INDEX IF NOT EXISTS idx_consent_record_header
    ON consent_record(patient_consent_id);
CREATE INDEX IF NOT EXISTS idx_consent_record_chain
    ON consent_record(uuid);
"#;

/// Ordered migration scripts. Index `i` moves the database to version `i + 1`.
const MIGRATIONS: &[&str] = &[V1_CONSENT_TABLES];

/// The schema version a fully migrated database reports.
pub const SCHEMA_VERSION: u32 = MIGRATIONS.len() as u32;

/// Read `PRAGMA user_version`.
pub fn schema_version(conn: &Connection) -> ConsentResult<u32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(db_error)
}

/// Apply every migration newer than the database's current version.
///
/// Returns the number of migrations applied.
pub fn run_migrations(conn: &mut Connection) -> ConsentResult<usize> {
    let current = schema_version(conn)? as usize;
    let pending = MIGRATIONS.iter().enumerate().skip(current);

    let mut applied = 0;
    for (index, script) in pending {
        let target = index + 1;
        let tx = conn.transaction().map_err(db_error)?;
        tx.execute_batch(script).map_err(db_error)?;
        tx.pragma_update(None, "user_version", target as i64)
            .map_err(db_error)?;
        tx.commit().map_err(db_error)?;

        info!(version = target, "schema migration applied");
        applied += 1;
    }

    Ok(applied)
}
