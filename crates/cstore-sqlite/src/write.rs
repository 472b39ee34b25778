//! Transactional writes: recording consent batches and deleting records.
//!
//! Both operations run inside one transaction. Returning early with an error
//! drops the `Transaction`, which rolls back every statement of the call.

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::{debug, info, warn};

use cstore_contracts::{ConsentError, ConsentHeaderInput, ConsentRecordInput, ConsentResult};
use cstore_core::chain::{genesis_link, successor_link, ChainLink};

use crate::rows::{db_error, find_record, to_millis, to_stored_precision};

/// Persist `headers` and their records atomically.
pub(crate) fn record_consent(conn: &mut Connection, headers: &[ConsentHeaderInput]) -> ConsentResult<()> {
    let tx = conn.transaction().map_err(db_error)?;
    let mut inserted = 0usize;
    let mut skipped = 0usize;

    for header in headers {
        if header.id.is_empty() {
            warn!(subject = %header.subject, "rejected patient consent without id");
            return Err(ConsentError::validation("id of patient consent cannot be empty"));
        }
        let mut header_stored = false;

        for record in &header.records {
            if hash_exists(&tx, &record.hash)? {
                warn!(hash = %record.hash, "consent record already stored, skipping");
                skipped += 1;
                continue;
            }

            let link = resolve_link(&tx, record)?;

            // Windows are compared at the millisecond precision they are stored with.
            if let Some(valid_to) = record.valid_to {
                if to_stored_precision(valid_to) <= to_stored_precision(record.valid_from) {
                    warn!(hash = %record.hash, "rejected consent record with empty or inverted validity window");
                    return Err(ConsentError::InvalidValidityWindow {
                        hash: record.hash.clone(),
                        valid_from: record.valid_from,
                        valid_to,
                    });
                }
            }

            if !header_stored {
                ensure_header(&tx, header)?;
                header_stored = true;
            }
            insert_record(&tx, &header.id, record, &link)?;
            inserted += 1;
        }
    }

    tx.commit().map_err(db_error)?;
    info!(headers = headers.len(), inserted, skipped, "consent recorded");
    Ok(())
}

/// Find the header by id or create it with the submitted triple. Only called
/// once a record of the header is about to be inserted, so a header row never
/// exists without records.
fn ensure_header(tx: &Transaction<'_>, header: &ConsentHeaderInput) -> ConsentResult<()> {
    let existing: Option<(String, String, String)> = tx
        .query_row(
            "SELECT actor, custodian, subject FROM patient_consent WHERE id = ?1",
            params![header.id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()
        .map_err(db_error)?;

    match existing {
        Some((actor, custodian, subject)) => {
            if actor != header.actor || custodian != header.custodian || subject != header.subject {
                warn!(
                    header_id = %header.id,
                    "header id already stored with a different subject/custodian/actor; keeping the stored triple"
                );
            }
        }
        None => {
            tx.execute(
                "INSERT INTO patient_consent (id, actor, custodian, subject) VALUES (?1, ?2, ?3, ?4)",
                params![header.id, header.actor, header.custodian, header.subject],
            )
            .map_err(db_error)?;
            debug!(header_id = %header.id, "patient consent created");
        }
    }
    Ok(())
}

fn hash_exists(tx: &Transaction<'_>, hash: &str) -> ConsentResult<bool> {
    tx.query_row(
        "SELECT 1 FROM consent_record WHERE hash = ?1",
        params![hash],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .map_err(db_error)
}

/// Chain position of a new record: a fresh chain, or one step after the
/// record named by `previous_hash`.
fn resolve_link(tx: &Transaction<'_>, record: &ConsentRecordInput) -> ConsentResult<ChainLink> {
    match record.previous_hash.as_deref().filter(|p| !p.is_empty()) {
        None => Ok(genesis_link()),
        Some(previous) => {
            let predecessor = find_record(tx, previous)?.ok_or_else(|| ConsentError::NotFound {
                entity: "previous consent record".to_string(),
                key: previous.to_string(),
            })?;
            successor_link(&predecessor)
        }
    }
}

fn insert_record(
    tx: &Transaction<'_>,
    header_id: &str,
    record: &ConsentRecordInput,
    link: &ChainLink,
) -> ConsentResult<()> {
    tx.execute(
        "INSERT INTO consent_record \
         (patient_consent_id, hash, previous_hash, uuid, version, valid_from, valid_to) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            header_id,
            record.hash,
            record.previous_hash.as_deref().filter(|p| !p.is_empty()),
            link.chain_id.to_string(),
            link.version,
            to_millis(record.valid_from),
            record.valid_to.map(to_millis),
        ],
    )
    .map_err(db_error)?;
    let record_id = tx.last_insert_rowid();

    let mut stmt = tx
        .prepare_cached("INSERT INTO data_class (consent_record_id, code) VALUES (?1, ?2)")
        .map_err(db_error)?;
    for code in &record.data_classes {
        stmt.execute(params![record_id, code]).map_err(db_error)?;
    }

    debug!(
        hash = %record.hash,
        chain_id = %link.chain_id,
        version = link.version,
        "consent record inserted"
    );
    Ok(())
}

/// Delete one record and its data classes. The owning header goes too when
/// this was its last record.
pub(crate) fn delete_record(conn: &mut Connection, hash: &str) -> ConsentResult<bool> {
    let tx = conn.transaction().map_err(db_error)?;

    let row: Option<(i64, String)> = tx
        .query_row(
            "SELECT id, patient_consent_id FROM consent_record WHERE hash = ?1",
            params![hash],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(db_error)?;
    let Some((record_id, header_id)) = row else {
        return Err(ConsentError::record_not_found(hash));
    };

    tx.execute("DELETE FROM data_class WHERE consent_record_id = ?1", params![record_id])
        .map_err(db_error)?;
    tx.execute("DELETE FROM consent_record WHERE id = ?1", params![record_id])
        .map_err(db_error)?;

    let remaining: i64 = tx
        .query_row(
            "SELECT COUNT(*) FROM consent_record WHERE patient_consent_id = ?1",
            params![header_id],
            |row| row.get(0),
        )
        .map_err(db_error)?;
    if remaining == 0 {
        tx.execute("DELETE FROM patient_consent WHERE id = ?1", params![header_id])
            .map_err(db_error)?;
        debug!(header_id = %header_id, "patient consent removed with its last record");
    }

    tx.commit().map_err(db_error)?;
    info!(hash = %hash, "consent record deleted");
    Ok(true)
}
