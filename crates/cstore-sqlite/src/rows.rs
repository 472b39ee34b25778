//! Row mapping and the shared read queries.
//!
//! Timestamps live in the database as epoch milliseconds and chain ids as
//! hyphenated UUID text. Conversion failures surface as
//! `FromSqlConversionFailure` and end up as `ConsentError::Storage`.

use std::collections::BTreeSet;

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use cstore_contracts::{ChainId, ConsentError, ConsentHeader, ConsentRecord, ConsentResult};

/// Fold a driver error into the store's error type.
pub(crate) fn db_error(err: rusqlite::Error) -> ConsentError {
    ConsentError::Storage {
        reason: err.to_string(),
    }
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// `at` as it reads back from the database.
pub(crate) fn to_stored_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(3)
}

fn from_millis(idx: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp {} is out of range", millis).into(),
        )
    })
}

const RECORD_COLUMNS: &str = "r.id, r.patient_consent_id, r.hash, r.previous_hash, r.uuid, \
                              r.version, r.valid_from, r.valid_to";

/// Map a row selected with `RECORD_COLUMNS`. Data classes are loaded
/// separately by `attach_data_classes`.
fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ConsentRecord> {
    let chain: String = row.get(4)?;
    let chain_id = uuid::Uuid::parse_str(&chain)
        .map(ChainId)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    let valid_to = match row.get::<_, Option<i64>>(7)? {
        Some(millis) => Some(from_millis(7, millis)?),
        None => None,
    };

    Ok(ConsentRecord {
        id: row.get(0)?,
        header_id: row.get(1)?,
        hash: row.get(2)?,
        previous_hash: row.get(3)?,
        chain_id,
        version: row.get(5)?,
        valid_from: from_millis(6, row.get(6)?)?,
        valid_to,
        data_classes: BTreeSet::new(),
    })
}

fn attach_data_classes(conn: &Connection, records: &mut [ConsentRecord]) -> ConsentResult<()> {
    let mut stmt = conn
        .prepare_cached("SELECT code FROM data_class WHERE consent_record_id = ?1")
        .map_err(db_error)?;

    for record in records.iter_mut() {
        record.data_classes = stmt
            .query_map(params![record.id], |row| row.get::<_, String>(0))
            .map_err(db_error)?
            .collect::<rusqlite::Result<BTreeSet<_>>>()
            .map_err(db_error)?;
    }
    Ok(())
}

fn select_records(
    conn: &Connection,
    sql: &str,
    values: &[&str],
) -> ConsentResult<Vec<ConsentRecord>> {
    let mut stmt = conn.prepare(sql).map_err(db_error)?;
    let mut records = stmt
        .query_map(params_from_iter(values.iter()), record_from_row)
        .map_err(db_error)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(db_error)?;

    attach_data_classes(conn, &mut records)?;
    Ok(records)
}

/// Exact lookup of a record by its hash.
pub(crate) fn find_record(conn: &Connection, hash: &str) -> ConsentResult<Option<ConsentRecord>> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM consent_record r WHERE r.hash = ?1");
    let record = conn
        .query_row(&sql, params![hash], record_from_row)
        .optional()
        .map_err(db_error)?;

    let mut found: Vec<ConsentRecord> = record.into_iter().collect();
    attach_data_classes(conn, &mut found)?;
    Ok(found.pop())
}

/// Every stored member of `chain_id`, across all headers.
pub(crate) fn chain_members(conn: &Connection, chain_id: &ChainId) -> ConsentResult<Vec<ConsentRecord>> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM consent_record r WHERE r.uuid = ?1 ORDER BY r.version");
    let chain = chain_id.to_string();
    select_records(conn, &sql, &[chain.as_str()])
}

/// Identity filters on `patient_consent`. `None` is a wildcard.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct HeaderFilter<'a> {
    pub actor: Option<&'a str>,
    pub custodian: Option<&'a str>,
    pub subject: Option<&'a str>,
}

impl<'a> HeaderFilter<'a> {
    /// Render a `WHERE` clause over alias `p` plus its positional values.
    fn where_clause(&self) -> (String, Vec<&'a str>) {
        let columns = [
            ("p.actor", self.actor),
            ("p.custodian", self.custodian),
            ("p.subject", self.subject),
        ];

        let mut predicates = Vec::new();
        let mut values = Vec::new();
        for (column, value) in columns {
            if let Some(value) = value {
                values.push(value);
                predicates.push(format!("{} = ?{}", column, values.len()));
            }
        }

        if predicates.is_empty() {
            (String::new(), values)
        } else {
            (format!("WHERE {}", predicates.join(" AND ")), values)
        }
    }
}

/// Headers matching `filter`, without records.
pub(crate) fn matching_headers(
    conn: &Connection,
    filter: &HeaderFilter<'_>,
) -> ConsentResult<Vec<ConsentHeader>> {
    let (clause, values) = filter.where_clause();
    let sql = format!("SELECT p.id, p.actor, p.custodian, p.subject FROM patient_consent p {clause} ORDER BY p.id");

    let mut stmt = conn.prepare(&sql).map_err(db_error)?;
    let headers = stmt
        .query_map(params_from_iter(values.iter()), |row| {
            Ok(ConsentHeader {
                id: row.get(0)?,
                actor: row.get(1)?,
                custodian: row.get(2)?,
                subject: row.get(3)?,
                records: Vec::new(),
            })
        })
        .map_err(db_error)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(db_error)?;
    Ok(headers)
}

/// Every stored record owned by a header matching `filter`.
pub(crate) fn matching_records(
    conn: &Connection,
    filter: &HeaderFilter<'_>,
) -> ConsentResult<Vec<ConsentRecord>> {
    let (clause, values) = filter.where_clause();
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM consent_record r \
         JOIN patient_consent p ON p.id = r.patient_consent_id {clause} ORDER BY r.id"
    );
    select_records(conn, &sql, &values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter_has_no_where_clause() {
        let (clause, values) = HeaderFilter::default().where_clause();
        assert!(clause.is_empty());
        assert!(values.is_empty());
    }

    #[test]
    fn test_filter_numbers_placeholders_in_order() {
        let filter = HeaderFilter {
            actor: None,
            custodian: Some("urn:c"),
            subject: Some("urn:s"),
        };
        let (clause, values) = filter.where_clause();
        assert_eq!(clause, "WHERE p.custodian = ?1 AND p.subject = ?2");
        assert_eq!(values, vec!["urn:c", "urn:s"]);
    }

    #[test]
    fn test_empty_string_is_a_real_filter() {
        let filter = HeaderFilter {
            actor: Some(""),
            ..HeaderFilter::default()
        };
        let (clause, values) = filter.where_clause();
        assert_eq!(clause, "WHERE p.actor = ?1");
        assert_eq!(values, vec![""]);
    }

    #[test]
    fn test_millis_round_trip_keeps_millisecond_precision() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(from_millis(0, to_millis(at)).unwrap(), at);
    }
}
