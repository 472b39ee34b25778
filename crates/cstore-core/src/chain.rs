//! Chain resolution: version numbering and latest-member selection.
//!
//! A chain is the set of records sharing a `ChainId`, linked by
//! `previous_hash -> hash`. The first record is version 1; every successor
//! is exactly one higher than the record it names as predecessor. Exactly
//! one member carries the maximum version; a tie means the stored data is
//! corrupt and is reported as `ConsentError::ChainInconsistency`.

use std::collections::BTreeMap;

use cstore_contracts::{ChainId, ConsentError, ConsentRecord, ConsentResult};

/// Where a new record sits in its chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    pub chain_id: ChainId,
    pub version: u32,
}

/// The link for a record without predecessor: version 1 on a fresh chain.
pub fn genesis_link() -> ChainLink {
    ChainLink {
        chain_id: ChainId::new(),
        version: 1,
    }
}

/// The link for a record that supersedes `predecessor`.
pub fn successor_link(predecessor: &ConsentRecord) -> ConsentResult<ChainLink> {
    let version = predecessor
        .version
        .checked_add(1)
        .ok_or_else(|| ConsentError::ChainInconsistency {
            chain_id: predecessor.chain_id.to_string(),
            reason: format!("version overflow after record '{}'", predecessor.hash),
        })?;

    Ok(ChainLink {
        chain_id: predecessor.chain_id.clone(),
        version,
    })
}

/// Return the member of one chain with the highest version.
///
/// `members` must all share a chain id. Fails when `members` is empty or
/// when two members share the maximum version.
pub fn latest_in_chain(members: &[ConsentRecord]) -> ConsentResult<&ConsentRecord> {
    let mut latest: Option<&ConsentRecord> = None;
    let mut tied = false;

    for member in members {
        match latest {
            Some(current) if member.version < current.version => {}
            Some(current) if member.version == current.version => tied = true,
            _ => {
                latest = Some(member);
                tied = false;
            }
        }
    }

    let latest = latest.ok_or_else(|| ConsentError::ChainInconsistency {
        chain_id: "<empty>".to_string(),
        reason: "chain has no members".to_string(),
    })?;

    if tied {
        return Err(ConsentError::ChainInconsistency {
            chain_id: latest.chain_id.to_string(),
            reason: format!("more than one record carries version {}", latest.version),
        });
    }

    Ok(latest)
}

/// Reduce `records` to the highest version of every chain they touch.
///
/// Records are grouped by chain id; the result is ordered by chain id.
pub fn latest_per_chain(records: Vec<ConsentRecord>) -> ConsentResult<Vec<ConsentRecord>> {
    let mut chains: BTreeMap<ChainId, Vec<ConsentRecord>> = BTreeMap::new();
    for record in records {
        chains.entry(record.chain_id.clone()).or_default().push(record);
    }

    let mut latest = Vec::with_capacity(chains.len());
    for members in chains.values() {
        latest.push(latest_in_chain(members)?.clone());
    }
    Ok(latest)
}
