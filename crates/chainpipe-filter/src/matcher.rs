//! Pure pass/drop decisions for chain-sync events.
//!
//! Criteria combine with AND, values within one criterion with OR. A
//! criterion with no values is inactive. Transactions are checked in the
//! order address → policy ID → asset fingerprint → pool, stopping at the
//! first active criterion that does not match.
//!
//! Nothing in here fails: an undecodable filter value, issuer key or
//! certificate is reported as [`MatchOutcome::Malformed`], which counts as a
//! non-match. A bad criterion can therefore never crash the stage, it simply
//! never matches.

use chainpipe_core::codec::{asset_fingerprint, encode_bech32, POOL_PREFIX, STAKE_PREFIX};
use chainpipe_core::{BlockEvent, Certificate, Event, Payload, TransactionEvent};
use tracing::trace;

use crate::config::FilterCriteria;

/// Result of comparing one candidate against one filter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Match,
    NoMatch,
    /// The candidate or filter value could not be decoded. Treated as `NoMatch`.
    Malformed,
}

impl MatchOutcome {
    pub fn is_match(self) -> bool {
        self == Self::Match
    }

    fn compare(candidate: &str, filter: &str) -> Self {
        if candidate == filter {
            Self::Match
        } else {
            Self::NoMatch
        }
    }

    /// `Match` if any outcome matches, stopping at the first one; otherwise
    /// `Malformed` if any candidate was malformed, else `NoMatch`.
    fn any(outcomes: impl IntoIterator<Item = MatchOutcome>) -> Self {
        let mut result = Self::NoMatch;
        for outcome in outcomes {
            match outcome {
                Self::Match => return Self::Match,
                Self::Malformed => result = Self::Malformed,
                Self::NoMatch => {}
            }
        }
        result
    }

    fn or_else(self, next: impl FnOnce() -> MatchOutcome) -> Self {
        match self {
            Self::Match => Self::Match,
            Self::NoMatch => next(),
            Self::Malformed => match next() {
                Self::Match => Self::Match,
                _ => Self::Malformed,
            },
        }
    }
}

/// Final decision for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Drop,
}

impl Verdict {
    pub fn is_pass(self) -> bool {
        self == Self::Pass
    }
}

/// Evaluates events against a fixed set of criteria.
#[derive(Debug, Clone)]
pub struct Matcher {
    criteria: FilterCriteria,
}

impl Matcher {
    pub fn new(criteria: FilterCriteria) -> Self {
        Self { criteria }
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn evaluate(&self, event: &Event) -> Verdict {
        let pass = match &event.payload {
            Payload::Block(block) => self.block_passes(block),
            Payload::Transaction(tx) => self.transaction_passes(tx),
            Payload::Rollback(_) => true,
        };
        if pass {
            Verdict::Pass
        } else {
            Verdict::Drop
        }
    }

    fn block_passes(&self, block: &BlockEvent) -> bool {
        criterion_passes("pool_ids", &self.criteria.pool_ids, |pool_id| {
            match_block_pool(block, pool_id)
        })
    }

    fn transaction_passes(&self, tx: &TransactionEvent) -> bool {
        criterion_passes("addresses", &self.criteria.addresses, |address| {
            match_address(tx, address)
        }) && criterion_passes("policy_ids", &self.criteria.policy_ids, |policy_id| {
            match_policy_id(tx, policy_id)
        }) && criterion_passes(
            "asset_fingerprints",
            &self.criteria.asset_fingerprints,
            |fingerprint| match_asset_fingerprint(tx, fingerprint),
        ) && criterion_passes("pool_ids", &self.criteria.pool_ids, |pool_id| {
            match_certificate_pool(tx, pool_id)
        })
    }
}

/// An inactive (empty) criterion passes; otherwise any listed value must match.
fn criterion_passes(
    criterion: &str,
    values: &[String],
    mut matches: impl FnMut(&str) -> MatchOutcome,
) -> bool {
    values.is_empty()
        || values.iter().any(|value| match matches(value) {
            MatchOutcome::Match => true,
            MatchOutcome::NoMatch => false,
            MatchOutcome::Malformed => {
                trace!(criterion, value = %value, "malformed input treated as no match");
                false
            }
        })
}

fn bech32_equals(prefix: &str, bytes: &[u8], filter: &str) -> MatchOutcome {
    match encode_bech32(prefix, bytes) {
        Ok(encoded) => MatchOutcome::compare(&encoded, filter),
        Err(_) => MatchOutcome::Malformed,
    }
}

// ─── Block events ─────────────────────────────────────────────────────────────

/// Issuer key matches literally, or, for `pool…` filters, after encoding the
/// decoded issuer key hash as a bech32 pool ID.
pub fn match_block_pool(block: &BlockEvent, pool_id: &str) -> MatchOutcome {
    if block.issuer_vkey == pool_id {
        return MatchOutcome::Match;
    }
    if !pool_id.starts_with(POOL_PREFIX) {
        return MatchOutcome::NoMatch;
    }
    match hex::decode(&block.issuer_vkey) {
        Ok(issuer) => bech32_equals(POOL_PREFIX, &issuer, pool_id),
        Err(_) => MatchOutcome::Malformed,
    }
}

// ─── Transaction events ───────────────────────────────────────────────────────

/// Literal address of any output or resolved input; for `stake…` filters
/// also the derived stake address, then stake credentials of delegation and
/// deregistration certificates.
pub fn match_address(tx: &TransactionEvent, address: &str) -> MatchOutcome {
    let is_stake = address.starts_with(STAKE_PREFIX);

    let outputs = MatchOutcome::any(tx.touched_outputs().map(|output| {
        if output.address.as_str() == address {
            return MatchOutcome::Match;
        }
        if !is_stake {
            return MatchOutcome::NoMatch;
        }
        match output.address.stake_address() {
            Some(stake) => MatchOutcome::compare(&stake, address),
            None => MatchOutcome::Malformed,
        }
    }));
    if !is_stake {
        return outputs;
    }

    outputs.or_else(|| {
        MatchOutcome::any(tx.certificates.iter().filter_map(|cert| match cert {
            Certificate::StakeDelegation { credential, .. }
            | Certificate::StakeDeregistration { credential, .. } => Some(bech32_equals(
                STAKE_PREFIX,
                credential.hash().as_bytes(),
                address,
            )),
            _ => None,
        }))
    })
}

/// Any output or resolved input holds an asset under `policy_id` (hex).
pub fn match_policy_id(tx: &TransactionEvent, policy_id: &str) -> MatchOutcome {
    MatchOutcome::any(
        tx.touched_outputs()
            .filter_map(|output| output.assets.as_ref())
            .flat_map(|assets| assets.policies())
            .map(|policy| MatchOutcome::compare(&policy.to_hex(), policy_id)),
    )
}

/// Any asset held by an output or resolved input has CIP-14 fingerprint `fingerprint`.
pub fn match_asset_fingerprint(tx: &TransactionEvent, fingerprint: &str) -> MatchOutcome {
    MatchOutcome::any(
        tx.touched_outputs()
            .filter_map(|output| output.assets.as_ref())
            .flat_map(|assets| assets.iter())
            .map(
                |(policy, name)| match asset_fingerprint(policy.as_bytes(), name.as_bytes()) {
                    Ok(fp) => MatchOutcome::compare(&fp, fingerprint),
                    Err(_) => MatchOutcome::Malformed,
                },
            ),
    )
}

/// Pool named by a delegation, retirement or registration certificate.
///
/// The hex comparison uses the certificate's pool key hash. The bech32
/// comparison for `pool…` filters encodes the certificate's full CBOR, not
/// the hash, unlike [`match_block_pool`]; both are kept as the upstream
/// source behaves. In practice a `pool1…` ID derived from a key hash will
/// not match here, only the hex form does.
pub fn match_certificate_pool(tx: &TransactionEvent, pool_id: &str) -> MatchOutcome {
    let is_bech32 = pool_id.starts_with(POOL_PREFIX);
    MatchOutcome::any(tx.certificates.iter().filter_map(|cert| {
        let hash = match cert {
            Certificate::StakeDelegation { pool_key_hash, .. }
            | Certificate::PoolRetirement { pool_key_hash, .. } => pool_key_hash,
            Certificate::PoolRegistration { operator, .. } => operator,
            _ => return None,
        };
        let outcome = MatchOutcome::compare(&hash.to_hex(), pool_id);
        if outcome.is_match() || !is_bech32 {
            return Some(outcome);
        }
        let outcome = bech32_equals(POOL_PREFIX, cert.cbor(), pool_id);
        if outcome == MatchOutcome::Malformed {
            trace!(certificate = cert.name(), "certificate CBOR not encodable as bech32");
        }
        Some(outcome)
    }))
}
