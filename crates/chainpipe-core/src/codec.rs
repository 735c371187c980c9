//! Bech32 and CIP-14 asset fingerprint helpers.
//!
//! Everything here uses the classic Bech32 checksum (not Bech32m), which is
//! what Cardano uses for addresses, pool IDs and asset fingerprints.

use bech32::primitives::decode::CheckedHrpstring;
use bech32::{Checksum, Hrp};
use blake2::digest::consts::U20;
use blake2::{Blake2b, Digest};

use crate::error::LedgerError;

/// Human-readable prefix of pool IDs.
pub const POOL_PREFIX: &str = "pool";
/// Human-readable prefix of mainnet reward (stake) addresses.
pub const STAKE_PREFIX: &str = "stake";
/// Human-readable prefix of testnet reward (stake) addresses.
pub const STAKE_TEST_PREFIX: &str = "stake_test";
/// Human-readable prefix of asset fingerprints.
pub const ASSET_PREFIX: &str = "asset";

type Blake2b160 = Blake2b<U20>;

/// Classic Bech32 checksum without the 90-character (BIP-173) or
/// 1023-character code length cap.
///
/// Certificate CBOR is bech32-encoded whole, and a pool registration with
/// relays and metadata easily runs past 1023 characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnboundedBech32 {}

impl Checksum for UnboundedBech32 {
    type MidstateRepr = u32;
    const CODE_LENGTH: usize = 1 << 24;
    const CHECKSUM_LENGTH: usize = 6;
    const GENERATOR_SH: [u32; 5] = [0x3b6a57b2, 0x26508e6d, 0x1ea119fa, 0x3d4233dd, 0x2a1462b3];
    const TARGET_RESIDUE: u32 = 1;
}

/// Encode `data` as a bech32 string with the given human-readable prefix.
pub fn encode_bech32(prefix: &str, data: &[u8]) -> Result<String, LedgerError> {
    let hrp = Hrp::parse(prefix).map_err(|e| LedgerError::Prefix {
        prefix: prefix.to_string(),
        reason: e.to_string(),
    })?;
    bech32::encode::<UnboundedBech32>(hrp, data).map_err(|e| LedgerError::Encode(e.to_string()))
}

/// Decode a bech32 string into its lowercase prefix and payload bytes.
pub fn decode_bech32(s: &str) -> Result<(String, Vec<u8>), LedgerError> {
    let checked = CheckedHrpstring::new::<UnboundedBech32>(s)
        .map_err(|e| LedgerError::Decode(e.to_string()))?;
    Ok((checked.hrp().to_lowercase(), checked.byte_iter().collect()))
}

/// CIP-14 fingerprint: `bech32("asset", blake2b-160(policy_id ‖ asset_name))`.
pub fn asset_fingerprint(policy_id: &[u8], asset_name: &[u8]) -> Result<String, LedgerError> {
    let mut hasher = Blake2b160::new();
    hasher.update(policy_id);
    hasher.update(asset_name);
    encode_bech32(ASSET_PREFIX, &hasher.finalize())
}
