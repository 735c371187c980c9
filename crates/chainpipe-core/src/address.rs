//! Transaction output addresses and stake-address derivation.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::{decode_bech32, encode_bech32, STAKE_PREFIX, STAKE_TEST_PREFIX};
use crate::error::LedgerError;
use crate::ledger::Blake2b224;

const MAINNET_ID: u8 = 1;
const REWARD_KEY_HEADER: u8 = 0b1110_0000;
const REWARD_SCRIPT_HEADER: u8 = 0b1111_0000;

/// An address exactly as reported by the upstream chain-sync decoder.
///
/// The textual form is authoritative for literal matching; the raw bytes are
/// only recovered on demand when a stake address has to be derived.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The reward address controlled by this address's delegation part.
    ///
    /// `None` when the address is not bech32, or carries no stake part
    /// (enterprise, pointer, Byron).
    pub fn stake_address(&self) -> Option<String> {
        self.derive_stake_address().ok()
    }

    fn derive_stake_address(&self) -> Result<String, LedgerError> {
        let (_, bytes) = decode_bech32(&self.0)?;
        let header = *bytes.first().ok_or(LedgerError::Length {
            expected: 1,
            got: 0,
        })?;
        let network = header & 0x0f;
        let stake_header = match header >> 4 {
            // base address: payment part ‖ stake key hash
            0b0000 | 0b0001 => REWARD_KEY_HEADER,
            // base address: payment part ‖ stake script hash
            0b0010 | 0b0011 => REWARD_SCRIPT_HEADER,
            // already a reward address
            0b1110 | 0b1111 => header & 0xf0,
            _ => return Err(LedgerError::NoStakePart { header }),
        };
        let stake_part = match header >> 4 {
            0b1110 | 0b1111 => bytes.get(1..),
            _ => bytes.get(1 + Blake2b224::LEN..),
        }
        .ok_or(LedgerError::Length {
            expected: 1 + 2 * Blake2b224::LEN,
            got: bytes.len(),
        })?;
        let hash = Blake2b224::from_slice(stake_part)?;

        let mut reward = Vec::with_capacity(1 + Blake2b224::LEN);
        reward.push(stake_header | network);
        reward.extend_from_slice(hash.as_bytes());

        let prefix = if network == MAINNET_ID {
            STAKE_PREFIX
        } else {
            STAKE_TEST_PREFIX
        };
        encode_bech32(prefix, &reward)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
