//! Transaction certificates.

use serde::{Deserialize, Serialize};

use crate::ledger::{PoolKeyHash, StakeCredential};

/// A certificate carried in a transaction body.
///
/// Every variant keeps the certificate's full serialized CBOR next to the
/// decoded fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Certificate {
    StakeRegistration {
        credential: StakeCredential,
        #[serde(with = "hex")]
        cbor: Vec<u8>,
    },
    StakeDeregistration {
        credential: StakeCredential,
        #[serde(with = "hex")]
        cbor: Vec<u8>,
    },
    StakeDelegation {
        credential: StakeCredential,
        pool_key_hash: PoolKeyHash,
        #[serde(with = "hex")]
        cbor: Vec<u8>,
    },
    PoolRegistration {
        /// Operator (cold key hash), i.e. the pool ID.
        operator: PoolKeyHash,
        #[serde(default)]
        pledge: u64,
        #[serde(default)]
        cost: u64,
        #[serde(with = "hex")]
        cbor: Vec<u8>,
    },
    PoolRetirement {
        pool_key_hash: PoolKeyHash,
        epoch: u64,
        #[serde(with = "hex")]
        cbor: Vec<u8>,
    },
    /// Any other certificate kind (genesis delegation, MIR, governance, ...).
    Other {
        name: String,
        #[serde(with = "hex")]
        cbor: Vec<u8>,
    },
}

impl Certificate {
    /// The certificate's full serialized form.
    pub fn cbor(&self) -> &[u8] {
        match self {
            Self::StakeRegistration { cbor, .. }
            | Self::StakeDeregistration { cbor, .. }
            | Self::StakeDelegation { cbor, .. }
            | Self::PoolRegistration { cbor, .. }
            | Self::PoolRetirement { cbor, .. }
            | Self::Other { cbor, .. } => cbor,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::StakeRegistration { .. } => "stake_registration",
            Self::StakeDeregistration { .. } => "stake_deregistration",
            Self::StakeDelegation { .. } => "stake_delegation",
            Self::PoolRegistration { .. } => "pool_registration",
            Self::PoolRetirement { .. } => "pool_retirement",
            Self::Other { name, .. } => name,
        }
    }
}
