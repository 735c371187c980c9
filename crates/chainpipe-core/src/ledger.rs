//! Ledger primitives: key hashes, stake credentials and multi-asset bundles.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::LedgerError;

// ─── Blake2b224 ───────────────────────────────────────────────────────────────

const BLAKE2B224_LEN: usize = 28;

/// A 28-byte Blake2b-224 hash: key hashes, script hashes, pool IDs, policy IDs.
///
/// Displays and serializes as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Blake2b224([u8; BLAKE2B224_LEN]);

/// Policy identifier of a native asset.
pub type PolicyId = Blake2b224;
/// Hash of a stake pool operator's cold key.
pub type PoolKeyHash = Blake2b224;

impl Blake2b224 {
    pub const LEN: usize = BLAKE2B224_LEN;

    pub const fn new(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, LedgerError> {
        let arr: [u8; Self::LEN] = bytes.try_into().map_err(|_| LedgerError::Length {
            expected: Self::LEN,
            got: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Blake2b224 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Blake2b224 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blake2b224({})", self.to_hex())
    }
}

impl FromStr for Blake2b224 {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slice(&hex::decode(s)?)
    }
}

impl Serialize for Blake2b224 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Blake2b224 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ─── StakeCredential ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    KeyHash,
    ScriptHash,
}

/// A stake credential as carried by registration/delegation certificates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StakeCredential {
    pub kind: CredentialKind,
    pub hash: Blake2b224,
}

impl StakeCredential {
    pub fn key_hash(hash: Blake2b224) -> Self {
        Self {
            kind: CredentialKind::KeyHash,
            hash,
        }
    }

    pub fn script_hash(hash: Blake2b224) -> Self {
        Self {
            kind: CredentialKind::ScriptHash,
            hash,
        }
    }

    pub fn hash(&self) -> &Blake2b224 {
        &self.hash
    }
}

// ─── Multi-asset bundles ──────────────────────────────────────────────────────

/// Raw asset name bytes (0..=32 bytes). Serializes as hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AssetName(Vec<u8>);

impl AssetName {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for AssetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl Serialize for AssetName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for AssetName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map(Self).map_err(serde::de::Error::custom)
    }
}

/// Native assets held by an output: policy ID → asset name → quantity.
///
/// Keeps the order in which the upstream decoder reported the policies.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MultiAsset(IndexMap<PolicyId, IndexMap<AssetName, u64>>);

impl MultiAsset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `quantity` of an asset, accumulating onto any existing entry.
    pub fn insert(&mut self, policy: PolicyId, name: AssetName, quantity: u64) {
        let entry = self.0.entry(policy).or_default().entry(name).or_insert(0);
        *entry = entry.saturating_add(quantity);
    }

    pub fn policies(&self) -> impl Iterator<Item = &PolicyId> {
        self.0.keys()
    }

    /// Asset names under `policy`, empty if the policy is not present.
    pub fn assets<'a>(&'a self, policy: &PolicyId) -> impl Iterator<Item = &'a AssetName> + 'a {
        self.0.get(policy).into_iter().flat_map(|names| names.keys())
    }

    pub fn quantity(&self, policy: &PolicyId, name: &AssetName) -> Option<u64> {
        self.0.get(policy)?.get(name).copied()
    }

    /// Every `(policy, asset name)` pair in the bundle.
    pub fn iter(&self) -> impl Iterator<Item = (&PolicyId, &AssetName)> {
        self.0
            .iter()
            .flat_map(|(policy, names)| names.keys().map(move |name| (policy, name)))
    }
}
