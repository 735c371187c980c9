//! # chainpipe-core
//!
//! Core types shared by every ChainPipe stage: the chain-sync event model,
//! ledger primitives (key hashes, addresses, certificates, native assets),
//! bech32 / asset-fingerprint helpers, and the `Stage` contract with its
//! lifecycle.

pub mod address;
pub mod certificate;
pub mod codec;
pub mod error;
pub mod event;
pub mod ledger;
pub mod stage;

pub use address::Address;
pub use certificate::Certificate;
pub use codec::{asset_fingerprint, decode_bech32, encode_bech32};
pub use error::{LedgerError, StageError};
pub use event::{BlockEvent, Event, EventContext, Payload, RollbackEvent, TransactionEvent, TxOutput};
pub use ledger::{AssetName, Blake2b224, CredentialKind, MultiAsset, PolicyId, PoolKeyHash, StakeCredential};
pub use stage::{ForwardingStage, Stage, StageState, DEFAULT_CHANNEL_CAPACITY};
