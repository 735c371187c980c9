//! # chainpipe-filter
//!
//! Chain-sync event filter stage for ChainPipe.
//!
//! Sits between a chain-sync source and any downstream stage and forwards
//! only the events that match the configured criteria: payment or stake
//! addresses, policy IDs, asset fingerprints and pool IDs.
//!
//! ## Architecture
//! ```text
//! source ──▶ input (mpsc, bounded)
//!                 │
//!                 ▼
//!          worker task (one per stage)
//!                 │  Matcher::evaluate → Pass / Drop
//!                 ▼
//!          output (mpsc, bounded) ──▶ downstream stage
//! ```

pub mod config;
pub mod matcher;
pub mod stage;

pub use config::{ConfigError, FilterBuilder, FilterConfig, FilterCriteria};
pub use matcher::{MatchOutcome, Matcher, Verdict};
pub use stage::{ChainSyncFilter, FilterMetrics};
