//! # chainpipe-observability
//!
//! Structured logging for ChainPipe binaries.
//!
//! Stages log through `tracing` macros; this crate installs the subscriber
//! that renders them as human-readable text or JSON lines (ELK, Loki,
//! CloudWatch). Levels are configurable globally and per component.

pub mod tracing_setup;

pub use tracing_setup::{init_tracing, LogConfig};
