//! # chainpipe-output
//!
//! Terminal stages: they consume events and hand them to the outside world
//! instead of forwarding them to another stage.
//!
//! - [`LogOutput`] renders each event as a JSON line through `tracing`.

pub mod log;

pub use log::{LogLevel, LogOutput, LogOutputConfig, OutputConfigError};
