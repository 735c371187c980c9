//! Filter configuration and its fluent builder.
//!
//! # Example
//!
//! ```rust
//! use chainpipe_filter::FilterBuilder;
//!
//! let config = FilterBuilder::new()
//!     .addresses(["addr1qyqsyqcyq5rqwzqfpg9scrgwpugpzysnzs23v9ccrydpk8r9venks6t2ddkx6mn0wpchyum5w4m8w7re0fahclt707qqlr2pjq"])
//!     .pool_ids(["pool1zyg3zyg3zyg3zyg3zyg3zyg3zyg3zyg3zyg3zyg3zyg3zdqn7r6"])
//!     .build()
//!     .unwrap();
//! assert_eq!(config.criteria.addresses.len(), 1);
//! ```

use chainpipe_core::DEFAULT_CHANNEL_CAPACITY;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building or loading a filter configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Option '{option}' contains an empty value")]
    EmptyValue { option: String },

    #[error("Channel capacity must be at least 1")]
    ZeroCapacity,

    #[error("Unknown filter option '{name}'")]
    UnknownOption { name: String },

    #[error("Parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// The four match criteria. An empty list leaves that criterion inactive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// Payment or stake addresses (`addr…`, `stake…`)
    #[serde(default)]
    pub addresses: Vec<String>,
    /// CIP-14 asset fingerprints (`asset1…`)
    #[serde(default)]
    pub asset_fingerprints: Vec<String>,
    /// Hex policy IDs
    #[serde(default)]
    pub policy_ids: Vec<String>,
    /// Hex pool key hashes or bech32 pool IDs (`pool1…`)
    #[serde(default)]
    pub pool_ids: Vec<String>,
}

impl FilterCriteria {
    /// Returns `true` if no criterion is active, i.e. every event passes.
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
            && self.asset_fingerprints.is_empty()
            && self.policy_ids.is_empty()
            && self.pool_ids.is_empty()
    }

    fn lists(&self) -> [(&'static str, &[String]); 4] {
        [
            ("addresses", self.addresses.as_slice()),
            ("asset_fingerprints", self.asset_fingerprints.as_slice()),
            ("policy_ids", self.policy_ids.as_slice()),
            ("pool_ids", self.pool_ids.as_slice()),
        ]
    }
}

/// Configuration of a `ChainSyncFilter`. Fixed once the stage is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Label used in log spans and error messages
    #[serde(default = "default_label")]
    pub label: String,
    /// Capacity of the input and output channels
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(flatten)]
    pub criteria: FilterCriteria,
}

fn default_label() -> String {
    "filter.chainsync".into()
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
            channel_capacity: default_channel_capacity(),
            criteria: FilterCriteria::default(),
        }
    }
}

impl FilterConfig {
    /// Load and validate a configuration from YAML (JSON is valid YAML too).
    pub fn from_yaml(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        for (option, values) in self.criteria.lists() {
            if values.iter().any(|v| v.trim().is_empty()) {
                return Err(ConfigError::EmptyValue {
                    option: option.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Fluent builder for `FilterConfig`.
///
/// Each criteria setter replaces the whole list, so applying the same option
/// twice leaves the same configuration.
#[derive(Debug, Default)]
pub struct FilterBuilder {
    config: FilterConfig,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration, e.g. one loaded from a file.
    pub fn from_config(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.config.label = label.into();
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    pub fn addresses(mut self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.criteria.addresses = collect(values);
        self
    }

    pub fn asset_fingerprints(mut self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.criteria.asset_fingerprints = collect(values);
        self
    }

    pub fn policy_ids(mut self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.criteria.policy_ids = collect(values);
        self
    }

    pub fn pool_ids(mut self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.criteria.pool_ids = collect(values);
        self
    }

    /// Apply a named option whose value is a comma-separated list.
    ///
    /// A blank value clears the criterion.
    pub fn option(self, name: &str, value: &str) -> Result<Self, ConfigError> {
        let values = split_list(value);
        match name {
            "addresses" => Ok(self.addresses(values)),
            "asset_fingerprints" => Ok(self.asset_fingerprints(values)),
            "policy_ids" => Ok(self.policy_ids(values)),
            "pool_ids" => Ok(self.pool_ids(values)),
            other => Err(ConfigError::UnknownOption {
                name: other.to_string(),
            }),
        }
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<FilterConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn collect(values: impl IntoIterator<Item = impl Into<String>>) -> Vec<String> {
    values.into_iter().map(Into::into).collect()
}

fn split_list(value: &str) -> Vec<String> {
    if value.trim().is_empty() {
        return vec![];
    }
    value.split(',').map(|v| v.trim().to_string()).collect()
}
