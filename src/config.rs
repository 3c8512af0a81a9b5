//! TOML configuration for constructing a [`crate::store::Store`] and
//! [`crate::event::EventEngine`] (spec.md §1, §6).
//!
//! Grounded on the teacher's `server/src/config/cfgfile.rs`
//! (`#[derive(Deserialize)]` structs parsed with `toml::from_str`) and
//! `cfgerr.rs` (hand-rolled error type, reused here as [`crate::error::Error`]
//! rather than a second bespoke enum). Per spec.md §1 Non-goals we do not
//! reproduce the original ini-style syntax byte-for-byte — TOML is the
//! teacher's own format and is what we carry forward.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// `[store]` section: the three parameters a `Store` is constructed with.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// `K`: fixed key length in bytes.
    pub key_len: usize,
    /// `B`: bits consumed per trie level.
    #[serde(default = "default_bits_per_level")]
    pub bits_per_level: u8,
    /// `L`: lifespan in seconds before an entry is expiry-eligible, and also
    /// the maintenance pass's cadence (spec.md §4.1: "Cadence is one cycle
    /// every `L` seconds").
    #[serde(default = "default_lifespan_secs")]
    pub lifespan_secs: u64,
}

fn default_bits_per_level() -> u8 {
    8
}

fn default_lifespan_secs() -> u64 {
    60
}

impl StoreConfig {
    pub fn lifespan(&self) -> Duration {
        Duration::from_secs(self.lifespan_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.key_len == 0 {
            return Err(Error::ConfigValue("store.key_len must be nonzero"));
        }
        if self.bits_per_level == 0 || self.bits_per_level > 8 {
            return Err(Error::ConfigValue(
                "store.bits_per_level must be between 1 and 8",
            ));
        }
        if self.lifespan_secs == 0 {
            return Err(Error::ConfigValue("store.lifespan_secs must be nonzero"));
        }
        Ok(())
    }
}

/// `[event]` section: worker pool sizing for an `EventEngine`.
#[derive(Debug, Clone, Deserialize)]
pub struct EventConfig {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// How often the listener-list maintenance pass runs.
    #[serde(default = "default_maintenance_period_secs")]
    pub maintenance_period_secs: u64,
}

fn default_worker_count() -> usize {
    4
}

fn default_maintenance_period_secs() -> u64 {
    5
}

impl EventConfig {
    pub fn maintenance_period(&self) -> Duration {
        Duration::from_secs(self.maintenance_period_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(Error::ConfigValue("event.worker_count must be nonzero"));
        }
        if self.maintenance_period_secs == 0 {
            return Err(Error::ConfigValue(
                "event.maintenance_period_secs must be nonzero",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub event: EventConfig,
}

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.store.validate()?;
        config.event.validate()?;
        Ok(config)
    }

    /// Read and parse a config file from disk.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = crate::fileutil::read_to_string(path)?;
        Self::from_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
        [store]
        key_len = 16
        bits_per_level = 4
        lifespan_secs = 300

        [event]
        worker_count = 8
    "#;

    #[test]
    fn parses_valid_config() {
        let config = Config::from_str(VALID).unwrap();
        assert_eq!(config.store.key_len, 16);
        assert_eq!(config.store.bits_per_level, 4);
        assert_eq!(config.event.worker_count, 8);
    }

    #[test]
    fn defaults_fill_in_missing_fields() {
        let config = Config::from_str(
            r#"
            [store]
            key_len = 8

            [event]
            "#,
        )
        .unwrap();
        assert_eq!(config.store.bits_per_level, 8);
        assert_eq!(config.store.lifespan_secs, 60);
        assert_eq!(config.event.worker_count, 4);
        assert_eq!(config.event.maintenance_period_secs, 5);
    }

    #[test]
    fn rejects_zero_key_len() {
        let err = Config::from_str(
            r#"
            [store]
            key_len = 0

            [event]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ConfigValue(_)));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = Config::from_str("not valid toml [[[").unwrap_err();
        assert!(matches!(err, Error::ConfigSyntax(_)));
    }
}
