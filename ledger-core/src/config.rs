//! Configuration management
//!
//! Settings live in `settings.json` inside the ledger directory:
//! ```json
//! {
//!   "maxCasAttempts": 5,
//!   "compensationAttempts": 10,
//!   "compensationBackoffMs": 50,
//!   "accountNumberAttempts": 16,
//!   "pinScheme": "sha256",
//!   "argon2": { "memoryCost": 19456, "timeCost": 2, "parallelism": 1, "hashLen": 32 }
//! }
//! ```
//! Every key is optional. A few values can also be overridden from the
//! environment (see [`Config::load`]).

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::result::Error;

pub const DEFAULT_MAX_CAS_ATTEMPTS: u32 = 5;
pub const DEFAULT_COMPENSATION_ATTEMPTS: u32 = 10;
pub const DEFAULT_COMPENSATION_BACKOFF_MS: u64 = 50;
pub const DEFAULT_ACCOUNT_NUMBER_ATTEMPTS: u32 = 16;

/// Upper bound for a single compensation backoff step
pub const MAX_COMPENSATION_BACKOFF: Duration = Duration::from_secs(1);

pub const SETTINGS_FILE: &str = "settings.json";

/// How new PIN hashes are produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinScheme {
    /// Unsalted hex SHA-256, compatible with existing ledgers
    #[default]
    Sha256,
    /// Salted Argon2id
    Argon2id,
}

impl PinScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            PinScheme::Sha256 => "sha256",
            PinScheme::Argon2id => "argon2id",
        }
    }
}

impl fmt::Display for PinScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PinScheme {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" => Ok(PinScheme::Sha256),
            "argon2id" | "argon2" => Ok(PinScheme::Argon2id),
            other => Err(Error::Config(format!("unknown PIN scheme '{}'", other))),
        }
    }
}

/// Argon2id cost parameters for PIN hashing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Argon2Params {
    /// Memory cost in KiB
    pub memory_cost: u32,
    pub time_cost: u32,
    pub parallelism: u32,
    pub hash_len: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_cost: 19456, // 19 MiB
            time_cost: 2,
            parallelism: 1,
            hash_len: 32,
        }
    }
}

/// Ledger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Compare-and-set attempts per balance mutation
    pub max_cas_attempts: u32,
    /// Attempts to restore a debited source after a failed credit
    pub compensation_attempts: u32,
    /// First compensation backoff step, doubled per attempt
    pub compensation_backoff_ms: u64,
    /// Random draws when allocating an account number
    pub account_number_attempts: u32,
    pub pin_scheme: PinScheme,
    pub argon2: Argon2Params,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_cas_attempts: DEFAULT_MAX_CAS_ATTEMPTS,
            compensation_attempts: DEFAULT_COMPENSATION_ATTEMPTS,
            compensation_backoff_ms: DEFAULT_COMPENSATION_BACKOFF_MS,
            account_number_attempts: DEFAULT_ACCOUNT_NUMBER_ATTEMPTS,
            pin_scheme: PinScheme::default(),
            argon2: Argon2Params::default(),
        }
    }
}

impl Config {
    /// Load config from the ledger directory
    ///
    /// A missing settings file means defaults. Environment overrides:
    /// 1. `LEDGER_PIN_SCHEME` (`sha256` or `argon2id`)
    /// 2. `LEDGER_MAX_CAS_ATTEMPTS`
    /// 3. `LEDGER_COMPENSATION_ATTEMPTS`
    pub fn load(ledger_dir: &Path) -> Result<Self> {
        let settings_path = ledger_dir.join(SETTINGS_FILE);

        let mut config: Config = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)
                .with_context(|| format!("Failed to read {}", settings_path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid settings in {}", settings_path.display()))?
        } else {
            Config::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment-style overrides from a lookup function
    pub fn apply_overrides<F>(&mut self, lookup: F) -> crate::domain::result::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(scheme) = lookup("LEDGER_PIN_SCHEME") {
            self.pin_scheme = scheme.parse()?;
        }
        if let Some(value) = lookup("LEDGER_MAX_CAS_ATTEMPTS") {
            self.max_cas_attempts = parse_count("LEDGER_MAX_CAS_ATTEMPTS", &value)?;
        }
        if let Some(value) = lookup("LEDGER_COMPENSATION_ATTEMPTS") {
            self.compensation_attempts = parse_count("LEDGER_COMPENSATION_ATTEMPTS", &value)?;
        }
        Ok(())
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> crate::domain::result::Result<()> {
        let counts = [
            ("maxCasAttempts", self.max_cas_attempts),
            ("compensationAttempts", self.compensation_attempts),
            ("accountNumberAttempts", self.account_number_attempts),
            ("argon2.timeCost", self.argon2.time_cost),
            ("argon2.parallelism", self.argon2.parallelism),
        ];
        for (key, value) in counts {
            if value == 0 {
                return Err(Error::Config(format!("{} must be at least 1", key)));
            }
        }
        if self.argon2.hash_len < 16 {
            return Err(Error::Config("argon2.hashLen must be at least 16".into()));
        }
        Ok(())
    }

    /// Save config to the ledger directory
    pub fn save(&self, ledger_dir: &Path) -> Result<()> {
        let settings_path = ledger_dir.join(SETTINGS_FILE);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&settings_path, content)
            .with_context(|| format!("Failed to write {}", settings_path.display()))?;
        Ok(())
    }

    /// First compensation backoff step, never above [`MAX_COMPENSATION_BACKOFF`]
    pub fn compensation_backoff(&self) -> Duration {
        Duration::from_millis(self.compensation_backoff_ms).min(MAX_COMPENSATION_BACKOFF)
    }
}

fn parse_count(key: &str, value: &str) -> crate::domain::result::Result<u32> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|_| Error::Config(format!("{} must be a positive integer, got '{}'", key, value)))
}
