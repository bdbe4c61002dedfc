use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde::Serialize;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config path={path:?}, source_error={source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] toml::de::Error),
    #[error("invalid config field={field}, {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Engine tunables, loaded once at startup and handed to [`crate::engine::TransferEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    /// Largest amount a single transfer, earn or spend may move.
    pub max_transfer_amount: Decimal,
    /// Attempts at crediting the recipient after the sender was debited.
    pub credit_retry_attempts: u32,
    /// Attempts at any other store call hitting a transient error.
    pub store_retry_attempts: u32,
    /// Base backoff between attempts, doubled on each retry.
    pub retry_backoff_ms: u64,
    pub max_page_size: usize,
    /// Fallback filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_transfer_amount: Decimal::from(1_000_000),
            credit_retry_attempts: 3,
            store_retry_attempts: 3,
            retry_backoff_ms: 10,
            max_page_size: 100,
            log_level: "info".to_owned(),
        }
    }
}

impl LedgerConfig {
    /// Reads and validates a TOML config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()
    }

    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.max_transfer_amount <= Decimal::ZERO {
            return Err(invalid("max_transfer_amount", "must be greater than zero"));
        }
        if self.credit_retry_attempts == 0 {
            return Err(invalid("credit_retry_attempts", "must be at least 1"));
        }
        if self.store_retry_attempts == 0 {
            return Err(invalid("store_retry_attempts", "must be at least 1"));
        }
        if self.max_page_size == 0 {
            return Err(invalid("max_page_size", "must be at least 1"));
        }
        Ok(self)
    }

    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn from_toml_str_fills_missing_keys_with_defaults() {
        let config = LedgerConfig::from_toml_str("max_transfer_amount = 500\nretry_backoff_ms = 0").unwrap();
        assert_eq!(
            config,
            LedgerConfig {
                max_transfer_amount: Decimal::from(500),
                retry_backoff_ms: 0,
                ..LedgerConfig::default()
            }
        );
    }

    #[test]
    fn from_toml_str_accepts_fractional_ceiling_as_string() {
        let config = LedgerConfig::from_toml_str("max_transfer_amount = \"12.5\"").unwrap();
        assert_eq!(config.max_transfer_amount, Decimal::new(125, 1));
    }

    #[rstest]
    #[case("max_transfer_amount = 0", "max_transfer_amount")]
    #[case("credit_retry_attempts = 0", "credit_retry_attempts")]
    #[case("store_retry_attempts = 0", "store_retry_attempts")]
    #[case("max_page_size = 0", "max_page_size")]
    fn from_toml_str_returns_the_expected_invalid_field(#[case] raw: &str, #[case] expected: &str) {
        assert2::let_assert!(Err(ConfigError::Invalid { field, .. }) = LedgerConfig::from_toml_str(raw));
        assert_eq!(field, expected);
    }

    #[test]
    fn from_toml_str_rejects_unknown_keys() {
        assert2::let_assert!(Err(ConfigError::Parse(error)) = LedgerConfig::from_toml_str("max_tip = 3"));
        assert!(error.to_string().contains("unknown field"), "error={error}");
    }
}
