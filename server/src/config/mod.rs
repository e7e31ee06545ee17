//! Runtime configuration, read from the environment.
//!
//! `.env` files are loaded by `main` through `dotenvy` before [`Config::from_env`]
//! runs. An optional JSON secrets file (`ORACLE_SECRETS_FILE`) may supply the
//! late-airline override and the ledger mnemonic; explicit environment
//! variables take precedence over it.

use std::env;
use std::fmt::Display;
use std::fs;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::consensus::DEFAULT_THRESHOLD;
use crate::error::ConfigError;
use crate::ledger::simulated::{DEFAULT_ACCOUNT_COUNT, DEFAULT_MNEMONIC};
use crate::logging::LogFormat;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";
pub const DEFAULT_ORACLE_COUNT: usize = 40;
pub const DEFAULT_RESERVED_ACCOUNTS: usize = 6;
pub const DEFAULT_ROUND_TIMEOUT_SECONDS: u64 = 60;
pub const DEFAULT_ROUND_HISTORY: usize = 100;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerConfig {
    Simulated {
        mnemonic: String,
        accounts: usize,
        seed: Option<u64>,
    },
    Rpc {
        url: String,
        poll_interval: Duration,
    },
}

impl LedgerConfig {
    pub fn mode(&self) -> &'static str {
        match self {
            LedgerConfig::Simulated { .. } => "simulated",
            LedgerConfig::Rpc { .. } => "rpc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub oracle_count: usize,
    /// Leading accounts kept for the owner/airline and passengers.
    pub reserved_accounts: usize,
    pub force_late_airline: bool,
    pub consensus_threshold: u32,
    pub round_timeout: Duration,
    pub round_history: usize,
    pub log_level: String,
    pub log_format: LogFormat,
    pub ledger: LedgerConfig,
}

/// Contents of `ORACLE_SECRETS_FILE`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OracleSecrets {
    #[serde(default)]
    force_late_airline: Option<bool>,
    #[serde(default)]
    mnemonic: Option<String>,
}

impl OracleSecrets {
    fn load(path: &str) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::SecretsFile {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::SecretsFile {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let secrets = match get("ORACLE_SECRETS_FILE") {
            Some(path) => OracleSecrets::load(&path)?,
            None => OracleSecrets::default(),
        };

        let force_late_airline = match get("FORCE_LATE_AIRLINE") {
            Some(value) => parse_bool("FORCE_LATE_AIRLINE", &value)?,
            None => secrets.force_late_airline.unwrap_or(false),
        };

        let consensus_threshold: u32 =
            parse_or(&get, "CONSENSUS_THRESHOLD", DEFAULT_THRESHOLD)?;
        if consensus_threshold == 0 {
            return Err(invalid("CONSENSUS_THRESHOLD", "0", "must be at least 1"));
        }

        let reserved_accounts = parse_or(&get, "RESERVED_ACCOUNTS", DEFAULT_RESERVED_ACCOUNTS)?;
        if reserved_accounts == 0 {
            return Err(invalid(
                "RESERVED_ACCOUNTS",
                "0",
                "the first account is the airline",
            ));
        }

        let round_timeout_seconds: u64 =
            parse_or(&get, "ROUND_TIMEOUT_SECONDS", DEFAULT_ROUND_TIMEOUT_SECONDS)?;
        if round_timeout_seconds == 0 {
            return Err(invalid("ROUND_TIMEOUT_SECONDS", "0", "must be positive"));
        }

        let log_format = match get("LOG_FORMAT") {
            Some(value) => value
                .parse::<LogFormat>()
                .map_err(|reason| invalid("LOG_FORMAT", &value, reason))?,
            None => LogFormat::default(),
        };

        let ledger = match get("LEDGER_MODE").as_deref() {
            None | Some("simulated") => LedgerConfig::Simulated {
                mnemonic: get("LEDGER_MNEMONIC")
                    .or(secrets.mnemonic)
                    .unwrap_or_else(|| DEFAULT_MNEMONIC.to_string()),
                accounts: parse_or(&get, "LEDGER_ACCOUNTS", DEFAULT_ACCOUNT_COUNT)?,
                seed: get("LEDGER_SEED")
                    .map(|value| parse_value("LEDGER_SEED", &value))
                    .transpose()?,
            },
            Some("rpc") => LedgerConfig::Rpc {
                url: get("LEDGER_RPC_URL").ok_or(ConfigError::Missing("LEDGER_RPC_URL"))?,
                poll_interval: Duration::from_millis(parse_or(
                    &get,
                    "LEDGER_POLL_INTERVAL_MS",
                    DEFAULT_POLL_INTERVAL_MS,
                )?),
            },
            Some(other) => {
                return Err(invalid(
                    "LEDGER_MODE",
                    other,
                    "expected \"simulated\" or \"rpc\"",
                ))
            }
        };

        Ok(Self {
            port: parse_or(&get, "PORT", DEFAULT_PORT)?,
            cors_allowed_origins: get("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|| DEFAULT_CORS_ORIGIN.to_string())
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
            oracle_count: parse_or(&get, "ORACLE_COUNT", DEFAULT_ORACLE_COUNT)?,
            reserved_accounts,
            force_late_airline,
            consensus_threshold,
            round_timeout: Duration::from_secs(round_timeout_seconds),
            round_history: parse_or(&get, "ROUND_HISTORY", DEFAULT_ROUND_HISTORY)?,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format,
            ledger,
        })
    }
}

fn invalid(key: &'static str, value: &str, reason: impl Display) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_value<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse().map_err(|e| invalid(key, value, e))
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => parse_value(key, &value),
        None => Ok(default),
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value, "expected a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    fn secrets_file(contents: &str) -> String {
        let path = env::temp_dir().join(format!("oracle-secrets-{}.json", uuid::Uuid::new_v4()));
        fs::write(&path, contents).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn defaults_match_the_local_network() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.cors_allowed_origins, vec!["http://localhost:3000"]);
        assert_eq!(config.oracle_count, 40);
        assert_eq!(config.reserved_accounts, 6);
        assert!(!config.force_late_airline);
        assert_eq!(config.consensus_threshold, 3);
        assert_eq!(config.round_timeout, Duration::from_secs(60));
        assert_eq!(config.round_history, 100);
        assert_eq!(config.log_format, LogFormat::Human);
        assert_eq!(
            config.ledger,
            LedgerConfig::Simulated {
                mnemonic: DEFAULT_MNEMONIC.to_string(),
                accounts: 200,
                seed: None,
            }
        );
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = config(&[
            ("PORT", "8080"),
            ("CORS_ALLOWED_ORIGINS", "http://a.test, http://b.test,"),
            ("FORCE_LATE_AIRLINE", "true"),
            ("ROUND_TIMEOUT_SECONDS", "5"),
            ("LOG_FORMAT", "json"),
            ("LEDGER_MODE", "rpc"),
            ("LEDGER_RPC_URL", "http://127.0.0.1:8545"),
            ("LEDGER_POLL_INTERVAL_MS", "250"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.cors_allowed_origins, vec!["http://a.test", "http://b.test"]);
        assert!(config.force_late_airline);
        assert_eq!(config.round_timeout, Duration::from_secs(5));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.ledger.mode(), "rpc");
        assert_eq!(
            config.ledger,
            LedgerConfig::Rpc {
                url: "http://127.0.0.1:8545".to_string(),
                poll_interval: Duration::from_millis(250),
            }
        );
    }

    #[test]
    fn invalid_values_are_reported_by_key() {
        match config(&[("ORACLE_COUNT", "lots")]) {
            Err(ConfigError::Invalid { key, value, .. }) => {
                assert_eq!(key, "ORACLE_COUNT");
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            config(&[("CONSENSUS_THRESHOLD", "0")]),
            Err(ConfigError::Invalid { key: "CONSENSUS_THRESHOLD", .. })
        ));
        assert!(matches!(
            config(&[("FORCE_LATE_AIRLINE", "maybe")]),
            Err(ConfigError::Invalid { key: "FORCE_LATE_AIRLINE", .. })
        ));
        assert!(matches!(
            config(&[("LEDGER_MODE", "ganache")]),
            Err(ConfigError::Invalid { key: "LEDGER_MODE", .. })
        ));
        assert!(matches!(
            config(&[("LEDGER_MODE", "rpc")]),
            Err(ConfigError::Missing("LEDGER_RPC_URL"))
        ));
    }

    #[test]
    fn secrets_file_fills_in_and_environment_wins() {
        let path = secrets_file(r#"{"forceLateAirline": true, "mnemonic": "secret words"}"#);

        let from_file = config(&[("ORACLE_SECRETS_FILE", &path), ("LEDGER_SEED", "7")]).unwrap();
        assert!(from_file.force_late_airline);
        assert_eq!(
            from_file.ledger,
            LedgerConfig::Simulated {
                mnemonic: "secret words".to_string(),
                accounts: 200,
                seed: Some(7),
            }
        );

        let overridden = config(&[
            ("ORACLE_SECRETS_FILE", &path),
            ("FORCE_LATE_AIRLINE", "false"),
            ("LEDGER_MNEMONIC", "env words"),
        ])
        .unwrap();
        assert!(!overridden.force_late_airline);
        assert!(matches!(
            overridden.ledger,
            LedgerConfig::Simulated { ref mnemonic, .. } if mnemonic == "env words"
        ));

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn unreadable_secrets_file_fails() {
        assert!(matches!(
            config(&[("ORACLE_SECRETS_FILE", "/nonexistent/secrets.json")]),
            Err(ConfigError::SecretsFile { .. })
        ));

        let path = secrets_file("not json");
        assert!(matches!(
            config(&[("ORACLE_SECRETS_FILE", &path)]),
            Err(ConfigError::SecretsFile { .. })
        ));
        fs::remove_file(path).unwrap();
    }
}
