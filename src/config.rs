//! Configuration management for powledger

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blockchain::pow::{PowError, ProofOfWork, TARGET_BITS};
use crate::blockchain::transaction::SUBSIDY;

/// Config file picked up from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "powledger.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory of the sled database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Proof-of-work difficulty
    #[serde(default = "default_target_bits")]
    pub target_bits: u32,

    /// Value minted by each coinbase transaction
    #[serde(default = "default_subsidy")]
    pub subsidy: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: default_data_dir(),
            target_bits: default_target_bits(),
            subsidy: default_subsidy(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/blockchain")
}

fn default_target_bits() -> u32 {
    TARGET_BITS
}

fn default_subsidy() -> u64 {
    SUBSIDY
}

impl Config {
    /// Loads the configuration
    ///
    /// An explicit `path` must exist. Without one, `powledger.toml` in the
    /// working directory is used if present, and defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.exists() {
                    return Ok(Config::default());
                }
                fallback
            }
        };

        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;

        Config::from_toml_str(&contents)
    }

    /// Parses and validates a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate critical values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_dir must be set".to_string()));
        }

        if self.target_bits == 0 || self.target_bits >= 256 {
            return Err(ConfigError::Invalid(format!(
                "target_bits must be in 1..=255, got {}",
                self.target_bits
            )));
        }

        if self.subsidy == 0 {
            return Err(ConfigError::Invalid("subsidy must be positive".to_string()));
        }

        Ok(())
    }

    pub fn proof_of_work(&self) -> Result<ProofOfWork, PowError> {
        ProofOfWork::new(self.target_bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.data_dir, PathBuf::from("data/blockchain"));
        assert_eq!(config.target_bits, 24);
        assert_eq!(config.subsidy, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml_str("target_bits = 12\n").unwrap();
        assert_eq!(config.target_bits, 12);
        assert_eq!(config.subsidy, 10);
        assert_eq!(config.proof_of_work().unwrap().target_bits(), 12);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            Config::from_toml_str("target_bits = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml_str("subsidy = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml_str("data_dir = \"\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml_str("target_bits = \"hard\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.toml");
        fs::write(&path, "data_dir = \"/tmp/ledger\"\nsubsidy = 25\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/ledger"));
        assert_eq!(config.subsidy, 25);
        assert_eq!(config.target_bits, 24);
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = TempDir::new().unwrap();
        let result = Config::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
