//! Signer configuration, parsed from a TOML file plus environment overrides.
//!
//! Priority: environment variables > config file > defaults.

use anyhow::{Context, Result};
use bitcoin::Network;
use cosign_core::parse_network;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub signer: SignerSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerSection {
    /// "bitcoin", "testnet", "signet" or "regtest"
    #[serde(default = "default_network")]
    pub network: String,

    /// Directory holding `invoices.json`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for SignerSection {
    fn default() -> Self {
        Self {
            network: default_network(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

fn default_network() -> String {
    "bitcoin".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("cosign-data")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl CliConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: CliConfig = toml::from_str(&contents).context("Failed to parse TOML config")?;
        Ok(config)
    }

    /// Apply `COSIGN_NETWORK`, `COSIGN_DATA_DIR` and `COSIGN_LOG_LEVEL`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("COSIGN_NETWORK") {
            self.signer.network = v;
        }
        if let Ok(v) = std::env::var("COSIGN_DATA_DIR") {
            self.signer.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("COSIGN_LOG_LEVEL") {
            self.signer.log_level = v;
        }
    }

    pub fn network(&self) -> Result<Network> {
        parse_network(&self.signer.network).context("signer.network is invalid")
    }

    pub fn validate(&self) -> Result<()> {
        self.network()?;
        anyhow::ensure!(
            !self.signer.data_dir.as_os_str().is_empty(),
            "signer.data_dir must not be empty"
        );
        anyhow::ensure!(
            matches!(
                self.signer.log_level.to_ascii_lowercase().as_str(),
                "error" | "warn" | "info" | "debug" | "trace" | "off"
            ),
            "signer.log_level must be one of error, warn, info, debug, trace, off"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(toml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", toml).unwrap();
        file
    }

    #[test]
    fn test_parse_empty_config() {
        let file = write_config("");
        let config = CliConfig::from_file(file.path()).unwrap();
        assert_eq!(config.signer.network, "bitcoin");
        assert_eq!(config.signer.data_dir, PathBuf::from("cosign-data"));
        assert_eq!(config.signer.log_level, "info");
        assert_eq!(config.network().unwrap(), Network::Bitcoin);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let file = write_config(
            r#"
[signer]
network = "regtest"
data_dir = "/var/lib/cosign"
log_level = "debug"
"#,
        );
        let config = CliConfig::from_file(file.path()).unwrap();
        assert_eq!(config.network().unwrap(), Network::Regtest);
        assert_eq!(config.signer.data_dir, PathBuf::from("/var/lib/cosign"));
        assert_eq!(config.signer.log_level, "debug");
    }

    #[test]
    fn test_env_overrides() {
        let file = write_config("[signer]\nnetwork = \"testnet\"\n");
        let mut config = CliConfig::from_file(file.path()).unwrap();

        std::env::set_var("COSIGN_NETWORK", "signet");
        std::env::set_var("COSIGN_DATA_DIR", "/env/data");
        config.apply_env_overrides();

        assert_eq!(config.network().unwrap(), Network::Signet);
        assert_eq!(config.signer.data_dir, PathBuf::from("/env/data"));

        std::env::remove_var("COSIGN_NETWORK");
        std::env::remove_var("COSIGN_DATA_DIR");
    }

    #[test]
    fn test_validation_failures() {
        let unknown_network = write_config("[signer]\nnetwork = \"liquid\"\n");
        let config = CliConfig::from_file(unknown_network.path()).unwrap();
        assert!(config.validate().is_err());

        let empty_dir = write_config("[signer]\ndata_dir = \"\"\n");
        let config = CliConfig::from_file(empty_dir.path()).unwrap();
        assert!(config.validate().is_err());

        let bad_level = write_config("[signer]\nlog_level = \"loud\"\n");
        let config = CliConfig::from_file(bad_level.path()).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(CliConfig::from_file(Path::new("/nonexistent/cosign.toml")).is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = CliConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let reparsed: CliConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(reparsed.signer.network, config.signer.network);
        assert_eq!(reparsed.signer.data_dir, config.signer.data_dir);
    }
}
