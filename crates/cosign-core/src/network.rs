//! Network name parsing shared by the library and the CLI config.

use bitcoin::Network;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown network: {0}")]
pub struct NetworkError(pub String);

/// Parse "bitcoin"/"mainnet", "testnet", "signet" or "regtest".
pub fn parse_network(name: &str) -> Result<Network, NetworkError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "bitcoin" | "mainnet" => Ok(Network::Bitcoin),
        "testnet" | "testnet3" => Ok(Network::Testnet),
        "signet" => Ok(Network::Signet),
        "regtest" => Ok(Network::Regtest),
        other => Err(NetworkError(other.to_string())),
    }
}
