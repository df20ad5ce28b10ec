//! Cosign: headless signer for 2-of-2 user/muun wallets
//!
//! Reads one JSON request file per invocation and prints a JSON response.
//!
//! # Usage
//!
//! ```bash
//! cosign --config cosign.toml address request.json
//! cosign nonces request.json      # round one for Taproot inputs
//! cosign sign request.json        # with the cosigner's material attached
//! cosign verify request.json
//! ```

mod commands;
mod config;

use anyhow::{Context, Result};
use cosign_tx::{JsonInvoiceStore, SigningContext, UnavailableSphinxValidator};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

fn read_request<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file: {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse request file: {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut positional = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                if i < args.len() {
                    config_path = Some(PathBuf::from(&args[i]));
                } else {
                    anyhow::bail!("--config requires a path argument");
                }
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--version" | "-V" => {
                println!("cosign {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            other if other.starts_with('-') => {
                anyhow::bail!("Unknown argument: {}", other);
            }
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    let mut cli_config = match &config_path {
        Some(path) => config::CliConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => config::CliConfig::default(),
    };
    cli_config.apply_env_overrides();
    cli_config
        .validate()
        .context("Configuration validation failed")?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(cli_config.signer.log_level.as_str()),
    )
    .init();

    let network = cli_config.network()?;
    let (command, request_path) = match positional.as_slice() {
        [command] if command == "validate" => {
            println!("Configuration is valid.");
            println!("  Network:   {}", network);
            println!("  Data dir:  {}", cli_config.signer.data_dir.display());
            println!("  Log level: {}", cli_config.signer.log_level);
            return Ok(());
        }
        [command, path] => (command.as_str(), PathBuf::from(path)),
        _ => {
            print_help();
            anyhow::bail!("Expected a command and a request file");
        }
    };

    let invoices = JsonInvoiceStore::new(&cli_config.signer.data_dir);
    let sphinx = UnavailableSphinxValidator;
    let ctx = SigningContext::new(network, &invoices, &sphinx);

    match command {
        "address" => {
            let request = read_request(&request_path)?;
            print_json(&commands::address(&request, network)?)
        }
        "nonces" => {
            let request = read_request(&request_path)?;
            print_json(&commands::nonces(&request, network)?)
        }
        "sign" => {
            let request = read_request(&request_path)?;
            let signed = commands::sign(&request, &ctx).context("Signing failed")?;
            print_json(&signed)
        }
        "fully-sign" => {
            let request = read_request(&request_path)?;
            let signed = commands::fully_sign(&request, &ctx).context("Signing failed")?;
            print_json(&signed)
        }
        "verify" => {
            let request = read_request(&request_path)?;
            commands::verify(&request, network).context("Verification failed")?;
            println!("ok");
            Ok(())
        }
        other => anyhow::bail!("Unknown command: {}", other),
    }
}

fn print_help() {
    println!(
        r#"Cosign: headless signer for 2-of-2 user/muun wallets

USAGE:
    cosign [OPTIONS] <COMMAND> <REQUEST.json>

COMMANDS:
    address       Derive a wallet address
    nonces        Start MuSig2 sessions for a transaction's inputs
    sign          Add the user's signatures to a transaction
    fully-sign    Sign with both private keys (recovery)
    verify        Check a transaction's outputs against expectations
    validate      Validate the configuration and exit

OPTIONS:
    -c, --config <PATH>   Config file path
    -h, --help            Show this help message
    -V, --version         Show version

ENVIRONMENT VARIABLES (override config file):
    COSIGN_NETWORK        Bitcoin network (bitcoin/testnet/signet/regtest)
    COSIGN_DATA_DIR       Directory holding invoices.json
    COSIGN_LOG_LEVEL      Log level (error/warn/info/debug/trace)
"#
    );
}
