//! Invoice secrets: what the wallet kept when it issued a Lightning invoice.
//!
//! Incoming swaps look these up by payment hash to recover the preimage and
//! the key path the HTLC keys were derived from.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

use crate::serde_helpers::hex_bytes;

/// File name of the JSON store inside the data directory.
pub const INVOICES_FILE: &str = "invoices.json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSecrets {
    #[serde(with = "hex_bytes")]
    pub payment_hash: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub preimage: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub payment_secret: Vec<u8>,
    /// Parent path of the invoice keys: `/0` is the node identity key and
    /// `/1` the HTLC key.
    pub key_path: String,
    /// Zero for amountless invoices.
    #[serde(default)]
    pub amount_sat: u64,
}

/// Lookup of invoice secrets by payment hash.
pub trait InvoiceSecretStore {
    fn find_by_payment_hash(&self, payment_hash: &[u8]) -> Result<Option<InvoiceSecrets>, StoreError>;
}

/// In-memory store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryInvoiceStore {
    invoices: RwLock<HashMap<Vec<u8>, InvoiceSecrets>>,
}

impl MemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, secrets: InvoiceSecrets) -> Result<(), StoreError> {
        let mut invoices = self.invoices.write().map_err(|_| StoreError::Poisoned)?;
        invoices.insert(secrets.payment_hash.clone(), secrets);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.invoices.read().map(|i| i.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl InvoiceSecretStore for MemoryInvoiceStore {
    fn find_by_payment_hash(&self, payment_hash: &[u8]) -> Result<Option<InvoiceSecrets>, StoreError> {
        let invoices = self.invoices.read().map_err(|_| StoreError::Poisoned)?;
        Ok(invoices.get(payment_hash).cloned())
    }
}

/// JSON-file store at `<data_dir>/invoices.json`.
///
/// The file holds an array of [`InvoiceSecrets`]. It is read on every lookup
/// so invoices issued by another process show up without a restart.
#[derive(Debug, Clone)]
pub struct JsonInvoiceStore {
    path: PathBuf,
}

impl JsonInvoiceStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(INVOICES_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored invoices; a missing file is an empty store.
    pub fn load(&self) -> Result<Vec<InvoiceSecrets>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Add or replace the invoice with the same payment hash.
    pub fn save(&self, secrets: InvoiceSecrets) -> Result<(), StoreError> {
        let mut invoices = self.load()?;
        invoices.retain(|i| i.payment_hash != secrets.payment_hash);
        invoices.push(secrets);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&invoices)?;
        fs::write(&self.path, content)?;
        log::debug!("Saved {} invoices to {}", invoices.len(), self.path.display());
        Ok(())
    }
}

impl InvoiceSecretStore for JsonInvoiceStore {
    fn find_by_payment_hash(&self, payment_hash: &[u8]) -> Result<Option<InvoiceSecrets>, StoreError> {
        Ok(self
            .load()?
            .into_iter()
            .find(|i| i.payment_hash == payment_hash))
    }
}
