//! Extended keys that carry their derivation path and network.

use bitcoin::bip32::{Xpriv, Xpub};
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use bitcoin::Network;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::path::{HdPath, PathError};

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid extended key: {0}")]
    InvalidKey(String),

    #[error("Invalid path: {0}")]
    Path(#[from] PathError),

    #[error("Derivation path {path} is not a descendant of the key's path {key_path}")]
    NotADescendant { path: String, key_path: String },

    #[error("Cannot derive hardened path {0} from a public key")]
    HardenedFromPublic(String),

    #[error("Derivation failed: {0}")]
    DerivationFailed(String),
}

/// A BIP-32 private key positioned at a known path.
#[derive(Clone)]
pub struct ExtendedPrivateKey {
    key: Xpriv,
    network: Network,
    path: HdPath,
}

/// A BIP-32 public key positioned at a known path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedPublicKey {
    key: Xpub,
    network: Network,
    path: HdPath,
}

impl ExtendedPrivateKey {
    /// Master key from a BIP-32 seed, at path `m`.
    pub fn new_master(seed: &[u8], network: Network) -> Result<Self, KeyError> {
        let key = Xpriv::new_master(network, seed)
            .map_err(|e| KeyError::DerivationFailed(e.to_string()))?;
        Ok(Self {
            key,
            network,
            path: HdPath::master(),
        })
    }

    /// Parse an `xprv`/`tprv` string that sits at `path`.
    pub fn from_base58(encoded: &str, path: &str, network: Network) -> Result<Self, KeyError> {
        let key = Xpriv::from_str(encoded).map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        Ok(Self {
            key,
            network,
            path: HdPath::parse(path)?,
        })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn path(&self) -> &HdPath {
        &self.path
    }

    pub fn public_key(&self) -> ExtendedPublicKey {
        let secp = Secp256k1::signing_only();
        ExtendedPublicKey {
            key: Xpub::from_priv(&secp, &self.key),
            network: self.network,
            path: self.path.clone(),
        }
    }

    /// The raw secp256k1 secret at this node.
    pub fn ec_private_key(&self) -> SecretKey {
        self.key.private_key
    }

    pub fn ec_public_key(&self) -> PublicKey {
        let secp = Secp256k1::signing_only();
        self.key.private_key.public_key(&secp)
    }

    /// Derive down to `path`, which must extend this key's own path.
    ///
    /// The returned key keeps `path`'s textual form, labels included.
    pub fn derive_to(&self, path: &str) -> Result<Self, KeyError> {
        let target = HdPath::parse(path)?;
        if !target.has_prefix(&self.path) {
            return Err(KeyError::NotADescendant {
                path: path.to_string(),
                key_path: self.path.to_string(),
            });
        }

        let steps: Vec<_> = target
            .indexes_from(&self.path)
            .iter()
            .map(|i| i.child_number())
            .collect();

        let secp = Secp256k1::signing_only();
        let key = self
            .key
            .derive_priv(&secp, &steps)
            .map_err(|e| KeyError::DerivationFailed(format!("{}: {}", path, e)))?;

        Ok(Self {
            key,
            network: self.network,
            path: target,
        })
    }
}

impl fmt::Debug for ExtendedPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedPrivateKey")
            .field("network", &self.network)
            .field("path", &self.path.as_str())
            .finish_non_exhaustive()
    }
}

impl ExtendedPublicKey {
    /// Parse an `xpub`/`tpub` string that sits at `path`.
    pub fn from_base58(encoded: &str, path: &str, network: Network) -> Result<Self, KeyError> {
        let key = Xpub::from_str(encoded).map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        Ok(Self {
            key,
            network,
            path: HdPath::parse(path)?,
        })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn path(&self) -> &HdPath {
        &self.path
    }

    pub fn ec_public_key(&self) -> PublicKey {
        self.key.public_key
    }

    /// 33-byte compressed serialization of the key at this node.
    pub fn raw(&self) -> [u8; 33] {
        self.key.public_key.serialize()
    }

    /// Derive down to `path`. Every remaining step must be unhardened.
    pub fn derive_to(&self, path: &str) -> Result<Self, KeyError> {
        let target = HdPath::parse(path)?;
        if !target.has_prefix(&self.path) {
            return Err(KeyError::NotADescendant {
                path: path.to_string(),
                key_path: self.path.to_string(),
            });
        }

        let remaining = target.indexes_from(&self.path);
        if remaining.iter().any(|i| i.hardened) {
            return Err(KeyError::HardenedFromPublic(path.to_string()));
        }
        let steps: Vec<_> = remaining.iter().map(|i| i.child_number()).collect();

        let secp = Secp256k1::verification_only();
        let key = self
            .key
            .derive_pub(&secp, &steps)
            .map_err(|e| KeyError::DerivationFailed(format!("{}: {}", path, e)))?;

        Ok(Self {
            key,
            network: self.network,
            path: target,
        })
    }
}

impl fmt::Display for ExtendedPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}
