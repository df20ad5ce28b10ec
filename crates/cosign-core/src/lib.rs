//! Cosign Core
//!
//! Shared key types for the co-signing wallet.
//!
//! # Derivation paths
//!
//! Wallet paths carry human-readable labels, e.g.
//! `m/schema:1'/recovery:1'/external:1/0`. Labels are documentation only:
//! two paths are equal when their index sequences are equal.
//!
//! # Extended keys
//!
//! [`ExtendedPrivateKey`] and [`ExtendedPublicKey`] wrap BIP-32 keys together
//! with the path they were derived at and the network they belong to.
//! Derivation never mutates a key; it returns a new one.

pub mod keys;
pub mod network;
pub mod path;

pub use keys::{ExtendedPrivateKey, ExtendedPublicKey, KeyError};
pub use network::{parse_network, NetworkError};
pub use path::{HdPath, PathError, PathIndex, HARDENED_KEY_START};
