//! # Cosign MuSig2
//!
//! Two-party MuSig2 for Taproot outputs shared between a user and a cosigner.
//!
//! One engine, two aggregation variants selected by [`MusigVersion`]:
//!
//! - **v0.4.0**: keys are x-only and kept in the given order (user first).
//!   Only the BIP-86 key-spend tweak is allowed.
//! - **v1.0.0rc2** (BIP-327): keys are compressed and sorted. Supports
//!   generic tweaks, unhardened BIP-32 derivation of the aggregate key
//!   (BIP-328) and tapscript merkle-root commitments.
//!
//! The two variants produce different keys for the same key pair and must
//! never be mixed.
//!
//! The protocol always runs in two rounds:
//!   Round 1: both parties derive a nonce from a fresh session id and swap public nonces
//!   Round 2: partial signatures are exchanged, verified and combined
//!
//! The combined signature is a plain BIP-340 Schnorr signature.

mod arith;
pub mod ceremony;
pub mod keyagg;
pub mod nonce;
pub mod sign;

use bitcoin::hashes::{sha512, Hash, HashEngine, Hmac, HmacEngine};
use bitcoin::secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey};
use std::fmt;
use thiserror::Error;

pub use ceremony::{
    add_user_signature_and_combine, compute_cosigner_partial_signature, CosignerSignature,
};
pub use keyagg::{
    parse_pubkey, AggregateKey, GenericTweak, KeyAggContext, MusigTweaks, TaprootTweak,
};
pub use nonce::{
    generate_nonce, AggregateNonce, PublicNonce, SecretNonce, SessionId, PUBLIC_NONCE_SIZE,
};
pub use sign::{
    aggregate_partial_signatures, partial_sign, verify_partial_signature, verify_schnorr,
    PartialSignature,
};

/// Chain code BIP-328 assigns to every MuSig2 aggregate key.
pub const BIP328_CHAIN_CODE: [u8; 32] = [
    0x86, 0x80, 0x87, 0xca, 0x02, 0xa6, 0xf9, 0x74, 0xc4, 0x59, 0x89, 0x24, 0xc3, 0x6b, 0x57,
    0x76, 0x2d, 0x32, 0xcb, 0x45, 0x71, 0x71, 0x67, 0xe3, 0x00, 0x62, 0x2c, 0x71, 0x67, 0xe3,
    0x89, 0x65,
];

/// Key aggregation algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MusigVersion {
    /// Draft v0.4.0: fixed key order, x-only keys, BIP-86 only.
    V040,
    /// BIP-327 v1.0.0rc2: sorted compressed keys.
    V100,
}

impl MusigVersion {
    /// Wire identifier used when persisting sessions.
    pub fn code(self) -> u8 {
        match self {
            MusigVersion::V040 => 40,
            MusigVersion::V100 => 100,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            40 => Some(MusigVersion::V040),
            100 => Some(MusigVersion::V100),
            _ => None,
        }
    }
}

impl fmt::Display for MusigVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MusigVersion::V040 => f.write_str("v0.4.0"),
            MusigVersion::V100 => f.write_str("v1.0.0rc2"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MusigError {
    #[error("Invalid public key: {0}")]
    ParseError(String),

    #[error("At least two signer keys are required, got {0}")]
    NotEnoughKeys(usize),

    #[error("Hardened index {0:#x} is not allowed in an unhardened derivation path")]
    HardenedDerivationRejected(u32),

    #[error("{tweak} tweaks are not available for MuSig2 {version}")]
    UnsupportedTweak {
        version: MusigVersion,
        tweak: &'static str,
    },

    #[error("Hash output does not map to a valid scalar")]
    ScalarOutOfRange,

    #[error("Key aggregation or tweaking produced the point at infinity")]
    InfinityKey,

    #[error("Missing public nonce from the counterparty")]
    MissingNonce,

    #[error("Invalid public nonce: {0}")]
    InvalidNonce(String),

    #[error("Partial signature is not a valid scalar")]
    MalformedPartialSignature,

    #[error("Partial signature failed verification")]
    InvalidPartialSignature,

    #[error("Signer key is not part of the aggregate key")]
    UnknownSigner,

    #[error("Secret nonce was generated for a different signer key")]
    NonceKeyMismatch,

    #[error("Combined signature does not verify against the aggregate key")]
    InvalidFinalSignature,
}

/// Version-bound entry point for callers that work with raw key bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MusigEngine {
    version: MusigVersion,
}

impl MusigEngine {
    pub fn new(version: MusigVersion) -> Self {
        Self { version }
    }

    pub fn version(&self) -> MusigVersion {
        self.version
    }

    /// Aggregate raw signer keys, user first, and apply `tweaks`.
    pub fn combine_keys(
        &self,
        keys: &[&[u8]],
        tweaks: &MusigTweaks,
    ) -> Result<AggregateKey, MusigError> {
        KeyAggContext::from_bytes(self.version, keys, tweaks).map(|ctx| *ctx.aggregate_key())
    }

    /// Check a 64-byte BIP-340 signature against a final key.
    pub fn verify_schnorr(
        &self,
        final_key: &PublicKey,
        msg: &[u8; 32],
        signature: &[u8],
    ) -> Result<(), MusigError> {
        let signature = bitcoin::secp256k1::schnorr::Signature::from_slice(signature)
            .map_err(|_| MusigError::InvalidFinalSignature)?;
        verify_schnorr(final_key, msg, &signature)
    }
}

/// One step of an unhardened derivation chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivationTweak {
    /// `I_L` from BIP-32 CKDpub, added to the parent key.
    pub tweak: Scalar,
    /// Parent key plus `tweak * G`.
    pub derived_key: PublicKey,
    pub child_index: u32,
}

/// Reject any hardened index before key material is touched.
pub fn check_unhardened_path(path: &[u32]) -> Result<(), MusigError> {
    match path.iter().find(|&&index| index >= 0x8000_0000) {
        Some(&index) => Err(MusigError::HardenedDerivationRejected(index)),
        None => Ok(()),
    }
}

/// Compute the BIP-32 CKDpub tweak chain for `path` starting at `parent`.
///
/// For each index:
///   I = HMAC-SHA512(key=chain_code, data=ser_P(parent) || ser_32(index))
///   tweak = parse_256(I_L), child = parent + tweak*G, next chain code = I_R
///
/// With [`BIP328_CHAIN_CODE`] this derives `musig(...)/path` per BIP-328.
pub fn derive_unhardened_tweaks(
    parent: &PublicKey,
    chain_code: &[u8; 32],
    path: &[u32],
) -> Result<Vec<DerivationTweak>, MusigError> {
    check_unhardened_path(path)?;

    let secp = Secp256k1::new();
    let mut current_key = *parent;
    let mut current_chain_code = *chain_code;
    let mut steps = Vec::with_capacity(path.len());

    for &index in path {
        let mut engine = HmacEngine::<sha512::Hash>::new(&current_chain_code);
        engine.input(&current_key.serialize());
        engine.input(&index.to_be_bytes());
        let hmac_result = Hmac::from_engine(engine);

        let mut il = [0u8; 32];
        il.copy_from_slice(&hmac_result[..32]);
        let tweak = Scalar::from_be_bytes(il).map_err(|_| MusigError::ScalarOutOfRange)?;

        let tweak_point = SecretKey::from_slice(&il)
            .map_err(|_| MusigError::ScalarOutOfRange)?
            .public_key(&secp);
        let derived_key = current_key
            .combine(&tweak_point)
            .map_err(|_| MusigError::InfinityKey)?;

        steps.push(DerivationTweak {
            tweak,
            derived_key,
            child_index: index,
        });

        current_key = derived_key;
        current_chain_code.copy_from_slice(&hmac_result[32..]);
    }

    Ok(steps)
}
