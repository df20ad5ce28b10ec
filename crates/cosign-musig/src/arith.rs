//! Scalar and point helpers over `bitcoin::secp256k1`.
//!
//! The library types cannot hold zero or infinity, so both are modeled with
//! `Option`: `ModScalar(None)` is zero and a `None` point is infinity.

use bitcoin::hashes::{sha256, Hash, HashEngine};
use bitcoin::secp256k1::{Parity, PublicKey, Scalar, Secp256k1, SecretKey, XOnlyPublicKey};

use crate::MusigError;

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct ModScalar(pub(crate) Option<SecretKey>);

impl std::fmt::Debug for ModScalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.is_zero() { "ModScalar(0)" } else { "ModScalar(..)" })
    }
}

impl ModScalar {
    pub(crate) const ZERO: ModScalar = ModScalar(None);

    pub(crate) fn one() -> Self {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        ModScalar(SecretKey::from_slice(&bytes).ok())
    }

    /// Parse a big-endian value, rejecting anything not below the group order.
    pub(crate) fn from_bytes(bytes: &[u8; 32]) -> Result<Self, MusigError> {
        if bytes.iter().all(|b| *b == 0) {
            return Ok(Self::ZERO);
        }
        SecretKey::from_slice(bytes)
            .map(|sk| ModScalar(Some(sk)))
            .map_err(|_| MusigError::ScalarOutOfRange)
    }

    pub(crate) fn from_secret(sk: SecretKey) -> Self {
        ModScalar(Some(sk))
    }

    pub(crate) fn to_bytes(self) -> [u8; 32] {
        match self.0 {
            Some(sk) => sk.secret_bytes(),
            None => [0u8; 32],
        }
    }

    pub(crate) fn is_zero(&self) -> bool {
        self.0.is_none()
    }

    pub(crate) fn add(self, other: ModScalar) -> ModScalar {
        match (self.0, other.0) {
            (None, _) => other,
            (_, None) => self,
            // add_tweak only fails when the sum is zero
            (Some(a), Some(b)) => ModScalar(a.add_tweak(&Scalar::from(b)).ok()),
        }
    }

    pub(crate) fn mul(self, other: ModScalar) -> ModScalar {
        match (self.0, other.0) {
            (Some(a), Some(b)) => ModScalar(a.mul_tweak(&Scalar::from(b)).ok()),
            _ => Self::ZERO,
        }
    }

    pub(crate) fn negate(self) -> ModScalar {
        ModScalar(self.0.map(|sk| sk.negate()))
    }

    /// Negate when `flag` is set.
    pub(crate) fn cond_negate(self, flag: bool) -> ModScalar {
        if flag {
            self.negate()
        } else {
            self
        }
    }
}

/// Point addition where `None` is infinity.
pub(crate) fn point_add(a: Option<PublicKey>, b: Option<PublicKey>) -> Option<PublicKey> {
    match (a, b) {
        (None, p) | (p, None) => p,
        (Some(a), Some(b)) => a.combine(&b).ok(),
    }
}

pub(crate) fn point_mul(p: Option<PublicKey>, s: ModScalar) -> Option<PublicKey> {
    let secp = Secp256k1::verification_only();
    match (p, s.0) {
        (Some(p), Some(k)) => p.mul_tweak(&secp, &Scalar::from(k)).ok(),
        _ => None,
    }
}

/// `s * G`.
pub(crate) fn base_mul(s: ModScalar) -> Option<PublicKey> {
    let secp = Secp256k1::signing_only();
    s.0.map(|k| k.public_key(&secp))
}

pub(crate) fn point_negate(p: Option<PublicKey>) -> Option<PublicKey> {
    let secp = Secp256k1::verification_only();
    p.map(|p| p.negate(&secp))
}

pub(crate) fn generator() -> Result<PublicKey, MusigError> {
    base_mul(ModScalar::one()).ok_or(MusigError::InfinityKey)
}

pub(crate) fn has_even_y(p: &PublicKey) -> bool {
    p.x_only_public_key().1 == Parity::Even
}

pub(crate) fn xonly_bytes(p: &PublicKey) -> [u8; 32] {
    p.x_only_public_key().0.serialize()
}

/// The point with the same x coordinate and even y.
pub(crate) fn lift_even(p: &PublicKey) -> PublicKey {
    let (x, _) = p.x_only_public_key();
    XOnlyPublicKey::public_key(&x, Parity::Even)
}

/// 33-byte encoding where infinity is all zeros.
pub(crate) fn serialize_point_or_zero(p: &Option<PublicKey>) -> [u8; 33] {
    match p {
        Some(p) => p.serialize(),
        None => [0u8; 33],
    }
}

pub(crate) fn parse_point_or_zero(bytes: &[u8]) -> Result<Option<PublicKey>, MusigError> {
    if bytes.len() == 33 && bytes.iter().all(|b| *b == 0) {
        return Ok(None);
    }
    PublicKey::from_slice(bytes)
        .map(Some)
        .map_err(|e| MusigError::InvalidNonce(e.to_string()))
}

/// BIP-340 tagged hash: `sha256(sha256(tag) || sha256(tag) || parts...)`.
pub(crate) fn tagged_hash(tag: &str, parts: &[&[u8]]) -> [u8; 32] {
    let tag_hash = sha256::Hash::hash(tag.as_bytes());
    let mut engine = sha256::Hash::engine();
    engine.input(tag_hash.as_ref());
    engine.input(tag_hash.as_ref());
    for part in parts {
        engine.input(part);
    }
    sha256::Hash::from_engine(engine).to_byte_array()
}

pub(crate) fn plain_hash(parts: &[&[u8]]) -> [u8; 32] {
    let mut engine = sha256::Hash::engine();
    for part in parts {
        engine.input(part);
    }
    sha256::Hash::from_engine(engine).to_byte_array()
}

pub(crate) fn tagged_scalar(tag: &str, parts: &[&[u8]]) -> Result<ModScalar, MusigError> {
    ModScalar::from_bytes(&tagged_hash(tag, parts))
}
