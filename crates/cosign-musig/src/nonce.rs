//! Nonce generation and aggregation.
//!
//! Nonces are derived deterministically from a 32-byte session id, so the
//! session id is as sensitive as the secret nonce itself and must never be
//! reused across messages.
//!
//! v0.4.0:  seed = H_tag("MuSig/nonce", sid || 0 || 0 || 0 || 0); k_i = sha256(seed || i)
//! v1.0.0rc2: k_i = H_tag("MuSig/nonce", sid || 33 || pk || 0 || 0 || 0u32 || i)

use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use rand::RngCore;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::arith::{
    parse_point_or_zero, plain_hash, point_add, serialize_point_or_zero, tagged_hash, xonly_bytes,
};
use crate::{MusigError, MusigVersion};

pub const PUBLIC_NONCE_SIZE: usize = 66;

/// Per-signature randomness. Never reuse one for two messages.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionId([u8; 32]);

impl SessionId {
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionId(..)")
    }
}

/// The two secret nonce scalars, bound to the signer key they were made for.
///
/// Consumed by [`crate::partial_sign`]; wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretNonce {
    k1: [u8; 32],
    k2: [u8; 32],
    #[zeroize(skip)]
    version: MusigVersion,
    #[zeroize(skip)]
    signer: PublicKey,
}

impl SecretNonce {
    pub(crate) fn scalars(&self) -> Result<(SecretKey, SecretKey), MusigError> {
        let k1 = SecretKey::from_slice(&self.k1).map_err(|_| MusigError::ScalarOutOfRange)?;
        let k2 = SecretKey::from_slice(&self.k2).map_err(|_| MusigError::ScalarOutOfRange)?;
        Ok((k1, k2))
    }

    /// Whether this nonce was generated for `signer`.
    pub(crate) fn belongs_to(&self, signer: &PublicKey) -> bool {
        match self.version {
            MusigVersion::V040 => xonly_bytes(&self.signer) == xonly_bytes(signer),
            MusigVersion::V100 => self.signer == *signer,
        }
    }

    pub fn public_nonce(&self) -> Result<PublicNonce, MusigError> {
        let secp = Secp256k1::signing_only();
        let (k1, k2) = self.scalars()?;
        Ok(PublicNonce::from_points(
            &k1.public_key(&secp),
            &k2.public_key(&secp),
        ))
    }
}

impl fmt::Debug for SecretNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretNonce")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// `R1 || R2`, both compressed.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicNonce([u8; PUBLIC_NONCE_SIZE]);

impl PublicNonce {
    fn from_points(r1: &PublicKey, r2: &PublicKey) -> Self {
        let mut bytes = [0u8; PUBLIC_NONCE_SIZE];
        bytes[..33].copy_from_slice(&r1.serialize());
        bytes[33..].copy_from_slice(&r2.serialize());
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MusigError> {
        if bytes.len() != PUBLIC_NONCE_SIZE {
            return Err(MusigError::InvalidNonce(format!(
                "expected {} bytes, got {}",
                PUBLIC_NONCE_SIZE,
                bytes.len()
            )));
        }
        let (r1, r2) = split_points(bytes)?;
        Ok(Self::from_points(&r1, &r2))
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_NONCE_SIZE] {
        self.0
    }

    pub(crate) fn points(&self) -> Result<(PublicKey, PublicKey), MusigError> {
        split_points(&self.0)
    }
}

impl fmt::Debug for PublicNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicNonce({})", hex::encode(self.0))
    }
}

fn split_points(bytes: &[u8]) -> Result<(PublicKey, PublicKey), MusigError> {
    let invalid = |e: bitcoin::secp256k1::Error| MusigError::InvalidNonce(e.to_string());
    let r1 = PublicKey::from_slice(&bytes[..33]).map_err(invalid)?;
    let r2 = PublicKey::from_slice(&bytes[33..]).map_err(invalid)?;
    Ok((r1, r2))
}

/// Sum of all signers' public nonces. Either half may be infinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateNonce {
    pub(crate) r1: Option<PublicKey>,
    pub(crate) r2: Option<PublicKey>,
}

impl AggregateNonce {
    pub fn sum(nonces: &[PublicNonce]) -> Result<Self, MusigError> {
        let mut r1 = None;
        let mut r2 = None;
        for nonce in nonces {
            let (a, b) = nonce.points()?;
            r1 = point_add(r1, Some(a));
            r2 = point_add(r2, Some(b));
        }
        Ok(Self { r1, r2 })
    }

    /// 66 bytes, with infinity encoded as 33 zero bytes.
    pub fn to_bytes(&self) -> [u8; PUBLIC_NONCE_SIZE] {
        let mut bytes = [0u8; PUBLIC_NONCE_SIZE];
        bytes[..33].copy_from_slice(&serialize_point_or_zero(&self.r1));
        bytes[33..].copy_from_slice(&serialize_point_or_zero(&self.r2));
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MusigError> {
        if bytes.len() != PUBLIC_NONCE_SIZE {
            return Err(MusigError::InvalidNonce(format!(
                "expected {} bytes, got {}",
                PUBLIC_NONCE_SIZE,
                bytes.len()
            )));
        }
        Ok(Self {
            r1: parse_point_or_zero(&bytes[..33])?,
            r2: parse_point_or_zero(&bytes[33..])?,
        })
    }
}

/// Derive the signer's nonce pair for a session.
///
/// The same session id and key always give the same nonces.
pub fn generate_nonce(
    version: MusigVersion,
    session_id: &SessionId,
    signer: &PublicKey,
) -> Result<(SecretNonce, PublicNonce), MusigError> {
    let mut k = [[0u8; 32]; 2];
    match version {
        MusigVersion::V040 => {
            let seed = tagged_hash("MuSig/nonce", &[session_id.as_bytes(), &[0, 0, 0, 0]]);
            for (i, slot) in k.iter_mut().enumerate() {
                *slot = plain_hash(&[&seed, &[i as u8]]);
            }
        }
        MusigVersion::V100 => {
            let pk = signer.serialize();
            for (i, slot) in k.iter_mut().enumerate() {
                *slot = tagged_hash(
                    "MuSig/nonce",
                    &[
                        session_id.as_bytes(),
                        &[33],
                        &pk,
                        &[0],
                        &[0],
                        &[0, 0, 0, 0],
                        &[i as u8],
                    ],
                );
            }
        }
    }

    let secret = SecretNonce {
        k1: k[0],
        k2: k[1],
        version,
        signer: *signer,
    };
    k.zeroize();
    let public = secret.public_nonce()?;
    Ok((secret, public))
}
