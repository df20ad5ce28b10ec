//! Partial signing, partial verification and signature aggregation.

use bitcoin::secp256k1::schnorr::Signature;
use bitcoin::secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use std::fmt;

use crate::arith::{
    base_mul, generator, has_even_y, plain_hash, point_add, point_mul, point_negate,
    tagged_scalar, xonly_bytes, ModScalar,
};
use crate::keyagg::KeyAggContext;
use crate::nonce::{AggregateNonce, PublicNonce, SecretNonce};
use crate::{MusigError, MusigVersion};

/// A signer's share `s_i` of the final signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PartialSignature(ModScalar);

impl PartialSignature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MusigError> {
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| MusigError::MalformedPartialSignature)?;
        ModScalar::from_bytes(&bytes)
            .map(PartialSignature)
            .map_err(|_| MusigError::MalformedPartialSignature)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }
}

impl fmt::Debug for PartialSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartialSignature({})", hex::encode(self.to_bytes()))
    }
}

/// Values every signer derives identically from the aggregate nonce and message.
struct SessionValues {
    b: ModScalar,
    r: PublicKey,
    e: ModScalar,
    r_negated: bool,
}

impl SessionValues {
    fn new(ctx: &KeyAggContext, aggnonce: &AggregateNonce, msg: &[u8; 32]) -> Result<Self, MusigError> {
        let q = xonly_bytes(&ctx.final_key());
        let encoded = aggnonce.to_bytes();

        let b = match ctx.version() {
            MusigVersion::V040 => ModScalar::from_bytes(&plain_hash(&[&encoded, &q, msg]))?,
            MusigVersion::V100 => tagged_scalar("MuSig/noncecoef", &[&encoded, &q, msg])?,
        };

        let r = match point_add(aggnonce.r1, point_mul(aggnonce.r2, b)) {
            Some(r) => r,
            None => generator()?,
        };
        let e = tagged_scalar("BIP0340/challenge", &[&xonly_bytes(&r), &q, msg])?;

        Ok(Self {
            b,
            r,
            e,
            r_negated: !has_even_y(&r),
        })
    }
}

/// Produce this signer's partial signature, consuming the secret nonce.
///
/// The result is checked against the signer's own public nonce before it is
/// returned.
pub fn partial_sign(
    ctx: &KeyAggContext,
    secnonce: SecretNonce,
    secret: &SecretKey,
    aggnonce: &AggregateNonce,
    msg: &[u8; 32],
) -> Result<PartialSignature, MusigError> {
    let secp = Secp256k1::signing_only();
    let public = secret.public_key(&secp);
    if !secnonce.belongs_to(&public) {
        return Err(MusigError::NonceKeyMismatch);
    }

    let mut d = ModScalar::from_secret(*secret);
    if ctx.version() == MusigVersion::V040 && !has_even_y(&public) {
        d = d.negate();
    }
    let a = ctx.coefficient(&public)?;
    let d = d.cond_negate(ctx.secret_negated());

    let session = SessionValues::new(ctx, aggnonce, msg)?;
    let own_nonce = secnonce.public_nonce()?;
    let (k1, k2) = secnonce.scalars()?;
    drop(secnonce);

    let k1 = ModScalar::from_secret(k1).cond_negate(session.r_negated);
    let k2 = ModScalar::from_secret(k2).cond_negate(session.r_negated);

    let s = k1
        .add(session.b.mul(k2))
        .add(session.e.mul(a).mul(d));
    let signature = PartialSignature(s);

    verify_partial_signature(ctx, &signature, &own_nonce, &public, aggnonce, msg)?;
    Ok(signature)
}

/// Check one signer's partial signature against its public nonce and key.
pub fn verify_partial_signature(
    ctx: &KeyAggContext,
    signature: &PartialSignature,
    public_nonce: &PublicNonce,
    signer: &PublicKey,
    aggnonce: &AggregateNonce,
    msg: &[u8; 32],
) -> Result<(), MusigError> {
    let session = SessionValues::new(ctx, aggnonce, msg)?;
    let (r1, r2) = public_nonce.points()?;
    let signer_key = ctx.normalize(signer);
    let a = ctx.coefficient(signer)?;

    let mut effective_nonce = point_add(Some(r1), point_mul(Some(r2), session.b));
    if session.r_negated {
        effective_nonce = point_negate(effective_nonce);
    }

    let challenge = session.e.mul(a).cond_negate(ctx.secret_negated());
    let expected = point_add(effective_nonce, point_mul(Some(signer_key), challenge));

    if base_mul(signature.0) == expected {
        Ok(())
    } else {
        Err(MusigError::InvalidPartialSignature)
    }
}

/// Sum the partial signatures into a BIP-340 signature for the final key.
///
/// Fails with [`MusigError::InvalidFinalSignature`] if the result does not
/// verify.
pub fn aggregate_partial_signatures(
    ctx: &KeyAggContext,
    aggnonce: &AggregateNonce,
    partials: &[PartialSignature],
    msg: &[u8; 32],
) -> Result<Signature, MusigError> {
    let session = SessionValues::new(ctx, aggnonce, msg)?;

    let tweak_term = session
        .e
        .mul(ctx.tacc())
        .cond_negate(!has_even_y(&ctx.final_key()));
    let s = partials
        .iter()
        .fold(tweak_term, |acc, partial| acc.add(partial.0));

    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(&xonly_bytes(&session.r));
    bytes[32..].copy_from_slice(&s.to_bytes());
    let signature = Signature::from_slice(&bytes).map_err(|_| MusigError::InvalidFinalSignature)?;

    verify_schnorr(&ctx.final_key(), msg, &signature)?;
    Ok(signature)
}

/// BIP-340 verification against the x-only form of `key`.
pub fn verify_schnorr(key: &PublicKey, msg: &[u8; 32], signature: &Signature) -> Result<(), MusigError> {
    let secp = Secp256k1::verification_only();
    let (xonly, _) = key.x_only_public_key();
    secp.verify_schnorr(signature, &Message::from_digest(*msg), &xonly)
        .map_err(|_| MusigError::InvalidFinalSignature)
}
