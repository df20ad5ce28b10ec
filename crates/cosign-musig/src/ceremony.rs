//! The two signing roles of a user/cosigner key pair.
//!
//! Keys are always aggregated as `[user, cosigner]`. The cosigner signs first
//! and hands over its public nonce and partial signature; the user finishes.

use bitcoin::secp256k1::schnorr::Signature;
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};

use crate::keyagg::{KeyAggContext, MusigTweaks};
use crate::nonce::{generate_nonce, AggregateNonce, PublicNonce, SessionId};
use crate::sign::{aggregate_partial_signatures, partial_sign, verify_partial_signature, PartialSignature};
use crate::{MusigError, MusigVersion};

/// What the cosigner sends back to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CosignerSignature {
    pub public_nonce: PublicNonce,
    pub partial_signature: PartialSignature,
}

/// Cosigner side: sign `msg` against the user's public nonce.
pub fn compute_cosigner_partial_signature(
    version: MusigVersion,
    msg: &[u8; 32],
    user_key: &PublicKey,
    cosigner_secret: &SecretKey,
    user_nonce: &PublicNonce,
    session_id: &SessionId,
    tweaks: &MusigTweaks,
) -> Result<CosignerSignature, MusigError> {
    let secp = Secp256k1::signing_only();
    let cosigner_key = cosigner_secret.public_key(&secp);
    let ctx = KeyAggContext::new(version, &[*user_key, cosigner_key], tweaks)?;

    let (secnonce, public_nonce) = generate_nonce(version, session_id, &cosigner_key)?;
    let aggnonce = AggregateNonce::sum(&[*user_nonce, public_nonce])?;
    let partial_signature = partial_sign(&ctx, secnonce, cosigner_secret, &aggnonce, msg)?;

    Ok(CosignerSignature {
        public_nonce,
        partial_signature,
    })
}

/// User side: check the cosigner's share, add ours and combine.
///
/// `session_id` must be the one the user's public nonce was generated from.
pub fn add_user_signature_and_combine(
    version: MusigVersion,
    msg: &[u8; 32],
    user_secret: &SecretKey,
    cosigner_key: &PublicKey,
    cosigner: &CosignerSignature,
    session_id: &SessionId,
    tweaks: &MusigTweaks,
) -> Result<Signature, MusigError> {
    let secp = Secp256k1::signing_only();
    let user_key = user_secret.public_key(&secp);
    let ctx = KeyAggContext::new(version, &[user_key, *cosigner_key], tweaks)?;

    let (secnonce, user_nonce) = generate_nonce(version, session_id, &user_key)?;
    let aggnonce = AggregateNonce::sum(&[user_nonce, cosigner.public_nonce])?;

    verify_partial_signature(
        &ctx,
        &cosigner.partial_signature,
        &cosigner.public_nonce,
        cosigner_key,
        &aggnonce,
        msg,
    )
    .inspect_err(|_| log::warn!("Cosigner partial signature rejected ({:?})", version))?;

    let user_partial = partial_sign(&ctx, secnonce, user_secret, &aggnonce, msg)?;
    aggregate_partial_signatures(
        &ctx,
        &aggnonce,
        &[user_partial, cosigner.partial_signature],
        msg,
    )
}
