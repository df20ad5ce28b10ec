//! Sighash computation and ECDSA helpers shared by the coin signers.

use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{ecdsa, Message, PublicKey, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, Prevouts, SighashCache, TapSighashType};
use bitcoin::{Amount, Script, Transaction, TxOut};

use crate::error::SignError;

fn sighash_error(e: impl std::fmt::Display) -> SignError {
    SignError::Sighash(e.to_string())
}

/// Pre-segwit sighash over `script_code`, SIGHASH_ALL.
pub(crate) fn legacy(tx: &Transaction, index: usize, script_code: &Script) -> Result<[u8; 32], SignError> {
    let cache = SighashCache::new(tx);
    let sighash = cache
        .legacy_signature_hash(index, script_code, EcdsaSighashType::All.to_u32())
        .map_err(sighash_error)?;
    Ok(sighash.to_byte_array())
}

/// BIP-143 sighash for a P2WSH (or nested P2WSH) input, SIGHASH_ALL.
pub(crate) fn segwit_v0(
    tx: &Transaction,
    index: usize,
    witness_script: &Script,
    amount: Amount,
) -> Result<[u8; 32], SignError> {
    let mut cache = SighashCache::new(tx);
    let sighash = cache
        .p2wsh_signature_hash(index, witness_script, amount, EcdsaSighashType::All)
        .map_err(sighash_error)?;
    Ok(sighash.to_byte_array())
}

/// BIP-341 key-spend sighash over every input's previous output, SIGHASH_ALL.
pub(crate) fn taproot_key_spend(
    tx: &Transaction,
    index: usize,
    prevouts: &[TxOut],
) -> Result<[u8; 32], SignError> {
    let mut cache = SighashCache::new(tx);
    let sighash = cache
        .taproot_key_spend_signature_hash(index, &Prevouts::All(prevouts), TapSighashType::All)
        .map_err(sighash_error)?;
    Ok(sighash.to_byte_array())
}

/// DER signature with the SIGHASH_ALL byte appended.
pub(crate) fn sign_ecdsa(sighash: [u8; 32], key: &SecretKey) -> Vec<u8> {
    let secp = Secp256k1::signing_only();
    let signature = secp.sign_ecdsa(&Message::from_digest(sighash), key);
    bitcoin::ecdsa::Signature {
        signature,
        sighash_type: EcdsaSighashType::All,
    }
    .to_vec()
}

/// Check a counterparty's ECDSA signature, with or without the sighash byte.
///
/// The signature goes into the witness as given, so high-S encodings are
/// refused: they would make the spend non-standard.
pub(crate) fn verify_ecdsa(sighash: [u8; 32], signature: &[u8], key: &PublicKey) -> Result<(), SignError> {
    let parsed = match bitcoin::ecdsa::Signature::from_slice(signature) {
        Ok(sig) => sig.signature,
        Err(_) => ecdsa::Signature::from_der(signature)
            .map_err(|e| SignError::MalformedSignature(e.to_string()))?,
    };
    let mut low_s = parsed;
    low_s.normalize_s();
    if low_s != parsed {
        return Err(SignError::MalformedSignature("signature is not low-S".into()));
    }

    let secp = Secp256k1::verification_only();
    secp.verify_ecdsa(&Message::from_digest(sighash), &parsed, key)
        .map_err(|_| {
            log::warn!("Cosigner signature does not verify for key {}", key);
            SignError::InvalidCosignerSignature
        })
}
