//! Locking and witness scripts for every output family the wallet can own.
//!
//! All builders are pure: same keys in, same bytes out.

use bitcoin::opcodes::all::*;
use bitcoin::script::{Builder, PushBytes};
use bitcoin::hashes::{hash160, ripemd160, sha256, Hash};
use bitcoin::key::TweakedPublicKey;
use bitcoin::secp256k1::PublicKey;
use bitcoin::{PubkeyHash, ScriptBuf};
use cosign_musig::{KeyAggContext, MusigTweaks, MusigVersion};

use crate::error::ScriptError;

fn push_bytes(data: &[u8]) -> Result<&PushBytes, ScriptError> {
    <&PushBytes>::try_from(data)
        .map_err(|_| ScriptError::InvalidKey(format!("{} bytes cannot be pushed", data.len())))
}

fn payment_hash_160(payment_hash: &[u8]) -> Result<[u8; 20], ScriptError> {
    if payment_hash.len() != 32 {
        return Err(ScriptError::InvalidPaymentHash(payment_hash.len()));
    }
    Ok(ripemd160::Hash::hash(payment_hash).to_byte_array())
}

/// `OP_2 <user> <muun> OP_2 OP_CHECKMULTISIG`, shared by V2, V3 and V4.
///
/// Key order is fixed: user first. Signatures must follow the same order.
pub fn multisig_script(user: &PublicKey, muun: &PublicKey) -> ScriptBuf {
    Builder::new()
        .push_int(2)
        .push_slice(user.serialize())
        .push_slice(muun.serialize())
        .push_int(2)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script()
}

/// `OP_0 <sha256(witness_script)>`, the P2SH redeem script of a nested P2WSH.
pub fn nested_segwit_redeem_script(witness_script: &ScriptBuf) -> ScriptBuf {
    ScriptBuf::new_p2wsh(&witness_script.wscript_hash())
}

/// Submarine swap v1 witness script.
///
/// The server spends by revealing the preimage; after `lock_time` the user
/// spends with the key behind `refund_pubkey_hash`.
pub fn submarine_swap_v1_script(
    payment_hash: &[u8],
    server_public_key: &[u8],
    refund_pubkey_hash: &PubkeyHash,
    lock_time: i64,
) -> Result<ScriptBuf, ScriptError> {
    let payment_hash_160 = payment_hash_160(payment_hash)?;

    Ok(Builder::new()
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(payment_hash_160)
        .push_opcode(OP_EQUAL)
        // Server branch
        .push_opcode(OP_IF)
        .push_opcode(OP_DROP)
        .push_slice(push_bytes(server_public_key)?)
        // Refund branch
        .push_opcode(OP_ELSE)
        .push_int(lock_time)
        .push_opcode(OP_CLTV)
        .push_opcode(OP_DROP)
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(refund_pubkey_hash.to_byte_array())
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_ENDIF)
        .push_opcode(OP_CHECKSIG)
        .into_script())
}

/// Submarine swap v2 witness script.
///
/// Three ways out:
///   server signature + user signature (collaborative)
///   server signature + preimage
///   after `blocks_for_expiration`, user signature + muun key and signature
///
/// The muun key is committed by its hash160 and revealed at spend time.
pub fn submarine_swap_v2_script(
    payment_hash: &[u8],
    user_public_key: &[u8],
    muun_public_key: &[u8],
    server_public_key: &[u8],
    blocks_for_expiration: i64,
) -> Result<ScriptBuf, ScriptError> {
    let payment_hash_160 = payment_hash_160(payment_hash)?;
    let muun_key_hash = hash160::Hash::hash(muun_public_key).to_byte_array();

    Ok(Builder::new()
        .push_slice(push_bytes(user_public_key)?)
        .push_opcode(OP_SWAP)
        .push_slice(push_bytes(server_public_key)?)
        .push_opcode(OP_CHECKSIG)
        .push_opcode(OP_IF)
        .push_opcode(OP_SWAP)
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(payment_hash_160)
        .push_opcode(OP_EQUAL)
        .push_opcode(OP_IF)
        .push_opcode(OP_DROP)
        .push_opcode(OP_ELSE)
        .push_opcode(OP_SWAP)
        .push_opcode(OP_CHECKSIG)
        .push_opcode(OP_ENDIF)
        .push_opcode(OP_ELSE)
        .push_int(blocks_for_expiration)
        .push_opcode(OP_CSV)
        .push_opcode(OP_DROP)
        .push_opcode(OP_CHECKSIGVERIFY)
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(muun_key_hash)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .push_opcode(OP_ENDIF)
        .into_script())
}

/// Incoming swap HTLC witness script.
///
/// Muun and the swap server can reclaim after `expiration_height`; the user
/// claims with a muun signature, their own signature and the preimage.
pub fn incoming_swap_htlc_script(
    user_public_key: &[u8],
    muun_public_key: &[u8],
    swap_server_public_key: &[u8],
    expiration_height: i64,
    payment_hash: &[u8],
) -> Result<ScriptBuf, ScriptError> {
    let payment_hash_160 = payment_hash_160(payment_hash)?;
    let server_key_hash = hash160::Hash::hash(swap_server_public_key).to_byte_array();

    Ok(Builder::new()
        .push_slice(push_bytes(muun_public_key)?)
        .push_opcode(OP_CHECKSIG)
        .push_opcode(OP_NOTIF)
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(server_key_hash)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIGVERIFY)
        .push_int(expiration_height)
        .push_opcode(OP_CLTV)
        .push_opcode(OP_ELSE)
        .push_slice(push_bytes(user_public_key)?)
        .push_opcode(OP_CHECKSIGVERIFY)
        .push_opcode(OP_SIZE)
        .push_int(32)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_HASH160)
        .push_slice(payment_hash_160)
        .push_opcode(OP_EQUAL)
        .push_opcode(OP_ENDIF)
        .into_script())
}

/// BIP-86 output key for a V5 (v0.4.0) or V6 (v1.0.0rc2) key pair.
pub fn taproot_output_key(
    version: MusigVersion,
    user: &PublicKey,
    muun: &PublicKey,
) -> Result<TweakedPublicKey, ScriptError> {
    let ctx = KeyAggContext::new(version, &[*user, *muun], &MusigTweaks::bip86())?;
    Ok(ctx.aggregate_key().tweaked_output_key())
}

/// sha256 of a preimage, as committed in invoices.
pub fn payment_hash_of(preimage: &[u8]) -> [u8; 32] {
    sha256::Hash::hash(preimage).to_byte_array()
}
