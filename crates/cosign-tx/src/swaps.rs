//! Submarine swaps: paying a Lightning invoice through an on-chain HTLC.
//!
//! Before funding, the wallet checks that the swap server's proposed
//! output really pays to a script we can refund from. After a failed
//! payment (v1) or for a collaborative close (v2), the coins here sign the
//! swap output back.

use bitcoin::script::Builder;
use bitcoin::{Amount, Network, ScriptBuf, Transaction, Witness};
use cosign_core::{ExtendedPrivateKey, ExtendedPublicKey};
use serde::{Deserialize, Serialize};

use crate::address::{build_output, create_address, parse_address, AddressVersion, MuunAddress, SwapScriptParams};
use crate::coin::{input_mut, push_data};
use crate::error::{ScriptError, SignError, SwapError};
use crate::input::{SubmarineSwapV1Data, SubmarineSwapV2Data};
use crate::scripts;
use crate::sighash;
use crate::SigningContext;

fn decode_hex(field: &'static str, value: &str) -> Result<Vec<u8>, SwapError> {
    hex::decode(value).map_err(|e| SwapError::InvalidHex {
        field,
        reason: e.to_string(),
    })
}

/// The preimage, when the server already revealed it, must hash to the
/// invoice's payment hash.
fn check_preimage(invoice_payment_hash: &[u8], preimage_hex: Option<&str>) -> Result<(), SwapError> {
    let Some(preimage_hex) = preimage_hex.filter(|p| !p.is_empty()) else {
        return Ok(());
    };
    let preimage = decode_hex("preimage", preimage_hex)?;
    if scripts::payment_hash_of(&preimage)[..] != *invoice_payment_hash {
        return Err(SwapError::PreimageMismatch);
    }
    Ok(())
}

fn check_payment_hash(invoice_payment_hash: &[u8], server_payment_hash: &[u8]) -> Result<(), SwapError> {
    if invoice_payment_hash != server_payment_hash {
        return Err(SwapError::PaymentHashMismatch {
            invoice: hex::encode(invoice_payment_hash),
            swap: hex::encode(server_payment_hash),
        });
    }
    Ok(())
}

/// Funding output proposed by the swap server for a v1 swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmarineSwapV1Funding {
    pub output_address: String,
    pub user_refund_address: MuunAddress,
    pub server_payment_hash_hex: String,
    pub server_public_key_hex: String,
    pub user_lock_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preimage_hex: Option<String>,
}

/// Funding output proposed by the swap server for a v2 swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmarineSwapV2Funding {
    pub output_address: String,
    /// Path the user and muun keys were derived at.
    pub key_path: String,
    pub user_public_key_hex: String,
    pub muun_public_key_hex: String,
    pub server_payment_hash_hex: String,
    pub server_public_key_hex: String,
    pub expiration_in_blocks: i64,
    /// Lightning node the server will pay.
    pub receiver_public_key_hex: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preimage_hex: Option<String>,
}

/// Check a v1 swap before funding it.
///
/// `invoice_payment_hash` comes from the invoice being paid, decoded by the
/// caller.
pub fn validate_submarine_swap_v1(
    invoice_payment_hash: &[u8],
    user: &ExtendedPublicKey,
    muun: &ExtendedPublicKey,
    funding: &SubmarineSwapV1Funding,
    network: Network,
) -> Result<(), SwapError> {
    let server_payment_hash = decode_hex("server payment hash", &funding.server_payment_hash_hex)?;
    check_payment_hash(invoice_payment_hash, &server_payment_hash)?;

    // The refund address must be one of ours
    let refund = &funding.user_refund_address;
    let derived = create_address(
        refund.version,
        &user.derive_to(&refund.derivation_path)?,
        &muun.derive_to(&refund.derivation_path)?,
    )?;
    if derived.address != refund.address {
        return Err(SwapError::RefundAddressMismatch {
            swap: refund.address.clone(),
            derived: derived.address,
        });
    }

    let server_public_key = decode_hex("server public key", &funding.server_public_key_hex)?;
    let params = SwapScriptParams::SubmarineV1 {
        payment_hash: server_payment_hash,
        server_public_key,
        refund_address: refund.address.clone(),
        lock_time: funding.user_lock_time,
    };
    // V1 swaps only need the refund key, which the refund address encodes
    let built = build_output(
        AddressVersion::SubmarineSwapV1,
        &user.ec_public_key(),
        None,
        Some(&params),
        network,
    )?;
    let address = built.address.to_string();
    if address != funding.output_address {
        return Err(SwapError::ScriptAddressMismatch {
            derived: address,
            swap: funding.output_address.clone(),
        });
    }

    check_preimage(invoice_payment_hash, funding.preimage_hex.as_deref())
}

/// Check a v2 swap before funding it.
///
/// `invoice_destination` is the payee node key from the decoded invoice.
/// `original_expiration_in_blocks` is the expiration the wallet asked for.
pub fn validate_submarine_swap_v2(
    invoice_payment_hash: &[u8],
    invoice_destination: &[u8],
    user: &ExtendedPublicKey,
    muun: &ExtendedPublicKey,
    funding: &SubmarineSwapV2Funding,
    original_expiration_in_blocks: i64,
    network: Network,
) -> Result<(), SwapError> {
    let server_payment_hash = decode_hex("server payment hash", &funding.server_payment_hash_hex)?;
    check_payment_hash(invoice_payment_hash, &server_payment_hash)?;

    let destination = decode_hex("receiver public key", &funding.receiver_public_key_hex)?;
    if invoice_destination != destination.as_slice() {
        return Err(SwapError::DestinationMismatch {
            invoice: hex::encode(invoice_destination),
            swap: funding.receiver_public_key_hex.clone(),
        });
    }

    if funding.expiration_in_blocks != original_expiration_in_blocks {
        return Err(SwapError::ExpirationMismatch {
            expected: original_expiration_in_blocks,
            found: funding.expiration_in_blocks,
        });
    }

    let derived_user = user.derive_to(&funding.key_path)?;
    if derived_user.raw()[..] != decode_hex("user public key", &funding.user_public_key_hex)?[..] {
        return Err(SwapError::PublicKeyMismatch { role: "User" });
    }
    let derived_muun = muun.derive_to(&funding.key_path)?;
    if derived_muun.raw()[..] != decode_hex("muun public key", &funding.muun_public_key_hex)?[..] {
        return Err(SwapError::PublicKeyMismatch { role: "Muun" });
    }

    let params = SwapScriptParams::SubmarineV2 {
        payment_hash: server_payment_hash,
        server_public_key: decode_hex("server public key", &funding.server_public_key_hex)?,
        blocks_for_expiration: funding.expiration_in_blocks,
    };
    let built = build_output(
        AddressVersion::SubmarineSwapV2,
        &derived_user.ec_public_key(),
        Some(&derived_muun.ec_public_key()),
        Some(&params),
        network,
    )?;
    let address = built.address.to_string();
    if address != funding.output_address {
        return Err(SwapError::ScriptAddressMismatch {
            derived: address,
            swap: funding.output_address.clone(),
        });
    }

    check_preimage(invoice_payment_hash, funding.preimage_hex.as_deref())
}

/// Refund of a v1 swap output after its lock time.
#[derive(Debug, Clone)]
pub struct SubmarineSwapV1Coin {
    key_path: String,
    amount: Amount,
    swap: SubmarineSwapV1Data,
}

impl SubmarineSwapV1Coin {
    pub(crate) fn new(key_path: String, amount: Amount, swap: SubmarineSwapV1Data) -> Self {
        Self {
            key_path,
            amount,
            swap,
        }
    }

    fn witness_script(&self, network: Network) -> Result<ScriptBuf, ScriptError> {
        let refund = parse_address(&self.swap.refund_address, network)?;
        let refund_hash = refund
            .pubkey_hash()
            .ok_or_else(|| ScriptError::RefundNotP2pkh(self.swap.refund_address.clone()))?;
        scripts::submarine_swap_v1_script(
            &self.swap.payment_hash,
            &self.swap.server_public_key,
            &refund_hash,
            self.swap.lock_time,
        )
    }

    pub(crate) fn sign_input(
        &self,
        index: usize,
        tx: &mut Transaction,
        user: &ExtendedPrivateKey,
        ctx: &SigningContext<'_>,
    ) -> Result<(), SignError> {
        let user = user.derive_to(&self.key_path)?;
        let witness_script = self.witness_script(ctx.network)?;
        let redeem_script = scripts::nested_segwit_redeem_script(&witness_script);

        let sighash = sighash::segwit_v0(tx, index, &witness_script, self.amount)?;
        let signature = sighash::sign_ecdsa(sighash, &user.ec_private_key());

        let txin = input_mut(tx, index)?;
        txin.script_sig = Builder::new()
            .push_slice(push_data(redeem_script.as_bytes())?)
            .into_script();
        txin.witness = Witness::from_slice(&[
            &signature[..],
            &user.ec_public_key().serialize()[..],
            witness_script.as_bytes(),
        ]);
        Ok(())
    }
}

/// Collaborative close of a v2 swap output, co-signed by the swap server.
#[derive(Debug, Clone)]
pub struct SubmarineSwapV2Coin {
    key_path: String,
    amount: Amount,
    swap: SubmarineSwapV2Data,
}

impl SubmarineSwapV2Coin {
    pub(crate) fn new(key_path: String, amount: Amount, swap: SubmarineSwapV2Data) -> Self {
        Self {
            key_path,
            amount,
            swap,
        }
    }

    pub(crate) fn sign_input(
        &self,
        index: usize,
        tx: &mut Transaction,
        user: &ExtendedPrivateKey,
    ) -> Result<(), SignError> {
        let server_signature = self
            .swap
            .server_signature
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(SignError::AwaitingCosigner("swap server signature"))?;

        let user = user.derive_to(&self.key_path)?;
        if user.ec_public_key().serialize()[..] != self.swap.user_public_key[..] {
            return Err(SignError::Precondition(format!(
                "key at {} does not match the swap's user public key",
                self.key_path
            )));
        }

        let witness_script = scripts::submarine_swap_v2_script(
            &self.swap.payment_hash,
            &self.swap.user_public_key,
            &self.swap.muun_public_key,
            &self.swap.server_public_key,
            self.swap.blocks_for_expiration,
        )?;

        let sighash = sighash::segwit_v0(tx, index, &witness_script, self.amount)?;
        let signature = sighash::sign_ecdsa(sighash, &user.ec_private_key());

        input_mut(tx, index)?.witness =
            Witness::from_slice(&[&signature[..], server_signature, witness_script.as_bytes()]);
        Ok(())
    }
}
