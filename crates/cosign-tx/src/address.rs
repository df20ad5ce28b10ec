//! Address versions and the outputs they lock to.
//!
//! A [`MuunAddress`] pins a UTXO to one script family forever. The version is
//! stored next to the UTXO so the same script can be rebuilt at spend time.

use bitcoin::secp256k1::PublicKey;
use bitcoin::{Address, Network, ScriptBuf};
use cosign_core::ExtendedPublicKey;
use cosign_musig::MusigVersion;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ScriptError;
use crate::scripts;

/// The closed set of output families. Codes are persisted and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum AddressVersion {
    V1,
    V2,
    V3,
    V4,
    V5,
    V6,
    SubmarineSwapV1,
    SubmarineSwapV2,
    IncomingSwap,
}

impl AddressVersion {
    pub fn code(self) -> u32 {
        match self {
            AddressVersion::V1 => 1,
            AddressVersion::V2 => 2,
            AddressVersion::V3 => 3,
            AddressVersion::V4 => 4,
            AddressVersion::V5 => 5,
            AddressVersion::V6 => 6,
            AddressVersion::SubmarineSwapV1 => 101,
            AddressVersion::SubmarineSwapV2 => 102,
            AddressVersion::IncomingSwap => 201,
        }
    }

    pub fn from_code(code: u32) -> Result<Self, ScriptError> {
        match code {
            1 => Ok(AddressVersion::V1),
            2 => Ok(AddressVersion::V2),
            3 => Ok(AddressVersion::V3),
            4 => Ok(AddressVersion::V4),
            5 => Ok(AddressVersion::V5),
            6 => Ok(AddressVersion::V6),
            101 => Ok(AddressVersion::SubmarineSwapV1),
            102 => Ok(AddressVersion::SubmarineSwapV2),
            201 => Ok(AddressVersion::IncomingSwap),
            other => Err(ScriptError::UnknownVersion(other)),
        }
    }

    /// The MuSig2 variant behind a Taproot version.
    pub fn musig_version(self) -> Option<MusigVersion> {
        match self {
            AddressVersion::V5 => Some(MusigVersion::V040),
            AddressVersion::V6 => Some(MusigVersion::V100),
            _ => None,
        }
    }

    /// Whether addresses of this version derive from wallet keys alone.
    pub fn is_wallet_version(self) -> bool {
        self.code() <= 6
    }
}

impl TryFrom<u32> for AddressVersion {
    type Error = ScriptError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Self::from_code(code)
    }
}

impl From<AddressVersion> for u32 {
    fn from(version: AddressVersion) -> u32 {
        version.code()
    }
}

impl fmt::Display for AddressVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressVersion::SubmarineSwapV1 => f.write_str("submarine swap v1"),
            AddressVersion::SubmarineSwapV2 => f.write_str("submarine swap v2"),
            AddressVersion::IncomingSwap => f.write_str("incoming swap"),
            other => write!(f, "v{}", other.code()),
        }
    }
}

/// An address the wallet owns, with the path its keys live at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuunAddress {
    pub version: AddressVersion,
    pub derivation_path: String,
    pub address: String,
}

impl MuunAddress {
    pub fn new(
        version: AddressVersion,
        derivation_path: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            version,
            derivation_path: derivation_path.into(),
            address: address.into(),
        }
    }

    /// Locking script of the encoded address on `network`.
    pub fn script_pubkey(&self, network: Network) -> Result<ScriptBuf, ScriptError> {
        Ok(parse_address(&self.address, network)?.script_pubkey())
    }
}

impl fmt::Display for MuunAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} at {})", self.address, self.version, self.derivation_path)
    }
}

/// Parse `address` and check it belongs to `network`.
pub fn parse_address(address: &str, network: Network) -> Result<Address, ScriptError> {
    let invalid = |reason: String| ScriptError::InvalidAddress {
        address: address.to_string(),
        reason,
    };
    Address::from_str(address)
        .map_err(|e| invalid(e.to_string()))?
        .require_network(network)
        .map_err(|e| invalid(e.to_string()))
}

/// Extra inputs the swap families need on top of the user/muun keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapScriptParams {
    SubmarineV1 {
        payment_hash: Vec<u8>,
        server_public_key: Vec<u8>,
        refund_address: String,
        lock_time: i64,
    },
    SubmarineV2 {
        payment_hash: Vec<u8>,
        server_public_key: Vec<u8>,
        blocks_for_expiration: i64,
    },
    IncomingHtlc {
        payment_hash: Vec<u8>,
        swap_server_public_key: Vec<u8>,
        expiration_height: i64,
    },
}

/// A built output: what to pay to, and the script that later unlocks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltOutput {
    pub script_pubkey: ScriptBuf,
    pub address: Address,
    /// P2SH redeem script (V2, V3, swap v1).
    pub redeem_script: Option<ScriptBuf>,
    /// Segwit v0 witness script (V3, V4 and the swap families).
    pub witness_script: Option<ScriptBuf>,
}

impl BuiltOutput {
    fn new(address: Address) -> Self {
        Self {
            script_pubkey: address.script_pubkey(),
            address,
            redeem_script: None,
            witness_script: None,
        }
    }
}

/// Build the locking script and address for any output family.
///
/// `muun` is required by every family except V1 and swap v1; `swap` only by
/// the swap families.
pub fn build_output(
    version: AddressVersion,
    user: &PublicKey,
    muun: Option<&PublicKey>,
    swap: Option<&SwapScriptParams>,
    network: Network,
) -> Result<BuiltOutput, ScriptError> {
    let require_muun = || muun.ok_or(ScriptError::MissingParameter("muun public key"));
    let p2sh = |script: &ScriptBuf| {
        Address::p2sh(script, network).map_err(|e| ScriptError::InvalidAddress {
            address: script.to_hex_string(),
            reason: e.to_string(),
        })
    };

    match (version, swap) {
        (AddressVersion::V1, _) => {
            let hash = bitcoin::PublicKey::new(*user).pubkey_hash();
            Ok(BuiltOutput::new(Address::p2pkh(hash, network)))
        }
        (AddressVersion::V2, _) => {
            let redeem = scripts::multisig_script(user, require_muun()?);
            let mut out = BuiltOutput::new(p2sh(&redeem)?);
            out.redeem_script = Some(redeem);
            Ok(out)
        }
        (AddressVersion::V3, _) => {
            let witness_script = scripts::multisig_script(user, require_muun()?);
            let redeem = scripts::nested_segwit_redeem_script(&witness_script);
            let mut out = BuiltOutput::new(p2sh(&redeem)?);
            out.redeem_script = Some(redeem);
            out.witness_script = Some(witness_script);
            Ok(out)
        }
        (AddressVersion::V4, _) => {
            let witness_script = scripts::multisig_script(user, require_muun()?);
            let mut out = BuiltOutput::new(Address::p2wsh(&witness_script, network));
            out.witness_script = Some(witness_script);
            Ok(out)
        }
        (AddressVersion::V5 | AddressVersion::V6, _) => {
            let musig = version
                .musig_version()
                .ok_or(ScriptError::UnsupportedVersion(version))?;
            let output_key = scripts::taproot_output_key(musig, user, require_muun()?)?;
            Ok(BuiltOutput::new(Address::p2tr_tweaked(output_key, network)))
        }
        (
            AddressVersion::SubmarineSwapV1,
            Some(SwapScriptParams::SubmarineV1 {
                payment_hash,
                server_public_key,
                refund_address,
                lock_time,
            }),
        ) => {
            let refund = parse_address(refund_address, network)?;
            let refund_hash = refund
                .pubkey_hash()
                .ok_or_else(|| ScriptError::RefundNotP2pkh(refund_address.clone()))?;
            let witness_script = scripts::submarine_swap_v1_script(
                payment_hash,
                server_public_key,
                &refund_hash,
                *lock_time,
            )?;
            let redeem = scripts::nested_segwit_redeem_script(&witness_script);
            let mut out = BuiltOutput::new(p2sh(&redeem)?);
            out.redeem_script = Some(redeem);
            out.witness_script = Some(witness_script);
            Ok(out)
        }
        (
            AddressVersion::SubmarineSwapV2,
            Some(SwapScriptParams::SubmarineV2 {
                payment_hash,
                server_public_key,
                blocks_for_expiration,
            }),
        ) => {
            let witness_script = scripts::submarine_swap_v2_script(
                payment_hash,
                &user.serialize(),
                &require_muun()?.serialize(),
                server_public_key,
                *blocks_for_expiration,
            )?;
            let mut out = BuiltOutput::new(Address::p2wsh(&witness_script, network));
            out.witness_script = Some(witness_script);
            Ok(out)
        }
        (
            AddressVersion::IncomingSwap,
            Some(SwapScriptParams::IncomingHtlc {
                payment_hash,
                swap_server_public_key,
                expiration_height,
            }),
        ) => {
            let witness_script = scripts::incoming_swap_htlc_script(
                &user.serialize(),
                &require_muun()?.serialize(),
                swap_server_public_key,
                *expiration_height,
                payment_hash,
            )?;
            let mut out = BuiltOutput::new(Address::p2wsh(&witness_script, network));
            out.witness_script = Some(witness_script);
            Ok(out)
        }
        (_, _) => Err(ScriptError::MissingParameter("swap script parameters")),
    }
}

/// Address for wallet keys already derived to the same path.
///
/// Only V1 through V6 are wallet addresses; swap outputs need
/// [`build_output`] with their parameters.
pub fn create_address(
    version: AddressVersion,
    user: &ExtendedPublicKey,
    muun: &ExtendedPublicKey,
) -> Result<MuunAddress, ScriptError> {
    if !version.is_wallet_version() {
        return Err(ScriptError::UnsupportedVersion(version));
    }

    let muun_key = muun.ec_public_key();
    let built = build_output(
        version,
        &user.ec_public_key(),
        Some(&muun_key),
        None,
        user.network(),
    )?;

    Ok(MuunAddress::new(
        version,
        user.path().to_string(),
        built.address.to_string(),
    ))
}
