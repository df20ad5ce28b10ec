//! Per-input descriptors, index-aligned with the raw transaction's inputs.

use bitcoin::{Amount, Txid};
use serde::{Deserialize, Serialize};

use crate::address::MuunAddress;
use crate::serde_helpers::{amount_serde, hex_bytes, hex_bytes_opt};

/// The UTXO an input spends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outpoint {
    pub txid: Txid,
    pub index: u32,
    #[serde(with = "amount_serde")]
    pub amount: Amount,
}

/// Everything needed to sign one input.
///
/// For V2 to V4 `muun_signature` is a DER signature with sighash byte. For V5
/// and V6 it is the cosigner's 32-byte MuSig2 partial signature, sent along
/// with `muun_public_nonce`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub outpoint: Outpoint,
    pub address: MuunAddress,
    #[serde(default, with = "hex_bytes_opt", skip_serializing_if = "Option::is_none")]
    pub user_signature: Option<Vec<u8>>,
    #[serde(default, with = "hex_bytes_opt", skip_serializing_if = "Option::is_none")]
    pub muun_signature: Option<Vec<u8>>,
    #[serde(default, with = "hex_bytes_opt", skip_serializing_if = "Option::is_none")]
    pub muun_public_nonce: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submarine_swap_v1: Option<SubmarineSwapV1Data>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submarine_swap_v2: Option<SubmarineSwapV2Data>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incoming_swap: Option<IncomingSwapData>,
}

impl Input {
    pub fn new(outpoint: Outpoint, address: MuunAddress) -> Self {
        Self {
            outpoint,
            address,
            user_signature: None,
            muun_signature: None,
            muun_public_nonce: None,
            submarine_swap_v1: None,
            submarine_swap_v2: None,
            incoming_swap: None,
        }
    }

    pub fn with_muun_signature(mut self, signature: Vec<u8>) -> Self {
        self.muun_signature = Some(signature);
        self
    }

    /// Attach the cosigner's MuSig2 round two output.
    pub fn with_muun_partial_signature(mut self, public_nonce: Vec<u8>, partial: Vec<u8>) -> Self {
        self.muun_public_nonce = Some(public_nonce);
        self.muun_signature = Some(partial);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmarineSwapV1Data {
    pub refund_address: String,
    #[serde(with = "hex_bytes")]
    pub payment_hash: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub server_public_key: Vec<u8>,
    pub lock_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmarineSwapV2Data {
    #[serde(with = "hex_bytes")]
    pub payment_hash: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub user_public_key: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub muun_public_key: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub server_public_key: Vec<u8>,
    pub blocks_for_expiration: i64,
    #[serde(default, with = "hex_bytes_opt", skip_serializing_if = "Option::is_none")]
    pub server_signature: Option<Vec<u8>>,
}

/// HTLC data for fulfilling an incoming Lightning payment on chain.
///
/// When `preimage` and `htlc_output_key_path` are both set the cosigner
/// supplied them and no local invoice lookup happens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingSwapData {
    #[serde(default, with = "hex_bytes_opt", skip_serializing_if = "Option::is_none")]
    pub sphinx: Option<Vec<u8>>,
    #[serde(with = "hex_bytes")]
    pub htlc_tx: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub payment_hash: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub swap_server_public_key: Vec<u8>,
    pub expiration_height: i64,
    #[serde(default)]
    pub collect_sat: u64,
    #[serde(default, with = "hex_bytes_opt", skip_serializing_if = "Option::is_none")]
    pub preimage: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub htlc_output_key_path: Option<String>,
}
