//! Request files and the commands that serve them.
//!
//! Every command reads one JSON request and returns one JSON response.
//! Extended keys are given in base58 together with the path they sit at.

use anyhow::{Context, Result};
use bitcoin::Network;
use cosign_core::{ExtendedPrivateKey, ExtendedPublicKey};
use cosign_musig::SessionId;
use cosign_tx::{
    create_address, AddressVersion, Input, MusigNonces, MuunAddress, PartiallySignedTransaction,
    SigningContext, SigningExpectations,
};
use log::info;
use serde::{Deserialize, Serialize};

fn default_base_path() -> String {
    "m".to_string()
}

/// Encoded user and muun keys.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyPair {
    #[serde(default = "default_base_path")]
    pub base_path: String,
    pub user: String,
    pub muun: String,
}

impl KeyPair {
    fn user_private(&self, network: Network) -> Result<ExtendedPrivateKey> {
        ExtendedPrivateKey::from_base58(&self.user, &self.base_path, network)
            .context("keys.user is not a valid extended private key")
    }

    fn user_public(&self, network: Network) -> Result<ExtendedPublicKey> {
        ExtendedPublicKey::from_base58(&self.user, &self.base_path, network)
            .context("keys.user is not a valid extended public key")
    }

    fn muun_private(&self, network: Network) -> Result<ExtendedPrivateKey> {
        ExtendedPrivateKey::from_base58(&self.muun, &self.base_path, network)
            .context("keys.muun is not a valid extended private key")
    }

    fn muun_public(&self, network: Network) -> Result<ExtendedPublicKey> {
        ExtendedPublicKey::from_base58(&self.muun, &self.base_path, network)
            .context("keys.muun is not a valid extended public key")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddressRequest {
    pub keys: KeyPair,
    pub version: AddressVersion,
    pub derivation_path: String,
}

/// An unsigned transaction with its input descriptors.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionRequest {
    pub keys: KeyPair,
    pub tx: String,
    pub inputs: Vec<Input>,
    /// Hex session ids from a previous `nonces` run, one per input.
    #[serde(default)]
    pub session_ids: Vec<String>,
}

impl TransactionRequest {
    fn nonces(&self) -> Result<MusigNonces> {
        if self.session_ids.is_empty() {
            return Ok(MusigNonces::generate(self.inputs.len()));
        }
        let ids = self
            .session_ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let bytes: [u8; 32] = hex::decode(id)
                    .ok()
                    .and_then(|b| b.try_into().ok())
                    .with_context(|| format!("session_ids[{}] must be 32 hex-encoded bytes", i))?;
                Ok(SessionId::from_bytes(bytes))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(MusigNonces::from_fixed_session_ids(ids))
    }

    fn pst(&self) -> Result<PartiallySignedTransaction> {
        PartiallySignedTransaction::from_hex(&self.tx, self.inputs.clone(), self.nonces()?)
            .context("Failed to build partially signed transaction")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpectationsRequest {
    pub destination: String,
    pub amount: u64,
    #[serde(default)]
    pub change: Option<MuunAddress>,
    pub fee: u64,
    #[serde(default)]
    pub alternative: bool,
}

impl ExpectationsRequest {
    fn to_expectations(&self) -> SigningExpectations {
        let expectations = SigningExpectations::new(
            self.destination.clone(),
            self.amount,
            self.change.clone(),
            self.fee,
        );
        if self.alternative {
            expectations.for_alternative_transaction()
        } else {
            expectations
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyRequest {
    pub keys: KeyPair,
    pub tx: String,
    pub inputs: Vec<Input>,
    pub expectations: ExpectationsRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NonceEntry {
    pub index: usize,
    pub session_id: String,
    /// Only Taproot inputs have one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_nonce: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedResponse {
    pub txid: String,
    pub tx: String,
}

pub fn address(request: &AddressRequest, network: Network) -> Result<MuunAddress> {
    let path = &request.derivation_path;
    let user = request.keys.user_public(network)?.derive_to(path)?;
    let muun = request.keys.muun_public(network)?.derive_to(path)?;
    Ok(create_address(request.version, &user, &muun)?)
}

/// A fresh session per input, with the public nonces to send the cosigner.
pub fn nonces(request: &TransactionRequest, network: Network) -> Result<Vec<NonceEntry>> {
    let user = request.keys.user_private(network)?;
    let nonces = MusigNonces::generate(request.inputs.len());

    let mut entries = Vec::with_capacity(request.inputs.len());
    for (index, input) in request.inputs.iter().enumerate() {
        let session_id = nonces
            .session_id(index)
            .context("nonce batch is shorter than the input list")?;
        let public_nonce = match input.address.version.musig_version() {
            Some(version) => {
                let key = user.derive_to(&input.address.derivation_path)?.ec_public_key();
                Some(hex::encode(nonces.public_nonce_for(index, version, &key)?.to_bytes()))
            }
            None => None,
        };
        entries.push(NonceEntry {
            index,
            session_id: hex::encode(session_id.as_bytes()),
            public_nonce,
        });
    }
    Ok(entries)
}

pub fn sign(request: &TransactionRequest, ctx: &SigningContext<'_>) -> Result<SignedResponse> {
    let user = request.keys.user_private(ctx.network)?;
    let muun = request.keys.muun_public(ctx.network)?;
    let signed = request.pst()?.sign(&user, &muun, ctx)?;
    Ok(SignedResponse {
        txid: signed.hash.to_string(),
        tx: signed.to_hex(),
    })
}

pub fn fully_sign(request: &TransactionRequest, ctx: &SigningContext<'_>) -> Result<SignedResponse> {
    let user = request.keys.user_private(ctx.network)?;
    let muun = request.keys.muun_private(ctx.network)?;
    let signed = request.pst()?.fully_sign(&user, &muun, ctx)?;
    Ok(SignedResponse {
        txid: signed.hash.to_string(),
        tx: signed.to_hex(),
    })
}

pub fn verify(request: &VerifyRequest, network: Network) -> Result<()> {
    let user = request.keys.user_public(network)?;
    let muun = request.keys.muun_public(network)?;
    let pst = PartiallySignedTransaction::from_hex(
        &request.tx,
        request.inputs.clone(),
        MusigNonces::default(),
    )?;
    pst.verify(&request.expectations.to_expectations(), &user, &muun)?;
    info!("Transaction matches the expected outputs");
    Ok(())
}
