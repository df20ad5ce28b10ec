//! Incoming Lightning payments settled on chain through an HTLC.
//!
//! The swap server locks funds in an HTLC paying to the user's invoice key.
//! The wallet claims it by revealing the invoice preimage together with its
//! own and muun's signatures. Before signing, the payer's sphinx onion is
//! checked against the invoice secrets so the server cannot claim a payment
//! that was never routed to us.

use bitcoin::consensus::{deserialize, serialize};
use bitcoin::secp256k1::{PublicKey, SecretKey};
use bitcoin::{Network, OutPoint, ScriptBuf, Transaction, Witness};
use cosign_core::{ExtendedPrivateKey, ExtendedPublicKey, HdPath, KeyError, PathIndex};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coin::input_mut;
use crate::error::SignError;
use crate::input::IncomingSwapData;
use crate::invoices::InvoiceSecrets;
use crate::serde_helpers::hex_bytes;
use crate::sighash;
use crate::{scripts, SigningContext, HTLC_KEY_CHILD_INDEX, IDENTITY_KEY_CHILD_INDEX};

#[derive(Error, Debug)]
#[error("{0}")]
pub struct SphinxError(pub String);

/// Decodes and checks the payer's onion for one of our invoices.
///
/// Implementations must reject multi-part payments and any final hop whose
/// payment secret, amount or expiry differ from what was passed in. A zero
/// `amount_msat` skips the amount check.
pub trait SphinxValidator {
    #[allow(clippy::too_many_arguments)]
    fn validate(
        &self,
        onion: &[u8],
        payment_hash: &[u8],
        payment_secret: &[u8],
        node_key: &SecretKey,
        expiry: u32,
        amount_msat: u64,
        network: Network,
    ) -> Result<(), SphinxError>;
}

/// Validator for builds without an onion decoder: every onion is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableSphinxValidator;

impl SphinxValidator for UnavailableSphinxValidator {
    fn validate(
        &self,
        _onion: &[u8],
        _payment_hash: &[u8],
        _payment_secret: &[u8],
        _node_key: &SecretKey,
        _expiry: u32,
        _amount_msat: u64,
        _network: Network,
    ) -> Result<(), SphinxError> {
        Err(SphinxError("no sphinx decoder available".to_string()))
    }
}

fn find_invoice(ctx: &SigningContext<'_>, payment_hash: &[u8]) -> Result<InvoiceSecrets, SignError> {
    ctx.invoices
        .find_by_payment_hash(payment_hash)
        .map_err(|e| SignError::Store(e.to_string()))?
        .ok_or_else(|| SignError::InvoiceNotFound(hex::encode(payment_hash)))
}

fn invoice_child_path(secrets: &InvoiceSecrets, child: u32) -> Result<String, SignError> {
    let parent = HdPath::parse(&secrets.key_path).map_err(KeyError::from)?;
    Ok(parent.child(PathIndex::normal(child)).as_str().to_string())
}

fn node_key(user: &ExtendedPrivateKey, secrets: &InvoiceSecrets) -> Result<SecretKey, SignError> {
    let identity_path = invoice_child_path(secrets, IDENTITY_KEY_CHILD_INDEX)?;
    Ok(user.derive_to(&identity_path)?.ec_private_key())
}

/// Where the HTLC keys and preimage come from.
enum HtlcSource {
    /// The cosigner sent the preimage and key path.
    Collaborative { preimage: Vec<u8> },
    /// Looked up in the local invoice store.
    Invoice(InvoiceSecrets),
}

impl HtlcSource {
    fn preimage(&self) -> &[u8] {
        match self {
            HtlcSource::Collaborative { preimage } => preimage,
            HtlcSource::Invoice(secrets) => &secrets.preimage,
        }
    }
}

/// Claim of an incoming swap HTLC output.
#[derive(Debug, Clone)]
pub struct IncomingSwapCoin {
    swap: IncomingSwapData,
    muun_signature: Option<Vec<u8>>,
    /// Check the sphinx amount against the claimed output. Only set when
    /// fulfilling through [`IncomingSwap::fulfill`].
    verify_output_amount: bool,
}

impl IncomingSwapCoin {
    pub(crate) fn from_input_data(swap: IncomingSwapData, muun_signature: Option<Vec<u8>>) -> Self {
        Self {
            swap,
            muun_signature,
            verify_output_amount: false,
        }
    }

    fn source(&self, ctx: &SigningContext<'_>) -> Result<(HtlcSource, String), SignError> {
        if let (Some(preimage), Some(key_path)) = (&self.swap.preimage, &self.swap.htlc_output_key_path) {
            if scripts::payment_hash_of(preimage)[..] != self.swap.payment_hash[..] {
                return Err(SignError::PreimageMismatch);
            }
            let source = HtlcSource::Collaborative {
                preimage: preimage.clone(),
            };
            return Ok((source, key_path.clone()));
        }

        let secrets = find_invoice(ctx, &self.swap.payment_hash)?;
        let htlc_path = invoice_child_path(&secrets, HTLC_KEY_CHILD_INDEX)?;
        Ok((HtlcSource::Invoice(secrets), htlc_path))
    }

    fn htlc_tx(&self) -> Result<Transaction, SignError> {
        deserialize(&self.swap.htlc_tx)
            .map_err(|e| SignError::MalformedTransaction(format!("htlc tx: {}", e)))
    }

    fn htlc_script(&self, user: &[u8], muun: &[u8]) -> Result<ScriptBuf, SignError> {
        Ok(scripts::incoming_swap_htlc_script(
            user,
            muun,
            &self.swap.swap_server_public_key,
            self.swap.expiration_height,
            &self.swap.payment_hash,
        )?)
    }

    fn find_htlc_output(htlc_tx: &Transaction, htlc_script: &ScriptBuf) -> Result<usize, SignError> {
        let script_pubkey = ScriptBuf::new_p2wsh(&htlc_script.wscript_hash());
        htlc_tx
            .output
            .iter()
            .position(|out| out.script_pubkey == script_pubkey)
            .ok_or(SignError::HtlcOutputNotFound)
    }

    pub(crate) fn sign_input(
        &mut self,
        index: usize,
        tx: &mut Transaction,
        user: &ExtendedPrivateKey,
        muun: &ExtendedPublicKey,
        ctx: &SigningContext<'_>,
    ) -> Result<(), SignError> {
        let (source, htlc_path) = self.source(ctx)?;
        let user_key = user.derive_to(&htlc_path)?;
        let muun_key = muun.derive_to(&htlc_path)?.ec_public_key();
        self.sign_derived(index, tx, user, &user_key, &muun_key, source, ctx)
    }

    /// `user_key` and `muun_key` are already at the HTLC path; `user` is the
    /// root the node key is derived from.
    #[allow(clippy::too_many_arguments)]
    fn sign_derived(
        &self,
        index: usize,
        tx: &mut Transaction,
        user: &ExtendedPrivateKey,
        user_key: &ExtendedPrivateKey,
        muun_key: &PublicKey,
        source: HtlcSource,
        ctx: &SigningContext<'_>,
    ) -> Result<(), SignError> {
        let htlc_tx = self.htlc_tx()?;
        let htlc_script = self.htlc_script(&user_key.ec_public_key().serialize(), &muun_key.serialize())?;
        let output_index = Self::find_htlc_output(&htlc_tx, &htlc_script)?;

        let expected = OutPoint::new(htlc_tx.compute_txid(), output_index as u32);
        if input_mut(tx, index)?.previous_output != expected {
            return Err(SignError::HtlcOutpointMismatch);
        }

        let muun_signature = self
            .muun_signature
            .clone()
            .ok_or(SignError::AwaitingCosigner("signature"))?;
        let htlc_amount = htlc_tx.output[output_index].value;
        let sighash = sighash::segwit_v0(tx, index, &htlc_script, htlc_amount)?;
        sighash::verify_ecdsa(sighash, &muun_signature, muun_key)?;

        if let HtlcSource::Invoice(secrets) = &source {
            self.validate_sphinx(tx, user, secrets, ctx)?;
        }

        let signature = sighash::sign_ecdsa(sighash, &user_key.ec_private_key());
        input_mut(tx, index)?.witness = Witness::from_slice(&[
            source.preimage(),
            &signature[..],
            &muun_signature[..],
            htlc_script.as_bytes(),
        ]);
        Ok(())
    }

    fn validate_sphinx(
        &self,
        tx: &Transaction,
        user: &ExtendedPrivateKey,
        secrets: &InvoiceSecrets,
        ctx: &SigningContext<'_>,
    ) -> Result<(), SignError> {
        let Some(onion) = self.swap.sphinx.as_deref().filter(|s| !s.is_empty()) else {
            return Ok(());
        };

        let amount_msat = if self.verify_output_amount {
            let output = tx.output.first().ok_or_else(|| {
                SignError::MalformedTransaction("fulfillment tx has no outputs".into())
            })?;
            // Collected debt was deducted from the output, add it back
            output
                .value
                .to_sat()
                .checked_add(self.swap.collect_sat)
                .and_then(|sat| sat.checked_mul(1000))
                .ok_or_else(|| {
                    SignError::MalformedInput(format!(
                        "output amount plus collected debt ({} sat) overflows",
                        self.swap.collect_sat
                    ))
                })?
        } else {
            0
        };

        let expiry = u32::try_from(self.swap.expiration_height).map_err(|_| {
            SignError::MalformedInput(format!("expiration height {}", self.swap.expiration_height))
        })?;
        ctx.sphinx
            .validate(
                onion,
                &self.swap.payment_hash,
                &secrets.payment_secret,
                &node_key(user, secrets)?,
                expiry,
                amount_msat,
                ctx.network,
            )
            .map_err(|e| SignError::Sphinx(e.to_string()))
    }

    pub(crate) fn fully_sign_input(
        &mut self,
        index: usize,
        tx: &mut Transaction,
        user: &ExtendedPrivateKey,
        muun: &ExtendedPrivateKey,
        ctx: &SigningContext<'_>,
    ) -> Result<(), SignError> {
        let htlc_tx = self.htlc_tx()?;
        let (source, htlc_path) = self.source(ctx)?;

        let user_key = user.derive_to(&htlc_path)?;
        let derived_muun = muun.derive_to(&htlc_path)?;
        let muun_key = derived_muun.ec_public_key();
        let htlc_script = self.htlc_script(&user_key.ec_public_key().serialize(), &muun_key.serialize())?;
        let output_index = Self::find_htlc_output(&htlc_tx, &htlc_script)?;

        let sighash = sighash::segwit_v0(tx, index, &htlc_script, htlc_tx.output[output_index].value)?;
        self.muun_signature = Some(sighash::sign_ecdsa(sighash, &derived_muun.ec_private_key()));

        self.sign_derived(index, tx, user, &user_key, &muun_key, source, ctx)
    }
}

/// The HTLC the swap server funded for an incoming payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingSwapHtlc {
    #[serde(with = "hex_bytes")]
    pub htlc_tx: Vec<u8>,
    pub expiration_height: i64,
    #[serde(with = "hex_bytes")]
    pub swap_server_public_key: Vec<u8>,
}

/// An incoming Lightning payment waiting to be settled.
///
/// `htlc` is absent when the payment is settled entirely against debt and
/// only the preimage is needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingSwap {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub htlc: Option<IncomingSwapHtlc>,
    #[serde(default, with = "hex_bytes")]
    pub sphinx_packet: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub payment_hash: Vec<u8>,
    pub payment_amount_sat: u64,
    #[serde(default)]
    pub collect_sat: u64,
}

/// The fulfillment transaction muun proposes, with its signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingSwapFulfillmentData {
    #[serde(with = "hex_bytes")]
    pub fulfillment_tx: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub muun_signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingSwapFulfillmentResult {
    /// Signed fulfillment tx; `None` for full-debt settlements.
    pub fulfillment_tx: Option<Vec<u8>>,
    pub preimage: Vec<u8>,
}

impl IncomingSwap {
    /// Check that we issued the invoice and the payment matches it.
    pub fn verify_fulfillable(
        &self,
        user: &ExtendedPrivateKey,
        ctx: &SigningContext<'_>,
    ) -> Result<(), SignError> {
        if self.payment_hash.len() != 32 {
            return Err(SignError::Precondition(format!(
                "invalid payment hash length {}",
                self.payment_hash.len()
            )));
        }

        let secrets = find_invoice(ctx, &self.payment_hash)?;
        let node_key = node_key(user, &secrets)?;

        // Payers may send a few extra sats
        if secrets.amount_sat != 0 && secrets.amount_sat > self.payment_amount_sat {
            return Err(SignError::Precondition(format!(
                "payment amount {} is below the invoice amount {}",
                self.payment_amount_sat, secrets.amount_sat
            )));
        }

        if self.sphinx_packet.is_empty() {
            return Ok(());
        }

        let amount_msat = self.payment_amount_sat.checked_mul(1000).ok_or_else(|| {
            SignError::MalformedInput(format!("payment amount {} sat overflows", self.payment_amount_sat))
        })?;
        ctx.sphinx
            .validate(
                &self.sphinx_packet,
                &self.payment_hash,
                &secrets.payment_secret,
                &node_key,
                0,
                amount_msat,
                ctx.network,
            )
            .map_err(|e| SignError::Sphinx(e.to_string()))
    }

    /// Validate and sign muun's fulfillment transaction.
    pub fn fulfill(
        &self,
        data: &IncomingSwapFulfillmentData,
        user: &ExtendedPrivateKey,
        muun: &ExtendedPublicKey,
        ctx: &SigningContext<'_>,
    ) -> Result<IncomingSwapFulfillmentResult, SignError> {
        let htlc = self
            .htlc
            .as_ref()
            .ok_or_else(|| SignError::Precondition("missing swap htlc data".into()))?;

        self.verify_fulfillable(user, ctx)?;

        let mut tx: Transaction = deserialize(&data.fulfillment_tx)
            .map_err(|e| SignError::MalformedTransaction(format!("fulfillment tx: {}", e)))?;
        if tx.input.len() != 1 {
            return Err(SignError::Precondition(format!(
                "expected fulfillment tx to have exactly 1 input, found {}",
                tx.input.len()
            )));
        }
        if tx.output.len() != 1 {
            return Err(SignError::Precondition(format!(
                "expected fulfillment tx to have exactly 1 output, found {}",
                tx.output.len()
            )));
        }

        let secrets = find_invoice(ctx, &self.payment_hash)?;

        let mut coin = IncomingSwapCoin {
            swap: IncomingSwapData {
                sphinx: Some(self.sphinx_packet.clone()),
                htlc_tx: htlc.htlc_tx.clone(),
                payment_hash: self.payment_hash.clone(),
                swap_server_public_key: htlc.swap_server_public_key.clone(),
                expiration_height: htlc.expiration_height,
                collect_sat: self.collect_sat,
                preimage: None,
                htlc_output_key_path: None,
            },
            muun_signature: Some(data.muun_signature.clone()),
            verify_output_amount: true,
        };
        coin.sign_input(0, &mut tx, user, muun, ctx)?;

        info!("Fulfilled incoming swap {}", hex::encode(&self.payment_hash));
        Ok(IncomingSwapFulfillmentResult {
            fulfillment_tx: Some(serialize(&tx)),
            preimage: secrets.preimage,
        })
    }

    /// Settle a payment fully covered by debt: only the preimage is revealed.
    pub fn fulfill_full_debt(&self, ctx: &SigningContext<'_>) -> Result<IncomingSwapFulfillmentResult, SignError> {
        let secrets = find_invoice(ctx, &self.payment_hash)?;
        debug!("Releasing preimage for {}", hex::encode(&self.payment_hash));
        Ok(IncomingSwapFulfillmentResult {
            fulfillment_tx: None,
            preimage: secrets.preimage,
        })
    }
}
