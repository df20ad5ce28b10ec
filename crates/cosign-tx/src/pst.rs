//! The signing orchestrator.
//!
//! A [`PartiallySignedTransaction`] pairs an unsigned transaction with one
//! [`Input`] descriptor per transaction input. It can be checked against
//! what the user asked for ([`PartiallySignedTransaction::verify`]) and then
//! signed as a whole. Signing is all or nothing: the first failing input
//! aborts and nothing signed is returned.

use bitcoin::consensus::{deserialize, serialize};
use bitcoin::secp256k1::PublicKey;
use bitcoin::{Network, ScriptBuf, Transaction, TxOut, Txid};
use cosign_core::{ExtendedPrivateKey, ExtendedPublicKey};
use cosign_musig::{generate_nonce, MusigVersion, PublicNonce, SessionId};
use log::{debug, info};

use crate::address::{create_address, parse_address, MuunAddress};
use crate::coin::Coin;
use crate::error::{SignError, VerifyError};
use crate::input::Input;
use crate::{SigningContext, DUST_THRESHOLD};

/// User-side MuSig2 sessions, one per transaction input.
///
/// Session ids are secret: the public nonces sent to the cosigner are
/// derived from them, and reusing one for two messages leaks the key.
#[derive(Debug, Clone, Default)]
pub struct MusigNonces {
    session_ids: Vec<SessionId>,
}

impl MusigNonces {
    /// Fresh random sessions for `count` inputs.
    pub fn generate(count: usize) -> Self {
        Self {
            session_ids: (0..count).map(|_| SessionId::random()).collect(),
        }
    }

    /// Sessions from caller-chosen ids.
    ///
    /// Only for reproducible tests and for resuming a batch whose ids were
    /// persisted. Never pass ids that were already used to sign.
    pub fn from_fixed_session_ids(session_ids: Vec<SessionId>) -> Self {
        Self { session_ids }
    }

    pub fn len(&self) -> usize {
        self.session_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.session_ids.is_empty()
    }

    pub fn session_id(&self, index: usize) -> Option<&SessionId> {
        self.session_ids.get(index)
    }

    /// The public nonce to send to the cosigner for input `index`.
    ///
    /// V5 nonces depend only on the session; V6 nonces are bound to the
    /// user's key at the input's path.
    pub fn public_nonce_for(
        &self,
        index: usize,
        version: MusigVersion,
        user_key: &PublicKey,
    ) -> Result<PublicNonce, SignError> {
        let session_id = self.session_id(index).ok_or(SignError::MissingNonce(index))?;
        Ok(generate_nonce(version, session_id, user_key)?.1)
    }
}

/// What the user agreed to pay, checked before any signature leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningExpectations {
    destination: String,
    amount: u64,
    change: Option<MuunAddress>,
    fee: u64,
    alternative: bool,
}

impl SigningExpectations {
    pub fn new(destination: impl Into<String>, amount: u64, change: Option<MuunAddress>, fee: u64) -> Self {
        Self {
            destination: destination.into(),
            amount,
            change,
            fee,
            alternative: false,
        }
    }

    /// Same expectations for an alternative (fee-bumped) transaction, where
    /// the destination may be reduced or dropped and the difference goes to
    /// fees.
    pub fn for_alternative_transaction(&self) -> Self {
        Self {
            alternative: true,
            ..self.clone()
        }
    }

    pub fn is_alternative(&self) -> bool {
        self.alternative
    }
}

/// A fully signed transaction, ready to broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub hash: Txid,
    pub bytes: Vec<u8>,
}

impl SignedTransaction {
    fn new(tx: &Transaction) -> Self {
        Self {
            hash: tx.compute_txid(),
            bytes: serialize(tx),
        }
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

fn address_script(address: &str, network: Network) -> Result<ScriptBuf, VerifyError> {
    parse_address(address, network)
        .map(|a| a.script_pubkey())
        .map_err(|e| VerifyError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

#[derive(Debug, Clone)]
pub struct PartiallySignedTransaction {
    tx: Transaction,
    inputs: Vec<Input>,
    nonces: MusigNonces,
}

impl PartiallySignedTransaction {
    pub fn new(tx: Transaction, inputs: Vec<Input>, nonces: MusigNonces) -> Result<Self, SignError> {
        if tx.input.len() != inputs.len() {
            return Err(SignError::InputCountMismatch {
                tx_inputs: tx.input.len(),
                descriptors: inputs.len(),
            });
        }
        Ok(Self { tx, inputs, nonces })
    }

    pub fn from_bytes(raw_tx: &[u8], inputs: Vec<Input>, nonces: MusigNonces) -> Result<Self, SignError> {
        let tx: Transaction =
            deserialize(raw_tx).map_err(|e| SignError::MalformedTransaction(e.to_string()))?;
        Self::new(tx, inputs, nonces)
    }

    pub fn from_hex(raw_tx: &str, inputs: Vec<Input>, nonces: MusigNonces) -> Result<Self, SignError> {
        let bytes = hex::decode(raw_tx).map_err(|e| SignError::MalformedTransaction(e.to_string()))?;
        Self::from_bytes(&bytes, inputs, nonces)
    }

    pub fn tx(&self) -> &Transaction {
        &self.tx
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    /// Every input's previous output, rebuilt from its address and amount.
    fn prevouts(&self, network: Network) -> Result<Vec<TxOut>, SignError> {
        self.inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                let script_pubkey = input
                    .address
                    .script_pubkey(network)
                    .map_err(|e| SignError::from(e).at_input(index, input.address.version))?;
                Ok(TxOut {
                    value: input.outpoint.amount,
                    script_pubkey,
                })
            })
            .collect()
    }

    fn coins(&self, network: Network) -> Result<Vec<Coin>, SignError> {
        let prevouts = self.prevouts(network)?;
        self.inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                let session_id = self.nonces.session_id(index).cloned();
                Coin::from_input(input, &prevouts, session_id)
                    .map_err(|e| e.at_input(index, input.address.version))
            })
            .collect()
    }

    /// Add the user's signatures, using the cosigner material attached to
    /// each input.
    pub fn sign(
        &self,
        user: &ExtendedPrivateKey,
        muun: &ExtendedPublicKey,
        ctx: &SigningContext<'_>,
    ) -> Result<SignedTransaction, SignError> {
        let mut tx = self.tx.clone();
        for (index, mut coin) in self.coins(ctx.network)?.into_iter().enumerate() {
            coin.sign_input(index, &mut tx, user, muun, ctx)
                .map_err(|e| e.at_input(index, coin.version()))?;
        }

        let signed = SignedTransaction::new(&tx);
        info!("Signed {} inputs of {}", tx.input.len(), signed.hash);
        Ok(signed)
    }

    /// Sign every input with both private keys (recovery without the
    /// cosigner).
    pub fn fully_sign(
        &self,
        user: &ExtendedPrivateKey,
        muun: &ExtendedPrivateKey,
        ctx: &SigningContext<'_>,
    ) -> Result<SignedTransaction, SignError> {
        let mut tx = self.tx.clone();
        for (index, mut coin) in self.coins(ctx.network)?.into_iter().enumerate() {
            coin.fully_sign_input(index, &mut tx, user, muun, ctx)
                .map_err(|e| e.at_input(index, coin.version()))?;
        }

        let signed = SignedTransaction::new(&tx);
        info!("Fully signed {} inputs of {}", tx.input.len(), signed.hash);
        Ok(signed)
    }

    /// Check the outputs pay exactly what `expectations` describe.
    ///
    /// The change address is re-derived from our own keys, never trusted
    /// from the transaction. Input amounts are taken from the descriptors;
    /// segwit sighashes commit to them.
    pub fn verify(
        &self,
        expectations: &SigningExpectations,
        user: &ExtendedPublicKey,
        muun: &ExtendedPublicKey,
    ) -> Result<(), VerifyError> {
        let network = user.network();
        let outputs = &self.tx.output;

        match (&expectations.change, expectations.alternative) {
            // Alternatives may have dropped the destination
            (Some(_), true) if outputs.len() > 2 => {
                return Err(VerifyError::OutputCount {
                    expected: "at most 2",
                    actual: outputs.len(),
                })
            }
            (Some(_), false) if outputs.len() != 2 => {
                return Err(VerifyError::OutputCount {
                    expected: "2",
                    actual: outputs.len(),
                })
            }
            (None, _) if outputs.len() != 1 => {
                return Err(VerifyError::OutputCount {
                    expected: "1",
                    actual: outputs.len(),
                })
            }
            _ => {}
        }

        let to_script = address_script(&expectations.destination, network)?;
        let change_script = expectations
            .change
            .as_ref()
            .map(|change| address_script(&change.address, network))
            .transpose()?;

        let mut to_output = None;
        let mut change_output = None;
        for output in outputs {
            if output.script_pubkey == to_script {
                to_output = Some(output);
            } else if change_script.as_ref() == Some(&output.script_pubkey) {
                change_output = Some(output);
            }
        }

        let mut expected_amount = expectations.amount as i64;
        let mut expected_fee = expectations.fee as i64;

        if expectations.alternative {
            if to_output.is_none() && change_output.is_none() {
                return Err(VerifyError::NoDestinationOrChange);
            }
            if let Some(to) = to_output {
                if to.value.to_sat() >= expectations.amount {
                    return Err(VerifyError::DestinationNotReduced {
                        found: to.value.to_sat(),
                        expected: expectations.amount,
                    });
                }
            }
            if (to_output.is_none() || change_output.is_none()) && outputs.len() > 1 {
                return Err(VerifyError::OutputCount {
                    expected: "1",
                    actual: outputs.len(),
                });
            }

            // Whatever the destination lost went to fees
            let paid = to_output.map_or(0, |to| to.value.to_sat() as i64);
            expected_fee += expected_amount - paid;
            expected_amount = paid;
        } else {
            let to = to_output.ok_or(VerifyError::DestinationNotFound)?;
            if to.value.to_sat() != expectations.amount {
                return Err(VerifyError::DestinationAmount {
                    found: to.value.to_sat(),
                    expected: expectations.amount,
                });
            }
        }

        let total_in: i64 = self
            .inputs
            .iter()
            .map(|input| input.outpoint.amount.to_sat() as i64)
            .sum();

        match &expectations.change {
            Some(change) => {
                let change_output = change_output.ok_or(VerifyError::ChangeNotFound)?;

                let expected_change = total_in - expected_amount - expected_fee;
                let found_change = change_output.value.to_sat() as i64;
                if found_change != expected_change {
                    return Err(VerifyError::ChangeAmount {
                        found: found_change,
                        expected: expected_change,
                    });
                }

                let derived = create_address(
                    change.version,
                    &user.derive_to(&change.derivation_path)?,
                    &muun.derive_to(&change.derivation_path)?,
                )?;
                if derived.address != change.address {
                    return Err(VerifyError::ChangeAddress {
                        found: change.address.clone(),
                        expected: derived.address,
                    });
                }
            }
            None => {
                let fee = total_in - expected_amount;
                if fee >= expected_fee + DUST_THRESHOLD as i64 {
                    return Err(VerifyError::ChangeBurnedAsFee);
                }
            }
        }

        debug!(
            "Verified {} outputs (alternative: {})",
            outputs.len(),
            expectations.alternative
        );
        Ok(())
    }
}
