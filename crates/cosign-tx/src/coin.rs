//! Per-version input signers.
//!
//! [`Coin`] is a closed enum: one signing algorithm per output family,
//! picked by matching on the input's [`AddressVersion`]. Old versions stay
//! byte-for-byte compatible since old UTXOs must remain spendable.
//!
//! Every coin supports two operations:
//!
//! - `sign_input`: add the user's part, using cosigner material already
//!   attached to the input
//! - `fully_sign_input`: produce the cosigner's part locally first (recovery
//!   with both private keys), then run `sign_input`

use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::secp256k1::PublicKey;
use bitcoin::{Amount, ScriptBuf, Transaction, TxOut, Witness};
use cosign_core::{ExtendedPrivateKey, ExtendedPublicKey};
use cosign_musig::{
    add_user_signature_and_combine, compute_cosigner_partial_signature, generate_nonce,
    CosignerSignature, MusigTweaks, MusigVersion, PartialSignature, PublicNonce, SessionId,
};
use log::debug;

use crate::address::AddressVersion;
use crate::error::SignError;
use crate::incoming_swap::IncomingSwapCoin;
use crate::input::Input;
use crate::scripts;
use crate::sighash;
use crate::swaps::{SubmarineSwapV1Coin, SubmarineSwapV2Coin};
use crate::SigningContext;

pub(crate) fn push_data(data: &[u8]) -> Result<PushBytesBuf, SignError> {
    PushBytesBuf::try_from(data.to_vec())
        .map_err(|_| SignError::MalformedInput(format!("{} bytes cannot be pushed", data.len())))
}

pub(crate) fn input_mut(tx: &mut Transaction, index: usize) -> Result<&mut bitcoin::TxIn, SignError> {
    let count = tx.input.len();
    tx.input.get_mut(index).ok_or_else(|| {
        SignError::MalformedTransaction(format!("input {} out of range ({} inputs)", index, count))
    })
}

/// A spendable input, tagged by output family.
#[derive(Debug, Clone)]
pub enum Coin {
    V1(SingleSigCoin),
    Multisig(MultisigCoin),
    Taproot(TaprootCoin),
    SubmarineSwapV1(SubmarineSwapV1Coin),
    SubmarineSwapV2(SubmarineSwapV2Coin),
    IncomingSwap(IncomingSwapCoin),
}

impl Coin {
    /// Build the coin for `input`.
    ///
    /// `prevouts` holds every input's previous output (Taproot sighashes
    /// commit to all of them). `session_id` is the user's MuSig2 session for
    /// this input, if one was generated.
    pub fn from_input(
        input: &Input,
        prevouts: &[TxOut],
        session_id: Option<SessionId>,
    ) -> Result<Self, SignError> {
        let key_path = input.address.derivation_path.clone();
        let amount = input.outpoint.amount;
        let version = input.address.version;

        let coin = match version {
            AddressVersion::V1 => Coin::V1(SingleSigCoin { key_path }),
            AddressVersion::V2 | AddressVersion::V3 | AddressVersion::V4 => {
                Coin::Multisig(MultisigCoin {
                    version,
                    key_path,
                    amount,
                    muun_signature: input.muun_signature.clone(),
                })
            }
            AddressVersion::V5 | AddressVersion::V6 => {
                let musig_version = version
                    .musig_version()
                    .ok_or(SignError::UnsupportedVersion(version))?;
                Coin::Taproot(TaprootCoin {
                    musig_version,
                    key_path,
                    session_id,
                    muun_public_nonce: input.muun_public_nonce.clone(),
                    muun_partial_signature: input.muun_signature.clone(),
                    prevouts: prevouts.to_vec(),
                })
            }
            AddressVersion::SubmarineSwapV1 => {
                let swap = input.submarine_swap_v1.clone().ok_or_else(|| {
                    SignError::MalformedInput("submarine swap data is missing for swap input".into())
                })?;
                Coin::SubmarineSwapV1(SubmarineSwapV1Coin::new(key_path, amount, swap))
            }
            AddressVersion::SubmarineSwapV2 => {
                let swap = input.submarine_swap_v2.clone().ok_or_else(|| {
                    SignError::MalformedInput("submarine swap data is missing for swap input".into())
                })?;
                Coin::SubmarineSwapV2(SubmarineSwapV2Coin::new(key_path, amount, swap))
            }
            AddressVersion::IncomingSwap => {
                let swap = input.incoming_swap.clone().ok_or_else(|| {
                    SignError::MalformedInput("incoming swap data is missing for incoming swap input".into())
                })?;
                Coin::IncomingSwap(IncomingSwapCoin::from_input_data(
                    swap,
                    input.muun_signature.clone(),
                ))
            }
        };
        Ok(coin)
    }

    pub fn version(&self) -> AddressVersion {
        match self {
            Coin::V1(_) => AddressVersion::V1,
            Coin::Multisig(coin) => coin.version,
            Coin::Taproot(coin) => match coin.musig_version {
                MusigVersion::V040 => AddressVersion::V5,
                MusigVersion::V100 => AddressVersion::V6,
            },
            Coin::SubmarineSwapV1(_) => AddressVersion::SubmarineSwapV1,
            Coin::SubmarineSwapV2(_) => AddressVersion::SubmarineSwapV2,
            Coin::IncomingSwap(_) => AddressVersion::IncomingSwap,
        }
    }

    /// Add the user's signature to input `index` of `tx`.
    pub fn sign_input(
        &mut self,
        index: usize,
        tx: &mut Transaction,
        user: &ExtendedPrivateKey,
        muun: &ExtendedPublicKey,
        ctx: &SigningContext<'_>,
    ) -> Result<(), SignError> {
        debug!("Signing input {} ({})", index, self.version());
        match self {
            Coin::V1(coin) => coin.sign_input(index, tx, user),
            Coin::Multisig(coin) => coin.sign_input(index, tx, user, muun),
            Coin::Taproot(coin) => coin.sign_input(index, tx, user, muun),
            Coin::SubmarineSwapV1(coin) => coin.sign_input(index, tx, user, ctx),
            Coin::SubmarineSwapV2(coin) => coin.sign_input(index, tx, user),
            Coin::IncomingSwap(coin) => coin.sign_input(index, tx, user, muun, ctx),
        }
    }

    /// Sign input `index` with both private keys.
    pub fn fully_sign_input(
        &mut self,
        index: usize,
        tx: &mut Transaction,
        user: &ExtendedPrivateKey,
        muun: &ExtendedPrivateKey,
        ctx: &SigningContext<'_>,
    ) -> Result<(), SignError> {
        debug!("Fully signing input {} ({})", index, self.version());
        match self {
            Coin::V1(coin) => coin.sign_input(index, tx, user),
            Coin::Multisig(coin) => coin.fully_sign_input(index, tx, user, muun),
            Coin::Taproot(coin) => coin.fully_sign_input(index, tx, user, muun),
            // The counterparty branches of the swap scripts are never ours
            Coin::SubmarineSwapV1(coin) => coin.sign_input(index, tx, user, ctx),
            Coin::SubmarineSwapV2(coin) => coin.sign_input(index, tx, user),
            Coin::IncomingSwap(coin) => coin.fully_sign_input(index, tx, user, muun, ctx),
        }
    }
}

// ─── V1 ───

/// P2PKH spend with the user key alone.
#[derive(Debug, Clone)]
pub struct SingleSigCoin {
    key_path: String,
}

impl SingleSigCoin {
    fn sign_input(
        &self,
        index: usize,
        tx: &mut Transaction,
        user: &ExtendedPrivateKey,
    ) -> Result<(), SignError> {
        let derived = user.derive_to(&self.key_path)?;
        let public_key = bitcoin::PublicKey::new(derived.ec_public_key());
        let script_code = ScriptBuf::new_p2pkh(&public_key.pubkey_hash());

        let sighash = sighash::legacy(tx, index, &script_code)?;
        let signature = sighash::sign_ecdsa(sighash, &derived.ec_private_key());

        let script_sig = Builder::new()
            .push_slice(push_data(&signature)?)
            .push_key(&public_key)
            .into_script();
        input_mut(tx, index)?.script_sig = script_sig;
        Ok(())
    }
}

// ─── V2, V3, V4 ───

/// 2-of-2 CHECKMULTISIG, bare P2SH, nested or native segwit.
#[derive(Debug, Clone)]
pub struct MultisigCoin {
    version: AddressVersion,
    key_path: String,
    amount: Amount,
    muun_signature: Option<Vec<u8>>,
}

impl MultisigCoin {
    fn sighash(
        &self,
        index: usize,
        tx: &Transaction,
        witness_script: &ScriptBuf,
    ) -> Result<[u8; 32], SignError> {
        match self.version {
            AddressVersion::V2 => sighash::legacy(tx, index, witness_script),
            _ => sighash::segwit_v0(tx, index, witness_script, self.amount),
        }
    }

    fn sign_input(
        &mut self,
        index: usize,
        tx: &mut Transaction,
        user: &ExtendedPrivateKey,
        muun: &ExtendedPublicKey,
    ) -> Result<(), SignError> {
        let user = user.derive_to(&self.key_path)?;
        let muun_key = muun.derive_to(&self.key_path)?.ec_public_key();
        self.sign_derived(index, tx, &user, &muun_key)
    }

    /// `user` and `muun_key` are already at the input's path.
    fn sign_derived(
        &self,
        index: usize,
        tx: &mut Transaction,
        user: &ExtendedPrivateKey,
        muun_key: &PublicKey,
    ) -> Result<(), SignError> {
        let script = scripts::multisig_script(&user.ec_public_key(), muun_key);

        let muun_signature = self
            .muun_signature
            .as_deref()
            .ok_or(SignError::AwaitingCosigner("signature"))?;

        let sighash = self.sighash(index, tx, &script)?;
        sighash::verify_ecdsa(sighash, muun_signature, muun_key)?;
        let user_signature = sighash::sign_ecdsa(sighash, &user.ec_private_key());

        let txin = input_mut(tx, index)?;
        match self.version {
            AddressVersion::V2 => {
                // OP_0 feeds the extra item CHECKMULTISIG pops
                txin.script_sig = Builder::new()
                    .push_opcode(bitcoin::opcodes::OP_0)
                    .push_slice(push_data(&user_signature)?)
                    .push_slice(push_data(muun_signature)?)
                    .push_slice(push_data(script.as_bytes())?)
                    .into_script();
            }
            version => {
                if version == AddressVersion::V3 {
                    let redeem = scripts::nested_segwit_redeem_script(&script);
                    txin.script_sig = Builder::new()
                        .push_slice(push_data(redeem.as_bytes())?)
                        .into_script();
                }
                txin.witness = Witness::from_slice(&[
                    &[][..],
                    &user_signature[..],
                    muun_signature,
                    script.as_bytes(),
                ]);
            }
        }
        Ok(())
    }

    fn fully_sign_input(
        &mut self,
        index: usize,
        tx: &mut Transaction,
        user: &ExtendedPrivateKey,
        muun: &ExtendedPrivateKey,
    ) -> Result<(), SignError> {
        let user = user.derive_to(&self.key_path)?;
        let derived_muun = muun.derive_to(&self.key_path)?;
        let muun_key = derived_muun.ec_public_key();
        let script = scripts::multisig_script(&user.ec_public_key(), &muun_key);

        let sighash = self.sighash(index, tx, &script)?;
        self.muun_signature = Some(sighash::sign_ecdsa(sighash, &derived_muun.ec_private_key()));

        self.sign_derived(index, tx, &user, &muun_key)
    }
}

// ─── V5, V6 ───

/// Taproot key spend signed with a two-party MuSig2 session.
#[derive(Debug, Clone)]
pub struct TaprootCoin {
    musig_version: MusigVersion,
    key_path: String,
    session_id: Option<SessionId>,
    muun_public_nonce: Option<Vec<u8>>,
    muun_partial_signature: Option<Vec<u8>>,
    prevouts: Vec<TxOut>,
}

impl TaprootCoin {
    fn session_id(&self, index: usize) -> Result<SessionId, SignError> {
        self.session_id.clone().ok_or(SignError::MissingNonce(index))
    }

    fn sign_input(
        &mut self,
        index: usize,
        tx: &mut Transaction,
        user: &ExtendedPrivateKey,
        muun: &ExtendedPublicKey,
    ) -> Result<(), SignError> {
        let user = user.derive_to(&self.key_path)?;
        let muun_key = muun.derive_to(&self.key_path)?.ec_public_key();
        self.sign_derived(index, tx, &user, &muun_key)
    }

    /// `user` and `muun_key` are already at the input's path.
    fn sign_derived(
        &self,
        index: usize,
        tx: &mut Transaction,
        user: &ExtendedPrivateKey,
        muun_key: &PublicKey,
    ) -> Result<(), SignError> {
        let session_id = self.session_id(index)?;
        let public_nonce = self
            .muun_public_nonce
            .as_deref()
            .ok_or(SignError::AwaitingCosigner("public nonce"))?;
        let partial_signature = self
            .muun_partial_signature
            .as_deref()
            .ok_or(SignError::AwaitingCosigner("partial signature"))?;
        let cosigner = CosignerSignature {
            public_nonce: PublicNonce::from_bytes(public_nonce)
                .map_err(|e| SignError::MalformedSignature(e.to_string()))?,
            partial_signature: PartialSignature::from_bytes(partial_signature)
                .map_err(|e| SignError::MalformedSignature(e.to_string()))?,
        };

        let msg = sighash::taproot_key_spend(tx, index, &self.prevouts)?;
        let signature = add_user_signature_and_combine(
            self.musig_version,
            &msg,
            &user.ec_private_key(),
            muun_key,
            &cosigner,
            &session_id,
            &MusigTweaks::bip86(),
        )
        .inspect_err(|e| log::warn!("MuSig2 combine failed on input {}: {}", index, e))?;

        // SIGHASH_ALL, with the type byte written out: 65 bytes
        let mut witness_sig = signature.serialize().to_vec();
        witness_sig.push(bitcoin::TapSighashType::All as u8);
        input_mut(tx, index)?.witness = Witness::from_slice(&[witness_sig]);
        Ok(())
    }

    fn fully_sign_input(
        &mut self,
        index: usize,
        tx: &mut Transaction,
        user: &ExtendedPrivateKey,
        muun: &ExtendedPrivateKey,
    ) -> Result<(), SignError> {
        let session_id = self.session_id(index)?;
        let user = user.derive_to(&self.key_path)?;
        let user_key = user.ec_public_key();
        let derived_muun = muun.derive_to(&self.key_path)?;

        let msg = sighash::taproot_key_spend(tx, index, &self.prevouts)?;
        let (_, user_nonce) = generate_nonce(self.musig_version, &session_id, &user_key)?;

        // Both keys are local here, so the cosigner session is ours too
        let cosigner = compute_cosigner_partial_signature(
            self.musig_version,
            &msg,
            &user_key,
            &derived_muun.ec_private_key(),
            &user_nonce,
            &SessionId::random(),
            &MusigTweaks::bip86(),
        )?;
        self.muun_public_nonce = Some(cosigner.public_nonce.to_bytes().to_vec());
        self.muun_partial_signature = Some(cosigner.partial_signature.to_bytes().to_vec());

        self.sign_derived(index, tx, &user, &derived_muun.ec_public_key())
    }

    /// The user's public nonce for this input, to send to the cosigner.
    pub fn user_public_nonce(&self, index: usize, user_key: &PublicKey) -> Result<PublicNonce, SignError> {
        let session_id = self.session_id(index)?;
        Ok(generate_nonce(self.musig_version, &session_id, user_key)?.1)
    }
}
