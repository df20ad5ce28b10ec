//! Error types for script building, signing and verification.

use cosign_core::KeyError;
use cosign_musig::MusigError;
use thiserror::Error;

use crate::address::AddressVersion;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Address version {0} cannot be built from wallet keys")]
    UnsupportedVersion(AddressVersion),

    #[error("Unknown address version code {0}")]
    UnknownVersion(u32),

    #[error("Invalid public key: {0}")]
    InvalidKey(String),

    #[error("Payment hash must be 32 bytes, got {0}")]
    InvalidPaymentHash(usize),

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Refund address {0} is not a pay-to-pubkey-hash address")]
    RefundNotP2pkh(String),

    #[error("Missing {0} for this script family")]
    MissingParameter(&'static str),

    #[error("Aggregate key: {0}")]
    Musig(#[from] MusigError),
}

/// Failure while signing one input or a whole transaction.
///
/// Variants fall in four groups: malformed data, missing cosigner material,
/// failed cryptographic checks and unsupported versions.
#[derive(Error, Debug)]
pub enum SignError {
    #[error("Malformed transaction: {0}")]
    MalformedTransaction(String),

    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    #[error("Malformed input data: {0}")]
    MalformedInput(String),

    #[error("Transaction has {tx_inputs} inputs but {descriptors} input descriptors were given")]
    InputCountMismatch { tx_inputs: usize, descriptors: usize },

    #[error("Key derivation failed: {0}")]
    Key(#[from] KeyError),

    #[error("Script construction failed: {0}")]
    Script(#[from] ScriptError),

    #[error("Waiting for the cosigner's {0}")]
    AwaitingCosigner(&'static str),

    #[error("No MuSig2 session id for input {0}")]
    MissingNonce(usize),

    #[error("Cosigner's partial signature failed verification")]
    InvalidPartialSignature,

    #[error("MuSig2 signing failed: {0}")]
    Musig(MusigError),

    #[error("Cosigner's signature does not verify against the sighash")]
    InvalidCosignerSignature,

    #[error("No output of the HTLC transaction pays to the expected HTLC script")]
    HtlcOutputNotFound,

    #[error("Fulfillment input does not spend the HTLC output")]
    HtlcOutpointMismatch,

    #[error("Sphinx validation failed: {0}")]
    Sphinx(String),

    #[error("No invoice secrets for payment hash {0}")]
    InvoiceNotFound(String),

    #[error("Invoice store error: {0}")]
    Store(String),

    #[error("Preimage does not hash to the payment hash")]
    PreimageMismatch,

    #[error("{0}")]
    Precondition(String),

    #[error("Address version {0} is not supported here")]
    UnsupportedVersion(AddressVersion),

    #[error("Sighash computation failed: {0}")]
    Sighash(String),

    #[error("Input {index} ({version}): {source}")]
    Input {
        index: usize,
        version: AddressVersion,
        #[source]
        source: Box<SignError>,
    },
}

impl SignError {
    /// Attach the failing input's position and script version.
    pub fn at_input(self, index: usize, version: AddressVersion) -> Self {
        SignError::Input {
            index,
            version,
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any input wrapper.
    pub fn root(&self) -> &SignError {
        match self {
            SignError::Input { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether signing can resume once the cosigner sends its material.
    pub fn is_awaiting_cosigner(&self) -> bool {
        matches!(
            self.root(),
            SignError::AwaitingCosigner(_) | SignError::MissingNonce(_)
        )
    }
}

impl From<MusigError> for SignError {
    fn from(err: MusigError) -> Self {
        match err {
            MusigError::InvalidPartialSignature => SignError::InvalidPartialSignature,
            MusigError::MissingNonce => SignError::AwaitingCosigner("public nonce"),
            other => SignError::Musig(other),
        }
    }
}

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Expected {expected} outputs but found {actual}")]
    OutputCount { expected: &'static str, actual: usize },

    #[error("Destination output is not present")]
    DestinationNotFound,

    #[error("Destination amount is mismatched: found {found}, expected {expected}")]
    DestinationAmount { found: u64, expected: u64 },

    #[error("Destination amount {found} is not below the original amount {expected}")]
    DestinationNotReduced { found: u64, expected: u64 },

    #[error("Expected at least one of destination and change outputs")]
    NoDestinationOrChange,

    #[error("Change output is not present")]
    ChangeNotFound,

    #[error("Change amount is mismatched: found {found}, expected {expected}")]
    ChangeAmount { found: i64, expected: i64 },

    #[error("Mismatched change address: found {found}, expected {expected}")]
    ChangeAddress { found: String, expected: String },

    #[error("Change output is too big to be burned as fee")]
    ChangeBurnedAsFee,

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Key derivation failed: {0}")]
    Key(#[from] KeyError),

    #[error("Script construction failed: {0}")]
    Script(#[from] ScriptError),
}

#[derive(Error, Debug)]
pub enum SwapError {
    #[error("Payment hash doesn't match: invoice {invoice}, swap {swap}")]
    PaymentHashMismatch { invoice: String, swap: String },

    #[error("Destination doesn't match: invoice {invoice}, swap {swap}")]
    DestinationMismatch { invoice: String, swap: String },

    #[error("Expiration in blocks doesn't match: expected {expected}, found {found}")]
    ExpirationMismatch { expected: i64, found: i64 },

    #[error("Refund address doesn't match: swap {swap}, derived {derived}")]
    RefundAddressMismatch { swap: String, derived: String },

    #[error("{role} public key doesn't match the derived key")]
    PublicKeyMismatch { role: &'static str },

    #[error("Address for swap script mismatch: derived {derived}, swap {swap}")]
    ScriptAddressMismatch { derived: String, swap: String },

    #[error("Payment hash doesn't match the preimage")]
    PreimageMismatch,

    #[error("Invalid hex in {field}: {reason}")]
    InvalidHex { field: &'static str, reason: String },

    #[error("Key derivation failed: {0}")]
    Key(#[from] KeyError),

    #[error("Script construction failed: {0}")]
    Script(#[from] ScriptError),
}
