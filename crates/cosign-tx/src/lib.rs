//! # Cosign Tx
//!
//! Transaction signing for 2-of-2 wallets shared between a user and a
//! cosigner ("muun").
//!
//! ## Output families
//!
//! | Version | Output | Unlocking |
//! |---|---|---|
//! | V1 | P2PKH, user key only | `<sig> <pubkey>` |
//! | V2 | P2SH 2-of-2 multisig | `OP_0 <user sig> <muun sig> <redeem>` |
//! | V3 | P2SH-P2WSH 2-of-2 multisig | witness `[] <user> <muun> <script>` |
//! | V4 | P2WSH 2-of-2 multisig | same witness, empty scriptSig |
//! | V5 | P2TR, MuSig2 v0.4.0 | `<schnorr sig>` |
//! | V6 | P2TR, MuSig2 v1.0.0rc2 | `<schnorr sig>` |
//! | Swap v1 | P2SH-P2WSH HTLC | refund branch |
//! | Swap v2 | P2WSH HTLC | collaborative branch |
//! | Incoming swap | P2WSH HTLC | preimage branch |
//!
//! ## Flow
//!
//! ```text
//! unsigned tx + inputs -> PartiallySignedTransaction
//!   -> verify(expectations)      outputs match what the user asked for
//!   -> sign(user, muun)          per input: derive, build script, sign
//!   -> SignedTransaction         txid + raw bytes
//! ```
//!
//! Collaborators (invoice secrets, sphinx onion validation) and the network
//! are passed in through [`SigningContext`]. Nothing here touches global state.

pub mod address;
pub mod coin;
pub mod error;
pub mod incoming_swap;
pub mod input;
pub mod invoices;
pub mod pst;
pub mod scripts;
mod serde_helpers;
mod sighash;
pub mod swaps;

use bitcoin::Network;

pub use address::{
    build_output, create_address, parse_address, AddressVersion, BuiltOutput, MuunAddress,
    SwapScriptParams,
};
pub use coin::Coin;
pub use error::{ScriptError, SignError, SwapError, VerifyError};
pub use incoming_swap::{
    IncomingSwap, IncomingSwapFulfillmentData, IncomingSwapFulfillmentResult, IncomingSwapHtlc,
    SphinxError, SphinxValidator, UnavailableSphinxValidator,
};
pub use input::{IncomingSwapData, Input, Outpoint, SubmarineSwapV1Data, SubmarineSwapV2Data};
pub use invoices::{
    InvoiceSecretStore, InvoiceSecrets, JsonInvoiceStore, MemoryInvoiceStore, StoreError,
};
pub use pst::{MusigNonces, PartiallySignedTransaction, SignedTransaction, SigningExpectations};
pub use swaps::{
    validate_submarine_swap_v1, validate_submarine_swap_v2, SubmarineSwapV1Funding,
    SubmarineSwapV2Funding,
};

/// Outputs below this many sats are dust.
pub const DUST_THRESHOLD: u64 = 546;

/// Child index of the node identity key under an invoice key path.
pub const IDENTITY_KEY_CHILD_INDEX: u32 = 0;

/// Child index of the HTLC key under an invoice key path.
pub const HTLC_KEY_CHILD_INDEX: u32 = 1;

/// Everything signing needs besides keys.
#[derive(Clone, Copy)]
pub struct SigningContext<'a> {
    pub network: Network,
    pub invoices: &'a dyn InvoiceSecretStore,
    pub sphinx: &'a dyn SphinxValidator,
}

impl<'a> SigningContext<'a> {
    pub fn new(
        network: Network,
        invoices: &'a dyn InvoiceSecretStore,
        sphinx: &'a dyn SphinxValidator,
    ) -> Self {
        Self {
            network,
            invoices,
            sphinx,
        }
    }
}

impl std::fmt::Debug for SigningContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningContext")
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}
