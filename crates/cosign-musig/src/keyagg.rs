//! Key aggregation and tweaking.
//!
//! Tweaks are applied in a fixed order on top of the aggregate `Q`:
//!
//! 1. generic tweaks, as given
//! 2. the unhardened BIP-328 derivation path
//! 3. at most one taproot tweak (BIP-86 or a tapscript merkle root)
//!
//! Every step updates `(Q, gacc, tacc)` the way BIP-327 ApplyTweak does, so
//! signing and aggregation only need the final accumulators.

use bitcoin::hashes::Hash;
use bitcoin::key::TweakedPublicKey;
use bitcoin::secp256k1::{PublicKey, XOnlyPublicKey};
use bitcoin::taproot::{TapNodeHash, TapTweakHash};

use crate::arith::{
    base_mul, has_even_y, lift_even, point_add, point_mul, point_negate, tagged_hash,
    tagged_scalar, xonly_bytes, ModScalar,
};
use crate::{check_unhardened_path, derive_unhardened_tweaks, MusigError, MusigVersion, BIP328_CHAIN_CODE};

/// A raw scalar tweak added to the aggregate key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenericTweak {
    pub tweak: [u8; 32],
    /// X-only tweaks act on the even-y lift of the current key.
    pub x_only: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaprootTweak {
    #[default]
    None,
    /// Key-path only output, `TapTweak(Q)`.
    Bip86,
    /// Commit to a tapscript tree, `TapTweak(Q || root)`.
    ScriptRoot([u8; 32]),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MusigTweaks {
    pub generic: Vec<GenericTweak>,
    pub unhardened_path: Vec<u32>,
    pub taproot: TaprootTweak,
}

impl MusigTweaks {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn bip86() -> Self {
        Self {
            taproot: TaprootTweak::Bip86,
            ..Self::default()
        }
    }

    pub fn tapscript(merkle_root: [u8; 32]) -> Self {
        Self {
            taproot: TaprootTweak::ScriptRoot(merkle_root),
            ..Self::default()
        }
    }

    pub fn with_unhardened_derivation_path(mut self, path: &[u32]) -> Self {
        self.unhardened_path = path.to_vec();
        self
    }

    pub fn with_generic_tweak(mut self, tweak: GenericTweak) -> Self {
        self.generic.push(tweak);
        self
    }

    fn check_version(&self, version: MusigVersion) -> Result<(), MusigError> {
        if version != MusigVersion::V040 {
            return Ok(());
        }
        let unsupported = |tweak| Err(MusigError::UnsupportedTweak { version, tweak });
        if !self.generic.is_empty() {
            return unsupported("Generic");
        }
        if !self.unhardened_path.is_empty() {
            return unsupported("Unhardened derivation");
        }
        if let TaprootTweak::ScriptRoot(_) = self.taproot {
            return unsupported("Tapscript");
        }
        Ok(())
    }
}

/// The three keys a tweaked aggregation goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateKey {
    /// Plain aggregate of the signer keys.
    pub pre_tweaked_key: PublicKey,
    /// After generic tweaks and derivation, before the taproot tweak.
    pub internal_key: PublicKey,
    pub final_key: PublicKey,
}

impl AggregateKey {
    pub fn x_only_final_key(&self) -> XOnlyPublicKey {
        self.final_key.x_only_public_key().0
    }

    /// Output key for a P2TR script pubkey.
    pub fn tweaked_output_key(&self) -> TweakedPublicKey {
        TweakedPublicKey::dangerous_assume_tweaked(self.x_only_final_key())
    }
}

/// Everything a signer needs to know about the aggregate key.
#[derive(Debug, Clone)]
pub struct KeyAggContext {
    version: MusigVersion,
    signers: Vec<PublicKey>,
    list_hash: [u8; 32],
    second_key: Option<PublicKey>,
    aggregate: AggregateKey,
    current: PublicKey,
    gacc_negated: bool,
    tacc: ModScalar,
}

/// Parse a signer key in the form each version expects.
///
/// v0.4.0 takes 32-byte x-only keys, or 33-byte keys whose parity is dropped.
/// v1.0.0rc2 only takes 33-byte compressed keys.
pub fn parse_pubkey(version: MusigVersion, bytes: &[u8]) -> Result<PublicKey, MusigError> {
    let invalid = |e: bitcoin::secp256k1::Error| MusigError::ParseError(e.to_string());
    match (version, bytes.len()) {
        (MusigVersion::V040, 33) => {
            let key = PublicKey::from_slice(bytes).map_err(invalid)?;
            Ok(lift_even(&key))
        }
        (MusigVersion::V040, 32) => {
            let xonly = XOnlyPublicKey::from_slice(bytes).map_err(invalid)?;
            Ok(lift_even(&xonly.public_key(bitcoin::secp256k1::Parity::Even)))
        }
        (MusigVersion::V100, 33) => PublicKey::from_slice(bytes).map_err(invalid),
        (_, len) => Err(MusigError::ParseError(format!(
            "{} bytes is not a valid key length for MuSig2 {}",
            len, version
        ))),
    }
}

impl KeyAggContext {
    /// Aggregate `keys` (user first, then cosigner) and apply `tweaks`.
    pub fn new(
        version: MusigVersion,
        keys: &[PublicKey],
        tweaks: &MusigTweaks,
    ) -> Result<Self, MusigError> {
        if keys.len() < 2 {
            return Err(MusigError::NotEnoughKeys(keys.len()));
        }
        tweaks.check_version(version)?;
        check_unhardened_path(&tweaks.unhardened_path)?;

        let mut signers: Vec<PublicKey> = match version {
            MusigVersion::V040 => keys.iter().map(lift_even).collect(),
            MusigVersion::V100 => keys.to_vec(),
        };
        if version == MusigVersion::V100 {
            signers.sort_by_key(|k| k.serialize());
        }

        let encoded: Vec<Vec<u8>> = signers.iter().map(|k| encode_key(version, k)).collect();
        let parts: Vec<&[u8]> = encoded.iter().map(Vec::as_slice).collect();
        let list_hash = tagged_hash("KeyAgg list", &parts);

        let second_key = signers.iter().copied().find(|k| *k != signers[0]);

        let mut ctx = Self {
            version,
            signers,
            list_hash,
            second_key,
            aggregate: AggregateKey {
                pre_tweaked_key: keys[0],
                internal_key: keys[0],
                final_key: keys[0],
            },
            current: keys[0],
            gacc_negated: false,
            tacc: ModScalar::ZERO,
        };

        let mut q = None;
        for key in &ctx.signers {
            let coefficient = ctx.raw_coefficient(key)?;
            q = point_add(q, point_mul(Some(*key), coefficient));
        }
        let pre_tweaked = q.ok_or(MusigError::InfinityKey)?;
        ctx.current = pre_tweaked;
        ctx.aggregate.pre_tweaked_key = pre_tweaked;

        for generic in &tweaks.generic {
            let tweak = ModScalar::from_bytes(&generic.tweak)?;
            ctx.apply_tweak(tweak, generic.x_only)?;
        }

        for step in derive_unhardened_tweaks(&ctx.current, &BIP328_CHAIN_CODE, &tweaks.unhardened_path)? {
            let tweak = ModScalar::from_bytes(&step.tweak.to_be_bytes())?;
            ctx.apply_tweak(tweak, false)?;
        }
        ctx.aggregate.internal_key = ctx.current;

        let merkle_root = match tweaks.taproot {
            TaprootTweak::None => None,
            TaprootTweak::Bip86 => Some(None),
            TaprootTweak::ScriptRoot(root) => Some(Some(TapNodeHash::from_byte_array(root))),
        };
        if let Some(root) = merkle_root {
            let internal = ctx.current.x_only_public_key().0;
            let tap_tweak = TapTweakHash::from_key_and_tweak(internal, root).to_scalar();
            let tweak = ModScalar::from_bytes(&tap_tweak.to_be_bytes())?;
            ctx.apply_tweak(tweak, true)?;
        }
        ctx.aggregate.final_key = ctx.current;

        log::debug!(
            "MuSig2 {} aggregate key {} (internal {})",
            version,
            ctx.aggregate.final_key,
            ctx.aggregate.internal_key
        );

        Ok(ctx)
    }

    /// Parse raw signer keys and aggregate them.
    pub fn from_bytes(
        version: MusigVersion,
        keys: &[&[u8]],
        tweaks: &MusigTweaks,
    ) -> Result<Self, MusigError> {
        if keys.len() < 2 {
            return Err(MusigError::NotEnoughKeys(keys.len()));
        }
        let parsed = keys
            .iter()
            .map(|bytes| parse_pubkey(version, bytes))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(version, &parsed, tweaks)
    }

    pub fn version(&self) -> MusigVersion {
        self.version
    }

    pub fn aggregate_key(&self) -> &AggregateKey {
        &self.aggregate
    }

    pub fn final_key(&self) -> PublicKey {
        self.aggregate.final_key
    }

    /// Signer keys in aggregation order.
    pub fn signers(&self) -> &[PublicKey] {
        &self.signers
    }

    /// The form of `key` that takes part in aggregation.
    pub(crate) fn normalize(&self, key: &PublicKey) -> PublicKey {
        match self.version {
            MusigVersion::V040 => lift_even(key),
            MusigVersion::V100 => *key,
        }
    }

    /// KeyAgg coefficient for a signer, which must be one of the aggregated keys.
    pub(crate) fn coefficient(&self, key: &PublicKey) -> Result<ModScalar, MusigError> {
        let key = self.normalize(key);
        if !self.signers.contains(&key) {
            return Err(MusigError::UnknownSigner);
        }
        self.raw_coefficient(&key)
    }

    /// Whether signers must negate their secret: `g * gacc == -1`.
    pub(crate) fn secret_negated(&self) -> bool {
        !has_even_y(&self.aggregate.final_key) ^ self.gacc_negated
    }

    pub(crate) fn tacc(&self) -> ModScalar {
        self.tacc
    }

    fn raw_coefficient(&self, key: &PublicKey) -> Result<ModScalar, MusigError> {
        if self.second_key.as_ref() == Some(key) {
            return Ok(ModScalar::one());
        }
        let encoded = encode_key(self.version, key);
        tagged_scalar("KeyAgg coefficient", &[&self.list_hash, &encoded])
    }

    fn apply_tweak(&mut self, tweak: ModScalar, x_only: bool) -> Result<(), MusigError> {
        let negate = x_only && !has_even_y(&self.current);
        let base = if negate {
            point_negate(Some(self.current))
        } else {
            Some(self.current)
        };
        self.current = point_add(base, base_mul(tweak)).ok_or(MusigError::InfinityKey)?;
        self.gacc_negated ^= negate;
        self.tacc = tweak.add(self.tacc.cond_negate(negate));
        Ok(())
    }
}

fn encode_key(version: MusigVersion, key: &PublicKey) -> Vec<u8> {
    match version {
        MusigVersion::V040 => xonly_bytes(key).to_vec(),
        MusigVersion::V100 => key.serialize().to_vec(),
    }
}
