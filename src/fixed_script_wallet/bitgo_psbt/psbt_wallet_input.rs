use core::fmt;
use std::str::FromStr;

use crate::bitcoin::bip32::{ChildNumber, DerivationPath, Fingerprint, KeySource, Xpub};
use crate::bitcoin::hashes::Hash;
use crate::bitcoin::psbt::{Input, Output, Psbt};
use crate::bitcoin::secp256k1::{self, Message, PublicKey};
use crate::bitcoin::sighash::{Prevouts, SighashCache};
use crate::bitcoin::{
    Amount, CompressedPublicKey, OutPoint, ScriptBuf, TapLeafHash, Transaction, TxIn,
};
use crate::fixed_script_wallet::{
    Chain, OutputScriptType, ReplayProtection, RootWalletKeys, TapKeyOrigins, WalletScripts,
};
use crate::Network;

use super::p2tr_musig2_input::collect_prevouts;

pub type Bip32DerivationMap = std::collections::BTreeMap<PublicKey, KeySource>;

fn has_fingerprint(wallet_keys: &RootWalletKeys, fingerprint: Fingerprint) -> bool {
    wallet_keys
        .xpubs
        .iter()
        .any(|xpub| xpub.fingerprint() == fingerprint)
}

fn find_xpub_by_fingerprint(
    wallet_keys: &RootWalletKeys,
    fingerprint: Fingerprint,
) -> Option<&Xpub> {
    wallet_keys
        .xpubs
        .iter()
        .find(|xpub| xpub.fingerprint() == fingerprint)
}

/// True if every fingerprint in the map is one of the wallet's.
pub fn is_bip32_derivation_for_wallet(
    wallet_keys: &RootWalletKeys,
    derivation_map: &Bip32DerivationMap,
) -> bool {
    derivation_map
        .values()
        .all(|(fingerprint, _)| has_fingerprint(wallet_keys, *fingerprint))
}

pub fn is_tap_key_origins_for_wallet(
    wallet_keys: &RootWalletKeys,
    tap_key_origins: &TapKeyOrigins,
) -> bool {
    tap_key_origins
        .values()
        .all(|(_, (fingerprint, _))| has_fingerprint(wallet_keys, *fingerprint))
}

fn derive_pubkey<C: secp256k1::Verification>(
    secp: &secp256k1::Secp256k1<C>,
    xpub: &Xpub,
    path: &DerivationPath,
) -> Result<PublicKey, String> {
    xpub.derive_pub(secp, path)
        .map(|derived| derived.public_key)
        .map_err(|e| format!("Failed to derive public key: {}", e))
}

/// Derives the key of `xpub` at the path the input records for its fingerprint.
///
/// Looks in `bip32_derivation` first, then `tap_key_origins`. `Ok(None)` when the input has no
/// path for this xpub.
pub fn derive_pubkey_from_input<C: secp256k1::Verification>(
    secp: &secp256k1::Secp256k1<C>,
    xpub: &Xpub,
    input: &Input,
) -> Result<Option<PublicKey>, String> {
    let fingerprint = xpub.fingerprint();
    let path = input
        .bip32_derivation
        .values()
        .find(|(fp, _)| *fp == fingerprint)
        .map(|(_, path)| path)
        .or_else(|| {
            input
                .tap_key_origins
                .values()
                .find(|(_, (fp, _))| *fp == fingerprint)
                .map(|(_, (_, path))| path)
        });
    path.map(|path| derive_pubkey(secp, xpub, path)).transpose()
}

/// How ECDSA signature hashes are computed on a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcdsaSighashScheme {
    /// BIP-143 for segwit, legacy otherwise
    Bitcoin,
    /// `SIGHASH_FORKID` digest with the given fork id
    ForkId(u32),
    /// ZIP-243
    Zcash {
        consensus_branch_id: u32,
        version_group_id: u32,
        expiry_height: u32,
    },
}

impl EcdsaSighashScheme {
    pub fn message<T: std::borrow::Borrow<Transaction>>(
        &self,
        psbt: &Psbt,
        input_index: usize,
        cache: &mut SighashCache<T>,
    ) -> Result<Message, String> {
        let msg = match *self {
            EcdsaSighashScheme::Bitcoin => psbt
                .sighash_ecdsa(input_index, cache)
                .map_err(|e| format!("Failed to compute sighash: {}", e))?
                .0,
            EcdsaSighashScheme::ForkId(fork_id) => psbt
                .sighash_forkid(input_index, cache, fork_id)
                .map_err(|e| format!("Failed to compute FORKID sighash: {}", e))?
                .0,
            EcdsaSighashScheme::Zcash {
                consensus_branch_id,
                version_group_id,
                expiry_height,
            } => psbt
                .sighash_zcash(
                    input_index,
                    cache,
                    consensus_branch_id,
                    version_group_id,
                    expiry_height,
                )
                .map_err(|e| format!("Failed to compute Zcash sighash: {}", e))?
                .0,
        };
        Ok(msg)
    }
}

/// Verifies the ECDSA partial signature `public_key` left on an input.
///
/// # Arguments
/// - `secp`: verification context
/// - `psbt`: the container holding the input
/// - `input_index`: index of the input; must be in range
/// - `public_key`: the signer's derived key
/// - `scheme`: sighash algorithm of the network
///
/// # Returns
/// - `Ok(true)` if the input holds a valid signature by `public_key`
/// - `Ok(false)` if there is no signature by the key, or it does not verify
/// - `Err(String)` if the sighash cannot be computed
pub fn verify_ecdsa_signature<C: secp256k1::Verification>(
    secp: &secp256k1::Secp256k1<C>,
    psbt: &Psbt,
    input_index: usize,
    public_key: CompressedPublicKey,
    scheme: &EcdsaSighashScheme,
) -> Result<bool, String> {
    let key = crate::bitcoin::PublicKey::from(public_key);
    let Some(signature) = psbt.inputs[input_index].partial_sigs.get(&key) else {
        return Ok(false);
    };
    let mut cache = SighashCache::new(&psbt.unsigned_tx);
    let msg = scheme.message(psbt, input_index, &mut cache)?;
    Ok(secp
        .verify_ecdsa(&msg, &signature.signature, &public_key.0)
        .is_ok())
}

/// `Ok(true)` if the input holds a valid tap script signature by `public_key` for one of
/// its tap leaves. `Err` if the taproot sighash cannot be computed.
pub fn verify_taproot_script_signature<C: secp256k1::Verification>(
    secp: &secp256k1::Secp256k1<C>,
    psbt: &Psbt,
    input_index: usize,
    public_key: CompressedPublicKey,
) -> Result<bool, String> {
    let input = &psbt.inputs[input_index];
    let x_only = public_key.0.x_only_public_key().0;
    let candidates: Vec<_> = input
        .tap_script_sigs
        .iter()
        .filter(|((key, _), _)| *key == x_only)
        .collect();
    if candidates.is_empty() {
        return Ok(false);
    }

    let prevouts = collect_prevouts(psbt)?;
    let mut cache = SighashCache::new(&psbt.unsigned_tx);
    for ((key, leaf_hash), signature) in candidates {
        let known_leaf = input
            .tap_scripts
            .values()
            .any(|(script, version)| TapLeafHash::from_script(script, *version) == *leaf_hash);
        if !known_leaf {
            return Err("Tap script not found for leaf hash".to_string());
        }
        let sighash = cache
            .taproot_script_spend_signature_hash(
                input_index,
                &Prevouts::All(&prevouts),
                *leaf_hash,
                signature.sighash_type,
            )
            .map_err(|e| format!("Failed to compute taproot sighash: {}", e))?;
        let msg = Message::from_digest(sighash.to_byte_array());
        if secp.verify_schnorr(&signature.signature, &msg, key).is_ok() {
            return Ok(true);
        }
    }
    Ok(false)
}

fn assert_bip32_derivation_map(
    wallet_keys: &RootWalletKeys,
    derivation_map: &Bip32DerivationMap,
) -> Result<(), String> {
    let secp = secp256k1::Secp256k1::verification_only();
    for (key, (fingerprint, path)) in derivation_map {
        let xpub = find_xpub_by_fingerprint(wallet_keys, *fingerprint)
            .ok_or_else(|| format!("No xpub found with fingerprint {}", fingerprint))?;
        let derived = derive_pubkey(&secp, xpub, path)?;
        if derived != *key {
            return Err(format!(
                "Derived pubkey {} does not match derivation map {}",
                derived, key
            ));
        }
    }
    Ok(())
}

fn assert_tap_key_origins(
    wallet_keys: &RootWalletKeys,
    tap_key_origins: &TapKeyOrigins,
) -> Result<(), String> {
    let secp = secp256k1::Secp256k1::verification_only();
    for (key, (_, (fingerprint, path))) in tap_key_origins {
        let xpub = find_xpub_by_fingerprint(wallet_keys, *fingerprint)
            .ok_or_else(|| format!("No xpub found with fingerprint {}", fingerprint))?;
        let derived = derive_pubkey(&secp, xpub, path)?.x_only_public_key().0;
        if derived != *key {
            return Err(format!(
                "Derived pubkey {} does not match derivation map {}",
                derived, key
            ));
        }
    }
    Ok(())
}

/// The trailing `chain/index` of a wallet derivation path.
fn parse_derivation_path(path: &DerivationPath) -> Result<ScriptId, String> {
    let length = path.len();
    if length < 2 {
        return Err(format!("Derivation path {} is too short", path));
    }
    match (path[length - 2], path[length - 1]) {
        (ChildNumber::Normal { index: chain }, ChildNumber::Normal { index }) => {
            Ok(ScriptId { chain, index })
        }
        _ => Err(format!("Hardened chain or index in path {}", path)),
    }
}

pub fn get_derivation_paths(input: &Input) -> Vec<&DerivationPath> {
    if !input.bip32_derivation.is_empty() {
        input.bip32_derivation.values().map(|(_, path)| path).collect()
    } else {
        input
            .tap_key_origins
            .values()
            .map(|(_, (_, path))| path)
            .collect()
    }
}

pub fn get_output_derivation_paths(output: &Output) -> Vec<&DerivationPath> {
    if !output.bip32_derivation.is_empty() {
        output.bip32_derivation.values().map(|(_, path)| path).collect()
    } else {
        output
            .tap_key_origins
            .values()
            .map(|(_, (_, path))| path)
            .collect()
    }
}

/// The `(chain, index)` shared by all paths; fails if they disagree.
pub fn parse_shared_derivation_path(paths: &[&DerivationPath]) -> Result<ScriptId, String> {
    let ids = paths
        .iter()
        .map(|path| parse_derivation_path(path))
        .collect::<Result<Vec<_>, String>>()?;
    let first = *ids.first().ok_or("No derivation paths")?;
    if ids.iter().any(|id| *id != first) {
        return Err("Derivation paths disagree on chain and index".to_string());
    }
    Ok(first)
}

pub fn parse_shared_chain_and_index(input: &Input) -> Result<ScriptId, String> {
    if input.bip32_derivation.is_empty() && input.tap_key_origins.is_empty() {
        return Err("both bip32_derivation and tap_key_origins are empty".to_string());
    }
    parse_shared_derivation_path(&get_derivation_paths(input))
}

fn assert_wallet_output_script(
    wallet_keys: &RootWalletKeys,
    script_id: ScriptId,
    script_pub_key: &ScriptBuf,
    network: Network,
) -> Result<(), String> {
    let chain = Chain::try_from(script_id.chain).map_err(|e| e.to_string())?;
    let derived = WalletScripts::from_wallet_keys(
        wallet_keys,
        chain,
        script_id.index,
        &network.output_script_support(),
    )
    .map_err(|e| e.to_string())?;
    if derived.output_script() != *script_pub_key {
        return Err(format!(
            "Script mismatch: spent script {:x} != derived script {:x}",
            script_pub_key,
            derived.output_script()
        ));
    }
    Ok(())
}

/// Checks that the input's derivation data and spent script belong to the wallet.
pub fn assert_wallet_input(
    wallet_keys: &RootWalletKeys,
    input: &Input,
    output_script: &ScriptBuf,
    network: Network,
) -> Result<ScriptId, String> {
    if input.bip32_derivation.is_empty() {
        assert_tap_key_origins(wallet_keys, &input.tap_key_origins)?;
    } else {
        assert_bip32_derivation_map(wallet_keys, &input.bip32_derivation)?;
    }
    let script_id = parse_shared_chain_and_index(input)?;
    assert_wallet_output_script(wallet_keys, script_id, output_script, network)?;
    Ok(script_id)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputScriptError {
    OutputIndexOutOfBounds { vout: u32 },
    /// `witness_utxo` and `non_witness_utxo` describe different outputs
    UtxoMismatch,
    NoUtxoFields,
}

impl fmt::Display for OutputScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputScriptError::OutputIndexOutOfBounds { vout } => {
                write!(f, "Output index {} out of bounds", vout)
            }
            OutputScriptError::UtxoMismatch => {
                write!(f, "witness_utxo does not match non_witness_utxo")
            }
            OutputScriptError::NoUtxoFields => {
                write!(f, "Neither witness_utxo nor non_witness_utxo is set")
            }
        }
    }
}

impl std::error::Error for OutputScriptError {}

/// Identifies a script by its chain and index in the wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "inspect", derive(serde::Serialize))]
pub struct ScriptId {
    pub chain: u32,
    pub index: u32,
}

/// Identifies a key in the wallet triple (user, backup, bitgo)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignerKey {
    User,
    Backup,
    Bitgo,
}

impl SignerKey {
    pub const ALL: [SignerKey; 3] = [SignerKey::User, SignerKey::Backup, SignerKey::Bitgo];

    /// Position in the wallet triple
    pub fn index(&self) -> usize {
        match self {
            SignerKey::User => 0,
            SignerKey::Backup => 1,
            SignerKey::Bitgo => 2,
        }
    }

    pub fn is_backup(&self) -> bool {
        matches!(self, SignerKey::Backup)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignerKey::User => "user",
            SignerKey::Backup => "backup",
            SignerKey::Bitgo => "bitgo",
        }
    }
}

impl fmt::Display for SignerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignerKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(SignerKey::User),
            "backup" => Ok(SignerKey::Backup),
            "bitgo" => Ok(SignerKey::Bitgo),
            _ => Err(format!(
                "Invalid key name '{}': expected 'user', 'backup', or 'bitgo'",
                s
            )),
        }
    }
}

/// The two keys that are going to sign an input.
///
/// For taproot inputs this picks the spend path: the tap leaf of the pair, or the MuSig2
/// key path for `{user, bitgo}` on `p2trMusig2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignPath {
    pub signer: SignerKey,
    pub cosigner: SignerKey,
}

impl Default for SignPath {
    fn default() -> Self {
        SignPath {
            signer: SignerKey::User,
            cosigner: SignerKey::Bitgo,
        }
    }
}

impl SignPath {
    pub fn includes_backup(&self) -> bool {
        self.signer.is_backup() || self.cosigner.is_backup()
    }

    pub fn indices(&self) -> [usize; 2] {
        [self.signer.index(), self.cosigner.index()]
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReplayProtectionOptions<'a> {
    /// Defaults to the container's default sequence
    pub sequence: Option<u32>,
    /// Defaults to `SIGHASH_ALL|FORKID` on fork-id networks and unset elsewhere
    pub sighash_type: Option<crate::bitcoin::psbt::PsbtSighashType>,
    /// Previous transaction; when given it is stored as `non_witness_utxo`
    pub prev_tx: Option<&'a [u8]>,
}

#[derive(Debug, Clone, Default)]
pub struct WalletInputOptions<'a> {
    /// Signer pair; defaults to the script type's required sign path
    pub sign_path: Option<SignPath>,
    /// Defaults to the container's default sequence
    pub sequence: Option<u32>,
    /// Previous transaction; when given it is stored as `non_witness_utxo`
    pub prev_tx: Option<&'a [u8]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "inspect", derive(serde::Serialize))]
pub enum InputScriptType {
    P2shP2pk,
    P2sh,
    P2shP2wsh,
    P2wsh,
    P2trLegacy,
    P2trMusig2ScriptPath,
    P2trMusig2KeyPath,
}

impl InputScriptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputScriptType::P2shP2pk => "p2shP2pk",
            InputScriptType::P2sh => "p2sh",
            InputScriptType::P2shP2wsh => "p2shP2wsh",
            InputScriptType::P2wsh => "p2wsh",
            InputScriptType::P2trLegacy => "p2trLegacy",
            InputScriptType::P2trMusig2ScriptPath => "p2trMusig2ScriptPath",
            InputScriptType::P2trMusig2KeyPath => "p2trMusig2KeyPath",
        }
    }

    pub fn is_segwit(&self) -> bool {
        !matches!(self, InputScriptType::P2shP2pk | InputScriptType::P2sh)
    }

    pub fn is_taproot(&self) -> bool {
        matches!(
            self,
            InputScriptType::P2trLegacy
                | InputScriptType::P2trMusig2ScriptPath
                | InputScriptType::P2trMusig2KeyPath
        )
    }

    /// `p2trMusig2` inputs with tap leaf data spend by script path, otherwise by key path.
    pub fn from_script_id(script_id: ScriptId, psbt_input: &Input) -> Result<Self, String> {
        let chain = Chain::try_from(script_id.chain).map_err(|e| e.to_string())?;
        Ok(match chain.script_type {
            OutputScriptType::P2sh => InputScriptType::P2sh,
            OutputScriptType::P2shP2wsh => InputScriptType::P2shP2wsh,
            OutputScriptType::P2wsh => InputScriptType::P2wsh,
            OutputScriptType::P2trLegacy => InputScriptType::P2trLegacy,
            OutputScriptType::P2trMusig2 => {
                if !psbt_input.tap_script_sigs.is_empty() || !psbt_input.tap_scripts.is_empty() {
                    InputScriptType::P2trMusig2ScriptPath
                } else {
                    InputScriptType::P2trMusig2KeyPath
                }
            }
        })
    }

    /// Script type of a wallet input, or `p2shP2pk` for a permitted replay protection script.
    pub fn detect(
        script_id: Option<ScriptId>,
        psbt_input: &Input,
        output_script: &ScriptBuf,
        replay_protection: &ReplayProtection,
    ) -> Result<Self, String> {
        match script_id {
            Some(id) => Self::from_script_id(id, psbt_input),
            None if replay_protection.is_replay_protection_input(output_script) => {
                Ok(InputScriptType::P2shP2pk)
            }
            None => Err("Input without script_id is not a replay protection input".to_string()),
        }
    }
}

impl fmt::Display for InputScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputScriptType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            InputScriptType::P2shP2pk,
            InputScriptType::P2sh,
            InputScriptType::P2shP2wsh,
            InputScriptType::P2wsh,
            InputScriptType::P2trLegacy,
            InputScriptType::P2trMusig2ScriptPath,
            InputScriptType::P2trMusig2KeyPath,
        ]
        .into_iter()
        .find(|t| t.as_str() == s)
        .ok_or_else(|| format!("Unknown input script type: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInput {
    pub previous_output: OutPoint,
    pub address: String,
    pub script: Vec<u8>,
    pub value: u64,
    /// `None` for replay protection inputs
    pub script_id: Option<ScriptId>,
    pub script_type: InputScriptType,
    pub sequence: u32,
}

impl ParsedInput {
    pub fn parse(
        psbt_input: &Input,
        tx_input: &TxIn,
        wallet_keys: &RootWalletKeys,
        replay_protection: &ReplayProtection,
        network: Network,
    ) -> Result<Self, ParseInputError> {
        let (output_script, value) =
            get_output_script_and_value(psbt_input, tx_input.previous_output)
                .map_err(ParseInputError::Utxo)?;

        let script_id = if replay_protection.is_replay_protection_input(output_script) {
            None
        } else {
            parse_shared_chain_and_index(psbt_input).map_err(ParseInputError::Derivation)?;
            Some(
                assert_wallet_input(wallet_keys, psbt_input, output_script, network)
                    .map_err(ParseInputError::WalletValidation)?,
            )
        };

        let address =
            crate::address::from_output_script_with_network(output_script.as_script(), network)
                .map_err(ParseInputError::Address)?;

        let script_type =
            InputScriptType::detect(script_id, psbt_input, output_script, replay_protection)
                .map_err(ParseInputError::ScriptTypeDetection)?;

        Ok(Self {
            previous_output: tx_input.previous_output,
            address,
            script: output_script.to_bytes(),
            value: value.to_sat(),
            script_id,
            script_type,
            sequence: tx_input.sequence.0,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseInputError {
    Utxo(OutputScriptError),
    ValueOverflow,
    /// Missing or inconsistent derivation info on an input that is not replay protection
    Derivation(String),
    WalletValidation(String),
    Address(crate::address::AddressError),
    ScriptTypeDetection(String),
}

impl fmt::Display for ParseInputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseInputError::Utxo(error) => write!(f, "{}", error),
            ParseInputError::ValueOverflow => write!(f, "value overflow"),
            ParseInputError::Derivation(error) => write!(
                f,
                "missing or invalid derivation info (not replay protection): {}",
                error
            ),
            ParseInputError::WalletValidation(error) => {
                write!(f, "wallet validation failed: {}", error)
            }
            ParseInputError::Address(error) => write!(f, "failed to generate address: {}", error),
            ParseInputError::ScriptTypeDetection(error) => {
                write!(f, "failed to detect script type: {}", error)
            }
        }
    }
}

impl std::error::Error for ParseInputError {}

/// Spent script and value; `witness_utxo` wins, `non_witness_utxo` must agree with it.
pub fn get_output_script_and_value(
    input: &Input,
    prevout: OutPoint,
) -> Result<(&ScriptBuf, Amount), OutputScriptError> {
    let from_tx = input
        .non_witness_utxo
        .as_ref()
        .map(|tx| {
            tx.output
                .get(prevout.vout as usize)
                .ok_or(OutputScriptError::OutputIndexOutOfBounds { vout: prevout.vout })
        })
        .transpose()?;
    match (&input.witness_utxo, from_tx) {
        (Some(utxo), Some(output)) if utxo != output => Err(OutputScriptError::UtxoMismatch),
        (Some(utxo), _) => Ok((&utxo.script_pubkey, utxo.value)),
        (None, Some(output)) => Ok((&output.script_pubkey, output.value)),
        (None, None) => Err(OutputScriptError::NoUtxoFields),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputValidationErrorKind {
    InvalidOutputScript(String),
    NonWalletInput {
        output_script: ScriptBuf,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputValidationError {
    pub input_index: usize,
    pub prevout: OutPoint,
    pub kind: InputValidationErrorKind,
}

impl fmt::Display for InputValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            InputValidationErrorKind::InvalidOutputScript(error) => write!(
                f,
                "Input {} prevout={} failed to extract output script: {}",
                self.input_index, self.prevout, error
            ),
            InputValidationErrorKind::NonWalletInput {
                output_script,
                error,
            } => write!(
                f,
                "Input {} prevout={} output_script={:x} does not belong to the wallet: {}",
                self.input_index, self.prevout, output_script, error
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PsbtValidationError {
    InputLengthMismatch {
        prevouts_len: usize,
        inputs_len: usize,
    },
    InvalidInputs(Vec<InputValidationError>),
}

impl fmt::Display for PsbtValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PsbtValidationError::InputLengthMismatch {
                prevouts_len,
                inputs_len,
            } => write!(
                f,
                "Invalid input: prevouts length {} != psbt inputs length {}",
                prevouts_len, inputs_len
            ),
            PsbtValidationError::InvalidInputs(errors) => {
                write!(f, "Validation failed for {} input(s):", errors.len())?;
                for error in errors {
                    write!(f, "\n  - {}", error)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for PsbtValidationError {}

/// Checks every input against the wallet, collecting all failures.
pub fn validate_psbt_wallet_inputs(
    psbt: &Psbt,
    wallet_keys: &RootWalletKeys,
    replay_protection: &ReplayProtection,
    network: Network,
) -> Result<(), PsbtValidationError> {
    let tx_inputs = &psbt.unsigned_tx.input;
    if tx_inputs.len() != psbt.inputs.len() {
        return Err(PsbtValidationError::InputLengthMismatch {
            prevouts_len: tx_inputs.len(),
            inputs_len: psbt.inputs.len(),
        });
    }

    let errors: Vec<InputValidationError> = tx_inputs
        .iter()
        .zip(&psbt.inputs)
        .enumerate()
        .filter_map(|(input_index, (tx_input, input))| {
            let prevout = tx_input.previous_output;
            let kind = match get_output_script_and_value(input, prevout) {
                Err(e) => InputValidationErrorKind::InvalidOutputScript(e.to_string()),
                Ok((script, _)) if replay_protection.is_replay_protection_input(script) => {
                    return None
                }
                Ok((script, _)) => {
                    let error = assert_wallet_input(wallet_keys, input, script, network).err()?;
                    InputValidationErrorKind::NonWalletInput {
                        output_script: script.clone(),
                        error,
                    }
                }
            };
            Some(InputValidationError {
                input_index,
                prevout,
                kind,
            })
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(PsbtValidationError::InvalidInputs(errors))
    }
}
