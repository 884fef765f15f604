//! BitGo-specific PSBTs across multiple network formats.
//!
//! [`BitGoPsbt`] wraps a rust-bitcoin [`Psbt`] with the network it belongs to and the
//! network's transaction envelope. Zcash PSBTs carry the overwintered transaction fields in the
//! envelope and the consensus branch id in a BitGo proprietary key-value.

mod construct;
pub mod legacy_txformat;
pub mod p2tr_musig2_input;
pub mod propkv;
pub mod psbt_wallet_input;
pub mod psbt_wallet_output;
mod sign;
mod zcash_psbt;

use crate::bitcoin::bip32::Xpub;
use crate::bitcoin::consensus::encode;
use crate::bitcoin::psbt::{Input, Psbt, PsbtSighashType};
use crate::bitcoin::script::Instruction;
use crate::bitcoin::sighash::SighashCache;
use crate::bitcoin::{ecdsa, CompressedPublicKey, PublicKey, ScriptBuf, Transaction, Txid};
use crate::fixed_script_wallet::{ReplayProtection, RootWalletKeys};
use crate::zcash::transaction::{OverwinterFields, ZcashTransaction};
use crate::{Config, Context, Error, Network, Result};

pub use construct::EnvelopeOptions;
pub use propkv::{BitGoKeyValue, ProprietaryKeySubtype, BITGO};
pub use psbt_wallet_input::{
    validate_psbt_wallet_inputs, InputScriptType, ParsedInput, PsbtValidationError,
    ReplayProtectionOptions, ScriptId, SignPath, SignerKey, WalletInputOptions,
};
pub use psbt_wallet_output::ParsedOutput;
pub use sign::{NonceRound, SignedRound};

use p2tr_musig2_input::{key_spend_sighash, Musig2Error, Musig2Input};
use psbt_wallet_input::{
    derive_pubkey_from_input, get_output_script_and_value, verify_ecdsa_signature,
    verify_taproot_script_signature, EcdsaSighashScheme,
};

#[derive(Debug)]
pub enum DeserializeError {
    /// Standard bitcoin consensus decoding error
    Consensus(encode::Error),
    /// PSBT-specific error
    Psbt(crate::bitcoin::psbt::Error),
    /// Network-specific error message
    Network(String),
}

impl std::fmt::Display for DeserializeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeserializeError::Consensus(e) => write!(f, "{}", e),
            DeserializeError::Psbt(e) => write!(f, "{}", e),
            DeserializeError::Network(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for DeserializeError {}

impl From<encode::Error> for DeserializeError {
    fn from(e: encode::Error) -> Self {
        DeserializeError::Consensus(e)
    }
}

impl From<crate::bitcoin::psbt::Error> for DeserializeError {
    fn from(e: crate::bitcoin::psbt::Error) -> Self {
        DeserializeError::Psbt(e)
    }
}

#[derive(Debug)]
pub enum SerializeError {
    /// Standard bitcoin consensus encoding error
    Consensus(std::io::Error),
    /// Network-specific error message
    Network(String),
}

impl std::fmt::Display for SerializeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SerializeError::Consensus(e) => write!(f, "{}", e),
            SerializeError::Network(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for SerializeError {}

impl From<std::io::Error> for SerializeError {
    fn from(e: std::io::Error) -> Self {
        SerializeError::Consensus(e)
    }
}

/// Overwinter header and trailer of a branch-versioned transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchVersionedEnvelope {
    pub consensus_branch_id: u32,
    pub version_group_id: u32,
    pub expiry_height: u32,
    pub sapling_fields: Vec<u8>,
}

impl BranchVersionedEnvelope {
    pub fn overwinter_fields(&self) -> OverwinterFields {
        OverwinterFields {
            version_group_id: self.version_group_id,
            expiry_height: self.expiry_height,
            sapling_fields: self.sapling_fields.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEnvelope {
    /// Bitcoin transaction layout
    Plain,
    /// Zcash overwintered layout
    BranchVersioned(BranchVersionedEnvelope),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BitGoPsbt {
    psbt: Psbt,
    network: Network,
    envelope: NetworkEnvelope,
    default_sequence: u32,
}

/// Parsed transaction with wallet information
#[derive(Debug, Clone)]
pub struct ParsedTransaction {
    pub inputs: Vec<ParsedInput>,
    pub outputs: Vec<ParsedOutput>,
    /// Sum of the outputs that don't belong to the wallet
    pub spend_amount: u64,
    pub miner_fee: u64,
    pub virtual_size: u32,
}

/// Error type for transaction parsing
#[derive(Debug)]
pub enum ParseTransactionError {
    /// Failed to parse input
    Input {
        index: usize,
        error: psbt_wallet_input::ParseInputError,
    },
    /// Input value overflow when adding to total
    InputValueOverflow { index: usize },
    /// Failed to parse output
    Output {
        index: usize,
        error: psbt_wallet_output::ParseOutputError,
    },
    /// Output value overflow when adding to total
    OutputValueOverflow { index: usize },
    /// Spend amount overflow
    SpendAmountOverflow { index: usize },
    /// Fee calculation error (outputs exceed inputs)
    FeeCalculation,
}

impl std::fmt::Display for ParseTransactionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseTransactionError::Input { index, error } => {
                write!(f, "Input {}: {}", index, error)
            }
            ParseTransactionError::InputValueOverflow { index } => {
                write!(f, "Input {}: value overflow", index)
            }
            ParseTransactionError::Output { index, error } => {
                write!(f, "Output {}: {}", index, error)
            }
            ParseTransactionError::OutputValueOverflow { index } => {
                write!(f, "Output {}: value overflow", index)
            }
            ParseTransactionError::SpendAmountOverflow { index } => {
                write!(f, "Output {}: spend amount overflow", index)
            }
            ParseTransactionError::FeeCalculation => {
                write!(f, "Fee calculation error: outputs exceed inputs")
            }
        }
    }
}

impl std::error::Error for ParseTransactionError {}

/// A signature on an input, as exposed by [`BitGoPsbt::partial_signatures`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialSignatureInfo {
    /// 33-byte compressed key for ECDSA and MuSig2, 32-byte x-only key for tap script sigs
    pub pubkey: Vec<u8>,
    pub signature: Vec<u8>,
    pub is_schnorr: bool,
}

/// `<pubkey> OP_CHECKSIG`
fn extract_pubkey_from_p2pk_redeem_script(redeem_script: &ScriptBuf) -> Result<PublicKey> {
    use crate::bitcoin::opcodes::all::OP_CHECKSIG;

    let mut instructions = redeem_script.instructions();
    let public_key_bytes = match instructions.next() {
        Some(Ok(Instruction::PushBytes(bytes))) => bytes.as_bytes(),
        _ => {
            return Err(Error::InvalidInput(
                "Invalid redeem script format: missing public key".to_string(),
            ))
        }
    };
    match instructions.next() {
        Some(Ok(Instruction::Op(op))) if op == OP_CHECKSIG => {}
        _ => {
            return Err(Error::InvalidInput(
                "Redeem script does not end with OP_CHECKSIG".to_string(),
            ))
        }
    }
    PublicKey::from_slice(public_key_bytes)
        .map_err(|e| Error::InvalidInput(format!("Invalid public key: {}", e)))
}

/// Signature and redeem script of a finalized p2shP2pk scriptSig `<sig> <redeemScript>`.
fn parse_p2pk_script_sig(script_sig: &ScriptBuf) -> Result<(ecdsa::Signature, ScriptBuf)> {
    let pushes = script_sig
        .instructions()
        .map(|i| match i {
            Ok(Instruction::PushBytes(bytes)) => Ok(bytes.as_bytes().to_vec()),
            _ => Err(Error::InvalidInput("Invalid final_script_sig format".to_string())),
        })
        .collect::<Result<Vec<_>>>()?;
    let [signature, redeem_script] = pushes.as_slice() else {
        return Err(Error::InvalidInput(
            "Expected signature and redeem script in final_script_sig".to_string(),
        ));
    };
    let signature = ecdsa::Signature::from_slice(signature)
        .map_err(|e| Error::InvalidInput(format!("Invalid signature in final_script_sig: {}", e)))?;
    Ok((signature, ScriptBuf::from_bytes(redeem_script.clone())))
}

impl BitGoPsbt {
    /// Deserialize a PSBT from bytes, using network-specific logic
    pub fn deserialize(
        psbt_bytes: &[u8],
        network: Network,
    ) -> std::result::Result<BitGoPsbt, DeserializeError> {
        Self::deserialize_with_config(&Config::default(), psbt_bytes, network)
    }

    pub fn deserialize_with_config(
        config: &Config,
        psbt_bytes: &[u8],
        network: Network,
    ) -> std::result::Result<BitGoPsbt, DeserializeError> {
        let (psbt, envelope) = if network.is_branch_versioned() {
            let (psbt, overwinter) = zcash_psbt::deserialize(psbt_bytes)?;
            let consensus_branch_id = propkv::get_zec_consensus_branch_id(&psbt).ok_or_else(|| {
                DeserializeError::Network("Missing ZecConsensusBranchId".to_string())
            })?;
            let envelope = NetworkEnvelope::BranchVersioned(BranchVersionedEnvelope {
                consensus_branch_id,
                version_group_id: overwinter.version_group_id,
                expiry_height: overwinter.expiry_height,
                sapling_fields: overwinter.sapling_fields,
            });
            (psbt, envelope)
        } else {
            (Psbt::deserialize(psbt_bytes)?, NetworkEnvelope::Plain)
        };
        tracing::debug!(%network, inputs = psbt.inputs.len(), "deserialized psbt");
        Ok(BitGoPsbt {
            psbt,
            network,
            envelope,
            default_sequence: config.default_sequence,
        })
    }

    /// Serialize the PSBT to bytes, using network-specific logic
    pub fn serialize(&self) -> std::result::Result<Vec<u8>, SerializeError> {
        match &self.envelope {
            NetworkEnvelope::Plain => Ok(self.psbt.serialize()),
            NetworkEnvelope::BranchVersioned(env) => {
                zcash_psbt::serialize(&self.psbt, &env.overwinter_fields())
            }
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn envelope(&self) -> &NetworkEnvelope {
        &self.envelope
    }

    pub fn psbt(&self) -> &Psbt {
        &self.psbt
    }

    pub fn psbt_mut(&mut self) -> &mut Psbt {
        &mut self.psbt
    }

    pub fn into_psbt(self) -> Psbt {
        self.psbt
    }

    pub fn version(&self) -> i32 {
        self.psbt.unsigned_tx.version.0
    }

    pub fn lock_time(&self) -> u32 {
        self.psbt.unsigned_tx.lock_time.to_consensus_u32()
    }

    pub fn input_count(&self) -> usize {
        self.psbt.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.psbt.outputs.len()
    }

    /// Network encoding of `tx`: plain consensus encoding, or the overwintered layout.
    pub fn encode_transaction(&self, tx: &Transaction) -> Result<Vec<u8>> {
        match &self.envelope {
            NetworkEnvelope::Plain => Ok(encode::serialize(tx)),
            NetworkEnvelope::BranchVersioned(env) => ZcashTransaction {
                transaction: tx.clone(),
                overwinter: Some(env.overwinter_fields()),
            }
            .encode()
            .map_err(|e| Error::InvalidInput(e.to_string())),
        }
    }

    /// Txid of the unsigned transaction; for Zcash, of its overwintered encoding.
    pub fn unsigned_txid(&self) -> Result<Txid> {
        match &self.envelope {
            NetworkEnvelope::Plain => Ok(self.psbt.unsigned_tx.compute_txid()),
            NetworkEnvelope::BranchVersioned(env) => ZcashTransaction {
                transaction: self.psbt.unsigned_tx.clone(),
                overwinter: Some(env.overwinter_fields()),
            }
            .txid()
            .map_err(|e| Error::InvalidInput(e.to_string())),
        }
    }

    /// The transaction with every finalized input's scriptSig and witness filled in.
    pub fn current_transaction(&self) -> Transaction {
        let mut tx = self.psbt.unsigned_tx.clone();
        for (tx_input, input) in tx.input.iter_mut().zip(&self.psbt.inputs) {
            if let Some(script_sig) = &input.final_script_sig {
                tx_input.script_sig = script_sig.clone();
            }
            if let Some(witness) = &input.final_script_witness {
                tx_input.witness = witness.clone();
            }
        }
        tx
    }

    /// Virtual size of the transaction as currently encoded.
    pub fn virtual_size(&self) -> Result<u32> {
        let tx = self.current_transaction();
        let vsize = match self.envelope {
            NetworkEnvelope::Plain => tx.weight().to_vbytes_ceil(),
            NetworkEnvelope::BranchVersioned(_) => self.encode_transaction(&tx)?.len() as u64,
        };
        u32::try_from(vsize).map_err(|_| Error::InvalidInput("transaction too large".to_string()))
    }

    pub(crate) fn sighash_scheme(&self) -> EcdsaSighashScheme {
        match (&self.envelope, self.network.fork_id()) {
            (NetworkEnvelope::BranchVersioned(env), _) => EcdsaSighashScheme::Zcash {
                consensus_branch_id: env.consensus_branch_id,
                version_group_id: env.version_group_id,
                expiry_height: env.expiry_height,
            },
            (NetworkEnvelope::Plain, Some(fork_id)) => EcdsaSighashScheme::ForkId(fork_id),
            (NetworkEnvelope::Plain, None) => EcdsaSighashScheme::Bitcoin,
        }
    }

    /// The unsigned transaction with one signature per input in the pre-PSBT layout.
    ///
    /// Every input must be a p2sh, p2shP2wsh or p2wsh multisig input with exactly one
    /// signature.
    pub fn get_half_signed_legacy_format(&self) -> Result<Vec<u8>> {
        let tx = legacy_txformat::build_half_signed_legacy_tx(&self.psbt)
            .map_err(Error::InvalidInput)?;
        self.encode_transaction(&tx)
    }

    /// All signatures present on an input.
    pub fn partial_signatures(&self, index: usize) -> Result<Vec<PartialSignatureInfo>> {
        let input = self.input(index)?;
        let mut signatures: Vec<PartialSignatureInfo> = input
            .partial_sigs
            .iter()
            .map(|(key, sig)| PartialSignatureInfo {
                pubkey: key.to_bytes(),
                signature: sig.to_vec(),
                is_schnorr: false,
            })
            .collect();
        signatures.extend(input.tap_script_sigs.iter().map(|((key, _), sig)| {
            PartialSignatureInfo {
                pubkey: key.serialize().to_vec(),
                signature: sig.to_vec(),
                is_schnorr: true,
            }
        }));
        if Musig2Input::is_musig2_input(input) {
            signatures.extend(
                p2tr_musig2_input::parse_musig2_partial_sigs(input)?
                    .into_iter()
                    .map(|sig| PartialSignatureInfo {
                        pubkey: sig.participant_pub_key.to_bytes().to_vec(),
                        signature: sig.partial_sig,
                        is_schnorr: true,
                    }),
            );
        }
        Ok(signatures)
    }

    fn input(&self, index: usize) -> Result<&Input> {
        self.psbt.inputs.get(index).ok_or(Error::IndexOutOfBounds {
            index,
            len: self.psbt.inputs.len(),
        })
    }

    /// Verifies the signature of a wallet signer on one input.
    ///
    /// # Arguments
    /// - `ctx`: verification context
    /// - `index`: input index
    /// - `xpub`: root key of the signer; derived along the input's recorded paths
    ///
    /// # Returns
    /// - `Ok(true)` if the input holds a valid signature by the derived key
    /// - `Ok(false)` if `xpub` is not a signer of the input, or its signature is missing or
    ///   invalid
    /// - `Err(Error::IndexOutOfBounds)` for an index past the last input
    pub fn verify_signature_with_xpub(
        &self,
        ctx: &Context,
        index: usize,
        xpub: &Xpub,
    ) -> Result<bool> {
        let input = self.input(index)?;
        let Some(derived) =
            derive_pubkey_from_input(ctx.secp(), xpub, input).map_err(Error::InvalidInput)?
        else {
            return Ok(false);
        };
        self.verify_signature_with_pub(ctx, index, &CompressedPublicKey(derived))
    }

    /// Checks ECDSA, tap script and MuSig2 partial signatures by `pubkey`.
    pub fn verify_signature_with_pub(
        &self,
        ctx: &Context,
        index: usize,
        pubkey: &CompressedPublicKey,
    ) -> Result<bool> {
        let input = self.input(index)?;
        if Musig2Input::is_musig2_input(input) && input.tap_scripts.is_empty() {
            let musig2 = Musig2Input::from_input(input)?;
            let merkle_root = input
                .tap_merkle_root
                .ok_or(Musig2Error::MissingMerkleRoot)?;
            let message = key_spend_sighash(&self.psbt, index)?;
            return Ok(musig2.verify_partial_signature(pubkey, &message, &merkle_root)?);
        }
        if !input.tap_key_origins.is_empty() {
            return verify_taproot_script_signature(ctx.secp(), &self.psbt, index, *pubkey)
                .map_err(Error::Signing);
        }
        verify_ecdsa_signature(ctx.secp(), &self.psbt, index, *pubkey, &self.sighash_scheme())
            .map_err(Error::Signing)
    }

    /// `Ok(false)` for a replay protection input without a valid signature.
    ///
    /// Fails if the input does not spend one of the `replay_protection` scripts.
    pub fn verify_replay_protection_signature(
        &self,
        ctx: &Context,
        index: usize,
        replay_protection: &ReplayProtection,
    ) -> Result<bool> {
        let input = self.input(index)?;
        let prevout = self.psbt.unsigned_tx.input[index].previous_output;
        let (output_script, _) = get_output_script_and_value(input, prevout)
            .map_err(|e| Error::InvalidInput(e.to_string()))?;
        if !replay_protection.is_replay_protection_input(output_script) {
            return Err(Error::InvalidInput(format!(
                "Input {} is not a replay protection input",
                index
            )));
        }

        // finalized inputs keep their signature and redeem script in the scriptSig
        let spend = (&input.redeem_script, &input.final_script_sig);
        let (public_key, signature, sighash_input) = match spend {
            (Some(redeem_script), _) => {
                let public_key = extract_pubkey_from_p2pk_redeem_script(redeem_script)?;
                let Some(signature) = input.partial_sigs.get(&public_key) else {
                    return Ok(false);
                };
                (public_key, *signature, None)
            }
            (None, Some(script_sig)) => {
                let (signature, redeem_script) = parse_p2pk_script_sig(script_sig)?;
                let public_key = extract_pubkey_from_p2pk_redeem_script(&redeem_script)?;
                (public_key, signature, Some(redeem_script))
            }
            (None, None) => return Ok(false),
        };

        let scratch;
        let psbt = match sighash_input {
            None => &self.psbt,
            Some(redeem_script) => {
                let mut psbt = self.psbt.clone();
                psbt.inputs[index].redeem_script = Some(redeem_script);
                psbt.inputs[index].final_script_sig = None;
                psbt.inputs[index].sighash_type =
                    Some(PsbtSighashType::from_u32(signature.sighash_type.to_u32()));
                scratch = psbt;
                &scratch
            }
        };
        let mut cache = SighashCache::new(&psbt.unsigned_tx);
        let message = self
            .sighash_scheme()
            .message(psbt, index, &mut cache)
            .map_err(Error::Signing)?;
        Ok(ctx
            .secp()
            .verify_ecdsa(&message, &signature.signature, &public_key.inner)
            .is_ok())
    }

    /// Checks every input against the wallet without parsing outputs.
    pub fn validate_wallet_inputs(
        &self,
        wallet_keys: &RootWalletKeys,
        replay_protection: &ReplayProtection,
    ) -> std::result::Result<(), PsbtValidationError> {
        validate_psbt_wallet_inputs(&self.psbt, wallet_keys, replay_protection, self.network)
    }

    fn parse_inputs(
        &self,
        wallet_keys: &RootWalletKeys,
        replay_protection: &ReplayProtection,
    ) -> std::result::Result<Vec<ParsedInput>, ParseTransactionError> {
        self.psbt
            .unsigned_tx
            .input
            .iter()
            .zip(&self.psbt.inputs)
            .enumerate()
            .map(|(index, (tx_input, psbt_input))| {
                ParsedInput::parse(
                    psbt_input,
                    tx_input,
                    wallet_keys,
                    replay_protection,
                    self.network,
                )
                .map_err(|error| ParseTransactionError::Input { index, error })
            })
            .collect()
    }

    fn parse_outputs(
        &self,
        wallet_keys: &RootWalletKeys,
    ) -> std::result::Result<Vec<ParsedOutput>, ParseTransactionError> {
        self.psbt
            .unsigned_tx
            .output
            .iter()
            .zip(&self.psbt.outputs)
            .enumerate()
            .map(|(index, (tx_output, psbt_output))| {
                ParsedOutput::parse(psbt_output, tx_output, wallet_keys, self.network)
                    .map_err(|error| ParseTransactionError::Output { index, error })
            })
            .collect()
    }

    fn sum_input_values(
        parsed_inputs: &[ParsedInput],
    ) -> std::result::Result<u64, ParseTransactionError> {
        parsed_inputs
            .iter()
            .enumerate()
            .try_fold(0u64, |total, (index, input)| {
                total
                    .checked_add(input.value)
                    .ok_or(ParseTransactionError::InputValueOverflow { index })
            })
    }

    /// `(total, spend)` where spend only counts external outputs.
    fn sum_output_values(
        parsed_outputs: &[ParsedOutput],
    ) -> std::result::Result<(u64, u64), ParseTransactionError> {
        parsed_outputs.iter().enumerate().try_fold(
            (0u64, 0u64),
            |(total, spend), (index, output)| {
                let total = total
                    .checked_add(output.value)
                    .ok_or(ParseTransactionError::OutputValueOverflow { index })?;
                let spend = if output.is_external() {
                    spend
                        .checked_add(output.value)
                        .ok_or(ParseTransactionError::SpendAmountOverflow { index })?
                } else {
                    spend
                };
                Ok((total, spend))
            },
        )
    }

    /// Classifies outputs against a wallet that may differ from the inputs' wallet.
    pub fn parse_outputs_with_wallet_keys(
        &self,
        wallet_keys: &RootWalletKeys,
    ) -> Result<Vec<ParsedOutput>> {
        Ok(self.parse_outputs(wallet_keys)?)
    }

    /// Validates every input against the wallet, classifies outputs and computes fee and
    /// spend amount.
    pub fn parse_transaction_with_wallet_keys(
        &self,
        wallet_keys: &RootWalletKeys,
        replay_protection: &ReplayProtection,
    ) -> Result<ParsedTransaction> {
        let inputs = self.parse_inputs(wallet_keys, replay_protection)?;
        let outputs = self.parse_outputs(wallet_keys)?;
        let total_input_value = Self::sum_input_values(&inputs)?;
        let (total_output_value, spend_amount) = Self::sum_output_values(&outputs)?;
        let miner_fee = total_input_value
            .checked_sub(total_output_value)
            .ok_or(ParseTransactionError::FeeCalculation)?;

        Ok(ParsedTransaction {
            inputs,
            outputs,
            spend_amount,
            miner_fee,
            virtual_size: self.virtual_size()?,
        })
    }
}

#[cfg(feature = "inspect")]
impl ParsedTransaction {
    pub fn to_json(&self) -> serde_json::Value {
        let inputs: Vec<_> = self
            .inputs
            .iter()
            .map(|input| {
                serde_json::json!({
                    "previousOutput": input.previous_output.to_string(),
                    "address": input.address,
                    "script": hex::encode(&input.script),
                    "value": input.value,
                    "scriptId": input.script_id,
                    "scriptType": input.script_type.as_str(),
                    "sequence": input.sequence,
                })
            })
            .collect();
        let outputs: Vec<_> = self
            .outputs
            .iter()
            .map(|output| {
                serde_json::json!({
                    "address": output.address,
                    "script": hex::encode(&output.script),
                    "value": output.value,
                    "scriptId": output.script_id,
                })
            })
            .collect();
        serde_json::json!({
            "inputs": inputs,
            "outputs": outputs,
            "spendAmount": self.spend_amount,
            "minerFee": self.miner_fee,
            "virtualSize": self.virtual_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin::bip32::Xpriv;
    use crate::fixed_script_wallet::test_utils::{
        get_test_wallet_keys, get_test_wallet_xprvs, test_outpoint,
    };
    use crate::fixed_script_wallet::{Dimensions, OutputScriptType, SizeMode};
    use crate::zcash::NetworkUpgrade;
    use rstest::rstest;

    const SEED: &str = "bitgo_psbt";

    fn wallet() -> (RootWalletKeys, [Xpriv; 3]) {
        (get_test_wallet_keys(SEED), get_test_wallet_xprvs(SEED))
    }

    /// p2shP2wsh input of 10,000 spent to a p2wsh change output of 9,000.
    fn p2sh_p2wsh_to_p2wsh() -> BitGoPsbt {
        let (keys, _) = wallet();
        let mut psbt =
            BitGoPsbt::create_empty(Network::Bitcoin, &keys, EnvelopeOptions::default()).unwrap();
        psbt.add_wallet_input(
            test_outpoint(0),
            10_000,
            &keys,
            ScriptId { chain: 10, index: 0 },
            WalletInputOptions::default(),
        )
        .unwrap();
        psbt.add_wallet_output(&keys, ScriptId { chain: 21, index: 0 }, 9_000)
            .unwrap();
        psbt
    }

    #[test]
    fn test_end_to_end_fee_and_size() {
        let ctx = Context::init();
        let (keys, [user, _, bitgo]) = wallet();
        let mut psbt = p2sh_p2wsh_to_p2wsh();
        let dimensions = Dimensions::from_psbt(&psbt).unwrap();

        let parsed = psbt
            .parse_transaction_with_wallet_keys(&keys, &ReplayProtection::default())
            .unwrap();
        assert_eq!(parsed.miner_fee, 1_000);
        assert_eq!(parsed.spend_amount, 0);
        assert_eq!(parsed.inputs[0].script_id, Some(ScriptId { chain: 10, index: 0 }));
        assert_eq!(parsed.inputs[0].script_type, InputScriptType::P2shP2wsh);
        assert_eq!(parsed.inputs[0].value, 10_000);
        assert_eq!(parsed.inputs[0].sequence, 0xFFFF_FFFE);
        assert_eq!(parsed.outputs[0].script_id, Some(ScriptId { chain: 21, index: 0 }));

        psbt.sign(&ctx, &user).unwrap();
        psbt.sign(&ctx, &bitgo).unwrap();
        psbt.finalize_all_inputs(&ctx).unwrap();
        let vsize = psbt.virtual_size().unwrap() as usize;
        assert!(dimensions.vsize(SizeMode::Min) <= vsize);
        assert!(vsize <= dimensions.vsize(SizeMode::Max));

        let tx: Transaction =
            encode::deserialize(&psbt.extract_transaction(&ctx).unwrap()).unwrap();
        assert_eq!(tx.compute_ntxid(), psbt.psbt().unsigned_tx.compute_ntxid());
        assert_eq!(tx.input[0].witness.len(), 5);
    }

    #[rstest]
    #[case::p2sh(Network::BitcoinCash, 0, SignerKey::Bitgo)]
    #[case::p2tr_legacy_user_bitgo_leaf(Network::Bitcoin, 30, SignerKey::Bitgo)]
    #[case::p2tr_legacy_user_backup_leaf(Network::Bitcoin, 30, SignerKey::Backup)]
    #[case::p2tr_musig2_script_path(Network::Bitcoin, 40, SignerKey::Backup)]
    fn test_dimensions_bracket_signed_size(
        #[case] network: Network,
        #[case] chain: u32,
        #[case] cosigner: SignerKey,
    ) {
        let ctx = Context::init();
        let (keys, xprvs) = wallet();
        let sign_path = SignPath {
            signer: SignerKey::User,
            cosigner,
        };
        let mut psbt = BitGoPsbt::create_empty(network, &keys, EnvelopeOptions::default()).unwrap();
        for n in 0..2 {
            psbt.add_wallet_input(
                test_outpoint(n),
                10_000,
                &keys,
                ScriptId { chain, index: n },
                WalletInputOptions {
                    sign_path: Some(sign_path),
                    ..Default::default()
                },
            )
            .unwrap();
        }
        psbt.add_wallet_output(&keys, ScriptId { chain: 1, index: 0 }, 19_000)
            .unwrap();
        let dimensions = Dimensions::from_psbt(&psbt).unwrap();

        psbt.sign(&ctx, &xprvs[SignerKey::User.index()]).unwrap();
        psbt.sign(&ctx, &xprvs[cosigner.index()]).unwrap();
        psbt.finalize_all_inputs(&ctx).unwrap();
        let vsize = psbt.virtual_size().unwrap() as usize;
        assert!(dimensions.vsize(SizeMode::Min) <= vsize);
        assert!(vsize <= dimensions.vsize(SizeMode::Max));
        if chain >= 30 {
            assert_eq!(
                dimensions.input_weight(SizeMode::Min),
                dimensions.input_weight(SizeMode::Max)
            );
        }
    }

    #[test]
    fn test_dimensions_bracket_replay_protection_input() {
        let ctx = Context::init();
        let (keys, _) = wallet();
        let rp_key = crate::bitcoin::secp256k1::SecretKey::from_slice(&[5u8; 32]).unwrap();
        let rp_pub = CompressedPublicKey(rp_key.public_key(ctx.secp()));
        let mut psbt =
            BitGoPsbt::create_empty(Network::BitcoinCash, &keys, EnvelopeOptions::default())
                .unwrap();
        psbt.add_replay_protection_input(test_outpoint(0), 1_000, rp_pub, Default::default())
            .unwrap();
        psbt.add_wallet_output(&keys, ScriptId { chain: 0, index: 0 }, 800)
            .unwrap();
        let dimensions = Dimensions::from_psbt(&psbt).unwrap();
        assert_eq!(
            dimensions,
            Dimensions::from_input_script_type(InputScriptType::P2shP2pk)
                .plus(&Dimensions::from_output_script_type(OutputScriptType::P2sh))
        );

        psbt.sign_replay_protection_inputs(&ctx, &rp_key).unwrap();
        psbt.finalize_all_inputs(&ctx).unwrap();
        let vsize = psbt.virtual_size().unwrap() as usize;
        assert!(dimensions.vsize(SizeMode::Min) <= vsize);
        assert!(vsize <= dimensions.vsize(SizeMode::Max));
    }

    #[test]
    fn test_serialize_round_trip() {
        let psbt = p2sh_p2wsh_to_p2wsh();
        let bytes = psbt.serialize().unwrap();
        let decoded = BitGoPsbt::deserialize(&bytes, Network::Bitcoin).unwrap();
        assert_eq!(decoded, psbt);
    }

    #[test]
    fn test_txid_invariant_under_signing_order_and_clone() {
        let ctx = Context::init();
        let (_, [user, backup, bitgo]) = wallet();
        let psbt = p2sh_p2wsh_to_p2wsh();
        let txid = psbt.unsigned_txid().unwrap();

        let mut a = psbt.clone();
        a.sign(&ctx, &user).unwrap();
        a.sign(&ctx, &bitgo).unwrap();
        let mut b = psbt.clone();
        b.sign(&ctx, &backup).unwrap();
        b.sign(&ctx, &user).unwrap();

        assert_eq!(a.unsigned_txid().unwrap(), txid);
        assert_eq!(b.unsigned_txid().unwrap(), txid);
        assert_eq!(a.clone().unsigned_txid().unwrap(), txid);
    }

    #[test]
    fn test_rebuild_from_parsed_transaction() {
        let (keys, _) = wallet();
        let psbt = p2sh_p2wsh_to_p2wsh();
        let parsed = psbt
            .parse_transaction_with_wallet_keys(&keys, &ReplayProtection::default())
            .unwrap();

        let mut rebuilt =
            BitGoPsbt::create_empty(Network::Bitcoin, &keys, EnvelopeOptions::default()).unwrap();
        for input in &parsed.inputs {
            rebuilt
                .add_wallet_input(
                    input.previous_output,
                    input.value,
                    &keys,
                    input.script_id.unwrap(),
                    WalletInputOptions {
                        sequence: Some(input.sequence),
                        ..Default::default()
                    },
                )
                .unwrap();
        }
        for output in &parsed.outputs {
            rebuilt.add_output(ScriptBuf::from_bytes(output.script.clone()), output.value);
        }
        assert_eq!(rebuilt.unsigned_txid().unwrap(), psbt.unsigned_txid().unwrap());
    }

    #[test]
    fn test_unrelated_wallet_flips_output_classification() {
        let other = get_test_wallet_keys("unrelated");
        let psbt = p2sh_p2wsh_to_p2wsh();
        let outputs = psbt.parse_outputs_with_wallet_keys(&other).unwrap();
        assert!(outputs[0].is_external());

        assert!(matches!(
            psbt.parse_transaction_with_wallet_keys(&other, &ReplayProtection::default()),
            Err(Error::WalletValidationFailure { index: 0, .. })
        ));
        assert!(psbt
            .validate_wallet_inputs(&other, &ReplayProtection::default())
            .is_err());
    }

    #[test]
    fn test_half_signed_legacy_format() {
        let ctx = Context::init();
        let (keys, [user, _, bitgo]) = wallet();
        let mut psbt =
            BitGoPsbt::create_empty(Network::Bitcoin, &keys, EnvelopeOptions::default()).unwrap();
        psbt.add_wallet_input(
            test_outpoint(3),
            50_000,
            &keys,
            ScriptId { chain: 20, index: 7 },
            WalletInputOptions::default(),
        )
        .unwrap();
        psbt.add_output_with_address("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq", 40_000)
            .unwrap();

        assert!(psbt.get_half_signed_legacy_format().is_err());
        psbt.sign(&ctx, &user).unwrap();
        let bytes = psbt.get_half_signed_legacy_format().unwrap();
        let tx: Transaction = encode::deserialize(&bytes).unwrap();
        let witness: Vec<&[u8]> = tx.input[0].witness.iter().collect();
        assert_eq!(witness.len(), 5);
        assert!(witness[0].is_empty());
        // the user key comes first in the multisig script
        assert!(!witness[1].is_empty());
        assert!(witness[2].is_empty() && witness[3].is_empty());

        psbt.sign(&ctx, &bitgo).unwrap();
        assert!(psbt.get_half_signed_legacy_format().is_err());
    }

    #[test]
    fn test_partial_signatures_and_verification() {
        let ctx = Context::init();
        let (keys, [user, backup, _]) = wallet();
        let mut psbt = p2sh_p2wsh_to_p2wsh();
        psbt.sign(&ctx, &user).unwrap();

        let sigs = psbt.partial_signatures(0).unwrap();
        assert_eq!(sigs.len(), 1);
        assert!(!sigs[0].is_schnorr);
        assert!(psbt.verify_signature_with_xpub(&ctx, 0, keys.user_key()).unwrap());
        assert!(!psbt.verify_signature_with_xpub(&ctx, 0, keys.bitgo_key()).unwrap());
        assert!(psbt.partial_signatures(1).is_err());

        let mut taproot =
            BitGoPsbt::create_empty(Network::Bitcoin, &keys, EnvelopeOptions::default()).unwrap();
        taproot
            .add_wallet_input(
                test_outpoint(1),
                8_000,
                &keys,
                ScriptId { chain: 30, index: 2 },
                WalletInputOptions::default(),
            )
            .unwrap();
        taproot.add_op_return_output(b"data", 0).unwrap();
        taproot.sign(&ctx, &backup).unwrap();
        let sigs = taproot.partial_signatures(0).unwrap();
        assert_eq!(sigs.len(), 1);
        assert!(sigs[0].is_schnorr && sigs[0].pubkey.len() == 32);
        assert!(taproot.verify_signature_with_xpub(&ctx, 0, keys.backup_key()).unwrap());
        assert!(!taproot.verify_signature_with_xpub(&ctx, 0, keys.user_key()).unwrap());
    }

    #[test]
    fn test_musig2_key_path_flow() {
        let ctx = Context::init();
        let (keys, [user, _, bitgo]) = wallet();
        let mut psbt =
            BitGoPsbt::create_empty(Network::Bitcoin, &keys, EnvelopeOptions::default()).unwrap();
        psbt.add_wallet_input(
            test_outpoint(5),
            30_000,
            &keys,
            ScriptId { chain: 40, index: 3 },
            WalletInputOptions::default(),
        )
        .unwrap();
        psbt.add_wallet_input(
            test_outpoint(6),
            20_000,
            &keys,
            ScriptId { chain: 20, index: 3 },
            WalletInputOptions::default(),
        )
        .unwrap();
        psbt.add_wallet_output(&keys, ScriptId { chain: 41, index: 0 }, 45_000)
            .unwrap();
        let dimensions = Dimensions::from_psbt(&psbt).unwrap();

        // user and bitgo work on separate copies
        let mut user_psbt = psbt.clone();
        let mut bitgo_psbt = psbt.clone();
        let user_round = user_psbt.generate_musig2_nonces(&ctx, &user, None).unwrap();
        assert_eq!(user_round.input_indices(), vec![0]);
        let bitgo_round = bitgo_psbt.generate_musig2_nonces(&ctx, &bitgo, None).unwrap();

        user_psbt.combine_musig2_nonces(&bitgo_psbt).unwrap();
        bitgo_psbt.combine_musig2_nonces(&user_psbt).unwrap();
        assert_eq!(user_round.sign(&mut user_psbt, &ctx).unwrap().signed_inputs(), &[0]);
        bitgo_round.sign(&mut bitgo_psbt, &ctx).unwrap();
        user_psbt.sign(&ctx, &user).unwrap();
        bitgo_psbt.sign(&ctx, &bitgo).unwrap();

        assert!(user_psbt.verify_signature_with_xpub(&ctx, 0, keys.user_key()).unwrap());
        assert!(!user_psbt.verify_signature_with_xpub(&ctx, 0, keys.bitgo_key()).unwrap());
        assert!(!user_psbt.verify_signature_with_xpub(&ctx, 0, keys.backup_key()).unwrap());

        // move bitgo's signatures over
        let bitgo_input = bitgo_psbt.psbt().inputs[0].clone();
        user_psbt.psbt_mut().inputs[0]
            .proprietary
            .extend(bitgo_input.proprietary);
        let bitgo_sigs = bitgo_psbt.psbt().inputs[1].partial_sigs.clone();
        user_psbt.psbt_mut().inputs[1].partial_sigs.extend(bitgo_sigs);
        assert_eq!(user_psbt.partial_signatures(0).unwrap().len(), 2);

        user_psbt.finalize_all_inputs(&ctx).unwrap();
        let witness = user_psbt.psbt().inputs[0].final_script_witness.as_ref().unwrap();
        assert_eq!(witness.len(), 1);
        assert_eq!(witness.iter().next().unwrap().len(), 64);
        let vsize = user_psbt.virtual_size().unwrap() as usize;
        assert!(dimensions.vsize(SizeMode::Min) <= vsize);
        assert!(vsize <= dimensions.vsize(SizeMode::Max));
    }

    #[test]
    fn test_musig2_deterministic_counterparty() {
        let ctx = Context::init();
        let (keys, [user, _, bitgo]) = wallet();
        let mut psbt =
            BitGoPsbt::create_empty(Network::Bitcoin, &keys, EnvelopeOptions::default()).unwrap();
        psbt.add_wallet_input(
            test_outpoint(8),
            30_000,
            &keys,
            ScriptId { chain: 41, index: 0 },
            WalletInputOptions::default(),
        )
        .unwrap();
        psbt.add_op_return_output(b"x", 0).unwrap();

        assert!(matches!(
            psbt.clone().sign_musig2_input_deterministic(&ctx, 0, &bitgo),
            Err(Error::NonceExchangeIncomplete { index: 0 })
        ));
        let round = psbt.generate_musig2_nonces(&ctx, &user, None).unwrap();
        psbt.sign_musig2_input_deterministic(&ctx, 0, &bitgo).unwrap();
        round.sign(&mut psbt, &ctx).unwrap();
        assert!(psbt.verify_signature_with_xpub(&ctx, 0, keys.bitgo_key()).unwrap());
        psbt.finalize_input(&ctx, 0).unwrap();
        assert!(psbt.extract_transaction(&ctx).is_ok());
    }

    #[test]
    fn test_nonce_round_rejects_other_transaction() {
        let ctx = Context::init();
        let (keys, [user, _, _]) = wallet();
        let mut psbt =
            BitGoPsbt::create_empty(Network::Bitcoin, &keys, EnvelopeOptions::default()).unwrap();
        psbt.add_wallet_input(
            test_outpoint(9),
            30_000,
            &keys,
            ScriptId { chain: 40, index: 0 },
            WalletInputOptions::default(),
        )
        .unwrap();
        let mut other = psbt.clone();
        other.add_op_return_output(b"y", 0).unwrap();
        let round = psbt.generate_musig2_nonces(&ctx, &user, None).unwrap();
        assert!(matches!(round.sign(&mut other, &ctx), Err(Error::InvalidInput(_))));
        assert!(matches!(
            psbt.combine_musig2_nonces(&other),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_replay_protection_input() {
        let ctx = Context::init();
        let (keys, [user, _, bitgo]) = wallet();
        let secp = ctx.secp();
        let rp_key = crate::bitcoin::secp256k1::SecretKey::from_slice(&[3u8; 32]).unwrap();
        let rp_pub = CompressedPublicKey(rp_key.public_key(secp));
        let replay_protection = ReplayProtection::from_public_keys(&[rp_pub]);

        let mut psbt =
            BitGoPsbt::create_empty(Network::BitcoinTestnet3, &keys, EnvelopeOptions::default())
                .unwrap();
        psbt.add_replay_protection_input(test_outpoint(2), 1_000, rp_pub, Default::default())
            .unwrap();
        psbt.add_wallet_input(
            test_outpoint(4),
            10_000,
            &keys,
            ScriptId { chain: 11, index: 1 },
            WalletInputOptions::default(),
        )
        .unwrap();
        psbt.add_output_with_address("tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx", 10_500)
            .unwrap();

        let parsed = psbt
            .parse_transaction_with_wallet_keys(&keys, &replay_protection)
            .unwrap();
        assert_eq!(parsed.inputs[0].script_type, InputScriptType::P2shP2pk);
        assert_eq!(parsed.inputs[0].script_id, None);
        assert_eq!(parsed.spend_amount, 10_500);

        assert_eq!(psbt.sign(&ctx, &user).unwrap(), vec![1]);
        psbt.sign(&ctx, &bitgo).unwrap();
        assert!(!psbt
            .verify_replay_protection_signature(&ctx, 0, &replay_protection)
            .unwrap());
        assert_eq!(psbt.sign_replay_protection_inputs(&ctx, &rp_key).unwrap(), vec![0]);
        assert!(psbt
            .verify_replay_protection_signature(&ctx, 0, &replay_protection)
            .unwrap());
        assert!(psbt
            .verify_replay_protection_signature(&ctx, 1, &replay_protection)
            .is_err());

        psbt.finalize_all_inputs(&ctx).unwrap();
        assert!(psbt
            .verify_replay_protection_signature(&ctx, 0, &replay_protection)
            .unwrap());
    }

    #[rstest]
    #[case(Network::Zcash, 2_726_400)]
    #[case(Network::ZcashTestnet, 3_000_000)]
    fn test_zcash_round_trip(#[case] network: Network, #[case] height: u32) {
        let ctx = Context::init();
        let (keys, [user, _, bitgo]) = wallet();
        let options = EnvelopeOptions {
            block_height: Some(height),
            expiry_height: Some(height + 40),
            ..Default::default()
        };
        let mut psbt = BitGoPsbt::create_empty(network, &keys, options).unwrap();
        psbt.add_wallet_input(
            test_outpoint(7),
            100_000,
            &keys,
            ScriptId { chain: 0, index: 4 },
            WalletInputOptions::default(),
        )
        .unwrap();
        psbt.add_wallet_output(&keys, ScriptId { chain: 1, index: 4 }, 99_000)
            .unwrap();

        let bytes = psbt.serialize().unwrap();
        let decoded = BitGoPsbt::deserialize(&bytes, network).unwrap();
        assert_eq!(decoded, psbt);
        assert_eq!(decoded.unsigned_txid().unwrap(), psbt.unsigned_txid().unwrap());

        psbt.sign(&ctx, &user).unwrap();
        psbt.sign(&ctx, &bitgo).unwrap();
        assert!(psbt.verify_signature_with_xpub(&ctx, 0, keys.user_key()).unwrap());
        let tx = psbt.extract_transaction(&ctx).unwrap();
        let ztx = ZcashTransaction::decode(&tx).unwrap();
        assert_eq!(ztx.overwinter.unwrap().expiry_height, height + 40);
        assert_eq!(ztx.transaction.output, psbt.psbt().unsigned_tx.output);

        match psbt.envelope() {
            NetworkEnvelope::BranchVersioned(env) => assert_eq!(
                NetworkUpgrade::from_branch_id(env.consensus_branch_id),
                crate::zcash::network_upgrade_at_height(height, network)
            ),
            NetworkEnvelope::Plain => panic!("expected branch-versioned envelope"),
        }
    }

    #[test]
    fn test_failed_finalize_leaves_container_unchanged() {
        let ctx = Context::init();
        let (_, [user, _, _]) = wallet();
        let mut psbt = p2sh_p2wsh_to_p2wsh();
        psbt.sign(&ctx, &user).unwrap();
        let before = psbt.clone();
        assert!(matches!(
            psbt.finalize_all_inputs(&ctx),
            Err(Error::SignatureCountMismatch { index: 0, .. })
        ));
        assert_eq!(psbt, before);
        assert!(psbt.extract_transaction(&ctx).is_err());
    }
}
