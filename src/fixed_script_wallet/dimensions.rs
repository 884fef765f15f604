//! Dimensions for estimating transaction virtual size.
//!
//! Weight is tracked with min/max bounds to account for ECDSA signature length variance.
//! Schnorr signatures are always 64 bytes, so taproot inputs have `min == max`.

use crate::bitcoin::{Script, VarInt};
use crate::fixed_script_wallet::bitgo_psbt::psbt_wallet_input::{
    parse_shared_chain_and_index, InputScriptType,
};
use crate::fixed_script_wallet::bitgo_psbt::{BitGoPsbt, SignPath};
use crate::fixed_script_wallet::wallet_scripts::{required_sign_path, Chain, OutputScriptType};
use crate::{Error, Network, Result};

// DER encoding variance, sighash byte included
const ECDSA_SIG_MIN: usize = 71;
const ECDSA_SIG_MAX: usize = 73;

// no sighash byte with SIGHASH_DEFAULT
const SCHNORR_SIG: usize = 64;

const OP_SIZE: usize = 1;
const OP_0_SIZE: usize = OP_SIZE;
const OP_PUSH_SIZE: usize = OP_SIZE;
const OP_CHECKSIG_SIZE: usize = OP_SIZE;
const OP_CHECKSIGVERIFY_SIZE: usize = OP_SIZE;

const SCHNORR_PUBKEY_SIZE: usize = 32;
/// 2-of-3 multisig script with compressed keys
const P2MS_PUB_SCRIPT_SIZE: usize = 105;
const P2WSH_PUB_SCRIPT_SIZE: usize = 34;
const P2PK_PUB_SCRIPT_SIZE: usize = 35;

/// version(4) + locktime(4) + input count(1) + output count(1)
const TX_OVERHEAD_SIZE: usize = 10;
/// Adds the segwit marker and flag; the witness count is part of each input.
const TX_SEGWIT_OVERHEAD_SIZE: usize = 11;

/// Which bound to read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SizeMode {
    Min,
    #[default]
    Max,
}

fn var_slice_size(length: usize) -> usize {
    VarInt::from(length).size() + length
}

fn vector_size(element_lengths: &[usize]) -> usize {
    VarInt::from(element_lengths.len()).size()
        + element_lengths
            .iter()
            .map(|&len| var_slice_size(len))
            .sum::<usize>()
}

/// BIP-141 weight of an input from its scriptSig and witness item lengths.
fn compute_input_weight(script_components: &[usize], witness_components: &[usize]) -> usize {
    let script_length: usize = script_components.iter().sum();
    // prevout(32) + index(4) + sequence(4) + scriptSig
    let base_size = 40 + var_slice_size(script_length);
    let witness_size = if witness_components.is_empty() {
        0
    } else {
        vector_size(witness_components)
    };
    3 * base_size + base_size + witness_size
}

/// value(8) + script
fn compute_output_weight(script_length: usize) -> usize {
    4 * (8 + var_slice_size(script_length))
}

struct InputWeights {
    min: usize,
    max: usize,
    is_segwit: bool,
}

impl InputWeights {
    fn ecdsa(components: impl Fn(usize) -> (Vec<usize>, Vec<usize>)) -> Self {
        let (script_min, witness_min) = components(ECDSA_SIG_MIN);
        let (script_max, witness_max) = components(ECDSA_SIG_MAX);
        InputWeights {
            min: compute_input_weight(&script_min, &witness_min),
            max: compute_input_weight(&script_max, &witness_max),
            is_segwit: !witness_max.is_empty(),
        }
    }

    fn schnorr((script, witness): (Vec<usize>, Vec<usize>)) -> Self {
        let weight = compute_input_weight(&script, &witness);
        InputWeights {
            min: weight,
            max: weight,
            is_segwit: true,
        }
    }
}

fn p2sh_components(sig_size: usize) -> (Vec<usize>, Vec<usize>) {
    (
        vec![
            OP_0_SIZE,
            OP_PUSH_SIZE + sig_size,
            OP_PUSH_SIZE + sig_size,
            // OP_PUSHDATA1 <len> <redeemScript>
            OP_PUSH_SIZE + 1 + P2MS_PUB_SCRIPT_SIZE,
        ],
        vec![],
    )
}

fn p2sh_p2wsh_components(sig_size: usize) -> (Vec<usize>, Vec<usize>) {
    (
        vec![OP_SIZE + P2WSH_PUB_SCRIPT_SIZE],
        vec![0, sig_size, sig_size, P2MS_PUB_SCRIPT_SIZE],
    )
}

fn p2wsh_components(sig_size: usize) -> (Vec<usize>, Vec<usize>) {
    (vec![], vec![0, sig_size, sig_size, P2MS_PUB_SCRIPT_SIZE])
}

fn p2sh_p2pk_components(sig_size: usize) -> (Vec<usize>, Vec<usize>) {
    (
        vec![OP_PUSH_SIZE + sig_size, OP_PUSH_SIZE + P2PK_PUB_SCRIPT_SIZE],
        vec![],
    )
}

/// 2-of-2 leaf at `depth` in the tap tree.
fn p2tr_script_path_components(depth: usize) -> (Vec<usize>, Vec<usize>) {
    let leaf_script = OP_PUSH_SIZE
        + SCHNORR_PUBKEY_SIZE
        + OP_CHECKSIGVERIFY_SIZE
        + OP_PUSH_SIZE
        + SCHNORR_PUBKEY_SIZE
        + OP_CHECKSIG_SIZE;
    // header + internal key + merkle path
    let control_block = 1 + 32 + 32 * depth;
    (
        vec![],
        vec![SCHNORR_SIG, SCHNORR_SIG, leaf_script, control_block],
    )
}

fn p2tr_key_path_components() -> (Vec<usize>, Vec<usize>) {
    (vec![], vec![SCHNORR_SIG])
}

fn input_weights_for_type(script_type: InputScriptType) -> InputWeights {
    match script_type {
        InputScriptType::P2sh => InputWeights::ecdsa(p2sh_components),
        InputScriptType::P2shP2wsh => InputWeights::ecdsa(p2sh_p2wsh_components),
        InputScriptType::P2wsh => InputWeights::ecdsa(p2wsh_components),
        InputScriptType::P2shP2pk => InputWeights::ecdsa(p2sh_p2pk_components),
        // the user/bitgo leaf at depth 1
        InputScriptType::P2trLegacy | InputScriptType::P2trMusig2ScriptPath => {
            InputWeights::schnorr(p2tr_script_path_components(1))
        }
        InputScriptType::P2trMusig2KeyPath => InputWeights::schnorr(p2tr_key_path_components()),
    }
}

fn input_weights_for_chain(chain: u32, sign_path: Option<SignPath>) -> Result<InputWeights> {
    let chain = Chain::try_from(chain)?;
    let sign_path = sign_path.unwrap_or_else(|| required_sign_path(chain.script_type));
    Ok(match chain.script_type {
        OutputScriptType::P2sh => input_weights_for_type(InputScriptType::P2sh),
        OutputScriptType::P2shP2wsh => input_weights_for_type(InputScriptType::P2shP2wsh),
        OutputScriptType::P2wsh => input_weights_for_type(InputScriptType::P2wsh),
        OutputScriptType::P2trLegacy => {
            // only the user/bitgo leaf sits at depth 1
            let depth = if sign_path.includes_backup() { 2 } else { 1 };
            InputWeights::schnorr(p2tr_script_path_components(depth))
        }
        OutputScriptType::P2trMusig2 if sign_path.includes_backup() => {
            InputWeights::schnorr(p2tr_script_path_components(1))
        }
        OutputScriptType::P2trMusig2 => InputWeights::schnorr(p2tr_key_path_components()),
    })
}

fn output_script_length(script_type: OutputScriptType) -> usize {
    match script_type {
        OutputScriptType::P2sh | OutputScriptType::P2shP2wsh => 23,
        OutputScriptType::P2wsh | OutputScriptType::P2trLegacy | OutputScriptType::P2trMusig2 => 34,
    }
}

/// Weight bounds of a set of inputs and outputs.
///
/// Transaction overhead is not stored; it is added when a total is read, so dimensions can
/// be summed freely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dimensions {
    input_weight_min: usize,
    input_weight_max: usize,
    output_weight: usize,
    has_segwit: bool,
}

impl Dimensions {
    pub fn empty() -> Self {
        Self::default()
    }

    fn from_input_weights(weights: InputWeights) -> Self {
        Dimensions {
            input_weight_min: weights.min,
            input_weight_max: weights.max,
            output_weight: 0,
            has_segwit: weights.is_segwit,
        }
    }

    pub fn from_input_script_type(script_type: InputScriptType) -> Self {
        Self::from_input_weights(input_weights_for_type(script_type))
    }

    /// A wallet input on `chain` spent by `sign_path` (the chain's default when `None`).
    pub fn from_input_chain(chain: u32, sign_path: Option<SignPath>) -> Result<Self> {
        Ok(Self::from_input_weights(input_weights_for_chain(
            chain, sign_path,
        )?))
    }

    pub fn from_output_script_length(length: usize) -> Self {
        Dimensions {
            output_weight: compute_output_weight(length),
            ..Self::default()
        }
    }

    pub fn from_output_script(script: &Script) -> Self {
        Self::from_output_script_length(script.len())
    }

    pub fn from_output_script_type(script_type: OutputScriptType) -> Self {
        Self::from_output_script_length(output_script_length(script_type))
    }

    pub fn from_output_address(address: &str, network: Network) -> Result<Self> {
        let script = crate::address::to_output_script_with_network(address, network)?;
        Ok(Self::from_output_script(&script))
    }

    /// Bounds for the container once fully signed.
    ///
    /// Input types come from the derivation data stored on each input, so no wallet keys are
    /// needed. Inputs without derivation data count as replay protection inputs.
    pub fn from_psbt(psbt: &BitGoPsbt) -> Result<Self> {
        let inner = psbt.psbt();
        let inputs = inner
            .inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                let Ok(script_id) = parse_shared_chain_and_index(input) else {
                    return Ok(Self::from_input_script_type(InputScriptType::P2shP2pk));
                };
                let script_type = InputScriptType::from_script_id(script_id, input)
                    .map_err(|message| Error::WalletValidationFailure { index, message })?;
                // script path inputs carry the one leaf they spend
                let depth = input
                    .tap_scripts
                    .keys()
                    .next()
                    .map(|control_block| control_block.merkle_branch.len());
                Ok(match (script_type.is_taproot(), depth) {
                    (true, Some(depth)) => Self::from_input_weights(InputWeights::schnorr(
                        p2tr_script_path_components(depth),
                    )),
                    _ => Self::from_input_script_type(script_type),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let outputs = inner
            .unsigned_tx
            .output
            .iter()
            .map(|output| Self::from_output_script(&output.script_pubkey));
        Ok(inputs
            .into_iter()
            .chain(outputs)
            .fold(Self::empty(), |acc, d| acc.plus(&d)))
    }

    pub fn plus(&self, other: &Dimensions) -> Self {
        Dimensions {
            input_weight_min: self.input_weight_min + other.input_weight_min,
            input_weight_max: self.input_weight_max + other.input_weight_max,
            output_weight: self.output_weight + other.output_weight,
            has_segwit: self.has_segwit || other.has_segwit,
        }
    }

    pub fn times(&self, n: usize) -> Self {
        Dimensions {
            input_weight_min: self.input_weight_min * n,
            input_weight_max: self.input_weight_max * n,
            output_weight: self.output_weight * n,
            has_segwit: self.has_segwit,
        }
    }

    pub fn has_segwit(&self) -> bool {
        self.has_segwit
    }

    fn overhead_weight(&self) -> usize {
        if self.input_weight_max == 0 && self.output_weight == 0 {
            return 0;
        }
        let size = if self.has_segwit {
            TX_SEGWIT_OVERHEAD_SIZE
        } else {
            TX_OVERHEAD_SIZE
        };
        4 * size
    }

    pub fn input_weight(&self, mode: SizeMode) -> usize {
        match mode {
            SizeMode::Min => self.input_weight_min,
            SizeMode::Max => self.input_weight_max,
        }
    }

    pub fn input_vsize(&self, mode: SizeMode) -> usize {
        self.input_weight(mode).div_ceil(4)
    }

    pub fn output_weight(&self) -> usize {
        self.output_weight
    }

    pub fn output_vsize(&self) -> usize {
        self.output_weight.div_ceil(4)
    }

    pub fn weight(&self, mode: SizeMode) -> usize {
        self.overhead_weight() + self.input_weight(mode) + self.output_weight
    }

    pub fn vsize(&self, mode: SizeMode) -> usize {
        self.weight(mode).div_ceil(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_script_wallet::bitgo_psbt::SignerKey;
    use rstest::rstest;

    #[test]
    fn test_empty_has_no_overhead() {
        assert_eq!(Dimensions::empty().weight(SizeMode::Max), 0);
        assert_eq!(Dimensions::empty().vsize(SizeMode::Min), 0);
    }

    #[rstest]
    #[case(InputScriptType::P2sh, 293, 299)]
    #[case(InputScriptType::P2shP2wsh, 139, 140)]
    #[case(InputScriptType::P2wsh, 104, 105)]
    #[case(InputScriptType::P2shP2pk, 149, 151)]
    #[case(InputScriptType::P2trLegacy, 108, 108)]
    #[case(InputScriptType::P2trMusig2KeyPath, 58, 58)]
    fn test_input_vsize(
        #[case] script_type: InputScriptType,
        #[case] min: usize,
        #[case] max: usize,
    ) {
        let d = Dimensions::from_input_script_type(script_type);
        assert_eq!(d.input_vsize(SizeMode::Min), min);
        assert_eq!(d.input_vsize(SizeMode::Max), max);
        assert_eq!(d.has_segwit(), script_type.is_segwit());
    }

    #[rstest]
    #[case(30, None, 116)]
    #[case(30, Some((SignerKey::User, SignerKey::Bitgo)), 108)]
    #[case(40, None, 58)]
    #[case(40, Some((SignerKey::User, SignerKey::Backup)), 108)]
    fn test_taproot_chain_vsize(
        #[case] chain: u32,
        #[case] sign_path: Option<(SignerKey, SignerKey)>,
        #[case] vsize: usize,
    ) {
        let sign_path = sign_path.map(|(signer, cosigner)| SignPath { signer, cosigner });
        let d = Dimensions::from_input_chain(chain, sign_path).unwrap();
        assert_eq!(d.input_vsize(SizeMode::Min), vsize);
        assert_eq!(d.input_vsize(SizeMode::Max), vsize);
    }

    #[test]
    fn test_unknown_chain() {
        assert!(matches!(
            Dimensions::from_input_chain(2, None),
            Err(Error::UnknownChainCode(2))
        ));
    }

    #[test]
    fn test_outputs_and_arithmetic() {
        let p2wsh = Dimensions::from_output_script_type(OutputScriptType::P2wsh);
        assert_eq!(p2wsh.output_weight(), 4 * 43);
        assert_eq!(p2wsh, Dimensions::from_output_script_length(34));

        let address = Dimensions::from_output_address(
            "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq",
            Network::Bitcoin,
        )
        .unwrap();
        assert_eq!(address.output_vsize(), 31);

        let input = Dimensions::from_input_script_type(InputScriptType::P2wsh);
        let tx = input.times(2).plus(&p2wsh);
        assert_eq!(
            tx.weight(SizeMode::Max),
            4 * TX_SEGWIT_OVERHEAD_SIZE + 2 * input.input_weight(SizeMode::Max) + 4 * 43
        );
        assert!(tx.vsize(SizeMode::Min) < tx.vsize(SizeMode::Max));
    }
}
