use std::collections::BTreeMap;

use crate::bitcoin::bip32::{DerivationPath, Fingerprint};
use crate::bitcoin::blockdata::opcodes::all::{OP_CHECKSIG, OP_CHECKSIGVERIFY};
use crate::bitcoin::blockdata::script::Builder;
use crate::bitcoin::secp256k1::Secp256k1;
use crate::bitcoin::taproot::{
    ControlBlock, LeafVersion, TapLeafHash, TapTree, TaprootBuilder, TaprootSpendInfo,
};
use crate::bitcoin::{CompressedPublicKey, ScriptBuf, XOnlyPublicKey};
use crate::fixed_script_wallet::wallet_keys::{PubTriple, RootWalletKeys};

use super::bitgo_musig::{key_agg_bitgo_p2tr_legacy, key_agg_p2tr_musig2};
use super::WalletScriptsError;

pub type TapKeyOrigins =
    BTreeMap<XOnlyPublicKey, (Vec<TapLeafHash>, (Fingerprint, DerivationPath))>;

pub(crate) fn to_xonly(key: &CompressedPublicKey) -> XOnlyPublicKey {
    key.0.x_only_public_key().0
}

/// n-of-n chain: `<x1> OP_CHECKSIGVERIFY ... <xn> OP_CHECKSIG`.
pub fn build_p2tr_ns_script(keys: &[CompressedPublicKey]) -> ScriptBuf {
    let last = keys.len().saturating_sub(1);
    keys.iter()
        .enumerate()
        .fold(Builder::new(), |b, (i, key)| {
            let b = b.push_slice(to_xonly(key).serialize());
            if i == last {
                b.push_opcode(OP_CHECKSIG)
            } else {
                b.push_opcode(OP_CHECKSIGVERIFY)
            }
        })
        .into_script()
}

/// Index pairs into the wallet triple, with the leaf depth.
fn leaf_layout(musig2: bool) -> &'static [(u8, [usize; 2])] {
    if musig2 {
        &[(1, [0, 1]), (1, [1, 2])]
    } else {
        &[(1, [0, 2]), (2, [0, 1]), (2, [1, 2])]
    }
}

/// A 2-of-2 tap leaf of a wallet taproot output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletTapLeaf {
    /// Positions of the two signers in the wallet triple.
    pub signers: [usize; 2],
    pub depth: u8,
    pub script: ScriptBuf,
}

impl WalletTapLeaf {
    pub fn leaf_hash(&self) -> TapLeafHash {
        TapLeafHash::from_script(&self.script, LeafVersion::TapScript)
    }
}

fn wallet_tap_leaves(keys: &PubTriple, musig2: bool) -> Vec<WalletTapLeaf> {
    leaf_layout(musig2)
        .iter()
        .map(|&(depth, [a, b])| WalletTapLeaf {
            signers: [a, b],
            depth,
            script: build_p2tr_ns_script(&[keys[a], keys[b]]),
        })
        .collect()
}

fn taproot_builder(leaves: &[WalletTapLeaf]) -> Result<TaprootBuilder, WalletScriptsError> {
    leaves.iter().try_fold(TaprootBuilder::new(), |b, leaf| {
        b.add_leaf(leaf.depth, leaf.script.clone())
            .map_err(|e| WalletScriptsError::Taproot(e.to_string()))
    })
}

pub fn build_tap_tree_for_output(
    keys: &PubTriple,
    musig2: bool,
) -> Result<TapTree, WalletScriptsError> {
    TapTree::try_from(taproot_builder(&wallet_tap_leaves(keys, musig2))?)
        .map_err(|e| WalletScriptsError::Taproot(e.to_string()))
}

/// Tap key origins for a wallet output: every key, with the hashes of the leaves it is in.
pub fn create_tap_bip32_derivation_for_output(
    wallet_keys: &RootWalletKeys,
    chain: u32,
    index: u32,
    keys: &PubTriple,
    musig2: bool,
) -> Result<TapKeyOrigins, WalletScriptsError> {
    let leaves = wallet_tap_leaves(keys, musig2);
    let paths = wallet_keys.derivation_paths(chain, index)?;
    Ok(keys
        .iter()
        .enumerate()
        .map(|(i, key)| {
            let hashes = leaves
                .iter()
                .filter(|leaf| leaf.signers.contains(&i))
                .map(WalletTapLeaf::leaf_hash)
                .collect();
            let origin = (wallet_keys.xpubs[i].fingerprint(), paths[i].clone());
            (to_xonly(key), (hashes, origin))
        })
        .collect())
}

#[derive(Debug, Clone)]
pub struct ScriptP2tr {
    pub spend_info: TaprootSpendInfo,
    pub leaves: Vec<WalletTapLeaf>,
}

impl ScriptP2tr {
    pub fn new(keys: &PubTriple, musig2: bool) -> Result<ScriptP2tr, WalletScriptsError> {
        let [user, _, bitgo] = *keys;
        let internal_key = if musig2 {
            key_agg_p2tr_musig2(&[user, bitgo])?
        } else {
            key_agg_bitgo_p2tr_legacy(&[user, bitgo])?
        };
        let leaves = wallet_tap_leaves(keys, musig2);
        let spend_info = taproot_builder(&leaves)?
            .finalize(&Secp256k1::verification_only(), internal_key)
            .map_err(|_| WalletScriptsError::Taproot("incomplete tap tree".to_string()))?;
        Ok(ScriptP2tr { spend_info, leaves })
    }

    pub fn output_script(&self) -> ScriptBuf {
        Builder::new()
            .push_int(1)
            .push_slice(self.spend_info.output_key().to_x_only_public_key().serialize())
            .into_script()
    }

    /// The leaf spendable by exactly these two signers, in either order.
    pub fn leaf_for_signers(&self, a: usize, b: usize) -> Option<&WalletTapLeaf> {
        self.leaves
            .iter()
            .find(|leaf| leaf.signers == [a, b] || leaf.signers == [b, a])
    }

    pub fn control_block(&self, leaf: &WalletTapLeaf) -> Option<ControlBlock> {
        self.spend_info
            .control_block(&(leaf.script.clone(), LeafVersion::TapScript))
    }
}
