//! Building containers: empty transactions, wallet and replay protection inputs, outputs.

use crate::bitcoin::bip32::{DerivationPath, KeySource};
use crate::bitcoin::consensus::encode;
use crate::bitcoin::locktime::absolute::LockTime;
use crate::bitcoin::psbt::{Input, Output, Psbt, PsbtSighashType};
use crate::bitcoin::script::PushBytesBuf;
use crate::bitcoin::taproot::LeafVersion;
use crate::bitcoin::transaction::Version;
use crate::bitcoin::{
    Amount, CompressedPublicKey, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness,
};
use crate::fixed_script_wallet::wallet_scripts::{
    build_tap_tree_for_output, create_tap_bip32_derivation_for_output, required_sign_path,
    ScriptP2shP2pk, ScriptP2tr,
};
use crate::fixed_script_wallet::{to_pub_triple, Chain, PubTriple, RootWalletKeys, WalletScripts};
use crate::zcash::branch_id_for_height;
use crate::zcash::transaction::{ZcashTransaction, EMPTY_SAPLING_FIELDS, SAPLING_VERSION_GROUP_ID};
use crate::{Config, Error, Network, Result};

use super::p2tr_musig2_input::Musig2Participants;
use super::propkv::set_zec_consensus_branch_id;
use super::psbt_wallet_input::{ReplayProtectionOptions, ScriptId, SignPath, WalletInputOptions};
use super::{BitGoPsbt, BranchVersionedEnvelope, NetworkEnvelope};

/// `SIGHASH_ALL | SIGHASH_FORKID`
const SIGHASH_ALL_FORKID: u32 = 0x41;

/// Transaction header fields for [`BitGoPsbt::create_empty`].
///
/// Everything but `version` and `lock_time` only applies to branch-versioned networks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvelopeOptions {
    pub version: Option<i32>,
    pub lock_time: Option<u32>,
    pub consensus_branch_id: Option<u32>,
    /// Height the transaction is meant for; selects the consensus branch id
    pub block_height: Option<u32>,
    pub version_group_id: Option<u32>,
    pub expiry_height: Option<u32>,
}

impl EnvelopeOptions {
    fn has_branch_fields(&self) -> bool {
        self.consensus_branch_id.is_some()
            || self.block_height.is_some()
            || self.version_group_id.is_some()
            || self.expiry_height.is_some()
    }
}

fn resolve_consensus_branch_id(network: Network, options: &EnvelopeOptions) -> Result<u32> {
    let for_height = |height: u32| {
        branch_id_for_height(height, network).ok_or_else(|| {
            Error::InvalidBranchIdSpecification(format!(
                "height {} is before Overwinter activation on {}",
                height, network
            ))
        })
    };
    match (options.consensus_branch_id, options.block_height) {
        (Some(branch_id), None) => Ok(branch_id),
        (None, Some(height)) => for_height(height),
        (Some(branch_id), Some(height)) => {
            let expected = for_height(height)?;
            if expected != branch_id {
                return Err(Error::InvalidBranchIdSpecification(format!(
                    "branch id {:#010x} does not match {:#010x} active at height {}",
                    branch_id, expected, height
                )));
            }
            Ok(branch_id)
        }
        (None, None) => Err(Error::InvalidBranchIdSpecification(
            "either a consensus branch id or a block height is required".to_string(),
        )),
    }
}

/// Keys and full derivation paths of a wallet script.
fn derive_script_keys(
    wallet: &RootWalletKeys,
    script_id: ScriptId,
) -> Result<(PubTriple, [DerivationPath; 3])> {
    let xpubs = wallet.derive_for_chain_and_index(script_id.chain, script_id.index)?;
    let paths = wallet.derivation_paths(script_id.chain, script_id.index)?;
    Ok((to_pub_triple(&xpubs), paths))
}

fn key_source(wallet: &RootWalletKeys, paths: &[DerivationPath; 3], i: usize) -> KeySource {
    (wallet.xpubs[i].fingerprint(), paths[i].clone())
}

fn xonly(key: &CompressedPublicKey) -> crate::bitcoin::XOnlyPublicKey {
    key.0.x_only_public_key().0
}

impl BitGoPsbt {
    /// An empty container with the default [`Config`].
    pub fn create_empty(
        network: Network,
        wallet: &RootWalletKeys,
        options: EnvelopeOptions,
    ) -> Result<Self> {
        Self::create_empty_with_config(&Config::default(), network, wallet, options)
    }

    pub fn create_empty_with_config(
        config: &Config,
        network: Network,
        wallet: &RootWalletKeys,
        options: EnvelopeOptions,
    ) -> Result<Self> {
        let envelope = if network.is_branch_versioned() {
            let consensus_branch_id = resolve_consensus_branch_id(network, &options)?;
            NetworkEnvelope::BranchVersioned(BranchVersionedEnvelope {
                consensus_branch_id,
                version_group_id: options.version_group_id.unwrap_or(SAPLING_VERSION_GROUP_ID),
                expiry_height: options.expiry_height.unwrap_or(0),
                sapling_fields: EMPTY_SAPLING_FIELDS.to_vec(),
            })
        } else if options.has_branch_fields() {
            return Err(Error::InvalidInput(format!(
                "{} does not use consensus branch ids",
                network
            )));
        } else {
            NetworkEnvelope::Plain
        };

        let version = match envelope {
            NetworkEnvelope::BranchVersioned(_) => {
                let version = options.version.unwrap_or(4);
                if version < 3 {
                    return Err(Error::InvalidInput(format!(
                        "version {} is not an overwintered transaction version",
                        version
                    )));
                }
                version
            }
            NetworkEnvelope::Plain => options.version.unwrap_or(config.default_version),
        };

        let tx = Transaction {
            version: Version::non_standard(version),
            lock_time: LockTime::from_consensus(options.lock_time.unwrap_or(0)),
            input: vec![],
            output: vec![],
        };
        let mut psbt = Psbt::from_unsigned_tx(tx).map_err(|e| Error::InvalidInput(e.to_string()))?;
        for xpub in &wallet.xpubs {
            psbt.xpub
                .insert(*xpub, (xpub.fingerprint(), DerivationPath::master()));
        }
        if let NetworkEnvelope::BranchVersioned(env) = &envelope {
            set_zec_consensus_branch_id(&mut psbt, env.consensus_branch_id);
        }

        tracing::debug!(%network, version, "created empty psbt");
        Ok(BitGoPsbt {
            psbt,
            network,
            envelope,
            default_sequence: config.default_sequence,
        })
    }

    fn push_input(
        &mut self,
        previous_output: OutPoint,
        sequence: Option<u32>,
        input: Input,
    ) -> usize {
        self.psbt.unsigned_tx.input.push(TxIn {
            previous_output,
            script_sig: ScriptBuf::new(),
            sequence: Sequence(sequence.unwrap_or(self.default_sequence)),
            witness: Witness::new(),
        });
        self.psbt.inputs.push(input);
        self.psbt.inputs.len() - 1
    }

    fn push_output(&mut self, script_pubkey: ScriptBuf, value: u64, output: Output) -> usize {
        self.psbt.unsigned_tx.output.push(TxOut {
            value: Amount::from_sat(value),
            script_pubkey,
        });
        self.psbt.outputs.push(output);
        self.psbt.outputs.len() - 1
    }

    /// Decodes `prev_tx` and checks that it creates `utxo` at `outpoint`.
    ///
    /// Returns the transaction to store as `non_witness_utxo`. Branch-versioned networks
    /// commit to input amounts in their sighash, so nothing is stored there.
    fn check_prev_tx(
        &self,
        prev_tx: &[u8],
        outpoint: OutPoint,
        utxo: &TxOut,
    ) -> Result<Option<Transaction>> {
        let (tx, txid) = match self.envelope {
            NetworkEnvelope::Plain => {
                let tx: Transaction = encode::deserialize(prev_tx)
                    .map_err(|e| Error::DeserializationFailure(format!("prev_tx: {}", e)))?;
                let txid = tx.compute_txid();
                (tx, txid)
            }
            NetworkEnvelope::BranchVersioned(_) => {
                let ztx = ZcashTransaction::decode(prev_tx)
                    .map_err(|e| Error::DeserializationFailure(format!("prev_tx: {}", e)))?;
                let txid = ztx
                    .txid()
                    .map_err(|e| Error::DeserializationFailure(e.to_string()))?;
                (ztx.transaction, txid)
            }
        };
        if txid != outpoint.txid {
            return Err(Error::InvalidInput(format!(
                "prev_tx {} does not match outpoint {}",
                txid, outpoint
            )));
        }
        match tx.output.get(outpoint.vout as usize) {
            Some(output) if output == utxo => {}
            Some(_) => {
                return Err(Error::InvalidInput(format!(
                    "prev_tx output {} does not match the spent script and value",
                    outpoint.vout
                )))
            }
            None => {
                return Err(Error::IndexOutOfBounds {
                    index: outpoint.vout as usize,
                    len: tx.output.len(),
                })
            }
        }
        Ok(match self.envelope {
            NetworkEnvelope::Plain => Some(tx),
            NetworkEnvelope::BranchVersioned(_) => None,
        })
    }

    /// `SIGHASH_ALL | SIGHASH_FORKID` on fork-id networks, unset elsewhere.
    fn default_sighash_type(&self) -> Option<PsbtSighashType> {
        self.network
            .fork_id()
            .map(|_| PsbtSighashType::from_u32(SIGHASH_ALL_FORKID))
    }

    /// Adds an input spending the wallet script at `script_id`. Returns its index.
    pub fn add_wallet_input(
        &mut self,
        outpoint: OutPoint,
        value: u64,
        wallet: &RootWalletKeys,
        script_id: ScriptId,
        options: WalletInputOptions,
    ) -> Result<usize> {
        let chain = Chain::try_from(script_id.chain)?;
        let scripts = WalletScripts::from_wallet_keys(
            wallet,
            chain,
            script_id.index,
            &self.network.output_script_support(),
        )?;
        let (keys, paths) = derive_script_keys(wallet, script_id)?;
        let utxo = TxOut {
            value: Amount::from_sat(value),
            script_pubkey: scripts.output_script(),
        };
        let prev_tx = options
            .prev_tx
            .map(|bytes| self.check_prev_tx(bytes, outpoint, &utxo))
            .transpose()?
            .flatten();

        let mut input = Input::default();
        match &scripts {
            WalletScripts::P2sh(s) => {
                if prev_tx.is_none()
                    && self.network.fork_id().is_none()
                    && !self.network.is_branch_versioned()
                {
                    return Err(Error::InvalidInput(format!(
                        "p2sh inputs on {} require the previous transaction",
                        self.network
                    )));
                }
                input.redeem_script = Some(s.redeem_script.clone());
            }
            WalletScripts::P2shP2wsh(s) => {
                input.redeem_script = Some(s.redeem_script.clone());
                input.witness_script = Some(s.witness_script.clone());
            }
            WalletScripts::P2wsh(s) => {
                input.witness_script = Some(s.witness_script.clone());
            }
            WalletScripts::P2trLegacy(p2tr) | WalletScripts::P2trMusig2(p2tr) => {
                let sign_path = options
                    .sign_path
                    .unwrap_or_else(|| required_sign_path(chain.script_type));
                let musig2 = matches!(scripts, WalletScripts::P2trMusig2(_));
                add_taproot_spend(&mut input, wallet, p2tr, &keys, &paths, sign_path, musig2)?;
            }
        }

        if !chain.script_type.is_taproot() {
            for (i, key) in keys.iter().enumerate() {
                input
                    .bip32_derivation
                    .insert(key.0, key_source(wallet, &paths, i));
            }
        }

        // legacy p2sh with a full previous transaction doesn't need witness_utxo
        let is_p2sh = matches!(scripts, WalletScripts::P2sh(_));
        if !(is_p2sh && prev_tx.is_some()) {
            input.witness_utxo = Some(utxo);
        }
        input.non_witness_utxo = prev_tx;
        input.sighash_type = self.default_sighash_type();

        let index = self.push_input(outpoint, options.sequence, input);
        tracing::debug!(
            index,
            chain = script_id.chain,
            script_index = script_id.index,
            value,
            "added wallet input"
        );
        Ok(index)
    }

    /// Adds a p2shP2pk input locked to `pubkey`. Returns its index.
    pub fn add_replay_protection_input(
        &mut self,
        outpoint: OutPoint,
        value: u64,
        pubkey: CompressedPublicKey,
        options: ReplayProtectionOptions,
    ) -> Result<usize> {
        let script = ScriptP2shP2pk::new(pubkey);
        let utxo = TxOut {
            value: Amount::from_sat(value),
            script_pubkey: script.output_script(),
        };
        let prev_tx = options
            .prev_tx
            .map(|bytes| self.check_prev_tx(bytes, outpoint, &utxo))
            .transpose()?
            .flatten();

        let mut input = Input {
            redeem_script: Some(script.redeem_script),
            witness_utxo: Some(utxo),
            non_witness_utxo: prev_tx,
            ..Default::default()
        };
        input.sighash_type = options.sighash_type.or_else(|| self.default_sighash_type());

        let index = self.push_input(outpoint, options.sequence, input);
        tracing::debug!(index, value, "added replay protection input");
        Ok(index)
    }

    /// Adds an output paying to the wallet script at `script_id`, with the metadata that
    /// lets the wallet recognize it as its own. Returns its index.
    pub fn add_wallet_output(
        &mut self,
        wallet: &RootWalletKeys,
        script_id: ScriptId,
        value: u64,
    ) -> Result<usize> {
        let chain = Chain::try_from(script_id.chain)?;
        let scripts = WalletScripts::from_wallet_keys(
            wallet,
            chain,
            script_id.index,
            &self.network.output_script_support(),
        )?;
        let (keys, paths) = derive_script_keys(wallet, script_id)?;

        let mut output = Output::default();
        match &scripts {
            WalletScripts::P2sh(s) => output.redeem_script = Some(s.redeem_script.clone()),
            WalletScripts::P2shP2wsh(s) => {
                output.redeem_script = Some(s.redeem_script.clone());
                output.witness_script = Some(s.witness_script.clone());
            }
            WalletScripts::P2wsh(s) => output.witness_script = Some(s.witness_script.clone()),
            WalletScripts::P2trLegacy(p2tr) | WalletScripts::P2trMusig2(p2tr) => {
                let musig2 = matches!(scripts, WalletScripts::P2trMusig2(_));
                output.tap_internal_key = Some(p2tr.spend_info.internal_key());
                output.tap_tree = Some(build_tap_tree_for_output(&keys, musig2)?);
                output.tap_key_origins = create_tap_bip32_derivation_for_output(
                    wallet,
                    script_id.chain,
                    script_id.index,
                    &keys,
                    musig2,
                )?;
            }
        }
        if !chain.script_type.is_taproot() {
            for (i, key) in keys.iter().enumerate() {
                output
                    .bip32_derivation
                    .insert(key.0, key_source(wallet, &paths, i));
            }
        }

        let index = self.push_output(scripts.output_script(), value, output);
        tracing::debug!(
            index,
            chain = script_id.chain,
            script_index = script_id.index,
            value,
            "added wallet output"
        );
        Ok(index)
    }

    pub fn add_output(&mut self, script: ScriptBuf, value: u64) -> usize {
        self.push_output(script, value, Output::default())
    }

    pub fn add_output_with_address(&mut self, address: &str, value: u64) -> Result<usize> {
        let script = crate::address::to_output_script_with_network(address, self.network)?;
        Ok(self.add_output(script, value))
    }

    pub fn add_op_return_output(&mut self, data: &[u8], value: u64) -> Result<usize> {
        let push = PushBytesBuf::try_from(data.to_vec())
            .map_err(|e| Error::InvalidInput(format!("OP_RETURN data: {}", e)))?;
        Ok(self.add_output(ScriptBuf::new_op_return(push), value))
    }
}

/// Taproot metadata for the spend path chosen by `sign_path`.
///
/// p2trMusig2 with `{user, bitgo}` spends by key path; everything else spends through the
/// leaf of the two signers.
fn add_taproot_spend(
    input: &mut Input,
    wallet: &RootWalletKeys,
    p2tr: &ScriptP2tr,
    keys: &PubTriple,
    paths: &[DerivationPath; 3],
    sign_path: SignPath,
    musig2: bool,
) -> Result<()> {
    if sign_path.signer == sign_path.cosigner {
        return Err(Error::InvalidInput(format!(
            "sign path needs two distinct keys, got {} twice",
            sign_path.signer
        )));
    }
    input.tap_internal_key = Some(p2tr.spend_info.internal_key());
    input.tap_merkle_root = p2tr.spend_info.merkle_root();

    if musig2 && !sign_path.includes_backup() {
        for i in sign_path.indices() {
            input
                .tap_key_origins
                .insert(xonly(&keys[i]), (vec![], key_source(wallet, paths, i)));
        }
        Musig2Participants {
            tap_output_key: p2tr.spend_info.output_key().to_x_only_public_key(),
            tap_internal_key: p2tr.spend_info.internal_key(),
            participant_pub_keys: [keys[0], keys[2]],
        }
        .to_key_value()
        .insert_into(&mut input.proprietary);
        return Ok(());
    }

    let [a, b] = sign_path.indices();
    let leaf = p2tr.leaf_for_signers(a, b).ok_or_else(|| {
        Error::UnsupportedScriptType(format!(
            "no tap leaf for {} and {}",
            sign_path.signer, sign_path.cosigner
        ))
    })?;
    let control_block = p2tr
        .control_block(leaf)
        .ok_or_else(|| Error::Signing("missing control block for tap leaf".to_string()))?;
    input
        .tap_scripts
        .insert(control_block, (leaf.script.clone(), LeafVersion::TapScript));
    for i in leaf.signers {
        input.tap_key_origins.insert(
            xonly(&keys[i]),
            (vec![leaf.leaf_hash()], key_source(wallet, paths, i)),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_script_wallet::test_utils::{get_test_wallet_keys, test_outpoint};
    use crate::fixed_script_wallet::bitgo_psbt::SignerKey;
    use crate::zcash::NetworkUpgrade;
    use rstest::rstest;

    fn zcash_options() -> EnvelopeOptions {
        EnvelopeOptions {
            block_height: Some(2_726_400),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_empty_defaults() {
        let wallet = get_test_wallet_keys("construct");
        let psbt =
            BitGoPsbt::create_empty(Network::Bitcoin, &wallet, EnvelopeOptions::default()).unwrap();
        assert_eq!(psbt.version(), 2);
        assert_eq!(psbt.lock_time(), 0);
        assert_eq!(psbt.envelope(), &NetworkEnvelope::Plain);
        assert_eq!(psbt.psbt().xpub.len(), 3);
    }

    #[test]
    fn test_create_empty_rejects_branch_fields_on_plain_network() {
        let wallet = get_test_wallet_keys("construct");
        let options = EnvelopeOptions {
            consensus_branch_id: Some(NetworkUpgrade::Nu5.branch_id()),
            ..Default::default()
        };
        assert!(matches!(
            BitGoPsbt::create_empty(Network::Litecoin, &wallet, options),
            Err(Error::InvalidInput(_))
        ));
    }

    #[rstest]
    #[case(Some(NetworkUpgrade::Nu5.branch_id()), None, true)]
    #[case(None, Some(2_726_400), true)]
    #[case(Some(NetworkUpgrade::Nu6.branch_id()), Some(2_726_400), true)]
    #[case(Some(NetworkUpgrade::Nu5.branch_id()), Some(2_726_400), false)]
    #[case(None, Some(1), false)]
    #[case(None, None, false)]
    fn test_zcash_branch_id_resolution(
        #[case] branch_id: Option<u32>,
        #[case] height: Option<u32>,
        #[case] ok: bool,
    ) {
        let wallet = get_test_wallet_keys("construct");
        let options = EnvelopeOptions {
            consensus_branch_id: branch_id,
            block_height: height,
            ..Default::default()
        };
        let result = BitGoPsbt::create_empty(Network::Zcash, &wallet, options);
        if ok {
            let psbt = result.unwrap();
            assert_eq!(psbt.version(), 4);
            assert!(matches!(psbt.envelope(), NetworkEnvelope::BranchVersioned(_)));
        } else {
            assert!(matches!(
                result,
                Err(Error::InvalidBranchIdSpecification(_))
            ));
        }
    }

    #[test]
    fn test_zcash_branch_id_from_height() {
        let wallet = get_test_wallet_keys("construct");
        let psbt = BitGoPsbt::create_empty(Network::Zcash, &wallet, zcash_options()).unwrap();
        match psbt.envelope() {
            NetworkEnvelope::BranchVersioned(env) => {
                assert_eq!(env.consensus_branch_id, NetworkUpgrade::Nu6.branch_id());
                assert_eq!(env.version_group_id, SAPLING_VERSION_GROUP_ID);
            }
            NetworkEnvelope::Plain => panic!("expected branch-versioned envelope"),
        }
    }

    #[test]
    fn test_p2sh_requires_prev_tx_without_fork_id() {
        let wallet = get_test_wallet_keys("construct");
        let id = ScriptId { chain: 0, index: 0 };
        let mut btc =
            BitGoPsbt::create_empty(Network::Bitcoin, &wallet, EnvelopeOptions::default()).unwrap();
        assert!(btc
            .add_wallet_input(test_outpoint(0), 1000, &wallet, id, Default::default())
            .is_err());

        let mut bch =
            BitGoPsbt::create_empty(Network::BitcoinCash, &wallet, EnvelopeOptions::default())
                .unwrap();
        let index = bch
            .add_wallet_input(test_outpoint(0), 1000, &wallet, id, Default::default())
            .unwrap();
        assert!(bch.psbt().inputs[index].witness_utxo.is_some());
        assert_eq!(
            bch.psbt().inputs[index].sighash_type,
            Some(PsbtSighashType::from_u32(SIGHASH_ALL_FORKID))
        );
        assert_eq!(btc.psbt().inputs.len(), 0);
    }

    #[test]
    fn test_p2sh_with_prev_tx() {
        let wallet = get_test_wallet_keys("construct");
        let id = ScriptId { chain: 1, index: 3 };
        let scripts = WalletScripts::from_wallet_keys(
            &wallet,
            Chain::try_from(1).unwrap(),
            3,
            &Network::Bitcoin.output_script_support(),
        )
        .unwrap();
        let prev_tx = Transaction {
            version: Version::ONE,
            lock_time: LockTime::ZERO,
            input: vec![],
            output: vec![TxOut {
                value: Amount::from_sat(1234),
                script_pubkey: scripts.output_script(),
            }],
        };
        let outpoint = OutPoint {
            txid: prev_tx.compute_txid(),
            vout: 0,
        };
        let bytes = encode::serialize(&prev_tx);

        let mut psbt =
            BitGoPsbt::create_empty(Network::Bitcoin, &wallet, EnvelopeOptions::default()).unwrap();
        let options = WalletInputOptions {
            prev_tx: Some(&bytes),
            ..Default::default()
        };
        let index = psbt
            .add_wallet_input(outpoint, 1234, &wallet, id, options.clone())
            .unwrap();
        let input = &psbt.psbt().inputs[index];
        assert!(input.witness_utxo.is_none());
        assert_eq!(input.non_witness_utxo.as_ref(), Some(&prev_tx));
        assert_eq!(input.bip32_derivation.len(), 3);

        // wrong value
        assert!(psbt
            .add_wallet_input(outpoint, 1000, &wallet, id, options)
            .is_err());
    }

    #[test]
    fn test_segwit_not_supported_on_network() {
        let wallet = get_test_wallet_keys("construct");
        let mut psbt =
            BitGoPsbt::create_empty(Network::Dogecoin, &wallet, EnvelopeOptions::default())
                .unwrap();
        let result = psbt.add_wallet_input(
            test_outpoint(0),
            1000,
            &wallet,
            ScriptId { chain: 20, index: 0 },
            Default::default(),
        );
        assert!(matches!(result, Err(Error::UnsupportedScriptType(_))));
        assert!(matches!(
            psbt.add_wallet_output(&wallet, ScriptId { chain: 7, index: 0 }, 1000),
            Err(Error::UnknownChainCode(7))
        ));
    }

    #[rstest]
    #[case(30, None, Some(2))]
    #[case(30, Some((SignerKey::User, SignerKey::Bitgo)), Some(1))]
    #[case(40, None, None)]
    #[case(40, Some((SignerKey::Backup, SignerKey::Bitgo)), Some(1))]
    fn test_taproot_spend_paths(
        #[case] chain: u32,
        #[case] sign_path: Option<(SignerKey, SignerKey)>,
        #[case] leaf_depth: Option<usize>,
    ) {
        let wallet = get_test_wallet_keys("construct");
        let mut psbt =
            BitGoPsbt::create_empty(Network::Bitcoin, &wallet, EnvelopeOptions::default()).unwrap();
        let options = WalletInputOptions {
            sign_path: sign_path.map(|(signer, cosigner)| SignPath { signer, cosigner }),
            ..Default::default()
        };
        let index = psbt
            .add_wallet_input(
                test_outpoint(1),
                5000,
                &wallet,
                ScriptId { chain, index: 9 },
                options,
            )
            .unwrap();
        let input = &psbt.psbt().inputs[index];
        assert_eq!(input.tap_key_origins.len(), 2);
        assert!(input.tap_internal_key.is_some());
        assert!(input.tap_merkle_root.is_some());
        assert!(input.bip32_derivation.is_empty());
        match leaf_depth {
            Some(depth) => {
                assert_eq!(input.tap_scripts.len(), 1);
                assert!(input.proprietary.is_empty());
                let (control_block, (script, _)) = input.tap_scripts.iter().next().unwrap();
                assert_eq!(control_block.merkle_branch.len(), depth);
                assert_eq!(script.len(), 68);
            }
            None => {
                assert!(input.tap_scripts.is_empty());
                assert_eq!(input.proprietary.len(), 1);
                for (leaf_hashes, _) in input.tap_key_origins.values() {
                    assert!(leaf_hashes.is_empty());
                }
            }
        }
    }

    #[test]
    fn test_add_outputs() {
        let wallet = get_test_wallet_keys("construct");
        let mut psbt =
            BitGoPsbt::create_empty(Network::Bitcoin, &wallet, EnvelopeOptions::default()).unwrap();
        let i = psbt
            .add_wallet_output(&wallet, ScriptId { chain: 41, index: 2 }, 900)
            .unwrap();
        let output = &psbt.psbt().outputs[i];
        assert!(output.tap_tree.is_some());
        assert_eq!(output.tap_key_origins.len(), 3);

        let i = psbt
            .add_output_with_address("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq", 100)
            .unwrap();
        assert_eq!(i, 1);
        let i = psbt.add_op_return_output(b"hello", 0).unwrap();
        assert!(psbt.psbt().unsigned_tx.output[i].script_pubkey.is_op_return());
        assert!(psbt.add_output_with_address("not-an-address", 1).is_err());
        assert_eq!(psbt.output_count(), 3);
    }
}
