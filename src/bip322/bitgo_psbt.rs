//! BIP-0322 proofs built as BitGo PSBTs.
//!
//! Every input of a proof spends its own `to_spend` transaction, so one PSBT can prove control
//! of several wallet scripts at once. The message is kept on the input in a BitGo proprietary
//! key-value so that cosigners can check what they sign.

use crate::bitcoin::consensus::encode;
use crate::bitcoin::psbt::{Psbt, PsbtSighashType};
use crate::bitcoin::script::Instruction;
use crate::bitcoin::sighash::SighashCache;
use crate::bitcoin::taproot::ControlBlock;
use crate::bitcoin::{
    ecdsa, Amount, OutPoint, ScriptBuf, Transaction, TxIn, TxOut, Witness, XOnlyPublicKey,
};
use crate::fixed_script_wallet::bitgo_psbt::propkv::find_kv;
use crate::fixed_script_wallet::bitgo_psbt::psbt_wallet_input::EcdsaSighashScheme;
use crate::fixed_script_wallet::bitgo_psbt::{
    BitGoKeyValue, BitGoPsbt, NetworkEnvelope, ProprietaryKeySubtype, ScriptId, SignPath,
    SignerKey, WalletInputOptions,
};
use crate::fixed_script_wallet::{
    Chain, OutputScriptType, PubTriple, RootWalletKeys, ScriptP2tr, WalletScripts,
};
use crate::{Context, Error, Network, Result};

use super::{op_return_script, to_spend_txid};

fn wallet_output_script(
    wallet: &RootWalletKeys,
    script_id: ScriptId,
    network: Network,
) -> Result<ScriptBuf> {
    let scripts = WalletScripts::from_wallet_keys(
        wallet,
        Chain::try_from(script_id.chain)?,
        script_id.index,
        &network.output_script_support(),
    )?;
    Ok(scripts.output_script())
}

/// Version 0, lock time 0 and a single OP_RETURN output.
fn check_proof_tx(tx: &Transaction, input_index: usize) -> Result<()> {
    if tx.version.0 != 0 {
        return Err(Error::InvalidInput(format!(
            "BIP-0322 proof must have version 0, got {}",
            tx.version.0
        )));
    }
    if tx.lock_time.to_consensus_u32() != 0 {
        return Err(Error::InvalidInput(
            "BIP-0322 proof must have lock time 0".to_string(),
        ));
    }
    match tx.output.as_slice() {
        [output] if output.script_pubkey == op_return_script() => {}
        _ => {
            return Err(Error::InvalidInput(
                "BIP-0322 proof must have a single OP_RETURN output".to_string(),
            ))
        }
    }
    if input_index >= tx.input.len() {
        return Err(Error::IndexOutOfBounds {
            index: input_index,
            len: tx.input.len(),
        });
    }
    Ok(())
}

/// The input must spend output 0 of the `to_spend` transaction for this message and script.
fn check_to_spend(
    tx: &Transaction,
    input_index: usize,
    message: &str,
    script_pubkey: ScriptBuf,
    tag: Option<&str>,
) -> Result<()> {
    let expected = OutPoint {
        txid: to_spend_txid(message, script_pubkey, tag),
        vout: 0,
    };
    let actual = tx.input[input_index].previous_output;
    if actual != expected {
        tracing::debug!(input_index, %expected, %actual, "bip322 to_spend mismatch");
        return Err(Error::Bip322TagMismatch("wrong to_spend txid".to_string()));
    }
    Ok(())
}

/// Adds an input proving control of the wallet script at `script_id`. Returns its index.
///
/// The first input also adds the OP_RETURN output. Fails unless the container has version 0
/// and lock time 0.
pub fn add_bip322_input(
    psbt: &mut BitGoPsbt,
    message: &str,
    script_id: ScriptId,
    wallet: &RootWalletKeys,
    sign_path: Option<SignPath>,
    tag: Option<&str>,
) -> Result<usize> {
    if psbt.version() != 0 || psbt.lock_time() != 0 {
        return Err(Error::InvalidInput(format!(
            "BIP-0322 proof must have version 0 and lock time 0, got {} and {}",
            psbt.version(),
            psbt.lock_time()
        )));
    }

    let script_pubkey = wallet_output_script(wallet, script_id, psbt.network())?;
    let to_spend = super::create_to_spend_tx(
        super::message_hash(message.as_bytes(), tag),
        script_pubkey,
    );
    let to_spend_bytes = encode::serialize(&to_spend);
    let prev_tx = match psbt.envelope() {
        NetworkEnvelope::Plain => Some(to_spend_bytes.as_slice()),
        NetworkEnvelope::BranchVersioned(_) => None,
    };

    if psbt.input_count() == 0 {
        psbt.add_output(op_return_script(), 0);
    }
    let index = psbt.add_wallet_input(
        OutPoint {
            txid: to_spend.compute_txid(),
            vout: 0,
        },
        0,
        wallet,
        script_id,
        WalletInputOptions {
            sign_path,
            sequence: Some(0),
            prev_tx,
        },
    )?;
    BitGoKeyValue::new(
        ProprietaryKeySubtype::Bip322Message,
        vec![],
        message.as_bytes().to_vec(),
    )
    .insert_into(&mut psbt.psbt_mut().inputs[index].proprietary);
    Ok(index)
}

/// The message stored on a proof input, if any.
pub fn get_bip322_message(psbt: &BitGoPsbt, input_index: usize) -> Result<Option<String>> {
    let input = psbt
        .psbt()
        .inputs
        .get(input_index)
        .ok_or(Error::IndexOutOfBounds {
            index: input_index,
            len: psbt.input_count(),
        })?;
    find_kv(ProprietaryKeySubtype::Bip322Message, &input.proprietary)
        .next()
        .map(|kv| {
            String::from_utf8(kv.value)
                .map_err(|e| Error::InvalidInput(format!("BIP-0322 message is not UTF-8: {}", e)))
        })
        .transpose()
}

/// Wallet keys with a valid signature on a proof input, ordered user, backup, bitgo.
///
/// Fails with [`Error::Bip322TagMismatch`] if the input does not commit to this message,
/// script and tag, and with [`Error::Bip322NoValidSignatures`] if nobody signed.
pub fn verify_bip322_psbt_input(
    ctx: &Context,
    psbt: &BitGoPsbt,
    input_index: usize,
    message: &str,
    script_id: ScriptId,
    wallet: &RootWalletKeys,
    tag: Option<&str>,
) -> Result<Vec<SignerKey>> {
    let tx = &psbt.psbt().unsigned_tx;
    check_proof_tx(tx, input_index)?;
    let script_pubkey = wallet_output_script(wallet, script_id, psbt.network())?;
    check_to_spend(tx, input_index, message, script_pubkey, tag)?;

    let mut signers = vec![];
    for key in SignerKey::ALL {
        if psbt.verify_signature_with_xpub(ctx, input_index, wallet.xpub(key))? {
            signers.push(key);
        }
    }
    if signers.is_empty() {
        return Err(Error::Bip322NoValidSignatures);
    }
    Ok(signers)
}

/// Like [`verify_bip322_psbt_input`] for already derived keys; returns the positions of the
/// signing keys in `pubkeys`.
pub fn verify_bip322_psbt_input_with_pubkeys(
    ctx: &Context,
    psbt: &BitGoPsbt,
    input_index: usize,
    message: &str,
    pubkeys: &PubTriple,
    script_type: OutputScriptType,
    tag: Option<&str>,
) -> Result<Vec<usize>> {
    let tx = &psbt.psbt().unsigned_tx;
    check_proof_tx(tx, input_index)?;
    let scripts =
        WalletScripts::new(pubkeys, script_type, &psbt.network().output_script_support())?;
    check_to_spend(tx, input_index, message, scripts.output_script(), tag)?;

    let mut signers = vec![];
    for (i, pubkey) in pubkeys.iter().enumerate() {
        if psbt.verify_signature_with_pub(ctx, input_index, pubkey)? {
            signers.push(i);
        }
    }
    if signers.is_empty() {
        return Err(Error::Bip322NoValidSignatures);
    }
    Ok(signers)
}

/// Checks an input of an extracted proof transaction.
///
/// Signatures are checked when the PSBT is finalized; here the input must commit to the
/// message and carry a scriptSig or witness.
#[allow(clippy::too_many_arguments)]
pub fn verify_bip322_tx_input(
    tx: &Transaction,
    input_index: usize,
    message: &str,
    script_id: ScriptId,
    wallet: &RootWalletKeys,
    network: Network,
    tag: Option<&str>,
) -> Result<()> {
    check_proof_tx(tx, input_index)?;
    let script_pubkey = wallet_output_script(wallet, script_id, network)?;
    check_to_spend(tx, input_index, message, script_pubkey, tag)?;

    let input = &tx.input[input_index];
    if input.witness.is_empty() && input.script_sig.is_empty() {
        return Err(Error::Bip322NoValidSignatures);
    }
    Ok(())
}

/// Like [`verify_bip322_tx_input`] for already derived keys; returns the positions of the
/// signing keys in `pubkeys`.
///
/// # Arguments
/// - `tx`: the extracted proof transaction
/// - `pubkeys`: wallet keys of the proven script, ordered user, backup, bitgo
/// - `script_type`: script type the keys are combined into
/// - `network`: selects the ECDSA sighash (`SIGHASH_FORKID` on fork-id networks)
///
/// # Returns
/// - ECDSA inputs: positions of the keys whose signature verifies against the `to_spend`
///   output
/// - taproot script path: positions of the two keys of the revealed leaf, once the leaf and
///   control block are checked against the output key
/// - MuSig2 key path: user and bitgo
#[allow(clippy::too_many_arguments)]
pub fn verify_bip322_tx_input_with_pubkeys(
    ctx: &Context,
    tx: &Transaction,
    input_index: usize,
    message: &str,
    pubkeys: &PubTriple,
    script_type: OutputScriptType,
    network: Network,
    tag: Option<&str>,
) -> Result<Vec<usize>> {
    check_proof_tx(tx, input_index)?;
    let scripts = WalletScripts::new(pubkeys, script_type, &network.output_script_support())?;
    check_to_spend(tx, input_index, message, scripts.output_script(), tag)?;

    let signers = match &scripts {
        WalletScripts::P2trLegacy(p2tr) | WalletScripts::P2trMusig2(p2tr) => {
            let key_path_allowed = matches!(scripts, WalletScripts::P2trMusig2(_));
            taproot_signers(ctx, &tx.input[input_index], p2tr, key_path_allowed, pubkeys)?
        }
        _ => ecdsa_signers(ctx, tx, input_index, &scripts, network, pubkeys)?,
    };
    if signers.is_empty() {
        return Err(Error::Bip322NoValidSignatures);
    }
    Ok(signers)
}

/// Signatures pushed by a finalized scriptSig or witness.
fn pushed_signatures(input: &TxIn) -> Vec<ecdsa::Signature> {
    let script_pushes = input
        .script_sig
        .instructions()
        .filter_map(|instruction| match instruction {
            Ok(Instruction::PushBytes(bytes)) => Some(bytes.as_bytes().to_vec()),
            _ => None,
        });
    let witness_items = input.witness.iter().map(|item| item.to_vec());
    script_pushes
        .chain(witness_items)
        .filter_map(|bytes| ecdsa::Signature::from_slice(&bytes).ok())
        .collect()
}

fn ecdsa_signers(
    ctx: &Context,
    tx: &Transaction,
    input_index: usize,
    scripts: &WalletScripts,
    network: Network,
    pubkeys: &PubTriple,
) -> Result<Vec<usize>> {
    let mut unsigned_tx = tx.clone();
    for input in &mut unsigned_tx.input {
        input.script_sig = ScriptBuf::new();
        input.witness = Witness::new();
    }
    let mut psbt =
        Psbt::from_unsigned_tx(unsigned_tx).map_err(|e| Error::InvalidInput(e.to_string()))?;
    let input = &mut psbt.inputs[input_index];
    input.witness_utxo = Some(TxOut {
        value: Amount::ZERO,
        script_pubkey: scripts.output_script(),
    });
    match scripts {
        WalletScripts::P2sh(s) => input.redeem_script = Some(s.redeem_script.clone()),
        WalletScripts::P2shP2wsh(s) => {
            input.redeem_script = Some(s.redeem_script.clone());
            input.witness_script = Some(s.witness_script.clone());
        }
        WalletScripts::P2wsh(s) => input.witness_script = Some(s.witness_script.clone()),
        WalletScripts::P2trLegacy(_) | WalletScripts::P2trMusig2(_) => return Ok(vec![]),
    }

    let scheme = match network.fork_id() {
        Some(fork_id) => EcdsaSighashScheme::ForkId(fork_id),
        None => EcdsaSighashScheme::Bitcoin,
    };
    let mut signers = vec![];
    for signature in pushed_signatures(&tx.input[input_index]) {
        psbt.inputs[input_index].sighash_type =
            Some(PsbtSighashType::from_u32(signature.sighash_type.to_u32()));
        let mut cache = SighashCache::new(&psbt.unsigned_tx);
        let message = scheme
            .message(&psbt, input_index, &mut cache)
            .map_err(Error::InvalidInput)?;
        for (i, pubkey) in pubkeys.iter().enumerate() {
            let valid = ctx
                .secp()
                .verify_ecdsa(&message, &signature.signature, &pubkey.0)
                .is_ok();
            if valid && !signers.contains(&i) {
                signers.push(i);
            }
        }
    }
    signers.sort_unstable();
    Ok(signers)
}

fn taproot_signers(
    ctx: &Context,
    input: &TxIn,
    p2tr: &ScriptP2tr,
    key_path_allowed: bool,
    pubkeys: &PubTriple,
) -> Result<Vec<usize>> {
    let items: Vec<&[u8]> = input.witness.iter().collect();
    match items.as_slice() {
        // user and bitgo aggregate into the internal key
        [signature] if key_path_allowed && signature.len() == 64 => Ok(vec![0, 2]),
        [first, second, leaf_script, control_block] => {
            if first.len() != 64 || second.len() != 64 {
                return Ok(vec![]);
            }
            let leaf_script = ScriptBuf::from(leaf_script.to_vec());
            let control_block = ControlBlock::decode(control_block)
                .map_err(|e| Error::InvalidInput(e.to_string()))?;
            let output_key = p2tr.spend_info.output_key().to_x_only_public_key();
            if !control_block.verify_taproot_commitment(ctx.secp(), output_key, &leaf_script) {
                return Err(Error::InvalidInput(
                    "tap leaf is not committed to by the output key".to_string(),
                ));
            }
            let bytes = leaf_script.as_bytes();
            if bytes.len() != 68 {
                return Ok(vec![]);
            }
            let leaf_keys = [&bytes[1..33], &bytes[35..67]]
                .map(|k| XOnlyPublicKey::from_slice(k).ok());
            Ok(pubkeys
                .iter()
                .enumerate()
                .filter(|(_, pubkey)| leaf_keys.contains(&Some(pubkey.0.x_only_public_key().0)))
                .map(|(i, _)| i)
                .collect())
        }
        _ => Ok(vec![]),
    }
}
