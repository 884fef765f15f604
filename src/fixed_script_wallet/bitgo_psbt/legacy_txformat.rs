//! Half-signed transactions in the pre-PSBT wire layout.
//!
//! Each input carries its single signature in the slot of the signing key, with `OP_0` (or an
//! empty witness item) in the two other slots, followed by the multisig script.

use crate::bitcoin::blockdata::opcodes::all::OP_PUSHBYTES_0;
use crate::bitcoin::blockdata::script::Builder;
use crate::bitcoin::psbt::{Input, Psbt};
use crate::bitcoin::script::PushBytesBuf;
use crate::bitcoin::{ScriptBuf, Transaction, Witness};
use crate::fixed_script_wallet::wallet_scripts::parse_multisig_script_2_of_3;

#[derive(Clone, Copy)]
enum MultisigSpend<'a> {
    P2sh(&'a ScriptBuf),
    P2shP2wsh {
        redeem_script: &'a ScriptBuf,
        witness_script: &'a ScriptBuf,
    },
    P2wsh(&'a ScriptBuf),
}

impl<'a> MultisigSpend<'a> {
    fn from_input(input: &'a Input) -> Option<Self> {
        match (&input.redeem_script, &input.witness_script) {
            (Some(redeem_script), Some(witness_script)) => Some(MultisigSpend::P2shP2wsh {
                redeem_script,
                witness_script,
            }),
            (None, Some(witness_script)) => Some(MultisigSpend::P2wsh(witness_script)),
            (Some(redeem_script), None) => Some(MultisigSpend::P2sh(redeem_script)),
            (None, None) => None,
        }
    }

    fn multisig_script(&self) -> &ScriptBuf {
        match self {
            MultisigSpend::P2sh(script) | MultisigSpend::P2wsh(script) => script,
            MultisigSpend::P2shP2wsh { witness_script, .. } => witness_script,
        }
    }
}

fn push_bytes(bytes: Vec<u8>, what: &str, input_index: usize) -> Result<PushBytesBuf, String> {
    PushBytesBuf::try_from(bytes)
        .map_err(|e| format!("Input {}: {} too large to push: {}", input_index, what, e))
}

/// The unsigned transaction with every input's single signature placed in the legacy layout.
pub fn build_half_signed_legacy_tx(psbt: &Psbt) -> Result<Transaction, String> {
    if psbt.inputs.is_empty() || psbt.unsigned_tx.output.is_empty() {
        return Err("empty inputs or outputs".to_string());
    }

    let mut tx = psbt.unsigned_tx.clone();

    for (input_index, input) in psbt.inputs.iter().enumerate() {
        if !input.tap_script_sigs.is_empty() || !input.tap_key_origins.is_empty() {
            return Err(format!(
                "Input {}: taproot inputs have no legacy half-signed encoding",
                input_index
            ));
        }
        let spend = MultisigSpend::from_input(input).ok_or_else(|| {
            format!(
                "Input {}: no multisig redeem or witness script (p2sh, p2shP2wsh, p2wsh only)",
                input_index
            )
        })?;

        let mut sigs = input.partial_sigs.iter();
        let (sig_pubkey, signature) = match (sigs.next(), sigs.next()) {
            (Some(only), None) => only,
            _ => {
                return Err(format!(
                    "Input {}: expected exactly 1 partial signature, got {}",
                    input_index,
                    input.partial_sigs.len()
                ))
            }
        };

        let pubkeys = parse_multisig_script_2_of_3(spend.multisig_script())
            .map_err(|e| format!("Input {}: invalid multisig script: {}", input_index, e))?;
        let slot = pubkeys
            .iter()
            .position(|pk| pk.to_bytes()[..] == sig_pubkey.to_bytes()[..])
            .ok_or_else(|| {
                format!(
                    "Input {}: signature key is not in the multisig script",
                    input_index
                )
            })?;
        let sig_bytes = signature.to_vec();

        let tx_input = &mut tx.input[input_index];
        match spend {
            MultisigSpend::P2sh(redeem_script) => {
                let mut builder = Builder::new().push_opcode(OP_PUSHBYTES_0);
                for i in 0..3 {
                    builder = if i == slot {
                        builder.push_slice(push_bytes(sig_bytes.clone(), "signature", input_index)?)
                    } else {
                        builder.push_opcode(OP_PUSHBYTES_0)
                    };
                }
                builder = builder.push_slice(push_bytes(
                    redeem_script.to_bytes(),
                    "redeem script",
                    input_index,
                )?);
                tx_input.script_sig = builder.into_script();
            }
            MultisigSpend::P2shP2wsh { witness_script, .. }
            | MultisigSpend::P2wsh(witness_script) => {
                let mut items: Vec<Vec<u8>> = vec![vec![]];
                items.extend((0..3).map(|i| if i == slot { sig_bytes.clone() } else { vec![] }));
                items.push(witness_script.to_bytes());
                tx_input.witness = Witness::from_slice(&items);
                if let MultisigSpend::P2shP2wsh { redeem_script, .. } = spend {
                    tx_input.script_sig = Builder::new()
                        .push_slice(push_bytes(
                            redeem_script.to_bytes(),
                            "redeem script",
                            input_index,
                        )?)
                        .into_script();
                }
            }
        }
    }

    Ok(tx)
}
