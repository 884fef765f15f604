//! BIP-0322 generic signed messages for fixed-script wallets.
//!
//! A proof spends the single output of a virtual `to_spend` transaction that commits to the
//! message hash and the wallet script. The spending `to_sign` transaction has one OP_RETURN
//! output and is signed like any other wallet transaction.

mod bitgo_psbt;

use crate::bitcoin::hashes::{sha256, Hash, HashEngine};
use crate::bitcoin::opcodes::all::OP_RETURN;
use crate::bitcoin::opcodes::OP_0;
use crate::bitcoin::script::Builder;
use crate::bitcoin::{
    absolute::LockTime, transaction, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn,
    TxOut, Txid, Witness,
};

pub use bitgo_psbt::{
    add_bip322_input, get_bip322_message, verify_bip322_psbt_input,
    verify_bip322_psbt_input_with_pubkeys, verify_bip322_tx_input,
    verify_bip322_tx_input_with_pubkeys,
};

pub const DEFAULT_TAG: &str = "BIP0322-signed-message";

/// `SHA256(SHA256(tag) || SHA256(tag) || message)`, with [`DEFAULT_TAG`] unless `tag` is given.
pub fn message_hash(message: &[u8], tag: Option<&str>) -> [u8; 32] {
    let tag_hash = sha256::Hash::hash(tag.unwrap_or(DEFAULT_TAG).as_bytes());
    let mut engine = sha256::Hash::engine();
    engine.input(tag_hash.as_ref());
    engine.input(tag_hash.as_ref());
    engine.input(message);
    sha256::Hash::from_engine(engine).to_byte_array()
}

fn proof_tx(input: TxIn, output: TxOut) -> Transaction {
    Transaction {
        version: transaction::Version(0),
        lock_time: LockTime::ZERO,
        input: vec![input],
        output: vec![output],
    }
}

/// Virtual transaction whose only output is the script being proven.
pub fn create_to_spend_tx(message_hash: [u8; 32], script_pubkey: ScriptBuf) -> Transaction {
    proof_tx(
        TxIn {
            previous_output: OutPoint {
                txid: Txid::all_zeros(),
                vout: 0xFFFF_FFFF,
            },
            script_sig: Builder::new()
                .push_opcode(OP_0)
                .push_slice(message_hash)
                .into_script(),
            sequence: Sequence::ZERO,
            witness: Witness::new(),
        },
        TxOut {
            value: Amount::ZERO,
            script_pubkey,
        },
    )
}

/// Unsigned transaction spending `to_spend:0` into a bare OP_RETURN.
pub fn create_to_sign_tx(to_spend_txid: Txid) -> Transaction {
    proof_tx(
        TxIn {
            previous_output: OutPoint {
                txid: to_spend_txid,
                vout: 0,
            },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ZERO,
            witness: Witness::new(),
        },
        TxOut {
            value: Amount::ZERO,
            script_pubkey: op_return_script(),
        },
    )
}

pub(crate) fn op_return_script() -> ScriptBuf {
    Builder::new().push_opcode(OP_RETURN).into_script()
}

pub(crate) fn to_spend_txid(message: &str, script_pubkey: ScriptBuf, tag: Option<&str>) -> Txid {
    create_to_spend_tx(message_hash(message.as_bytes(), tag), script_pubkey).compute_txid()
}
