use crate::bitcoin::blockdata::opcodes::all::{OP_CHECKMULTISIG, OP_PUSHNUM_2, OP_PUSHNUM_3};
use crate::bitcoin::blockdata::script::{Builder, Instruction};
use crate::bitcoin::{CompressedPublicKey, Script, ScriptBuf};
use crate::fixed_script_wallet::wallet_keys::PubTriple;

/// `OP_2 <k1> <k2> <k3> OP_3 OP_CHECKMULTISIG`, keys in wallet order.
pub fn build_multisig_script_2_of_3(keys: &PubTriple) -> ScriptBuf {
    keys.iter()
        .fold(Builder::new().push_opcode(OP_PUSHNUM_2), |b, key| {
            b.push_slice(key.to_bytes())
        })
        .push_opcode(OP_PUSHNUM_3)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script()
}

/// Inverse of [`build_multisig_script_2_of_3`].
pub fn parse_multisig_script_2_of_3(script: &Script) -> Result<PubTriple, String> {
    let instructions = script
        .instructions()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;
    match instructions.as_slice() {
        [
            Instruction::Op(OP_PUSHNUM_2),
            Instruction::PushBytes(a),
            Instruction::PushBytes(b),
            Instruction::PushBytes(c),
            Instruction::Op(OP_PUSHNUM_3),
            Instruction::Op(OP_CHECKMULTISIG),
        ] => {
            let key = |p: &crate::bitcoin::script::PushBytes| {
                CompressedPublicKey::from_slice(p.as_bytes()).map_err(|e| e.to_string())
            };
            Ok([key(a)?, key(b)?, key(c)?])
        }
        _ => Err("not a 2-of-3 multisig script".to_string()),
    }
}

/// Chains 0 and 1.
#[derive(Debug, Clone)]
pub struct ScriptP2sh {
    pub redeem_script: ScriptBuf,
}

/// Chains 10 and 11. The redeem script is the p2wsh program of the witness script.
#[derive(Debug, Clone)]
pub struct ScriptP2shP2wsh {
    pub redeem_script: ScriptBuf,
    pub witness_script: ScriptBuf,
}

/// Chains 20 and 21.
#[derive(Debug, Clone)]
pub struct ScriptP2wsh {
    pub witness_script: ScriptBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_script_wallet::test_utils::get_test_wallet_keys;
    use crate::fixed_script_wallet::to_pub_triple;

    #[test]
    fn test_build_and_parse() {
        let keys = get_test_wallet_keys("test");
        let pubs = to_pub_triple(&keys.derive_for_chain_and_index(0, 0).unwrap());
        let script = build_multisig_script_2_of_3(&pubs);
        assert_eq!(script.len(), 1 + 3 * 34 + 2);
        assert_eq!(script.as_bytes()[0], 0x52);
        assert_eq!(parse_multisig_script_2_of_3(&script).unwrap(), pubs);
    }

    #[test]
    fn test_parse_rejects_other_scripts() {
        let script = ScriptBuf::new_op_return([0u8; 3]);
        assert!(parse_multisig_script_2_of_3(&script).is_err());
    }
}
