use crate::bitcoin::blockdata::opcodes::all::OP_CHECKSIG;
use crate::bitcoin::blockdata::script::Builder;
use crate::bitcoin::{CompressedPublicKey, ScriptBuf};

/// `<pubkey> OP_CHECKSIG`
pub fn build_p2pk_script(key: CompressedPublicKey) -> ScriptBuf {
    Builder::new()
        .push_slice(key.to_bytes())
        .push_opcode(OP_CHECKSIG)
        .into_script()
}

/// Single-key p2sh output used for replay protection inputs.
#[derive(Debug, Clone)]
pub struct ScriptP2shP2pk {
    pub redeem_script: ScriptBuf,
}

impl ScriptP2shP2pk {
    pub fn new(key: CompressedPublicKey) -> Self {
        ScriptP2shP2pk {
            redeem_script: build_p2pk_script(key),
        }
    }

    pub fn output_script(&self) -> ScriptBuf {
        self.redeem_script.to_p2sh()
    }
}
