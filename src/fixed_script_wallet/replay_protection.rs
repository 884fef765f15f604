use crate::bitcoin::{CompressedPublicKey, Script, ScriptBuf};
use crate::fixed_script_wallet::wallet_scripts::ScriptP2shP2pk;

/// Output scripts of single-key p2shP2pk inputs that may appear next to wallet inputs.
///
/// These inputs exist on fork networks (e.g. BCH) to make a transaction invalid on the chain
/// it forked from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayProtection {
    pub permitted_output_scripts: Vec<ScriptBuf>,
}

impl ReplayProtection {
    pub fn new(permitted_output_scripts: Vec<ScriptBuf>) -> Self {
        Self {
            permitted_output_scripts,
        }
    }

    pub fn from_public_keys(public_keys: &[CompressedPublicKey]) -> Self {
        Self::new(
            public_keys
                .iter()
                .map(|key| ScriptP2shP2pk::new(*key).output_script())
                .collect(),
        )
    }

    pub fn is_replay_protection_input(&self, output_script: &Script) -> bool {
        self.permitted_output_scripts
            .iter()
            .any(|s| s.as_script() == output_script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_script_wallet::test_utils::get_test_wallet_keys;

    #[test]
    fn test_from_public_keys() {
        let key = get_test_wallet_keys("replay").user_key().to_pub();
        let rp = ReplayProtection::from_public_keys(&[key]);
        let script = ScriptP2shP2pk::new(key).output_script();
        assert!(script.is_p2sh());
        assert!(rp.is_replay_protection_input(&script));
        assert!(!ReplayProtection::default().is_replay_protection_input(&script));
    }
}
