use crate::bitcoin::psbt::Output;
use crate::bitcoin::{ScriptBuf, TxOut};

use crate::fixed_script_wallet::{Chain, RootWalletKeys, WalletScripts};
use crate::Network;

use super::psbt_wallet_input::{
    get_output_derivation_paths, is_bip32_derivation_for_wallet, is_tap_key_origins_for_wallet,
    parse_shared_derivation_path, ScriptId,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOutput {
    /// `None` for scripts without an address encoding (e.g. OP_RETURN)
    pub address: Option<String>,
    pub script: Vec<u8>,
    pub value: u64,
    /// Set for outputs that belong to the wallet
    pub script_id: Option<ScriptId>,
}

impl ParsedOutput {
    pub fn parse(
        psbt_output: &Output,
        tx_output: &TxOut,
        wallet_keys: &RootWalletKeys,
        network: Network,
    ) -> Result<Self, ParseOutputError> {
        let script = &tx_output.script_pubkey;
        let script_id = match_output_to_wallet(wallet_keys, psbt_output, script, network)
            .map_err(ParseOutputError::WalletMatch)?;
        let address =
            crate::address::from_output_script_with_network(script.as_script(), network).ok();

        Ok(Self {
            address,
            script: script.to_bytes(),
            value: tx_output.value.to_sat(),
            script_id,
        })
    }

    pub fn is_external(&self) -> bool {
        self.script_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutputError {
    /// Derivation data names our keys but the script is not the derived one
    WalletMatch(String),
}

impl std::fmt::Display for ParseOutputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseOutputError::WalletMatch(error) => write!(f, "{}", error),
        }
    }
}

impl std::error::Error for ParseOutputError {}

/// `Ok(None)` when the output carries no derivation data or the data names other keys.
///
/// Derivation data that names our keys but does not reproduce the script is an error.
fn match_output_to_wallet(
    wallet_keys: &RootWalletKeys,
    psbt_output: &Output,
    script: &ScriptBuf,
    network: Network,
) -> Result<Option<ScriptId>, String> {
    if psbt_output.bip32_derivation.is_empty() && psbt_output.tap_key_origins.is_empty() {
        return Ok(None);
    }

    let belongs_to_wallet = if !psbt_output.bip32_derivation.is_empty() {
        is_bip32_derivation_for_wallet(wallet_keys, &psbt_output.bip32_derivation)
    } else {
        is_tap_key_origins_for_wallet(wallet_keys, &psbt_output.tap_key_origins)
    };
    if !belongs_to_wallet {
        return Ok(None);
    }

    let script_id = parse_shared_derivation_path(&get_output_derivation_paths(psbt_output))
        .map_err(|e| format!("Failed to parse output derivation path: {}", e))?;
    let chain = Chain::try_from(script_id.chain)
        .map_err(|e| format!("Invalid chain value {}: {}", script_id.chain, e))?;
    let derived = WalletScripts::from_wallet_keys(
        wallet_keys,
        chain,
        script_id.index,
        &network.output_script_support(),
    )
    .map_err(|e| format!("Failed to derive wallet scripts: {}", e))?;

    if derived.output_script().as_script() == script.as_script() {
        Ok(Some(script_id))
    } else {
        Err(format!(
            "Output script mismatch at chain={}, index={}: expected {:x}, got {:x}",
            script_id.chain,
            script_id.index,
            derived.output_script(),
            script
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin::Amount;
    use crate::fixed_script_wallet::test_utils::get_test_wallet_keys;

    fn wallet_output(wallet: &RootWalletKeys, chain: u32, index: u32) -> (Output, TxOut) {
        let secp = crate::bitcoin::secp256k1::Secp256k1::verification_only();
        let scripts = WalletScripts::from_wallet_keys(
            wallet,
            Chain::try_from(chain).unwrap(),
            index,
            &Network::Bitcoin.output_script_support(),
        )
        .unwrap();
        let mut output = Output::default();
        for (xpub, path) in wallet
            .xpubs
            .iter()
            .zip(wallet.derivation_paths(chain, index).unwrap())
        {
            let key = xpub.derive_pub(&secp, &path).unwrap().public_key;
            output
                .bip32_derivation
                .insert(key, (xpub.fingerprint(), path));
        }
        let tx_out = TxOut {
            value: Amount::from_sat(5000),
            script_pubkey: scripts.output_script(),
        };
        (output, tx_out)
    }

    #[test]
    fn test_wallet_and_external_outputs() {
        let wallet = get_test_wallet_keys("output");
        let other = get_test_wallet_keys("other");
        let (output, tx_out) = wallet_output(&wallet, 21, 4);

        let parsed = ParsedOutput::parse(&output, &tx_out, &wallet, Network::Bitcoin).unwrap();
        assert_eq!(parsed.script_id, Some(ScriptId { chain: 21, index: 4 }));
        assert!(parsed.address.is_some());
        assert!(!parsed.is_external());

        let parsed = ParsedOutput::parse(&output, &tx_out, &other, Network::Bitcoin).unwrap();
        assert!(parsed.is_external());

        let bare = ParsedOutput::parse(&Output::default(), &tx_out, &wallet, Network::Bitcoin)
            .unwrap();
        assert!(bare.is_external());
    }

    #[test]
    fn test_script_mismatch_is_error() {
        let wallet = get_test_wallet_keys("output");
        let (output, mut tx_out) = wallet_output(&wallet, 20, 0);
        tx_out.script_pubkey = ScriptBuf::new_op_return([0u8; 2]);
        assert!(matches!(
            ParsedOutput::parse(&output, &tx_out, &wallet, Network::Bitcoin),
            Err(ParseOutputError::WalletMatch(_))
        ));
    }

    #[test]
    fn test_op_return_has_no_address() {
        let wallet = get_test_wallet_keys("output");
        let tx_out = TxOut {
            value: Amount::ZERO,
            script_pubkey: ScriptBuf::new_op_return([1u8; 8]),
        };
        let parsed =
            ParsedOutput::parse(&Output::default(), &tx_out, &wallet, Network::Bitcoin).unwrap();
        assert_eq!(parsed.address, None);
    }
}
