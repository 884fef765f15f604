/// Code relating to script types of BitGo's 2-of-3 multisig wallets.
pub mod bitgo_musig;
mod checkmultisig;
mod checksigverify;
mod singlesig;

pub use bitgo_musig::BitGoMusigError;
pub use checkmultisig::{
    build_multisig_script_2_of_3, parse_multisig_script_2_of_3, ScriptP2sh, ScriptP2shP2wsh,
    ScriptP2wsh,
};
pub(crate) use checksigverify::to_xonly;
pub use checksigverify::{
    build_p2tr_ns_script, build_tap_tree_for_output, create_tap_bip32_derivation_for_output,
    ScriptP2tr, TapKeyOrigins, WalletTapLeaf,
};
pub use singlesig::{build_p2pk_script, ScriptP2shP2pk};

use core::fmt;
use std::convert::TryFrom;
use std::str::FromStr;

use crate::bitcoin::ScriptBuf;
use crate::fixed_script_wallet::bitgo_psbt::{SignPath, SignerKey};
use crate::fixed_script_wallet::wallet_keys::{
    to_pub_triple, PubTriple, RootWalletKeys, WalletKeysError,
};
use crate::networks::OutputScriptSupport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletScriptsError {
    UnknownChainCode(u32),
    /// The network lacks the named feature (`segwit` or `taproot`)
    UnsupportedByNetwork(&'static str),
    UnknownScriptType(String),
    Taproot(String),
    Musig(BitGoMusigError),
    Keys(WalletKeysError),
}

impl fmt::Display for WalletScriptsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletScriptsError::UnknownChainCode(c) => write!(f, "no chain for {}", c),
            WalletScriptsError::UnsupportedByNetwork(feature) => {
                write!(f, "Network does not support {}", feature)
            }
            WalletScriptsError::UnknownScriptType(s) => write!(
                f,
                "Unknown script type '{}' (p2sh, p2shP2wsh, p2wsh, p2trLegacy, p2trMusig2)",
                s
            ),
            WalletScriptsError::Taproot(s) => write!(f, "Taproot construction failed: {}", s),
            WalletScriptsError::Musig(e) => write!(f, "{}", e),
            WalletScriptsError::Keys(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for WalletScriptsError {}

impl From<BitGoMusigError> for WalletScriptsError {
    fn from(err: BitGoMusigError) -> Self {
        WalletScriptsError::Musig(err)
    }
}

impl From<WalletKeysError> for WalletScriptsError {
    fn from(err: WalletKeysError) -> Self {
        WalletScriptsError::Keys(err)
    }
}

/// Scripts that belong to fixed-script BitGo wallets.
#[derive(Debug, Clone)]
pub enum WalletScripts {
    /// Chains 0 and 1. Legacy Pay-To-Script-Hash.
    P2sh(ScriptP2sh),
    /// Chains 10 and 11. Wrapped-Segwit Pay-To-Script-Hash.
    P2shP2wsh(ScriptP2shP2wsh),
    /// Chains 20 and 21. Native Segwit Pay-To-Witness-Script-Hash.
    P2wsh(ScriptP2wsh),
    /// Chains 30 and 31. Legacy Taproot, only supporting script-path spend.
    P2trLegacy(ScriptP2tr),
    /// Chains 40 and 41. Taproot with Musig2 key-path spend support.
    P2trMusig2(ScriptP2tr),
}

impl fmt::Display for WalletScripts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.script_type())
    }
}

impl WalletScripts {
    pub fn new(
        keys: &PubTriple,
        script_type: OutputScriptType,
        script_support: &OutputScriptSupport,
    ) -> Result<WalletScripts, WalletScriptsError> {
        script_support.assert_supports(script_type)?;
        Ok(match script_type {
            OutputScriptType::P2sh => WalletScripts::P2sh(ScriptP2sh {
                redeem_script: build_multisig_script_2_of_3(keys),
            }),
            OutputScriptType::P2shP2wsh => {
                let witness_script = build_multisig_script_2_of_3(keys);
                WalletScripts::P2shP2wsh(ScriptP2shP2wsh {
                    redeem_script: witness_script.to_p2wsh(),
                    witness_script,
                })
            }
            OutputScriptType::P2wsh => WalletScripts::P2wsh(ScriptP2wsh {
                witness_script: build_multisig_script_2_of_3(keys),
            }),
            OutputScriptType::P2trLegacy => {
                WalletScripts::P2trLegacy(ScriptP2tr::new(keys, false)?)
            }
            OutputScriptType::P2trMusig2 => WalletScripts::P2trMusig2(ScriptP2tr::new(keys, true)?),
        })
    }

    pub fn from_wallet_keys(
        wallet_keys: &RootWalletKeys,
        chain: Chain,
        index: u32,
        script_support: &OutputScriptSupport,
    ) -> Result<WalletScripts, WalletScriptsError> {
        let derived = wallet_keys.derive_for_chain_and_index(chain.value(), index)?;
        WalletScripts::new(&to_pub_triple(&derived), chain.script_type, script_support)
    }

    pub fn script_type(&self) -> OutputScriptType {
        match self {
            WalletScripts::P2sh(_) => OutputScriptType::P2sh,
            WalletScripts::P2shP2wsh(_) => OutputScriptType::P2shP2wsh,
            WalletScripts::P2wsh(_) => OutputScriptType::P2wsh,
            WalletScripts::P2trLegacy(_) => OutputScriptType::P2trLegacy,
            WalletScripts::P2trMusig2(_) => OutputScriptType::P2trMusig2,
        }
    }

    pub fn output_script(&self) -> ScriptBuf {
        match self {
            WalletScripts::P2sh(script) => script.redeem_script.to_p2sh(),
            WalletScripts::P2shP2wsh(script) => script.redeem_script.to_p2sh(),
            WalletScripts::P2wsh(script) => script.witness_script.to_p2wsh(),
            WalletScripts::P2trLegacy(script) | WalletScripts::P2trMusig2(script) => {
                script.output_script()
            }
        }
    }
}

/// Whether a chain is for receiving (external) or change (internal) addresses.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Scope {
    /// Even chain values: 0, 10, 20, 30, 40.
    External,
    /// Odd chain values: 1, 11, 21, 31, 41.
    Internal,
}

/// BitGo-defined mapping between the chain component of a derivation path and a script type.
///
/// External chains are the base value, internal chains are base + 1.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Chain {
    pub script_type: OutputScriptType,
    pub scope: Scope,
}

impl Chain {
    pub const fn new(script_type: OutputScriptType, scope: Scope) -> Self {
        Self { script_type, scope }
    }

    pub const fn value(&self) -> u32 {
        let base = match self.script_type {
            OutputScriptType::P2sh => 0,
            OutputScriptType::P2shP2wsh => 10,
            OutputScriptType::P2wsh => 20,
            OutputScriptType::P2trLegacy => 30,
            OutputScriptType::P2trMusig2 => 40,
        };
        match self.scope {
            Scope::External => base,
            Scope::Internal => base + 1,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.scope == Scope::Internal
    }
}

impl TryFrom<u32> for Chain {
    type Error = WalletScriptsError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        let script_type = match value / 10 {
            0 => OutputScriptType::P2sh,
            1 => OutputScriptType::P2shP2wsh,
            2 => OutputScriptType::P2wsh,
            3 => OutputScriptType::P2trLegacy,
            4 => OutputScriptType::P2trMusig2,
            _ => return Err(WalletScriptsError::UnknownChainCode(value)),
        };
        let scope = match value % 10 {
            0 => Scope::External,
            1 => Scope::Internal,
            _ => return Err(WalletScriptsError::UnknownChainCode(value)),
        };
        Ok(Chain::new(script_type, scope))
    }
}

impl FromStr for Chain {
    type Err = WalletScriptsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let chain =
            u32::from_str(s).map_err(|_| WalletScriptsError::UnknownScriptType(s.to_string()))?;
        Chain::try_from(chain)
    }
}

pub fn chain_to_script_type(chain: u32) -> Result<OutputScriptType, WalletScriptsError> {
    Chain::try_from(chain).map(|c| c.script_type)
}

pub fn script_type_to_chain(script_type: OutputScriptType, is_internal: bool) -> u32 {
    let scope = if is_internal {
        Scope::Internal
    } else {
        Scope::External
    };
    Chain::new(script_type, scope).value()
}

/// The signer pair that spends a script type when the caller does not choose one.
///
/// `p2trLegacy` chains only spend by script path, through the user/backup leaf.
pub fn required_sign_path(script_type: OutputScriptType) -> SignPath {
    match script_type {
        OutputScriptType::P2trLegacy => SignPath {
            signer: SignerKey::User,
            cosigner: SignerKey::Backup,
        },
        OutputScriptType::P2sh
        | OutputScriptType::P2shP2wsh
        | OutputScriptType::P2wsh
        | OutputScriptType::P2trMusig2 => SignPath::default(),
    }
}

/// Fixed-script wallet script types, independent of scope.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "inspect", derive(serde::Serialize))]
pub enum OutputScriptType {
    /// Legacy Pay-To-Script-Hash (chains 0, 1)
    P2sh,
    /// Wrapped-Segwit Pay-To-Script-Hash (chains 10, 11)
    P2shP2wsh,
    /// Native Segwit Pay-To-Witness-Script-Hash (chains 20, 21)
    P2wsh,
    /// Legacy Taproot, script-path only (chains 30, 31)
    P2trLegacy,
    /// Taproot with MuSig2 key-path support (chains 40, 41)
    P2trMusig2,
}

const ALL_SCRIPT_TYPES: [OutputScriptType; 5] = [
    OutputScriptType::P2sh,
    OutputScriptType::P2shP2wsh,
    OutputScriptType::P2wsh,
    OutputScriptType::P2trLegacy,
    OutputScriptType::P2trMusig2,
];

impl FromStr for OutputScriptType {
    type Err = WalletScriptsError;

    /// Also accepts the input script type names, normalized to their output type.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "p2sh" | "p2shP2pk" => Ok(OutputScriptType::P2sh),
            "p2shP2wsh" => Ok(OutputScriptType::P2shP2wsh),
            "p2wsh" => Ok(OutputScriptType::P2wsh),
            // "p2tr" is the historic name of p2trLegacy
            "p2tr" | "p2trLegacy" => Ok(OutputScriptType::P2trLegacy),
            "p2trMusig2" | "p2trMusig2ScriptPath" | "p2trMusig2KeyPath" => {
                Ok(OutputScriptType::P2trMusig2)
            }
            _ => Err(WalletScriptsError::UnknownScriptType(s.to_string())),
        }
    }
}

impl OutputScriptType {
    pub fn all() -> &'static [OutputScriptType; 5] {
        &ALL_SCRIPT_TYPES
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputScriptType::P2sh => "p2sh",
            OutputScriptType::P2shP2wsh => "p2shP2wsh",
            OutputScriptType::P2wsh => "p2wsh",
            OutputScriptType::P2trLegacy => "p2trLegacy",
            OutputScriptType::P2trMusig2 => "p2trMusig2",
        }
    }

    pub fn is_segwit(&self) -> bool {
        !matches!(self, OutputScriptType::P2sh)
    }

    pub fn is_taproot(&self) -> bool {
        matches!(
            self,
            OutputScriptType::P2trLegacy | OutputScriptType::P2trMusig2
        )
    }
}

impl fmt::Display for OutputScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_script_wallet::test_utils::get_test_wallet_keys;
    use crate::Network;
    use rstest::rstest;

    fn all_chains() -> Vec<Chain> {
        OutputScriptType::all()
            .iter()
            .flat_map(|t| [Chain::new(*t, Scope::External), Chain::new(*t, Scope::Internal)])
            .collect()
    }

    #[rstest]
    #[case(0, "a914999a8eb861e3fabae1efe4fb16ff4752e1f5976687")]
    #[case(1, "a914487ca5843f23b9f3b85a00136bec647846d179ab87")]
    #[case(10, "a9141219b6d9430fffb8de14f14969a5c07172c4613b87")]
    #[case(11, "a914cbfab1a5a25afab05ff420bd9dd0958c6f1a7a2f87")]
    #[case(
        20,
        "0020ce670e65fd69ef2eb1aa6087643a18ae5bff198ca20ef26da546e85962386c76"
    )]
    #[case(
        21,
        "00209cca08a252f9846a1417afbe46ed96bf09d5ec6d25f0effb7d841188d5992b7c"
    )]
    #[case(
        30,
        "51203a81504b836967a69399fcf3822adfdb7d61061e42418f6aad0d473cbcc69b86"
    )]
    #[case(
        31,
        "512093e5e3c8885a6f87b4449e1bffa3ba8a45a9ee634dc27408394c7d9b68f01adc"
    )]
    #[case(
        40,
        "5120c7c4dd55b2bf3cd7ea5b27d3da521699ce761aa345523d8486f0336364957ef2"
    )]
    #[case(
        41,
        "51202629eea5dbef6841160a0b752dedd4b8e206f046835ee944848679d6dea2ac2c"
    )]
    fn test_wallet_output_scripts(#[case] chain: u32, #[case] expected: &str) {
        let keys = get_test_wallet_keys("lol");
        let scripts = WalletScripts::from_wallet_keys(
            &keys,
            Chain::try_from(chain).unwrap(),
            0,
            &Network::Bitcoin.output_script_support(),
        )
        .unwrap();
        assert_eq!(scripts.output_script().to_hex_string(), expected);
    }

    #[test]
    fn test_chain_codes() {
        for chain in all_chains() {
            assert_eq!(Chain::try_from(chain.value()).unwrap(), chain);
            assert_eq!(chain.is_internal(), chain.value() % 2 == 1);
            assert_eq!(
                script_type_to_chain(chain.script_type, chain.is_internal()),
                chain.value()
            );
        }
        for bad in [2, 9, 12, 32, 42, 50, 100, u32::MAX] {
            assert_eq!(
                Chain::try_from(bad),
                Err(WalletScriptsError::UnknownChainCode(bad))
            );
        }
        assert_eq!(chain_to_script_type(31).unwrap(), OutputScriptType::P2trLegacy);
        assert_eq!(Chain::from_str("41").unwrap().value(), 41);
    }

    #[rstest]
    #[case(Network::Dogecoin, OutputScriptType::P2wsh, Some("segwit"))]
    #[case(Network::Dogecoin, OutputScriptType::P2shP2wsh, Some("segwit"))]
    #[case(Network::Dogecoin, OutputScriptType::P2sh, None)]
    #[case(Network::Litecoin, OutputScriptType::P2trLegacy, Some("taproot"))]
    #[case(Network::Litecoin, OutputScriptType::P2trMusig2, Some("taproot"))]
    #[case(Network::Litecoin, OutputScriptType::P2wsh, None)]
    #[case(Network::Bitcoin, OutputScriptType::P2trMusig2, None)]
    fn test_script_support(
        #[case] network: Network,
        #[case] script_type: OutputScriptType,
        #[case] missing: Option<&str>,
    ) {
        let keys = get_test_wallet_keys("test");
        let result = WalletScripts::from_wallet_keys(
            &keys,
            Chain::new(script_type, Scope::External),
            0,
            &network.output_script_support(),
        );
        match missing {
            Some(feature) => assert_eq!(
                result.unwrap_err().to_string(),
                format!("Network does not support {}", feature)
            ),
            None => assert_eq!(result.unwrap().script_type(), script_type),
        }
    }

    #[test]
    fn test_output_script_type_from_str() {
        use OutputScriptType::*;
        for t in OutputScriptType::all() {
            assert_eq!(OutputScriptType::from_str(t.as_str()).unwrap(), *t);
        }
        assert_eq!(OutputScriptType::from_str("p2tr").unwrap(), P2trLegacy);
        assert_eq!(OutputScriptType::from_str("p2shP2pk").unwrap(), P2sh);
        assert_eq!(
            OutputScriptType::from_str("p2trMusig2KeyPath").unwrap(),
            P2trMusig2
        );
        assert!(OutputScriptType::from_str("p2pkh").is_err());
    }

    #[test]
    fn test_required_sign_path() {
        let legacy = required_sign_path(OutputScriptType::P2trLegacy);
        assert_eq!((legacy.signer, legacy.cosigner), (SignerKey::User, SignerKey::Backup));
        for t in [
            OutputScriptType::P2sh,
            OutputScriptType::P2shP2wsh,
            OutputScriptType::P2wsh,
            OutputScriptType::P2trMusig2,
        ] {
            let path = required_sign_path(t);
            assert_eq!((path.signer, path.cosigner), (SignerKey::User, SignerKey::Bitgo));
        }
    }
}
