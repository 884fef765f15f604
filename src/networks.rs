//! Registry of the UTXO networks supported by BitGo fixed-script wallets.

use std::fmt;
use std::str::FromStr;

use crate::fixed_script_wallet::wallet_scripts::{OutputScriptType, WalletScriptsError};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "inspect", derive(serde::Serialize))]
pub enum Network {
    Bitcoin,
    BitcoinTestnet3,
    BitcoinTestnet4,
    BitcoinPublicSignet,
    BitcoinBitGoSignet,

    BitcoinCash,
    BitcoinCashTestnet,

    Ecash,
    EcashTestnet,

    BitcoinGold,
    BitcoinGoldTestnet,

    BitcoinSV,
    BitcoinSVTestnet,

    Dash,
    DashTestnet,

    Dogecoin,
    DogecoinTestnet,

    Litecoin,
    LitecoinTestnet,

    Zcash,
    ZcashTestnet,
}

/// Base58 version bytes and the optional bech32 human-readable part of a network.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AddressParams {
    pub pubkey_hash: &'static [u8],
    pub script_hash: &'static [u8],
    pub bech32_hrp: Option<&'static str>,
}

/// Which output script families a network accepts.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct OutputScriptSupport {
    pub segwit: bool,
    pub taproot: bool,
}

impl OutputScriptSupport {
    pub fn assert_legacy(&self) -> Result<(), WalletScriptsError> {
        Ok(())
    }

    pub fn assert_segwit(&self) -> Result<(), WalletScriptsError> {
        if !self.segwit {
            return Err(WalletScriptsError::UnsupportedByNetwork("segwit"));
        }
        Ok(())
    }

    pub fn assert_taproot(&self) -> Result<(), WalletScriptsError> {
        if !self.taproot {
            return Err(WalletScriptsError::UnsupportedByNetwork("taproot"));
        }
        Ok(())
    }

    pub fn assert_supports(&self, script_type: OutputScriptType) -> Result<(), WalletScriptsError> {
        match script_type {
            OutputScriptType::P2sh => self.assert_legacy(),
            OutputScriptType::P2shP2wsh | OutputScriptType::P2wsh => self.assert_segwit(),
            OutputScriptType::P2trLegacy | OutputScriptType::P2trMusig2 => self.assert_taproot(),
        }
    }

    pub fn supports_script_type(&self, script_type: OutputScriptType) -> bool {
        self.assert_supports(script_type).is_ok()
    }
}

impl Network {
    pub const ALL: &'static [Network] = &[
        Network::Bitcoin,
        Network::BitcoinTestnet3,
        Network::BitcoinTestnet4,
        Network::BitcoinPublicSignet,
        Network::BitcoinBitGoSignet,
        Network::BitcoinCash,
        Network::BitcoinCashTestnet,
        Network::Ecash,
        Network::EcashTestnet,
        Network::BitcoinGold,
        Network::BitcoinGoldTestnet,
        Network::BitcoinSV,
        Network::BitcoinSVTestnet,
        Network::Dash,
        Network::DashTestnet,
        Network::Dogecoin,
        Network::DogecoinTestnet,
        Network::Litecoin,
        Network::LitecoinTestnet,
        Network::Zcash,
        Network::ZcashTestnet,
    ];

    /// BitGo coin name, e.g. `btc` or `tltc`.
    pub fn to_coin_name(&self) -> &'static str {
        match self {
            Network::Bitcoin => "btc",
            Network::BitcoinTestnet3 => "tbtc",
            Network::BitcoinTestnet4 => "tbtc4",
            Network::BitcoinPublicSignet => "tbtcsig",
            Network::BitcoinBitGoSignet => "tbtcbgsig",
            Network::BitcoinCash => "bch",
            Network::BitcoinCashTestnet => "tbch",
            Network::Ecash => "bcha",
            Network::EcashTestnet => "tbcha",
            Network::BitcoinGold => "btg",
            Network::BitcoinGoldTestnet => "tbtg",
            Network::BitcoinSV => "bsv",
            Network::BitcoinSVTestnet => "tbsv",
            Network::Dash => "dash",
            Network::DashTestnet => "tdash",
            Network::Dogecoin => "doge",
            Network::DogecoinTestnet => "tdoge",
            Network::Litecoin => "ltc",
            Network::LitecoinTestnet => "tltc",
            Network::Zcash => "zec",
            Network::ZcashTestnet => "tzec",
        }
    }

    pub fn from_coin_name(name: &str) -> Option<Network> {
        Network::ALL
            .iter()
            .copied()
            .find(|n| n.to_coin_name() == name)
    }

    /// Network name as used by `@bitgo/utxo-lib`.
    pub fn to_utxolib_name(&self) -> &'static str {
        match self {
            Network::Bitcoin => "bitcoin",
            Network::BitcoinTestnet3 => "testnet",
            Network::BitcoinTestnet4 => "bitcoinTestnet4",
            Network::BitcoinPublicSignet => "bitcoinPublicSignet",
            Network::BitcoinBitGoSignet => "bitcoinBitGoSignet",
            Network::BitcoinCash => "bitcoincash",
            Network::BitcoinCashTestnet => "bitcoincashTestnet",
            Network::Ecash => "ecash",
            Network::EcashTestnet => "ecashTest",
            Network::BitcoinGold => "bitcoingold",
            Network::BitcoinGoldTestnet => "bitcoingoldTestnet",
            Network::BitcoinSV => "bitcoinsv",
            Network::BitcoinSVTestnet => "bitcoinsvTestnet",
            Network::Dash => "dash",
            Network::DashTestnet => "dashTest",
            Network::Dogecoin => "dogecoin",
            Network::DogecoinTestnet => "dogecoinTest",
            Network::Litecoin => "litecoin",
            Network::LitecoinTestnet => "litecoinTest",
            Network::Zcash => "zcash",
            Network::ZcashTestnet => "zcashTest",
        }
    }

    pub fn from_utxolib_name(name: &str) -> Option<Network> {
        Network::ALL
            .iter()
            .copied()
            .find(|n| n.to_utxolib_name() == name)
    }

    /// The mainnet this network belongs to. Mainnets map to themselves.
    pub fn mainnet(&self) -> Network {
        match self {
            Network::Bitcoin
            | Network::BitcoinTestnet3
            | Network::BitcoinTestnet4
            | Network::BitcoinPublicSignet
            | Network::BitcoinBitGoSignet => Network::Bitcoin,
            Network::BitcoinCash | Network::BitcoinCashTestnet => Network::BitcoinCash,
            Network::Ecash | Network::EcashTestnet => Network::Ecash,
            Network::BitcoinGold | Network::BitcoinGoldTestnet => Network::BitcoinGold,
            Network::BitcoinSV | Network::BitcoinSVTestnet => Network::BitcoinSV,
            Network::Dash | Network::DashTestnet => Network::Dash,
            Network::Dogecoin | Network::DogecoinTestnet => Network::Dogecoin,
            Network::Litecoin | Network::LitecoinTestnet => Network::Litecoin,
            Network::Zcash | Network::ZcashTestnet => Network::Zcash,
        }
    }

    pub fn is_mainnet(&self) -> bool {
        self.mainnet() == *self
    }

    pub fn is_testnet(&self) -> bool {
        !self.is_mainnet()
    }

    pub fn output_script_support(&self) -> OutputScriptSupport {
        let segwit = matches!(
            self.mainnet(),
            Network::Bitcoin | Network::Litecoin | Network::BitcoinGold
        );
        let taproot = self.mainnet() == Network::Bitcoin;
        OutputScriptSupport { segwit, taproot }
    }

    /// SIGHASH_FORKID value for networks that commit to it in their sighash.
    pub fn fork_id(&self) -> Option<u32> {
        match self.mainnet() {
            Network::BitcoinCash | Network::Ecash | Network::BitcoinSV => Some(0),
            Network::BitcoinGold => Some(79),
            _ => None,
        }
    }

    /// Networks whose transactions carry a consensus branch id (Zcash).
    pub fn is_branch_versioned(&self) -> bool {
        self.mainnet() == Network::Zcash
    }

    /// The rust-bitcoin network used for extended key serialization.
    pub fn to_bitcoin_network(&self) -> crate::bitcoin::Network {
        match self {
            Network::BitcoinPublicSignet | Network::BitcoinBitGoSignet => {
                crate::bitcoin::Network::Signet
            }
            n if n.is_testnet() => crate::bitcoin::Network::Testnet,
            _ => crate::bitcoin::Network::Bitcoin,
        }
    }

    pub fn address_params(&self) -> AddressParams {
        const BTC: AddressParams = AddressParams {
            pubkey_hash: &[0x00],
            script_hash: &[0x05],
            bech32_hrp: Some("bc"),
        };
        const TEST: AddressParams = AddressParams {
            pubkey_hash: &[0x6f],
            script_hash: &[0xc4],
            bech32_hrp: Some("tb"),
        };
        match self {
            Network::Bitcoin => BTC,
            Network::BitcoinTestnet3
            | Network::BitcoinTestnet4
            | Network::BitcoinPublicSignet
            | Network::BitcoinBitGoSignet => TEST,
            Network::BitcoinCash | Network::Ecash | Network::BitcoinSV => AddressParams {
                bech32_hrp: None,
                ..BTC
            },
            Network::BitcoinCashTestnet | Network::EcashTestnet | Network::BitcoinSVTestnet => {
                AddressParams {
                    bech32_hrp: None,
                    ..TEST
                }
            }
            Network::BitcoinGold => AddressParams {
                pubkey_hash: &[0x26],
                script_hash: &[0x17],
                bech32_hrp: Some("btg"),
            },
            Network::BitcoinGoldTestnet => AddressParams {
                bech32_hrp: Some("tbtg"),
                ..TEST
            },
            Network::Dash => AddressParams {
                pubkey_hash: &[0x4c],
                script_hash: &[0x10],
                bech32_hrp: None,
            },
            Network::DashTestnet => AddressParams {
                pubkey_hash: &[0x8c],
                script_hash: &[0x13],
                bech32_hrp: None,
            },
            Network::Dogecoin => AddressParams {
                pubkey_hash: &[0x1e],
                script_hash: &[0x16],
                bech32_hrp: None,
            },
            Network::DogecoinTestnet => AddressParams {
                pubkey_hash: &[0x71],
                script_hash: &[0xc4],
                bech32_hrp: None,
            },
            Network::Litecoin => AddressParams {
                pubkey_hash: &[0x30],
                script_hash: &[0x32],
                bech32_hrp: Some("ltc"),
            },
            Network::LitecoinTestnet => AddressParams {
                pubkey_hash: &[0x6f],
                script_hash: &[0x3a],
                bech32_hrp: Some("tltc"),
            },
            Network::Zcash => AddressParams {
                pubkey_hash: &[0x1c, 0xb8],
                script_hash: &[0x1c, 0xbd],
                bech32_hrp: None,
            },
            Network::ZcashTestnet => AddressParams {
                pubkey_hash: &[0x1d, 0x25],
                script_hash: &[0x1c, 0xba],
                bech32_hrp: None,
            },
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_utxolib_name())
    }
}

impl FromStr for Network {
    type Err = String;

    /// Accepts either a coin name (`tbtc`) or a utxolib network name (`testnet`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Network::from_coin_name(s)
            .or_else(|| Network::from_utxolib_name(s))
            .ok_or_else(|| format!("Unknown network: {}", s))
    }
}
