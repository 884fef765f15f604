//! Conversion between output scripts and network address strings.
//!
//! Base58check is used for p2pkh and p2sh; bech32/bech32m for witness programs on networks
//! that define a human-readable part.

use core::fmt;

use crate::bitcoin::hashes::Hash;
use crate::bitcoin::script::{Script, ScriptBuf};
use crate::bitcoin::{base58, PubkeyHash, ScriptHash, WitnessProgram, WitnessVersion};
use crate::networks::Network;

use bech32::{Fe32, Hrp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    Base58(String),
    Bech32(String),
    /// Base58 payload with an unknown version prefix
    UnknownVersion(Vec<u8>),
    /// Bech32 address with a human-readable part for another network
    WrongHrp { expected: String, actual: String },
    /// The network has no bech32 encoding
    NoBech32(Network),
    UnsupportedScript(String),
    UnknownNetwork(String),
}

impl std::error::Error for AddressError {}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressError::Base58(s) => write!(f, "Invalid base58 address: {}", s),
            AddressError::Bech32(s) => write!(f, "Invalid bech32 address: {}", s),
            AddressError::UnknownVersion(v) => write!(f, "Unknown address version {:02x?}", v),
            AddressError::WrongHrp { expected, actual } => write!(
                f,
                "Address prefix mismatch: expected {}, got {}",
                expected, actual
            ),
            AddressError::NoBech32(n) => write!(f, "Network {} has no bech32 addresses", n),
            AddressError::UnsupportedScript(s) => {
                write!(f, "Script has no address representation: {}", s)
            }
            AddressError::UnknownNetwork(s) => write!(f, "Unknown network: {}", s),
        }
    }
}

fn encode_base58(version: &[u8], hash: &[u8]) -> String {
    let mut payload = Vec::with_capacity(version.len() + hash.len());
    payload.extend_from_slice(version);
    payload.extend_from_slice(hash);
    base58::encode_check(&payload)
}

fn encode_bech32(network: Network, version: u8, program: &[u8]) -> Result<String, AddressError> {
    let hrp = network
        .address_params()
        .bech32_hrp
        .ok_or(AddressError::NoBech32(network))?;
    let hrp = Hrp::parse(hrp).map_err(|e| AddressError::Bech32(e.to_string()))?;
    let version = Fe32::try_from(version).map_err(|e| AddressError::Bech32(e.to_string()))?;
    bech32::segwit::encode(hrp, version, program).map_err(|e| AddressError::Bech32(e.to_string()))
}

pub fn from_output_script_with_network(
    script: &Script,
    network: Network,
) -> Result<String, AddressError> {
    let params = network.address_params();
    let bytes = script.as_bytes();
    if script.is_p2pkh() {
        Ok(encode_base58(params.pubkey_hash, &bytes[3..23]))
    } else if script.is_p2sh() {
        Ok(encode_base58(params.script_hash, &bytes[2..22]))
    } else if let Some(version) = script.witness_version() {
        encode_bech32(network, version.to_num(), &bytes[2..])
    } else {
        Err(AddressError::UnsupportedScript(script.to_hex_string()))
    }
}

fn decode_base58(address: &str, network: Network) -> Result<ScriptBuf, AddressError> {
    let params = network.address_params();
    let payload = base58::decode_check(address).map_err(|e| AddressError::Base58(e.to_string()))?;
    let to_hash = |prefix: &[u8]| -> Option<[u8; 20]> {
        payload
            .strip_prefix(prefix)
            .and_then(|rest| rest.try_into().ok())
    };
    if let Some(hash) = to_hash(params.pubkey_hash) {
        return Ok(ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(hash)));
    }
    if let Some(hash) = to_hash(params.script_hash) {
        return Ok(ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(hash)));
    }
    let prefix_len = params.pubkey_hash.len().min(payload.len());
    Err(AddressError::UnknownVersion(payload[..prefix_len].to_vec()))
}

fn decode_bech32(
    address: &str,
    network: Network,
    expected: &str,
) -> Result<ScriptBuf, AddressError> {
    let (hrp, version, program) =
        bech32::segwit::decode(address).map_err(|e| AddressError::Bech32(e.to_string()))?;
    let actual = hrp.to_lowercase();
    if actual != expected {
        return Err(AddressError::WrongHrp {
            expected: expected.to_string(),
            actual,
        });
    }
    let version = WitnessVersion::try_from(version.to_u8())
        .map_err(|e| AddressError::Bech32(format!("{} ({})", e, network)))?;
    let program =
        WitnessProgram::new(version, &program).map_err(|e| AddressError::Bech32(e.to_string()))?;
    Ok(ScriptBuf::new_witness_program(&program))
}

pub fn to_output_script_with_network(
    address: &str,
    network: Network,
) -> Result<ScriptBuf, AddressError> {
    if let Some(hrp) = network.address_params().bech32_hrp {
        let lower = address.to_lowercase();
        if lower.starts_with(&format!("{}1", hrp)) {
            return decode_bech32(address, network, hrp);
        }
    }
    decode_base58(address, network)
}

pub fn from_output_script_with_coin(script: &Script, coin: &str) -> Result<String, AddressError> {
    let network =
        Network::from_coin_name(coin).ok_or_else(|| AddressError::UnknownNetwork(coin.into()))?;
    from_output_script_with_network(script, network)
}

pub fn to_output_script_with_coin(address: &str, coin: &str) -> Result<ScriptBuf, AddressError> {
    let network =
        Network::from_coin_name(coin).ok_or_else(|| AddressError::UnknownNetwork(coin.into()))?;
    to_output_script_with_network(address, network)
}
