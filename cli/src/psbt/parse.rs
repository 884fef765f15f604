use std::path::Path;

use anyhow::{Context, Result};
use wallet_utxo::bitcoin::CompressedPublicKey;
use wallet_utxo::fixed_script_wallet::bitgo_psbt::BitGoPsbt;
use wallet_utxo::fixed_script_wallet::ReplayProtection;
use wallet_utxo::Network;

use super::load_psbt_bytes;
use crate::wallet::parse_wallet_keys;

fn load_psbt(path: &Path, network: Network) -> Result<BitGoPsbt> {
    let bytes = load_psbt_bytes(path)?;
    BitGoPsbt::deserialize(&bytes, network)
        .with_context(|| format!("Failed to deserialize {} PSBT", network))
}

fn parse_replay_protection(keys: &[String]) -> Result<ReplayProtection> {
    let keys = keys
        .iter()
        .map(|key| {
            let bytes = hex::decode(key).context("Replay protection key is not hex")?;
            CompressedPublicKey::from_slice(&bytes)
                .with_context(|| format!("Invalid replay protection key {}", key))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ReplayProtection::from_public_keys(&keys))
}

pub fn handle_parse_command(
    path: &Path,
    network: Network,
    xpubs: &[String],
    replay_protection_keys: &[String],
) -> Result<()> {
    let psbt = load_psbt(path, network)?;
    let wallet = parse_wallet_keys(xpubs)?;
    let replay_protection = parse_replay_protection(replay_protection_keys)?;
    let parsed = psbt
        .parse_transaction_with_wallet_keys(&wallet, &replay_protection)
        .context("PSBT does not belong to the wallet")?;
    println!("{}", serde_json::to_string_pretty(&parsed.to_json())?);
    Ok(())
}

pub fn handle_legacy_command(path: &Path, network: Network) -> Result<()> {
    let psbt = load_psbt(path, network)?;
    let tx = psbt
        .get_half_signed_legacy_format()
        .context("PSBT has no half-signed legacy encoding")?;
    println!("{}", hex::encode(tx));
    Ok(())
}
