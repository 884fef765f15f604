use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::Engine;
use clap::Subcommand;
use wallet_utxo::Network;

use crate::network::parse_network;

mod parse;

const PSBT_MAGIC: &[u8] = b"psbt\xff";

#[derive(Subcommand)]
pub enum PsbtCommand {
    /// Parse a PSBT against a wallet and print inputs, outputs, fee and spend amount as JSON
    Parse {
        /// PSBT file as raw bytes, hex or base64 ('-' for stdin)
        path: PathBuf,
        #[arg(short, long, value_parser = parse_network)]
        network: Network,
        /// User, backup and bitgo xpubs, in that order
        #[arg(long, num_args = 3, required = true)]
        xpubs: Vec<String>,
        /// Compressed public keys (hex) of permitted replay protection inputs
        #[arg(long = "replay-protection-key")]
        replay_protection_keys: Vec<String>,
    },
    /// Print the half-signed legacy encoding of a PSBT as hex
    Legacy {
        path: PathBuf,
        #[arg(short, long, value_parser = parse_network)]
        network: Network,
    },
}

pub fn handle_command(command: PsbtCommand) -> Result<()> {
    match command {
        PsbtCommand::Parse {
            path,
            network,
            xpubs,
            replay_protection_keys,
        } => parse::handle_parse_command(&path, network, &xpubs, &replay_protection_keys),
        PsbtCommand::Legacy { path, network } => parse::handle_legacy_command(&path, network),
    }
}

fn read_input_bytes(path: &Path) -> Result<Vec<u8>> {
    let mut bytes = vec![];
    if path == Path::new("-") {
        std::io::stdin()
            .read_to_end(&mut bytes)
            .context("Failed to read PSBT from stdin")?;
    } else {
        bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read PSBT from {}", path.display()))?;
    }
    Ok(bytes)
}

/// Raw PSBT bytes are passed through; text is decoded as hex, then base64.
fn decode_input(bytes: &[u8]) -> Result<Vec<u8>> {
    if bytes.starts_with(PSBT_MAGIC) {
        return Ok(bytes.to_vec());
    }
    let text = std::str::from_utf8(bytes)
        .context("Input is neither a binary PSBT nor text")?
        .trim();
    if let Ok(decoded) = hex::decode(text) {
        return Ok(decoded);
    }
    base64::engine::general_purpose::STANDARD
        .decode(text)
        .context("Input is neither hex nor base64")
}

pub(crate) fn load_psbt_bytes(path: &Path) -> Result<Vec<u8>> {
    let bytes = read_input_bytes(path)?;
    let decoded = decode_input(&bytes)?;
    tracing::debug!(path = %path.display(), len = decoded.len(), "loaded psbt");
    Ok(decoded)
}
