use anyhow::{Context, Result};
use clap::Subcommand;
use wallet_utxo::fixed_script_wallet::{Chain, RootWalletKeys, WalletScripts};
use wallet_utxo::{from_output_script_with_network, Network};

use crate::network::parse_network;

#[derive(Subcommand)]
pub enum WalletCommand {
    /// Print the address of a wallet script
    Address {
        /// User, backup and bitgo xpubs, in that order
        #[arg(long, num_args = 3, required = true)]
        xpubs: Vec<String>,
        #[arg(long)]
        chain: u32,
        #[arg(long)]
        index: u32,
        #[arg(short, long, value_parser = parse_network)]
        network: Network,
    },
}

pub fn parse_wallet_keys(xpubs: &[String]) -> Result<RootWalletKeys> {
    let xpubs: Vec<&str> = xpubs.iter().map(String::as_str).collect();
    RootWalletKeys::from_xpub_strings(&xpubs).context("Invalid wallet xpubs")
}

pub fn wallet_address(
    wallet: &RootWalletKeys,
    chain: u32,
    index: u32,
    network: Network,
) -> Result<String> {
    let chain = Chain::try_from(chain).context("Invalid chain code")?;
    let scripts =
        WalletScripts::from_wallet_keys(wallet, chain, index, &network.output_script_support())
            .with_context(|| format!("Cannot derive {} script on {}", chain.script_type, network))?;
    from_output_script_with_network(&scripts.output_script(), network)
        .context("Failed to encode wallet script")
}

pub fn handle_command(command: WalletCommand) -> Result<()> {
    match command {
        WalletCommand::Address {
            xpubs,
            chain,
            index,
            network,
        } => {
            let wallet = parse_wallet_keys(&xpubs)?;
            println!("{}", wallet_address(&wallet, chain, index, network)?);
        }
    }
    Ok(())
}
