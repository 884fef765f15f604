use anyhow::{Context, Result};
use clap::Subcommand;
use wallet_utxo::bitcoin::Script;
use wallet_utxo::{from_output_script_with_network, to_output_script_with_network, Network};

use crate::network::parse_network;

#[derive(Subcommand)]
pub enum AddressCommand {
    /// Print the output script (hex) of an address
    Decode {
        address: String,
        #[arg(short, long, value_parser = parse_network)]
        network: Network,
    },
    /// Print the address of an output script given as hex
    Encode {
        script: String,
        #[arg(short, long, value_parser = parse_network)]
        network: Network,
    },
}

pub fn handle_command(command: AddressCommand) -> Result<()> {
    match command {
        AddressCommand::Decode { address, network } => {
            let script = to_output_script_with_network(&address, network)
                .with_context(|| format!("Failed to decode {} address {}", network, address))?;
            println!("{}", hex::encode(script.as_bytes()));
        }
        AddressCommand::Encode { script, network } => {
            let bytes = hex::decode(&script).context("Output script is not valid hex")?;
            let address = from_output_script_with_network(Script::from_bytes(&bytes), network)
                .with_context(|| format!("Script {} has no {} address", script, network))?;
            println!("{}", address);
        }
    }
    Ok(())
}
