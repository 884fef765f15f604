use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod address;
mod network;
mod psbt;
mod wallet;

#[derive(Parser)]
#[command(
    name = "wallet-utxo-cli",
    about = "Inspect BitGo fixed-script wallet PSBTs and addresses"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert between addresses and output scripts
    #[command(subcommand)]
    Address(address::AddressCommand),
    /// Derive wallet scripts
    #[command(subcommand)]
    Wallet(wallet::WalletCommand),
    /// Inspect PSBTs
    #[command(subcommand)]
    Psbt(psbt::PsbtCommand),
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_logging();
    match Cli::parse().command {
        Commands::Address(command) => address::handle_command(command),
        Commands::Wallet(command) => wallet::handle_command(command),
        Commands::Psbt(command) => psbt::handle_command(command),
    }
}
