//! `--network` argument parsing.

use wallet_utxo::Network;

/// Accepts BitGo coin names (`btc`, `tltc`, ...) and utxolib names (`bitcoin`, `testnet`, ...).
pub fn parse_network(s: &str) -> Result<Network, String> {
    s.parse::<Network>().map_err(|e| {
        let known: Vec<_> = Network::ALL.iter().map(|n| n.to_coin_name()).collect();
        format!("{} (expected one of: {})", e, known.join(", "))
    })
}
