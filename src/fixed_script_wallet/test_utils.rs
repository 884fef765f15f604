//! Deterministic keys and outpoints shared by the unit tests.

use crate::bitcoin::bip32::{Xpriv, Xpub};
use crate::bitcoin::hashes::{sha256, Hash};
use crate::bitcoin::secp256k1::Secp256k1;
use crate::bitcoin::{OutPoint, Txid};
use crate::fixed_script_wallet::RootWalletKeys;

pub type XprivTriple = [Xpriv; 3];

pub fn get_xpriv_from_seed(seed: &str) -> Xpriv {
    let seed_hash = sha256::Hash::hash(seed.as_bytes()).to_byte_array();
    Xpriv::new_master(crate::bitcoin::Network::Testnet, &seed_hash)
        .expect("could not create xpriv from seed")
}

/// Seeds `{seed}/0`, `{seed}/1` and `{seed}/2` for user, backup and bitgo.
pub fn get_test_wallet_xprvs(seed: &str) -> XprivTriple {
    [0, 1, 2].map(|i| get_xpriv_from_seed(&format!("{}/{}", seed, i)))
}

pub fn get_test_wallet_keys(seed: &str) -> RootWalletKeys {
    let secp = Secp256k1::new();
    RootWalletKeys::new(get_test_wallet_xprvs(seed).map(|x| Xpub::from_priv(&secp, &x)))
}

/// An outpoint whose txid is derived from `n`.
pub fn test_outpoint(n: u32) -> OutPoint {
    OutPoint {
        txid: Txid::from_byte_array(sha256::Hash::hash(&n.to_le_bytes()).to_byte_array()),
        vout: n,
    }
}
