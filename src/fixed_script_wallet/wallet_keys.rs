use core::fmt;
use std::str::FromStr;

use crate::bitcoin::bip32::{ChildNumber, DerivationPath, Xpub};
use crate::bitcoin::secp256k1::Secp256k1;
use crate::bitcoin::CompressedPublicKey;
use crate::fixed_script_wallet::bitgo_psbt::SignerKey;

pub type XpubTriple = [Xpub; 3];

pub type PubTriple = [CompressedPublicKey; 3];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletKeysError {
    /// Chain or index is not a valid unhardened child number
    InvalidIndex(u32),
    Derivation(String),
    InvalidXpub(String),
    WrongKeyCount(usize),
}

impl fmt::Display for WalletKeysError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletKeysError::InvalidIndex(i) => write!(f, "Invalid derivation index: {}", i),
            WalletKeysError::Derivation(s) => write!(f, "Error deriving xpub: {}", s),
            WalletKeysError::InvalidXpub(s) => write!(f, "Invalid xpub: {}", s),
            WalletKeysError::WrongKeyCount(n) => write!(f, "Expected 3 xpubs, got {}", n),
        }
    }
}

impl std::error::Error for WalletKeysError {}

pub fn to_pub_triple(xpubs: &XpubTriple) -> PubTriple {
    [xpubs[0].to_pub(), xpubs[1].to_pub(), xpubs[2].to_pub()]
}

fn normal_child(index: u32) -> Result<ChildNumber, WalletKeysError> {
    ChildNumber::from_normal_idx(index).map_err(|_| WalletKeysError::InvalidIndex(index))
}

pub fn derivation_path(
    prefix: &DerivationPath,
    chain: u32,
    index: u32,
) -> Result<DerivationPath, WalletKeysError> {
    Ok(prefix
        .child(normal_child(chain)?)
        .child(normal_child(index)?))
}

fn default_prefix() -> DerivationPath {
    DerivationPath::from(vec![ChildNumber::Normal { index: 0 }, ChildNumber::Normal { index: 0 }])
}

/// The user, backup and bitgo keys of a fixed-script wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootWalletKeys {
    pub xpubs: XpubTriple,
    pub derivation_prefixes: [DerivationPath; 3],
}

impl RootWalletKeys {
    pub fn new_with_derivation_prefixes(
        xpubs: XpubTriple,
        derivation_prefixes: [DerivationPath; 3],
    ) -> Self {
        Self {
            xpubs,
            derivation_prefixes,
        }
    }

    /// Keys with the default `m/0/0` prefix.
    pub fn new(xpubs: XpubTriple) -> Self {
        Self::new_with_derivation_prefixes(
            xpubs,
            [default_prefix(), default_prefix(), default_prefix()],
        )
    }

    pub fn from_xpub_strings(xpubs: &[&str]) -> Result<Self, WalletKeysError> {
        let parsed = xpubs
            .iter()
            .map(|s| Xpub::from_str(s).map_err(|e| WalletKeysError::InvalidXpub(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        let triple: XpubTriple = parsed
            .try_into()
            .map_err(|v: Vec<Xpub>| WalletKeysError::WrongKeyCount(v.len()))?;
        Ok(Self::new(triple))
    }

    pub fn user_key(&self) -> &Xpub {
        &self.xpubs[0]
    }

    pub fn backup_key(&self) -> &Xpub {
        &self.xpubs[1]
    }

    pub fn bitgo_key(&self) -> &Xpub {
        &self.xpubs[2]
    }

    pub fn xpub(&self, key: SignerKey) -> &Xpub {
        &self.xpubs[key.index()]
    }

    pub fn derivation_paths(
        &self,
        chain: u32,
        index: u32,
    ) -> Result<[DerivationPath; 3], WalletKeysError> {
        let [a, b, c] = &self.derivation_prefixes;
        Ok([
            derivation_path(a, chain, index)?,
            derivation_path(b, chain, index)?,
            derivation_path(c, chain, index)?,
        ])
    }

    pub fn derive_for_chain_and_index(
        &self,
        chain: u32,
        index: u32,
    ) -> Result<XpubTriple, WalletKeysError> {
        let paths = self.derivation_paths(chain, index)?;
        let secp = Secp256k1::verification_only();
        let derive = |i: usize| {
            self.xpubs[i]
                .derive_pub(&secp, &paths[i])
                .map_err(|e| WalletKeysError::Derivation(e.to_string()))
        };
        Ok([derive(0)?, derive(1)?, derive(2)?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_script_wallet::test_utils::get_test_wallet_keys;

    #[test]
    fn test_derive() {
        let keys = get_test_wallet_keys("test");
        let derived = keys.derive_for_chain_and_index(0, 0).unwrap();
        assert_eq!(derived[0].depth, 4);
        assert_ne!(derived[0], derived[1]);
        assert_eq!(
            keys.derivation_paths(20, 7).unwrap()[2],
            DerivationPath::from_str("m/0/0/20/7").unwrap()
        );
    }

    #[test]
    fn test_invalid_index() {
        let keys = get_test_wallet_keys("test");
        assert_eq!(
            keys.derive_for_chain_and_index(0, 1 << 31),
            Err(WalletKeysError::InvalidIndex(1 << 31))
        );
        assert_eq!(
            keys.derive_for_chain_and_index(u32::MAX, 0),
            Err(WalletKeysError::InvalidIndex(u32::MAX))
        );
    }

    #[test]
    fn test_from_xpub_strings() {
        let keys = get_test_wallet_keys("test");
        let strings: Vec<String> = keys.xpubs.iter().map(|x| x.to_string()).collect();
        let refs: Vec<&str> = strings.iter().map(|s| s.as_str()).collect();
        assert_eq!(RootWalletKeys::from_xpub_strings(&refs).unwrap(), keys);
        assert_eq!(
            RootWalletKeys::from_xpub_strings(&refs[..2]),
            Err(WalletKeysError::WrongKeyCount(2))
        );
        assert!(matches!(
            RootWalletKeys::from_xpub_strings(&["xpub", "b", "c"]),
            Err(WalletKeysError::InvalidXpub(_))
        ));
    }

    #[test]
    fn test_xpub_by_signer() {
        let keys = get_test_wallet_keys("test");
        assert_eq!(keys.xpub(SignerKey::User), keys.user_key());
        assert_eq!(keys.xpub(SignerKey::Backup), keys.backup_key());
        assert_eq!(keys.xpub(SignerKey::Bitgo), keys.bitgo_key());
    }
}
