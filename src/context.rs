//! Explicit handle for the secp256k1 context and crate-wide defaults.
//!
//! Signing, finalization and verification take a `&Context` instead of relying on
//! process-wide state.

use crate::bitcoin::secp256k1::{All, Secp256k1};

/// Defaults applied when building containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Transaction version for non-Zcash networks when none is given.
    pub default_version: i32,
    /// nSequence used for inputs that don't specify one.
    pub default_sequence: u32,
    /// Custom MuSig2 session ids are refused on mainnets unless this is set.
    pub allow_custom_session_id_on_mainnet: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_version: 2,
            default_sequence: 0xFFFF_FFFE,
            allow_custom_session_id_on_mainnet: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Context {
    secp: Secp256k1<All>,
    config: Config,
}

impl Context {
    pub fn init() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Context {
            secp: Secp256k1::new(),
            config,
        }
    }

    pub fn secp(&self) -> &Secp256k1<All> {
        &self.secp
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::init()
    }
}
