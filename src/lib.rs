mod address;
pub mod bip322;
pub mod context;
mod error;
pub mod fixed_script_wallet;
mod networks;
pub mod zcash;

// re-export bitcoin from the miniscript crate
pub use ::miniscript::bitcoin;

pub use address::{
    from_output_script_with_coin, from_output_script_with_network, to_output_script_with_coin,
    to_output_script_with_network, AddressError,
};
pub use context::{Config, Context};
pub use error::{Error, Result};
pub use networks::{Network, OutputScriptSupport};
