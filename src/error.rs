use core::fmt;

use crate::address::AddressError;
use crate::fixed_script_wallet::bitgo_psbt::p2tr_musig2_input::Musig2Error;
use crate::fixed_script_wallet::bitgo_psbt::{
    DeserializeError, ParseTransactionError, SerializeError,
};
use crate::fixed_script_wallet::wallet_scripts::WalletScriptsError;
use crate::fixed_script_wallet::WalletKeysError;

/// Main error type for wallet-utxo operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// PSBT or transaction bytes could not be decoded
    DeserializationFailure(String),
    /// Chain code outside of the known set
    UnknownChainCode(u32),
    /// Input does not belong to the wallet (or is otherwise malformed)
    WalletValidationFailure { index: usize, message: String },
    /// Finalization found the wrong number of signatures
    SignatureCountMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },
    IndexOutOfBounds { index: usize, len: usize },
    UnsupportedScriptType(String),
    /// A MuSig2 input is missing a participant nonce
    NonceExchangeIncomplete { index: usize },
    Bip322TagMismatch(String),
    Bip322NoValidSignatures,
    InvalidBranchIdSpecification(String),
    Signing(String),
    Address(AddressError),
    InvalidInput(String),
    Network(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DeserializationFailure(s) => write!(f, "Deserialization failed: {}", s),
            Error::UnknownChainCode(chain) => write!(f, "Unknown chain code: {}", chain),
            Error::WalletValidationFailure { index, message } => {
                write!(f, "Input {} failed wallet validation: {}", index, message)
            }
            Error::SignatureCountMismatch {
                index,
                expected,
                actual,
            } => write!(
                f,
                "Input {}: expected {} signatures, found {}",
                index, expected, actual
            ),
            Error::IndexOutOfBounds { index, len } => {
                write!(f, "Index {} out of bounds (length {})", index, len)
            }
            Error::UnsupportedScriptType(s) => write!(f, "Unsupported script type: {}", s),
            Error::NonceExchangeIncomplete { index } => {
                write!(f, "Input {}: MuSig2 nonce exchange incomplete", index)
            }
            Error::Bip322TagMismatch(s) => write!(f, "BIP322 verification failed: {}", s),
            Error::Bip322NoValidSignatures => {
                write!(f, "BIP322 verification failed: no valid signatures")
            }
            Error::InvalidBranchIdSpecification(s) => {
                write!(f, "Invalid consensus branch id specification: {}", s)
            }
            Error::Signing(s) => write!(f, "Signing error: {}", s),
            Error::Address(e) => write!(f, "Address error: {}", e),
            Error::InvalidInput(s) => write!(f, "Invalid input: {}", s),
            Error::Network(s) => write!(f, "Network error: {}", s),
        }
    }
}

impl From<AddressError> for Error {
    fn from(err: AddressError) -> Self {
        Error::Address(err)
    }
}

impl From<DeserializeError> for Error {
    fn from(err: DeserializeError) -> Self {
        match err {
            DeserializeError::Network(s) => Error::Network(s),
            other => Error::DeserializationFailure(other.to_string()),
        }
    }
}

impl From<SerializeError> for Error {
    fn from(err: SerializeError) -> Self {
        Error::InvalidInput(err.to_string())
    }
}

impl From<ParseTransactionError> for Error {
    fn from(err: ParseTransactionError) -> Self {
        match err {
            ParseTransactionError::Input { index, error } => Error::WalletValidationFailure {
                index,
                message: error.to_string(),
            },
            other => Error::InvalidInput(other.to_string()),
        }
    }
}

impl From<WalletScriptsError> for Error {
    fn from(err: WalletScriptsError) -> Self {
        match err {
            WalletScriptsError::UnknownChainCode(chain) => Error::UnknownChainCode(chain),
            other => Error::UnsupportedScriptType(other.to_string()),
        }
    }
}

impl From<WalletKeysError> for Error {
    fn from(err: WalletKeysError) -> Self {
        Error::InvalidInput(err.to_string())
    }
}

impl From<Musig2Error> for Error {
    fn from(err: Musig2Error) -> Self {
        Error::Signing(err.to_string())
    }
}
