//! Overwintered (v3/v4) Zcash transaction encoding.
//!
//! An overwintered transaction is a Bitcoin transaction with the high bit of the version set,
//! a version group id after the version, and an expiry height plus shielded fields after the
//! lock time. Only the transparent part is modelled; the trailing bytes are carried verbatim.

use core::fmt;

use crate::bitcoin::consensus::{Decodable, Encodable};
use crate::bitcoin::hashes::{sha256d, Hash};
use crate::bitcoin::locktime::absolute::LockTime;
use crate::bitcoin::transaction::Version;
use crate::bitcoin::{Transaction, TxIn, TxOut, Txid};

pub const OVERWINTERED_FLAG: u32 = 0x8000_0000;

pub const SAPLING_VERSION_GROUP_ID: u32 = 0x892F_2085;

/// valueBalance (8) and empty spend, output and joinsplit vectors.
pub const EMPTY_SAPLING_FIELDS: [u8; 11] = [0u8; 11];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZcashTxError(String);

impl fmt::Display for ZcashTxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ZcashTxError {}

fn field<T, E: fmt::Display>(name: &str, r: Result<T, E>) -> Result<T, ZcashTxError> {
    r.map_err(|e| ZcashTxError(format!("{}: {}", name, e)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverwinterFields {
    pub version_group_id: u32,
    pub expiry_height: u32,
    /// Everything after the expiry height, kept so re-encoding is byte-exact.
    pub sapling_fields: Vec<u8>,
}

impl OverwinterFields {
    pub fn sapling(expiry_height: u32) -> Self {
        OverwinterFields {
            version_group_id: SAPLING_VERSION_GROUP_ID,
            expiry_height,
            sapling_fields: EMPTY_SAPLING_FIELDS.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZcashTransaction {
    /// Transparent part; the version has the overwintered bit cleared.
    pub transaction: Transaction,
    pub overwinter: Option<OverwinterFields>,
}

impl ZcashTransaction {
    pub fn decode(bytes: &[u8]) -> Result<Self, ZcashTxError> {
        let mut r = bytes;
        let header = field("version", u32::consensus_decode(&mut r))?;
        let overwintered = header & OVERWINTERED_FLAG != 0;
        let version_group_id = if overwintered {
            Some(field("version_group_id", u32::consensus_decode(&mut r))?)
        } else {
            None
        };
        let input = field("inputs", Vec::<TxIn>::consensus_decode(&mut r))?;
        let output = field("outputs", Vec::<TxOut>::consensus_decode(&mut r))?;
        let lock_time = field("lock_time", LockTime::consensus_decode(&mut r))?;

        let overwinter = match version_group_id {
            Some(version_group_id) => Some(OverwinterFields {
                version_group_id,
                expiry_height: field("expiry_height", u32::consensus_decode(&mut r))?,
                sapling_fields: r.to_vec(),
            }),
            None if !r.is_empty() => {
                return Err(ZcashTxError(format!("{} trailing bytes", r.len())));
            }
            None => None,
        };

        Ok(ZcashTransaction {
            transaction: Transaction {
                version: Version::non_standard((header & !OVERWINTERED_FLAG) as i32),
                input,
                output,
                lock_time,
            },
            overwinter,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, ZcashTxError> {
        let tx = &self.transaction;
        let version = u32::try_from(tx.version.0)
            .map_err(|_| ZcashTxError(format!("negative version {}", tx.version.0)))?;
        let mut out = Vec::new();
        match &self.overwinter {
            Some(ow) => {
                field("version", (version | OVERWINTERED_FLAG).consensus_encode(&mut out))?;
                field("version_group_id", ow.version_group_id.consensus_encode(&mut out))?;
            }
            None => {
                field("version", version.consensus_encode(&mut out))?;
            }
        }
        field("inputs", tx.input.consensus_encode(&mut out))?;
        field("outputs", tx.output.consensus_encode(&mut out))?;
        field("lock_time", tx.lock_time.consensus_encode(&mut out))?;
        if let Some(ow) = &self.overwinter {
            field("expiry_height", ow.expiry_height.consensus_encode(&mut out))?;
            out.extend_from_slice(&ow.sapling_fields);
        }
        Ok(out)
    }

    /// Double-SHA256 over the full encoding (pre-v5 txid rule).
    pub fn txid(&self) -> Result<Txid, ZcashTxError> {
        let bytes = self.encode()?;
        Ok(Txid::from_raw_hash(sha256d::Hash::hash(&bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Witness};

    fn sample() -> ZcashTransaction {
        ZcashTransaction {
            transaction: Transaction {
                version: Version::non_standard(4),
                input: vec![TxIn {
                    previous_output: OutPoint::null(),
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::MAX,
                    witness: Witness::new(),
                }],
                output: vec![TxOut {
                    value: Amount::from_sat(1000),
                    script_pubkey: ScriptBuf::new_op_return([0u8; 4]),
                }],
                lock_time: LockTime::ZERO,
            },
            overwinter: Some(OverwinterFields::sapling(1_000_000)),
        }
    }

    #[test]
    fn test_overwintered_header() {
        let bytes = sample().encode().unwrap();
        assert_eq!(&bytes[..8], &hex::decode("0400008085202f89").unwrap()[..]);
        assert_eq!(&bytes[bytes.len() - 11..], &EMPTY_SAPLING_FIELDS);
        assert_eq!(ZcashTransaction::decode(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_plain_rejects_trailing_bytes() {
        let mut tx = sample();
        tx.overwinter = None;
        tx.transaction.version = Version::ONE;
        let mut bytes = tx.encode().unwrap();
        assert_eq!(ZcashTransaction::decode(&bytes).unwrap(), tx);
        bytes.push(0);
        assert!(ZcashTransaction::decode(&bytes).is_err());
    }

    #[test]
    fn test_txid_differs_from_bitcoin_txid() {
        let tx = sample();
        assert_ne!(tx.txid().unwrap(), tx.transaction.compute_txid());
    }
}
