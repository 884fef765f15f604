//! Zcash PSBTs carry the overwintered transaction in the global unsigned-tx field.
//!
//! rust-bitcoin's codec only understands the plain layout, so the field is rewritten on the
//! way in and out while every other key-value pair is copied through untouched.

use crate::bitcoin::consensus::encode::{self, VarInt};
use crate::bitcoin::consensus::Decodable;
use crate::bitcoin::psbt::Psbt;
use crate::zcash::transaction::{OverwinterFields, ZcashTransaction};

use super::propkv::get_zec_consensus_branch_id;
use super::{DeserializeError, SerializeError};

const PSBT_MAGIC: &[u8; 5] = b"psbt\xff";

/// Key of the global unsigned transaction: length 1, type 0x00.
const UNSIGNED_TX_KEY: &[u8] = &[0x00];

fn take<'a>(r: &mut &'a [u8], n: usize, what: &str) -> Result<&'a [u8], String> {
    if r.len() < n {
        return Err(format!("Unexpected end of PSBT reading {}", what));
    }
    let (head, tail) = r.split_at(n);
    *r = tail;
    Ok(head)
}

fn read_len(r: &mut &[u8], what: &str) -> Result<usize, String> {
    let len = VarInt::consensus_decode(r).map_err(|e| format!("{} length: {}", what, e))?;
    usize::try_from(len.0).map_err(|_| format!("{} length {} too large", what, len.0))
}

fn write_slice(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend(encode::serialize(&VarInt(bytes.len() as u64)));
    out.extend_from_slice(bytes);
}

/// Copies `bytes`, replacing the value of the global unsigned-tx pair with `rewrite(value)`.
fn rewrite_unsigned_tx<F>(bytes: &[u8], rewrite: F) -> Result<Vec<u8>, String>
where
    F: FnOnce(&[u8]) -> Result<Vec<u8>, String>,
{
    let mut r = bytes;
    if take(&mut r, PSBT_MAGIC.len(), "magic")? != PSBT_MAGIC {
        return Err("Invalid PSBT magic".to_string());
    }
    let mut out = PSBT_MAGIC.to_vec();
    let mut rewrite = Some(rewrite);

    loop {
        let key_len = read_len(&mut r, "key")?;
        if key_len == 0 {
            out.push(0x00);
            break;
        }
        let key = take(&mut r, key_len, "key")?;
        let value_len = read_len(&mut r, "value")?;
        let value = take(&mut r, value_len, "value")?;

        write_slice(&mut out, key);
        if key == UNSIGNED_TX_KEY {
            let f = rewrite
                .take()
                .ok_or("Duplicate unsigned transaction in PSBT")?;
            write_slice(&mut out, &f(value)?);
        } else {
            write_slice(&mut out, value);
        }
    }

    if rewrite.is_some() {
        return Err("Missing unsigned transaction in PSBT".to_string());
    }
    out.extend_from_slice(r);
    Ok(out)
}

/// Decodes a Zcash PSBT into the plain PSBT and the overwinter fields of its transaction.
pub fn deserialize(bytes: &[u8]) -> Result<(Psbt, OverwinterFields), DeserializeError> {
    let mut overwinter = None;
    let plain = rewrite_unsigned_tx(bytes, |value| {
        let tx = ZcashTransaction::decode(value).map_err(|e| e.to_string())?;
        overwinter = tx.overwinter;
        ZcashTransaction {
            transaction: tx.transaction,
            overwinter: None,
        }
        .encode()
        .map_err(|e| e.to_string())
    })
    .map_err(DeserializeError::Network)?;

    let overwinter = overwinter.ok_or_else(|| {
        DeserializeError::Network("Zcash PSBT transaction is not overwintered".to_string())
    })?;
    let psbt = Psbt::deserialize(&plain)?;
    if get_zec_consensus_branch_id(&psbt).is_none() {
        return Err(DeserializeError::Network(
            "Missing ZecConsensusBranchId in PSBT proprietary map".to_string(),
        ));
    }
    Ok((psbt, overwinter))
}

/// Encodes `psbt` with its unsigned transaction in overwintered form.
pub fn serialize(psbt: &Psbt, overwinter: &OverwinterFields) -> Result<Vec<u8>, SerializeError> {
    rewrite_unsigned_tx(&psbt.serialize(), |_| {
        ZcashTransaction {
            transaction: psbt.unsigned_tx.clone(),
            overwinter: Some(overwinter.clone()),
        }
        .encode()
        .map_err(|e| e.to_string())
    })
    .map_err(SerializeError::Network)
}
