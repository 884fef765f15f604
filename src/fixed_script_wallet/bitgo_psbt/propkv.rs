//! BitGo proprietary key-values (`0xfc` + `BITGO` + subtype).

use std::collections::BTreeMap;

use crate::bitcoin::psbt::raw::Key;
use crate::bitcoin::psbt::Psbt;

pub use crate::bitcoin::psbt::raw::ProprietaryKey;

/// BitGo proprietary key identifier
pub const BITGO: &[u8] = b"BITGO";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProprietaryKeySubtype {
    ZecConsensusBranchId = 0x00,
    Musig2ParticipantPubKeys = 0x01,
    Musig2PubNonce = 0x02,
    Musig2PartialSig = 0x03,
    Bip322Message = 0x05,
}

impl ProprietaryKeySubtype {
    pub fn from(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(ProprietaryKeySubtype::ZecConsensusBranchId),
            0x01 => Some(ProprietaryKeySubtype::Musig2ParticipantPubKeys),
            0x02 => Some(ProprietaryKeySubtype::Musig2PubNonce),
            0x03 => Some(ProprietaryKeySubtype::Musig2PartialSig),
            0x05 => Some(ProprietaryKeySubtype::Bip322Message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitGoKeyValue {
    pub subtype: ProprietaryKeySubtype,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl BitGoKeyValue {
    pub fn new(subtype: ProprietaryKeySubtype, key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            subtype,
            key,
            value,
        }
    }

    /// `None` for foreign prefixes and subtypes we don't know.
    pub fn from_key_value(key: &ProprietaryKey, value: &[u8]) -> Option<Self> {
        if !is_bitgo_key(key) {
            return None;
        }
        ProprietaryKeySubtype::from(key.subtype)
            .map(|subtype| Self::new(subtype, key.key.clone(), value.to_vec()))
    }

    pub fn to_key_value(&self) -> (ProprietaryKey, Vec<u8>) {
        let key = ProprietaryKey {
            prefix: BITGO.to_vec(),
            subtype: self.subtype as u8,
            key: self.key.clone(),
        };
        (key, self.value.clone())
    }

    pub fn insert_into(&self, map: &mut BTreeMap<ProprietaryKey, Vec<u8>>) {
        let (key, value) = self.to_key_value();
        map.insert(key, value);
    }
}

pub fn find_kv<'a>(
    subtype: ProprietaryKeySubtype,
    map: &'a BTreeMap<ProprietaryKey, Vec<u8>>,
) -> impl Iterator<Item = BitGoKeyValue> + 'a {
    map.iter()
        .filter(move |(k, _)| is_bitgo_key(k) && k.subtype == subtype as u8)
        .filter_map(|(k, v)| BitGoKeyValue::from_key_value(k, v))
}

pub fn is_bitgo_key(key: &ProprietaryKey) -> bool {
    key.prefix.as_slice() == BITGO
}

pub fn is_musig2_key(key: &ProprietaryKey) -> bool {
    is_bitgo_key(key)
        && matches!(
            ProprietaryKeySubtype::from(key.subtype),
            Some(
                ProprietaryKeySubtype::Musig2ParticipantPubKeys
                    | ProprietaryKeySubtype::Musig2PubNonce
                    | ProprietaryKeySubtype::Musig2PartialSig
            )
        )
}

/// Raw key under which older encoders left the branch id: `0xfc`, then
/// `varint(5) || "BITGO" || 0x00` as key data.
fn unparsed_branch_id_key() -> Key {
    Key {
        type_value: 0xfc,
        key: [&[BITGO.len() as u8][..], BITGO, &[0x00]].concat(),
    }
}

fn le_u32(value: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = value.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Zcash consensus branch id from the global map.
///
/// The proprietary entry wins over a raw `unknown` entry with the same key.
pub fn get_zec_consensus_branch_id(psbt: &Psbt) -> Option<u32> {
    find_kv(ProprietaryKeySubtype::ZecConsensusBranchId, &psbt.proprietary)
        .find_map(|kv| le_u32(&kv.value))
        .or_else(|| {
            psbt.unknown
                .get(&unparsed_branch_id_key())
                .and_then(|v| le_u32(v))
        })
}

pub fn set_zec_consensus_branch_id(psbt: &mut Psbt, branch_id: u32) {
    psbt.unknown.remove(&unparsed_branch_id_key());
    BitGoKeyValue::new(
        ProprietaryKeySubtype::ZecConsensusBranchId,
        vec![],
        branch_id.to_le_bytes().to_vec(),
    )
    .insert_into(&mut psbt.proprietary);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin::locktime::absolute::LockTime;
    use crate::bitcoin::transaction::Version;
    use crate::bitcoin::Transaction;
    use crate::zcash::NetworkUpgrade;

    fn empty_psbt() -> Psbt {
        Psbt::from_unsigned_tx(Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![],
            output: vec![],
        })
        .unwrap()
    }

    #[test]
    fn test_find_kv_skips_foreign_and_unknown_subtypes() {
        let mut map = BTreeMap::new();
        map.insert(
            ProprietaryKey {
                prefix: b"OTHER".to_vec(),
                subtype: 0x03,
                key: vec![1],
            },
            vec![1],
        );
        map.insert(
            ProprietaryKey {
                prefix: BITGO.to_vec(),
                subtype: 0x04,
                key: vec![2],
            },
            vec![2],
        );
        BitGoKeyValue::new(ProprietaryKeySubtype::Musig2PartialSig, vec![3], vec![3])
            .insert_into(&mut map);

        let found: Vec<_> = find_kv(ProprietaryKeySubtype::Musig2PartialSig, &map).collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, vec![3]);
        assert_eq!(find_kv(ProprietaryKeySubtype::Bip322Message, &map).count(), 0);
    }

    #[test]
    fn test_is_musig2_key() {
        let (key, _) = BitGoKeyValue::new(ProprietaryKeySubtype::Musig2PubNonce, vec![], vec![])
            .to_key_value();
        assert!(is_musig2_key(&key));
        let (key, _) =
            BitGoKeyValue::new(ProprietaryKeySubtype::Bip322Message, vec![], vec![]).to_key_value();
        assert!(!is_musig2_key(&key));
    }

    #[test]
    fn test_branch_id_roundtrip() {
        let mut psbt = empty_psbt();
        assert_eq!(get_zec_consensus_branch_id(&psbt), None);
        set_zec_consensus_branch_id(&mut psbt, NetworkUpgrade::Nu5.branch_id());
        assert_eq!(
            get_zec_consensus_branch_id(&psbt),
            Some(NetworkUpgrade::Nu5.branch_id())
        );
        set_zec_consensus_branch_id(&mut psbt, NetworkUpgrade::Sapling.branch_id());
        assert_eq!(
            get_zec_consensus_branch_id(&psbt),
            Some(NetworkUpgrade::Sapling.branch_id())
        );
    }

    #[test]
    fn test_branch_id_from_unparsed_entry() {
        let mut psbt = empty_psbt();
        psbt.unknown.insert(
            unparsed_branch_id_key(),
            NetworkUpgrade::Nu6.branch_id().to_le_bytes().to_vec(),
        );
        assert_eq!(
            get_zec_consensus_branch_id(&psbt),
            Some(NetworkUpgrade::Nu6.branch_id())
        );

        // setting replaces the raw entry
        set_zec_consensus_branch_id(&mut psbt, NetworkUpgrade::Nu5.branch_id());
        assert!(psbt.unknown.is_empty());
        assert_eq!(
            get_zec_consensus_branch_id(&psbt),
            Some(NetworkUpgrade::Nu5.branch_id())
        );
    }

    #[test]
    fn test_malformed_branch_id_is_ignored() {
        let mut psbt = empty_psbt();
        BitGoKeyValue::new(ProprietaryKeySubtype::ZecConsensusBranchId, vec![], vec![1, 2])
            .insert_into(&mut psbt.proprietary);
        assert_eq!(get_zec_consensus_branch_id(&psbt), None);
    }
}
