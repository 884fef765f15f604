//! Internal-key aggregation for the two taproot wallet flavours.
//!
//! `p2trMusig2` uses BIP-327 key aggregation over the compressed keys in `[user, bitgo]` order.
//! `p2trLegacy` predates BIP-327: it sorts the x-only keys, lifts them to even-y points and
//! uses the older MuSig coefficient rule.

use core::fmt;

use crate::bitcoin::hashes::{sha256, Hash, HashEngine};
use crate::bitcoin::secp256k1::{PublicKey, Scalar, Secp256k1};
use crate::bitcoin::{CompressedPublicKey, XOnlyPublicKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BitGoMusigError {
    InvalidPoint(String),
    Aggregation(String),
}

impl fmt::Display for BitGoMusigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BitGoMusigError::InvalidPoint(s) => write!(f, "Invalid point: {}", s),
            BitGoMusigError::Aggregation(s) => write!(f, "Key aggregation failed: {}", s),
        }
    }
}

impl std::error::Error for BitGoMusigError {}

/// BIP-340 style tagged hash.
pub(crate) fn tagged_hash(tag: &str, chunks: &[&[u8]]) -> [u8; 32] {
    let tag_hash = sha256::Hash::hash(tag.as_bytes());
    let mut engine = sha256::Hash::engine();
    engine.input(tag_hash.as_ref());
    engine.input(tag_hash.as_ref());
    for chunk in chunks {
        engine.input(chunk);
    }
    sha256::Hash::from_engine(engine).to_byte_array()
}

pub(crate) fn to_musig2_point(
    key: &CompressedPublicKey,
) -> Result<musig2::secp::Point, BitGoMusigError> {
    musig2::secp::Point::try_from(&key.to_bytes()[..])
        .map_err(|e| BitGoMusigError::InvalidPoint(e.to_string()))
}

pub fn musig2_key_agg_context(
    keys: &[CompressedPublicKey; 2],
) -> Result<musig2::KeyAggContext, BitGoMusigError> {
    let points = keys
        .iter()
        .map(to_musig2_point)
        .collect::<Result<Vec<_>, _>>()?;
    musig2::KeyAggContext::new(points).map_err(|e| BitGoMusigError::Aggregation(e.to_string()))
}

/// BIP-327 aggregate of `[user, bitgo]`, as an x-only key.
pub fn key_agg_p2tr_musig2(
    keys: &[CompressedPublicKey; 2],
) -> Result<XOnlyPublicKey, BitGoMusigError> {
    let ctx = musig2_key_agg_context(keys)?;
    let agg: musig2::secp::Point = ctx.aggregated_pubkey();
    XOnlyPublicKey::from_slice(&agg.serialize_xonly())
        .map_err(|e| BitGoMusigError::InvalidPoint(e.to_string()))
}

/// Pre-BIP-327 aggregate used by `p2trLegacy` outputs.
pub fn key_agg_bitgo_p2tr_legacy(
    keys: &[CompressedPublicKey; 2],
) -> Result<XOnlyPublicKey, BitGoMusigError> {
    let secp = Secp256k1::verification_only();
    let mut xonly: Vec<[u8; 32]> = keys
        .iter()
        .map(|k| k.0.x_only_public_key().0.serialize())
        .collect();
    xonly.sort();

    let list_hash = tagged_hash("KeyAgg list", &[&xonly.concat()]);
    let second = xonly.iter().find(|k| **k != xonly[0]).copied();

    let mut points = Vec::with_capacity(xonly.len());
    for x in &xonly {
        let lifted = XOnlyPublicKey::from_slice(x)
            .map_err(|e| BitGoMusigError::InvalidPoint(e.to_string()))?
            .public_key(crate::bitcoin::secp256k1::Parity::Even);
        if Some(*x) == second {
            points.push(lifted);
            continue;
        }
        let coefficient = tagged_hash("KeyAgg coefficient", &[&list_hash, x]);
        let scalar = Scalar::from_be_bytes(coefficient)
            .map_err(|e| BitGoMusigError::Aggregation(e.to_string()))?;
        points.push(
            lifted
                .mul_tweak(&secp, &scalar)
                .map_err(|e| BitGoMusigError::Aggregation(e.to_string()))?,
        );
    }

    let refs: Vec<&PublicKey> = points.iter().collect();
    let agg = PublicKey::combine_keys(&refs)
        .map_err(|e| BitGoMusigError::Aggregation(e.to_string()))?;
    Ok(agg.x_only_public_key().0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn key(hex_str: &str) -> CompressedPublicKey {
        CompressedPublicKey::from_slice(&hex::decode(hex_str).unwrap()).unwrap()
    }

    const A: &str = "02f9308a019258c31049344f85f89d5229b531c845836f99b08601f113bce036f9";
    const B: &str = "03dff1d77f2a671c5f36183726db2341be58feae1da2deced843240f7b502ba659";

    const C: &str = "023590a94e768f8e1815c2f24b4d80a8e3149316c3518ce7b7ad338368d038ca66";

    #[rstest]
    #[case(A, B, "27d2929337feaf2ed13b0fbffa0891aa31ad7dbec57c42b53d916924c7cbad23")]
    #[case(B, C, "4a7014caded6ba3dbaf6247682226578455120704605d4fde3077f6ab740bc25")]
    #[case(A, C, "8c3ae6bb305fc5adf1c02abe5882c09720f26697db7f5b4129abaa85efcc5684")]
    fn test_legacy_aggregation_vectors(
        #[case] first: &str,
        #[case] second: &str,
        #[case] expected: &str,
    ) {
        let agg = key_agg_bitgo_p2tr_legacy(&[key(first), key(second)]).unwrap();
        assert_eq!(hex::encode(agg.serialize()), expected);
    }

    #[test]
    fn test_legacy_aggregation_is_order_independent() {
        let ab = key_agg_bitgo_p2tr_legacy(&[key(A), key(B)]).unwrap();
        let ba = key_agg_bitgo_p2tr_legacy(&[key(B), key(A)]).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_musig2_aggregation_is_order_dependent() {
        let ab = key_agg_p2tr_musig2(&[key(A), key(B)]).unwrap();
        let ba = key_agg_p2tr_musig2(&[key(B), key(A)]).unwrap();
        assert_ne!(ab, ba);
        assert_ne!(ab, key_agg_bitgo_p2tr_legacy(&[key(A), key(B)]).unwrap());
    }

    #[test]
    fn test_tagged_hash_chunks() {
        assert_eq!(
            tagged_hash("TapLeaf", &[b"ab", b"c"]),
            tagged_hash("TapLeaf", &[b"abc"])
        );
    }
}
