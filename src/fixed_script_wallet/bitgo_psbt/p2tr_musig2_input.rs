//! MuSig2 key-path inputs of `p2trMusig2` outputs.
//!
//! Participants, public nonces and partial signatures travel in BitGo proprietary
//! key-values on the PSBT input:
//!
//! - participants: `<tapOutputKey><tapInternalKey>` => `<userKey><bitgoKey>`
//! - nonce: `<participantKey><tapOutputKey>` => `<pubNonce>` (66 bytes)
//! - partial signature: `<participantKey><tapOutputKey>` => `<partialSig>` (32, or 33 with a
//!   sighash byte)

use core::fmt;

use crate::bitcoin::hashes::Hash;
use crate::bitcoin::hex::DisplayHex;
use crate::bitcoin::key::UntweakedPublicKey;
use crate::bitcoin::psbt::{Input, Psbt};
use crate::bitcoin::secp256k1::SecretKey;
use crate::bitcoin::sighash::{Prevouts, SighashCache, TapSighashType};
use crate::bitcoin::taproot::{self, TapNodeHash};
use crate::bitcoin::{CompressedPublicKey, TxOut};
use crate::fixed_script_wallet::wallet_scripts::bitgo_musig::{tagged_hash, to_musig2_point};
use musig2::secp::{MaybeScalar, Point, Scalar};
use musig2::{AggNonce, BinaryEncoding, KeyAggContext, PartialSignature, PubNonce, SecNonce};

use super::propkv::{find_kv, is_musig2_key, BitGoKeyValue, ProprietaryKeySubtype};

const DETERMINISTIC_NONCE_TAG: &str = "MuSig/deterministic/nonce";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Musig2Error {
    MissingParticipants,
    InvalidKeydataLength { expected: usize, got: usize },
    InvalidValueLength { expected: String, got: usize },
    InvalidKey(String),
    DuplicateParticipantKeys,
    TooManyKeyValues { expected: usize, got: usize },
    /// The key is not one of the two participants
    NotAParticipant(CompressedPublicKey),
    MissingNonces { got: usize },
    MissingMerkleRoot,
    TapOutputKeyMismatch { expected: String, got: String },
    Sighash(String),
    Signing(String),
    SignatureAggregation(String),
}

impl fmt::Display for Musig2Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Musig2Error::MissingParticipants => write!(f, "Missing participants"),
            Musig2Error::InvalidKeydataLength { expected, got } => write!(
                f,
                "Invalid keydata length: expected {}, got {}",
                expected, got
            ),
            Musig2Error::InvalidValueLength { expected, got } => {
                write!(f, "Invalid value length: expected {}, got {}", expected, got)
            }
            Musig2Error::InvalidKey(s) => write!(f, "Invalid key: {}", s),
            Musig2Error::DuplicateParticipantKeys => {
                write!(f, "Duplicate participant public keys found")
            }
            Musig2Error::TooManyKeyValues { expected, got } => write!(
                f,
                "Too many key-values: expected up to {}, got {}",
                expected, got
            ),
            Musig2Error::NotAParticipant(key) => {
                write!(f, "Key {} is not a MuSig2 participant", key)
            }
            Musig2Error::MissingNonces { got } => {
                write!(f, "Expected 2 public nonces, got {}", got)
            }
            Musig2Error::MissingMerkleRoot => write!(f, "Missing tap merkle root"),
            Musig2Error::TapOutputKeyMismatch { expected, got } => write!(
                f,
                "Tap output key mismatch: expected {}, got {}",
                expected, got
            ),
            Musig2Error::Sighash(s) => write!(f, "Failed to compute sighash: {}", s),
            Musig2Error::Signing(s) => write!(f, "Partial signing failed: {}", s),
            Musig2Error::SignatureAggregation(s) => {
                write!(f, "Signature aggregation error: {}", s)
            }
        }
    }
}

impl std::error::Error for Musig2Error {}

fn parse_xonly(bytes: &[u8]) -> Result<UntweakedPublicKey, Musig2Error> {
    UntweakedPublicKey::from_slice(bytes).map_err(|e| Musig2Error::InvalidKey(e.to_string()))
}

fn parse_compressed(bytes: &[u8]) -> Result<CompressedPublicKey, Musig2Error> {
    CompressedPublicKey::from_slice(bytes).map_err(|e| Musig2Error::InvalidKey(e.to_string()))
}

fn expect_key_len(kv: &BitGoKeyValue, expected: usize) -> Result<(), Musig2Error> {
    if kv.key.len() != expected {
        return Err(Musig2Error::InvalidKeydataLength {
            expected,
            got: kv.key.len(),
        });
    }
    Ok(())
}

/// `<participantKey><tapOutputKey>`, the key data of nonces and partial signatures.
fn participant_key_data(
    participant_pub_key: &CompressedPublicKey,
    tap_output_key: &UntweakedPublicKey,
) -> Vec<u8> {
    let mut key = Vec::with_capacity(65);
    key.extend_from_slice(&participant_pub_key.to_bytes());
    key.extend_from_slice(&tap_output_key.serialize());
    key
}

fn parse_participant_key_data(
    kv: &BitGoKeyValue,
) -> Result<(CompressedPublicKey, UntweakedPublicKey), Musig2Error> {
    expect_key_len(kv, 65)?;
    Ok((parse_compressed(&kv.key[..33])?, parse_xonly(&kv.key[33..])?))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Musig2Participants {
    pub tap_output_key: UntweakedPublicKey,
    pub tap_internal_key: UntweakedPublicKey,
    /// `[user, bitgo]`, the key aggregation order.
    pub participant_pub_keys: [CompressedPublicKey; 2],
}

impl Musig2Participants {
    pub fn to_key_value(&self) -> BitGoKeyValue {
        let mut key = Vec::with_capacity(64);
        key.extend_from_slice(&self.tap_output_key.serialize());
        key.extend_from_slice(&self.tap_internal_key.serialize());
        let value = [
            self.participant_pub_keys[0].to_bytes(),
            self.participant_pub_keys[1].to_bytes(),
        ]
        .concat();
        BitGoKeyValue::new(ProprietaryKeySubtype::Musig2ParticipantPubKeys, key, value)
    }

    pub fn from_key_value(kv: &BitGoKeyValue) -> Result<Self, Musig2Error> {
        expect_key_len(kv, 64)?;
        if kv.value.len() != 66 {
            return Err(Musig2Error::InvalidValueLength {
                expected: "66".to_string(),
                got: kv.value.len(),
            });
        }
        let first = parse_compressed(&kv.value[..33])?;
        let second = parse_compressed(&kv.value[33..])?;
        if first == second {
            return Err(Musig2Error::DuplicateParticipantKeys);
        }
        Ok(Self {
            tap_output_key: parse_xonly(&kv.key[..32])?,
            tap_internal_key: parse_xonly(&kv.key[32..])?,
            participant_pub_keys: [first, second],
        })
    }

    pub fn index_of(&self, key: &CompressedPublicKey) -> Option<usize> {
        self.participant_pub_keys.iter().position(|k| k == key)
    }
}

#[derive(Debug, Clone)]
pub struct Musig2PubNonce {
    pub participant_pub_key: CompressedPublicKey,
    pub tap_output_key: UntweakedPublicKey,
    pub pub_nonce: PubNonce,
}

impl PartialEq for Musig2PubNonce {
    fn eq(&self, other: &Self) -> bool {
        self.participant_pub_key == other.participant_pub_key
            && self.tap_output_key == other.tap_output_key
            && self.pub_nonce.serialize() == other.pub_nonce.serialize()
    }
}

impl Eq for Musig2PubNonce {}

impl Musig2PubNonce {
    pub fn to_key_value(&self) -> BitGoKeyValue {
        BitGoKeyValue::new(
            ProprietaryKeySubtype::Musig2PubNonce,
            participant_key_data(&self.participant_pub_key, &self.tap_output_key),
            self.pub_nonce.serialize().to_vec(),
        )
    }

    pub fn from_key_value(kv: &BitGoKeyValue) -> Result<Self, Musig2Error> {
        let (participant_pub_key, tap_output_key) = parse_participant_key_data(kv)?;
        if kv.value.len() != 66 {
            return Err(Musig2Error::InvalidValueLength {
                expected: "66".to_string(),
                got: kv.value.len(),
            });
        }
        let pub_nonce = PubNonce::try_from(&kv.value[..])
            .map_err(|e| Musig2Error::InvalidKey(format!("public nonce: {}", e)))?;
        Ok(Self {
            participant_pub_key,
            tap_output_key,
            pub_nonce,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Musig2PartialSig {
    pub participant_pub_key: CompressedPublicKey,
    pub tap_output_key: UntweakedPublicKey,
    pub partial_sig: Vec<u8>,
}

impl Musig2PartialSig {
    pub fn to_key_value(&self) -> BitGoKeyValue {
        BitGoKeyValue::new(
            ProprietaryKeySubtype::Musig2PartialSig,
            participant_key_data(&self.participant_pub_key, &self.tap_output_key),
            self.partial_sig.clone(),
        )
    }

    pub fn from_key_value(kv: &BitGoKeyValue) -> Result<Self, Musig2Error> {
        let (participant_pub_key, tap_output_key) = parse_participant_key_data(kv)?;
        if kv.value.len() != 32 && kv.value.len() != 33 {
            return Err(Musig2Error::InvalidValueLength {
                expected: "32 or 33".to_string(),
                got: kv.value.len(),
            });
        }
        Ok(Self {
            participant_pub_key,
            tap_output_key,
            partial_sig: kv.value.clone(),
        })
    }

    /// The 32-byte scalar, without a trailing sighash byte.
    pub fn normalized_signature(&self) -> Result<PartialSignature, Musig2Error> {
        PartialSignature::try_from(&self.partial_sig[..32])
            .map_err(|e| Musig2Error::InvalidKey(format!("partial signature: {}", e)))
    }
}

fn parse_kvs<T>(
    input: &Input,
    subtype: ProprietaryKeySubtype,
    max: usize,
    parse: fn(&BitGoKeyValue) -> Result<T, Musig2Error>,
) -> Result<Vec<T>, Musig2Error> {
    let kvs: Vec<_> = find_kv(subtype, &input.proprietary).collect();
    if kvs.len() > max {
        return Err(Musig2Error::TooManyKeyValues {
            expected: max,
            got: kvs.len(),
        });
    }
    kvs.iter().map(parse).collect()
}

pub fn parse_musig2_participants(input: &Input) -> Result<Option<Musig2Participants>, Musig2Error> {
    let mut parsed = parse_kvs(
        input,
        ProprietaryKeySubtype::Musig2ParticipantPubKeys,
        1,
        Musig2Participants::from_key_value,
    )?;
    Ok(parsed.pop())
}

pub fn parse_musig2_nonces(input: &Input) -> Result<Vec<Musig2PubNonce>, Musig2Error> {
    parse_kvs(
        input,
        ProprietaryKeySubtype::Musig2PubNonce,
        2,
        Musig2PubNonce::from_key_value,
    )
}

pub fn parse_musig2_partial_sigs(input: &Input) -> Result<Vec<Musig2PartialSig>, Musig2Error> {
    parse_kvs(
        input,
        ProprietaryKeySubtype::Musig2PartialSig,
        2,
        Musig2PartialSig::from_key_value,
    )
}

/// The spent output of every input, from `witness_utxo` or `non_witness_utxo`.
pub(crate) fn collect_prevouts(psbt: &Psbt) -> Result<Vec<TxOut>, String> {
    psbt.inputs
        .iter()
        .zip(&psbt.unsigned_tx.input)
        .enumerate()
        .map(|(i, (input, txin))| {
            if let Some(utxo) = &input.witness_utxo {
                return Ok(utxo.clone());
            }
            input
                .non_witness_utxo
                .as_ref()
                .and_then(|tx| tx.output.get(txin.previous_output.vout as usize))
                .cloned()
                .ok_or_else(|| format!("Missing UTXO data for input {}", i))
        })
        .collect()
}

/// BIP-341 key-spend sighash (`SIGHASH_DEFAULT`) of an input.
pub fn key_spend_sighash(psbt: &Psbt, input_index: usize) -> Result<[u8; 32], Musig2Error> {
    let prevouts = collect_prevouts(psbt).map_err(Musig2Error::Sighash)?;
    let mut cache = SighashCache::new(&psbt.unsigned_tx);
    let sighash = cache
        .taproot_key_spend_signature_hash(
            input_index,
            &Prevouts::All(&prevouts),
            TapSighashType::Default,
        )
        .map_err(|e| Musig2Error::Sighash(e.to_string()))?;
    Ok(sighash.to_byte_array())
}

pub(crate) fn to_musig2_scalar(key: &SecretKey) -> Result<Scalar, Musig2Error> {
    Scalar::from_slice(&key.secret_bytes()).map_err(|e| Musig2Error::Signing(e.to_string()))
}

fn to_point(key: &CompressedPublicKey) -> Result<Point, Musig2Error> {
    to_musig2_point(key).map_err(|e| Musig2Error::InvalidKey(e.to_string()))
}

/// Secret nonce of the deterministic signing construction.
///
/// `k_i = H_tag(sk || other_pubnonce || tap_output_key || len(msg) as u64be || msg || i)` for
/// `i` in 0..2, reduced mod n. Requires the counterparty nonce before our own nonce exists, so
/// the nonce can never be reused across different counterparty nonces.
pub fn deterministic_sec_nonce(
    secret_key: &SecretKey,
    other_pub_nonce: &PubNonce,
    tap_output_key: &UntweakedPublicKey,
    message: &[u8; 32],
) -> Result<SecNonce, Musig2Error> {
    let sk = secret_key.secret_bytes();
    let other = other_pub_nonce.serialize();
    let output_key = tap_output_key.serialize();
    let msg_len = (message.len() as u64).to_be_bytes();
    let k = |i: u8| -> Result<Scalar, Musig2Error> {
        let hash = tagged_hash(
            DETERMINISTIC_NONCE_TAG,
            &[&sk, &other, &output_key, &msg_len, message, &[i]],
        );
        MaybeScalar::reduce_from(&hash)
            .not_zero()
            .map_err(|_| Musig2Error::Signing("zero nonce".to_string()))
    };
    Ok(SecNonce::new(k(0)?, k(1)?))
}

#[derive(Debug, Clone)]
pub struct Musig2Input {
    pub participants: Musig2Participants,
    pub nonces: Vec<Musig2PubNonce>,
    pub partial_sigs: Vec<Musig2PartialSig>,
}

impl Musig2Input {
    /// Any MuSig2 key-value marks the input as a key-path spend.
    pub fn is_musig2_input(input: &Input) -> bool {
        input.proprietary.keys().any(is_musig2_key)
    }

    pub fn from_input(input: &Input) -> Result<Self, Musig2Error> {
        Ok(Self {
            participants: parse_musig2_participants(input)?
                .ok_or(Musig2Error::MissingParticipants)?,
            nonces: parse_musig2_nonces(input)?,
            partial_sigs: parse_musig2_partial_sigs(input)?,
        })
    }

    /// Key aggregation context tweaked with the tap tree root, checked against the output key.
    pub fn key_agg_context(
        &self,
        tap_merkle_root: &TapNodeHash,
    ) -> Result<KeyAggContext, Musig2Error> {
        let points = self
            .participants
            .participant_pub_keys
            .iter()
            .map(to_point)
            .collect::<Result<Vec<_>, _>>()?;
        let ctx = KeyAggContext::new(points)
            .map_err(|e| Musig2Error::SignatureAggregation(e.to_string()))?
            .with_taproot_tweak(&tap_merkle_root.to_byte_array())
            .map_err(|e| Musig2Error::SignatureAggregation(e.to_string()))?;
        let computed: Point = ctx.aggregated_pubkey();
        let computed = computed.serialize_xonly();
        let stored = self.participants.tap_output_key.serialize();
        if computed != stored {
            return Err(Musig2Error::TapOutputKeyMismatch {
                expected: stored.to_lower_hex_string(),
                got: computed.to_lower_hex_string(),
            });
        }
        Ok(ctx)
    }

    pub fn nonce_of(&self, key: &CompressedPublicKey) -> Option<&Musig2PubNonce> {
        self.nonces.iter().find(|n| &n.participant_pub_key == key)
    }

    pub fn partial_sig_of(&self, key: &CompressedPublicKey) -> Option<&Musig2PartialSig> {
        self.partial_sigs
            .iter()
            .find(|s| &s.participant_pub_key == key)
    }

    /// Public nonces in participant order; both must be present.
    pub fn ordered_nonces(&self) -> Result<[PubNonce; 2], Musig2Error> {
        let [a, b] = &self.participants.participant_pub_keys;
        match (self.nonce_of(a), self.nonce_of(b)) {
            (Some(a), Some(b)) => Ok([a.pub_nonce.clone(), b.pub_nonce.clone()]),
            _ => Err(Musig2Error::MissingNonces {
                got: self.nonces.len(),
            }),
        }
    }

    pub fn aggregate_nonce(&self) -> Result<AggNonce, Musig2Error> {
        let nonces = self.ordered_nonces()?;
        Ok(AggNonce::sum(&nonces))
    }

    /// Checks the partial signature of `key` against its nonce.
    pub fn verify_partial_signature(
        &self,
        key: &CompressedPublicKey,
        message: &[u8; 32],
        tap_merkle_root: &TapNodeHash,
    ) -> Result<bool, Musig2Error> {
        let (Some(sig), Some(nonce)) = (self.partial_sig_of(key), self.nonce_of(key)) else {
            return Ok(false);
        };
        let ctx = self.key_agg_context(tap_merkle_root)?;
        Ok(musig2::verify_partial(
            &ctx,
            sig.normalized_signature()?,
            &self.aggregate_nonce()?,
            to_point(key)?,
            &nonce.pub_nonce,
            message,
        )
        .is_ok())
    }

    /// BIP-327 aggregation of both partial signatures into a key-path signature.
    pub fn aggregate_signature(
        &self,
        message: &[u8; 32],
        tap_merkle_root: &TapNodeHash,
    ) -> Result<taproot::Signature, Musig2Error> {
        let ctx = self.key_agg_context(tap_merkle_root)?;
        let agg_nonce = self.aggregate_nonce()?;
        let sigs = self
            .participants
            .participant_pub_keys
            .iter()
            .map(|key| {
                self.partial_sig_of(key)
                    .ok_or_else(|| {
                        Musig2Error::SignatureAggregation(format!(
                            "missing partial signature for {}",
                            key
                        ))
                    })?
                    .normalized_signature()
            })
            .collect::<Result<Vec<_>, _>>()?;
        let sig: musig2::LiftedSignature =
            musig2::aggregate_partial_signatures(&ctx, &agg_nonce, sigs, message)
                .map_err(|e| Musig2Error::SignatureAggregation(e.to_string()))?;
        taproot::Signature::from_slice(&sig.to_bytes())
            .map_err(|e| Musig2Error::SignatureAggregation(e.to_string()))
    }
}

/// Removes every MuSig2 key-value from the input.
pub fn clear_musig2_fields(input: &mut Input) {
    input.proprietary.retain(|key, _| !is_musig2_key(key));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin::secp256k1::{Message, Secp256k1};
    use crate::fixed_script_wallet::test_utils::get_test_wallet_xprvs;
    use crate::fixed_script_wallet::wallet_scripts::ScriptP2tr;
    use crate::fixed_script_wallet::RootWalletKeys;

    struct Fixture {
        secret_keys: [SecretKey; 2],
        participants: Musig2Participants,
        merkle_root: TapNodeHash,
    }

    fn fixture() -> Fixture {
        let secp = Secp256k1::new();
        let xprvs = get_test_wallet_xprvs("musig2");
        let keys =
            RootWalletKeys::new(xprvs.map(|x| crate::bitcoin::bip32::Xpub::from_priv(&secp, &x)));
        let paths = keys.derivation_paths(40, 0).unwrap();
        let derived = [0, 1, 2].map(|i| xprvs[i].derive_priv(&secp, &paths[i]).unwrap());
        let pubs = derived.map(|x| CompressedPublicKey(x.private_key.public_key(&secp)));
        let script = ScriptP2tr::new(&pubs, true).unwrap();
        Fixture {
            secret_keys: [derived[0].private_key, derived[2].private_key],
            participants: Musig2Participants {
                tap_output_key: script.spend_info.output_key().to_x_only_public_key(),
                tap_internal_key: script.spend_info.internal_key(),
                participant_pub_keys: [pubs[0], pubs[2]],
            },
            merkle_root: script.spend_info.merkle_root().unwrap(),
        }
    }

    #[test]
    fn test_participants_key_value() {
        let f = fixture();
        let kv = f.participants.to_key_value();
        assert_eq!(kv.key.len(), 64);
        assert_eq!(kv.value.len(), 66);
        assert_eq!(Musig2Participants::from_key_value(&kv).unwrap(), f.participants);

        let mut dup = kv.clone();
        dup.value = [&kv.value[..33], &kv.value[..33]].concat();
        assert_eq!(
            Musig2Participants::from_key_value(&dup),
            Err(Musig2Error::DuplicateParticipantKeys)
        );

        let mut short = kv;
        short.key.pop();
        assert_eq!(
            Musig2Participants::from_key_value(&short),
            Err(Musig2Error::InvalidKeydataLength {
                expected: 64,
                got: 63
            })
        );
    }

    #[test]
    fn test_partial_sig_lengths() {
        let f = fixture();
        let sig = Musig2PartialSig {
            participant_pub_key: f.participants.participant_pub_keys[0],
            tap_output_key: f.participants.tap_output_key,
            partial_sig: vec![1; 34],
        };
        assert!(matches!(
            Musig2PartialSig::from_key_value(&sig.to_key_value()),
            Err(Musig2Error::InvalidValueLength { got: 34, .. })
        ));
    }

    #[test]
    fn test_deterministic_nonce() {
        let f = fixture();
        let other = SecNonce::new(Scalar::one(), Scalar::two()).public_nonce();
        let msg = [7u8; 32];
        let tap_output_key = f.participants.tap_output_key;
        let a = deterministic_sec_nonce(&f.secret_keys[1], &other, &tap_output_key, &msg).unwrap();
        let b = deterministic_sec_nonce(&f.secret_keys[1], &other, &tap_output_key, &msg).unwrap();
        assert_eq!(a.public_nonce(), b.public_nonce());
        let c = deterministic_sec_nonce(
            &f.secret_keys[1],
            &other,
            &f.participants.tap_output_key,
            &[8u8; 32],
        )
        .unwrap();
        assert_ne!(a.public_nonce(), c.public_nonce());
    }

    #[test]
    fn test_sign_and_aggregate() {
        let f = fixture();
        let msg = [42u8; 32];
        let nonce_user = SecNonce::new(Scalar::one(), Scalar::two());
        let pub_user = nonce_user.public_nonce();
        let nonce_bitgo = deterministic_sec_nonce(
            &f.secret_keys[1],
            &pub_user,
            &f.participants.tap_output_key,
            &msg,
        )
        .unwrap();

        let mut input = Musig2Input {
            participants: f.participants.clone(),
            nonces: vec![],
            partial_sigs: vec![],
        };
        for (i, nonce) in [&nonce_user, &nonce_bitgo].into_iter().enumerate() {
            input.nonces.push(Musig2PubNonce {
                participant_pub_key: f.participants.participant_pub_keys[i],
                tap_output_key: f.participants.tap_output_key,
                pub_nonce: nonce.public_nonce(),
            });
        }
        let ctx = input.key_agg_context(&f.merkle_root).unwrap();
        let agg_nonce = input.aggregate_nonce().unwrap();
        for (i, nonce) in [nonce_user, nonce_bitgo].into_iter().enumerate() {
            let sig: PartialSignature = musig2::sign_partial(
                &ctx,
                to_musig2_scalar(&f.secret_keys[i]).unwrap(),
                nonce,
                &agg_nonce,
                msg,
            )
            .unwrap();
            input.partial_sigs.push(Musig2PartialSig {
                participant_pub_key: f.participants.participant_pub_keys[i],
                tap_output_key: f.participants.tap_output_key,
                partial_sig: sig.serialize().to_vec(),
            });
        }

        let key = f.participants.participant_pub_keys[0];
        assert!(input.verify_partial_signature(&key, &msg, &f.merkle_root).unwrap());
        assert!(!input.verify_partial_signature(&key, &[0u8; 32], &f.merkle_root).unwrap());

        let sig = input.aggregate_signature(&msg, &f.merkle_root).unwrap();
        let secp = Secp256k1::verification_only();
        secp.verify_schnorr(
            &sig.signature,
            &Message::from_digest(msg),
            &f.participants.tap_output_key,
        )
        .unwrap();
    }

    #[test]
    fn test_output_key_mismatch() {
        let f = fixture();
        let mut participants = f.participants.clone();
        participants.tap_output_key = participants.tap_internal_key;
        let input = Musig2Input {
            participants,
            nonces: vec![],
            partial_sigs: vec![],
        };
        assert!(matches!(
            input.key_agg_context(&f.merkle_root),
            Err(Musig2Error::TapOutputKeyMismatch { .. })
        ));
        assert_eq!(
            input.aggregate_nonce().unwrap_err(),
            Musig2Error::MissingNonces { got: 0 }
        );
    }
}
