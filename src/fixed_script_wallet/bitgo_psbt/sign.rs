//! Signing, the MuSig2 nonce rounds, finalization and extraction.

use crate::bitcoin::bip32::{DerivationPath, Xpriv, Xpub};
use crate::bitcoin::blockdata::opcodes::all::OP_PUSHBYTES_0;
use crate::bitcoin::blockdata::script::Builder;
use crate::bitcoin::hashes::{sha256, Hash, HashEngine};
use crate::bitcoin::psbt::Input;
use crate::bitcoin::script::PushBytesBuf;
use crate::bitcoin::secp256k1::{Message, SecretKey};
use crate::bitcoin::sighash::{Prevouts, SighashCache, TapSighashType};
use crate::bitcoin::{
    ecdsa, taproot, CompressedPublicKey, PublicKey, Script, TapLeafHash, Txid, Witness,
    XOnlyPublicKey,
};
use crate::fixed_script_wallet::wallet_scripts::{parse_multisig_script_2_of_3, ScriptP2shP2pk};
use crate::{Context, Error, Network, Result};
use musig2::secp::Point;
use musig2::{BinaryEncoding, PartialSignature, SecNonce};

use super::p2tr_musig2_input::{
    clear_musig2_fields, collect_prevouts, deterministic_sec_nonce, key_spend_sighash,
    parse_musig2_nonces, to_musig2_scalar, Musig2Error, Musig2Input, Musig2PartialSig,
    Musig2PubNonce,
};
use super::psbt_wallet_input::{get_output_script_and_value, EcdsaSighashScheme};
use super::BitGoPsbt;

/// `OP_PUSHBYTES_33 <key> OP_CHECKSIG`
fn p2pk_key(script: &Script) -> Option<PublicKey> {
    let bytes = script.as_bytes();
    if bytes.len() != 35 || bytes[0] != 33 || bytes[34] != 0xac {
        return None;
    }
    PublicKey::from_slice(&bytes[1..34]).ok()
}

fn push_bytes(bytes: Vec<u8>) -> Result<PushBytesBuf> {
    PushBytesBuf::try_from(bytes).map_err(|e| Error::Signing(e.to_string()))
}

/// Derivation path the input records for the key with `fingerprint`.
fn find_derivation_path(input: &Input, xpub: &Xpub) -> Option<DerivationPath> {
    let fingerprint = xpub.fingerprint();
    input
        .bip32_derivation
        .values()
        .find(|(fp, _)| *fp == fingerprint)
        .map(|(_, path)| path.clone())
        .or_else(|| {
            input
                .tap_key_origins
                .values()
                .find(|(_, (fp, _))| *fp == fingerprint)
                .map(|(_, (_, path))| path.clone())
        })
}

fn is_musig2_key_path(input: &Input) -> bool {
    Musig2Input::is_musig2_input(input) && input.tap_scripts.is_empty()
}

fn session_seed(session_id: &[u8; 32], input_index: usize) -> [u8; 32] {
    let mut engine = sha256::Hash::engine();
    engine.input(session_id);
    engine.input(&(input_index as u64).to_le_bytes());
    sha256::Hash::from_engine(engine).to_byte_array()
}

struct NonceEntry {
    input_index: usize,
    pub_key: CompressedPublicKey,
    secret_key: SecretKey,
    sec_nonce: SecNonce,
}

/// Secret state of the first MuSig2 round: the nonces one signer generated.
///
/// Consumed by [`NonceRound::sign`], so a secret nonce signs at most once.
pub struct NonceRound {
    network: Network,
    unsigned_txid: Txid,
    entries: Vec<NonceEntry>,
}

impl NonceRound {
    /// Indices of the inputs that received a nonce in this round, ascending.
    pub fn input_indices(&self) -> Vec<usize> {
        self.entries.iter().map(|e| e.input_index).collect()
    }

    /// `true` if the signer participates in no MuSig2 key-path input.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Second MuSig2 round: produces our partial signature on every input of the round.
    ///
    /// # Arguments
    /// - `psbt`: the container the nonces were generated on, with the counterparty nonces
    ///   combined in
    /// - `_ctx`: signing context
    ///
    /// # Returns
    /// - `Ok(SignedRound)` listing the inputs that received a partial signature
    /// - `Err(Error::NonceExchangeIncomplete)` before signing anything if an input lacks the
    ///   counterparty nonce
    /// - `Err(Error::InvalidInput)` if `psbt` is not the transaction of the round
    pub fn sign(self, psbt: &mut BitGoPsbt, _ctx: &Context) -> Result<SignedRound> {
        if psbt.network() != self.network || psbt.unsigned_txid()? != self.unsigned_txid {
            return Err(Error::InvalidInput(
                "nonce round belongs to a different transaction".to_string(),
            ));
        }

        let mut prepared = Vec::with_capacity(self.entries.len());
        for entry in self.entries {
            let index = entry.input_index;
            let input = Musig2Input::from_input(&psbt.psbt.inputs[index])?;
            let agg_nonce = input
                .aggregate_nonce()
                .map_err(|_| Error::NonceExchangeIncomplete { index })?;
            prepared.push((entry, input, agg_nonce));
        }

        let mut signed_inputs = Vec::with_capacity(prepared.len());
        for (entry, input, agg_nonce) in prepared {
            let index = entry.input_index;
            let merkle_root = psbt.psbt.inputs[index]
                .tap_merkle_root
                .ok_or(Musig2Error::MissingMerkleRoot)?;
            let message = key_spend_sighash(&psbt.psbt, index)?;
            let key_agg_ctx = input.key_agg_context(&merkle_root)?;
            let signature: PartialSignature = musig2::sign_partial(
                &key_agg_ctx,
                to_musig2_scalar(&entry.secret_key)?,
                entry.sec_nonce,
                &agg_nonce,
                message,
            )
            .map_err(|e| Error::Signing(e.to_string()))?;
            Musig2PartialSig {
                participant_pub_key: entry.pub_key,
                tap_output_key: input.participants.tap_output_key,
                partial_sig: signature.serialize().to_vec(),
            }
            .to_key_value()
            .insert_into(&mut psbt.psbt.inputs[index].proprietary);
            signed_inputs.push(index);
        }
        tracing::debug!(inputs = ?signed_inputs, "signed musig2 round");
        Ok(SignedRound { signed_inputs })
    }
}

/// Outcome of [`NonceRound::sign`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRound {
    signed_inputs: Vec<usize>,
}

impl SignedRound {
    /// Inputs holding our partial signature.
    pub fn signed_inputs(&self) -> &[usize] {
        &self.signed_inputs
    }
}

impl BitGoPsbt {
    fn check_input_index(&self, index: usize) -> Result<()> {
        let len = self.psbt.inputs.len();
        if index >= len {
            return Err(Error::IndexOutOfBounds { index, len });
        }
        Ok(())
    }

    /// Derives the key of `xpriv` at the path the input records for it.
    ///
    /// `Ok(None)` when the key is not one of the input's signers.
    fn derive_input_key(
        &self,
        ctx: &Context,
        index: usize,
        xpriv: &Xpriv,
    ) -> Result<Option<SecretKey>> {
        let xpub = Xpub::from_priv(ctx.secp(), xpriv);
        let Some(path) = find_derivation_path(&self.psbt.inputs[index], &xpub) else {
            return Ok(None);
        };
        let derived = xpriv
            .derive_priv(ctx.secp(), &path)
            .map_err(|e| Error::Signing(e.to_string()))?;
        Ok(Some(derived.private_key))
    }

    /// Signs every wallet input `xpriv` is a signer of.
    ///
    /// ECDSA inputs are signed with the network's sighash (BIP-143, `SIGHASH_FORKID` or
    /// ZIP-243), taproot script-path inputs with a Schnorr signature per leaf of the key.
    /// Replay protection inputs and MuSig2 key-path inputs are skipped; they are signed by
    /// [`BitGoPsbt::sign_replay_protection_inputs`] and the MuSig2 rounds.
    ///
    /// # Arguments
    /// - `ctx`: signing context
    /// - `xpriv`: root key of one wallet signer; it is derived along the path the input records
    ///
    /// # Returns
    /// - `Ok(indices)` of the inputs that received a signature
    /// - `Err(Error::WalletValidationFailure)` if a derived key does not match the input's
    ///   scripts
    pub fn sign(&mut self, ctx: &Context, xpriv: &Xpriv) -> Result<Vec<usize>> {
        let mut signed = vec![];
        for index in 0..self.psbt.inputs.len() {
            let input = &self.psbt.inputs[index];
            if input.bip32_derivation.is_empty() && input.tap_key_origins.is_empty() {
                continue;
            }
            if is_musig2_key_path(input) {
                tracing::debug!(index, "skipping musig2 key path input");
                continue;
            }
            if self.sign_input(ctx, index, xpriv)? {
                signed.push(index);
            }
        }
        tracing::debug!(inputs = ?signed, "signed inputs");
        Ok(signed)
    }

    /// Signs one input with `xpriv`.
    ///
    /// # Returns
    /// - `Ok(true)` if a signature was added
    /// - `Ok(false)` if `xpriv` is not a signer of the input
    /// - `Err(Error::Signing)` for MuSig2 key-path inputs, which need the nonce rounds
    pub fn sign_input(&mut self, ctx: &Context, index: usize, xpriv: &Xpriv) -> Result<bool> {
        self.check_input_index(index)?;
        if is_musig2_key_path(&self.psbt.inputs[index]) {
            return Err(Error::Signing(format!(
                "input {} spends by MuSig2 key path; use the nonce rounds",
                index
            )));
        }
        let Some(secret_key) = self.derive_input_key(ctx, index, xpriv)? else {
            return Ok(false);
        };
        if self.psbt.inputs[index].tap_key_origins.is_empty() {
            self.sign_ecdsa_input(ctx, index, &secret_key)?;
        } else {
            self.sign_taproot_script_input(ctx, index, &secret_key)?;
        }
        Ok(true)
    }

    fn sign_ecdsa_input(
        &mut self,
        ctx: &Context,
        index: usize,
        secret_key: &SecretKey,
    ) -> Result<()> {
        let pub_key = PublicKey::new(secret_key.public_key(ctx.secp()));
        let input = &self.psbt.inputs[index];
        let expected = input.bip32_derivation.contains_key(&pub_key.inner)
            || input
                .redeem_script
                .as_ref()
                .and_then(|s| p2pk_key(s))
                .is_some_and(|k| k == pub_key);
        if !expected {
            return Err(Error::WalletValidationFailure {
                index,
                message: format!("derived key {} is not a key of the input", pub_key),
            });
        }

        let mut cache = SighashCache::new(&self.psbt.unsigned_tx);
        let (message, sighash_type) = match self.sighash_scheme() {
            EcdsaSighashScheme::ForkId(fork_id) => self
                .psbt
                .sighash_forkid(index, &mut cache, fork_id)
                .map_err(|e| Error::Signing(e.to_string()))?,
            scheme => {
                let sighash_type = input
                    .ecdsa_hash_ty()
                    .map_err(|e| Error::Signing(e.to_string()))?;
                let message = scheme
                    .message(&self.psbt, index, &mut cache)
                    .map_err(Error::Signing)?;
                (message, sighash_type)
            }
        };
        let signature = ctx.secp().sign_ecdsa(&message, secret_key);
        self.psbt.inputs[index].partial_sigs.insert(
            pub_key,
            ecdsa::Signature {
                signature,
                sighash_type,
            },
        );
        tracing::debug!(index, %pub_key, "added ecdsa signature");
        Ok(())
    }

    fn sign_taproot_script_input(
        &mut self,
        ctx: &Context,
        index: usize,
        secret_key: &SecretKey,
    ) -> Result<()> {
        let keypair = secret_key.keypair(ctx.secp());
        let (x_only, _) = keypair.x_only_public_key();
        let leaf_hashes = match self.psbt.inputs[index].tap_key_origins.get(&x_only) {
            Some((leaf_hashes, _)) if !leaf_hashes.is_empty() => leaf_hashes.clone(),
            _ => {
                return Err(Error::WalletValidationFailure {
                    index,
                    message: format!("derived key {} has no tap leaf in the input", x_only),
                })
            }
        };
        let prevouts = collect_prevouts(&self.psbt).map_err(Error::Signing)?;
        let mut cache = SighashCache::new(&self.psbt.unsigned_tx);
        let mut signatures = Vec::with_capacity(leaf_hashes.len());
        for leaf_hash in leaf_hashes {
            let sighash = cache
                .taproot_script_spend_signature_hash(
                    index,
                    &Prevouts::All(&prevouts),
                    leaf_hash,
                    TapSighashType::Default,
                )
                .map_err(|e| Error::Signing(e.to_string()))?;
            let message = Message::from_digest(sighash.to_byte_array());
            let signature = ctx.secp().sign_schnorr_no_aux_rand(&message, &keypair);
            signatures.push((leaf_hash, signature));
        }
        let input = &mut self.psbt.inputs[index];
        for (leaf_hash, signature) in signatures {
            input.tap_script_sigs.insert(
                (x_only, leaf_hash),
                taproot::Signature {
                    signature,
                    sighash_type: TapSighashType::Default,
                },
            );
        }
        tracing::debug!(index, %x_only, "added tap script signature");
        Ok(())
    }

    /// Signs every p2shP2pk input locked to `secret_key`.
    ///
    /// On fork-id networks the signature commits with `SIGHASH_ALL|SIGHASH_FORKID`.
    ///
    /// # Returns
    /// - `Ok(indices)` of the signed inputs; empty if no input spends the key's script
    pub fn sign_replay_protection_inputs(
        &mut self,
        ctx: &Context,
        secret_key: &SecretKey,
    ) -> Result<Vec<usize>> {
        let pub_key = CompressedPublicKey(secret_key.public_key(ctx.secp()));
        let script = ScriptP2shP2pk::new(pub_key).output_script();
        let mut signed = vec![];
        for index in 0..self.psbt.inputs.len() {
            let outpoint = self.psbt.unsigned_tx.input[index].previous_output;
            let matches = get_output_script_and_value(&self.psbt.inputs[index], outpoint)
                .is_ok_and(|(spk, _)| *spk == script);
            if matches {
                self.sign_ecdsa_input(ctx, index, secret_key)?;
                signed.push(index);
            }
        }
        Ok(signed)
    }

    /// First MuSig2 round: a nonce for every key-path input `xpriv` participates in.
    ///
    /// The public nonces are stored in the container; the secret half stays in the returned
    /// round.
    ///
    /// # Arguments
    /// - `ctx`: signing context; its config decides whether custom session ids are accepted on
    ///   mainnets
    /// - `xpriv`: root key of the user or bitgo signer
    /// - `session_id`: replaces the random session id
    ///
    /// # Returns
    /// - `Ok(NonceRound)` holding the secret nonces, possibly empty
    /// - `Err(Error::InvalidInput)` for a custom session id on a mainnet
    pub fn generate_musig2_nonces(
        &mut self,
        ctx: &Context,
        xpriv: &Xpriv,
        session_id: Option<[u8; 32]>,
    ) -> Result<NonceRound> {
        let session_id = match session_id {
            Some(id) => {
                if self.network.is_mainnet() && !ctx.config().allow_custom_session_id_on_mainnet {
                    return Err(Error::InvalidInput(format!(
                        "custom session ids are not allowed on {}",
                        self.network
                    )));
                }
                id
            }
            None => {
                let mut id = [0u8; 32];
                getrandom::getrandom(&mut id).map_err(|e| Error::Signing(e.to_string()))?;
                id
            }
        };

        let mut entries = vec![];
        for index in 0..self.psbt.inputs.len() {
            if !is_musig2_key_path(&self.psbt.inputs[index]) {
                continue;
            }
            let Some(secret_key) = self.derive_input_key(ctx, index, xpriv)? else {
                continue;
            };
            let pub_key = CompressedPublicKey(secret_key.public_key(ctx.secp()));
            let input = Musig2Input::from_input(&self.psbt.inputs[index])?;
            if input.participants.index_of(&pub_key).is_none() {
                tracing::warn!(index, "key is not a musig2 participant");
                continue;
            }
            let merkle_root = self.psbt.inputs[index]
                .tap_merkle_root
                .ok_or(Musig2Error::MissingMerkleRoot)?;
            let message = key_spend_sighash(&self.psbt, index)?;
            let aggregated_key: Point = input.key_agg_context(&merkle_root)?.aggregated_pubkey();
            let sec_nonce = SecNonce::build(session_seed(&session_id, index))
                .with_seckey(to_musig2_scalar(&secret_key)?)
                .with_message(&message)
                .with_aggregated_pubkey(aggregated_key)
                .build();
            Musig2PubNonce {
                participant_pub_key: pub_key,
                tap_output_key: input.participants.tap_output_key,
                pub_nonce: sec_nonce.public_nonce(),
            }
            .to_key_value()
            .insert_into(&mut self.psbt.inputs[index].proprietary);
            entries.push(NonceEntry {
                input_index: index,
                pub_key,
                secret_key,
                sec_nonce,
            });
        }
        tracing::debug!(count = entries.len(), "generated musig2 nonces");
        Ok(NonceRound {
            network: self.network,
            unsigned_txid: self.unsigned_txid()?,
            entries,
        })
    }

    /// Copies the public nonces of `other` into this container.
    ///
    /// Fails unless both containers hold the same unsigned transaction on the same network.
    pub fn combine_musig2_nonces(&mut self, other: &BitGoPsbt) -> Result<()> {
        if self.network != other.network {
            return Err(Error::InvalidInput(format!(
                "cannot combine nonces of {} and {}",
                self.network, other.network
            )));
        }
        if self.unsigned_txid()? != other.unsigned_txid()? {
            return Err(Error::InvalidInput(
                "cannot combine nonces of different transactions".to_string(),
            ));
        }
        for (index, other_input) in other.psbt.inputs.iter().enumerate() {
            for nonce in parse_musig2_nonces(other_input)? {
                tracing::debug!(index, key = %nonce.participant_pub_key, "combined musig2 nonce");
                nonce
                    .to_key_value()
                    .insert_into(&mut self.psbt.inputs[index].proprietary);
            }
        }
        Ok(())
    }

    /// Nonce and partial signature in one step, for the side that receives the counterparty
    /// nonce first.
    ///
    /// The secret nonce is derived from the key, the counterparty nonce and the sighash, so
    /// it never has to be held between rounds.
    ///
    /// # Arguments
    /// - `ctx`: signing context
    /// - `index`: a MuSig2 key-path input holding the counterparty nonce
    /// - `xpriv`: root key of the signer
    ///
    /// # Returns
    /// - `Ok(())` once our public nonce and partial signature are stored in the input
    /// - `Err(Error::NonceExchangeIncomplete)` if the counterparty nonce is missing
    pub fn sign_musig2_input_deterministic(
        &mut self,
        ctx: &Context,
        index: usize,
        xpriv: &Xpriv,
    ) -> Result<()> {
        self.check_input_index(index)?;
        let mut input = Musig2Input::from_input(&self.psbt.inputs[index])?;
        let secret_key = self
            .derive_input_key(ctx, index, xpriv)?
            .ok_or_else(|| Error::Signing(format!("key is not a signer of input {}", index)))?;
        let pub_key = CompressedPublicKey(secret_key.public_key(ctx.secp()));
        let ours = input
            .participants
            .index_of(&pub_key)
            .ok_or(Musig2Error::NotAParticipant)?;
        let other_key = input.participants.participant_pub_keys[1 - ours];
        let other_nonce = input
            .nonce_of(&other_key)
            .ok_or(Error::NonceExchangeIncomplete { index })?
            .pub_nonce
            .clone();

        let merkle_root = self.psbt.inputs[index]
            .tap_merkle_root
            .ok_or(Musig2Error::MissingMerkleRoot)?;
        let message = key_spend_sighash(&self.psbt, index)?;
        let tap_output_key = input.participants.tap_output_key;
        let sec_nonce =
            deterministic_sec_nonce(&secret_key, &other_nonce, &tap_output_key, &message)?;
        let pub_nonce = Musig2PubNonce {
            participant_pub_key: pub_key,
            tap_output_key,
            pub_nonce: sec_nonce.public_nonce(),
        };
        input.nonces.retain(|n| n.participant_pub_key != pub_key);
        input.nonces.push(pub_nonce.clone());

        let signature: PartialSignature = musig2::sign_partial(
            &input.key_agg_context(&merkle_root)?,
            to_musig2_scalar(&secret_key)?,
            sec_nonce,
            &input.aggregate_nonce()?,
            message,
        )
        .map_err(|e| Error::Signing(e.to_string()))?;

        let proprietary = &mut self.psbt.inputs[index].proprietary;
        pub_nonce.to_key_value().insert_into(proprietary);
        Musig2PartialSig {
            participant_pub_key: pub_key,
            tap_output_key,
            partial_sig: signature.serialize().to_vec(),
        }
        .to_key_value()
        .insert_into(proprietary);
        tracing::debug!(index, %pub_key, "signed musig2 input deterministically");
        Ok(())
    }

    /// Builds the final scriptSig/witness of one input.
    ///
    /// Inputs that are already final are left alone.
    ///
    /// # Returns
    /// - `Ok(())` when the input is final
    /// - `Err(Error::SignatureCountMismatch)` if the input lacks signatures; the container is
    ///   unchanged
    /// - `Err(Error::IndexOutOfBounds)` for an index past the last input
    pub fn finalize_input(&mut self, ctx: &Context, index: usize) -> Result<()> {
        self.check_input_index(index)?;
        let mut input = self.psbt.inputs[index].clone();
        if input.final_script_sig.is_some() || input.final_script_witness.is_some() {
            return Ok(());
        }

        if is_musig2_key_path(&input) {
            self.finalize_musig2_key_path(ctx, index, &mut input)?;
        } else if !input.tap_scripts.is_empty() {
            finalize_tap_script_path(index, &mut input)?;
        } else {
            finalize_ecdsa(index, &mut input)?;
        }

        clear_non_final_fields(&mut input);
        self.psbt.inputs[index] = input;
        tracing::debug!(index, "finalized input");
        Ok(())
    }

    fn finalize_musig2_key_path(
        &self,
        ctx: &Context,
        index: usize,
        input: &mut Input,
    ) -> Result<()> {
        let musig2 = Musig2Input::from_input(input)?;
        if musig2.partial_sigs.len() != 2 {
            return Err(Error::SignatureCountMismatch {
                index,
                expected: 2,
                actual: musig2.partial_sigs.len(),
            });
        }
        let merkle_root = input.tap_merkle_root.ok_or(Musig2Error::MissingMerkleRoot)?;
        let message = key_spend_sighash(&self.psbt, index)?;
        let signature = musig2.aggregate_signature(&message, &merkle_root)?;
        ctx.secp()
            .verify_schnorr(
                &signature.signature,
                &Message::from_digest(message),
                &musig2.participants.tap_output_key,
            )
            .map_err(|_| Error::Signing(format!("input {}: invalid aggregate signature", index)))?;
        input.final_script_witness = Some(Witness::from_slice(&[signature.to_vec()]));
        Ok(())
    }

    /// Finalizes every input, or none of them.
    pub fn finalize_all_inputs(&mut self, ctx: &Context) -> Result<()> {
        let mut scratch = self.clone();
        for index in 0..scratch.psbt.inputs.len() {
            scratch.finalize_input(ctx, index)?;
        }
        *self = scratch;
        Ok(())
    }

    /// Finalizes a copy of the container and returns the network encoding of its transaction.
    ///
    /// # Returns
    /// - `Ok(bytes)`: the signed transaction, in the Zcash format on branch-versioned networks
    /// - `Err(Error::SignatureCountMismatch)` if an input lacks signatures; the container is
    ///   left as it was
    pub fn extract_transaction(&self, ctx: &Context) -> Result<Vec<u8>> {
        let mut finalized = self.clone();
        finalized.finalize_all_inputs(ctx)?;
        let tx = finalized.current_transaction();
        self.encode_transaction(&tx)
    }
}

/// Leaf script `<x1> OP_CHECKSIGVERIFY <x2> OP_CHECKSIG`; the witness lists `x2`'s signature
/// first.
fn finalize_tap_script_path(index: usize, input: &mut Input) -> Result<()> {
    let mut leaves = input.tap_scripts.iter().map(|(control_block, (script, version))| {
        (control_block, script, TapLeafHash::from_script(script, *version))
    });
    let (control_block, script, leaf_hash) = leaves
        .find(|(_, _, hash)| input.tap_script_sigs.keys().any(|(_, h)| h == hash))
        .ok_or(Error::SignatureCountMismatch {
            index,
            expected: 2,
            actual: 0,
        })?;

    let bytes = script.as_bytes();
    if bytes.len() != 68 {
        return Err(Error::UnsupportedScriptType(format!(
            "input {}: unexpected tap leaf script",
            index
        )));
    }
    let keys = [&bytes[1..33], &bytes[35..67]]
        .map(|k| XOnlyPublicKey::from_slice(k).map_err(|e| Error::Signing(e.to_string())));
    let [first, second] = keys;
    let (first, second) = (first?, second?);

    let sigs: Vec<_> = [second, first]
        .iter()
        .filter_map(|key| input.tap_script_sigs.get(&(*key, leaf_hash)))
        .collect();
    if sigs.len() != 2 {
        return Err(Error::SignatureCountMismatch {
            index,
            expected: 2,
            actual: sigs.len(),
        });
    }
    let items = vec![
        sigs[0].to_vec(),
        sigs[1].to_vec(),
        script.to_bytes(),
        control_block.serialize(),
    ];
    input.final_script_witness = Some(Witness::from_slice(&items));
    Ok(())
}

fn finalize_ecdsa(index: usize, input: &mut Input) -> Result<()> {
    if input.witness_script.is_none() {
        let redeem_script = input.redeem_script.clone().ok_or_else(|| {
            Error::UnsupportedScriptType(format!("input {}: no redeem or witness script", index))
        })?;
        if let Some(key) = p2pk_key(&redeem_script) {
            let signature = input.partial_sigs.get(&key).ok_or(Error::SignatureCountMismatch {
                index,
                expected: 1,
                actual: input.partial_sigs.len(),
            })?;
            input.final_script_sig = Some(
                Builder::new()
                    .push_slice(push_bytes(signature.to_vec())?)
                    .push_slice(push_bytes(redeem_script.to_bytes())?)
                    .into_script(),
            );
            return Ok(());
        }
    }

    let multisig_script = input
        .witness_script
        .as_ref()
        .or(input.redeem_script.as_ref())
        .ok_or_else(|| Error::UnsupportedScriptType(format!("input {}: no script", index)))?;
    let keys = parse_multisig_script_2_of_3(multisig_script)
        .map_err(|e| Error::UnsupportedScriptType(format!("input {}: {}", index, e)))?;
    let signatures: Vec<Vec<u8>> = keys
        .iter()
        .filter_map(|key| input.partial_sigs.get(&PublicKey::from(*key)))
        .map(|sig| sig.to_vec())
        .collect();
    if signatures.len() != 2 {
        return Err(Error::SignatureCountMismatch {
            index,
            expected: 2,
            actual: signatures.len(),
        });
    }

    match (&input.redeem_script, &input.witness_script) {
        (Some(redeem_script), None) => {
            let mut builder = Builder::new().push_opcode(OP_PUSHBYTES_0);
            for sig in signatures {
                builder = builder.push_slice(push_bytes(sig)?);
            }
            input.final_script_sig = Some(
                builder
                    .push_slice(push_bytes(redeem_script.to_bytes())?)
                    .into_script(),
            );
        }
        (redeem_script, Some(witness_script)) => {
            let mut items = vec![vec![]];
            items.extend(signatures);
            items.push(witness_script.to_bytes());
            input.final_script_witness = Some(Witness::from_slice(&items));
            if let Some(redeem_script) = redeem_script {
                input.final_script_sig = Some(
                    Builder::new()
                        .push_slice(push_bytes(redeem_script.to_bytes())?)
                        .into_script(),
                );
            }
        }
        (None, None) => {
            return Err(Error::UnsupportedScriptType(format!(
                "input {}: no redeem or witness script",
                index
            )))
        }
    }
    Ok(())
}

/// Everything but the UTXO, final and unknown fields.
fn clear_non_final_fields(input: &mut Input) {
    clear_musig2_fields(input);
    input.partial_sigs.clear();
    input.sighash_type = None;
    input.redeem_script = None;
    input.witness_script = None;
    input.bip32_derivation.clear();
    input.tap_key_sig = None;
    input.tap_script_sigs.clear();
    input.tap_scripts.clear();
    input.tap_key_origins.clear();
    input.tap_internal_key = None;
    input.tap_merkle_root = None;
}
