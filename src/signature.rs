use crate::{
    keys::{KeyPair, SECP},
    sighash::{self, SIGHASH_ALL_FORKID},
    Error,
};
use bitcoin::{
    hashes::Hash,
    secp256k1::{Message, PublicKey, Signature},
    Script, Transaction,
};
use std::fmt;

/// A signature held outside any transaction script: `DER(r, s) || 0x41`.
///
/// Parties exchange these as opaque byte strings; they are only assembled
/// into an unlocking script by the merge step. Construction from raw bytes
/// is unchecked; validation happens when the signature is verified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetachedSignature(Vec<u8>);

impl DetachedSignature {
    pub fn from_bytes(bytes: Vec<u8>) -> DetachedSignature {
        DetachedSignature(bytes)
    }

    pub fn from_hex(hex: &str) -> Result<DetachedSignature, Error> {
        Ok(DetachedSignature(hex::decode(hex)?))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The trailing sighash flag byte, if any.
    pub fn flag(&self) -> Option<u8> {
        self.0.last().copied()
    }

    fn from_ecdsa(signature: Signature) -> DetachedSignature {
        let mut bytes = signature.serialize_der().to_vec();
        bytes.push(SIGHASH_ALL_FORKID);

        DetachedSignature(bytes)
    }
}

impl fmt::Display for DetachedSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Sign `input_index` of `tx` with the fork-ID sighash.
///
/// `script_code` and `value` describe the output being spent. Signing is
/// deterministic (RFC 6979), so identical inputs always produce identical
/// bytes.
pub fn sign_input(
    tx: &Transaction,
    input_index: usize,
    script_code: &Script,
    value: u64,
    keypair: &KeyPair,
) -> DetachedSignature {
    let message = digest(tx, input_index, script_code, value);
    let signature = SECP.sign(&message, keypair.secret());

    DetachedSignature::from_ecdsa(signature)
}

/// Verify a detached signature over `input_index` of `tx` against
/// `public_key`, in the context of the given `redeem_script` and spent
/// `value`.
///
/// The sighash flag byte is checked before any curve operation; a
/// signature that does not end in `0x41` never verifies.
pub fn verify_input(
    tx: &Transaction,
    input_index: usize,
    redeem_script: &Script,
    value: u64,
    public_key: &PublicKey,
    signature: &DetachedSignature,
) -> Result<(), Error> {
    let bytes = signature.as_bytes();
    if bytes.len() < 10 {
        return Err(Error::InvalidSignatureLength(bytes.len()));
    }

    let flag = bytes[bytes.len() - 1];
    if flag != SIGHASH_ALL_FORKID {
        return Err(Error::UnexpectedSighashFlag {
            expected: SIGHASH_ALL_FORKID,
            actual: flag,
        });
    }

    let message = digest(tx, input_index, redeem_script, value);
    let der = Signature::from_der(&bytes[..bytes.len() - 1]).map_err(Error::DerParse)?;

    SECP.verify(&message, &der, public_key)
        .map_err(|_| Error::SignatureVerification)
}

fn digest(tx: &Transaction, input_index: usize, script_code: &Script, value: u64) -> Message {
    let sighash = sighash::sighash(tx, input_index, script_code, value);

    Message::from_slice(&sighash.into_inner()).expect("sighash digest is 32 bytes")
}
