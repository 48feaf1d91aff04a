use crate::{signature::DetachedSignature, Error};
use bitcoin::{
    blockdata::{
        opcodes::{self, all::OP_CHECKMULTISIG, all::OP_PUSHNUM_1},
        script::Builder,
    },
    secp256k1::PublicKey,
    Script,
};

/// Upper bound of a DER-encoded ECDSA signature plus the sighash flag byte.
const MAX_SIGNATURE_LEN: usize = 73;

/// Build a bare M-of-N multisig locking script:
/// `OP_M <pk_1> … <pk_N> OP_N OP_CHECKMULTISIG`.
///
/// Public keys are pushed compressed, in the order given. That order is
/// part of the pool's on-chain identity: permuting it yields a different
/// locking script and therefore a different funding output.
pub fn multisig_lock(public_keys: &[PublicKey], required: usize) -> Result<Script, Error> {
    let available = public_keys.len();

    if required == 0 || required > available {
        return Err(Error::InvalidRequiredSignatures {
            required,
            available,
        });
    }
    if available == 0 || available > 20 {
        return Err(Error::InvalidPublicKeyCount(available));
    }

    let mut builder = Builder::new().push_opcode(pushnum(required));
    for public_key in public_keys {
        builder = builder.push_slice(&public_key.serialize());
    }

    Ok(builder
        .push_opcode(pushnum(available))
        .push_opcode(OP_CHECKMULTISIG)
        .into_script())
}

/// Build a placeholder unlocking script of the same size as a real M-of-N
/// unlocking script, for fee estimation only: `OP_0` followed by `required`
/// pushes of 73 zero bytes.
pub fn fake_multisig_unlock(required: usize) -> Script {
    let placeholder = [0u8; MAX_SIGNATURE_LEN];

    let mut builder = Builder::new().push_opcode(opcodes::OP_FALSE);
    for _ in 0..required {
        builder = builder.push_slice(&placeholder);
    }

    builder.into_script()
}

/// Assemble the final unlocking script from detached signatures:
/// `OP_0 <sig_1> … <sig_M>`.
///
/// Signatures are pushed verbatim, in the order given. `OP_CHECKMULTISIG`
/// consumes signatures and public keys in parallel, so callers must supply
/// them in the order their public keys appear in the redeem script.
pub fn multisig_unlock(signatures: &[DetachedSignature]) -> Script {
    let mut builder = Builder::new().push_opcode(opcodes::OP_FALSE);
    for signature in signatures {
        builder = builder.push_slice(signature.as_bytes());
    }

    builder.into_script()
}

// The small-number opcode `OP_1 + (n - 1)`. Key counts up to 20 use the
// same formula; the 1..=20 bound is enforced by multisig_lock.
fn pushnum(n: usize) -> opcodes::All {
    #[allow(clippy::cast_possible_truncation)]
    opcodes::All::from(OP_PUSHNUM_1.into_u8() + (n as u8 - 1))
}
