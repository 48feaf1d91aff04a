//! BIP143-style sighash with the fork-ID type, as used by BSV-family
//! chains for every input since the fork.
//!
//! The layout matches the segwit preimage: `version || hashPrevouts ||
//! hashSequence || outpoint || scriptCode || value || sequence || hashOutputs ||
//! locktime || sighash type`, with the sighash type serialized as the
//! 4-byte little-endian value `0x41` (`ALL | FORKID`).

use bitcoin::{
    consensus::encode::serialize,
    hashes::{sha256d, Hash},
    Script, SigHash, Transaction,
};

/// `SIGHASH_ALL | SIGHASH_FORKID`, the only sighash flag the pool protocol
/// uses. Every detached signature ends with this byte.
pub const SIGHASH_ALL_FORKID: u8 = 0x41;

/// Compute the signature digest for `input_index`: the double SHA-256 of
/// [`preimage`].
pub fn sighash(
    tx: &Transaction,
    input_index: usize,
    script_code: &Script,
    value: u64,
) -> SigHash {
    let digest = sha256d::Hash::hash(&preimage(tx, input_index, script_code, value));

    SigHash::from_inner(digest.into_inner())
}

/// Build the fork-ID sighash preimage for `input_index`.
///
/// `script_code` is the locking script of the output being spent (the
/// P2PKH script for funding inputs, the multisig redeem script for pool
/// inputs) and `value` its satoshi amount.
pub fn preimage(
    tx: &Transaction,
    input_index: usize,
    script_code: &Script,
    value: u64,
) -> Vec<u8> {
    let mut prevouts = Vec::with_capacity(36 * tx.input.len());
    let mut sequences = Vec::with_capacity(4 * tx.input.len());
    for input in &tx.input {
        prevouts.extend(serialize(&input.previous_output));
        sequences.extend(serialize(&input.sequence));
    }
    let hash_prevouts = sha256d::Hash::hash(&prevouts);
    let hash_sequence = sha256d::Hash::hash(&sequences);

    let mut outputs = Vec::new();
    for output in &tx.output {
        outputs.extend(serialize(output));
    }
    let hash_outputs = sha256d::Hash::hash(&outputs);

    let input = &tx.input[input_index];

    let mut preimage = Vec::new();
    preimage.extend(serialize(&tx.version));
    preimage.extend(hash_prevouts.into_inner().iter());
    preimage.extend(hash_sequence.into_inner().iter());
    preimage.extend(serialize(&input.previous_output));
    preimage.extend(serialize(script_code));
    preimage.extend(serialize(&value));
    preimage.extend(serialize(&input.sequence));
    preimage.extend(hash_outputs.into_inner().iter());
    preimage.extend(serialize(&tx.lock_time));
    preimage.extend(serialize(&u32::from(SIGHASH_ALL_FORKID)));

    preimage
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::{OutPoint, TxIn, TxOut};

    fn dummy_tx() -> Transaction {
        Transaction {
            version: 1,
            lock_time: 500_000,
            input: vec![TxIn {
                previous_output: OutPoint::default(),
                script_sig: Script::new(),
                sequence: 1,
                witness: Vec::new(),
            }],
            output: vec![TxOut {
                value: 1_000,
                script_pubkey: Script::new(),
            }],
        }
    }

    #[test]
    fn preimage_has_bip143_layout() {
        let tx = dummy_tx();
        let script_code = Script::new();

        let preimage = preimage(&tx, 0, &script_code, 50_000);

        // version(4) + hashPrevouts(32) + hashSequence(32) + outpoint(36)
        // + scriptCode(1 varint + 0) + value(8) + sequence(4)
        // + hashOutputs(32) + locktime(4) + sighash type(4)
        assert_eq!(preimage.len(), 157);
        // Trailer: locktime then the fork-ID sighash type, both LE.
        assert_eq!(&preimage[149..153], &500_000u32.to_le_bytes());
        assert_eq!(&preimage[153..], &[0x41, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn digest_commits_to_the_spent_value() {
        let tx = dummy_tx();
        let script_code = Script::new();

        let one = sighash(&tx, 0, &script_code, 50_000);
        let other = sighash(&tx, 0, &script_code, 50_001);

        assert_ne!(one, other);
    }
}
