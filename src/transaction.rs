use crate::{
    keys::KeyPair,
    script,
    signature::{self, DetachedSignature},
    Error, INITIAL_SEQUENCE,
};
use bitcoin::{
    blockdata::script::Builder,
    consensus::encode::{deserialize, serialize, serialize_hex},
    secp256k1::PublicKey,
    Address, Network, OutPoint, Script, Transaction, TxIn, TxOut, Txid,
};

/// An unspent P2PKH output funding a pool.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Utxo {
    pub txid: Txid,
    pub vout: u32,
    pub value: u64,
}

/// The on-chain funding transaction of a pool: P2PKH inputs feeding an
/// M-of-N multisig output at index 0, optionally followed by a change
/// output back to the funder.
///
/// Its txid anchors every spend transaction derived from the pool.
#[derive(Clone, Debug, PartialEq)]
pub struct BaseTransaction {
    inner: Transaction,
    amount: u64,
    output_index: u32,
}

impl BaseTransaction {
    /// Assemble and sign the funding transaction.
    ///
    /// With `pool_amount` set, the multisig output carries exactly that
    /// amount and a change output returns the remainder (kept even when
    /// zero-valued). Without it, the entire input sum minus the fee is
    /// swept into the multisig output.
    ///
    /// Sizing is done in two passes: all inputs are signed for real, the
    /// serialized size prices the fee, the affected output is adjusted and
    /// every input is re-signed.
    pub(crate) fn build(
        utxos: &[Utxo],
        lock_script: Script,
        pool_amount: Option<u64>,
        funder: &KeyPair,
        network: Network,
        fee_rate: f64,
    ) -> Result<BaseTransaction, Error> {
        let funder_script = p2pkh_output_script(&funder.public(), network);

        let input = utxos
            .iter()
            .map(|utxo| TxIn {
                previous_output: OutPoint::new(utxo.txid, utxo.vout),
                script_sig: Script::new(),
                sequence: 0xffff_ffff,
                witness: Vec::new(),
            })
            .collect();

        let total: u64 = utxos.iter().map(|utxo| utxo.value).sum();

        if let Some(pool) = pool_amount {
            if total < pool {
                return Err(Error::InsufficientFunds {
                    pool,
                    available: total,
                });
            }
        }

        let mut tx = Transaction {
            version: 1,
            lock_time: 0,
            input,
            output: vec![TxOut {
                value: pool_amount.unwrap_or(total),
                script_pubkey: lock_script,
            }],
        };
        if let Some(pool) = pool_amount {
            tx.output.push(TxOut {
                value: total - pool,
                script_pubkey: funder_script.clone(),
            });
        }

        sign_funding_inputs(&mut tx, utxos, &funder_script, funder);

        let size = serialize(&tx).len();
        let fee = estimate_fee(size, fee_rate);

        let amount = match pool_amount {
            Some(pool) => {
                if total - pool < fee {
                    return Err(Error::InsufficientFundsForFee {
                        pool,
                        fee,
                        available: total,
                    });
                }
                tx.output[1].value = total - pool - fee;
                pool
            }
            None => {
                if total < fee {
                    return Err(Error::InsufficientFundsForFee {
                        pool: total,
                        fee,
                        available: total,
                    });
                }
                tx.output[0].value = total - fee;
                total - fee
            }
        };

        sign_funding_inputs(&mut tx, utxos, &funder_script, funder);

        Ok(BaseTransaction {
            inner: tx,
            amount,
            output_index: 0,
        })
    }

    pub fn transaction(&self) -> &Transaction {
        &self.inner
    }

    pub fn txid(&self) -> Txid {
        self.inner.txid()
    }

    /// Satoshis locked into the multisig output.
    pub fn amount(&self) -> u64 {
        self.amount
    }

    /// Index of the multisig output within the transaction.
    pub fn output_index(&self) -> u32 {
        self.output_index
    }

    pub fn to_hex(&self) -> String {
        serialize_hex(&self.inner)
    }
}

/// The off-chain transaction distributing a pool's value to its
/// participants, re-parameterized on every update and only broadcast to
/// settle.
///
/// `funding` holds the multisig prevout (pool satoshis and redeem script)
/// that sighash computation needs. Transactions reconstituted from hex
/// carry no funding context until one is installed; signing without it
/// fails with [`Error::MissingFundingContext`].
#[derive(Clone, Debug, PartialEq)]
pub struct SpendTransaction {
    inner: Transaction,
    funding: Option<TxOut>,
}

impl SpendTransaction {
    /// Build the fee-sized draft: a single input spending `prev_txid:0`
    /// at sequence [`INITIAL_SEQUENCE`], locktime `end_height`, and two
    /// P2PKH outputs whose values the caller distributes afterwards.
    ///
    /// A placeholder unlocking script of final size is installed for the
    /// sizing pass and intentionally left in place; it does not influence
    /// signatures and is overwritten by the merge step. Returns the draft
    /// and the fee it priced in.
    pub(crate) fn draft(
        prev_txid: Txid,
        pool_amount: u64,
        end_height: u32,
        redeem_script: Script,
        first_script: Script,
        second_script: Script,
        fee_rate: f64,
    ) -> Result<(SpendTransaction, u64), Error> {
        let inner = Transaction {
            version: 1,
            lock_time: end_height,
            input: vec![TxIn {
                previous_output: OutPoint::new(prev_txid, 0),
                script_sig: script::fake_multisig_unlock(2),
                sequence: INITIAL_SEQUENCE,
                witness: Vec::new(),
            }],
            output: vec![
                TxOut {
                    value: 0,
                    script_pubkey: first_script,
                },
                TxOut {
                    value: pool_amount,
                    script_pubkey: second_script,
                },
            ],
        };

        let size = serialize(&inner).len();
        let fee = estimate_fee(size, fee_rate);
        if pool_amount < fee {
            return Err(Error::InsufficientPool {
                pool: pool_amount,
                fee,
            });
        }

        Ok((
            SpendTransaction {
                inner,
                funding: Some(TxOut {
                    value: pool_amount,
                    script_pubkey: redeem_script,
                }),
            },
            fee,
        ))
    }

    /// Reconstitute a spend transaction from consensus hex, without
    /// funding context.
    pub fn from_hex(hex: &str) -> Result<SpendTransaction, Error> {
        let bytes = hex::decode(hex)?;
        let inner: Transaction = deserialize(&bytes)?;

        if inner.input.len() != 1 || inner.output.len() != 2 {
            return Err(Error::MalformedSpendTransaction);
        }

        Ok(SpendTransaction {
            inner,
            funding: None,
        })
    }

    pub fn to_hex(&self) -> String {
        serialize_hex(&self.inner)
    }

    pub fn txid(&self) -> Txid {
        self.inner.txid()
    }

    pub fn transaction(&self) -> &Transaction {
        &self.inner
    }

    pub fn lock_time(&self) -> u32 {
        self.inner.lock_time
    }

    pub fn sequence(&self) -> u32 {
        self.inner.input[0].sequence
    }

    pub fn output_value(&self, index: usize) -> u64 {
        self.inner.output[index].value
    }

    pub fn funding(&self) -> Option<&TxOut> {
        self.funding.as_ref()
    }

    /// Install the multisig prevout used for sighash computation.
    pub fn set_funding(&mut self, value: u64, redeem_script: Script) {
        self.funding = Some(TxOut {
            value,
            script_pubkey: redeem_script,
        });
    }

    /// Produce a detached signature over the pool input with the
    /// installed funding context.
    pub(crate) fn sign(&self, keypair: &KeyPair) -> Result<DetachedSignature, Error> {
        let funding = self.funding.as_ref().ok_or(Error::MissingFundingContext)?;

        Ok(signature::sign_input(
            &self.inner,
            0,
            &funding.script_pubkey,
            funding.value,
            keypair,
        ))
    }

    /// Re-parameterize in place: optionally overwrite the locktime, set
    /// the input sequence, and move `first_value` satoshis to output 0
    /// while output 1 keeps the remainder. The output sum is preserved
    /// exactly; the fee priced into the original build stays absorbed.
    pub(crate) fn reparam(
        &mut self,
        lock_time: Option<u32>,
        sequence: u32,
        first_value: u64,
    ) -> Result<(), Error> {
        if let Some(lock_time) = lock_time {
            self.inner.lock_time = lock_time;
        }
        self.inner.input[0].sequence = sequence;

        let total = self.inner.output[0]
            .value
            .checked_add(self.inner.output[1].value)
            .ok_or(Error::MalformedSpendTransaction)?;
        let second_value = total
            .checked_sub(first_value)
            .ok_or(Error::SplitExceedsPool {
                split: first_value,
                total,
            })?;
        self.inner.output[0].value = first_value;
        self.inner.output[1].value = second_value;

        Ok(())
    }

    pub(crate) fn set_output_values(&mut self, first: u64, second: u64) {
        self.inner.output[0].value = first;
        self.inner.output[1].value = second;
    }

    pub(crate) fn install_unlock(&mut self, signatures: &[DetachedSignature]) {
        self.inner.input[0].script_sig = script::multisig_unlock(signatures);
    }

    /// Read the pool parameters recorded in this transaction.
    pub fn info(&self) -> PoolInfo {
        PoolInfo {
            expiry_height: self.inner.lock_time,
            funding_txid: self.inner.input[0].previous_output.txid,
        }
    }
}

/// Pool parameters recoverable from a spend transaction alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolInfo {
    /// Block height after which the transaction can be broadcast
    /// unilaterally ([`crate::FINAL_LOCK_TIME`] once the pool is closed).
    pub expiry_height: u32,
    /// Txid of the base transaction whose multisig output is being spent.
    pub funding_txid: Txid,
}

fn sign_funding_inputs(
    tx: &mut Transaction,
    utxos: &[Utxo],
    prev_script: &Script,
    funder: &KeyPair,
) {
    for (index, utxo) in utxos.iter().enumerate() {
        let signature = signature::sign_input(tx, index, prev_script, utxo.value, funder);
        tx.input[index].script_sig = p2pkh_unlocking_script(&signature, &funder.public());
    }
}

pub(crate) fn p2pkh_output_script(public_key: &PublicKey, network: Network) -> Script {
    let address = Address::p2pkh(
        &bitcoin::PublicKey {
            compressed: true,
            key: *public_key,
        },
        network,
    );

    address.script_pubkey()
}

fn p2pkh_unlocking_script(signature: &DetachedSignature, public_key: &PublicKey) -> Script {
    Builder::new()
        .push_slice(signature.as_bytes())
        .push_slice(&public_key.serialize())
        .into_script()
}

/// Fee for a transaction of `size` bytes at `fee_rate` satoshis per 1000
/// bytes, floored to one satoshi.
///
/// The truncating float arithmetic is part of the wire contract: peers
/// pricing the same transaction must arrive at the same fee, bit for bit.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub(crate) fn estimate_fee(size: usize, fee_rate: f64) -> u64 {
    let fee = (size as f64 / 1000.0 * fee_rate) as u64;

    if fee == 0 {
        1
    } else {
        fee
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::public_key_from_hex;
    use bitcoin::hashes::hex::FromHex;

    const CLIENT_PUB: &str = "028bd4b450d28a69ed1a5cc9f256d0f3f94c4dedb885aae7144868a511b03511b0";

    #[test]
    fn p2pkh_script_matches_reference_hash() {
        let client = public_key_from_hex(CLIENT_PUB).unwrap();

        let script = p2pkh_output_script(&client, Network::Testnet);

        assert_eq!(
            hex::encode(script.as_bytes()),
            "76a914e803a69218895a1a8d3df0f33a5b3d95bbb5a9c688ac"
        );
        // The script itself is network independent; only the address
        // encoding differs.
        assert_eq!(script, p2pkh_output_script(&client, Network::Bitcoin));
    }

    #[test]
    fn fee_is_truncated_and_floored() {
        assert_eq!(estimate_fee(191, 0.5), 1);
        assert_eq!(estimate_fee(1999, 0.5), 1);
        assert_eq!(estimate_fee(4000, 0.5), 2);
        assert_eq!(estimate_fee(3000, 1.0), 3);
    }

    #[test]
    fn draft_has_initial_shape() {
        let txid =
            Txid::from_hex("3bc591b12d1d356c80eec9628a626c2676c27e21fe8e0ef34d6dab2e425d9629")
                .unwrap();
        let redeem = Script::new();

        let (draft, fee) = SpendTransaction::draft(
            txid,
            206_105,
            1_687_365,
            redeem,
            Script::new(),
            Script::new(),
            0.5,
        )
        .unwrap();

        assert_eq!(fee, 1);
        assert_eq!(draft.sequence(), INITIAL_SEQUENCE);
        assert_eq!(draft.lock_time(), 1_687_365);
        assert_eq!(draft.info().funding_txid, txid);
        assert_eq!(draft.funding().unwrap().value, 206_105);
        // The sizing placeholder stays installed on the draft.
        assert_eq!(
            draft.transaction().input[0].script_sig,
            script::fake_multisig_unlock(2)
        );
    }

    #[test]
    fn draft_rejects_pool_below_fee() {
        let txid = OutPoint::null().txid;

        let res = SpendTransaction::draft(
            txid,
            0,
            0,
            Script::new(),
            Script::new(),
            Script::new(),
            0.5,
        );

        assert!(matches!(res, Err(Error::InsufficientPool { .. })));
    }

    #[test]
    fn reparam_preserves_the_output_sum() {
        let (mut draft, _) = SpendTransaction::draft(
            OutPoint::null().txid,
            50_000,
            800_000,
            Script::new(),
            Script::new(),
            Script::new(),
            0.5,
        )
        .unwrap();
        draft.set_output_values(100, 49_899);

        draft.reparam(None, 2, 1_500).unwrap();

        assert_eq!(draft.sequence(), 2);
        assert_eq!(draft.output_value(0), 1_500);
        assert_eq!(draft.output_value(1), 48_499);
        assert_eq!(draft.output_value(0) + draft.output_value(1), 49_999);
    }

    #[test]
    fn reparam_rejects_split_beyond_the_pool() {
        let (mut draft, _) = SpendTransaction::draft(
            OutPoint::null().txid,
            50_000,
            800_000,
            Script::new(),
            Script::new(),
            Script::new(),
            0.5,
        )
        .unwrap();

        let res = draft.reparam(None, 2, 60_000);

        assert!(matches!(res, Err(Error::SplitExceedsPool { .. })));
    }

    #[test]
    fn from_hex_rejects_non_spend_shapes() {
        // A single-input single-output transaction is not a spend
        // transaction.
        let tx = Transaction {
            version: 1,
            lock_time: 0,
            input: vec![TxIn {
                previous_output: OutPoint::default(),
                script_sig: Script::new(),
                sequence: 1,
                witness: Vec::new(),
            }],
            output: vec![TxOut {
                value: 1,
                script_pubkey: Script::new(),
            }],
        };

        let res = SpendTransaction::from_hex(&serialize_hex(&tx));

        assert!(matches!(res, Err(Error::MalformedSpendTransaction)));
    }

    #[test]
    fn from_hex_rejects_garbage() {
        assert!(matches!(
            SpendTransaction::from_hex("zz"),
            Err(Error::Hex(_))
        ));
        assert!(matches!(
            SpendTransaction::from_hex("0100"),
            Err(Error::TxDecode(_))
        ));
    }
}
