//! Triple fee pool: a 2-of-3 multisig between client A, client B and an
//! arbitrating server.
//!
//! A funds the pool and initiates the spend; B countersigns during normal
//! negotiation, while the server only signs to arbitrate a dispute. The
//! canonical redeem script orders the public keys `[server, A, B]`, and
//! every unlocking script carries its two signatures in that same order.

use crate::{
    keys::KeyPair,
    script,
    signature::DetachedSignature,
    transaction::{p2pkh_output_script, BaseTransaction, SpendTransaction, Utxo},
    Error,
};
use bitcoin::{secp256k1::PublicKey, Network, Script, Txid};

/// The pool's redeem script: `OP_2 <server> <A> <B> OP_3
/// OP_CHECKMULTISIG`.
pub fn redeem_script(
    server_pub: PublicKey,
    a_pub: PublicKey,
    b_pub: PublicKey,
) -> Result<Script, Error> {
    script::multisig_lock(&[server_pub, a_pub, b_pub], 2)
}

/// Fund a pool of exactly `pool_amount` satoshis from A's UTXOs, with a
/// change output back to A.
#[allow(clippy::too_many_arguments)]
pub fn build_base(
    utxos: &[Utxo],
    pool_amount: u64,
    client_a: &KeyPair,
    server_pub: PublicKey,
    b_pub: PublicKey,
    network: Network,
    fee_rate: f64,
) -> Result<BaseTransaction, Error> {
    let lock_script = redeem_script(server_pub, client_a.public(), b_pub)?;

    BaseTransaction::build(
        utxos,
        lock_script,
        Some(pool_amount),
        client_a,
        network,
        fee_rate,
    )
}

/// Fund a pool with the entire input sum minus the fee, omitting the
/// change output.
pub fn build_base_sweep(
    utxos: &[Utxo],
    client_a: &KeyPair,
    server_pub: PublicKey,
    b_pub: PublicKey,
    network: Network,
    fee_rate: f64,
) -> Result<BaseTransaction, Error> {
    let lock_script = redeem_script(server_pub, client_a.public(), b_pub)?;

    BaseTransaction::build(utxos, lock_script, None, client_a, network, fee_rate)
}

/// Build the initial spend transaction and A's detached signature over
/// it.
///
/// Output 0 pays B and starts at zero; output 1 pays A `base_amount -
/// fee`. Redistribution towards B happens through the update path.
/// Returns the draft (sequence 1, locktime `end_height`), A's signature,
/// and A's amount.
pub fn build_spend(
    base: &BaseTransaction,
    end_height: u32,
    client_a: &KeyPair,
    server_pub: PublicKey,
    b_pub: PublicKey,
    network: Network,
    fee_rate: f64,
) -> Result<(SpendTransaction, DetachedSignature, u64), Error> {
    let (mut tx, a_amount) = build_spend_raw(
        base.txid(),
        base.amount(),
        end_height,
        client_a.public(),
        server_pub,
        b_pub,
        network,
        fee_rate,
    )?;

    let a_sig = a_sign(&mut tx, base.amount(), client_a, server_pub, b_pub)?;

    Ok((tx, a_sig, a_amount))
}

/// Build the unsigned spend draft against `prev_txid:0` and return it
/// together with A's amount.
#[allow(clippy::too_many_arguments)]
pub fn build_spend_raw(
    prev_txid: Txid,
    base_amount: u64,
    end_height: u32,
    a_pub: PublicKey,
    server_pub: PublicKey,
    b_pub: PublicKey,
    network: Network,
    fee_rate: f64,
) -> Result<(SpendTransaction, u64), Error> {
    let redeem = redeem_script(server_pub, a_pub, b_pub)?;
    let b_script = p2pkh_output_script(&b_pub, network);
    let a_script = p2pkh_output_script(&a_pub, network);

    let (mut tx, fee) = SpendTransaction::draft(
        prev_txid,
        base_amount,
        end_height,
        redeem,
        b_script,
        a_script,
        fee_rate,
    )?;

    // The InsufficientPool check in draft() guarantees this subtraction.
    let a_amount = base_amount - fee;
    tx.set_output_values(0, a_amount);

    Ok((tx, a_amount))
}

/// Sign the spend transaction as A, installing the funding context first.
pub fn a_sign(
    tx: &mut SpendTransaction,
    base_amount: u64,
    client_a: &KeyPair,
    server_pub: PublicKey,
    b_pub: PublicKey,
) -> Result<DetachedSignature, Error> {
    let redeem = redeem_script(server_pub, client_a.public(), b_pub)?;
    tx.set_funding(base_amount, redeem);

    tx.sign(client_a)
}

/// Countersign the spend transaction as B, installing the funding context
/// first.
pub fn b_sign(
    tx: &mut SpendTransaction,
    base_amount: u64,
    client_b: &KeyPair,
    server_pub: PublicKey,
    a_pub: PublicKey,
) -> Result<DetachedSignature, Error> {
    let redeem = redeem_script(server_pub, a_pub, client_b.public())?;
    tx.set_funding(base_amount, redeem);

    tx.sign(client_b)
}

/// Countersign the spend transaction as the arbitrating server,
/// installing the funding context first.
pub fn server_sign(
    tx: &mut SpendTransaction,
    base_amount: u64,
    server: &KeyPair,
    a_pub: PublicKey,
    b_pub: PublicKey,
) -> Result<DetachedSignature, Error> {
    let redeem = redeem_script(server.public(), a_pub, b_pub)?;
    tx.set_funding(base_amount, redeem);

    tx.sign(server)
}

/// Reload a spend transaction from hex and re-parameterize it for the
/// next state: new sequence, new B amount on output 0 (A keeps the
/// remainder on output 1), optionally a new locktime, with the funding
/// context reinstalled for the signatures that follow.
///
/// Closing the pool is this very operation with locktime and sequence set
/// to [`crate::FINAL_LOCK_TIME`] and [`crate::FINAL_SEQUENCE`].
#[allow(clippy::too_many_arguments)]
pub fn load(
    hex: &str,
    lock_time: Option<u32>,
    sequence: u32,
    b_amount: u64,
    server_pub: PublicKey,
    a_pub: PublicKey,
    b_pub: PublicKey,
    base_amount: u64,
) -> Result<SpendTransaction, Error> {
    let mut tx = SpendTransaction::from_hex(hex)?;

    tx.set_funding(base_amount, redeem_script(server_pub, a_pub, b_pub)?);
    tx.reparam(lock_time, sequence, b_amount)?;

    Ok(tx)
}

/// Sign a re-parameterized spend transaction as A. The funding context
/// must already be installed (see [`load`]).
pub fn a_update_sign(
    tx: &SpendTransaction,
    client_a: &KeyPair,
) -> Result<DetachedSignature, Error> {
    tx.sign(client_a)
}

/// Sign a re-parameterized spend transaction as B. The funding context
/// must already be installed (see [`load`]).
pub fn b_update_sign(
    tx: &SpendTransaction,
    client_b: &KeyPair,
) -> Result<DetachedSignature, Error> {
    tx.sign(client_b)
}

/// Sign a re-parameterized spend transaction as the arbitrating server.
/// The funding context must already be installed (see [`load`]).
pub fn server_update_sign(
    tx: &SpendTransaction,
    server: &KeyPair,
) -> Result<DetachedSignature, Error> {
    tx.sign(server)
}

/// Combine two detached signatures into the final unlocking script:
/// `OP_0 <first_sig> <second_sig>`.
///
/// The signatures must be given in the order their public keys appear in
/// the redeem script: `[server_sig, a_sig]` for a server-arbitrated
/// spend, `[a_sig, b_sig]` for a client-negotiated update.
pub fn merge_sigs(
    hex: &str,
    first_sig: &DetachedSignature,
    second_sig: &DetachedSignature,
) -> Result<SpendTransaction, Error> {
    let mut tx = SpendTransaction::from_hex(hex)?;
    tx.install_unlock(&[first_sig.clone(), second_sig.clone()]);

    Ok(tx)
}

/// Verify A's signature over the initial spend transaction.
/// `total_amount` is the satoshi value of the multisig output being
/// spent.
pub fn verify_a_spend_sig(
    tx: &SpendTransaction,
    total_amount: u64,
    server_pub: PublicKey,
    a_pub: PublicKey,
    b_pub: PublicKey,
    sig: &DetachedSignature,
) -> Result<(), Error> {
    verify(tx, total_amount, server_pub, a_pub, b_pub, &a_pub, sig)
}

/// Verify B's signature over the initial spend transaction.
pub fn verify_b_spend_sig(
    tx: &SpendTransaction,
    total_amount: u64,
    server_pub: PublicKey,
    a_pub: PublicKey,
    b_pub: PublicKey,
    sig: &DetachedSignature,
) -> Result<(), Error> {
    verify(tx, total_amount, server_pub, a_pub, b_pub, &b_pub, sig)
}

/// Verify the server's signature over the initial spend transaction.
pub fn verify_server_spend_sig(
    tx: &SpendTransaction,
    total_amount: u64,
    server_pub: PublicKey,
    a_pub: PublicKey,
    b_pub: PublicKey,
    sig: &DetachedSignature,
) -> Result<(), Error> {
    verify(tx, total_amount, server_pub, a_pub, b_pub, &server_pub, sig)
}

/// Verify A's signature over a re-parameterized spend transaction,
/// reading the spent amount from the installed funding context.
pub fn verify_a_update_sig(
    tx: &SpendTransaction,
    server_pub: PublicKey,
    a_pub: PublicKey,
    b_pub: PublicKey,
    sig: &DetachedSignature,
) -> Result<(), Error> {
    let funding = tx.funding().ok_or(Error::MissingFundingContext)?;

    verify(tx, funding.value, server_pub, a_pub, b_pub, &a_pub, sig)
}

/// Verify B's signature over a re-parameterized spend transaction,
/// reading the spent amount from the installed funding context.
pub fn verify_b_update_sig(
    tx: &SpendTransaction,
    server_pub: PublicKey,
    a_pub: PublicKey,
    b_pub: PublicKey,
    sig: &DetachedSignature,
) -> Result<(), Error> {
    let funding = tx.funding().ok_or(Error::MissingFundingContext)?;

    verify(tx, funding.value, server_pub, a_pub, b_pub, &b_pub, sig)
}

/// Verify the server's signature over a re-parameterized spend
/// transaction, reading the spent amount from the installed funding
/// context.
pub fn verify_server_update_sig(
    tx: &SpendTransaction,
    server_pub: PublicKey,
    a_pub: PublicKey,
    b_pub: PublicKey,
    sig: &DetachedSignature,
) -> Result<(), Error> {
    let funding = tx.funding().ok_or(Error::MissingFundingContext)?;

    verify(
        tx,
        funding.value,
        server_pub,
        a_pub,
        b_pub,
        &server_pub,
        sig,
    )
}

#[allow(clippy::too_many_arguments)]
fn verify(
    tx: &SpendTransaction,
    total_amount: u64,
    server_pub: PublicKey,
    a_pub: PublicKey,
    b_pub: PublicKey,
    signer: &PublicKey,
    sig: &DetachedSignature,
) -> Result<(), Error> {
    let redeem = redeem_script(server_pub, a_pub, b_pub)?;

    crate::signature::verify_input(tx.transaction(), 0, &redeem, total_amount, signer, sig)
}
