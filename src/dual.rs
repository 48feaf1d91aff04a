//! Dual fee pool: a 2-of-2 multisig between a client and a server.
//!
//! The client funds the pool and initiates every spend; the server
//! countersigns. The canonical redeem script orders the public keys
//! `[server, client]`, and every unlocking script carries the signatures
//! in that same order.

use crate::{
    keys::KeyPair,
    script,
    signature::DetachedSignature,
    transaction::{p2pkh_output_script, BaseTransaction, SpendTransaction, Utxo},
    Error,
};
use bitcoin::{secp256k1::PublicKey, Network, Script, Txid};

/// The pool's redeem script: `OP_2 <server> <client> OP_2
/// OP_CHECKMULTISIG`.
pub fn redeem_script(server_pub: PublicKey, client_pub: PublicKey) -> Result<Script, Error> {
    script::multisig_lock(&[server_pub, client_pub], 2)
}

/// Fund a pool of exactly `pool_amount` satoshis from the client's UTXOs.
///
/// Output 0 locks `pool_amount` into the 2-of-2 multisig; output 1 returns
/// the change (kept even when zero-valued) to the client, net of the fee.
pub fn build_base(
    utxos: &[Utxo],
    pool_amount: u64,
    client: &KeyPair,
    server_pub: PublicKey,
    network: Network,
    fee_rate: f64,
) -> Result<BaseTransaction, Error> {
    let lock_script = redeem_script(server_pub, client.public())?;

    BaseTransaction::build(
        utxos,
        lock_script,
        Some(pool_amount),
        client,
        network,
        fee_rate,
    )
}

/// Fund a pool with the entire input sum minus the fee, omitting the
/// change output.
pub fn build_base_sweep(
    utxos: &[Utxo],
    client: &KeyPair,
    server_pub: PublicKey,
    network: Network,
    fee_rate: f64,
) -> Result<BaseTransaction, Error> {
    let lock_script = redeem_script(server_pub, client.public())?;

    BaseTransaction::build(utxos, lock_script, None, client, network, fee_rate)
}

/// Build the initial spend transaction and the client's detached
/// signature over it.
///
/// The server output receives `server_amount` exactly; the client output
/// receives `base_amount - server_amount - fee`, absorbing the fee.
/// Returns the draft (sequence 1, locktime `end_height`), the client
/// signature, and the client amount.
pub fn build_spend(
    base: &BaseTransaction,
    server_amount: u64,
    end_height: u32,
    client: &KeyPair,
    server_pub: PublicKey,
    network: Network,
    fee_rate: f64,
) -> Result<(SpendTransaction, DetachedSignature, u64), Error> {
    let (mut tx, client_amount) = build_spend_raw(
        base.txid(),
        base.amount(),
        server_amount,
        end_height,
        client.public(),
        server_pub,
        network,
        fee_rate,
    )?;

    let client_sig = client_sign(&mut tx, base.amount(), client, server_pub)?;

    Ok((tx, client_sig, client_amount))
}

/// Build the unsigned spend draft against `prev_txid:0` and return it
/// together with the client amount.
#[allow(clippy::too_many_arguments)]
pub fn build_spend_raw(
    prev_txid: Txid,
    base_amount: u64,
    server_amount: u64,
    end_height: u32,
    client_pub: PublicKey,
    server_pub: PublicKey,
    network: Network,
    fee_rate: f64,
) -> Result<(SpendTransaction, u64), Error> {
    let redeem = redeem_script(server_pub, client_pub)?;
    let server_script = p2pkh_output_script(&server_pub, network);
    let client_script = p2pkh_output_script(&client_pub, network);

    let (mut tx, fee) = SpendTransaction::draft(
        prev_txid,
        base_amount,
        end_height,
        redeem,
        server_script,
        client_script,
        fee_rate,
    )?;

    let client_amount = base_amount
        .checked_sub(server_amount)
        .and_then(|rest| rest.checked_sub(fee))
        .ok_or(Error::SplitExceedsPool {
            split: server_amount,
            total: base_amount,
        })?;
    tx.set_output_values(server_amount, client_amount);

    Ok((tx, client_amount))
}

/// Sign the spend transaction as the client, installing the funding
/// context first.
pub fn client_sign(
    tx: &mut SpendTransaction,
    base_amount: u64,
    client: &KeyPair,
    server_pub: PublicKey,
) -> Result<DetachedSignature, Error> {
    let redeem = redeem_script(server_pub, client.public())?;
    tx.set_funding(base_amount, redeem);

    tx.sign(client)
}

/// Countersign the spend transaction as the server, installing the
/// funding context first.
pub fn server_sign(
    tx: &mut SpendTransaction,
    base_amount: u64,
    server: &KeyPair,
    client_pub: PublicKey,
) -> Result<DetachedSignature, Error> {
    let redeem = redeem_script(server.public(), client_pub)?;
    tx.set_funding(base_amount, redeem);

    tx.sign(server)
}

/// Reload a spend transaction from hex and re-parameterize it for the
/// next state: new sequence, new server amount (the client keeps the
/// remainder), optionally a new locktime, with the funding context
/// reinstalled for the signatures that follow.
///
/// Closing the pool is this very operation with locktime and sequence set
/// to [`crate::FINAL_LOCK_TIME`] and [`crate::FINAL_SEQUENCE`].
#[allow(clippy::too_many_arguments)]
pub fn load(
    hex: &str,
    lock_time: Option<u32>,
    sequence: u32,
    server_amount: u64,
    server_pub: PublicKey,
    client_pub: PublicKey,
    base_amount: u64,
) -> Result<SpendTransaction, Error> {
    let mut tx = SpendTransaction::from_hex(hex)?;

    tx.set_funding(base_amount, redeem_script(server_pub, client_pub)?);
    tx.reparam(lock_time, sequence, server_amount)?;

    Ok(tx)
}

/// Sign a re-parameterized spend transaction as the client. The funding
/// context must already be installed (see [`load`]).
pub fn client_update_sign(
    tx: &SpendTransaction,
    client: &KeyPair,
) -> Result<DetachedSignature, Error> {
    tx.sign(client)
}

/// Sign a re-parameterized spend transaction as the server. The funding
/// context must already be installed (see [`load`]).
pub fn server_update_sign(
    tx: &SpendTransaction,
    server: &KeyPair,
) -> Result<DetachedSignature, Error> {
    tx.sign(server)
}

/// Combine both parties' detached signatures into the final unlocking
/// script: `OP_0 <server_sig> <client_sig>`, matching the redeem script's
/// public key order.
pub fn merge_sigs(
    hex: &str,
    server_sig: &DetachedSignature,
    client_sig: &DetachedSignature,
) -> Result<SpendTransaction, Error> {
    let mut tx = SpendTransaction::from_hex(hex)?;
    tx.install_unlock(&[server_sig.clone(), client_sig.clone()]);

    Ok(tx)
}

/// Verify the client's signature over the initial spend transaction.
/// `total_amount` is the satoshi value of the multisig output being spent.
pub fn verify_client_spend_sig(
    tx: &SpendTransaction,
    total_amount: u64,
    server_pub: PublicKey,
    client_pub: PublicKey,
    sig: &DetachedSignature,
) -> Result<(), Error> {
    verify(tx, total_amount, server_pub, client_pub, &client_pub, sig)
}

/// Verify the server's signature over the initial spend transaction.
pub fn verify_server_spend_sig(
    tx: &SpendTransaction,
    total_amount: u64,
    server_pub: PublicKey,
    client_pub: PublicKey,
    sig: &DetachedSignature,
) -> Result<(), Error> {
    verify(tx, total_amount, server_pub, client_pub, &server_pub, sig)
}

/// Verify the client's signature over a re-parameterized spend
/// transaction, reading the spent amount from the installed funding
/// context.
pub fn verify_client_update_sig(
    tx: &SpendTransaction,
    server_pub: PublicKey,
    client_pub: PublicKey,
    sig: &DetachedSignature,
) -> Result<(), Error> {
    let funding = tx.funding().ok_or(Error::MissingFundingContext)?;

    verify(tx, funding.value, server_pub, client_pub, &client_pub, sig)
}

/// Verify the server's signature over a re-parameterized spend
/// transaction, reading the spent amount from the installed funding
/// context.
pub fn verify_server_update_sig(
    tx: &SpendTransaction,
    server_pub: PublicKey,
    client_pub: PublicKey,
    sig: &DetachedSignature,
) -> Result<(), Error> {
    let funding = tx.funding().ok_or(Error::MissingFundingContext)?;

    verify(tx, funding.value, server_pub, client_pub, &server_pub, sig)
}

fn verify(
    tx: &SpendTransaction,
    total_amount: u64,
    server_pub: PublicKey,
    client_pub: PublicKey,
    signer: &PublicKey,
    sig: &DetachedSignature,
) -> Result<(), Error> {
    let redeem = redeem_script(server_pub, client_pub)?;

    crate::signature::verify_input(tx.transaction(), 0, &redeem, total_amount, signer, sig)
}
