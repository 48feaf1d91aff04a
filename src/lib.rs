#![warn(
    unused_extern_crates,
    missing_debug_implementations,
    rust_2018_idioms,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::fallible_impl_from,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap,
    clippy::dbg_macro
)]
#![cfg_attr(not(test), warn(clippy::unwrap_used))]
#![forbid(unsafe_code)]

//! Off-chain multisig fee pools on BSV-family chains.
//!
//! A pool locks funds into a bare `OP_CHECKMULTISIG` output (the *base*
//! transaction) and represents its current balance split as a pre-signed
//! *spend* transaction with a shared locktime and a monotonically
//! increasing input sequence number. Cooperating parties replace the
//! current split by exchanging fresh detached signatures over a
//! re-parameterized spend transaction; either party can settle
//! unilaterally once the locktime expires, or both can close early by
//! lifting the locktime.
//!
//! Two flavors are provided: [`dual`] (2-of-2 between a client and a
//! server) and [`triple`] (2-of-3 between two clients and an arbitrating
//! server).
//!
//! The crate is a pure, synchronous library: every operation returns
//! byte-exact artifacts (transactions as consensus hex, signatures as
//! `DER || 0x41`) for the caller to transmit or broadcast. Networking,
//! UTXO discovery and key management stay outside.

pub mod dual;
pub mod sighash;
pub mod triple;

mod keys;
mod script;
mod signature;
mod transaction;

pub use ::bitcoin;

pub use crate::{
    keys::{public_key_from_hex, KeyPair},
    script::{fake_multisig_unlock, multisig_lock, multisig_unlock},
    signature::{sign_input, verify_input, DetachedSignature},
    transaction::{BaseTransaction, PoolInfo, SpendTransaction, Utxo},
};

/// Locktime of a closed pool. A spend transaction carrying this locktime
/// (and [`FINAL_SEQUENCE`]) is broadcastable at any time.
pub const FINAL_LOCK_TIME: u32 = 0xffff_ffff;

/// Input sequence number of a closed pool.
pub const FINAL_SEQUENCE: u32 = 0xffff_ffff;

/// Sequence number of the first spend transaction; every update must use a
/// strictly higher value to supersede it.
pub const INITIAL_SEQUENCE: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("private key bytes are not a valid secp256k1 scalar")]
    InvalidKey(#[source] bitcoin::secp256k1::Error),
    #[error("public key bytes are not a valid secp256k1 point")]
    InvalidPublicKey(#[source] bitcoin::secp256k1::Error),
    #[error("multisig needs between 1 and 20 public keys, got {0}")]
    InvalidPublicKeyCount(usize),
    #[error("cannot require {required} signatures out of {available} public keys")]
    InvalidRequiredSignatures { required: usize, available: usize },
    #[error("pool of {pool} satoshis cannot be funded from {available} satoshis of inputs")]
    InsufficientFunds { pool: u64, available: u64 },
    #[error("inputs of {available} satoshis cannot cover pool of {pool} satoshis plus {fee} satoshis fee")]
    InsufficientFundsForFee { pool: u64, fee: u64, available: u64 },
    #[error("pool of {pool} satoshis cannot cover spend fee of {fee} satoshis")]
    InsufficientPool { pool: u64, fee: u64 },
    #[error("split of {split} satoshis exceeds pool total of {total} satoshis")]
    SplitExceedsPool { split: u64, total: u64 },
    #[error("input has no funding context to sign against")]
    MissingFundingContext,
    #[error("signature of {0} bytes is too short to hold DER data and a sighash flag")]
    InvalidSignatureLength(usize),
    #[error("expected sighash flag {expected:#04x}, got {actual:#04x}")]
    UnexpectedSighashFlag { expected: u8, actual: u8 },
    #[error("signature is not valid DER")]
    DerParse(#[source] bitcoin::secp256k1::Error),
    #[error("signature verification failed")]
    SignatureVerification,
    #[error("spend transaction must have one input and two outputs")]
    MalformedSpendTransaction,
    #[error("failed to decode transaction")]
    TxDecode(#[from] bitcoin::consensus::encode::Error),
    #[error("invalid hex")]
    Hex(#[from] hex::FromHexError),
}
