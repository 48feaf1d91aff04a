//! Property tests over the pool machinery: sighash flag invariants,
//! value conservation across updates, tamper detection and fee-rate
//! monotonicity.

use feepool::{
    bitcoin::{hashes::hex::FromHex, Network, Txid},
    dual, DetachedSignature, KeyPair, Utxo,
};
use proptest::prelude::*;

const CLIENT_PRIV: &str = "2796e78fad7d383fa5236607eba52d9a1904325daf9b4da3d77be5ad15ab1dae";
const SERVER_PRIV: &str = "e6d4d7685894d2644d1f4bf31c0b87f3f6aa8a3d7d4091eaa375e81d6c9f9091";
const FUNDING_TXID: &str = "3bc591b12d1d356c80eec9628a626c2676c27e21fe8e0ef34d6dab2e425d9629";

fn keys() -> (KeyPair, KeyPair) {
    (
        KeyPair::from_hex(CLIENT_PRIV).unwrap(),
        KeyPair::from_hex(SERVER_PRIV).unwrap(),
    )
}

fn funding_txid() -> Txid {
    Txid::from_hex(FUNDING_TXID).unwrap()
}

fn signed_spend() -> (feepool::SpendTransaction, DetachedSignature, KeyPair, KeyPair) {
    let (client, server) = keys();
    let utxos = vec![Utxo {
        txid: funding_txid(),
        vout: 1,
        value: 206_106,
    }];

    let base =
        dual::build_base_sweep(&utxos, &client, server.public(), Network::Testnet, 0.5).unwrap();
    let (spend, client_sig, _) = dual::build_spend(
        &base,
        1_000,
        1_687_365,
        &client,
        server.public(),
        Network::Testnet,
        0.5,
    )
    .unwrap();

    (spend, client_sig, client, server)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    // Every signature the library produces carries the fork-ID sighash
    // flag as its last byte.
    #[test]
    fn signatures_always_end_in_the_forkid_flag(server_amount in 0u64..200_000) {
        let (client, server) = keys();
        let (_, client_amount) = dual::build_spend_raw(
            funding_txid(),
            206_105,
            server_amount,
            1_687_365,
            client.public(),
            server.public(),
            Network::Testnet,
            0.5,
        ).unwrap();
        prop_assert_eq!(client_amount, 206_105 - server_amount - 1);

        let base = dual::build_base_sweep(
            &[Utxo { txid: funding_txid(), vout: 1, value: 206_106 }],
            &client,
            server.public(),
            Network::Testnet,
            0.5,
        ).unwrap();
        let (_, sig, _) = dual::build_spend(
            &base,
            server_amount,
            1_687_365,
            &client,
            server.public(),
            Network::Testnet,
            0.5,
        ).unwrap();

        prop_assert_eq!(sig.flag(), Some(0x41));
    }

    // Re-parameterizing a spend transaction moves value between the two
    // outputs but never creates or destroys it.
    #[test]
    fn updates_conserve_the_output_sum(server_amount in 0u64..=205_104u64, sequence in 2u32..) {
        let (spend, _, client, server) = signed_spend();
        let total = spend.output_value(0) + spend.output_value(1);

        let updated = dual::load(
            &spend.to_hex(),
            None,
            sequence,
            server_amount,
            server.public(),
            client.public(),
            206_105,
        ).unwrap();

        prop_assert_eq!(updated.output_value(0), server_amount);
        prop_assert_eq!(updated.output_value(0) + updated.output_value(1), total);
        prop_assert_eq!(updated.sequence(), sequence);
    }

    // Corrupting any byte of a detached signature, the sighash flag
    // included, makes verification fail.
    #[test]
    fn any_corruption_breaks_verification(index in 0usize..70, mask in 1u8..) {
        let (spend, client_sig, client, server) = signed_spend();

        let mut bytes = client_sig.as_bytes().to_vec();
        let index = index % bytes.len();
        bytes[index] ^= mask;

        let res = dual::verify_client_spend_sig(
            &spend,
            206_105,
            server.public(),
            client.public(),
            &DetachedSignature::from_bytes(bytes),
        );

        prop_assert!(res.is_err());
    }

    // A higher fee rate can only shrink the initiator's output.
    #[test]
    fn fee_rate_monotonically_shrinks_the_client_output(
        low in 0.0f64..100.0,
        bump in 0.0f64..100.0,
    ) {
        let (client, server) = keys();

        let (_, client_amount_low) = dual::build_spend_raw(
            funding_txid(),
            206_105,
            1_000,
            1_687_365,
            client.public(),
            server.public(),
            Network::Testnet,
            low,
        ).unwrap();
        let (_, client_amount_high) = dual::build_spend_raw(
            funding_txid(),
            206_105,
            1_000,
            1_687_365,
            client.public(),
            server.public(),
            Network::Testnet,
            low + bump,
        ).unwrap();

        prop_assert!(client_amount_high <= client_amount_low);
    }
}
