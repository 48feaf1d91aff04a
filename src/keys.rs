use crate::Error;
use bitcoin::secp256k1::{All, PublicKey, Secp256k1, SecretKey};
use conquer_once::Lazy;
use std::fmt;

pub(crate) static SECP: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// A secp256k1 keypair owned by one pool participant.
///
/// The secret half is uniquely owned: the type is deliberately not
/// `Clone`, and `Debug` only shows the public key. Counterparties are
/// always referred to by bare [`PublicKey`]s.
pub struct KeyPair {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl KeyPair {
    pub fn new_random() -> KeyPair {
        let secret_key = SecretKey::new(&mut bitcoin::secp256k1::rand::thread_rng());

        Self::from_secret_key(secret_key)
    }

    /// Parse a 32-byte scalar from its hex encoding.
    pub fn from_hex(hex: &str) -> Result<KeyPair, Error> {
        let bytes = hex::decode(hex)?;

        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<KeyPair, Error> {
        let secret_key = SecretKey::from_slice(bytes).map_err(Error::InvalidKey)?;

        Ok(Self::from_secret_key(secret_key))
    }

    pub fn public(&self) -> PublicKey {
        self.public_key
    }

    pub(crate) fn secret(&self) -> &SecretKey {
        &self.secret_key
    }

    fn from_secret_key(secret_key: SecretKey) -> KeyPair {
        let public_key = PublicKey::from_secret_key(&SECP, &secret_key);

        Self {
            secret_key,
            public_key,
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .finish()
    }
}

/// Parse a compressed 33-byte public key from its hex encoding.
pub fn public_key_from_hex(hex: &str) -> Result<PublicKey, Error> {
    let bytes = hex::decode(hex)?;

    PublicKey::from_slice(&bytes).map_err(Error::InvalidPublicKey)
}
