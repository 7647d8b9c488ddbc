use crate::core::Transaction;
use crate::error::{BlockchainError, Result};
use data_encoding::HEXLOWER;
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};

/// An ECDSA P-256 key pair able to sign transactions.
///
/// Keys live only in memory; storing them is somebody else's job.
#[derive(Clone)]
pub struct Wallet {
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
}

impl Wallet {
    pub fn new() -> Result<Wallet> {
        let pkcs8 = crate::utils::new_key_pair()?;
        Self::from_pkcs8(pkcs8)
    }

    pub fn from_pkcs8(pkcs8: Vec<u8>) -> Result<Wallet> {
        let rng = SystemRandom::new();
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &pkcs8, &rng)
            .map_err(|e| {
                BlockchainError::Crypto(format!("Failed to create key pair from PKCS8: {e}"))
            })?;
        let public_key = key_pair.public_key().as_ref().to_vec();
        Ok(Wallet { pkcs8, public_key })
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn public_key_hex(&self) -> String {
        HEXLOWER.encode(&self.public_key)
    }

    /// Sign the transaction hash and attach signature and public key
    pub fn sign_transaction(&self, tx: &mut Transaction) -> Result<()> {
        let signature =
            crate::utils::ecdsa_p256_sha256_sign_digest(&self.pkcs8, tx.get_hash().as_bytes())?;
        tx.attach_signature(HEXLOWER.encode(&signature), self.public_key_hex());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pkcs8_round_trip_keeps_public_key() {
        let wallet = Wallet::new().unwrap();
        let restored = Wallet::from_pkcs8(wallet.pkcs8.clone()).unwrap();
        assert_eq!(wallet.get_public_key(), restored.get_public_key());
    }

    #[test]
    fn test_signature_from_other_key_fails() {
        let signer = Wallet::new().unwrap();
        let other = Wallet::new().unwrap();
        let mut tx = Transaction::new("a", "b", 1, 0, 0).unwrap();
        signer.sign_transaction(&mut tx).unwrap();
        assert!(tx.verify_signature());

        let signature = tx.get_signature().to_string();
        tx.attach_signature(signature, other.public_key_hex());
        assert!(!tx.verify_signature());
    }

    #[test]
    fn test_from_pkcs8_rejects_garbage() {
        assert!(matches!(
            Wallet::from_pkcs8(vec![1, 2, 3]),
            Err(BlockchainError::Crypto(_))
        ));
    }
}
