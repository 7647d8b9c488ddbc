// A transaction moves `amount` from one account to another and pays `fee` on top.
// Identity is the hash over the economic fields only, so the signature and the
// status can be attached later without changing which transaction this is.

use crate::core::params::{GENESIS_SENDER, GENESIS_TIMESTAMP, TRANSACTION_VERSION};
use crate::error::{BlockchainError, Result};
use crate::utils::{current_timestamp, sha256_hex, verify_hex_signature};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a transaction as seen by this node
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    #[default]
    Pending,
    Confirmed,
    Failed,
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxStatus::Pending => write!(f, "pending"),
            TxStatus::Confirmed => write!(f, "confirmed"),
            TxStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    version: u32,
    hash: String,
    from: String,
    to: String,
    amount: u64,
    fee: u64,
    nonce: u64,
    timestamp: i64,
    #[serde(default)]
    signature: String,
    #[serde(default)]
    public_key: String,
    #[serde(default)]
    status: TxStatus,
}

impl Transaction {
    /// Create an unsigned transaction stamped with the current time
    pub fn new(from: &str, to: &str, amount: u64, fee: u64, nonce: u64) -> Result<Transaction> {
        Ok(Self::with_timestamp(
            from,
            to,
            amount,
            fee,
            nonce,
            current_timestamp()?,
        ))
    }

    pub fn with_timestamp(
        from: &str,
        to: &str,
        amount: u64,
        fee: u64,
        nonce: u64,
        timestamp: i64,
    ) -> Transaction {
        let mut tx = Transaction {
            version: TRANSACTION_VERSION,
            hash: String::new(),
            from: from.to_string(),
            to: to.to_string(),
            amount,
            fee,
            nonce,
            timestamp,
            signature: String::new(),
            public_key: String::new(),
            status: TxStatus::Pending,
        };
        tx.hash = tx.calculate_hash();
        tx
    }

    /// The allocation transaction carried by the genesis block. It is never
    /// signed and never re-validated.
    pub fn genesis(to: &str, allocation: u64) -> Transaction {
        let mut tx = Self::with_timestamp(GENESIS_SENDER, to, allocation, 0, 0, GENESIS_TIMESTAMP);
        tx.status = TxStatus::Confirmed;
        tx
    }

    /// Digest over `{version, from, to, amount, fee, nonce, timestamp}`
    pub fn calculate_hash(&self) -> String {
        // serde_json::Value keeps object keys sorted, so the encoding is canonical
        let data = serde_json::json!({
            "version": self.version,
            "from": self.from,
            "to": self.to,
            "amount": self.amount,
            "fee": self.fee,
            "nonce": self.nonce,
            "timestamp": self.timestamp,
        });
        sha256_hex(data.to_string().as_bytes())
    }

    /// Attach a hex signature over the transaction hash and the hex public key
    /// that produced it
    pub fn attach_signature(&mut self, signature_hex: String, public_key_hex: String) {
        self.signature = signature_hex;
        self.public_key = public_key_hex;
    }

    pub fn verify_signature(&self) -> bool {
        if self.signature.is_empty() || self.public_key.is_empty() {
            return false;
        }
        verify_hex_signature(&self.public_key, &self.signature, self.hash.as_bytes())
    }

    /// Intrinsic validity: independent of any account state
    pub fn validate(&self) -> Result<()> {
        if self.amount == 0 {
            return Err(BlockchainError::Transaction(
                "Amount must be positive".to_string(),
            ));
        }
        if self.from == self.to {
            return Err(BlockchainError::Transaction(
                "Sender and recipient must differ".to_string(),
            ));
        }
        if self.hash != self.calculate_hash() {
            return Err(BlockchainError::Transaction(format!(
                "Hash mismatch for transaction {}",
                self.hash
            )));
        }
        if !self.verify_signature() {
            return Err(BlockchainError::Transaction(format!(
                "Invalid signature on transaction {}",
                self.hash
            )));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Amount plus fee, the total debited from the sender
    pub fn total_cost(&self) -> Result<u64> {
        self.amount.checked_add(self.fee).ok_or_else(|| {
            BlockchainError::Transaction(format!("Amount overflow in transaction {}", self.hash))
        })
    }

    pub fn get_version(&self) -> u32 {
        self.version
    }

    pub fn get_hash(&self) -> &str {
        self.hash.as_str()
    }

    pub fn get_from(&self) -> &str {
        self.from.as_str()
    }

    pub fn get_to(&self) -> &str {
        self.to.as_str()
    }

    pub fn get_amount(&self) -> u64 {
        self.amount
    }

    pub fn get_fee(&self) -> u64 {
        self.fee
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_signature(&self) -> &str {
        self.signature.as_str()
    }

    pub fn get_public_key(&self) -> &str {
        self.public_key.as_str()
    }

    pub fn get_status(&self) -> TxStatus {
        self.status
    }

    pub fn set_status(&mut self, status: TxStatus) {
        self.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;

    fn signed(from: &str, to: &str, amount: u64) -> Transaction {
        let wallet = Wallet::new().unwrap();
        let mut tx = Transaction::new(from, to, amount, 1, 0).unwrap();
        wallet.sign_transaction(&mut tx).unwrap();
        tx
    }

    #[test]
    fn test_hash_excludes_signature_and_status() {
        let mut tx = Transaction::with_timestamp("a", "b", 10, 1, 3, 1_700_000_000);
        let original = tx.get_hash().to_string();

        tx.attach_signature("00".to_string(), "11".to_string());
        tx.set_status(TxStatus::Confirmed);

        assert_eq!(tx.calculate_hash(), original);
    }

    #[test]
    fn test_hash_changes_with_economic_fields() {
        let a = Transaction::with_timestamp("a", "b", 10, 1, 3, 1_700_000_000);
        let b = Transaction::with_timestamp("a", "b", 11, 1, 3, 1_700_000_000);
        let c = Transaction::with_timestamp("a", "b", 10, 1, 4, 1_700_000_000);
        assert_ne!(a.get_hash(), b.get_hash());
        assert_ne!(a.get_hash(), c.get_hash());
    }

    #[test]
    fn test_signed_transaction_is_valid() {
        let tx = signed("alice", "bob", 5);
        assert!(tx.verify_signature());
        assert!(tx.is_valid());
    }

    #[test]
    fn test_zero_amount_rejected() {
        let tx = signed("alice", "bob", 0);
        assert!(matches!(
            tx.validate(),
            Err(BlockchainError::Transaction(_))
        ));
    }

    #[test]
    fn test_self_transfer_rejected() {
        let tx = signed("alice", "alice", 5);
        assert!(!tx.is_valid());
    }

    #[test]
    fn test_unsigned_transaction_rejected() {
        let tx = Transaction::new("alice", "bob", 5, 0, 0).unwrap();
        assert!(!tx.verify_signature());
        assert!(!tx.is_valid());
    }

    #[test]
    fn test_tampered_amount_breaks_validity() {
        let tx = signed("alice", "bob", 5);
        let mut json = serde_json::to_value(&tx).unwrap();
        json["amount"] = serde_json::json!(500);
        let tampered: Transaction = serde_json::from_value(json).unwrap();
        assert!(!tampered.is_valid());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let tx = Transaction::genesis("genesis_address", 1_000_000);
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["status"], "confirmed");
        assert_eq!(json["from"], GENESIS_SENDER);
    }
}
