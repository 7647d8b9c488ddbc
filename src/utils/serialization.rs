// Binary encoding for the sled snapshot backend; the wire protocol and the
// JSON snapshot layout go through serde_json instead.
use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};

/// Serialize data using bincode 2.0 with standard configuration
pub fn serialize<T: Serialize + bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    let config = bincode::config::standard();
    bincode::encode_to_vec(data, config)
        .map_err(|e| BlockchainError::Serialization(format!("Serialization failed: {e}")))
}

/// Deserialize data using bincode 2.0 with standard configuration
pub fn deserialize<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de> + bincode::Decode<()>,
{
    let config = bincode::config::standard();
    let (data, _) = bincode::decode_from_slice(bytes, config)
        .map_err(|e| BlockchainError::Serialization(format!("Deserialization failed: {e}")))?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Transaction, TxStatus};

    #[test]
    fn test_transaction_survives_binary_encoding() {
        let mut tx = Transaction::new("alice", "bob", 25, 1, 7).unwrap();
        tx.set_status(TxStatus::Confirmed);

        let bytes = serialize(&tx).expect("Serialization should work");
        let decoded: Transaction = deserialize(&bytes).expect("Deserialization should work");

        assert_eq!(decoded.get_hash(), tx.get_hash());
        assert_eq!(decoded.get_status(), TxStatus::Confirmed);
    }

    #[test]
    fn test_deserialize_invalid_data() {
        let invalid_bytes = vec![0xFF, 0xFF, 0xFF, 0xFF];
        let result: Result<Transaction> = deserialize(&invalid_bytes);
        assert!(result.is_err());
    }
}
