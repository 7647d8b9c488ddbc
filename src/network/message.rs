use crate::core::{Block, Transaction};
use crate::error::Result;
use crate::utils::current_timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    Ping,
    Pong,
    GetBlocks,
    Blocks,
    NewBlock,
    NewTx,
    GetPeers,
    Peers,
}

/// Wire envelope. `data` stays untyped until the message is dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub data: Value,
    pub timestamp: i64,
    pub node_id: String,
    pub version: String,
}

/// Carried by `ping` and `pong`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStatus {
    pub height: u64,
    pub best_hash: String,
}

#[derive(Deserialize)]
struct BlocksData {
    blocks: Vec<Block>,
}

#[derive(Deserialize)]
struct NewBlockData {
    block: Block,
}

#[derive(Deserialize)]
struct NewTxData {
    transaction: Transaction,
}

#[derive(Deserialize)]
struct PeersData {
    peers: Vec<String>,
}

/// Typed view of a message body
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Ping(ChainStatus),
    Pong(ChainStatus),
    GetBlocks,
    Blocks(Vec<Block>),
    NewBlock(Block),
    NewTx(Transaction),
    GetPeers,
    Peers(Vec<String>),
}

impl Payload {
    pub fn message_type(&self) -> MessageType {
        match self {
            Payload::Ping(_) => MessageType::Ping,
            Payload::Pong(_) => MessageType::Pong,
            Payload::GetBlocks => MessageType::GetBlocks,
            Payload::Blocks(_) => MessageType::Blocks,
            Payload::NewBlock(_) => MessageType::NewBlock,
            Payload::NewTx(_) => MessageType::NewTx,
            Payload::GetPeers => MessageType::GetPeers,
            Payload::Peers(_) => MessageType::Peers,
        }
    }

    fn to_data(&self) -> Result<Value> {
        let mut data = Map::new();
        match self {
            Payload::Ping(status) | Payload::Pong(status) => {
                return Ok(serde_json::to_value(status)?)
            }
            Payload::GetBlocks | Payload::GetPeers => {}
            Payload::Blocks(blocks) => {
                data.insert("blocks".to_string(), serde_json::to_value(blocks)?);
            }
            Payload::NewBlock(block) => {
                data.insert("block".to_string(), serde_json::to_value(block)?);
            }
            Payload::NewTx(tx) => {
                data.insert("transaction".to_string(), serde_json::to_value(tx)?);
            }
            Payload::Peers(peers) => {
                data.insert("peers".to_string(), serde_json::to_value(peers)?);
            }
        }
        Ok(Value::Object(data))
    }
}

impl Message {
    pub fn new(payload: &Payload, node_id: &str, version: &str) -> Result<Message> {
        Ok(Message {
            message_type: payload.message_type(),
            data: payload.to_data()?,
            timestamp: current_timestamp()?,
            node_id: node_id.to_string(),
            version: version.to_string(),
        })
    }

    /// Decode `data` according to `type`
    pub fn payload(&self) -> Result<Payload> {
        let data = &self.data;
        Ok(match self.message_type {
            MessageType::Ping => Payload::Ping(ChainStatus::deserialize(data)?),
            MessageType::Pong => Payload::Pong(ChainStatus::deserialize(data)?),
            MessageType::GetBlocks => Payload::GetBlocks,
            MessageType::Blocks => Payload::Blocks(BlocksData::deserialize(data)?.blocks),
            MessageType::NewBlock => Payload::NewBlock(NewBlockData::deserialize(data)?.block),
            MessageType::NewTx => Payload::NewTx(NewTxData::deserialize(data)?.transaction),
            MessageType::GetPeers => Payload::GetPeers,
            MessageType::Peers => Payload::Peers(PeersData::deserialize(data)?.peers),
        })
    }

    /// Same body under a new sender, for relaying to other peers
    pub fn relayed_by(&self, node_id: &str) -> Message {
        Message {
            node_id: node_id.to_string(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BlockchainError;

    #[test]
    fn test_envelope_field_names() {
        let message = Message::new(
            &Payload::Ping(ChainStatus {
                height: 3,
                best_hash: "abc".to_string(),
            }),
            "node_a",
            "1.0.0",
        )
        .unwrap();
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "ping");
        assert_eq!(json["data"]["height"], 3);
        assert_eq!(json["data"]["best_hash"], "abc");
        assert_eq!(json["node_id"], "node_a");
        assert_eq!(json["version"], "1.0.0");
    }

    #[test]
    fn test_type_names_are_camel_case() {
        let names: Vec<Value> = [
            MessageType::GetBlocks,
            MessageType::NewBlock,
            MessageType::NewTx,
            MessageType::GetPeers,
        ]
        .iter()
        .map(|t| serde_json::to_value(t).unwrap())
        .collect();
        assert_eq!(names, vec!["getBlocks", "newBlock", "newTx", "getPeers"]);
    }

    #[test]
    fn test_block_payload_decodes() {
        let block = Block::genesis("genesis_address", 1_000_000, 1);
        let message = Message::new(&Payload::NewBlock(block.clone()), "n", "1.0.0").unwrap();
        assert_eq!(message.data["block"]["index"], 0);
        assert_eq!(message.payload().unwrap(), Payload::NewBlock(block));
    }

    #[test]
    fn test_empty_requests_carry_empty_object() {
        let message = Message::new(&Payload::GetBlocks, "n", "1.0.0").unwrap();
        assert_eq!(message.data, serde_json::json!({}));
        assert_eq!(message.payload().unwrap(), Payload::GetBlocks);
    }

    #[test]
    fn test_mismatched_data_is_an_error() {
        let message = Message {
            message_type: MessageType::Peers,
            data: serde_json::json!({"peers": 5}),
            timestamp: 0,
            node_id: "n".to_string(),
            version: "1.0.0".to_string(),
        };
        assert!(matches!(
            message.payload(),
            Err(BlockchainError::Serialization(_))
        ));
    }

    #[test]
    fn test_relay_keeps_body() {
        let message =
            Message::new(&Payload::Peers(vec!["127.0.0.1:1".to_string()]), "a", "1.0.0").unwrap();
        let relayed = message.relayed_by("b");
        assert_eq!(relayed.node_id, "b");
        assert_eq!(relayed.data, message.data);
        assert_eq!(relayed.timestamp, message.timestamp);
    }
}
