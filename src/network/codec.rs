// Frames are a 4-byte big-endian length followed by that many bytes of JSON.

use crate::error::{BlockchainError, Result};
use crate::network::Message;
use std::io::{Read, Write};

/// Largest frame either side will write or accept
pub const MAX_FRAME_LEN: usize = 32 * 1024 * 1024;

pub fn write_frame<W: Write>(writer: &mut W, message: &Message) -> Result<()> {
    let body = serde_json::to_vec(message)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(BlockchainError::Network(format!(
            "Frame of {} bytes exceeds the {MAX_FRAME_LEN} byte limit",
            body.len()
        )));
    }
    let len = u32::try_from(body.len())
        .map_err(|_| BlockchainError::Network("Frame length overflow".to_string()))?;

    writer
        .write_all(&len.to_be_bytes())
        .and_then(|_| writer.write_all(&body))
        .and_then(|_| writer.flush())
        .map_err(|e| BlockchainError::Network(format!("Failed to send frame: {e}")))
}

/// Read exactly one message. Any error leaves the stream unusable.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Message> {
    let mut header = [0u8; 4];
    reader
        .read_exact(&mut header)
        .map_err(|e| BlockchainError::Network(format!("Failed to read frame header: {e}")))?;

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(BlockchainError::Network(format!(
            "Incoming frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit"
        )));
    }

    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .map_err(|e| BlockchainError::Network(format!("Failed to read frame body: {e}")))?;

    serde_json::from_slice(&body)
        .map_err(|e| BlockchainError::Network(format!("Malformed frame: {e}")))
}
