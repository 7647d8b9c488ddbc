//! Peer-to-peer synchronization
//!
//! Nodes exchange length-prefixed JSON envelopes over plain TCP. Every
//! connection gets its own receive thread; new blocks and transactions are
//! flooded to all other peers once, guarded by a seen cache.

pub mod codec;
pub mod message;
pub mod peer;
pub mod seen_cache;
pub mod server;

pub use codec::{read_frame, write_frame, MAX_FRAME_LEN};
pub use message::{ChainStatus, Message, MessageType, Payload};
pub use peer::{Peer, PeerRegistry};
pub use seen_cache::SeenCache;
pub use server::{send_transaction, Server};
