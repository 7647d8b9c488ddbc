use crate::error::{BlockchainError, Result};
use crate::network::codec::write_frame;
use crate::network::Message;
use log::debug;
use std::collections::HashMap;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// One live connection. The receive side is owned by the peer's own thread;
/// everything here is the send side plus bookkeeping.
pub struct Peer {
    id: String,
    address: SocketAddr,
    // listen address we dialed, None for inbound connections
    dial_addr: Option<String>,
    node_id: Mutex<Option<String>>,
    last_seen: Mutex<Instant>,
    writer: Mutex<TcpStream>,
}

impl Peer {
    /// Wrap `stream` and hand back a clone of it for the receive loop
    pub fn new(
        stream: TcpStream,
        dial_addr: Option<String>,
        write_timeout: Duration,
    ) -> Result<(Arc<Peer>, TcpStream)> {
        let address = stream
            .peer_addr()
            .map_err(|e| BlockchainError::Network(format!("Failed to get peer address: {e}")))?;
        stream
            .set_write_timeout(Some(write_timeout))
            .map_err(|e| BlockchainError::Network(format!("Failed to set write timeout: {e}")))?;
        let reader = stream
            .try_clone()
            .map_err(|e| BlockchainError::Network(format!("Failed to clone stream: {e}")))?;

        let peer = Peer {
            id: uuid::Uuid::new_v4().to_string(),
            address,
            dial_addr,
            node_id: Mutex::new(None),
            last_seen: Mutex::new(Instant::now()),
            writer: Mutex::new(stream),
        };
        Ok((Arc::new(peer), reader))
    }

    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn dial_addr(&self) -> Option<&str> {
        self.dial_addr.as_deref()
    }

    pub fn is_outbound(&self) -> bool {
        self.dial_addr.is_some()
    }

    pub fn node_id(&self) -> Option<String> {
        self.node_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_node_id(&self, node_id: &str) {
        let mut current = self.node_id.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_deref() != Some(node_id) {
            *current = Some(node_id.to_string());
        }
    }

    pub fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Write one frame; concurrent senders are serialized so frames never interleave
    pub fn send(&self, message: &Message) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        write_frame(&mut *writer, message)
    }

    /// Shut the socket down, which also unblocks the receive loop
    pub fn close(&self) {
        let writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writer.shutdown(Shutdown::Both) {
            debug!("Shutdown of {} failed: {e}", self.address);
        }
    }
}

/// Live peers keyed by peer id
#[derive(Default)]
pub struct PeerRegistry {
    peers: RwLock<HashMap<String, Arc<Peer>>>,
}

impl PeerRegistry {
    pub fn new() -> PeerRegistry {
        PeerRegistry::default()
    }

    pub fn add(&self, peer: Arc<Peer>) {
        self.peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(peer.id().to_string(), peer);
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Peer>> {
        self.peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Peer>> {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn all(&self) -> Vec<Arc<Peer>> {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Is there an outbound connection to this listen address?
    pub fn is_connected_to(&self, addr: &str) -> bool {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .any(|peer| peer.dial_addr() == Some(addr))
    }

    /// Listen addresses worth advertising: only those we dialed ourselves
    pub fn dialed_addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self
            .peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter_map(|peer| peer.dial_addr().map(String::from))
            .collect();
        addresses.sort();
        addresses.dedup();
        addresses
    }

    pub fn stale(&self, timeout: Duration) -> Vec<Arc<Peer>> {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|peer| peer.idle_for() > timeout)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn test_registry_tracks_dialed_addresses() {
        let registry = PeerRegistry::new();
        let (outbound, _server_side) = connected_pair();
        let (inbound, _client_side) = connected_pair();
        let (dialed, _) =
            Peer::new(outbound, Some("127.0.0.1:9".to_string()), Duration::from_secs(1)).unwrap();
        let (accepted, _) = Peer::new(inbound, None, Duration::from_secs(1)).unwrap();

        registry.add(dialed.clone());
        registry.add(accepted.clone());

        assert_eq!(registry.len(), 2);
        assert!(registry.is_connected_to("127.0.0.1:9"));
        assert_eq!(registry.dialed_addresses(), vec!["127.0.0.1:9".to_string()]);
        assert!(dialed.is_outbound());
        assert!(!accepted.is_outbound());

        registry.remove(dialed.id());
        assert!(!registry.is_connected_to("127.0.0.1:9"));
        assert!(registry.get(accepted.id()).is_some());
    }

    #[test]
    fn test_stale_peers_reported() {
        let registry = PeerRegistry::new();
        let (stream, _other) = connected_pair();
        let (peer, _) = Peer::new(stream, None, Duration::from_secs(1)).unwrap();
        registry.add(peer.clone());

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(registry.stale(Duration::from_millis(10)).len(), 1);
        peer.touch();
        assert!(registry.stale(Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn test_close_unblocks_reader() {
        let (stream, _other) = connected_pair();
        let (peer, mut reader) = Peer::new(stream, None, Duration::from_secs(1)).unwrap();
        peer.close();
        assert!(crate::network::codec::read_frame(&mut reader).is_err());
    }
}
