use crate::config::{Config, PROTOCOL_VERSION};
use crate::core::{Block, BlockAnnouncer, Blockchain, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::codec::{read_frame, write_frame};
use crate::network::{ChainStatus, Message, Payload, Peer, PeerRegistry, SeenCache};
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const TCP_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
const CLIENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// The peer synchronization layer: listener, dialer and message dispatcher.
///
/// Cloning is cheap; every clone drives the same node.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    blockchain: Blockchain,
    node_id: String,
    version: String,
    listen_addr: String,
    bootstrap_nodes: Vec<String>,
    peer_timeout: Duration,
    maintenance_interval: Duration,
    peers: PeerRegistry,
    seen: Mutex<SeenCache>,
    // every spelling of our own listen address, plus addresses that turned out to be us
    self_addresses: RwLock<HashSet<String>>,
    running: AtomicBool,
    local_addr: Mutex<Option<SocketAddr>>,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
    maintenance: Mutex<Option<(Sender<()>, JoinHandle<()>)>>,
}

impl Server {
    pub fn new(config: &Config, blockchain: Blockchain) -> Server {
        let inner = ServerInner {
            blockchain,
            node_id: config.node_id.clone(),
            version: config.version.clone(),
            listen_addr: config.listen_addr(),
            bootstrap_nodes: config.bootstrap_nodes.clone(),
            peer_timeout: config.peer_timeout(),
            maintenance_interval: config.maintenance_interval(),
            peers: PeerRegistry::new(),
            seen: Mutex::new(SeenCache::default()),
            self_addresses: RwLock::new(HashSet::new()),
            running: AtomicBool::new(false),
            local_addr: Mutex::new(None),
            accept_handle: Mutex::new(None),
            maintenance: Mutex::new(None),
        };
        Server {
            inner: Arc::new(inner),
        }
    }

    /// Bind the listener, start the accept and maintenance threads and dial
    /// the bootstrap nodes. A bind failure is fatal; a failed dial is not.
    pub fn start(&self) -> Result<SocketAddr> {
        let inner = &self.inner;
        if inner.running.swap(true, Ordering::SeqCst) {
            return Err(BlockchainError::Network(
                "Server is already running".to_string(),
            ));
        }

        let listener = match TcpListener::bind(&inner.listen_addr) {
            Ok(listener) => listener,
            Err(e) => {
                inner.running.store(false, Ordering::SeqCst);
                return Err(BlockchainError::Network(format!(
                    "Failed to bind to {}: {e}",
                    inner.listen_addr
                )));
            }
        };
        let local_addr = listener.local_addr()?;
        inner.register_self_address(local_addr);
        *inner.local_addr.lock().unwrap_or_else(PoisonError::into_inner) = Some(local_addr);
        info!("Node {} listening on {local_addr}", inner.node_id);

        let accept_inner = Arc::clone(inner);
        let accept = thread::Builder::new()
            .name("accept".to_string())
            .spawn(move || accept_inner.accept_loop(listener))?;
        *inner.accept_handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(accept);

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let maintenance_inner = Arc::clone(inner);
        let maintenance = thread::Builder::new()
            .name("peer-maintenance".to_string())
            .spawn(move || maintenance_inner.maintenance_loop(stop_rx))?;
        *inner.maintenance.lock().unwrap_or_else(PoisonError::into_inner) =
            Some((stop_tx, maintenance));

        for addr in &inner.bootstrap_nodes {
            if let Err(e) = inner.connect(addr) {
                warn!("Failed to connect to bootstrap node {addr}: {e}");
            }
        }
        Ok(local_addr)
    }

    /// Stop accepting, stop maintenance and close every peer connection
    pub fn stop(&self) {
        let inner = &self.inner;
        if !inner.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let maintenance = inner
            .maintenance
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((stop_tx, handle)) = maintenance {
            let _ = stop_tx.send(());
            let _ = handle.join();
        }

        // the accept loop only notices the flag once accept() returns
        let local_addr = *inner.local_addr.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(addr) = local_addr {
            let _ = TcpStream::connect_timeout(&loopback_of(addr), TCP_CONNECT_TIMEOUT);
        }
        let accept = inner
            .accept_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = accept {
            let _ = handle.join();
        }

        for peer in inner.peers.all() {
            inner.drop_peer(&peer);
        }
        info!("Node {} stopped", inner.node_id);
    }

    /// Dial a peer by its listen address
    pub fn connect(&self, addr: &str) -> Result<()> {
        self.inner.connect(addr)
    }

    /// Admit a locally submitted transaction and flood it to every peer
    pub fn submit_transaction(&self, tx: Transaction) -> Result<()> {
        let hash = tx.get_hash().to_string();
        self.inner.blockchain.admit_transaction(tx.clone())?;
        self.inner.mark_seen(&hash);
        self.inner.broadcast(&Payload::NewTx(tx), None);
        Ok(())
    }

    pub fn blockchain(&self) -> &Blockchain {
        &self.inner.blockchain
    }

    pub fn node_id(&self) -> &str {
        self.inner.node_id.as_str()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn peer_count(&self) -> usize {
        self.inner.peers.len()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }
}

impl BlockAnnouncer for Server {
    fn announce_block(&self, block: &Block) {
        self.inner.mark_seen(block.get_hash());
        info!(
            "Announcing block {} to {} peers",
            block.get_index(),
            self.inner.peers.len()
        );
        self.inner.broadcast(&Payload::NewBlock(block.clone()), None);
    }
}

impl ServerInner {
    fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        for stream in listener.incoming() {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            match stream {
                Ok(stream) => {
                    if let Err(e) = self.attach_peer(stream, None) {
                        error!("Failed to set up inbound connection: {e}");
                    }
                }
                Err(e) => error!("Error accepting connection: {e}"),
            }
        }
        debug!("Accept loop finished");
    }

    fn connect(self: &Arc<Self>, addr: &str) -> Result<()> {
        if self.is_self_address(addr) {
            return Err(BlockchainError::Network(format!(
                "Refusing to dial our own address {addr}"
            )));
        }
        if self.peers.is_connected_to(addr) {
            debug!("Already connected to {addr}");
            return Ok(());
        }
        let socket_addr = resolve(addr)?;
        let stream = TcpStream::connect_timeout(&socket_addr, TCP_CONNECT_TIMEOUT)
            .map_err(|e| BlockchainError::Network(format!("Failed to connect to {addr}: {e}")))?;
        self.attach_peer(stream, Some(addr.to_string()))?;
        Ok(())
    }

    /// Register a fresh connection, start its receive loop and open the
    /// conversation with `ping` and `getPeers`
    fn attach_peer(self: &Arc<Self>, stream: TcpStream, dial_addr: Option<String>) -> Result<()> {
        stream
            .set_read_timeout(Some(self.peer_timeout))
            .map_err(|e| BlockchainError::Network(format!("Failed to set read timeout: {e}")))?;
        let (peer, reader) = Peer::new(stream, dial_addr, TCP_WRITE_TIMEOUT)?;
        self.peers.add(Arc::clone(&peer));

        let inner = Arc::clone(self);
        let receiver = Arc::clone(&peer);
        let spawned = thread::Builder::new()
            .name(format!("peer-{}", peer.address()))
            .spawn(move || inner.receive_loop(receiver, reader));
        if let Err(e) = spawned {
            self.drop_peer(&peer);
            return Err(e.into());
        }

        info!(
            "Peer {} connected ({}, {})",
            peer.id(),
            peer.address(),
            if peer.is_outbound() { "outbound" } else { "inbound" }
        );
        self.send_to(&peer, &Payload::Ping(self.status()));
        self.send_to(&peer, &Payload::GetPeers);
        Ok(())
    }

    fn receive_loop(self: Arc<Self>, peer: Arc<Peer>, mut reader: TcpStream) {
        while self.running.load(Ordering::SeqCst) {
            let message = match read_frame(&mut reader) {
                Ok(message) => message,
                Err(e) => {
                    debug!("Receive loop for {} ended: {e}", peer.address());
                    break;
                }
            };
            peer.touch();

            if message.node_id == self.node_id {
                warn!("Connection to {} leads back to this node, closing", peer.address());
                if let Some(addr) = peer.dial_addr() {
                    self.self_addresses
                        .write()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(addr.to_string());
                }
                break;
            }
            peer.set_node_id(&message.node_id);

            if let Err(e) = self.handle_message(&peer, &message) {
                warn!(
                    "Failed to handle {:?} from {}: {e}",
                    message.message_type,
                    peer.address()
                );
            }
        }
        self.drop_peer(&peer);
    }

    fn handle_message(self: &Arc<Self>, peer: &Arc<Peer>, message: &Message) -> Result<()> {
        match message.payload()? {
            Payload::Ping(_) => self.send_to(peer, &Payload::Pong(self.status())),
            Payload::Pong(remote) => self.request_blocks_if_behind(peer, remote.height),
            Payload::GetBlocks => self.send_to(peer, &Payload::Blocks(self.blockchain.blocks())),
            Payload::Blocks(blocks) => self.handle_blocks(peer, blocks),
            Payload::NewBlock(block) => self.handle_new_block(peer, message, block),
            Payload::NewTx(tx) => self.handle_new_tx(peer, message, tx),
            Payload::GetPeers => self.send_to(peer, &Payload::Peers(self.peers.dialed_addresses())),
            Payload::Peers(addresses) => self.handle_peers(addresses),
        }
        Ok(())
    }

    fn request_blocks_if_behind(&self, peer: &Peer, remote_height: u64) {
        let local_height = self.blockchain.height();
        if remote_height > local_height {
            info!(
                "Peer {} is at height {remote_height}, we are at {local_height}; requesting blocks",
                peer.address()
            );
            self.send_to(peer, &Payload::GetBlocks);
        }
    }

    /// Each block stands alone: one that fails validation does not stop the rest
    fn handle_blocks(&self, peer: &Peer, blocks: Vec<Block>) {
        let mut appended = 0;
        for block in blocks {
            if block.get_index() < self.blockchain.height() {
                continue;
            }
            let hash = block.get_hash().to_string();
            match self.blockchain.append_block(block) {
                Ok(()) => {
                    self.mark_seen(&hash);
                    appended += 1;
                }
                Err(e) => debug!("Dropping synced block {hash}: {e}"),
            }
        }
        if appended > 0 {
            info!("Synced {appended} blocks from {}", peer.address());
        }
    }

    /// Marked seen only once committed; until then the hash is just a claim
    fn handle_new_block(&self, peer: &Peer, message: &Message, block: Block) {
        let hash = block.get_hash().to_string();
        if self.is_seen(&hash) {
            debug!("Ignoring already seen block {hash}");
            return;
        }
        let index = block.get_index();
        match self.blockchain.append_block(block) {
            Ok(()) => {
                info!("Accepted block {index} from {}", peer.address());
                if self.mark_seen(&hash) {
                    self.relay(message, peer.id());
                }
            }
            Err(e) => {
                warn!("Rejected block {hash} from {}: {e}", peer.address());
                self.request_blocks_if_behind(peer, index);
            }
        }
    }

    fn handle_new_tx(&self, peer: &Peer, message: &Message, tx: Transaction) {
        let hash = tx.get_hash().to_string();
        if self.is_seen(&hash) {
            debug!("Ignoring already seen transaction {hash}");
            return;
        }
        match self.blockchain.admit_transaction(tx) {
            Ok(()) => {
                if self.mark_seen(&hash) {
                    self.relay(message, peer.id());
                }
            }
            Err(e) => warn!("Rejected transaction {hash} from {}: {e}", peer.address()),
        }
    }

    fn handle_peers(self: &Arc<Self>, addresses: Vec<String>) {
        for addr in addresses {
            if self.is_self_address(&addr) || self.peers.is_connected_to(&addr) {
                continue;
            }
            let inner = Arc::clone(self);
            thread::spawn(move || {
                if let Err(e) = inner.connect(&addr) {
                    warn!("Failed to connect to advertised peer {addr}: {e}");
                }
            });
        }
    }

    fn maintenance_loop(self: Arc<Self>, stop_rx: mpsc::Receiver<()>) {
        // ping often enough that idle peers never hit the read timeout
        let heartbeat = (self.peer_timeout / 2)
            .min(self.maintenance_interval)
            .max(Duration::from_millis(100));
        let mut last_maintenance = Instant::now();

        loop {
            match stop_rx.recv_timeout(heartbeat) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
            self.broadcast(&Payload::Ping(self.status()), None);

            if last_maintenance.elapsed() >= self.maintenance_interval {
                last_maintenance = Instant::now();
                self.evict_stale_peers();
                self.reconnect_bootstrap_nodes();
            }
        }
        debug!("Peer maintenance finished");
    }

    fn evict_stale_peers(&self) {
        for peer in self.peers.stale(self.peer_timeout) {
            warn!(
                "Evicting peer {} after {:?} of silence",
                peer.address(),
                peer.idle_for()
            );
            self.drop_peer(&peer);
        }
    }

    fn reconnect_bootstrap_nodes(self: &Arc<Self>) {
        for addr in &self.bootstrap_nodes {
            if self.is_self_address(addr) || self.peers.is_connected_to(addr) {
                continue;
            }
            if let Err(e) = self.connect(addr) {
                debug!("Bootstrap node {addr} still unreachable: {e}");
            }
        }
    }

    fn drop_peer(&self, peer: &Peer) {
        if self.peers.remove(peer.id()).is_some() {
            info!(
                "Peer {} disconnected ({}, node {})",
                peer.id(),
                peer.address(),
                peer.node_id().as_deref().unwrap_or("unknown")
            );
        }
        peer.close();
    }

    fn send_to(&self, peer: &Peer, payload: &Payload) {
        let result = Message::new(payload, &self.node_id, &self.version)
            .and_then(|message| peer.send(&message));
        if let Err(e) = result {
            warn!(
                "Failed to send {:?} to {}: {e}",
                payload.message_type(),
                peer.address()
            );
            // a timed-out write may have left half a frame on the socket
            self.drop_peer(peer);
        }
    }

    fn broadcast(&self, payload: &Payload, except: Option<&str>) {
        match Message::new(payload, &self.node_id, &self.version) {
            Ok(message) => self.broadcast_message(&message, except),
            Err(e) => error!("Failed to build {:?} message: {e}", payload.message_type()),
        }
    }

    fn broadcast_message(&self, message: &Message, except: Option<&str>) {
        for peer in self.peers.all() {
            if Some(peer.id()) == except {
                continue;
            }
            if let Err(e) = peer.send(message) {
                warn!("Failed to send to {}: {e}", peer.address());
                self.drop_peer(&peer);
            }
        }
    }

    /// Forward a message to every peer except the one it came from
    fn relay(&self, message: &Message, from_peer: &str) {
        self.broadcast_message(&message.relayed_by(&self.node_id), Some(from_peer));
    }

    fn is_seen(&self, hash: &str) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(hash)
    }

    fn mark_seen(&self, hash: &str) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hash)
    }

    fn status(&self) -> ChainStatus {
        ChainStatus {
            height: self.blockchain.height(),
            best_hash: self.blockchain.tip_hash(),
        }
    }

    fn register_self_address(&self, local_addr: SocketAddr) {
        let mut addresses = self
            .self_addresses
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        addresses.insert(self.listen_addr.clone());
        addresses.insert(local_addr.to_string());
        addresses.insert(loopback_of(local_addr).to_string());
        addresses.insert(format!("localhost:{}", local_addr.port()));
    }

    fn is_self_address(&self, addr: &str) -> bool {
        self.self_addresses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(addr)
    }
}

/// Submit one transaction to a running node and hang up
pub fn send_transaction(addr: &str, tx: &Transaction, node_id: &str) -> Result<()> {
    let socket_addr = resolve(addr)?;
    let mut stream = TcpStream::connect_timeout(&socket_addr, TCP_CONNECT_TIMEOUT)
        .map_err(|e| BlockchainError::Network(format!("Failed to connect to {addr}: {e}")))?;
    stream
        .set_write_timeout(Some(TCP_WRITE_TIMEOUT))
        .map_err(|e| BlockchainError::Network(format!("Failed to set write timeout: {e}")))?;

    let message = Message::new(&Payload::NewTx(tx.clone()), node_id, PROTOCOL_VERSION)?;
    write_frame(&mut stream, &message)?;

    // half-close and wait for the node to hang up so our frame is read before teardown
    let _ = stream.shutdown(Shutdown::Write);
    let _ = stream.set_read_timeout(Some(CLIENT_DRAIN_TIMEOUT));
    let mut discard = Vec::new();
    let _ = stream.read_to_end(&mut discard);
    Ok(())
}

fn resolve(addr: &str) -> Result<SocketAddr> {
    addr.to_socket_addrs()
        .map_err(|e| BlockchainError::Network(format!("Invalid address {addr}: {e}")))?
        .next()
        .ok_or_else(|| BlockchainError::Network(format!("Address {addr} did not resolve")))
}

fn loopback_of(addr: SocketAddr) -> SocketAddr {
    if addr.ip().is_unspecified() {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
    } else {
        addr
    }
}
