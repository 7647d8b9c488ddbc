use crate::core::{Block, Blockchain, ProofOfWork};
use crate::error::{BlockchainError, Result};
use log::{debug, error, info, warn};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Receives every block this node mines after it has been committed locally
pub trait BlockAnnouncer: Send + Sync {
    fn announce_block(&self, block: &Block);
}

struct MiningWorker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
    miner_address: String,
}

/// The consensus loop: on every tick, mine the pending pool into a block.
///
/// At most one loop runs per `Miner`. Stopping is cooperative; a search in
/// progress only ends early when the chain tip moves under it.
pub struct Miner {
    blockchain: Blockchain,
    announcer: Option<Arc<dyn BlockAnnouncer>>,
    interval: Duration,
    max_attempts: u64,
    worker: Mutex<Option<MiningWorker>>,
}

impl Miner {
    pub fn new(blockchain: Blockchain, interval: Duration, max_attempts: u64) -> Miner {
        Miner {
            blockchain,
            announcer: None,
            interval,
            max_attempts,
            worker: Mutex::new(None),
        }
    }

    pub fn with_announcer(mut self, announcer: Arc<dyn BlockAnnouncer>) -> Miner {
        self.announcer = Some(announcer);
        self
    }

    pub fn start(&self, miner_address: &str) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return Err(BlockchainError::Consensus(
                "Mining is already running".to_string(),
            ));
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let blockchain = self.blockchain.clone();
        let announcer = self.announcer.clone();
        let interval = self.interval;
        let max_attempts = self.max_attempts;
        let address = miner_address.to_string();

        let handle = thread::Builder::new()
            .name("miner".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
                match mine_once(&blockchain, &address, max_attempts) {
                    Ok(Some(block)) => {
                        if let Some(announcer) = &announcer {
                            announcer.announce_block(&block);
                        }
                    }
                    Ok(None) => debug!("Nothing to mine"),
                    Err(e) => warn!("Mining attempt failed, retrying next tick: {e}"),
                }
            })?;

        info!("Mining started for {miner_address}");
        *worker = Some(MiningWorker {
            stop_tx,
            handle,
            miner_address: miner_address.to_string(),
        });
        Ok(())
    }

    /// Signal the loop and wait for it. A running search finishes first.
    pub fn stop(&self) -> Result<()> {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| BlockchainError::Consensus("Mining is not running".to_string()))?;

        // the loop may already have exited; a closed channel is fine
        let _ = worker.stop_tx.send(());
        if worker.handle.join().is_err() {
            error!("Mining thread panicked");
        }
        info!("Mining stopped");
        Ok(())
    }

    pub fn is_mining(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn miner_address(&self) -> Option<String> {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|worker| worker.miner_address.clone())
    }
}

impl Drop for Miner {
    fn drop(&mut self) {
        if self.is_mining() {
            let _ = self.stop();
        }
    }
}

/// One tick of the loop. Returns the committed block, or `None` when the
/// pool held nothing worth mining.
///
/// The search runs without holding the chain lock and gives up as soon as
/// the tip it was building on is no longer the tip.
pub fn mine_once(
    blockchain: &Blockchain,
    miner_address: &str,
    max_attempts: u64,
) -> Result<Option<Block>> {
    if blockchain.pending_count() == 0 {
        return Ok(None);
    }

    let mut candidate = blockchain.build_candidate_block(miner_address)?;
    if candidate.get_transactions().is_empty() {
        return Ok(None);
    }

    let parent = candidate.get_prev_hash().to_string();
    let difficulty = blockchain.params().difficulty;
    info!(
        "Mining block {} with {} transactions",
        candidate.get_index(),
        candidate.get_transactions().len()
    );

    let pow = ProofOfWork::new_proof_of_work(candidate.clone(), difficulty);
    let (nonce, hash) = pow.run_until(max_attempts, || blockchain.tip_hash() != parent)?;
    candidate.set_solution(nonce, hash);

    blockchain.append_block(candidate.clone())?;
    Ok(Some(candidate))
}
