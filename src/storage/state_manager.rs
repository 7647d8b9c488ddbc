use crate::core::Blockchain;
use crate::error::{BlockchainError, Result};
use log::info;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Periodic snapshot timer: saves the whole chain through its store on a
/// fixed interval and once more on stop.
pub struct StateManager {
    blockchain: Blockchain,
    interval: Duration,
    worker: Mutex<Option<(Sender<()>, JoinHandle<()>)>>,
}

impl StateManager {
    pub fn new(blockchain: Blockchain, interval: Duration) -> StateManager {
        StateManager {
            blockchain,
            interval,
            worker: Mutex::new(None),
        }
    }

    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return Err(BlockchainError::Consensus(
                "Snapshot timer is already running".to_string(),
            ));
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let blockchain = self.blockchain.clone();
        let interval = self.interval;
        let handle = thread::Builder::new()
            .name("snapshot".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => blockchain.persist(),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        info!("Snapshot timer started, interval {:?}", self.interval);
        *worker = Some((stop_tx, handle));
        Ok(())
    }

    /// Stop the timer and write a final snapshot
    pub fn stop(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((stop_tx, handle)) = worker {
            let _ = stop_tx.send(());
            let _ = handle.join();
        }
        self.blockchain.persist();
        info!("Snapshot timer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{JsonFileStore, SnapshotStore};
    use crate::testnet::test_params;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_periodic_save_writes_snapshot() {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path()).unwrap());
        let chain = Blockchain::with_store(test_params(), store.clone());

        let manager = StateManager::new(chain, Duration::from_millis(20));
        manager.start().unwrap();
        assert!(manager.start().is_err());
        thread::sleep(Duration::from_millis(100));
        manager.stop();

        assert!(store.load_chain().unwrap().is_some());
    }
}
