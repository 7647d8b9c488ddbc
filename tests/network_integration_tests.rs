//! Two nodes over loopback TCP

use pow_ledger::core::params::ChainParams;
use pow_ledger::{
    BlockAnnouncer, Blockchain, Config, Miner, ProofOfWork, Server, Transaction, Wallet,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn node_config(bootstrap: Vec<String>) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        difficulty: 1,
        bootstrap_nodes: bootstrap,
        ..Config::default()
    }
}

fn chain() -> Blockchain {
    Blockchain::new(ChainParams::default().with_difficulty(1))
}

fn signed(from: &str, to: &str, amount: u64) -> Transaction {
    let wallet = Wallet::new().unwrap();
    let mut tx = Transaction::new(from, to, amount, 1, 0).unwrap();
    wallet.sign_transaction(&mut tx).unwrap();
    tx
}

fn wait_for(what: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(15);
    while Instant::now() < deadline {
        if what() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    false
}

#[test]
fn test_new_block_converges_two_nodes() {
    let first_chain = chain();
    let first = Server::new(&node_config(vec![]), first_chain.clone());
    let first_addr = first.start().unwrap();

    let second_chain = chain();
    let second = Server::new(&node_config(vec![first_addr.to_string()]), second_chain.clone());
    second.start().unwrap();
    assert!(wait_for(|| first.peer_count() >= 1 && second.peer_count() >= 1));

    let candidate = first_chain.build_candidate_block("M").unwrap();
    let block = ProofOfWork::solve(candidate, 1, 10_000_000).unwrap();
    first_chain.append_block(block.clone()).unwrap();
    first.announce_block(&block);

    assert!(wait_for(|| second_chain.tip_hash() == first_chain.tip_hash()));
    assert_eq!(second_chain.height(), 2);
    assert_eq!(second_chain.balance_of("M"), 50);

    second.stop();
    first.stop();
}

#[test]
fn test_transaction_and_mined_block_propagate() {
    let first_chain = chain();
    let first = Server::new(&node_config(vec![]), first_chain.clone());
    let first_addr = first.start().unwrap();

    let second_chain = chain();
    let second = Server::new(&node_config(vec![first_addr.to_string()]), second_chain.clone());
    second.start().unwrap();
    assert!(wait_for(|| first.peer_count() >= 1 && second.peer_count() >= 1));

    let tx = signed("genesis_address", "A", 100);
    second.submit_transaction(tx.clone()).unwrap();
    assert!(wait_for(|| first_chain.is_pending(tx.get_hash())));

    let miner = Miner::new(first_chain.clone(), Duration::from_millis(50), 10_000_000)
        .with_announcer(Arc::new(first.clone()));
    miner.start("M").unwrap();

    assert!(wait_for(|| second_chain.is_committed(tx.get_hash())));
    miner.stop().unwrap();

    assert_eq!(second_chain.tip_hash(), first_chain.tip_hash());
    assert_eq!(second_chain.balance_of("A"), 100);
    assert!(!second_chain.is_pending(tx.get_hash()));

    second.stop();
    first.stop();
}
