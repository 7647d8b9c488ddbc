use clap::Parser;
use log::{error, info, warn, LevelFilter};
use pow_ledger::{
    open_store, send_transaction, Blockchain, ChainParams, Command, Config, Miner, Opt, Server,
    StateManager, Transaction, Wallet,
};
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::{io, process, thread};

fn main() {
    // RUST_LOG still overrides the default level
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let opt = Opt::parse();
    if let Err(e) = run_command(opt.config.as_deref(), opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(
    config_path: Option<&Path>,
    command: Command,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(config_path)?;
    match command {
        Command::StartNode { miner } => start_node(&config, miner)?,
        Command::Printchain => {
            let blockchain = open_chain(&config)?;
            for block in blockchain.blocks() {
                println!("Block {}", block.get_index());
                println!("  Hash:        {}", block.get_hash());
                println!("  Prev hash:   {}", block.get_prev_hash());
                println!("  Merkle root: {}", block.get_merkle_root());
                println!("  Timestamp:   {}", block.get_timestamp());
                println!("  Nonce:       {}", block.get_nonce());
                println!(
                    "  Miner:       {} (reward {})",
                    block.get_miner(),
                    block.get_block_reward()
                );
                for tx in block.get_transactions() {
                    println!(
                        "  - {} {} -> {} amount {} fee {} [{}]",
                        tx.get_hash(),
                        tx.get_from(),
                        tx.get_to(),
                        tx.get_amount(),
                        tx.get_fee(),
                        tx.get_status()
                    );
                }
                println!();
            }
            let info = blockchain.chain_info();
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::Validatechain => {
            let blockchain = open_stored_chain(&config)?;
            blockchain.verify_state_integrity()?;
            println!(
                "Chain of {} blocks is valid, tip {}",
                blockchain.height(),
                blockchain.tip_hash()
            );
        }
        Command::Rollback { height } => {
            let blockchain = open_stored_chain(&config)?;
            let removed = blockchain.rollback_to_height(height)?;
            println!("Removed {removed} blocks, tip is now {}", blockchain.tip_hash());
        }
        Command::Send {
            from,
            to,
            amount,
            fee,
            nonce,
            node,
        } => {
            if amount == 0 {
                return Err("Amount must be positive".into());
            }
            if from == to {
                return Err("Sender and recipient must differ".into());
            }
            let mut tx = Transaction::new(&from, &to, amount, fee, nonce)?;
            let wallet = Wallet::new()?;
            wallet.sign_transaction(&mut tx)?;

            let node = node.unwrap_or_else(|| dial_addr(&config));
            send_transaction(&node, &tx, &config.node_id)?;
            println!("Submitted transaction {} to {node}", tx.get_hash());
        }
    }
    Ok(())
}

fn open_chain(config: &Config) -> pow_ledger::Result<Blockchain> {
    let store = open_store(config)?;
    Ok(Blockchain::with_store(ChainParams::from_config(config), store))
}

/// Open the stored chain without falling back to genesis
fn open_stored_chain(config: &Config) -> pow_ledger::Result<Blockchain> {
    let store = open_store(config)?;
    Blockchain::open(ChainParams::from_config(config), store)
}

/// The configured listen address, with a wildcard host swapped for loopback
fn dial_addr(config: &Config) -> String {
    match config.host.as_str() {
        "0.0.0.0" | "::" => format!("127.0.0.1:{}", config.port),
        _ => config.listen_addr(),
    }
}

fn start_node(config: &Config, miner_address: Option<String>) -> pow_ledger::Result<()> {
    let blockchain = open_chain(config)?;
    info!(
        "Node {} starting at height {} (difficulty {}, reward {})",
        config.node_id,
        blockchain.height(),
        config.difficulty,
        config.block_reward
    );

    let server = Server::new(config, blockchain.clone());
    server.start()?;

    let state_manager = StateManager::new(blockchain.clone(), config.snapshot_interval());
    state_manager.start()?;

    let miner = Miner::new(
        blockchain.clone(),
        config.mining_interval(),
        config.max_mining_attempts,
    )
    .with_announcer(Arc::new(server.clone()));
    if let Some(address) = miner_address {
        println!("Mining is on. Address to receive rewards: {address}");
        miner.start(&address)?;
    }

    wait_for_quit();

    info!("Shutting down");
    if miner.is_mining() {
        miner.stop()?;
    }
    server.stop();
    state_manager.stop();
    Ok(())
}

/// Block until `quit` is typed. Without a terminal the node runs until killed.
fn wait_for_quit() {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(line) if matches!(line.trim(), "quit" | "exit") => return,
            Ok(_) => {}
            Err(e) => {
                warn!("Failed to read stdin: {e}");
                break;
            }
        }
    }
    loop {
        thread::park();
    }
}
