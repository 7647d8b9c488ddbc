use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "pow-ledger", about = "Proof-of-work account ledger node")]
pub struct Opt {
    #[arg(long = "config", global = true, help = "Path to a TOML configuration file")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "startnode", about = "Start a ledger node")]
    StartNode {
        #[arg(long = "miner", help = "Enable mining and send block rewards to ADDRESS")]
        miner: Option<String>,
    },
    #[command(name = "printchain", about = "Print all blocks in the stored chain")]
    Printchain,
    #[command(name = "validatechain", about = "Validate the stored chain and state")]
    Validatechain,
    #[command(name = "rollback", about = "Truncate the stored chain to HEIGHT")]
    Rollback {
        #[arg(help = "Index of the last block to keep")]
        height: u64,
    },
    #[command(name = "send", about = "Sign a transfer and submit it to a node")]
    Send {
        #[arg(help = "Sender address")]
        from: String,
        #[arg(help = "Recipient address")]
        to: String,
        #[arg(help = "Amount to send")]
        amount: u64,
        #[arg(long = "fee", default_value_t = 0, help = "Fee paid on top of the amount")]
        fee: u64,
        #[arg(long = "nonce", default_value_t = 0, help = "Sender-chosen nonce")]
        nonce: u64,
        #[arg(
            long = "node",
            help = "Node to submit to (defaults to the configured listen address)"
        )]
        node: Option<String>,
    },
}
