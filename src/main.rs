use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use serde_json::json;

use powledger::blockchain::{crypto, Block, Blockchain, TxInput};
use powledger::Config;

/// A single-node proof-of-work ledger
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML config file (defaults to ./powledger.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the database directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Overrides the proof-of-work difficulty
    #[arg(long)]
    target_bits: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a ledger whose genesis reward goes to ADDRESS
    Createblockchain {
        #[arg(long)]
        address: String,
    },

    /// Print the balance of ADDRESS
    Getbalance {
        #[arg(long)]
        address: String,
    },

    /// Send AMOUNT from FROM to TO and mine the payment
    Send {
        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,

        #[arg(long)]
        amount: u64,
    },

    /// Print every block from the tip back to genesis
    Printchain {
        /// Emit one JSON document per block
        #[arg(long)]
        json: bool,
    },

    /// Check proof of work and linkage of the whole chain
    Verify,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref()).context("Failed to load config")?;

    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(target_bits) = cli.target_bits {
        config.target_bits = target_bits;
    }

    config.validate()?;
    Ok(config)
}

fn print_block(chain: &Blockchain, block: &Block, as_json: bool) -> Result<()> {
    let created = block
        .created_at()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| block.timestamp.to_string());
    let valid = chain.pow().validate(block);

    if as_json {
        let transactions: Vec<_> = block
            .transactions
            .iter()
            .map(|tx| {
                let inputs: Vec<_> = tx
                    .inputs
                    .iter()
                    .map(|input| match input {
                        TxInput::Coinbase { memo } => json!({ "coinbase": memo }),
                        TxInput::Spend {
                            prev_tx_id,
                            output_index,
                            authorization,
                        } => json!({
                            "txid": crypto::to_hex(prev_tx_id),
                            "vout": output_index,
                            "authorization": authorization,
                        }),
                    })
                    .collect();
                json!({
                    "id": tx.id_hex(),
                    "inputs": inputs,
                    "outputs": tx.outputs,
                })
            })
            .collect();

        let document = json!({
            "hash": block.hash_hex(),
            "prev_hash": crypto::to_hex(&block.prev_hash),
            "timestamp": created,
            "nonce": block.nonce,
            "pow": valid,
            "transactions": transactions,
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    println!("============ Block {} ============", block.hash_hex());
    println!("Prev. block: {}", crypto::to_hex(&block.prev_hash));
    println!("Created:     {}", created);
    println!("Nonce:       {}", block.nonce);
    println!("PoW:         {}", valid);
    for tx in &block.transactions {
        println!("--- Transaction {}", tx.id_hex());
        for input in &tx.inputs {
            match input {
                TxInput::Coinbase { memo } => println!("    in  coinbase: {}", memo),
                TxInput::Spend {
                    prev_tx_id,
                    output_index,
                    authorization,
                } => println!(
                    "    in  {}:{} by {}",
                    crypto::to_hex(prev_tx_id),
                    output_index,
                    authorization
                ),
            }
        }
        for (idx, output) in tx.outputs.iter().enumerate() {
            println!("    out {}: {} to {}", idx, output.value, output.lock);
        }
    }
    println!();
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::Createblockchain { address } => {
            let chain = Blockchain::create(&config, &address)?;
            info!("Created blockchain at {}", config.data_dir.display());
            println!("Done! Genesis block {}", crypto::to_hex(chain.tip()));
            chain.close()?;
        }
        Command::Getbalance { address } => {
            let chain = Blockchain::open(&config)?;
            let balance = chain.get_balance(&address)?;
            println!("Balance of '{}': {}", address, balance);
            chain.close()?;
        }
        Command::Send { from, to, amount } => {
            let mut chain = Blockchain::open(&config)?;
            let block = chain.send(&from, &to, amount)?;
            println!("Success! Mined block {}", block.hash_hex());
            chain.close()?;
        }
        Command::Printchain { json } => {
            let chain = Blockchain::open(&config)?;
            for block in chain.iterator() {
                print_block(&chain, &block?, json)?;
            }
            chain.close()?;
        }
        Command::Verify => {
            let chain = Blockchain::open(&config)?;
            let count = chain.verify()?;
            println!("Chain is valid: {} block(s)", count);
            chain.close()?;
        }
    }

    Ok(())
}
