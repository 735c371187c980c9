//! ChainPipe CLI.
//!
//! # Commands
//! ```text
//! chainpipe filter        [--input <events.jsonl>] [--config <pipeline.yaml>]
//!                         [--address <a>]... [--policy-id <hex>]...
//!                         [--asset-fingerprint <asset1…>]... [--pool-id <id>]...
//! chainpipe fingerprint   --policy <hex> [--name <hex>]
//! chainpipe stake-address <addr1…>
//! ```

use anyhow::{anyhow, Context, Result};
use chainpipe_core::{asset_fingerprint, Address};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd_filter;

#[derive(Parser)]
#[command(
    name = "chainpipe",
    about = "Filter and inspect chain-sync event streams",
    long_about = "
ChainPipe CLI: run chain-sync events through a filter stage and log the ones
that match, or inspect the ledger identifiers the filter matches on.

ENVIRONMENT VARIABLES:
  RUST_LOG    Overrides the log filter of `chainpipe filter`
",
    version
)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Filter a JSON-lines stream of chain-sync events
    Filter {
        /// Events file, one JSON event per line (default: stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// YAML pipeline file with `filter`, `output` and `log` sections
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Payment or stake address (repeatable, replaces the file's list)
        #[arg(long = "address")]
        addresses: Vec<String>,
        /// Hex policy ID (repeatable)
        #[arg(long = "policy-id")]
        policy_ids: Vec<String>,
        /// CIP-14 asset fingerprint (repeatable)
        #[arg(long = "asset-fingerprint")]
        asset_fingerprints: Vec<String>,
        /// Hex pool key hash or bech32 pool ID (repeatable)
        #[arg(long = "pool-id")]
        pool_ids: Vec<String>,
        /// Level matching events are logged at
        #[arg(long)]
        level: Option<String>,
    },

    /// Compute the CIP-14 fingerprint of a native asset
    Fingerprint {
        /// Policy ID (hex)
        #[arg(long)]
        policy: String,
        /// Asset name (hex, empty for the nameless asset)
        #[arg(long, default_value = "")]
        name: String,
    },

    /// Print the stake address a payment address delegates with
    #[command(name = "stake-address")]
    StakeAddress {
        /// Bech32 address (`addr…`, `stake…`)
        address: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Filter {
            input,
            config,
            addresses,
            policy_ids,
            asset_fingerprints,
            pool_ids,
            level,
        } => {
            let args = cmd_filter::FilterArgs {
                input,
                config,
                addresses,
                policy_ids,
                asset_fingerprints,
                pool_ids,
                level,
                verbose: cli.verbose,
                json: cli.json,
            };
            cmd_filter::run(args).await
        }

        Commands::Fingerprint { policy, name } => cmd_fingerprint(&policy, &name),

        Commands::StakeAddress { address } => cmd_stake_address(&address),
    }
}

// ─── Command implementations ─────────────────────────────────────────────────

fn cmd_fingerprint(policy: &str, name: &str) -> Result<()> {
    let policy = hex::decode(policy).context("invalid policy hex")?;
    let name = hex::decode(name).context("invalid asset name hex")?;
    let fingerprint = asset_fingerprint(&policy, &name)?;
    println!("{fingerprint}");
    Ok(())
}

fn cmd_stake_address(address: &str) -> Result<()> {
    let stake = Address::new(address)
        .stake_address()
        .ok_or_else(|| anyhow!("'{address}' has no stake part"))?;
    println!("{stake}");
    Ok(())
}
