//! lantern-wallet
//!
//! CLI wallet for the Midnight network. Derives identities from a BIP-39
//! mnemonic, mirrors the unshielded UTXO set from an indexer, and builds,
//! signs and submits unshielded transfers.
//!
//! Usage:
//!   lantern-wallet create   [--words <n>]
//!   lantern-wallet restore
//!   lantern-wallet address  [--network <tag>]
//!   lantern-wallet balance  [--network <tag>] [--db <path>]
//!   lantern-wallet send     --to <address> --amount <n> [--token <hex32>]
//!   lantern-wallet sync
//!
//! The mnemonic is read from $LANTERN_MNEMONIC or prompted on stdin; it is
//! never written to disk.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio_stream::StreamExt;
use tracing::info;

use lantern_core::{NetworkTag, TokenType};
use lantern_indexer::IndexerConfig;
use lantern_keys::{generate, identity, master_from_seed, to_seed, validate, Role};
use lantern_state::observe_balances;
use lantern_wallet::Wallet;

// ── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "lantern-wallet",
    version,
    about = "Midnight light wallet — track balances, send unshielded value"
)]
struct Args {
    /// Network tag: undeployed, test, preview or mainnet.
    #[arg(long, global = true, default_value = "undeployed")]
    network: String,

    /// Explicit indexer base URL. Defaults to the network's well-known
    /// endpoint; must belong to the same network as --network.
    #[arg(long, global = true)]
    indexer_url: Option<String>,

    /// Path to the local wallet database.
    #[arg(long, global = true, default_value = "~/.lantern/wallet.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new mnemonic and print it once, with the first address.
    Create {
        /// Word count: 12, 15, 18, 21 or 24.
        #[arg(long, default_value_t = 24)]
        words: usize,
    },

    /// Validate a mnemonic and print the first address it derives.
    Restore,

    /// Print the receive address for the selected network.
    Address,

    /// Print spendable balances from the local store.
    Balance,

    /// Send unshielded value.
    Send {
        /// Recipient address (bech32m, must match --network).
        #[arg(long)]
        to: String,
        /// Amount in base token units.
        #[arg(long)]
        amount: u128,
        /// Token type as 64 hex chars. Defaults to the native token.
        #[arg(long)]
        token: Option<String>,
    },

    /// Run the reconciliation loop until interrupted, printing balances as
    /// they change.
    Sync,
}

// ── Main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("warn,lantern_wallet=info")
        .init();

    let args = Args::parse();
    let network: NetworkTag = args.network.parse()?;
    let config = match &args.indexer_url {
        Some(url) => IndexerConfig::with_base_url(network, url.as_str()),
        None => IndexerConfig::for_network(network),
    };
    let db_path = expand_tilde(&args.db);

    match args.command {
        Command::Create { words } => {
            let mnemonic = generate(words)?;
            let master = master_from_seed(&to_seed(&mnemonic.to_string(), "")?)?;
            let external = identity(&master, 0, Role::NightExternal, 0)?;
            println!("Mnemonic:  {mnemonic}");
            println!("Address:   {}", external.address(network));
            println!("\nWRITE THE MNEMONIC DOWN NOW. It will not be shown again");
            println!("and is never stored by this wallet.");
            Ok(())
        }

        Command::Restore => {
            let phrase = read_mnemonic()?;
            let master = master_from_seed(&to_seed(&phrase, "")?)?;
            let external = identity(&master, 0, Role::NightExternal, 0)?;
            println!("Address: {}", external.address(network));
            Ok(())
        }

        Command::Address => {
            let phrase = read_mnemonic()?;
            let wallet = Wallet::open(&phrase, "", network, config, &db_path)?;
            println!("{}", wallet.address());
            Ok(())
        }

        Command::Balance => {
            let phrase = read_mnemonic()?;
            let wallet = Wallet::open(&phrase, "", network, config, &db_path)?;
            print_balances(&wallet.balances()?);
            Ok(())
        }

        Command::Send { to, amount, token } => {
            let phrase = read_mnemonic()?;
            let wallet = Wallet::open(&phrase, "", network, config, &db_path)?;
            let token = match token {
                Some(hex) => TokenType::from_hex(&hex)?,
                None => TokenType::NATIVE,
            };
            let tx_hash = wallet.send(&to, token, amount).await?;
            println!("Submitted: {tx_hash}");
            println!("Run `lantern-wallet sync` to track it to finality.");
            Ok(())
        }

        Command::Sync => {
            let phrase = read_mnemonic()?;
            let wallet = Wallet::open(&phrase, "", network, config, &db_path)?;
            info!(address = %wallet.address(), "starting sync");
            let handle = wallet.start_sync();

            let mut balances =
                Box::pin(observe_balances(wallet.store().clone(), wallet.address()));
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    Some(snapshot) = balances.next() => print_balances(&snapshot),
                }
            }
            handle.stop().await?;
            Ok(())
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Read the mnemonic from $LANTERN_MNEMONIC, or prompt for it. The phrase
/// only ever lives in process memory.
fn read_mnemonic() -> anyhow::Result<String> {
    let phrase = match std::env::var("LANTERN_MNEMONIC") {
        Ok(phrase) => phrase,
        Err(_) => {
            print!("Mnemonic: ");
            std::io::stdout().flush()?;
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .context("reading mnemonic from stdin")?;
            line
        }
    };
    if !validate(&phrase) {
        bail!("mnemonic failed checksum validation");
    }
    Ok(phrase)
}

fn print_balances(balances: &std::collections::BTreeMap<TokenType, u128>) {
    if balances.is_empty() {
        println!("No spendable balance.");
        return;
    }
    for (token, value) in balances {
        println!("{token}  {value}");
    }
}

fn expand_tilde(path: &PathBuf) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.clone()
}
