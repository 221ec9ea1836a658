use std::path::{Path, PathBuf};
use std::process;
use std::{fmt, fs};

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use fundpool::account::Address;
use fundpool::ledger::{ContributionLedger, LedgerSnapshot, Wallet};
use fundpool::oracle::{Amount, FixedPriceFeed, NATIVE_DECIMALS, RATE_DECIMALS};

#[derive(Parser)]
#[command(name = "fundpool", version, about = "Pooled funds-custody ledger simulator")]
struct Cli {
    /// JSON state file holding the ledger and the owner's wallet.
    #[arg(long, global = true, default_value = "fundpool.json")]
    state: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a fresh ledger state file.
    Init {
        /// Owner identity: 40-hex address or a label to derive one from.
        #[arg(long)]
        owner: String,
        /// Exchange rate, in whole reference units per native unit.
        #[arg(long)]
        rate: u128,
        /// Contribution minimum, in whole reference units.
        #[arg(long, default_value_t = 50)]
        minimum: u128,
        /// Identity of the price feed collaborator.
        #[arg(long, default_value = "price-feed")]
        feed: String,
    },
    /// Contribute native value to the pool.
    Fund {
        /// Contributor identity: address or label.
        #[arg(long)]
        from: String,
        /// Amount in native units, decimals allowed (e.g. 1.5 or 0.025).
        #[arg(long)]
        amount: String,
    },
    /// Pay the whole pool out to the owner's wallet.
    Withdraw {
        /// Caller identity; only the owner succeeds.
        #[arg(long)]
        caller: String,
        /// Use the detach-in-one-move reset instead of the per-funder scan.
        #[arg(long)]
        cheaper: bool,
    },
    /// Print a contributor's cumulative balance.
    Balance {
        #[arg(long)]
        of: String,
    },
    /// List funders in first-contribution order.
    Funders,
    /// Dump the full state file.
    Show,
    /// Print a fresh random address.
    Keygen,
}

/// Everything the CLI persists between invocations.
#[derive(Serialize, Deserialize)]
struct StateFile {
    ledger: LedgerSnapshot,
    owner_wallet: Wallet,
}

#[derive(Debug)]
struct CliError(String);

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for CliError {}

fn err(msg: impl Into<String>) -> Box<dyn std::error::Error> {
    Box::new(CliError(msg.into()))
}

/// Accept either a literal hex address or a label to derive one from.
fn resolve_identity(s: &str) -> Address {
    s.parse().unwrap_or_else(|_| Address::derive(s))
}

/// Parse a decimal native amount ("1", "1.5", "0.025") into minor units.
fn parse_native_amount(s: &str) -> Result<Amount, String> {
    let s = s.trim();
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err("empty amount".into());
    }
    if frac.len() > NATIVE_DECIMALS as usize {
        return Err(format!(
            "too many decimal places ({}, max {})",
            frac.len(),
            NATIVE_DECIMALS
        ));
    }
    let whole: Amount = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| format!("invalid amount: {s}"))?
    };
    let frac_minor: Amount = if frac.is_empty() {
        0
    } else {
        let parsed: Amount = frac.parse().map_err(|_| format!("invalid amount: {s}"))?;
        parsed * 10u128.pow(NATIVE_DECIMALS - frac.len() as u32)
    };
    whole
        .checked_mul(10u128.pow(NATIVE_DECIMALS))
        .and_then(|w| w.checked_add(frac_minor))
        .ok_or_else(|| format!("amount out of range: {s}"))
}

/// Render minor units back as a decimal native amount.
fn format_native_amount(minor: Amount) -> String {
    let scale = 10u128.pow(NATIVE_DECIMALS);
    let whole = minor / scale;
    let frac = minor % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:0>width$}", width = NATIVE_DECIMALS as usize);
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

fn load_state(path: &Path) -> Result<StateFile, Box<dyn std::error::Error>> {
    let bytes = fs::read(path)
        .map_err(|e| err(format!("cannot read state file {}: {e}", path.display())))?;
    let state = serde_json::from_slice(&bytes)
        .map_err(|e| err(format!("corrupt state file {}: {e}", path.display())))?;
    Ok(state)
}

fn save_state(path: &Path, state: &StateFile) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(state)?;
    fs::write(path, json)
        .map_err(|e| err(format!("cannot write state file {}: {e}", path.display())))?;
    Ok(())
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Init {
            owner,
            rate,
            minimum,
            feed,
        } => {
            let owner = resolve_identity(&owner);
            let rate_scaled = rate
                .checked_mul(10u128.pow(RATE_DECIMALS))
                .ok_or_else(|| err("rate out of range"))?;
            let minimum_scaled = minimum
                .checked_mul(10u128.pow(NATIVE_DECIMALS))
                .ok_or_else(|| err("minimum out of range"))?;
            let ledger = ContributionLedger::with_minimum(
                owner,
                FixedPriceFeed::new(resolve_identity(&feed), rate_scaled),
                minimum_scaled,
            );
            let state = StateFile {
                ledger: ledger.snapshot(),
                owner_wallet: Wallet::default(),
            };
            save_state(&cli.state, &state)?;
            println!("initialized ledger at {}", cli.state.display());
            println!("owner    {owner}");
            println!("feed     {}", ledger.price_feed_address());
            println!("rate     {rate} reference/native");
            println!("minimum  {minimum} reference units");
        }
        Command::Fund { from, amount } => {
            let mut state = load_state(&cli.state)?;
            let contributor = resolve_identity(&from);
            let amount = parse_native_amount(&amount).map_err(err)?;
            let mut ledger = ContributionLedger::restore(state.ledger);
            ledger.fund(contributor, amount)?;
            println!(
                "funded {} native from {contributor}; pool now {}",
                format_native_amount(amount),
                format_native_amount(ledger.pooled())
            );
            state.ledger = ledger.snapshot();
            save_state(&cli.state, &state)?;
        }
        Command::Withdraw { caller, cheaper } => {
            let mut state = load_state(&cli.state)?;
            let caller = resolve_identity(&caller);
            let mut ledger = ContributionLedger::restore(state.ledger);
            let mut wallet = state.owner_wallet;
            let total = if cheaper {
                ledger.cheaper_withdraw(caller, &mut wallet)?
            } else {
                ledger.withdraw(caller, &mut wallet)?
            };
            println!(
                "withdrew {} native; owner wallet holds {}",
                format_native_amount(total),
                format_native_amount(wallet.balance)
            );
            state.ledger = ledger.snapshot();
            state.owner_wallet = wallet;
            save_state(&cli.state, &state)?;
        }
        Command::Balance { of } => {
            let state = load_state(&cli.state)?;
            let contributor = resolve_identity(&of);
            let ledger = ContributionLedger::restore(state.ledger);
            println!(
                "{contributor}  {}",
                format_native_amount(ledger.balance_of(contributor))
            );
        }
        Command::Funders => {
            let state = load_state(&cli.state)?;
            let ledger = ContributionLedger::restore(state.ledger);
            for (i, funder) in ledger.funders().iter().enumerate() {
                println!(
                    "{i:3}  {funder}  {}",
                    format_native_amount(ledger.balance_of(*funder))
                );
            }
            println!("pool total: {}", format_native_amount(ledger.pooled()));
        }
        Command::Show => {
            let state = load_state(&cli.state)?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Command::Keygen => {
            println!("{}", Address::random());
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
