// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Swap Node
//!
//! Entry point for the `swap-node` binary. Parses CLI arguments, initializes
//! logging and metrics, and dispatches to a subcommand:
//!
//! - `simulate` runs a full two-wallet swap in process
//! - `pda` derives escrow and vault addresses
//! - `decode` prints a raw escrow account as JSON
//! - `version` prints build version information

mod cli;
mod logging;
mod metrics;
mod simulate;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tokio::signal;

use swap_protocol::escrow::{pda, EscrowAccountData, EscrowAccountSnapshot};
use swap_protocol::identity::Pubkey;

use cli::{Commands, SwapNodeCli};
use metrics::SwapMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = SwapNodeCli::parse();

    match cli.command {
        Commands::Version => {
            print_version();
            Ok(())
        }
        command => {
            logging::init_logging(&cli.log_level, cli.log_format.into());
            match command {
                Commands::Simulate(args) => run_simulation(args).await,
                Commands::Pda(args) => derive_addresses(args),
                Commands::Decode(args) => decode_account(args),
                Commands::Version => Ok(()),
            }
        }
    }
}

/// Runs the two-wallet simulation and prints its report.
async fn run_simulation(args: cli::SimulateArgs) -> Result<()> {
    let metrics = SwapMetrics::new().context("failed to create metrics registry")?;

    let report = tokio::select! {
        report = simulate::run(&args, &metrics) => report?,
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, abandoning simulation");
            return Ok(());
        }
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to serialize report")?
    );
    if args.metrics {
        print!("{}", metrics.encode().context("failed to encode metrics")?);
    }
    tracing::info!(
        initializer = %report.initializer.settlement,
        taker = %report.taker.settlement,
        "simulation finished"
    );
    Ok(())
}

fn parse_key(what: &str, value: &str) -> Result<Pubkey> {
    value
        .parse()
        .with_context(|| format!("invalid {what} address: {value}"))
}

fn program_id(value: Option<&str>) -> Result<Pubkey> {
    parse_key(
        "program",
        value.unwrap_or(swap_protocol::config::DEFAULT_ESCROW_PROGRAM_ID),
    )
}

/// Prints the escrow address of a pair and, optionally, its vault accounts.
fn derive_addresses(args: cli::PdaArgs) -> Result<()> {
    let program_id = program_id(args.program_id.as_deref())?;
    let initializer = parse_key("initializer", &args.initializer)?;
    let taker = parse_key("taker", &args.taker)?;

    let (escrow, bump) = pda::escrow_address(&program_id, &initializer, &taker)
        .context("no escrow address exists for this pair")?;

    let mut vaults = Vec::with_capacity(args.mints.len());
    for mint in &args.mints {
        let mint = parse_key("mint", mint)?;
        let vault = pda::associated_token_address(&escrow, &mint)
            .with_context(|| format!("no vault address for mint {mint}"))?;
        vaults.push(json!({ "mint": mint.to_string(), "vault": vault.to_string() }));
    }

    let out = json!({
        "program_id": program_id.to_string(),
        "initializer": initializer.to_string(),
        "taker": taker.to_string(),
        "escrow": escrow.to_string(),
        "bump": bump,
        "vaults": vaults,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// Decodes escrow account bytes and prints the snapshot.
fn decode_account(args: cli::DecodeArgs) -> Result<()> {
    let bytes = match (&args.hex, &args.file) {
        (Some(text), _) => {
            let text = text.trim();
            hex::decode(text.strip_prefix("0x").unwrap_or(text))
                .context("account data is not valid hex")?
        }
        (None, Some(path)) => std::fs::read(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => anyhow::bail!("pass --hex or --file"),
    };

    let address = match &args.address {
        Some(address) => parse_key("escrow", address)?,
        None => Pubkey::ZERO,
    };
    let data = EscrowAccountData::decode(&bytes).context("failed to decode escrow account")?;
    let snapshot = EscrowAccountSnapshot::from_account(address, &data);
    tracing::debug!(len = bytes.len(), %address, "decoded escrow account");

    let out = json!({
        "snapshot": snapshot,
        "expires_at": snapshot.expires_at_utc().map(|t| t.to_rfc3339()),
        "fully_funded": snapshot.fully_funded(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("swap-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol  {}", swap_protocol::config::PROTOCOL_VERSION);
    println!("rustc     {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed the corresponding branch never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
