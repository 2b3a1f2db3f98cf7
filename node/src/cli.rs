//! # CLI Interface
//!
//! Defines the command-line argument structure for `swap-node` using
//! `clap` derive. Supports four subcommands: `simulate`, `pda`, `decode`,
//! and `version`.

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;

use crate::logging::LogFormat;

/// NFT swap coordinator node.
///
/// Runs two swap clients against an in-process channel and escrow ledger,
/// and offers offline tools for escrow addresses and account data.
#[derive(Parser, Debug)]
#[command(
    name = "swap-node",
    about = "Two-party NFT swap coordinator",
    version,
    propagate_version = true
)]
pub struct SwapNodeCli {
    /// Log output format.
    #[arg(long, global = true, value_enum, env = "SWAP_LOG_FORMAT", default_value_t = LogFormatArg::Pretty)]
    pub log_format: LogFormatArg,

    /// Default log filter when `RUST_LOG` is not set.
    #[arg(long, global = true, env = "SWAP_LOG_LEVEL", default_value = "swap_node=info,swap_protocol=info,swap_contracts=info")]
    pub log_level: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// `--log-format` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a complete swap between two simulated wallets.
    Simulate(SimulateArgs),
    /// Derive the escrow address for an initializer/taker pair.
    Pda(PdaArgs),
    /// Decode raw escrow account data.
    Decode(DecodeArgs),
    /// Print version information and exit.
    Version,
}

/// How the simulated round ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// Both sides settle.
    Settle,
    /// The taker's first deposit fails and is retried.
    RetryDeposit,
    /// The taker's deposit fails and the initializer cancels.
    Cancel,
}

/// Arguments for the `simulate` subcommand.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// JSON file with a `SwapConfig`. Flags below override its fields.
    #[arg(long, short = 'c', env = "SWAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Channel topic both wallets join.
    #[arg(long, env = "SWAP_TOPIC", default_value = "swap-demo")]
    pub topic: String,

    /// NFTs the initializer gives (1 to 3).
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=3))]
    pub initializer_nfts: u8,

    /// NFTs the taker gives (1 to 3).
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(1..=3))]
    pub taker_nfts: u8,

    /// How the round ends.
    #[arg(long, value_enum, default_value_t = Outcome::Settle)]
    pub outcome: Outcome,

    /// Deliver every channel message twice.
    #[arg(long)]
    pub duplicate_delivery: bool,

    /// Escrow timeout in seconds.
    #[arg(long, env = "SWAP_ESCROW_TIMEOUT_SECS")]
    pub escrow_timeout_secs: Option<i64>,

    /// Escrow program id (base58).
    #[arg(long, env = "SWAP_PROGRAM_ID")]
    pub program_id: Option<String>,

    /// Seconds to wait for each step before giving up.
    #[arg(long, default_value_t = 10)]
    pub step_timeout_secs: u64,

    /// Print Prometheus metrics after the run.
    #[arg(long)]
    pub metrics: bool,
}

/// Arguments for the `pda` subcommand.
#[derive(Args, Debug)]
pub struct PdaArgs {
    /// Initializer wallet (base58).
    #[arg(long)]
    pub initializer: String,

    /// Taker wallet (base58).
    #[arg(long)]
    pub taker: String,

    /// Escrow program id (base58). Defaults to the deployed program.
    #[arg(long, env = "SWAP_PROGRAM_ID")]
    pub program_id: Option<String>,

    /// Also print the vault token account for these mints.
    #[arg(long = "mint")]
    pub mints: Vec<String>,
}

/// Arguments for the `decode` subcommand.
#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Account data as hex.
    #[arg(long, required_unless_present = "file", conflicts_with = "file")]
    pub hex: Option<String>,

    /// File holding the raw account bytes.
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Escrow address to show in the output (base58).
    #[arg(long)]
    pub address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        SwapNodeCli::command().debug_assert();
    }

    #[test]
    fn simulate_defaults() {
        let cli = SwapNodeCli::parse_from(["swap-node", "simulate"]);
        match cli.command {
            Commands::Simulate(args) => {
                assert_eq!(args.initializer_nfts, 1);
                assert_eq!(args.taker_nfts, 2);
                assert_eq!(args.outcome, Outcome::Settle);
                assert!(!args.metrics);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn asset_counts_are_bounded() {
        let result = SwapNodeCli::try_parse_from(["swap-node", "simulate", "--taker-nfts", "4"]);
        assert!(result.is_err());
    }

    #[test]
    fn decode_needs_exactly_one_source() {
        assert!(SwapNodeCli::try_parse_from(["swap-node", "decode"]).is_err());
        assert!(SwapNodeCli::try_parse_from([
            "swap-node", "decode", "--hex", "00", "--file", "account.bin"
        ])
        .is_err());
        assert!(SwapNodeCli::try_parse_from(["swap-node", "decode", "--file", "account.bin"]).is_ok());
    }
}
