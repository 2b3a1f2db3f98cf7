//! # Swap Simulation
//!
//! Runs one complete trade between two generated wallets. Both clients talk
//! over an in-process [`MemoryHub`] and settle on an [`EscrowLedger`], so the
//! run exercises the same code paths a browser pair would: pairing, pool
//! exchange, slot edits, mutual acceptance and escrow settlement.
//!
//! Wallet A always proposes the board, which makes A the initializer.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use swap_contracts::{EscrowLedger, LedgerCall, ProgramOp};
use swap_protocol::escrow::{pda, RpcError};
use swap_protocol::identity::{Pubkey, WalletKeypair};
use swap_protocol::settlement::{SettlementOp, SettlementStep};
use swap_protocol::{
    AssetRef, MemoryHub, PeerIdentity, SwapClient, SwapConfig, SwapHandle, TradePhase, TradeSlots,
    TradeView,
};

use crate::cli::{Outcome, SimulateArgs};
use crate::metrics::SwapMetrics;

/// What the simulation prints to stdout.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub topic: String,
    pub outcome: Outcome,
    pub program_id: String,
    pub escrow_address: Option<String>,
    pub initializer: WalletReport,
    pub taker: WalletReport,
    pub ledger_calls: Vec<LedgerCall>,
    pub open_escrows: usize,
    pub messages_published: u64,
}

#[derive(Debug, Serialize)]
pub struct WalletReport {
    pub address: String,
    pub phase: TradePhase,
    pub settlement: SettlementStep,
    /// Mints the wallet holds after the run.
    pub holdings: Vec<String>,
}

struct Wallet {
    label: &'static str,
    key: Pubkey,
    handle: SwapHandle,
    task: JoinHandle<()>,
    forwarder: JoinHandle<()>,
}

impl Wallet {
    fn spawn(
        label: &'static str,
        config: &SwapConfig,
        hub: &Arc<MemoryHub>,
        ledger: &Arc<EscrowLedger>,
        metrics: &SwapMetrics,
    ) -> Result<Self> {
        let key = WalletKeypair::generate().pubkey();
        let (handle, task) = SwapClient::spawn(
            config.clone(),
            PeerIdentity::from(key),
            Arc::new(hub.transport()),
            Arc::new(ledger.client(key)),
        )
        .with_context(|| format!("failed to start wallet {label}"))?;

        let mut events = handle.subscribe();
        let metrics = metrics.clone();
        let forwarder = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        metrics.observe(label, &event);
                        debug!(peer = label, ?event, "swap event");
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(peer = label, missed, "event stream lagged")
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        info!(peer = label, wallet = %key, "wallet ready");
        Ok(Self {
            label,
            key,
            handle,
            task,
            forwarder,
        })
    }

    async fn wait_for(
        &self,
        what: &str,
        timeout: Duration,
        cond: impl Fn(&TradeView) -> bool,
    ) -> Result<TradeView> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let view = self.handle.view().await?;
            if cond(&view) {
                debug!(peer = self.label, what, "reached");
                return Ok(view);
            }
            if tokio::time::Instant::now() >= deadline {
                bail!(
                    "wallet {} timed out waiting for {what} (phase {}, settlement {})",
                    self.label,
                    view.phase,
                    view.settlement
                );
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    async fn stop(self) {
        self.handle.shutdown().await;
        if let Err(e) = self.task.await {
            warn!(peer = self.label, error = %e, "client task ended abnormally");
        }
        self.forwarder.abort();
    }
}

/// Reads a [`SwapConfig`] from a JSON file, or returns the defaults.
pub fn load_config(path: Option<&Path>) -> Result<SwapConfig> {
    let Some(path) = path else {
        return Ok(SwapConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

/// Runs the simulation described by `args`.
pub async fn run(args: &SimulateArgs, metrics: &SwapMetrics) -> Result<SimulationReport> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(secs) = args.escrow_timeout_secs {
        config.escrow_timeout_secs = secs;
    }
    if let Some(program_id) = &args.program_id {
        config.program_id = program_id.clone();
    }
    config.validate().context("invalid swap configuration")?;
    let program_id: Pubkey = config
        .program_id
        .parse()
        .context("invalid escrow program id")?;

    let step = Duration::from_secs(args.step_timeout_secs);
    let ledger = EscrowLedger::new(program_id);
    let hub = MemoryHub::new();
    hub.set_duplicate_delivery(args.duplicate_delivery);

    info!(
        topic = %args.topic,
        outcome = ?args.outcome,
        duplicate_delivery = args.duplicate_delivery,
        "starting swap simulation"
    );

    let a = Wallet::spawn("a", &config, &hub, &ledger, metrics)?;
    let b = Wallet::spawn("b", &config, &hub, &ledger, metrics)?;

    let gives: Vec<AssetRef> = (1..=args.initializer_nfts)
        .map(|i| ledger.mint_nft(&a.key, &format!("A-{i}")))
        .collect();
    let takes: Vec<AssetRef> = (1..=args.taker_nfts)
        .map(|i| ledger.mint_nft(&b.key, &format!("B-{i}")))
        .collect();

    let result = negotiate_and_settle(args, step, &ledger, &a, &b, &gives, &takes).await;

    let report = match result {
        Ok(()) => build_report(args, &config, &ledger, &hub, &a, &b).await,
        Err(e) => Err(e),
    };
    if let Ok(report) = &report {
        metrics.messages_published_total.inc_by(report.messages_published);
    }

    a.stop().await;
    b.stop().await;
    report
}

async fn negotiate_and_settle(
    args: &SimulateArgs,
    step: Duration,
    ledger: &Arc<EscrowLedger>,
    a: &Wallet,
    b: &Wallet,
    gives: &[AssetRef],
    takes: &[AssetRef],
) -> Result<()> {
    a.handle.join(args.topic.as_str()).await?;
    b.handle.join(args.topic.as_str()).await?;
    a.wait_for("partner", step, |v| v.partner.is_some()).await?;
    b.wait_for("partner", step, |v| v.partner.is_some()).await?;

    a.handle.select_nfts(gives.to_vec()).await?;
    b.handle.select_nfts(takes.to_vec()).await?;
    let wanted = takes.len();
    a.wait_for("partner pool", step, |v| {
        v.partner.as_ref().map(|p| p.selected_nfts.len()) == Some(wanted)
    })
    .await?;

    let board = TradeSlots::from_assets(gives, takes)?;
    a.handle.set_slots(board.clone()).await?;
    let mirrored = board.inverted();
    b.wait_for("mirrored board", step, |v| v.slots == mirrored).await?;

    if args.outcome != Outcome::Settle {
        // The taker's only transaction carrying a complete is its deposit
        // bundle.
        ledger.fail_next(
            ProgramOp::Complete,
            RpcError::Transport("simulated ledger outage".into()),
        );
    }

    a.handle.accept().await?;
    b.wait_for("initializer acceptance", step, |v| v.acceptance.remote_accepted)
        .await?;
    b.handle.accept().await?;

    match args.outcome {
        Outcome::Settle => {}
        Outcome::RetryDeposit => {
            b.wait_for("failed deposit", step, |v| {
                v.settlement == SettlementStep::Failed(SettlementOp::Deposit)
            })
            .await?;
            info!("retrying the taker deposit");
            b.handle.retry_settlement().await?;
        }
        Outcome::Cancel => {
            b.wait_for("failed deposit", step, |v| {
                v.settlement == SettlementStep::Failed(SettlementOp::Deposit)
            })
            .await?;
            info!("initializer cancels the escrow");
            a.handle.cancel_escrow().await?;
            a.wait_for("cancelled", step, |v| v.settlement == SettlementStep::Cancelled)
                .await?;
            b.wait_for("round reset", step, |v| v.phase == TradePhase::Idle)
                .await?;
            return Ok(());
        }
    }

    a.wait_for("settled", step, |v| v.settlement == SettlementStep::Settled)
        .await?;
    b.wait_for("settled", step, |v| v.settlement == SettlementStep::Settled)
        .await?;
    Ok(())
}

async fn build_report(
    args: &SimulateArgs,
    config: &SwapConfig,
    ledger: &Arc<EscrowLedger>,
    hub: &Arc<MemoryHub>,
    a: &Wallet,
    b: &Wallet,
) -> Result<SimulationReport> {
    let escrow_address = pda::escrow_address(&ledger.program_id(), &a.key, &b.key)
        .map(|(address, _)| address.to_string());

    let mut wallets = Vec::with_capacity(2);
    for wallet in [a, b] {
        let view = wallet.handle.view().await?;
        wallets.push(WalletReport {
            address: wallet.key.to_string(),
            phase: view.phase,
            settlement: view.settlement,
            holdings: ledger
                .holdings(&wallet.key)
                .iter()
                .map(ToString::to_string)
                .collect(),
        });
    }
    let taker = wallets.pop().context("missing taker report")?;
    let initializer = wallets.pop().context("missing initializer report")?;

    Ok(SimulationReport {
        topic: args.topic.clone(),
        outcome: args.outcome,
        program_id: config.program_id.clone(),
        escrow_address,
        initializer,
        taker,
        ledger_calls: ledger.calls(),
        open_escrows: ledger.open_escrows(),
        messages_published: hub.published(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Commands, SwapNodeCli};
    use clap::Parser;

    fn args(extra: &[&str]) -> SimulateArgs {
        let mut argv = vec!["swap-node", "simulate", "--step-timeout-secs", "5"];
        argv.extend_from_slice(extra);
        match SwapNodeCli::parse_from(argv).command {
            Commands::Simulate(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    fn holds(report: &WalletReport, count: usize) {
        assert_eq!(report.holdings.len(), count, "{report:?}");
    }

    #[tokio::test]
    async fn settles_and_swaps_ownership() {
        let metrics = SwapMetrics::new().unwrap();
        let report = run(&args(&["--taker-nfts", "3"]), &metrics).await.unwrap();

        assert_eq!(report.initializer.settlement, SettlementStep::Settled);
        assert_eq!(report.taker.settlement, SettlementStep::Settled);
        holds(&report.initializer, 3);
        holds(&report.taker, 1);
        assert_eq!(report.open_escrows, 0);
        assert!(report.ledger_calls.iter().all(LedgerCall::succeeded));
        assert!(report.messages_published > 0);
        assert_eq!(metrics.messages_published_total.get(), report.messages_published);
    }

    #[tokio::test]
    async fn retried_deposit_still_settles() {
        let metrics = SwapMetrics::new().unwrap();
        let report = run(&args(&["--outcome", "retry-deposit", "--duplicate-delivery"]), &metrics)
            .await
            .unwrap();

        assert_eq!(report.taker.settlement, SettlementStep::Settled);
        assert_eq!(report.ledger_calls.iter().filter(|c| !c.succeeded()).count(), 1);
        holds(&report.initializer, 2);
    }

    #[tokio::test]
    async fn cancel_returns_everything() {
        let metrics = SwapMetrics::new().unwrap();
        let report = run(&args(&["--outcome", "cancel"]), &metrics).await.unwrap();

        assert_eq!(report.initializer.phase, TradePhase::Idle);
        assert_eq!(report.taker.settlement, SettlementStep::Cancelled);
        holds(&report.initializer, 1);
        holds(&report.taker, 2);
        assert_eq!(report.open_escrows, 0);
    }

    #[tokio::test]
    async fn bad_timeout_is_rejected() {
        let metrics = SwapMetrics::new().unwrap();
        let err = run(&args(&["--escrow-timeout-secs", "0"]), &metrics)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid swap configuration"));
    }
}
