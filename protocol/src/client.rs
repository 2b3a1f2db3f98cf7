//! # Swap Client
//!
//! The driver that owns a [`TradeSession`] and a [`SettlementOrchestrator`]
//! and connects them to the outside world. It runs as a single task:
//!
//! ```text
//!            commands (mpsc)          frames (transport)       job outcomes (mpsc)
//!                 │                         │                         │
//!                 └────────────┬────────────┴────────────┬────────────┘
//!                              ▼                         │
//!                  session / orchestrator  ──Dispatch──▶ tokio::spawn(job.run)
//!                              │
//!                    publish ◀─┴─▶ SwapEvent (broadcast)
//! ```
//!
//! All state is mutated on this one task. Escrow calls run on their own
//! tasks with owned copies of what they need, so a slow wallet prompt never
//! blocks message handling, and their results come back through the
//! outcome queue.
//!
//! Local edits are applied to a copy of the session; the copy replaces the
//! live session only after its messages were published, so a failed publish
//! leaves no half-applied edit behind.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::{SelectAll, StreamExt};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{ChannelFrame, ChannelTransport, Subscription};
use crate::config::{SwapConfig, ALL_EVENTS, JOB_OUTCOME_CAPACITY};
use crate::error::{Result, SwapError};
use crate::escrow::EscrowRpcClient;
use crate::events::SwapEvent;
use crate::identity::PeerIdentity;
use crate::settlement::{
    EscrowAgreement, JobOutcome, OrchestratorAction, SettlementError, SettlementJob,
    SettlementOrchestrator, SettlementStep,
};
use crate::sync::{SwapMessage, SyncAction, SyncError, TradePhase, TradeSession};
use crate::trade::{AcceptanceState, AssetRef, SlotSide, SwapPartner, TradeSlots};

// ---------------------------------------------------------------------------
// Public Handle
// ---------------------------------------------------------------------------

/// Read-only snapshot of the client state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeView {
    pub local: PeerIdentity,
    pub topic: Option<String>,
    pub phase: TradePhase,
    pub partner: Option<SwapPartner>,
    pub selection: Vec<AssetRef>,
    pub slots: TradeSlots,
    pub acceptance: AcceptanceState,
    pub agreement: Option<EscrowAgreement>,
    pub settlement: SettlementStep,
    pub escrow_expires_at: Option<i64>,
}

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    Join { topic: String, reply: Reply<()> },
    Leave { reply: Reply<()> },
    SelectNfts { assets: Vec<AssetRef>, reply: Reply<()> },
    AssignSlot { side: SlotSide, index: usize, asset: AssetRef, reply: Reply<()> },
    ClearSlot { side: SlotSide, index: usize, reply: Reply<()> },
    SetSlots { slots: TradeSlots, reply: Reply<()> },
    Accept { reply: Reply<()> },
    WithdrawAccept { reply: Reply<()> },
    CancelEscrow { reply: Reply<()> },
    RetrySettlement { reply: Reply<()> },
    View { reply: oneshot::Sender<TradeView> },
    Shutdown,
}

/// Cloneable handle to a running [`SwapClient`].
#[derive(Clone)]
pub struct SwapHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SwapEvent>,
}

impl SwapHandle {
    /// UI event stream. Slow receivers lag instead of blocking the client.
    pub fn subscribe(&self) -> broadcast::Receiver<SwapEvent> {
        self.events.subscribe()
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| SwapError::ClientStopped)?;
        rx.await.map_err(|_| SwapError::ClientStopped)?
    }

    /// Subscribes to `topic` and announces the wallet on it.
    pub async fn join(&self, topic: impl Into<String>) -> Result<()> {
        let topic = topic.into();
        self.request(|reply| Command::Join { topic, reply }).await
    }

    pub async fn leave(&self) -> Result<()> {
        self.request(|reply| Command::Leave { reply }).await
    }

    /// Replaces the pool of NFTs this wallet offers.
    pub async fn select_nfts(&self, assets: Vec<AssetRef>) -> Result<()> {
        self.request(|reply| Command::SelectNfts { assets, reply }).await
    }

    pub async fn assign_slot(&self, side: SlotSide, index: usize, asset: AssetRef) -> Result<()> {
        self.request(|reply| Command::AssignSlot {
            side,
            index,
            asset,
            reply,
        })
        .await
    }

    pub async fn clear_slot(&self, side: SlotSide, index: usize) -> Result<()> {
        self.request(|reply| Command::ClearSlot { side, index, reply })
            .await
    }

    pub async fn set_slots(&self, slots: TradeSlots) -> Result<()> {
        self.request(|reply| Command::SetSlots { slots, reply }).await
    }

    pub async fn accept(&self) -> Result<()> {
        self.request(|reply| Command::Accept { reply }).await
    }

    pub async fn withdraw_accept(&self) -> Result<()> {
        self.request(|reply| Command::WithdrawAccept { reply }).await
    }

    /// Cancels the escrow. Only the initializer may do this.
    pub async fn cancel_escrow(&self) -> Result<()> {
        self.request(|reply| Command::CancelEscrow { reply }).await
    }

    /// Re-runs a failed settlement step, or re-sends a settlement notice
    /// that could not be published.
    pub async fn retry_settlement(&self) -> Result<()> {
        self.request(|reply| Command::RetrySettlement { reply }).await
    }

    pub async fn view(&self) -> Result<TradeView> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::View { reply: tx })
            .await
            .map_err(|_| SwapError::ClientStopped)?;
        rx.await.map_err(|_| SwapError::ClientStopped)
    }

    /// Leaves the channel and stops the client task.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

struct ActiveChannel {
    topic: String,
    inbound: SelectAll<Subscription>,
}

enum Work {
    Sync(SyncAction),
    Settle(OrchestratorAction),
}

/// The client task. Create it with [`SwapClient::spawn`].
pub struct SwapClient {
    transport: Arc<dyn ChannelTransport>,
    escrow: Arc<dyn EscrowRpcClient>,
    session: TradeSession,
    orchestrator: SettlementOrchestrator,
    channel: Option<ActiveChannel>,
    events: broadcast::Sender<SwapEvent>,
    outcome_tx: mpsc::Sender<JobOutcome>,
    outcome_rx: mpsc::Receiver<JobOutcome>,
    /// Settlement notice whose publish failed; re-sent on retry.
    pending_notice: Option<SwapMessage>,
}

impl SwapClient {
    /// Validates `config`, starts the client task and returns its handle.
    pub fn spawn(
        config: SwapConfig,
        wallet: PeerIdentity,
        transport: Arc<dyn ChannelTransport>,
        escrow: Arc<dyn EscrowRpcClient>,
    ) -> Result<(SwapHandle, JoinHandle<()>)> {
        config.validate()?;
        if wallet.is_empty() {
            return Err(SyncError::NoWallet.into());
        }

        let (command_tx, command_rx) = mpsc::channel(config.command_capacity);
        let (events, _) = broadcast::channel(config.event_capacity);
        let (outcome_tx, outcome_rx) = mpsc::channel(JOB_OUTCOME_CAPACITY);

        let client = SwapClient {
            transport,
            escrow,
            session: TradeSession::new(wallet.clone(), config.escrow_timeout_secs),
            orchestrator: SettlementOrchestrator::new(wallet, config.verify_before_initialize),
            channel: None,
            events: events.clone(),
            outcome_tx,
            outcome_rx,
            pending_notice: None,
        };
        let handle = SwapHandle {
            commands: command_tx,
            events,
        };
        let task = tokio::spawn(client.run(command_rx));
        Ok((handle, task))
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!(wallet = %self.session.local().short(), "swap client started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                frame = next_frame(&mut self.channel) => match frame {
                    Some(frame) => self.handle_frame(frame).await,
                    None => {
                        warn!("trade channel closed");
                        self.channel = None;
                        self.channel_closed().await;
                    }
                },
                Some(outcome) = self.outcome_rx.recv() => self.handle_outcome(outcome).await,
            }
        }
        self.leave().await;
        info!(wallet = %self.session.local().short(), "swap client stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Join { topic, reply } => {
                let _ = reply.send(self.join(topic).await);
            }
            Command::Leave { reply } => {
                self.leave().await;
                let _ = reply.send(Ok(()));
            }
            Command::SelectNfts { assets, reply } => {
                let _ = reply.send(self.apply_local(|s| s.select_nfts(assets)).await);
            }
            Command::AssignSlot {
                side,
                index,
                asset,
                reply,
            } => {
                let _ = reply.send(self.apply_local(|s| s.assign_slot(side, index, asset)).await);
            }
            Command::ClearSlot { side, index, reply } => {
                let _ = reply.send(self.apply_local(|s| s.clear_slot(side, index)).await);
            }
            Command::SetSlots { slots, reply } => {
                let _ = reply.send(self.apply_local(|s| s.set_slots(slots)).await);
            }
            Command::Accept { reply } => {
                let _ = reply.send(self.apply_local(|s| s.accept()).await);
            }
            Command::WithdrawAccept { reply } => {
                let _ = reply.send(self.apply_local(|s| s.withdraw_accept()).await);
            }
            Command::CancelEscrow { reply } => {
                let result = match self.orchestrator.request_cancel() {
                    Ok(actions) => {
                        self.drain(actions.into_iter().map(Work::Settle)).await;
                        Ok(())
                    }
                    Err(e) => Err(e.into()),
                };
                let _ = reply.send(result);
            }
            Command::RetrySettlement { reply } => {
                let _ = reply.send(self.retry().await);
            }
            Command::View { reply } => {
                let _ = reply.send(self.view());
            }
            Command::Shutdown => {}
        }
    }

    // -----------------------------------------------------------------------
    // Channel
    // -----------------------------------------------------------------------

    async fn join(&mut self, topic: String) -> Result<()> {
        if let Some(active) = &self.channel {
            if active.topic == topic {
                return Ok(());
            }
            self.leave().await;
        }

        let mut streams = Vec::with_capacity(ALL_EVENTS.len());
        for event in ALL_EVENTS {
            match self.transport.subscribe(&topic, event).await {
                Ok(stream) => streams.push(stream),
                Err(e) => {
                    for done in ALL_EVENTS.iter().take(streams.len()) {
                        let _ = self.transport.unsubscribe(&topic, done).await;
                    }
                    return Err(e.into());
                }
            }
        }
        self.channel = Some(ActiveChannel {
            topic: topic.clone(),
            inbound: futures::stream::select_all(streams),
        });
        info!(%topic, "joined trade channel");
        self.emit(SwapEvent::Connection {
            topic: Some(topic),
            connected: true,
        });
        self.apply_local(|s| s.announce()).await
    }

    async fn leave(&mut self) {
        let Some(active) = self.channel.take() else {
            return;
        };
        for event in ALL_EVENTS {
            if let Err(e) = self.transport.unsubscribe(&active.topic, event).await {
                debug!(event, error = %e, "unsubscribe failed");
            }
        }
        info!(topic = %active.topic, "left trade channel");
        self.channel_closed().await;
    }

    async fn channel_closed(&mut self) {
        self.orchestrator.reset();
        self.pending_notice = None;
        let actions = self.session.channel_lost();
        self.drain(actions.into_iter().map(Work::Sync)).await;
        self.emit(SwapEvent::Connection {
            topic: None,
            connected: false,
        });
    }

    async fn handle_frame(&mut self, frame: ChannelFrame) {
        match SwapMessage::decode(&frame.event, frame.payload) {
            Ok(msg) => {
                let actions = self.session.handle(msg);
                self.drain(actions.into_iter().map(Work::Sync)).await;
            }
            Err(e) => warn!(event = %frame.event, error = %e, "dropping undecodable frame"),
        }
    }

    async fn publish(&mut self, msg: &SwapMessage) -> Result<()> {
        let topic = self
            .channel
            .as_ref()
            .map(|c| c.topic.clone())
            .ok_or(SwapError::NotJoined)?;
        let (event, payload) = msg.encode()?;
        self.transport.publish(&topic, event, payload).await?;
        debug!(event, "published");
        Ok(())
    }

    /// Publishes a message that follows an already committed state change.
    async fn publish_best_effort(&mut self, msg: SwapMessage) {
        if let Err(e) = self.publish(&msg).await {
            warn!(event = msg.event(), error = %e, "publish failed");
            self.emit(SwapEvent::error(format!("could not send {}: {}", msg.event(), e)));
            if matches!(
                msg,
                SwapMessage::EscrowInitialized { .. }
                    | SwapMessage::EscrowDeposited { .. }
                    | SwapMessage::EscrowCancelled { .. }
            ) {
                self.pending_notice = Some(msg);
            }
        }
    }

    // -----------------------------------------------------------------------
    // State transitions
    // -----------------------------------------------------------------------

    /// Runs a local session operation on a copy, publishes its messages and
    /// commits the copy only if every publish succeeded.
    async fn apply_local<F>(&mut self, op: F) -> Result<()>
    where
        F: FnOnce(&mut TradeSession) -> std::result::Result<Vec<SyncAction>, SyncError>,
    {
        let mut next = self.session.clone();
        let actions = op(&mut next)?;
        let (publishes, rest): (Vec<_>, Vec<_>) = actions.into_iter().partition(SyncAction::is_publish);

        for action in publishes {
            if let SyncAction::Publish(msg) = action {
                self.publish(&msg).await?;
            }
        }
        self.session = next;
        self.drain(rest.into_iter().map(Work::Sync)).await;
        Ok(())
    }

    async fn handle_outcome(&mut self, outcome: JobOutcome) {
        let actions = self.orchestrator.on_outcome(outcome);
        self.drain(actions.into_iter().map(Work::Settle)).await;
    }

    async fn retry(&mut self) -> Result<()> {
        match self.orchestrator.retry() {
            Ok(actions) => {
                self.drain(actions.into_iter().map(Work::Settle)).await;
                Ok(())
            }
            Err(SettlementError::NothingToRetry) if self.pending_notice.is_some() => {
                if let Some(notice) = self.pending_notice.take() {
                    if let Err(e) = self.publish(&notice).await {
                        self.pending_notice = Some(notice);
                        return Err(e);
                    }
                    info!(event = notice.event(), "settlement notice re-sent");
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Executes actions until none are left. Actions may produce more
    /// actions, e.g. a settlement outcome closing the trade round.
    async fn drain(&mut self, initial: impl IntoIterator<Item = Work>) {
        let mut queue: VecDeque<Work> = initial.into_iter().collect();
        while let Some(work) = queue.pop_front() {
            match work {
                Work::Sync(SyncAction::Publish(msg)) => self.publish_best_effort(msg).await,
                Work::Sync(SyncAction::Notify(event)) => self.emit(event),
                Work::Sync(SyncAction::Settle(trigger)) => match self.orchestrator.on_trigger(trigger) {
                    Ok(actions) => queue.extend(actions.into_iter().map(Work::Settle)),
                    Err(e) => debug!(error = %e, "settlement trigger ignored"),
                },
                Work::Settle(OrchestratorAction::Dispatch(job)) => {
                    queue.extend(self.session.mark_settling().into_iter().map(Work::Sync));
                    self.spawn_job(job);
                }
                Work::Settle(OrchestratorAction::Publish(msg)) => self.publish_best_effort(msg).await,
                Work::Settle(OrchestratorAction::Status(status)) => {
                    self.emit(SwapEvent::Settlement(status))
                }
                Work::Settle(OrchestratorAction::RoundSettled) => {
                    queue.extend(self.session.finish_round().into_iter().map(Work::Sync));
                }
                Work::Settle(OrchestratorAction::RoundCancelled) => {
                    queue.extend(self.session.cancel_round().into_iter().map(Work::Sync));
                }
            }
        }
    }

    fn spawn_job(&self, job: SettlementJob) {
        let escrow = Arc::clone(&self.escrow);
        let outcomes = self.outcome_tx.clone();
        tokio::spawn(async move {
            let outcome = job.run(escrow.as_ref()).await;
            if outcomes.send(outcome).await.is_err() {
                debug!("client stopped before settlement job finished");
            }
        });
    }

    fn emit(&self, event: SwapEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn view(&self) -> TradeView {
        TradeView {
            local: self.session.local().clone(),
            topic: self.channel.as_ref().map(|c| c.topic.clone()),
            phase: self.session.phase(),
            partner: self.session.partner().cloned(),
            selection: self.session.selection().to_vec(),
            slots: self.session.slots().clone(),
            acceptance: *self.session.acceptance(),
            agreement: self.session.agreement().cloned(),
            settlement: self.orchestrator.step(),
            escrow_expires_at: self.orchestrator.expires_at(),
        }
    }
}

async fn next_frame(channel: &mut Option<ActiveChannel>) -> Option<ChannelFrame> {
    match channel {
        Some(active) => active.inbound.next().await,
        None => std::future::pending().await,
    }
}
