//! # Settlement Orchestrator
//!
//! Turns an accepted trade into the escrow call sequence for the local role:
//!
//! ```text
//! initializer: initialize ──escrow-initialized──▶ (wait) ◀──escrow-deposited── complete
//! taker:       (wait) ◀──escrow-initialized── deposit_and_collect ──escrow-deposited──▶
//! ```
//!
//! The orchestrator is synchronous state. It emits [`SettlementJob`]s for
//! the driver to run and consumes their [`JobOutcome`]s; a job is only
//! dispatched when the previous step for the same agreement succeeded, and
//! at most one job is in flight. A failed step parks in
//! [`SettlementStep::Failed`] until the user retries; nothing is retried
//! automatically.

use tracing::{debug, info, warn};

use crate::identity::PeerIdentity;
use crate::sync::{SettlementTrigger, SwapMessage};

use super::agreement::EscrowAgreement;
use super::error::SettlementError;
use super::job::{JobOutcome, JobSuccess, SettlementJob};
use super::step::{SettlementOp, SettlementStatus, SettlementStep};

/// What the driver must do next.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorAction {
    /// Run this escrow call.
    Dispatch(SettlementJob),
    /// Tell the partner a step finished.
    Publish(SwapMessage),
    /// Progress for the UI.
    Status(SettlementStatus),
    /// The swap went through; close the trade round.
    RoundSettled,
    /// The escrow was cancelled; close the trade round.
    RoundCancelled,
}

#[derive(Debug)]
pub struct SettlementOrchestrator {
    local: PeerIdentity,
    verify_before_initialize: bool,
    agreement: Option<EscrowAgreement>,
    step: SettlementStep,
    in_flight: Option<SettlementOp>,
    /// Initializer only: `escrow-deposited` arrived while initialize was
    /// still running.
    counterpart_deposited: bool,
    signature: Option<String>,
    expires_at: Option<i64>,
}

impl SettlementOrchestrator {
    pub fn new(local: PeerIdentity, verify_before_initialize: bool) -> Self {
        Self {
            local,
            verify_before_initialize,
            agreement: None,
            step: SettlementStep::Idle,
            in_flight: None,
            counterpart_deposited: false,
            signature: None,
            expires_at: None,
        }
    }

    pub fn step(&self) -> SettlementStep {
        self.step
    }

    pub fn agreement(&self) -> Option<&EscrowAgreement> {
        self.agreement.as_ref()
    }

    pub fn in_flight(&self) -> Option<SettlementOp> {
        self.in_flight
    }

    /// Unix second the current escrow expires, once known.
    pub fn expires_at(&self) -> Option<i64> {
        self.expires_at
    }

    pub fn status(&self, message: impl Into<String>) -> SettlementStatus {
        SettlementStatus {
            step: self.step,
            message: message.into(),
            busy: self.in_flight.is_some(),
            signature: self.signature.clone(),
            expires_at: self.expires_at,
        }
    }

    // -----------------------------------------------------------------------
    // Triggers
    // -----------------------------------------------------------------------

    pub fn on_trigger(&mut self, trigger: SettlementTrigger) -> Result<Vec<OrchestratorAction>, SettlementError> {
        match trigger {
            SettlementTrigger::Agreed(agreement) => self.on_agreed(agreement),
            SettlementTrigger::Abandoned => self.on_abandoned(),
            SettlementTrigger::CounterpartInitialized { signature } => {
                self.on_counterpart_initialized(signature)
            }
            SettlementTrigger::CounterpartDeposited { signature } => {
                self.on_counterpart_deposited(signature)
            }
            SettlementTrigger::CounterpartCancelled { signature } => {
                self.on_counterpart_cancelled(signature)
            }
        }
    }

    fn on_agreed(&mut self, agreement: EscrowAgreement) -> Result<Vec<OrchestratorAction>, SettlementError> {
        if self.step.escrow_touched() {
            return match &self.agreement {
                Some(current) if current.same_terms(&agreement) => Ok(Vec::new()),
                _ => Err(self.out_of_order("agreement")),
            };
        }

        let is_initializer = agreement.is_initializer();
        self.begin(agreement);
        if is_initializer {
            Ok(self.dispatch(SettlementOp::Initialize))
        } else {
            self.step = SettlementStep::AwaitingEscrow;
            Ok(vec![OrchestratorAction::Status(
                self.status("waiting for partner to create the escrow"),
            )])
        }
    }

    fn on_abandoned(&mut self) -> Result<Vec<OrchestratorAction>, SettlementError> {
        if self.step.escrow_touched() {
            return Err(self.out_of_order("abandon"));
        }
        if self.agreement.take().is_none() {
            return Ok(Vec::new());
        }
        self.step = SettlementStep::Idle;
        Ok(vec![OrchestratorAction::Status(self.status("acceptance withdrawn"))])
    }

    fn on_counterpart_initialized(
        &mut self,
        signature: Option<String>,
    ) -> Result<Vec<OrchestratorAction>, SettlementError> {
        let agreement = self.agreement.as_ref().ok_or(SettlementError::NoAgreement)?;
        if agreement.is_initializer() {
            return Err(self.out_of_order("escrow-initialized"));
        }
        match self.step {
            SettlementStep::AwaitingEscrow => {
                debug!(?signature, "partner created the escrow");
                Ok(self.dispatch(SettlementOp::Deposit))
            }
            // Redelivery, or a failure awaiting manual retry.
            SettlementStep::Depositing | SettlementStep::Settled | SettlementStep::Failed(_) => {
                Ok(Vec::new())
            }
            _ => Err(self.out_of_order("escrow-initialized")),
        }
    }

    fn on_counterpart_deposited(
        &mut self,
        signature: Option<String>,
    ) -> Result<Vec<OrchestratorAction>, SettlementError> {
        let agreement = self.agreement.as_ref().ok_or(SettlementError::NoAgreement)?;
        if !agreement.is_initializer() {
            return Err(self.out_of_order("escrow-deposited"));
        }
        match self.step {
            SettlementStep::AwaitingDeposit => {
                debug!(?signature, "partner deposited");
                Ok(self.dispatch(SettlementOp::Complete))
            }
            SettlementStep::Initializing => {
                self.counterpart_deposited = true;
                Ok(Vec::new())
            }
            SettlementStep::Completing | SettlementStep::Settled | SettlementStep::Failed(_) => {
                Ok(Vec::new())
            }
            _ => Err(self.out_of_order("escrow-deposited")),
        }
    }

    fn on_counterpart_cancelled(
        &mut self,
        signature: Option<String>,
    ) -> Result<Vec<OrchestratorAction>, SettlementError> {
        let agreement = self.agreement.as_ref().ok_or(SettlementError::NoAgreement)?;
        if agreement.is_initializer() || self.step == SettlementStep::Settled {
            return Err(self.out_of_order("escrow-cancelled"));
        }
        info!(?signature, "partner cancelled the escrow");
        self.in_flight = None;
        self.step = SettlementStep::Cancelled;
        self.signature = signature;
        self.agreement = None;
        Ok(vec![
            OrchestratorAction::Status(self.status("partner cancelled the escrow")),
            OrchestratorAction::RoundCancelled,
        ])
    }

    // -----------------------------------------------------------------------
    // User requests
    // -----------------------------------------------------------------------

    /// Cancels the escrow. Refused locally unless the wallet is the
    /// initializer.
    pub fn request_cancel(&mut self) -> Result<Vec<OrchestratorAction>, SettlementError> {
        let agreement = self.agreement.as_ref().ok_or(SettlementError::NoAgreement)?;
        if !agreement.is_initializer() {
            return Err(SettlementError::NotInitializer);
        }
        if let Some(op) = self.in_flight {
            return Err(SettlementError::Busy { op });
        }
        Ok(self.dispatch(SettlementOp::Cancel))
    }

    /// Re-runs the step that failed.
    pub fn retry(&mut self) -> Result<Vec<OrchestratorAction>, SettlementError> {
        match self.step {
            SettlementStep::Failed(op) if self.agreement.is_some() => {
                info!(%op, "retrying settlement step");
                Ok(self.dispatch(op))
            }
            _ => Err(SettlementError::NothingToRetry),
        }
    }

    /// Drops all settlement state, e.g. when the channel closes.
    pub fn reset(&mut self) {
        if self.step.escrow_touched() {
            warn!(step = %self.step, "settlement abandoned mid-flight; escrow may remain on the ledger");
        }
        self.agreement = None;
        self.step = SettlementStep::Idle;
        self.in_flight = None;
        self.counterpart_deposited = false;
        self.signature = None;
        self.expires_at = None;
    }

    // -----------------------------------------------------------------------
    // Outcomes
    // -----------------------------------------------------------------------

    /// Applies a finished job. Outcomes of other agreements or of calls
    /// that are no longer in flight are dropped.
    pub fn on_outcome(&mut self, outcome: JobOutcome) -> Vec<OrchestratorAction> {
        let current = self.agreement.as_ref().map(|a| a.id);
        if current != Some(outcome.agreement_id) || self.in_flight != Some(outcome.op) {
            debug!(op = %outcome.op, "dropping stale settlement outcome");
            return Vec::new();
        }
        self.in_flight = None;

        match outcome.result {
            Err(e) => {
                self.step = SettlementStep::Failed(outcome.op);
                vec![OrchestratorAction::Status(self.status(e.to_string()))]
            }
            Ok(success) => self.on_success(outcome.op, success),
        }
    }

    fn on_success(&mut self, op: SettlementOp, success: JobSuccess) -> Vec<OrchestratorAction> {
        if success.signature.is_some() {
            self.signature = success.signature.clone();
        }
        if let Some(snapshot) = &success.snapshot {
            self.expires_at = Some(snapshot.expires_at());
        }

        match op {
            SettlementOp::Initialize => {
                self.step = SettlementStep::AwaitingDeposit;
                let mut out = vec![
                    OrchestratorAction::Publish(SwapMessage::EscrowInitialized {
                        wallet_address: self.local.clone(),
                        signature: success.signature,
                    }),
                    OrchestratorAction::Status(self.status("escrow created, waiting for partner deposit")),
                ];
                if std::mem::take(&mut self.counterpart_deposited) {
                    out.extend(self.dispatch(SettlementOp::Complete));
                }
                out
            }
            SettlementOp::Deposit => {
                self.finish(SettlementStep::Settled);
                vec![
                    OrchestratorAction::Publish(SwapMessage::EscrowDeposited {
                        wallet_address: self.local.clone(),
                        signature: success.signature,
                    }),
                    OrchestratorAction::Status(self.status("swap complete")),
                    OrchestratorAction::RoundSettled,
                ]
            }
            SettlementOp::Complete => {
                self.finish(SettlementStep::Settled);
                vec![
                    OrchestratorAction::Status(self.status("swap complete")),
                    OrchestratorAction::RoundSettled,
                ]
            }
            SettlementOp::Cancel => {
                self.finish(SettlementStep::Cancelled);
                vec![
                    OrchestratorAction::Publish(SwapMessage::EscrowCancelled {
                        wallet_address: self.local.clone(),
                        signature: success.signature,
                    }),
                    OrchestratorAction::Status(self.status("escrow cancelled")),
                    OrchestratorAction::RoundCancelled,
                ]
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn begin(&mut self, agreement: EscrowAgreement) {
        self.reset();
        info!(role = %agreement.local_role, agreement = %agreement.id, "settlement armed");
        self.agreement = Some(agreement);
    }

    fn finish(&mut self, step: SettlementStep) {
        self.step = step;
        self.agreement = None;
        self.counterpart_deposited = false;
    }

    fn dispatch(&mut self, op: SettlementOp) -> Vec<OrchestratorAction> {
        let Some(agreement) = self.agreement.clone() else {
            return Vec::new();
        };
        let job = SettlementJob {
            op,
            agreement,
            verify_existing: op == SettlementOp::Initialize && self.verify_before_initialize,
        };
        self.in_flight = Some(op);
        self.step = op.running_step();
        info!(%op, "dispatching escrow call");
        vec![
            OrchestratorAction::Status(self.status(format!("{}...", op))),
            OrchestratorAction::Dispatch(job),
        ]
    }

    fn out_of_order(&self, trigger: &'static str) -> SettlementError {
        SettlementError::OutOfOrder {
            trigger,
            step: self.step,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escrow::RpcError;
    use crate::settlement::SwapRole;
    use crate::trade::{AssetRef, TradeSlots};

    fn agreement(role: SwapRole) -> EscrowAgreement {
        let slots = TradeSlots::from_assets(
            &[AssetRef::new("M1", "One")],
            &[AssetRef::new("M2", "Two"), AssetRef::new("M3", "Three")],
        )
        .unwrap();
        let (local, partner) = match role {
            SwapRole::Initializer => ("A", "B"),
            SwapRole::Taker => ("B", "A"),
        };
        let slots = if role == SwapRole::Taker { slots.inverted() } else { slots };
        EscrowAgreement::from_slots(&local.into(), &partner.into(), role, &slots, 60).unwrap()
    }

    fn jobs(actions: &[OrchestratorAction]) -> Vec<&SettlementJob> {
        actions
            .iter()
            .filter_map(|a| match a {
                OrchestratorAction::Dispatch(j) => Some(j),
                _ => None,
            })
            .collect()
    }

    fn ok(job: &SettlementJob, signature: &str) -> JobOutcome {
        JobOutcome {
            agreement_id: job.agreement.id,
            op: job.op,
            result: Ok(JobSuccess {
                signature: Some(signature.into()),
                snapshot: None,
            }),
        }
    }

    #[test]
    fn initializer_runs_initialize_then_complete() {
        let mut orch = SettlementOrchestrator::new("A".into(), true);
        let acts = orch
            .on_trigger(SettlementTrigger::Agreed(agreement(SwapRole::Initializer)))
            .unwrap();
        let init = jobs(&acts)[0].clone();
        assert_eq!(init.op, SettlementOp::Initialize);
        assert!(init.verify_existing);
        assert_eq!(init.agreement.initializer_assets.len(), 1);
        assert_eq!(init.agreement.taker_assets.len(), 2);

        let acts = orch.on_outcome(ok(&init, "s1"));
        assert!(acts.iter().any(|a| matches!(
            a,
            OrchestratorAction::Publish(SwapMessage::EscrowInitialized { .. })
        )));
        assert_eq!(orch.step(), SettlementStep::AwaitingDeposit);

        let acts = orch
            .on_trigger(SettlementTrigger::CounterpartDeposited {
                signature: Some("s2".into()),
            })
            .unwrap();
        let complete = jobs(&acts)[0].clone();
        assert_eq!(complete.op, SettlementOp::Complete);

        let acts = orch.on_outcome(ok(&complete, "s3"));
        assert!(acts.contains(&OrchestratorAction::RoundSettled));
        assert_eq!(orch.step(), SettlementStep::Settled);
    }

    #[test]
    fn taker_waits_for_escrow_before_depositing() {
        let mut orch = SettlementOrchestrator::new("B".into(), true);
        let acts = orch
            .on_trigger(SettlementTrigger::Agreed(agreement(SwapRole::Taker)))
            .unwrap();
        assert!(jobs(&acts).is_empty());
        assert_eq!(orch.step(), SettlementStep::AwaitingEscrow);

        let acts = orch
            .on_trigger(SettlementTrigger::CounterpartInitialized { signature: None })
            .unwrap();
        let deposit = jobs(&acts)[0].clone();
        assert_eq!(deposit.op, SettlementOp::Deposit);

        // duplicate notice while the deposit runs
        let again = orch
            .on_trigger(SettlementTrigger::CounterpartInitialized { signature: None })
            .unwrap();
        assert!(again.is_empty());

        let acts = orch.on_outcome(ok(&deposit, "s2"));
        assert!(acts.iter().any(|a| matches!(
            a,
            OrchestratorAction::Publish(SwapMessage::EscrowDeposited { .. })
        )));
        assert!(acts.contains(&OrchestratorAction::RoundSettled));
    }

    #[test]
    fn deposit_notice_during_initialize_is_remembered() {
        let mut orch = SettlementOrchestrator::new("A".into(), false);
        let acts = orch
            .on_trigger(SettlementTrigger::Agreed(agreement(SwapRole::Initializer)))
            .unwrap();
        let init = jobs(&acts)[0].clone();
        assert!(orch
            .on_trigger(SettlementTrigger::CounterpartDeposited { signature: None })
            .unwrap()
            .is_empty());

        let acts = orch.on_outcome(ok(&init, "s1"));
        assert_eq!(jobs(&acts)[0].op, SettlementOp::Complete);
    }

    #[test]
    fn taker_cannot_cancel() {
        let mut orch = SettlementOrchestrator::new("B".into(), true);
        orch.on_trigger(SettlementTrigger::Agreed(agreement(SwapRole::Taker)))
            .unwrap();
        assert_eq!(orch.request_cancel(), Err(SettlementError::NotInitializer));
    }

    #[test]
    fn cancel_waits_for_in_flight_call() {
        let mut orch = SettlementOrchestrator::new("A".into(), true);
        orch.on_trigger(SettlementTrigger::Agreed(agreement(SwapRole::Initializer)))
            .unwrap();
        assert_eq!(
            orch.request_cancel(),
            Err(SettlementError::Busy {
                op: SettlementOp::Initialize
            })
        );
    }

    #[test]
    fn failure_parks_until_manual_retry() {
        let mut orch = SettlementOrchestrator::new("A".into(), true);
        let acts = orch
            .on_trigger(SettlementTrigger::Agreed(agreement(SwapRole::Initializer)))
            .unwrap();
        let init = jobs(&acts)[0].clone();
        let acts = orch.on_outcome(JobOutcome {
            agreement_id: init.agreement.id,
            op: init.op,
            result: Err(SettlementError::Rpc {
                op: SettlementOp::Initialize,
                source: RpcError::WalletRejected("user declined".into()),
            }),
        });
        assert!(jobs(&acts).is_empty());
        assert_eq!(orch.step(), SettlementStep::Failed(SettlementOp::Initialize));
        // agreement survives the failure
        assert!(orch.agreement().is_some());

        let acts = orch.retry().unwrap();
        assert_eq!(jobs(&acts)[0].op, SettlementOp::Initialize);
    }

    #[test]
    fn stale_outcome_is_dropped() {
        let mut orch = SettlementOrchestrator::new("A".into(), true);
        let acts = orch
            .on_trigger(SettlementTrigger::Agreed(agreement(SwapRole::Initializer)))
            .unwrap();
        let init = jobs(&acts)[0].clone();
        orch.reset();
        assert!(orch.on_outcome(ok(&init, "s1")).is_empty());
    }

    #[test]
    fn complete_before_initialize_is_out_of_order() {
        let mut orch = SettlementOrchestrator::new("B".into(), true);
        orch.on_trigger(SettlementTrigger::Agreed(agreement(SwapRole::Taker)))
            .unwrap();
        assert!(matches!(
            orch.on_trigger(SettlementTrigger::CounterpartDeposited { signature: None }),
            Err(SettlementError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn partner_cancel_closes_taker_round() {
        let mut orch = SettlementOrchestrator::new("B".into(), true);
        orch.on_trigger(SettlementTrigger::Agreed(agreement(SwapRole::Taker)))
            .unwrap();
        let acts = orch
            .on_trigger(SettlementTrigger::CounterpartCancelled {
                signature: Some("c".into()),
            })
            .unwrap();
        assert!(acts.contains(&OrchestratorAction::RoundCancelled));
        assert_eq!(orch.step(), SettlementStep::Cancelled);
        assert!(orch.agreement().is_none());
    }
}
