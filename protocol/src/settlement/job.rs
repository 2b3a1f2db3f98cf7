//! Settlement jobs: one escrow call with everything it needs captured by
//! value, so it can run on its own task while the driver keeps serving
//! messages. The result comes back as a [`JobOutcome`] tagged with the
//! agreement it belongs to.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::escrow::{EscrowAccountSnapshot, EscrowRpcClient};

use super::agreement::EscrowAgreement;
use super::error::SettlementError;
use super::step::SettlementOp;

/// A pending escrow call.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementJob {
    pub op: SettlementOp,
    pub agreement: EscrowAgreement,
    /// Initialize only: look for an existing escrow first.
    pub verify_existing: bool,
}

/// What a successful job learned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSuccess {
    /// `None` when the step was already on the ledger and nothing was sent.
    pub signature: Option<String>,
    pub snapshot: Option<EscrowAccountSnapshot>,
}

/// Result of a finished job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub agreement_id: Uuid,
    pub op: SettlementOp,
    pub result: Result<JobSuccess, SettlementError>,
}

impl SettlementJob {
    pub async fn run(self, client: &dyn EscrowRpcClient) -> JobOutcome {
        debug!(op = %self.op, agreement = %self.agreement.id, "settlement job started");
        let result = match self.op {
            SettlementOp::Initialize => self.initialize(client).await,
            SettlementOp::Deposit => self.deposit(client).await,
            SettlementOp::Complete => self.complete(client).await,
            SettlementOp::Cancel => self.cancel(client).await,
        };
        if let Err(e) = &result {
            warn!(op = %self.op, error = %e, "settlement job failed");
        }
        JobOutcome {
            agreement_id: self.agreement.id,
            op: self.op,
            result,
        }
    }

    async fn snapshot(&self, client: &dyn EscrowRpcClient) -> Result<Option<EscrowAccountSnapshot>, SettlementError> {
        client
            .get_account_snapshot(&self.agreement.initializer, &self.agreement.taker)
            .await
            .map_err(SettlementError::rpc(self.op))
    }

    async fn initialize(&self, client: &dyn EscrowRpcClient) -> Result<JobSuccess, SettlementError> {
        let a = &self.agreement;
        if self.verify_existing {
            if let Some(existing) = self.snapshot(client).await? {
                if a.matches(&existing) {
                    info!(escrow = %existing.address, "escrow with these terms already exists");
                    return Ok(JobSuccess {
                        signature: None,
                        snapshot: Some(existing),
                    });
                }
                warn!(escrow = %existing.address, "stale escrow blocks this pair");
                return Err(SettlementError::StaleEscrow);
            }
        }

        let signature = client
            .initialize(&a.taker, &a.initializer_assets, &a.taker_assets, a.timeout_secs)
            .await
            .map_err(SettlementError::rpc(self.op))?;

        // Expiry is informational; a failed read does not fail the step.
        let snapshot = match self.snapshot(client).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, "could not read escrow after initialize");
                None
            }
        };
        Ok(JobSuccess {
            signature: Some(signature),
            snapshot,
        })
    }

    async fn deposit(&self, client: &dyn EscrowRpcClient) -> Result<JobSuccess, SettlementError> {
        let a = &self.agreement;
        let snap = self
            .snapshot(client)
            .await?
            .ok_or(SettlementError::EscrowNotFound)?;
        if !a.matches(&snap) {
            return Err(SettlementError::TermsMismatch);
        }
        if snap.taker_deposited {
            info!("taker deposit already on the ledger");
            return Ok(JobSuccess {
                signature: None,
                snapshot: Some(snap),
            });
        }
        if !snap.initializer_deposited {
            return Err(SettlementError::DepositsIncomplete);
        }

        let signature = client
            .deposit_and_collect(&a.initializer, &a.taker, &snap.taker_assets)
            .await
            .map_err(SettlementError::rpc(self.op))?;
        Ok(JobSuccess {
            signature: Some(signature),
            snapshot: Some(snap),
        })
    }

    async fn complete(&self, client: &dyn EscrowRpcClient) -> Result<JobSuccess, SettlementError> {
        let a = &self.agreement;
        let snap = self
            .snapshot(client)
            .await?
            .ok_or(SettlementError::EscrowNotFound)?;
        if !snap.taker_deposited {
            return Err(SettlementError::DepositsIncomplete);
        }
        if snap.taker_assets_collected {
            info!("counterpart assets already collected");
            return Ok(JobSuccess {
                signature: None,
                snapshot: Some(snap),
            });
        }

        let signature = client
            .complete(&a.initializer, &a.taker, true, &snap.taker_assets)
            .await
            .map_err(SettlementError::rpc(self.op))?;
        Ok(JobSuccess {
            signature: Some(signature),
            snapshot: Some(snap),
        })
    }

    async fn cancel(&self, client: &dyn EscrowRpcClient) -> Result<JobSuccess, SettlementError> {
        let a = &self.agreement;
        if !a.is_initializer() {
            return Err(SettlementError::NotInitializer);
        }
        if self.snapshot(client).await?.is_none() {
            info!("no escrow on the ledger; abandoning round locally");
            return Ok(JobSuccess {
                signature: None,
                snapshot: None,
            });
        }
        let signature = client
            .cancel(&a.initializer, &a.taker)
            .await
            .map_err(SettlementError::rpc(self.op))?;
        Ok(JobSuccess {
            signature: Some(signature),
            snapshot: None,
        })
    }
}
