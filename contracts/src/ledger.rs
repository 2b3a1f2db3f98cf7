//! # Escrow Ledger
//!
//! A shared, thread-safe ledger around one [`ProgramState`]. Each wallet
//! gets a [`LedgerWallet`] gateway that signs as that wallet, and
//! [`EscrowLedger::client`] wraps it in the regular
//! [`ProgramEscrowClient`], so settlement runs the exact client code a real
//! deployment would.
//!
//! For tests the ledger records every submitted transaction, can fail the
//! next transaction containing a given method, and runs on a clock that can
//! be moved forward to expire escrows.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use swap_protocol::escrow::{Instruction, LedgerGateway, ProgramEscrowClient, RpcError, TxSignature};
use swap_protocol::identity::{Pubkey, WalletKeypair};
use swap_protocol::AssetRef;

use crate::escrow_program::{ProgramOp, ProgramState};

/// One submitted transaction as the ledger saw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerCall {
    pub signer: String,
    /// Methods invoked, in instruction order.
    pub ops: Vec<ProgramOp>,
    pub signature: Option<TxSignature>,
    pub error: Option<String>,
}

impl LedgerCall {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

struct LedgerState {
    program: ProgramState,
    clock_offset: Duration,
    faults: HashMap<ProgramOp, RpcError>,
    calls: Vec<LedgerCall>,
}

/// In-process ledger hosting the escrow program.
pub struct EscrowLedger {
    program_id: Pubkey,
    state: Mutex<LedgerState>,
}

impl EscrowLedger {
    pub fn new(program_id: Pubkey) -> Arc<Self> {
        Arc::new(Self {
            program_id,
            state: Mutex::new(LedgerState {
                program: ProgramState::new(program_id),
                clock_offset: Duration::zero(),
                faults: HashMap::new(),
                calls: Vec::new(),
            }),
        })
    }

    pub fn program_id(&self) -> Pubkey {
        self.program_id
    }

    /// Gateway signing as `wallet`.
    pub fn wallet(self: &Arc<Self>, wallet: Pubkey) -> LedgerWallet {
        LedgerWallet {
            ledger: Arc::clone(self),
            wallet,
        }
    }

    /// Escrow client signing as `wallet`.
    pub fn client(self: &Arc<Self>, wallet: Pubkey) -> ProgramEscrowClient<LedgerWallet> {
        ProgramEscrowClient::new(self.program_id, self.wallet(wallet))
    }

    /// Creates a fresh mint held by `owner`.
    pub fn mint_nft(&self, owner: &Pubkey, name: &str) -> AssetRef {
        let mint = WalletKeypair::generate().pubkey();
        self.state.lock().program.set_holder(mint, *owner);
        debug!(%mint, %owner, name, "minted");
        AssetRef::new(mint.to_string(), name)
    }

    pub fn holder(&self, mint: &Pubkey) -> Option<Pubkey> {
        self.state.lock().program.holder(mint)
    }

    /// Whether `owner` holds the NFT behind `asset`.
    pub fn holds(&self, owner: &Pubkey, asset: &AssetRef) -> bool {
        asset
            .mint_pubkey()
            .map(|mint| self.holder(&mint) == Some(*owner))
            .unwrap_or(false)
    }

    pub fn holdings(&self, owner: &Pubkey) -> Vec<Pubkey> {
        self.state.lock().program.holdings(owner)
    }

    pub fn open_escrows(&self) -> usize {
        self.state.lock().program.open_escrows()
    }

    /// Ledger time in unix seconds.
    pub fn now(&self) -> i64 {
        (Utc::now() + self.state.lock().clock_offset).timestamp()
    }

    /// Moves the ledger clock forward.
    pub fn advance_clock(&self, by: Duration) {
        let mut state = self.state.lock();
        state.clock_offset = state.clock_offset + by;
    }

    /// Fails the next transaction that invokes `op` with `error`, without
    /// executing it.
    pub fn fail_next(&self, op: ProgramOp, error: RpcError) {
        self.state.lock().faults.insert(op, error);
    }

    /// Every submitted transaction, oldest first.
    pub fn calls(&self) -> Vec<LedgerCall> {
        self.state.lock().calls.clone()
    }

    /// Successful transactions only.
    pub fn confirmed(&self) -> Vec<LedgerCall> {
        self.calls().into_iter().filter(LedgerCall::succeeded).collect()
    }

    fn submit(&self, signer: Pubkey, instructions: &[Instruction]) -> Result<TxSignature, RpcError> {
        let now = self.now();
        let mut state = self.state.lock();
        let ops: Vec<ProgramOp> = instructions.iter().filter_map(ProgramOp::of).collect();

        let injected = ops.iter().find_map(|op| state.faults.remove(op));
        let result = match injected {
            Some(error) => Err(error),
            None => state
                .program
                .execute(&signer, instructions, now)
                .map(|_| Uuid::new_v4().simple().to_string())
                .map_err(|e| RpcError::ProgramRejected(e.to_string())),
        };

        match &result {
            Ok(sig) => info!(%signer, ?ops, signature = %sig, "transaction confirmed"),
            Err(e) => warn!(%signer, ?ops, error = %e, "transaction failed"),
        }
        state.calls.push(LedgerCall {
            signer: signer.to_string(),
            ops,
            signature: result.as_ref().ok().cloned(),
            error: result.as_ref().err().map(ToString::to_string),
        });
        result
    }

    fn account(&self, address: &Pubkey) -> Option<Vec<u8>> {
        self.state.lock().program.account(address).map(<[u8]>::to_vec)
    }
}

/// [`LedgerGateway`] of one wallet on an [`EscrowLedger`].
#[derive(Clone)]
pub struct LedgerWallet {
    ledger: Arc<EscrowLedger>,
    wallet: Pubkey,
}

#[async_trait]
impl LedgerGateway for LedgerWallet {
    fn wallet(&self) -> Pubkey {
        self.wallet
    }

    async fn send(&self, instructions: Vec<Instruction>) -> Result<TxSignature, RpcError> {
        self.ledger.submit(self.wallet, &instructions)
    }

    async fn get_account(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, RpcError> {
        Ok(self.ledger.account(address))
    }
}
