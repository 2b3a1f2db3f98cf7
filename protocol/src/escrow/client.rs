//! # Escrow RPC Client
//!
//! [`EscrowRpcClient`] is the settlement orchestrator's only view of the
//! ledger: four state-changing calls plus one read. Each call either lands
//! its whole transaction or fails; there is no partial success to clean up.
//!
//! [`ProgramEscrowClient`] implements it by building escrow program
//! instructions and handing them to a [`LedgerGateway`], the thin seam where
//! a real wallet adapter and RPC node plug in.
//!
//! ## Call Bundling
//!
//! | call                  | instructions in one transaction              |
//! |-----------------------|----------------------------------------------|
//! | `initialize`          | initialize + one deposit per initializer NFT |
//! | `deposit_and_collect` | one deposit per taker NFT + one complete per initializer NFT |
//! | `complete`            | one complete per counterpart NFT             |
//! | `cancel`              | cancel                                       |

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_ESCROW_TIMEOUT_SECS;
use crate::identity::{PeerIdentity, Pubkey};
use crate::trade::AssetRef;

use super::account::{is_closed, EscrowAccountData, EscrowAccountSnapshot};
use super::error::RpcError;
use super::instruction::{check_asset_count, EscrowProgram, Instruction};

/// Ledger transaction signature.
pub type TxSignature = String;

/// The escrow operations settlement needs.
///
/// The implementor signs with the connected wallet. `initialize` and
/// `cancel` only succeed for the initializer; `deposit_and_collect` only for
/// the taker.
#[async_trait]
pub trait EscrowRpcClient: Send + Sync {
    /// Creates the escrow for (wallet, `taker`) and deposits the
    /// initializer's NFTs.
    async fn initialize(
        &self,
        taker: &PeerIdentity,
        initializer_assets: &[AssetRef],
        taker_assets: &[AssetRef],
        timeout_secs: i64,
    ) -> Result<TxSignature, RpcError>;

    /// Taker side: deposits `taker_assets` and collects the initializer's.
    async fn deposit_and_collect(
        &self,
        initializer: &PeerIdentity,
        taker: &PeerIdentity,
        taker_assets: &[AssetRef],
    ) -> Result<TxSignature, RpcError>;

    /// Collects `counterpart_assets` from the vault.
    async fn complete(
        &self,
        initializer: &PeerIdentity,
        taker: &PeerIdentity,
        is_initializer: bool,
        counterpart_assets: &[AssetRef],
    ) -> Result<TxSignature, RpcError>;

    /// Closes the escrow and returns whatever is still in the vault.
    async fn cancel(&self, initializer: &PeerIdentity, taker: &PeerIdentity) -> Result<TxSignature, RpcError>;

    /// Current escrow state, `None` when it does not exist or was closed.
    async fn get_account_snapshot(
        &self,
        initializer: &PeerIdentity,
        taker: &PeerIdentity,
    ) -> Result<Option<EscrowAccountSnapshot>, RpcError>;
}

// ---------------------------------------------------------------------------
// Ledger Gateway
// ---------------------------------------------------------------------------

/// Signs, submits and reads. Everything chain-specific below the
/// instruction level lives behind this trait.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// The connected wallet, which signs every transaction.
    fn wallet(&self) -> Pubkey;

    /// Signs `instructions` as one transaction, submits it and waits for
    /// confirmation.
    async fn send(&self, instructions: Vec<Instruction>) -> Result<TxSignature, RpcError>;

    /// Raw account data, `None` if the account does not exist.
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, RpcError>;
}

// ---------------------------------------------------------------------------
// Program Client
// ---------------------------------------------------------------------------

/// [`EscrowRpcClient`] over the escrow program.
pub struct ProgramEscrowClient<G> {
    program: EscrowProgram,
    gateway: G,
}

impl<G: LedgerGateway> ProgramEscrowClient<G> {
    pub fn new(program_id: Pubkey, gateway: G) -> Self {
        Self {
            program: EscrowProgram::new(program_id),
            gateway,
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    fn pubkey(identity: &PeerIdentity) -> Result<Pubkey, RpcError> {
        identity
            .to_pubkey()
            .map_err(|_| RpcError::InvalidAddress(identity.to_string()))
    }

    fn mints(assets: &[AssetRef]) -> Result<Vec<Pubkey>, RpcError> {
        assets
            .iter()
            .map(|a| a.mint_pubkey().map_err(|_| RpcError::InvalidAddress(a.mint.clone())))
            .collect()
    }

    fn require_signer(&self, expected: &Pubkey, action: &'static str) -> Result<(), RpcError> {
        let wallet = self.gateway.wallet();
        if &wallet == expected {
            Ok(())
        } else {
            Err(RpcError::Unauthorized {
                wallet: wallet.to_string(),
                action,
            })
        }
    }

    /// One `complete` instruction per mint, indexed in on-chain slot order.
    fn complete_all(
        &self,
        caller: &Pubkey,
        escrow: &Pubkey,
        initializer: &Pubkey,
        mints: &[Pubkey],
        caller_is_initializer: bool,
    ) -> Result<Vec<Instruction>, RpcError> {
        mints
            .iter()
            .enumerate()
            .map(|(i, mint)| {
                self.program
                    .complete(caller, escrow, initializer, mint, caller_is_initializer, i as u8)
            })
            .collect()
    }

    fn deposit_all(
        &self,
        depositor: &Pubkey,
        escrow: &Pubkey,
        mints: &[Pubkey],
        is_initializer: bool,
    ) -> Result<Vec<Instruction>, RpcError> {
        mints
            .iter()
            .enumerate()
            .map(|(i, mint)| self.program.deposit(depositor, escrow, mint, is_initializer, i as u8))
            .collect()
    }
}

#[async_trait]
impl<G: LedgerGateway> EscrowRpcClient for ProgramEscrowClient<G> {
    async fn initialize(
        &self,
        taker: &PeerIdentity,
        initializer_assets: &[AssetRef],
        taker_assets: &[AssetRef],
        timeout_secs: i64,
    ) -> Result<TxSignature, RpcError> {
        check_asset_count("initializer", initializer_assets.len())?;
        check_asset_count("taker", taker_assets.len())?;
        if timeout_secs != DEFAULT_ESCROW_TIMEOUT_SECS {
            warn!(
                requested = timeout_secs,
                fixed = DEFAULT_ESCROW_TIMEOUT_SECS,
                "escrow program uses a fixed timeout"
            );
        }

        let initializer = self.gateway.wallet();
        let taker = Self::pubkey(taker)?;
        let init_mints = Self::mints(initializer_assets)?;
        let taker_mints = Self::mints(taker_assets)?;
        let (escrow, _) = self.program.escrow_address(&initializer, &taker)?;

        let mut ixs = vec![self
            .program
            .initialize(&initializer, &taker, &init_mints, &taker_mints)?];
        ixs.extend(self.deposit_all(&initializer, &escrow, &init_mints, true)?);

        debug!(escrow = %escrow, instructions = ixs.len(), "submitting initialize");
        let sig = self.gateway.send(ixs).await?;
        info!(escrow = %escrow, signature = %sig, "escrow initialized");
        Ok(sig)
    }

    async fn deposit_and_collect(
        &self,
        initializer: &PeerIdentity,
        taker: &PeerIdentity,
        taker_assets: &[AssetRef],
    ) -> Result<TxSignature, RpcError> {
        check_asset_count("taker", taker_assets.len())?;
        let initializer = Self::pubkey(initializer)?;
        let taker = Self::pubkey(taker)?;
        self.require_signer(&taker, "deposit into")?;

        let (escrow, _) = self.program.escrow_address(&initializer, &taker)?;
        let data = self
            .gateway
            .get_account(&escrow)
            .await?
            .filter(|d| !is_closed(d))
            .ok_or(RpcError::AccountNotFound)?;
        let account = EscrowAccountData::decode(&data)?;
        let init_mints: Vec<Pubkey> = account
            .initializer_nft_mints
            .iter()
            .take(account.initializer_nft_count as usize)
            .map(|m| Pubkey::new(*m))
            .collect();

        let mut ixs = self.deposit_all(&taker, &escrow, &Self::mints(taker_assets)?, false)?;
        ixs.extend(self.complete_all(&taker, &escrow, &initializer, &init_mints, false)?);

        debug!(escrow = %escrow, instructions = ixs.len(), "submitting deposit and collect");
        let sig = self.gateway.send(ixs).await?;
        info!(escrow = %escrow, signature = %sig, "taker deposited and collected");
        Ok(sig)
    }

    async fn complete(
        &self,
        initializer: &PeerIdentity,
        taker: &PeerIdentity,
        is_initializer: bool,
        counterpart_assets: &[AssetRef],
    ) -> Result<TxSignature, RpcError> {
        check_asset_count("counterpart", counterpart_assets.len())?;
        let initializer = Self::pubkey(initializer)?;
        let taker = Self::pubkey(taker)?;
        let caller = if is_initializer { initializer } else { taker };
        self.require_signer(&caller, "complete")?;

        let (escrow, _) = self.program.escrow_address(&initializer, &taker)?;
        let mints = Self::mints(counterpart_assets)?;
        let ixs = self.complete_all(&caller, &escrow, &initializer, &mints, is_initializer)?;

        let sig = self.gateway.send(ixs).await?;
        info!(escrow = %escrow, signature = %sig, "escrow completed");
        Ok(sig)
    }

    async fn cancel(&self, initializer: &PeerIdentity, taker: &PeerIdentity) -> Result<TxSignature, RpcError> {
        let initializer = Self::pubkey(initializer)?;
        let taker = Self::pubkey(taker)?;
        self.require_signer(&initializer, "cancel")?;

        let (escrow, _) = self.program.escrow_address(&initializer, &taker)?;
        let sig = self
            .gateway
            .send(vec![self.program.cancel(&initializer, &escrow)?])
            .await?;
        info!(escrow = %escrow, signature = %sig, "escrow cancelled");
        Ok(sig)
    }

    async fn get_account_snapshot(
        &self,
        initializer: &PeerIdentity,
        taker: &PeerIdentity,
    ) -> Result<Option<EscrowAccountSnapshot>, RpcError> {
        let initializer = Self::pubkey(initializer)?;
        let taker = Self::pubkey(taker)?;
        let (escrow, _) = self.program.escrow_address(&initializer, &taker)?;

        match self.gateway.get_account(&escrow).await? {
            Some(data) if !is_closed(&data) => {
                let account = EscrowAccountData::decode(&data)?;
                Ok(Some(EscrowAccountSnapshot::from_account(escrow, &account)))
            }
            _ => Ok(None),
        }
    }
}
