//! Top-level error of the client API.

use thiserror::Error;

use crate::channel::TransportError;
use crate::config::ConfigError;
use crate::escrow::RpcError;
use crate::settlement::SettlementError;
use crate::sync::SyncError;

/// Everything a [`crate::SwapHandle`] call can fail with.
#[derive(Debug, Error)]
pub enum SwapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Settlement(#[from] SettlementError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// The operation needs a joined channel.
    #[error("not connected to a trade channel")]
    NotJoined,

    /// The client task has stopped.
    #[error("swap client stopped")]
    ClientStopped,
}

impl SwapError {
    /// Whether trying again later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SwapError::Transport(_) => true,
            SwapError::Settlement(e) => e.is_retryable(),
            SwapError::Rpc(e) => e.is_retryable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SwapError>;
