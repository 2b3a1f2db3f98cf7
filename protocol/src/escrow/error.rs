use thiserror::Error;

/// Failures of escrow RPC calls and of local escrow encoding.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RpcError {
    /// The ledger endpoint could not be reached.
    #[error("ledger unreachable: {0}")]
    Transport(String),

    /// The wallet refused to sign.
    #[error("wallet rejected the transaction: {0}")]
    WalletRejected(String),

    /// The escrow program rejected the transaction.
    #[error("escrow program rejected the transaction: {0}")]
    ProgramRejected(String),

    /// A side holds a number of NFTs outside 1..=3.
    #[error("{side} side has {count} NFTs, allowed range is 1..=3")]
    InvalidAssetCount { side: &'static str, count: usize },

    /// An address or mint is not a valid public key.
    #[error("invalid address {0}")]
    InvalidAddress(String),

    /// The signer is not a party to this escrow, or not the right one.
    #[error("wallet {wallet} cannot {action} this escrow")]
    Unauthorized { wallet: String, action: &'static str },

    /// No program address could be derived for the seeds.
    #[error("no program address for these seeds")]
    NoProgramAddress,

    /// Instruction or account data could not be serialized.
    #[error("encoding failed: {0}")]
    Encode(String),

    /// Account data did not decode.
    #[error("escrow account data is malformed: {0}")]
    AccountDecode(String),

    /// The escrow account does not exist.
    #[error("escrow account not found")]
    AccountNotFound,
}

impl RpcError {
    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RpcError::Transport(_) | RpcError::WalletRejected(_))
    }
}
