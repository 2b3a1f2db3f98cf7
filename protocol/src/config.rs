//! # Protocol Configuration & Constants
//!
//! Every magic number of the swap protocol lives here: the per-side asset
//! bound, the escrow seed and program id, the wire event names, and the
//! default capacities of the channels the client driver allocates.
//!
//! Runtime-tunable knobs are collected in [`SwapConfig`]. The constants are
//! shared with the escrow program, so changing one of them means changing the
//! program too.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Version of the channel message set. Bumped whenever an event name or
/// payload shape changes.
pub const PROTOCOL_VERSION: &str = "1.0";

// ---------------------------------------------------------------------------
// Trade Limits
// ---------------------------------------------------------------------------

/// Maximum number of assets either party may put into a single trade.
/// The escrow account stores exactly three mint slots per side.
pub const MAX_ASSETS_PER_SIDE: usize = 3;

/// Minimum number of assets per side. An empty side is a gift, not a swap.
pub const MIN_ASSETS_PER_SIDE: usize = 1;

// ---------------------------------------------------------------------------
// Escrow Program
// ---------------------------------------------------------------------------

/// Default escrow window in seconds. After this the initializer may reclaim
/// deposits unilaterally.
pub const DEFAULT_ESCROW_TIMEOUT_SECS: i64 = 86_400;

/// Program id of the deployed swap escrow program (base58).
pub const DEFAULT_ESCROW_PROGRAM_ID: &str = "Fup37jJN7tFaBmdwNegtCHd8Z8ruuiSL5dt3hpEfJWEW";

/// First seed of the escrow program-derived address.
pub const ESCROW_SEED: &[u8] = b"escrow";

/// SPL token program (base58).
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// Associated token account program (base58).
pub const ASSOCIATED_TOKEN_PROGRAM_ID: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";

/// System program (base58).
pub const SYSTEM_PROGRAM_ID: &str = "11111111111111111111111111111111";

/// Rent sysvar (base58).
pub const RENT_SYSVAR_ID: &str = "SysvarRent111111111111111111111111111111111";

// ---------------------------------------------------------------------------
// Wire Event Names
// ---------------------------------------------------------------------------

pub const EVENT_PARTNER_WALLET_NEW: &str = "partner-wallet-new";
pub const EVENT_PARTNER_WALLET_RESPONSE: &str = "partner-wallet-response";
pub const EVENT_PARTNER_NFTS: &str = "partner-nfts";
pub const EVENT_TRADE_SLOTS: &str = "trade-slots";
pub const EVENT_SWAP_ACCEPTED: &str = "swap-accepted";
pub const EVENT_ESCROW_INITIALIZED: &str = "escrow-initialized";
pub const EVENT_ESCROW_DEPOSITED: &str = "escrow-deposited";
pub const EVENT_ESCROW_CANCELLED: &str = "escrow-cancelled";

/// Every event a paired client subscribes to on the shared topic.
pub const ALL_EVENTS: [&str; 8] = [
    EVENT_PARTNER_WALLET_NEW,
    EVENT_PARTNER_WALLET_RESPONSE,
    EVENT_PARTNER_NFTS,
    EVENT_TRADE_SLOTS,
    EVENT_SWAP_ACCEPTED,
    EVENT_ESCROW_INITIALIZED,
    EVENT_ESCROW_DEPOSITED,
    EVENT_ESCROW_CANCELLED,
];

// ---------------------------------------------------------------------------
// Driver Capacities
// ---------------------------------------------------------------------------

/// Broadcast capacity for UI events. Slow consumers lag rather than block
/// the protocol loop.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Bounded queue for user commands.
pub const DEFAULT_COMMAND_CAPACITY: usize = 64;

/// Bounded queue for settlement job outcomes flowing back to the driver.
pub const JOB_OUTCOME_CAPACITY: usize = 16;

/// Per-topic buffer in the in-memory transport.
pub const MEMORY_TOPIC_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Rejected configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("escrow timeout must be positive, got {0}s")]
    InvalidTimeout(i64),

    #[error("{name} capacity must be non-zero")]
    ZeroCapacity { name: &'static str },

    #[error("invalid escrow program id: {0}")]
    InvalidProgramId(String),
}

/// Tunables for a [`crate::client::SwapClient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapConfig {
    /// Escrow window passed to `initialize`.
    pub escrow_timeout_secs: i64,
    /// UI event broadcast capacity.
    pub event_capacity: usize,
    /// Command queue capacity.
    pub command_capacity: usize,
    /// Read the escrow account before calling `initialize` so a restarted
    /// client never creates a second escrow for the same pair.
    pub verify_before_initialize: bool,
    /// Escrow program id (base58).
    pub program_id: String,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            escrow_timeout_secs: DEFAULT_ESCROW_TIMEOUT_SECS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            verify_before_initialize: true,
            program_id: DEFAULT_ESCROW_PROGRAM_ID.to_string(),
        }
    }
}

impl SwapConfig {
    /// Checks every field and returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.escrow_timeout_secs <= 0 {
            return Err(ConfigError::InvalidTimeout(self.escrow_timeout_secs));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::ZeroCapacity { name: "event" });
        }
        if self.command_capacity == 0 {
            return Err(ConfigError::ZeroCapacity { name: "command" });
        }
        if self.program_id.parse::<crate::identity::Pubkey>().is_err() {
            return Err(ConfigError::InvalidProgramId(self.program_id.clone()));
        }
        Ok(())
    }
}
