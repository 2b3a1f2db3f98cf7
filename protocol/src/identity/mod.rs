//! # Identity Module
//!
//! Who is trading. Three layers:
//!
//! 1. **PeerIdentity**: the opaque wallet address the sync protocol uses for
//!    message origin filtering and tie-breaks.
//! 2. **Pubkey**: the same address as 32 raw bytes, needed by the escrow
//!    codec and address derivation.
//! 3. **WalletKeypair**: Ed25519 key material for simulations and tests.
//!    Production signing happens in the external wallet.

pub mod keypair;
pub mod peer;
pub mod pubkey;

pub use keypair::WalletKeypair;
pub use peer::PeerIdentity;
pub use pubkey::{Pubkey, PubkeyError, PUBKEY_LENGTH};
