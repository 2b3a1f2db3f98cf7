//! Ed25519 wallet keypairs.
//!
//! The swap core never signs anything itself; signing belongs to the external
//! wallet. Keypairs exist here so simulations and tests can mint realistic
//! wallet addresses and NFT mints instead of hand-written strings.
//!
//! `WalletKeypair` intentionally does NOT implement `Serialize`. Use
//! [`WalletKeypair::secret_key_bytes`] when you really mean it.

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;

use super::peer::PeerIdentity;
use super::pubkey::Pubkey;

/// A wallet signing key.
pub struct WalletKeypair {
    signing_key: SigningKey,
}

impl WalletKeypair {
    /// Fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic keypair from a 32-byte seed. Handy for reproducible
    /// simulations.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        Pubkey::new(self.signing_key.verifying_key().to_bytes())
    }

    /// The wallet address this keypair trades under.
    pub fn identity(&self) -> PeerIdentity {
        PeerIdentity::from(self.pubkey())
    }

    pub fn secret_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

impl Clone for WalletKeypair {
    fn clone(&self) -> Self {
        Self::from_seed(&self.signing_key.to_bytes())
    }
}

impl std::fmt::Debug for WalletKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the secret.
        f.debug_struct("WalletKeypair")
            .field("pubkey", &self.pubkey())
            .finish()
    }
}
