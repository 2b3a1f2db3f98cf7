//! Program-derived addresses.
//!
//! The escrow account lives at the program address derived from
//! `["escrow", initializer, taker]`, and every NFT moves through associated
//! token accounts. Both are pure functions of their inputs, so either party
//! can locate an escrow without talking to the other.
//!
//! A program address is `sha256(seeds || bump || program_id ||
//! "ProgramDerivedAddress")`, retried with bumps from 255 downwards until the
//! hash is not a valid ed25519 point (nobody can hold a key for it).

use curve25519_dalek::edwards::CompressedEdwardsY;
use sha2::{Digest, Sha256};

use crate::config::{ASSOCIATED_TOKEN_PROGRAM_ID, ESCROW_SEED, TOKEN_PROGRAM_ID};
use crate::identity::Pubkey;

const MAX_SEEDS: usize = 16;
const MAX_SEED_LEN: usize = 32;
const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Whether 32 bytes decode to a point on the ed25519 curve.
pub fn is_on_curve(bytes: &[u8; 32]) -> bool {
    CompressedEdwardsY(*bytes).decompress().is_some()
}

/// Hashes `seeds` into a program address. Fails when the result is on the
/// curve or the seeds are out of bounds.
pub fn create_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Option<Pubkey> {
    if seeds.len() > MAX_SEEDS || seeds.iter().any(|s| s.len() > MAX_SEED_LEN) {
        return None;
    }
    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update(program_id.as_bytes());
    hasher.update(PDA_MARKER);
    let digest = hasher.finalize();

    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    if is_on_curve(&bytes) {
        None
    } else {
        Some(Pubkey::new(bytes))
    }
}

/// First off-curve address for `seeds`, searching bumps 255..=0.
pub fn find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Option<(Pubkey, u8)> {
    if seeds.len() >= MAX_SEEDS {
        return None;
    }
    for bump in (0..=u8::MAX).rev() {
        let bump_seed = [bump];
        let mut with_bump: Vec<&[u8]> = seeds.to_vec();
        with_bump.push(&bump_seed);
        if let Some(address) = create_program_address(&with_bump, program_id) {
            return Some((address, bump));
        }
    }
    None
}

/// Escrow account address and bump for an initializer/taker pair.
///
/// The pair is ordered: swapping the parties yields a different escrow.
pub fn escrow_address(
    program_id: &Pubkey,
    initializer: &Pubkey,
    taker: &Pubkey,
) -> Option<(Pubkey, u8)> {
    find_program_address(
        &[ESCROW_SEED, &initializer.as_bytes()[..], &taker.as_bytes()[..]],
        program_id,
    )
}

/// The associated token account holding `mint` for `owner`.
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Option<Pubkey> {
    let token_program = Pubkey::from_static(TOKEN_PROGRAM_ID);
    let ata_program = Pubkey::from_static(ASSOCIATED_TOKEN_PROGRAM_ID);
    find_program_address(
        &[
            &owner.as_bytes()[..],
            &token_program.as_bytes()[..],
            &mint.as_bytes()[..],
        ],
        &ata_program,
    )
    .map(|(address, _)| address)
}
