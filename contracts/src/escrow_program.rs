//! # Escrow Program
//!
//! An in-process rendition of the on-chain NFT escrow program. It executes
//! the same instructions [`swap_protocol::escrow::EscrowProgram`] builds, and
//! keeps the escrow accounts in their encoded byte form, so the client-side
//! codec is exercised end to end.
//!
//! The lifecycle of one escrow account:
//!
//! 1. **initialize**: the initializer creates the account at the pair's
//!    program address and records both mint lists.
//! 2. **deposit**: each party moves its NFTs into the vault, one per
//!    instruction.
//! 3. **complete**: each party collects the counterpart's NFTs from the
//!    vault. Both sides must have deposited everything first.
//! 4. The account closes once every NFT has been collected.
//!
//! Until the taker collects anything, the initializer may **cancel**: the
//! vault returns every deposited NFT and the account closes.
//!
//! A transaction is a list of instructions and is applied atomically: if one
//! instruction fails, none of them take effect.
//!
//! ## Collected Flags
//!
//! `<side>_nft_collected[i]` is set when the counterpart collects NFT `i` of
//! that side. `initializer_collected` and `taker_collected` are set when the
//! named party has collected all of the counterpart's NFTs.

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use swap_protocol::config::{DEFAULT_ESCROW_TIMEOUT_SECS, MAX_ASSETS_PER_SIDE};
use swap_protocol::escrow::pda::escrow_address;
use swap_protocol::escrow::{check_asset_count, instruction_discriminator, EscrowAccountData, Instruction};
use swap_protocol::identity::Pubkey;

/// Index of the first mint in an `initialize` account list.
const INITIALIZE_FIXED_ACCOUNTS: usize = 6;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons the program rejects an instruction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProgramError {
    /// The data does not start with a known method discriminator.
    #[error("unknown instruction")]
    UnknownInstruction,

    /// The instruction was addressed to another program.
    #[error("instruction addressed to program {0}")]
    WrongProgram(String),

    /// Missing accounts or undecodable arguments.
    #[error("malformed {op} instruction: {reason}")]
    Malformed { op: ProgramOp, reason: String },

    /// A required signer did not sign the transaction.
    #[error("missing signature of {0}")]
    MissingSignature(String),

    /// The escrow account is not at the address derived from its seeds.
    #[error("escrow address does not match the pair's program address")]
    BadEscrowAddress,

    #[error("escrow account already exists")]
    AlreadyInitialized,

    #[error("escrow account does not exist")]
    NotInitialized,

    /// The account is not the party the instruction claims.
    #[error("{0} is not that party of this escrow")]
    WrongParty(String),

    #[error("nft index {index} is out of range")]
    IndexOutOfRange { index: u8 },

    /// The mint account differs from the mint recorded at `index`.
    #[error("mint {mint} is not nft {index} of this escrow")]
    MintMismatch { mint: String, index: u8 },

    #[error("nft {index} is already deposited")]
    AlreadyDeposited { index: u8 },

    #[error("nft {index} is already collected")]
    AlreadyCollected { index: u8 },

    /// The depositor does not hold the NFT.
    #[error("{owner} does not hold mint {mint}")]
    NotHolder { owner: String, mint: String },

    /// `complete` before both sides finished depositing.
    #[error("both parties must deposit before completing")]
    DepositsIncomplete,

    /// `cancel` after the taker collected.
    #[error("the taker already collected; the escrow can no longer be cancelled")]
    AlreadyCollectedByTaker,

    /// Deposits and completes are refused once the timeout has passed.
    #[error("escrow expired at {expires_at}")]
    Expired { expires_at: i64 },

    /// Account bytes failed to encode or decode.
    #[error("account data: {0}")]
    AccountData(String),
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// The program's methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramOp {
    Initialize,
    Deposit,
    Complete,
    Cancel,
}

impl ProgramOp {
    pub const ALL: [ProgramOp; 4] = [
        ProgramOp::Initialize,
        ProgramOp::Deposit,
        ProgramOp::Complete,
        ProgramOp::Cancel,
    ];

    /// Method name, as hashed into the discriminator.
    pub fn name(&self) -> &'static str {
        match self {
            ProgramOp::Initialize => "initialize",
            ProgramOp::Deposit => "deposit",
            ProgramOp::Complete => "complete",
            ProgramOp::Cancel => "cancel",
        }
    }

    /// The method an instruction invokes, by discriminator.
    pub fn of(ix: &Instruction) -> Option<Self> {
        let disc = ix.discriminator()?;
        Self::ALL
            .into_iter()
            .find(|op| instruction_discriminator(op.name()) == disc)
    }
}

impl fmt::Display for ProgramOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Program State
// ---------------------------------------------------------------------------

/// One side's columns of an escrow account.
struct SideMut<'a> {
    count: u8,
    mints: &'a [[u8; 32]; MAX_ASSETS_PER_SIDE],
    deposited: &'a mut [bool; MAX_ASSETS_PER_SIDE],
    collected: &'a mut [bool; MAX_ASSETS_PER_SIDE],
    all_deposited: &'a mut bool,
}

fn side_mut(data: &mut EscrowAccountData, initializer: bool) -> SideMut<'_> {
    if initializer {
        SideMut {
            count: data.initializer_nft_count,
            mints: &data.initializer_nft_mints,
            deposited: &mut data.initializer_nft_deposited,
            collected: &mut data.initializer_nft_collected,
            all_deposited: &mut data.initializer_deposited,
        }
    } else {
        SideMut {
            count: data.taker_nft_count,
            mints: &data.taker_nft_mints,
            deposited: &mut data.taker_nft_deposited,
            collected: &mut data.taker_nft_collected,
            all_deposited: &mut data.taker_deposited,
        }
    }
}

/// Accounts and NFT custody of one deployed escrow program.
#[derive(Debug, Clone)]
pub struct ProgramState {
    program_id: Pubkey,
    /// Escrow accounts in encoded form, keyed by address.
    accounts: HashMap<Pubkey, Vec<u8>>,
    /// Current holder of every known mint. The vault of an escrow is the
    /// escrow address itself.
    holders: HashMap<Pubkey, Pubkey>,
}

impl ProgramState {
    pub fn new(program_id: Pubkey) -> Self {
        Self {
            program_id,
            accounts: HashMap::new(),
            holders: HashMap::new(),
        }
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    /// Records `owner` as the holder of `mint`.
    pub fn set_holder(&mut self, mint: Pubkey, owner: Pubkey) {
        self.holders.insert(mint, owner);
    }

    pub fn holder(&self, mint: &Pubkey) -> Option<Pubkey> {
        self.holders.get(mint).copied()
    }

    /// Every mint `owner` holds, in no particular order.
    pub fn holdings(&self, owner: &Pubkey) -> Vec<Pubkey> {
        self.holders
            .iter()
            .filter(|(_, holder)| *holder == owner)
            .map(|(mint, _)| *mint)
            .collect()
    }

    pub fn account(&self, address: &Pubkey) -> Option<&[u8]> {
        self.accounts.get(address).map(Vec::as_slice)
    }

    /// Number of open escrow accounts.
    pub fn open_escrows(&self) -> usize {
        self.accounts.len()
    }

    /// Applies a transaction signed by `signer` at unix time `now`.
    /// Returns the executed methods in order.
    pub fn execute(
        &mut self,
        signer: &Pubkey,
        instructions: &[Instruction],
        now: i64,
    ) -> Result<Vec<ProgramOp>, ProgramError> {
        let mut next = self.clone();
        let mut ops = Vec::with_capacity(instructions.len());
        for ix in instructions {
            ops.push(next.apply(signer, ix, now)?);
        }
        *self = next;
        Ok(ops)
    }

    fn apply(&mut self, signer: &Pubkey, ix: &Instruction, now: i64) -> Result<ProgramOp, ProgramError> {
        if ix.program_id != self.program_id {
            return Err(ProgramError::WrongProgram(ix.program_id.to_string()));
        }
        let op = ProgramOp::of(ix).ok_or(ProgramError::UnknownInstruction)?;
        match op {
            ProgramOp::Initialize => self.initialize(signer, ix, now)?,
            ProgramOp::Deposit => self.deposit(signer, ix, now)?,
            ProgramOp::Complete => self.complete(signer, ix, now)?,
            ProgramOp::Cancel => self.cancel(signer, ix)?,
        }
        Ok(op)
    }

    // -----------------------------------------------------------------------
    // Methods
    // -----------------------------------------------------------------------

    fn initialize(&mut self, signer: &Pubkey, ix: &Instruction, now: i64) -> Result<(), ProgramError> {
        let op = ProgramOp::Initialize;
        let initializer = account_at(ix, 0, op)?;
        require_signer(signer, &initializer)?;
        let taker = account_at(ix, 1, op)?;
        let escrow = account_at(ix, 2, op)?;
        let (init_count, taker_count, bump): (u8, u8, u8) = decode_args(ix, op)?;

        for (side, count) in [("initializer", init_count), ("taker", taker_count)] {
            check_asset_count(side, count as usize).map_err(|e| ProgramError::Malformed {
                op,
                reason: e.to_string(),
            })?;
        }
        match escrow_address(&self.program_id, &initializer, &taker) {
            Some((address, expected_bump)) if address == escrow && expected_bump == bump => {}
            _ => return Err(ProgramError::BadEscrowAddress),
        }
        if self.accounts.contains_key(&escrow) {
            return Err(ProgramError::AlreadyInitialized);
        }

        let mints: Vec<Pubkey> = ix
            .accounts
            .iter()
            .skip(INITIALIZE_FIXED_ACCOUNTS)
            .map(|m| m.pubkey)
            .collect();
        let (init_n, taker_n) = (init_count as usize, taker_count as usize);
        if mints.len() != init_n + taker_n {
            return Err(ProgramError::Malformed {
                op,
                reason: format!("expected {} mint accounts, got {}", init_n + taker_n, mints.len()),
            });
        }

        let mut data = EscrowAccountData {
            initializer: initializer.to_bytes(),
            taker: taker.to_bytes(),
            initializer_nft_count: init_count,
            taker_nft_count: taker_count,
            is_initialized: true,
            bump,
            created_at: now,
            timeout_in_seconds: DEFAULT_ESCROW_TIMEOUT_SECS,
            ..EscrowAccountData::default()
        };
        for (slot, mint) in data.initializer_nft_mints.iter_mut().zip(&mints[..init_n]) {
            *slot = mint.to_bytes();
        }
        for (slot, mint) in data.taker_nft_mints.iter_mut().zip(&mints[init_n..]) {
            *slot = mint.to_bytes();
        }
        self.store(escrow, &data)
    }

    fn deposit(&mut self, signer: &Pubkey, ix: &Instruction, now: i64) -> Result<(), ProgramError> {
        let op = ProgramOp::Deposit;
        let depositor = account_at(ix, 0, op)?;
        require_signer(signer, &depositor)?;
        let escrow = account_at(ix, 1, op)?;
        let mint = account_at(ix, 2, op)?;
        let (is_initializer, index): (bool, u8) = decode_args(ix, op)?;

        let mut data = self.load(&escrow)?;
        check_live(&data, now)?;
        let party = if is_initializer { data.initializer } else { data.taker };
        if party != depositor.to_bytes() {
            return Err(ProgramError::WrongParty(depositor.to_string()));
        }
        if self.holder(&mint) != Some(depositor) {
            return Err(ProgramError::NotHolder {
                owner: depositor.to_string(),
                mint: mint.to_string(),
            });
        }

        let side = side_mut(&mut data, is_initializer);
        let i = check_slot(side.count, side.mints, index, &mint)?;
        if side.deposited[i] {
            return Err(ProgramError::AlreadyDeposited { index });
        }
        side.deposited[i] = true;
        *side.all_deposited = side.deposited.iter().take(side.count as usize).all(|&d| d);

        self.holders.insert(mint, escrow);
        self.store(escrow, &data)
    }

    fn complete(&mut self, signer: &Pubkey, ix: &Instruction, now: i64) -> Result<(), ProgramError> {
        let op = ProgramOp::Complete;
        let caller = account_at(ix, 0, op)?;
        require_signer(signer, &caller)?;
        let escrow = account_at(ix, 1, op)?;
        let mint = account_at(ix, 3, op)?;
        let (caller_is_initializer, index): (bool, u8) = decode_args(ix, op)?;

        let mut data = self.load(&escrow)?;
        check_live(&data, now)?;
        let party = if caller_is_initializer { data.initializer } else { data.taker };
        if party != caller.to_bytes() {
            return Err(ProgramError::WrongParty(caller.to_string()));
        }
        if !(data.initializer_deposited && data.taker_deposited) {
            return Err(ProgramError::DepositsIncomplete);
        }

        // The caller collects from the other side's columns.
        let side = side_mut(&mut data, !caller_is_initializer);
        let i = check_slot(side.count, side.mints, index, &mint)?;
        if side.collected[i] {
            return Err(ProgramError::AlreadyCollected { index });
        }
        side.collected[i] = true;
        let side_done = side.collected.iter().take(side.count as usize).all(|&c| c);
        if caller_is_initializer {
            data.initializer_collected = side_done;
        } else {
            data.taker_collected = side_done;
        }

        self.holders.insert(mint, caller);
        if data.initializer_collected && data.taker_collected {
            self.accounts.remove(&escrow);
            return Ok(());
        }
        self.store(escrow, &data)
    }

    fn cancel(&mut self, signer: &Pubkey, ix: &Instruction) -> Result<(), ProgramError> {
        let op = ProgramOp::Cancel;
        let escrow = account_at(ix, 0, op)?;
        let initializer = account_at(ix, 1, op)?;
        require_signer(signer, &initializer)?;

        let mut data = self.load(&escrow)?;
        if data.initializer != initializer.to_bytes() {
            return Err(ProgramError::WrongParty(initializer.to_string()));
        }
        if data.initializer_nft_collected.iter().any(|&c| c) {
            return Err(ProgramError::AlreadyCollectedByTaker);
        }

        // Return everything still in the vault to its depositor.
        for is_initializer in [true, false] {
            let owner = Pubkey::new(if is_initializer { data.initializer } else { data.taker });
            let side = side_mut(&mut data, is_initializer);
            for i in 0..side.count as usize {
                if side.deposited[i] && !side.collected[i] {
                    self.holders.insert(Pubkey::new(side.mints[i]), owner);
                }
            }
        }
        self.accounts.remove(&escrow);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn load(&self, address: &Pubkey) -> Result<EscrowAccountData, ProgramError> {
        let bytes = self.accounts.get(address).ok_or(ProgramError::NotInitialized)?;
        EscrowAccountData::decode(bytes).map_err(|e| ProgramError::AccountData(e.to_string()))
    }

    fn store(&mut self, address: Pubkey, data: &EscrowAccountData) -> Result<(), ProgramError> {
        let bytes = data
            .encode()
            .map_err(|e| ProgramError::AccountData(e.to_string()))?;
        self.accounts.insert(address, bytes);
        Ok(())
    }
}

fn account_at(ix: &Instruction, index: usize, op: ProgramOp) -> Result<Pubkey, ProgramError> {
    ix.accounts
        .get(index)
        .map(|meta| meta.pubkey)
        .ok_or_else(|| ProgramError::Malformed {
            op,
            reason: format!("missing account #{}", index),
        })
}

fn require_signer(signer: &Pubkey, required: &Pubkey) -> Result<(), ProgramError> {
    if signer == required {
        Ok(())
    } else {
        Err(ProgramError::MissingSignature(required.to_string()))
    }
}

fn decode_args<T: DeserializeOwned>(ix: &Instruction, op: ProgramOp) -> Result<T, ProgramError> {
    bincode::deserialize(ix.args()).map_err(|e| ProgramError::Malformed {
        op,
        reason: e.to_string(),
    })
}

fn check_live(data: &EscrowAccountData, now: i64) -> Result<(), ProgramError> {
    let expires_at = data.created_at.saturating_add(data.timeout_in_seconds);
    if now > expires_at {
        return Err(ProgramError::Expired { expires_at });
    }
    Ok(())
}

/// Validates `index` against the side's count and recorded mint.
fn check_slot(
    count: u8,
    mints: &[[u8; 32]; MAX_ASSETS_PER_SIDE],
    index: u8,
    mint: &Pubkey,
) -> Result<usize, ProgramError> {
    let i = index as usize;
    if index >= count || i >= MAX_ASSETS_PER_SIDE {
        return Err(ProgramError::IndexOutOfRange { index });
    }
    if mints[i] != mint.to_bytes() {
        return Err(ProgramError::MintMismatch {
            mint: mint.to_string(),
            index,
        });
    }
    Ok(i)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use swap_protocol::config::DEFAULT_ESCROW_PROGRAM_ID;
    use swap_protocol::escrow::EscrowProgram;
    use swap_protocol::identity::WalletKeypair;

    const NOW: i64 = 1_700_000_000;

    struct Fixture {
        state: ProgramState,
        program: EscrowProgram,
        alice: Pubkey,
        bob: Pubkey,
        escrow: Pubkey,
        a_mints: Vec<Pubkey>,
        b_mints: Vec<Pubkey>,
    }

    fn key() -> Pubkey {
        WalletKeypair::generate().pubkey()
    }

    /// Alice (initializer) offers one NFT, Bob (taker) two.
    fn fixture() -> Fixture {
        let program_id: Pubkey = DEFAULT_ESCROW_PROGRAM_ID.parse().unwrap();
        let mut state = ProgramState::new(program_id);
        let program = EscrowProgram::new(program_id);
        let (alice, bob) = (key(), key());
        let a_mints = vec![key()];
        let b_mints = vec![key(), key()];
        for m in &a_mints {
            state.set_holder(*m, alice);
        }
        for m in &b_mints {
            state.set_holder(*m, bob);
        }
        let (escrow, _) = program.escrow_address(&alice, &bob).unwrap();
        Fixture {
            state,
            program,
            alice,
            bob,
            escrow,
            a_mints,
            b_mints,
        }
    }

    impl Fixture {
        fn initialize_ix(&self) -> Instruction {
            self.program
                .initialize(&self.alice, &self.bob, &self.a_mints, &self.b_mints)
                .unwrap()
        }

        fn deposits(&self, initializer: bool) -> Vec<Instruction> {
            let (who, mints) = if initializer {
                (self.alice, &self.a_mints)
            } else {
                (self.bob, &self.b_mints)
            };
            mints
                .iter()
                .enumerate()
                .map(|(i, m)| self.program.deposit(&who, &self.escrow, m, initializer, i as u8).unwrap())
                .collect()
        }

        fn completes(&self, initializer: bool) -> Vec<Instruction> {
            let (who, mints) = if initializer {
                (self.alice, &self.b_mints)
            } else {
                (self.bob, &self.a_mints)
            };
            mints
                .iter()
                .enumerate()
                .map(|(i, m)| {
                    self.program
                        .complete(&who, &self.escrow, &self.alice, m, initializer, i as u8)
                        .unwrap()
                })
                .collect()
        }

        fn initialized(mut self) -> Self {
            let mut tx = vec![self.initialize_ix()];
            tx.extend(self.deposits(true));
            let alice = self.alice;
            self.state.execute(&alice, &tx, NOW).unwrap();
            self
        }

        fn snapshot(&self) -> EscrowAccountData {
            EscrowAccountData::decode(self.state.account(&self.escrow).unwrap()).unwrap()
        }
    }

    #[test]
    fn full_swap_moves_every_nft_and_closes() {
        let mut f = fixture().initialized();
        let snap = f.snapshot();
        assert!(snap.initializer_deposited);
        assert!(!snap.taker_deposited);
        assert_eq!(f.state.holder(&f.a_mints[0]), Some(f.escrow));

        let mut tx = f.deposits(false);
        tx.extend(f.completes(false));
        let bob = f.bob;
        let ops = f.state.execute(&bob, &tx, NOW + 10).unwrap();
        assert_eq!(ops, vec![ProgramOp::Deposit, ProgramOp::Deposit, ProgramOp::Complete]);
        assert_eq!(f.state.holder(&f.a_mints[0]), Some(f.bob));
        assert!(f.snapshot().taker_collected);

        let tx = f.completes(true);
        let alice = f.alice;
        f.state.execute(&alice, &tx, NOW + 20).unwrap();
        for m in &f.b_mints {
            assert_eq!(f.state.holder(m), Some(f.alice));
        }
        assert!(f.state.account(&f.escrow).is_none());
        assert_eq!(f.state.open_escrows(), 0);
    }

    #[test]
    fn second_initialize_for_the_pair_fails() {
        let mut f = fixture().initialized();
        let ix = f.initialize_ix();
        let alice = f.alice;
        assert_eq!(
            f.state.execute(&alice, &[ix], NOW),
            Err(ProgramError::AlreadyInitialized)
        );
    }

    #[test]
    fn complete_before_taker_deposit_is_rejected() {
        let mut f = fixture().initialized();
        let tx = f.completes(true);
        let alice = f.alice;
        assert_eq!(
            f.state.execute(&alice, &tx, NOW),
            Err(ProgramError::DepositsIncomplete)
        );
    }

    #[test]
    fn failed_instruction_rolls_back_the_transaction() {
        let mut f = fixture().initialized();
        // Bob's deposits are fine; the complete for a wrong index is not.
        let mut tx = f.deposits(false);
        tx.push(
            f.program
                .complete(&f.bob, &f.escrow, &f.alice, &f.a_mints[0], false, 2)
                .unwrap(),
        );
        let bob = f.bob;
        assert_eq!(
            f.state.execute(&bob, &tx, NOW),
            Err(ProgramError::IndexOutOfRange { index: 2 })
        );
        assert!(!f.snapshot().taker_deposited);
        assert_eq!(f.state.holder(&f.b_mints[0]), Some(f.bob));
    }

    #[test]
    fn only_the_initializer_signs_cancel() {
        let mut f = fixture().initialized();
        let ix = f.program.cancel(&f.alice, &f.escrow).unwrap();
        let bob = f.bob;
        assert!(matches!(
            f.state.execute(&bob, &[ix.clone()], NOW),
            Err(ProgramError::MissingSignature(_))
        ));

        let alice = f.alice;
        f.state.execute(&alice, &[ix], NOW).unwrap();
        assert_eq!(f.state.holder(&f.a_mints[0]), Some(f.alice));
        assert!(f.state.account(&f.escrow).is_none());
    }

    #[test]
    fn cancel_after_taker_collected_is_rejected() {
        let mut f = fixture().initialized();
        let mut tx = f.deposits(false);
        tx.extend(f.completes(false));
        let bob = f.bob;
        f.state.execute(&bob, &tx, NOW).unwrap();

        let ix = f.program.cancel(&f.alice, &f.escrow).unwrap();
        let alice = f.alice;
        assert_eq!(
            f.state.execute(&alice, &[ix], NOW),
            Err(ProgramError::AlreadyCollectedByTaker)
        );
    }

    #[test]
    fn deposits_after_expiry_are_rejected() {
        let mut f = fixture().initialized();
        let tx = f.deposits(false);
        let bob = f.bob;
        let late = NOW + DEFAULT_ESCROW_TIMEOUT_SECS + 1;
        assert!(matches!(
            f.state.execute(&bob, &tx, late),
            Err(ProgramError::Expired { .. })
        ));
    }

    #[test]
    fn depositing_an_nft_you_do_not_hold_fails() {
        let mut f = fixture().initialized();
        // Hand one of Bob's NFTs to a stranger before he deposits.
        let stranger = key();
        f.state.set_holder(f.b_mints[1], stranger);
        let tx = f.deposits(false);
        let bob = f.bob;
        assert!(matches!(
            f.state.execute(&bob, &tx, NOW),
            Err(ProgramError::NotHolder { .. })
        ));
    }

    #[test]
    fn instruction_for_another_program_is_rejected() {
        let mut f = fixture();
        let mut ix = f.initialize_ix();
        ix.program_id = key();
        let alice = f.alice;
        assert!(matches!(
            f.state.execute(&alice, &[ix], NOW),
            Err(ProgramError::WrongProgram(_))
        ));
    }

    #[test]
    fn op_is_recognized_from_discriminator() {
        let f = fixture();
        assert_eq!(ProgramOp::of(&f.initialize_ix()), Some(ProgramOp::Initialize));
        assert_eq!(ProgramOp::of(&f.deposits(true)[0]), Some(ProgramOp::Deposit));
    }
}
