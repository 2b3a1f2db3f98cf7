//! Escrow program instructions.
//!
//! Each instruction is an 8-byte method discriminator
//! (`sha256("global:<method>")[..8]`) followed by the fixed-width arguments,
//! plus the ordered account list the program's handlers expect.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{
    ASSOCIATED_TOKEN_PROGRAM_ID, MAX_ASSETS_PER_SIDE, MIN_ASSETS_PER_SIDE, RENT_SYSVAR_ID,
    SYSTEM_PROGRAM_ID, TOKEN_PROGRAM_ID,
};
use crate::identity::Pubkey;

use super::error::RpcError;
use super::pda;

/// One account reference of an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn writable(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    pub fn readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

/// A program invocation ready to be put into a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

impl Instruction {
    /// Leading 8 bytes of `data`.
    pub fn discriminator(&self) -> Option<[u8; 8]> {
        let mut out = [0u8; 8];
        out.copy_from_slice(self.data.get(..8)?);
        Some(out)
    }

    /// Instruction arguments after the discriminator.
    pub fn args(&self) -> &[u8] {
        self.data.get(8..).unwrap_or(&[])
    }
}

/// Method discriminator for `name`.
pub fn instruction_discriminator(name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("global:{}", name).as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

fn encode<A: Serialize>(name: &str, args: &A) -> Result<Vec<u8>, RpcError> {
    let mut data = instruction_discriminator(name).to_vec();
    let body = bincode::serialize(args).map_err(|e| RpcError::Encode(e.to_string()))?;
    data.extend_from_slice(&body);
    Ok(data)
}

/// Validates a side's NFT count against the escrow's bounds.
pub fn check_asset_count(side: &'static str, count: usize) -> Result<(), RpcError> {
    if (MIN_ASSETS_PER_SIDE..=MAX_ASSETS_PER_SIDE).contains(&count) {
        Ok(())
    } else {
        Err(RpcError::InvalidAssetCount { side, count })
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builds instructions for one deployment of the escrow program.
#[derive(Debug, Clone)]
pub struct EscrowProgram {
    program_id: Pubkey,
    token_program: Pubkey,
    associated_token_program: Pubkey,
    system_program: Pubkey,
    rent_sysvar: Pubkey,
}

impl EscrowProgram {
    pub fn new(program_id: Pubkey) -> Self {
        Self {
            program_id,
            token_program: Pubkey::from_static(TOKEN_PROGRAM_ID),
            associated_token_program: Pubkey::from_static(ASSOCIATED_TOKEN_PROGRAM_ID),
            system_program: Pubkey::from_static(SYSTEM_PROGRAM_ID),
            rent_sysvar: Pubkey::from_static(RENT_SYSVAR_ID),
        }
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    /// Escrow address and bump for the pair.
    pub fn escrow_address(&self, initializer: &Pubkey, taker: &Pubkey) -> Result<(Pubkey, u8), RpcError> {
        pda::escrow_address(&self.program_id, initializer, taker).ok_or(RpcError::NoProgramAddress)
    }

    fn token_account(owner: &Pubkey, mint: &Pubkey) -> Result<Pubkey, RpcError> {
        pda::associated_token_address(owner, mint).ok_or(RpcError::NoProgramAddress)
    }

    /// `initialize(initializer_nft_count, taker_nft_count, bump)`.
    ///
    /// Mints travel as trailing read-only accounts, initializer's first.
    pub fn initialize(
        &self,
        initializer: &Pubkey,
        taker: &Pubkey,
        initializer_mints: &[Pubkey],
        taker_mints: &[Pubkey],
    ) -> Result<Instruction, RpcError> {
        check_asset_count("initializer", initializer_mints.len())?;
        check_asset_count("taker", taker_mints.len())?;
        let (escrow, bump) = self.escrow_address(initializer, taker)?;

        let mut accounts = vec![
            AccountMeta::writable(*initializer, true),
            AccountMeta::readonly(*taker, false),
            AccountMeta::writable(escrow, false),
            AccountMeta::readonly(self.system_program, false),
            AccountMeta::readonly(self.token_program, false),
            AccountMeta::readonly(self.rent_sysvar, false),
        ];
        accounts.extend(
            initializer_mints
                .iter()
                .chain(taker_mints)
                .map(|m| AccountMeta::readonly(*m, false)),
        );

        let args = (initializer_mints.len() as u8, taker_mints.len() as u8, bump);
        Ok(Instruction {
            program_id: self.program_id,
            accounts,
            data: encode("initialize", &args)?,
        })
    }

    /// `deposit(is_initializer, nft_index)`: moves one NFT from the
    /// depositor's token account into the escrow vault.
    pub fn deposit(
        &self,
        depositor: &Pubkey,
        escrow: &Pubkey,
        mint: &Pubkey,
        is_initializer: bool,
        nft_index: u8,
    ) -> Result<Instruction, RpcError> {
        let accounts = vec![
            AccountMeta::writable(*depositor, true),
            AccountMeta::writable(*escrow, false),
            AccountMeta::readonly(*mint, false),
            AccountMeta::writable(Self::token_account(depositor, mint)?, false),
            AccountMeta::writable(Self::token_account(escrow, mint)?, false),
            AccountMeta::readonly(self.token_program, false),
            AccountMeta::readonly(self.associated_token_program, false),
            AccountMeta::readonly(self.system_program, false),
        ];
        Ok(Instruction {
            program_id: self.program_id,
            accounts,
            data: encode("deposit", &(is_initializer, nft_index))?,
        })
    }

    /// `complete(is_initializer, nft_index)`: moves one of the counterpart's
    /// NFTs from the vault to the caller. `is_initializer` describes the
    /// caller.
    pub fn complete(
        &self,
        caller: &Pubkey,
        escrow: &Pubkey,
        initializer: &Pubkey,
        mint: &Pubkey,
        is_initializer: bool,
        nft_index: u8,
    ) -> Result<Instruction, RpcError> {
        let accounts = vec![
            AccountMeta::writable(*caller, true),
            AccountMeta::writable(*escrow, false),
            AccountMeta::writable(*initializer, false),
            AccountMeta::readonly(*mint, false),
            AccountMeta::writable(Self::token_account(escrow, mint)?, false),
            AccountMeta::writable(Self::token_account(caller, mint)?, false),
            AccountMeta::readonly(self.token_program, false),
            AccountMeta::readonly(self.associated_token_program, false),
            AccountMeta::readonly(self.system_program, false),
        ];
        Ok(Instruction {
            program_id: self.program_id,
            accounts,
            data: encode("complete", &(is_initializer, nft_index))?,
        })
    }

    /// `cancel()`: closes the escrow; only the initializer signs.
    pub fn cancel(&self, initializer: &Pubkey, escrow: &Pubkey) -> Result<Instruction, RpcError> {
        Ok(Instruction {
            program_id: self.program_id,
            accounts: vec![
                AccountMeta::writable(*escrow, false),
                AccountMeta::writable(*initializer, true),
            ],
            data: encode("cancel", &())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_ESCROW_PROGRAM_ID;
    use crate::identity::WalletKeypair;

    fn key(seed: u8) -> Pubkey {
        WalletKeypair::from_seed(&[seed; 32]).pubkey()
    }

    fn program() -> EscrowProgram {
        EscrowProgram::new(DEFAULT_ESCROW_PROGRAM_ID.parse().unwrap())
    }

    #[test]
    fn discriminators_are_distinct() {
        let names = ["initialize", "deposit", "complete", "cancel"];
        let discs: std::collections::HashSet<[u8; 8]> =
            names.iter().map(|n| instruction_discriminator(n)).collect();
        assert_eq!(discs.len(), names.len());
    }

    #[test]
    fn initialize_encodes_counts_and_bump() {
        let (a, b) = (key(1), key(2));
        let ix = program()
            .initialize(&a, &b, &[key(10)], &[key(20), key(21)])
            .unwrap();
        let (_, bump) = program().escrow_address(&a, &b).unwrap();

        assert_eq!(ix.discriminator(), Some(instruction_discriminator("initialize")));
        assert_eq!(ix.args(), &[1, 2, bump]);
        assert_eq!(ix.accounts.len(), 6 + 3);
        assert!(ix.accounts[0].is_signer);
        assert_eq!(ix.accounts[6].pubkey, key(10));
        assert_eq!(ix.accounts[8].pubkey, key(21));
    }

    #[test]
    fn initialize_rejects_bad_counts() {
        let (a, b) = (key(1), key(2));
        let four: Vec<Pubkey> = (10..14).map(key).collect();
        assert_eq!(
            program().initialize(&a, &b, &four, &[key(20)]),
            Err(RpcError::InvalidAssetCount {
                side: "initializer",
                count: 4
            })
        );
        assert_eq!(
            program().initialize(&a, &b, &[key(10)], &[]),
            Err(RpcError::InvalidAssetCount {
                side: "taker",
                count: 0
            })
        );
    }

    #[test]
    fn deposit_args_are_flag_and_index() {
        let ix = program()
            .deposit(&key(2), &key(3), &key(20), false, 1)
            .unwrap();
        assert_eq!(ix.args(), &[0, 1]);
        assert_eq!(ix.accounts[0].pubkey, key(2));
        assert!(ix.accounts[0].is_signer);
    }

    #[test]
    fn cancel_has_no_args() {
        let ix = program().cancel(&key(1), &key(3)).unwrap();
        assert!(ix.args().is_empty());
        assert!(ix.accounts[1].is_signer);
    }
}
