use log::{debug, info};
use solana_client::rpc_client::RpcClient;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    system_program,
    transaction::Transaction,
};
use solana_transaction_status::{EncodedConfirmedTransactionWithStatusMeta, UiTransactionEncoding};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account,
};
use std::sync::Arc;

use crate::{
    asset::Asset,
    constants::{
        escrow_program_id, fee_wallet, jup_mint, usdc_mint, ACCOUNT_ESCROW_STATE, BPS_DENOMINATOR,
        ESCROW_SEED, FEE_BPS, IX_DEPOSIT_STABLE, IX_DISTRIBUTE_STABLE, IX_INITIALIZE,
        IX_PURCHASE_WITH_SOL_AUTO, IX_PURCHASE_WITH_TOKEN_AUTO, IX_SET_ACTIVE,
        NATIVE_FEE_RESERVE_LAMPORTS,
    },
    errors::RelayerError,
};

/// Snapshot of the escrow program's singleton state account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowState {
    pub admin: Pubkey,
    pub is_active: bool,
    pub total_native_received: u64,
    pub total_fees_collected: u64,
    pub total_stable_distributed: u64,
}

impl EscrowState {
    /// Parses the fixed account layout: 8-byte discriminator, admin pubkey,
    /// active flag, three cumulative counters.
    pub fn from_account_data(data: &[u8]) -> Option<Self> {
        if data.len() < 8 + 32 + 1 + 24 || data[..8] != ACCOUNT_ESCROW_STATE {
            return None;
        }
        let admin = Pubkey::new_from_array(data[8..40].try_into().ok()?);
        let is_active = data[40] != 0;
        let read_u64 =
            |offset: usize| -> Option<u64> { Some(u64::from_le_bytes(data.get(offset..offset + 8)?.try_into().ok()?)) };
        Some(Self {
            admin,
            is_active,
            total_native_received: read_u64(41)?,
            total_fees_collected: read_u64(49)?,
            total_stable_distributed: read_u64(57)?,
        })
    }
}

/// Deterministic fixed-rate figures shown to the user before submission.
/// Actual settlement uses a live quote and may differ; callers must label
/// this as an estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpectedOutput {
    pub fee: u64,
    pub net_amount: u64,
    pub expected_stable: u64,
    pub rate: f64,
}

#[derive(Debug, Clone)]
pub struct PurchaseReceipt {
    pub signature: Signature,
    pub estimate: ExpectedOutput,
}

/// Rejects amounts outside the configured per-asset bounds before any
/// transaction is built.
pub fn validate_amount(asset: Asset, amount: u64) -> Result<(), RelayerError> {
    if amount == 0 {
        return Err(RelayerError::InvalidAmount(format!(
            "{} amount must be positive",
            asset.symbol()
        )));
    }
    if amount < asset.min_amount() || amount > asset.max_amount() {
        return Err(RelayerError::InvalidAmount(format!(
            "{} amount {} outside [{}, {}]",
            asset.symbol(),
            amount,
            asset.min_amount(),
            asset.max_amount()
        )));
    }
    Ok(())
}

/// Splits an amount into the escrow program's fee and swap portions. The fee
/// is floored at the base-unit scale and the net amount is the exact
/// complement, so fee + net == amount always holds.
pub fn fee_split(amount: u64) -> (u64, u64) {
    let fee = (amount as u128 * FEE_BPS as u128 / BPS_DENOMINATOR as u128) as u64;
    (fee, amount - fee)
}

/// Client for the deployed escrow program: address derivation, purchase and
/// admin instruction building, and account reads.
pub struct EscrowClient {
    rpc_client: Arc<RpcClient>,
    payer: Arc<Keypair>,
}

impl EscrowClient {
    pub fn new(rpc_client: Arc<RpcClient>, payer: Arc<Keypair>) -> Self {
        Self { rpc_client, payer }
    }

    pub fn payer_pubkey(&self) -> Pubkey {
        self.payer.pubkey()
    }

    /// PDA of the escrow state account; pure.
    pub fn escrow_address() -> Pubkey {
        let (pda, _) = Pubkey::find_program_address(&[ESCROW_SEED], &escrow_program_id());
        pda
    }

    /// Deterministic per-(owner, mint) holding account address; pure.
    pub fn associated_account(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
        get_associated_token_address(owner, mint)
    }

    /// Returns the associated account address, creating the account first if
    /// it does not exist. Safe to call repeatedly; a second call after
    /// success is a plain read.
    pub async fn ensure_associated_account(
        &self,
        owner: &Pubkey,
        mint: &Pubkey,
    ) -> Result<Pubkey, RelayerError> {
        let ata = Self::associated_account(owner, mint);
        if self.rpc_client.get_account(&ata).is_ok() {
            return Ok(ata);
        }

        debug!("Creating associated account {} for owner {}", ata, owner);
        let ix = create_associated_token_account(&self.payer.pubkey(), owner, mint, &spl_token::id());
        let blockhash = self
            .rpc_client
            .get_latest_blockhash()
            .map_err(|e| RelayerError::AccountCreationFailed(e.to_string()))?;
        let tx = Transaction::new_signed_with_payer(
            &[ix],
            Some(&self.payer.pubkey()),
            &[self.payer.as_ref()],
            blockhash,
        );
        self.rpc_client
            .send_and_confirm_transaction(&tx)
            .map_err(|e| RelayerError::AccountCreationFailed(e.to_string()))?;
        Ok(ata)
    }

    /// Fixed-rate estimate of the stable output for a purchase. Pure and
    /// deterministic: same asset and amount always yield the same figures.
    pub fn compute_expected_output(asset: Asset, amount: u64) -> ExpectedOutput {
        let (fee, net_amount) = fee_split(amount);
        let (num, den) = asset.fixed_rate();
        let expected_stable = (net_amount as u128 * num as u128 / den as u128) as u64;
        ExpectedOutput {
            fee,
            net_amount,
            expected_stable,
            rate: asset.display_rate(),
        }
    }

    pub async fn read_escrow_state(&self) -> Result<EscrowState, RelayerError> {
        let account = self
            .rpc_client
            .get_account(&Self::escrow_address())
            .map_err(|_| RelayerError::NotFound("escrow state account".to_string()))?;
        EscrowState::from_account_data(&account.data)
            .ok_or_else(|| RelayerError::NotFound("escrow state layout mismatch".to_string()))
    }

    pub async fn sol_balance(&self, owner: &Pubkey) -> Result<u64, RelayerError> {
        Ok(self.rpc_client.get_balance(owner)?)
    }

    /// Token balance in base units; a missing token account reads as zero.
    pub async fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> u64 {
        let ata = Self::associated_account(owner, mint);
        match self.rpc_client.get_token_account_balance(&ata) {
            Ok(balance) => balance.amount.parse().unwrap_or(0),
            Err(_) => 0,
        }
    }

    /// Submits a purchase-with-auto-conversion instruction for the given
    /// asset family. Validation order: amount bounds, escrow active flag,
    /// payer balance (native purchases keep a fee reserve back).
    pub async fn submit_purchase(
        &self,
        asset: Asset,
        amount: u64,
    ) -> Result<PurchaseReceipt, RelayerError> {
        validate_amount(asset, amount)?;

        let state = self.read_escrow_state().await?;
        if !state.is_active {
            return Err(RelayerError::ContractInactive);
        }

        let user = self.payer.pubkey();
        match asset {
            Asset::Sol => {
                let balance = self.sol_balance(&user).await?;
                let required = amount + NATIVE_FEE_RESERVE_LAMPORTS;
                if balance < required {
                    return Err(RelayerError::InsufficientBalance(format!(
                        "need {} lamports (incl. fee reserve), have {}",
                        required, balance
                    )));
                }
            }
            Asset::Jup => {
                let balance = self.token_balance(&user, &jup_mint()).await;
                if balance < amount {
                    return Err(RelayerError::InsufficientBalance(format!(
                        "need {} JUP base units, have {}",
                        amount, balance
                    )));
                }
                // The purchase instruction debits the user's JUP account
                self.ensure_associated_account(&user, &jup_mint()).await?;
            }
        }
        // Stable payouts land in the user's USDC account
        self.ensure_associated_account(&user, &usdc_mint()).await?;

        let ix = match asset {
            Asset::Sol => build_purchase_sol_ix(&user, amount),
            Asset::Jup => build_purchase_token_ix(&user, amount),
        };
        let signature = self.sign_and_send(&[ix]).await?;
        let estimate = Self::compute_expected_output(asset, amount);
        info!(
            "Purchase submitted: {} {} base units by {} ({})",
            amount,
            asset.symbol(),
            user,
            signature
        );
        Ok(PurchaseReceipt { signature, estimate })
    }

    /// Moves stable tokens from the escrow holding account to the recipient.
    /// Only the configured administrator may call this.
    pub async fn distribute_to(
        &self,
        recipient: &Pubkey,
        amount: u64,
    ) -> Result<Signature, RelayerError> {
        let state = self.read_escrow_state().await?;
        if state.admin != self.payer.pubkey() {
            return Err(RelayerError::Unauthorized(format!(
                "distribute requires admin {}, signer is {}",
                state.admin,
                self.payer.pubkey()
            )));
        }

        let escrow = Self::escrow_address();
        let holding = self.token_balance(&escrow, &usdc_mint()).await;
        if holding < amount {
            return Err(RelayerError::InsufficientBalance(format!(
                "escrow holds {} stable base units, need {}",
                holding, amount
            )));
        }

        let recipient_stable = self
            .ensure_associated_account(recipient, &usdc_mint())
            .await?;
        let ix = build_distribute_ix(&self.payer.pubkey(), recipient, &recipient_stable, amount);
        let signature = self.sign_and_send(&[ix]).await?;
        info!(
            "Distributed {} stable base units to {} ({})",
            amount, recipient, signature
        );
        Ok(signature)
    }

    /// Admin top-up of the escrow's stable holding account.
    pub async fn deposit_stable(&self, amount: u64) -> Result<Signature, RelayerError> {
        let admin = self.payer.pubkey();
        let ix = build_deposit_ix(&admin, amount);
        let signature = self.sign_and_send(&[ix]).await?;
        info!("Deposited {} stable base units into escrow ({})", amount, signature);
        Ok(signature)
    }

    /// One-time program initialization with the configured administrator.
    pub async fn initialize(&self, admin: &Pubkey) -> Result<Signature, RelayerError> {
        let ix = build_initialize_ix(&self.payer.pubkey(), admin);
        self.sign_and_send(&[ix]).await
    }

    /// Toggles the escrow active flag; admin only (enforced on-chain).
    pub async fn set_active(&self, active: bool) -> Result<Signature, RelayerError> {
        let ix = build_set_active_ix(&self.payer.pubkey(), active);
        self.sign_and_send(&[ix]).await
    }

    /// Confirmed transaction lookup, used for receipt rendering.
    pub async fn transaction_details(
        &self,
        signature: &Signature,
    ) -> Result<EncodedConfirmedTransactionWithStatusMeta, RelayerError> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Json),
            commitment: Some(CommitmentConfig::confirmed()),
            max_supported_transaction_version: Some(0),
        };
        self.rpc_client
            .get_transaction_with_config(signature, config)
            .map_err(|e| RelayerError::NotFound(format!("transaction {}: {}", signature, e)))
    }

    async fn sign_and_send(&self, instructions: &[Instruction]) -> Result<Signature, RelayerError> {
        let blockhash = self
            .rpc_client
            .get_latest_blockhash()
            .map_err(|e| RelayerError::SubmissionFailed(e.to_string()))?;
        let tx = Transaction::new_signed_with_payer(
            instructions,
            Some(&self.payer.pubkey()),
            &[self.payer.as_ref()],
            blockhash,
        );
        self.rpc_client
            .send_and_confirm_transaction_with_spinner_and_config(
                &tx,
                CommitmentConfig::confirmed(),
                Default::default(),
            )
            .map_err(|e| RelayerError::SubmissionFailed(e.to_string()))
    }
}

fn build_purchase_sol_ix(user: &Pubkey, amount: u64) -> Instruction {
    let escrow = EscrowClient::escrow_address();
    let mut data = IX_PURCHASE_WITH_SOL_AUTO.to_vec();
    data.extend_from_slice(&amount.to_le_bytes());

    Instruction {
        program_id: escrow_program_id(),
        accounts: vec![
            AccountMeta::new(escrow, false),
            AccountMeta::new(*user, true),
            AccountMeta::new(fee_wallet(), false),
            AccountMeta::new(EscrowClient::associated_account(&escrow, &usdc_mint()), false),
            AccountMeta::new(EscrowClient::associated_account(user, &usdc_mint()), false),
            AccountMeta::new_readonly(usdc_mint(), false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data,
    }
}

fn build_purchase_token_ix(user: &Pubkey, amount: u64) -> Instruction {
    let escrow = EscrowClient::escrow_address();
    let mut data = IX_PURCHASE_WITH_TOKEN_AUTO.to_vec();
    data.extend_from_slice(&amount.to_le_bytes());

    Instruction {
        program_id: escrow_program_id(),
        accounts: vec![
            AccountMeta::new(escrow, false),
            AccountMeta::new(*user, true),
            AccountMeta::new(EscrowClient::associated_account(user, &jup_mint()), false),
            AccountMeta::new(EscrowClient::associated_account(&escrow, &jup_mint()), false),
            AccountMeta::new(EscrowClient::associated_account(&escrow, &usdc_mint()), false),
            AccountMeta::new(EscrowClient::associated_account(user, &usdc_mint()), false),
            AccountMeta::new_readonly(jup_mint(), false),
            AccountMeta::new_readonly(usdc_mint(), false),
            AccountMeta::new_readonly(spl_token::id(), false),
        ],
        data,
    }
}

fn build_distribute_ix(
    admin: &Pubkey,
    recipient: &Pubkey,
    recipient_stable: &Pubkey,
    amount: u64,
) -> Instruction {
    let escrow = EscrowClient::escrow_address();
    let mut data = IX_DISTRIBUTE_STABLE.to_vec();
    data.extend_from_slice(&amount.to_le_bytes());
    data.extend_from_slice(recipient.as_ref());

    Instruction {
        program_id: escrow_program_id(),
        accounts: vec![
            AccountMeta::new(escrow, false),
            AccountMeta::new_readonly(*admin, true),
            AccountMeta::new(EscrowClient::associated_account(&escrow, &usdc_mint()), false),
            AccountMeta::new(*recipient_stable, false),
            AccountMeta::new_readonly(usdc_mint(), false),
            AccountMeta::new_readonly(spl_token::id(), false),
        ],
        data,
    }
}

fn build_deposit_ix(admin: &Pubkey, amount: u64) -> Instruction {
    let escrow = EscrowClient::escrow_address();
    let mut data = IX_DEPOSIT_STABLE.to_vec();
    data.extend_from_slice(&amount.to_le_bytes());

    Instruction {
        program_id: escrow_program_id(),
        accounts: vec![
            AccountMeta::new(escrow, false),
            AccountMeta::new_readonly(*admin, true),
            AccountMeta::new(EscrowClient::associated_account(admin, &usdc_mint()), false),
            AccountMeta::new(EscrowClient::associated_account(&escrow, &usdc_mint()), false),
            AccountMeta::new_readonly(usdc_mint(), false),
            AccountMeta::new_readonly(spl_token::id(), false),
        ],
        data,
    }
}

fn build_initialize_ix(payer: &Pubkey, admin: &Pubkey) -> Instruction {
    let mut data = IX_INITIALIZE.to_vec();
    data.extend_from_slice(admin.as_ref());

    Instruction {
        program_id: escrow_program_id(),
        accounts: vec![
            AccountMeta::new(EscrowClient::escrow_address(), false),
            AccountMeta::new(*payer, true),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data,
    }
}

fn build_set_active_ix(admin: &Pubkey, active: bool) -> Instruction {
    let mut data = IX_SET_ACTIVE.to_vec();
    data.push(active as u8);

    Instruction {
        program_id: escrow_program_id(),
        accounts: vec![
            AccountMeta::new(EscrowClient::escrow_address(), false),
            AccountMeta::new_readonly(*admin, true),
        ],
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signature::Keypair;

    #[test]
    fn fee_and_net_are_exact_complements() {
        // Odd values included: flooring the fee must never lose a base unit
        for amount in [1u64, 7, 19, 10_000_000, 999_999_999, 1_000_000_000, u32::MAX as u64] {
            let (fee, net) = fee_split(amount);
            assert_eq!(fee + net, amount, "split must be exact for {amount}");
            assert_eq!(fee, amount * FEE_BPS / BPS_DENOMINATOR);
        }
    }

    #[test]
    fn expected_output_is_deterministic() {
        let a = EscrowClient::compute_expected_output(Asset::Sol, 1_000_000_000);
        let b = EscrowClient::compute_expected_output(Asset::Sol, 1_000_000_000);
        assert_eq!(a, b);
    }

    #[test]
    fn expected_output_for_one_sol() {
        // 1.0 SOL: fee 0.05 SOL, net 0.95 SOL, 0.95 * 200 = 190 USDC
        let out = EscrowClient::compute_expected_output(Asset::Sol, 1_000_000_000);
        assert_eq!(out.fee, 50_000_000);
        assert_eq!(out.net_amount, 950_000_000);
        assert_eq!(out.expected_stable, 190_000_000);
        assert_eq!(out.rate, 200.0);
    }

    #[test]
    fn expected_output_for_jup() {
        // 10 JUP: fee 0.5 JUP, net 9.5 JUP, 9.5 * 1.5 = 14.25 USDC
        let out = EscrowClient::compute_expected_output(Asset::Jup, 10_000_000);
        assert_eq!(out.fee, 500_000);
        assert_eq!(out.net_amount, 9_500_000);
        assert_eq!(out.expected_stable, 14_250_000);
        assert_eq!(out.rate, 1.5);
    }

    #[test]
    fn amount_validation_enforces_bounds() {
        assert!(validate_amount(Asset::Sol, 0).is_err());
        assert!(validate_amount(Asset::Sol, Asset::Sol.min_amount() - 1).is_err());
        assert!(validate_amount(Asset::Sol, Asset::Sol.min_amount()).is_ok());
        assert!(validate_amount(Asset::Sol, Asset::Sol.max_amount()).is_ok());
        assert!(validate_amount(Asset::Sol, Asset::Sol.max_amount() + 1).is_err());

        assert!(validate_amount(Asset::Jup, 999_999).is_err());
        assert!(validate_amount(Asset::Jup, 1_000_000).is_ok());
    }

    #[test]
    fn escrow_address_is_deterministic() {
        assert_eq!(EscrowClient::escrow_address(), EscrowClient::escrow_address());
    }

    #[test]
    fn escrow_state_parsing() {
        let admin = Keypair::new().pubkey();
        let mut data = ACCOUNT_ESCROW_STATE.to_vec();
        data.extend_from_slice(admin.as_ref());
        data.push(1);
        data.extend_from_slice(&5_000_000_000u64.to_le_bytes());
        data.extend_from_slice(&250_000_000u64.to_le_bytes());
        data.extend_from_slice(&950_000_000u64.to_le_bytes());

        let state = EscrowState::from_account_data(&data).expect("valid layout");
        assert_eq!(state.admin, admin);
        assert!(state.is_active);
        assert_eq!(state.total_native_received, 5_000_000_000);
        assert_eq!(state.total_fees_collected, 250_000_000);
        assert_eq!(state.total_stable_distributed, 950_000_000);

        // Wrong discriminator is not an escrow state account
        let mut wrong = data.clone();
        wrong[0] ^= 0xff;
        assert!(EscrowState::from_account_data(&wrong).is_none());
        // Truncated data is rejected
        assert!(EscrowState::from_account_data(&data[..40]).is_none());
    }

    #[test]
    fn purchase_instruction_layout() {
        let user = Keypair::new().pubkey();
        let ix = build_purchase_sol_ix(&user, 1_000_000_000);
        assert_eq!(ix.program_id, escrow_program_id());
        assert_eq!(&ix.data[..8], &IX_PURCHASE_WITH_SOL_AUTO);
        assert_eq!(&ix.data[8..], &1_000_000_000u64.to_le_bytes());
        assert_eq!(ix.accounts.len(), 8);
        assert!(ix.accounts[1].is_signer, "user signs the purchase");

        let ix = build_purchase_token_ix(&user, 2_000_000);
        assert_eq!(&ix.data[..8], &IX_PURCHASE_WITH_TOKEN_AUTO);
        assert_eq!(ix.accounts.len(), 9);
    }

    #[test]
    fn distribute_instruction_carries_recipient() {
        let admin = Keypair::new().pubkey();
        let recipient = Keypair::new().pubkey();
        let recipient_stable = EscrowClient::associated_account(&recipient, &usdc_mint());
        let ix = build_distribute_ix(&admin, &recipient, &recipient_stable, 190_000_000);
        assert_eq!(&ix.data[..8], &IX_DISTRIBUTE_STABLE);
        assert_eq!(&ix.data[8..16], &190_000_000u64.to_le_bytes());
        assert_eq!(&ix.data[16..48], recipient.as_ref());
        assert!(ix.accounts[1].is_signer, "admin signs the distribution");
    }
}
