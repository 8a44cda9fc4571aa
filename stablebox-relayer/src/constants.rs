use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

// Fixed deployment addresses (devnet)
pub const ESCROW_PROGRAM_ID: &str = "FDXxJHprFRFf293SMGkB8pdDMbM4zaxw9ykuqvATihEs";
pub const FEE_WALLET: &str = "HKAkT4mCBkWEX4TsKXVHZEWEo4R7B81Vh9omBqoWp2Pt";
pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const USDC_MINT: &str = "Gh9ZwEmdLJ8DscKNTkTqPbNwLNNBjuSzaG9Vp2KGtKJr";
pub const JUP_MINT: &str = "ByJUP3XrpVdYKNkPS27Gz8VV3UBgT8K7Tc4RsoZcWvWa";

pub const ESCROW_SEED: &[u8] = b"escrow";

pub const STABLE_SYMBOL: &str = "USDC";
pub const STABLE_DECIMALS: u8 = 6;

// Fee split applied by the escrow program: 5% fee, 95% swapped
pub const FEE_BPS: u64 = 500;
pub const BPS_DENOMINATOR: u64 = 10_000;

// Lamports held back from native purchases to cover the user's own
// transaction fees
pub const NATIVE_FEE_RESERVE_LAMPORTS: u64 = 10_000_000;

// Swap router HTTP API
pub const QUOTE_URL: &str = "https://quote-api.jup.ag/v6/quote";
pub const SWAP_URL: &str = "https://quote-api.jup.ag/v6/swap";
pub const DEFAULT_SLIPPAGE_BPS: u16 = 50;

pub const CONFIRM_TIMEOUT_SECS: u64 = 60;
pub const CONFIRM_POLL_MS: u64 = 500;
pub const RECONNECT_DELAY_SECS: u64 = 5;

// Instruction discriminators of the deployed escrow program
pub const IX_INITIALIZE: [u8; 8] = [175, 175, 109, 31, 13, 152, 155, 237];
pub const IX_SET_ACTIVE: [u8; 8] = [29, 16, 225, 132, 38, 216, 206, 33];
pub const IX_PURCHASE_WITH_SOL_AUTO: [u8; 8] = [220, 188, 109, 171, 245, 135, 125, 211];
pub const IX_PURCHASE_WITH_TOKEN_AUTO: [u8; 8] = [8, 15, 225, 124, 103, 150, 75, 121];
pub const IX_DISTRIBUTE_STABLE: [u8; 8] = [132, 178, 15, 66, 213, 104, 124, 209];
pub const IX_DEPOSIT_STABLE: [u8; 8] = [89, 248, 131, 239, 11, 219, 163, 160];

// Account and event discriminators
pub const ACCOUNT_ESCROW_STATE: [u8; 8] = [19, 90, 148, 111, 55, 130, 229, 108];
pub const EVENT_SWAP_REQUESTED: [u8; 8] = [134, 40, 102, 142, 143, 143, 189, 249];
pub const EVENT_PURCHASE_AUTOMATIC: [u8; 8] = [197, 42, 117, 167, 255, 45, 77, 182];

pub fn escrow_program_id() -> Pubkey {
    Pubkey::from_str(ESCROW_PROGRAM_ID).unwrap()
}

pub fn fee_wallet() -> Pubkey {
    Pubkey::from_str(FEE_WALLET).unwrap()
}

pub fn wsol_mint() -> Pubkey {
    Pubkey::from_str(WSOL_MINT).unwrap()
}

pub fn usdc_mint() -> Pubkey {
    Pubkey::from_str(USDC_MINT).unwrap()
}

pub fn jup_mint() -> Pubkey {
    Pubkey::from_str(JUP_MINT).unwrap()
}
