use solana_sdk::pubkey::Pubkey;

use crate::constants::{jup_mint, wsol_mint};

/// Assets the escrow program accepts as payment. The stable reward asset
/// (USDC, 6 decimals) is not purchasable and lives in `constants`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Asset {
    /// Native SOL, 9 decimals
    Sol,
    /// JUP SPL token, 6 decimals
    Jup,
}

impl Asset {
    pub fn symbol(&self) -> &'static str {
        match self {
            Asset::Sol => "SOL",
            Asset::Jup => "JUP",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Asset> {
        match symbol {
            "SOL" => Some(Asset::Sol),
            "JUP" => Some(Asset::Jup),
            _ => None,
        }
    }

    pub fn decimals(&self) -> u8 {
        match self {
            Asset::Sol => 9,
            Asset::Jup => 6,
        }
    }

    /// Mint used when routing this asset through the swap router. Native SOL
    /// routes as wrapped SOL.
    pub fn routing_mint(&self) -> Pubkey {
        match self {
            Asset::Sol => wsol_mint(),
            Asset::Jup => jup_mint(),
        }
    }

    /// Purchase bounds in base units
    pub fn min_amount(&self) -> u64 {
        match self {
            Asset::Sol => 10_000_000,        // 0.01 SOL
            Asset::Jup => 1_000_000,         // 1 JUP
        }
    }

    pub fn max_amount(&self) -> u64 {
        match self {
            Asset::Sol => 100_000_000_000,   // 100 SOL
            Asset::Jup => 1_000_000_000_000, // 1,000,000 JUP
        }
    }

    /// Published fixed conversion rate to the stable asset, as an exact
    /// rational over base units: stable_out = amount * num / den. This is the
    /// pre-submit estimate only; settlement uses a live quote.
    pub fn fixed_rate(&self) -> (u64, u64) {
        match self {
            // 1 SOL = 200 USDC; lamports (1e9) to micro-USDC (1e6)
            Asset::Sol => (1, 5),
            // 1 JUP = 1.5 USDC; both 6 decimals
            Asset::Jup => (3, 2),
        }
    }

    /// Human-readable rate in stable units per whole asset unit
    pub fn display_rate(&self) -> f64 {
        match self {
            Asset::Sol => 200.0,
            Asset::Jup => 1.5,
        }
    }
}

/// Converts base units to a display value at the given scale. Display only;
/// all arithmetic stays in base units.
pub fn to_display(amount: u64, decimals: u8) -> f64 {
    amount as f64 / 10f64.powi(decimals as i32)
}

pub fn format_amount(amount: u64, decimals: u8) -> String {
    format!("{:.4}", to_display(amount, decimals))
}

/// Converts a user-entered decimal value to base units, truncating anything
/// below the smallest unit.
pub fn to_base_units(value: f64, decimals: u8) -> u64 {
    (value * 10f64.powi(decimals as i32)).floor() as u64
}
