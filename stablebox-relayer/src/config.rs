use anyhow::Result;

use crate::constants::{CONFIRM_TIMEOUT_SECS, DEFAULT_SLIPPAGE_BPS};

#[derive(Clone)]
pub struct RelayerConfig {
    pub rpc_url: String,
    pub ws_url: String,
    pub admin_private_key: String,
    pub port: u16,
    pub slippage_bps: u16,
    pub confirm_timeout_secs: u64,
}

impl RelayerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            rpc_url: std::env::var("RPC_URL")
                .unwrap_or_else(|_| "https://api.devnet.solana.com".to_string()),
            ws_url: std::env::var("WS_URL")
                .unwrap_or_else(|_| "wss://api.devnet.solana.com".to_string()),
            admin_private_key: std::env::var("ADMIN_PRIVATE_KEY")
                .unwrap_or_else(|_| "".to_string()), // Will need to be set
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,
            slippage_bps: std::env::var("SLIPPAGE_BPS")
                .unwrap_or_else(|_| DEFAULT_SLIPPAGE_BPS.to_string())
                .parse()?,
            confirm_timeout_secs: std::env::var("CONFIRM_TIMEOUT_SECS")
                .unwrap_or_else(|_| CONFIRM_TIMEOUT_SECS.to_string())
                .parse()?,
        })
    }
}
