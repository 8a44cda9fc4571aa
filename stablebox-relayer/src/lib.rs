//! Client and settlement stack for the Stablebox escrow program: users pay
//! in SOL or JUP, the program takes a 5% fee and requests a swap, and the
//! relayer converts the remainder into USDC and distributes it back.

pub mod asset;
pub mod config;
pub mod constants;
pub mod errors;
pub mod escrow_client;
pub mod events;
pub mod metrics;
pub mod processor;
pub mod purchase_flow;
pub mod router;

pub use asset::Asset;
pub use config::RelayerConfig;
pub use errors::RelayerError;
pub use escrow_client::{EscrowClient, EscrowState, ExpectedOutput, PurchaseReceipt};
pub use events::{EscrowEvent, PurchaseAutomatic, SwapRequested};
pub use metrics::Metrics;
pub use processor::{SettlementProcessor, SettlementRecord};
pub use purchase_flow::{PurchaseFlow, PurchaseStep};
pub use router::{RouterClient, RouterQuote, SwapOutcome};
