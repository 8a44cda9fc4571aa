use solana_sdk::signature::Signature;
use std::time::Instant;

use crate::{
    asset::Asset,
    constants::STABLE_SYMBOL,
    errors::RelayerError,
    escrow_client::{EscrowClient, PurchaseReceipt},
};

/// Steps of one purchase flow. Monotonic along
/// initial -> processing -> finished | error; `error` returns to `initial`
/// only through an explicit retry, `finished` through an explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseStep {
    Initial,
    Processing,
    Finished,
    Error,
}

/// Client-side controller for a single purchase. Owns its state exclusively
/// and receives exactly one completion signal from the submission call, so
/// there is no second confirmation path that could double-transition.
///
/// The reward shown at `Finished` is the fixed-rate estimate from submit
/// time; the settled amount may differ once the off-chain swap completes and
/// is not reconciled here.
#[derive(Debug)]
pub struct PurchaseFlow {
    step: PurchaseStep,
    tx_signature: Option<Signature>,
    reward_asset: &'static str,
    reward_amount: Option<u64>,
    processing_started_at: Option<Instant>,
    error_message: Option<String>,
}

impl PurchaseFlow {
    pub fn new() -> Self {
        Self {
            step: PurchaseStep::Initial,
            tx_signature: None,
            reward_asset: STABLE_SYMBOL,
            reward_amount: None,
            processing_started_at: None,
            error_message: None,
        }
    }

    pub fn step(&self) -> PurchaseStep {
        self.step
    }

    pub fn tx_signature(&self) -> Option<&Signature> {
        self.tx_signature.as_ref()
    }

    pub fn reward_asset(&self) -> &'static str {
        self.reward_asset
    }

    pub fn reward_amount(&self) -> Option<u64> {
        self.reward_amount
    }

    pub fn processing_started_at(&self) -> Option<Instant> {
        self.processing_started_at
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Validates and submits a purchase, driving the flow to `Finished` or
    /// `Error`. Validation failures (bad amount, inactive escrow, missing
    /// balance) leave the flow in `Initial` with only a message recorded, so
    /// the user can correct the input without a retry transition.
    pub async fn submit(
        &mut self,
        client: &EscrowClient,
        asset: Asset,
        amount: u64,
    ) -> Result<PurchaseReceipt, RelayerError> {
        if self.step != PurchaseStep::Initial {
            return Err(RelayerError::InvalidTransition(format!(
                "submit from {:?}",
                self.step
            )));
        }

        match client.submit_purchase(asset, amount).await {
            Ok(receipt) => {
                self.begin_processing(receipt.signature)?;
                self.complete(receipt.estimate.expected_stable)?;
                Ok(receipt)
            }
            Err(err) if err.is_validation() => {
                self.error_message = Some(err.to_string());
                Err(err)
            }
            Err(err) => {
                let _ = self.fail(err.to_string());
                Err(err)
            }
        }
    }

    /// Initial -> Processing, recording the submitted transaction.
    pub fn begin_processing(&mut self, signature: Signature) -> Result<(), RelayerError> {
        if self.step != PurchaseStep::Initial {
            return Err(RelayerError::InvalidTransition(format!(
                "begin_processing from {:?}",
                self.step
            )));
        }
        self.step = PurchaseStep::Processing;
        self.tx_signature = Some(signature);
        self.processing_started_at = Some(Instant::now());
        self.error_message = None;
        Ok(())
    }

    /// Processing -> Finished with the reward figure for the receipt.
    pub fn complete(&mut self, reward_amount: u64) -> Result<(), RelayerError> {
        if self.step != PurchaseStep::Processing {
            return Err(RelayerError::InvalidTransition(format!(
                "complete from {:?}",
                self.step
            )));
        }
        self.step = PurchaseStep::Finished;
        self.reward_amount = Some(reward_amount);
        Ok(())
    }

    /// Initial or Processing -> Error, carrying a human-readable reason.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), RelayerError> {
        match self.step {
            PurchaseStep::Initial | PurchaseStep::Processing => {
                self.step = PurchaseStep::Error;
                self.error_message = Some(message.into());
                Ok(())
            }
            step => Err(RelayerError::InvalidTransition(format!("fail from {step:?}"))),
        }
    }

    /// Error -> Initial, clearing everything for a fresh attempt.
    pub fn retry(&mut self) -> Result<(), RelayerError> {
        if self.step != PurchaseStep::Error {
            return Err(RelayerError::InvalidTransition(format!(
                "retry from {:?}",
                self.step
            )));
        }
        *self = Self::new();
        Ok(())
    }

    /// Finished -> Initial, used when the user starts a new purchase after
    /// viewing the receipt.
    pub fn reset(&mut self) -> Result<(), RelayerError> {
        if self.step != PurchaseStep::Finished {
            return Err(RelayerError::InvalidTransition(format!(
                "reset from {:?}",
                self.step
            )));
        }
        *self = Self::new();
        Ok(())
    }
}

impl Default for PurchaseFlow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_finished() {
        let mut flow = PurchaseFlow::new();
        assert_eq!(flow.step(), PurchaseStep::Initial);

        flow.begin_processing(Signature::default()).unwrap();
        assert_eq!(flow.step(), PurchaseStep::Processing);
        assert!(flow.tx_signature().is_some());
        assert!(flow.processing_started_at().is_some());

        flow.complete(190_000_000).unwrap();
        assert_eq!(flow.step(), PurchaseStep::Finished);
        assert_eq!(flow.reward_amount(), Some(190_000_000));
        assert_eq!(flow.reward_asset(), "USDC");
    }

    #[test]
    fn failure_carries_message_and_retry_clears_it() {
        let mut flow = PurchaseFlow::new();
        flow.begin_processing(Signature::default()).unwrap();
        flow.fail("submission rejected").unwrap();
        assert_eq!(flow.step(), PurchaseStep::Error);
        assert_eq!(flow.error_message(), Some("submission rejected"));

        flow.retry().unwrap();
        assert_eq!(flow.step(), PurchaseStep::Initial);
        assert!(flow.error_message().is_none());
        assert!(flow.tx_signature().is_none());
    }

    #[test]
    fn reset_only_from_finished() {
        let mut flow = PurchaseFlow::new();
        assert!(flow.reset().is_err());

        flow.begin_processing(Signature::default()).unwrap();
        assert!(flow.reset().is_err());

        flow.complete(1).unwrap();
        flow.reset().unwrap();
        assert_eq!(flow.step(), PurchaseStep::Initial);
        assert!(flow.reward_amount().is_none());
    }

    #[test]
    fn no_step_is_skippable() {
        let mut flow = PurchaseFlow::new();
        // Cannot finish without processing
        assert!(flow.complete(1).is_err());
        // Cannot retry without an error
        assert!(flow.retry().is_err());

        flow.begin_processing(Signature::default()).unwrap();
        // Cannot submit twice
        assert!(flow.begin_processing(Signature::default()).is_err());

        flow.complete(1).unwrap();
        // Terminal: no failing or re-completing a finished flow
        assert!(flow.fail("late").is_err());
        assert!(flow.complete(2).is_err());
        assert_eq!(flow.step(), PurchaseStep::Finished);
    }

    #[test]
    fn error_is_terminal_except_retry() {
        let mut flow = PurchaseFlow::new();
        flow.fail("validation passed but signing failed").unwrap();
        assert!(flow.complete(1).is_err());
        assert!(flow.begin_processing(Signature::default()).is_err());
        assert!(flow.reset().is_err());
        assert_eq!(flow.step(), PurchaseStep::Error);
    }
}
