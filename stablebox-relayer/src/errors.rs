use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayerError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),
    #[error("escrow contract is inactive")]
    ContractInactive,
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("account creation failed: {0}")]
    AccountCreationFailed(String),
    #[error("submission failed: {0}")]
    SubmissionFailed(String),
    #[error("quote unavailable: {0}")]
    QuoteUnavailable(String),
    #[error("swap execution failed: {0}")]
    SwapExecutionFailed(String),
    #[error("confirmation timed out after {0}s")]
    ConfirmationTimeout(u64),
    #[error("unsupported asset: {0}")]
    UnsupportedAsset(String),
    #[error("invalid flow transition: {0}")]
    InvalidTransition(String),
    #[error("RPC error: {0}")]
    RpcError(String),
}

impl RelayerError {
    /// Validation-class failures are surfaced as a message while the purchase
    /// flow stays in its initial step; everything else moves it to the error
    /// step.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RelayerError::InvalidAmount(_)
                | RelayerError::InsufficientBalance(_)
                | RelayerError::ContractInactive
        )
    }
}

impl From<solana_client::client_error::ClientError> for RelayerError {
    fn from(err: solana_client::client_error::ClientError) -> Self {
        RelayerError::RpcError(err.to_string())
    }
}
