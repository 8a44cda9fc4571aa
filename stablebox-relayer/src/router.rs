use base64::{engine::general_purpose, Engine as _};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use solana_client::rpc_client::RpcClient;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::{Transaction, VersionedTransaction},
};
use solana_transaction_status::{
    option_serializer::OptionSerializer, UiTransactionEncoding, UiTransactionTokenBalance,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::constants::{CONFIRM_POLL_MS, USDC_MINT};
use crate::errors::RelayerError;

/// Quote payload of the swap router. Field names are part of the external
/// wire contract and must be preserved when the quote is echoed back to the
/// swap-build endpoint; unknown fields pass through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterQuote {
    pub input_mint: String,
    pub in_amount: String,
    pub output_mint: String,
    pub out_amount: String,
    pub other_amount_threshold: String,
    pub slippage_bps: u16,
    pub price_impact_pct: String,
    pub route_plan: serde_json::Value,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RouterQuote {
    pub fn in_amount_base(&self) -> Result<u64, RelayerError> {
        parse_amount(&self.in_amount, "inAmount")
    }

    pub fn out_amount_base(&self) -> Result<u64, RelayerError> {
        parse_amount(&self.out_amount, "outAmount")
    }

    /// Venue labels along the quoted route, for settlement records.
    pub fn route_labels(&self) -> Vec<String> {
        self.route_plan
            .as_array()
            .map(|steps| {
                steps
                    .iter()
                    .filter_map(|step| step["swapInfo"]["label"].as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn parse_amount(value: &str, field: &str) -> Result<u64, RelayerError> {
    value
        .parse()
        .map_err(|_| RelayerError::QuoteUnavailable(format!("{field} is not a base-unit amount: {value}")))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapBuildRequest<'a> {
    quote_response: &'a RouterQuote,
    user_public_key: String,
    wrap_and_unwrap_sol: bool,
    dynamic_compute_unit_limit: bool,
    prioritization_fee_lamports: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapBuildResponse {
    swap_transaction: String,
    #[serde(default)]
    #[allow(dead_code)]
    last_valid_block_height: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SwapOutcome {
    pub signature: Signature,
    /// Output re-derived from the confirmed transaction, not the quote
    pub realized_out: u64,
}

/// Stateless adapter around the external swap router: one call for quotes,
/// one for build-sign-submit-confirm.
pub struct RouterClient {
    http: reqwest::Client,
    rpc_client: Arc<RpcClient>,
    quote_url: String,
    swap_url: String,
    confirm_timeout_secs: u64,
}

impl RouterClient {
    pub fn new(
        rpc_client: Arc<RpcClient>,
        quote_url: String,
        swap_url: String,
        confirm_timeout_secs: u64,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build reqwest client");
        Self {
            http,
            rpc_client,
            quote_url,
            swap_url,
            confirm_timeout_secs,
        }
    }

    pub async fn get_quote(
        &self,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<RouterQuote, RelayerError> {
        let response = self
            .http
            .get(&self.quote_url)
            .query(&[
                ("inputMint", input_mint.to_string()),
                ("outputMint", output_mint.to_string()),
                ("amount", amount.to_string()),
                ("slippageBps", slippage_bps.to_string()),
            ])
            .send()
            .await
            .map_err(|e| RelayerError::QuoteUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RelayerError::QuoteUnavailable(format!(
                "router returned {}",
                response.status()
            )));
        }

        let quote: RouterQuote = response
            .json()
            .await
            .map_err(|e| RelayerError::QuoteUnavailable(format!("malformed quote payload: {e}")))?;
        // Fail fast on amounts the rest of the pipeline cannot use
        quote.in_amount_base()?;
        quote.out_amount_base()?;
        debug!(
            "Quote: {} -> {} ({} -> {}, impact {})",
            quote.input_mint, quote.output_mint, quote.in_amount, quote.out_amount, quote.price_impact_pct
        );
        Ok(quote)
    }

    /// Requests a prebuilt transaction for the quote, signs, submits, waits
    /// for confirmation within the bounded window, and re-derives the
    /// realized stable output from the confirmed transaction. A timed-out
    /// transaction is abandoned; stale quotes are never resubmitted.
    pub async fn build_and_execute_swap(
        &self,
        quote: &RouterQuote,
        signer: &Keypair,
    ) -> Result<SwapOutcome, RelayerError> {
        let request = SwapBuildRequest {
            quote_response: quote,
            user_public_key: signer.pubkey().to_string(),
            wrap_and_unwrap_sol: true,
            dynamic_compute_unit_limit: true,
            prioritization_fee_lamports: "auto",
        };
        let response = self
            .http
            .post(&self.swap_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RelayerError::SwapExecutionFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(RelayerError::SwapExecutionFailed(format!(
                "swap build returned {}",
                response.status()
            )));
        }
        let build: SwapBuildResponse = response
            .json()
            .await
            .map_err(|e| RelayerError::SwapExecutionFailed(format!("malformed swap payload: {e}")))?;

        let tx_bytes = general_purpose::STANDARD
            .decode(&build.swap_transaction)
            .map_err(|e| RelayerError::SwapExecutionFailed(format!("swapTransaction decode: {e}")))?;

        let signature = self.sign_and_submit(&tx_bytes, signer)?;
        self.await_confirmation(&signature).await?;

        let realized_out = self.realized_output(&signature, &signer.pubkey())?;
        info!(
            "Swap confirmed: {} (quoted {}, realized {})",
            signature, quote.out_amount, realized_out
        );
        Ok(SwapOutcome {
            signature,
            realized_out,
        })
    }

    /// The router may return either a versioned or a legacy transaction
    /// container; detect versioned first and fall back to legacy.
    fn sign_and_submit(&self, tx_bytes: &[u8], signer: &Keypair) -> Result<Signature, RelayerError> {
        if let Ok(tx) = bincode::deserialize::<VersionedTransaction>(tx_bytes) {
            let signed = VersionedTransaction::try_new(tx.message, &[signer])
                .map_err(|e| RelayerError::SwapExecutionFailed(format!("signing failed: {e}")))?;
            return self
                .rpc_client
                .send_transaction(&signed)
                .map_err(|e| RelayerError::SwapExecutionFailed(e.to_string()));
        }

        let mut tx: Transaction = bincode::deserialize(tx_bytes).map_err(|_| {
            RelayerError::SwapExecutionFailed("unrecognized transaction container".to_string())
        })?;
        let blockhash = tx.message.recent_blockhash;
        tx.try_sign(&[signer], blockhash)
            .map_err(|e| RelayerError::SwapExecutionFailed(format!("signing failed: {e}")))?;
        self.rpc_client
            .send_transaction(&tx)
            .map_err(|e| RelayerError::SwapExecutionFailed(e.to_string()))
    }

    async fn await_confirmation(&self, signature: &Signature) -> Result<(), RelayerError> {
        let deadline = Instant::now() + Duration::from_secs(self.confirm_timeout_secs);
        loop {
            match self.rpc_client.confirm_transaction(signature) {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => debug!("confirmation poll failed: {e}"),
            }
            if Instant::now() >= deadline {
                return Err(RelayerError::ConfirmationTimeout(self.confirm_timeout_secs));
            }
            tokio::time::sleep(Duration::from_millis(CONFIRM_POLL_MS)).await;
        }
    }

    /// Reads the confirmed transaction and derives the signer's stable-token
    /// delta. The quote's outAmount is only an estimate under slippage;
    /// distribution must use the settled amount.
    fn realized_output(&self, signature: &Signature, owner: &Pubkey) -> Result<u64, RelayerError> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Json),
            commitment: Some(CommitmentConfig::confirmed()),
            max_supported_transaction_version: Some(0),
        };
        let tx = self
            .rpc_client
            .get_transaction_with_config(signature, config)
            .map_err(|e| {
                RelayerError::SwapExecutionFailed(format!("confirmed transaction lookup: {e}"))
            })?;
        let meta = tx.transaction.meta.ok_or_else(|| {
            RelayerError::SwapExecutionFailed("transaction meta missing".to_string())
        })?;

        let owner = owner.to_string();
        let pre = token_total(&meta.pre_token_balances, &owner, USDC_MINT);
        let post = token_total(&meta.post_token_balances, &owner, USDC_MINT);
        let realized = post.saturating_sub(pre);
        if realized == 0 {
            return Err(RelayerError::SwapExecutionFailed(
                "no stable output observed in confirmed swap".to_string(),
            ));
        }
        Ok(realized)
    }
}

fn token_total(
    balances: &OptionSerializer<Vec<UiTransactionTokenBalance>>,
    owner: &str,
    mint: &str,
) -> u64 {
    let balances = match balances {
        OptionSerializer::Some(balances) => balances.as_slice(),
        _ => return 0,
    };
    balances
        .iter()
        .filter(|b| b.mint == mint && matches!(&b.owner, OptionSerializer::Some(o) if o == owner))
        .filter_map(|b| b.ui_token_amount.amount.parse::<u64>().ok())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{usdc_mint, wsol_mint, WSOL_MINT};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> RouterClient {
        let rpc = Arc::new(RpcClient::new("http://localhost:8899".to_string()));
        RouterClient::new(
            rpc,
            format!("{}/quote", server.uri()),
            format!("{}/swap", server.uri()),
            1,
        )
    }

    fn quote_body() -> serde_json::Value {
        json!({
            "inputMint": WSOL_MINT,
            "inAmount": "950000000",
            "outputMint": USDC_MINT,
            "outAmount": "189500000",
            "otherAmountThreshold": "188552500",
            "swapMode": "ExactIn",
            "slippageBps": 50,
            "priceImpactPct": "0.0012",
            "routePlan": [
                {"swapInfo": {"ammKey": "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin", "label": "Orca"}, "percent": 100}
            ],
            "contextSlot": 123456,
            "timeTaken": 0.04
        })
    }

    #[tokio::test]
    async fn quote_parses_router_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote"))
            .and(query_param("inputMint", WSOL_MINT))
            .and(query_param("amount", "950000000"))
            .and(query_param("slippageBps", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(quote_body()))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let quote = client
            .get_quote(&wsol_mint(), &usdc_mint(), 950_000_000, 50)
            .await
            .expect("quote should parse");

        assert_eq!(quote.in_amount_base().unwrap(), 950_000_000);
        assert_eq!(quote.out_amount_base().unwrap(), 189_500_000);
        assert_eq!(quote.other_amount_threshold, "188552500");
        assert_eq!(quote.route_labels(), vec!["Orca".to_string()]);
    }

    #[tokio::test]
    async fn quote_preserves_unknown_fields_for_swap_build() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_json(quote_body()))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let quote = client
            .get_quote(&wsol_mint(), &usdc_mint(), 950_000_000, 50)
            .await
            .unwrap();

        // The quote is echoed back verbatim as quoteResponse; fields the
        // adapter does not model must survive the round trip.
        let echoed = serde_json::to_value(&quote).unwrap();
        assert_eq!(echoed["contextSlot"], json!(123456));
        assert_eq!(echoed["outAmount"], json!("189500000"));
        assert_eq!(echoed["otherAmountThreshold"], json!("188552500"));
    }

    #[tokio::test]
    async fn non_success_status_is_quote_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client
            .get_quote(&wsol_mint(), &usdc_mint(), 950_000_000, 50)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayerError::QuoteUnavailable(_)));
    }

    #[tokio::test]
    async fn malformed_quote_is_quote_unavailable() {
        let server = MockServer::start().await;
        let mut body = quote_body();
        body.as_object_mut().unwrap().remove("outAmount");
        Mock::given(method("GET"))
            .and(path("/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client
            .get_quote(&wsol_mint(), &usdc_mint(), 950_000_000, 50)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayerError::QuoteUnavailable(_)));
    }

    #[tokio::test]
    async fn non_numeric_amount_is_quote_unavailable() {
        let server = MockServer::start().await;
        let mut body = quote_body();
        body["outAmount"] = json!("not-a-number");
        Mock::given(method("GET"))
            .and(path("/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client
            .get_quote(&wsol_mint(), &usdc_mint(), 950_000_000, 50)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayerError::QuoteUnavailable(_)));
    }

    #[tokio::test]
    async fn failed_swap_build_is_swap_execution_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_json(quote_body()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/swap"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let quote = client
            .get_quote(&wsol_mint(), &usdc_mint(), 950_000_000, 50)
            .await
            .unwrap();
        let signer = Keypair::new();
        let err = client
            .build_and_execute_swap(&quote, &signer)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayerError::SwapExecutionFailed(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn confirmation_window_is_bounded() {
        // Unreachable RPC endpoint: every poll errors until the window
        // expires, and the caller gets a timeout instead of hanging
        let rpc = Arc::new(RpcClient::new("http://127.0.0.1:1".to_string()));
        let client = RouterClient::new(rpc, String::new(), String::new(), 1);

        let err = client
            .await_confirmation(&Signature::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayerError::ConfirmationTimeout(1)));
    }

    #[tokio::test]
    async fn undecodable_swap_transaction_is_swap_execution_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/swap"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "swapTransaction": "%%%not-base64%%%",
                "lastValidBlockHeight": 1
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let quote: RouterQuote = serde_json::from_value(quote_body()).unwrap();
        let signer = Keypair::new();
        let err = client
            .build_and_execute_swap(&quote, &signer)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayerError::SwapExecutionFailed(_)));
    }
}
