//! BSC payment verifier.
//!
//! Fetches the transaction receipt over JSON-RPC, checks execution status,
//! then walks the logs for an ERC-20 Transfer of the configured USDT
//! contract into the treasury wallet. Supports mock mode for testing
//! without a real node.

use super::error::ChainError;
use super::verifier::{VerifiedTransfer, VerifyRequest};
use crate::config::BscConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info};

/// keccak256("Transfer(address,address,uint256)")
const TRANSFER_TOPIC: &str = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

pub struct BscVerifier {
    config: BscConfig,
    client: Option<reqwest::Client>,
    mock_mode: bool,
    /// Preset receipts keyed by lowercase tx hash, for tests.
    mock_receipts: HashMap<String, TxReceipt>,
}

#[derive(Serialize)]
struct JsonRpcRequest<T> {
    jsonrpc: &'static str,
    method: &'static str,
    params: T,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse<T> {
    #[allow(dead_code)]
    jsonrpc: String,
    result: Option<T>,
    error: Option<JsonRpcError>,
    #[allow(dead_code)]
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Receipt structure from eth_getTransactionReceipt.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub status: String,
    pub block_number: String,
    pub logs: Vec<ReceiptLog>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ReceiptLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
}

impl BscVerifier {
    pub fn new(config: BscConfig) -> Result<Self, ChainError> {
        info!("Initializing BSC verifier at {}", config.rpc_url);

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ChainError::RpcConnection(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client: Some(client),
            mock_mode: false,
            mock_receipts: HashMap::new(),
        })
    }

    /// Create a mock verifier for testing.
    pub fn new_mock(config: BscConfig) -> Self {
        Self {
            config,
            client: None,
            mock_mode: true,
            mock_receipts: HashMap::new(),
        }
    }

    /// Preset a receipt for a tx hash in mock mode.
    pub fn set_mock_receipt(&mut self, tx_hash: &str, receipt: TxReceipt) {
        self.mock_receipts.insert(tx_hash.to_lowercase(), receipt);
    }

    async fn rpc_call<T, R>(&self, method: &'static str, params: T) -> Result<R, ChainError>
    where
        T: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| ChainError::RpcConnection("No HTTP client (mock mode?)".to_string()))?;

        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        };

        let response = client
            .post(&self.config.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChainError::RpcConnection(format!("HTTP request failed: {}", e)))?;

        let rpc_response: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| ChainError::RpcConnection(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = rpc_response.error {
            return Err(ChainError::RpcConnection(format!(
                "RPC error {}: {}",
                error.code, error.message
            )));
        }

        // A null result means the transaction is unknown or not yet mined.
        rpc_response.result.ok_or(ChainError::NotMined)
    }

    async fn fetch_receipt(&self, tx_hash: &str) -> Result<TxReceipt, ChainError> {
        if self.mock_mode {
            return self
                .mock_receipts
                .get(&tx_hash.to_lowercase())
                .cloned()
                .ok_or(ChainError::NotMined);
        }
        self.rpc_call("eth_getTransactionReceipt", (tx_hash,)).await
    }

    pub async fn verify(&self, req: &VerifyRequest) -> Result<VerifiedTransfer, ChainError> {
        let receipt = self.fetch_receipt(&req.transaction_hash).await?;

        let status = parse_hex_u64(&receipt.status)?;
        if status != 1 {
            return Err(ChainError::ExecutionFailed);
        }

        let block_number = parse_hex_u64(&receipt.block_number)?;

        let transferred = self
            .find_treasury_transfer(&receipt)
            .ok_or(ChainError::NoMatchingTransfer)?;

        if transferred < req.min_amount {
            return Err(ChainError::AmountTooLow {
                transferred: transferred.to_string(),
                required: req.min_amount.to_string(),
            });
        }

        debug!(
            tx_hash = %req.transaction_hash,
            block_number,
            %transferred,
            "BSC payment verified"
        );

        Ok(VerifiedTransfer {
            block_number,
            amount: Some(transferred),
        })
    }

    /// Sum USDT Transfer amounts into the treasury wallet across all logs.
    /// Returns None when no matching transfer exists at all.
    fn find_treasury_transfer(&self, receipt: &TxReceipt) -> Option<Decimal> {
        let contract = self.config.usdt_contract.to_lowercase();
        let treasury = self.config.treasury_wallet.to_lowercase();

        let mut total = Decimal::ZERO;
        let mut found = false;

        for log in &receipt.logs {
            if log.address.to_lowercase() != contract {
                continue;
            }
            if log.topics.len() < 3 || log.topics[0].to_lowercase() != TRANSFER_TOPIC {
                continue;
            }
            // topic[2] is the 32-byte left-padded recipient.
            if !topic_matches_address(&log.topics[2], &treasury) {
                continue;
            }
            if let Some(amount) = decode_token_amount(&log.data, self.config.usdt_decimals) {
                total += amount;
                found = true;
            }
        }

        if found { Some(total) } else { None }
    }
}

fn parse_hex_u64(s: &str) -> Result<u64, ChainError> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| ChainError::Parse(format!("Invalid hex quantity {}: {}", s, e)))
}

/// Compare a 32-byte topic against a 20-byte address, both 0x-hex.
fn topic_matches_address(topic: &str, address: &str) -> bool {
    let topic = topic.trim_start_matches("0x").to_lowercase();
    let address = address.trim_start_matches("0x").to_lowercase();
    topic.len() == 64 && address.len() == 40 && topic.ends_with(&address)
}

/// Decode a 32-byte uint256 log data field into a token Decimal.
fn decode_token_amount(data: &str, decimals: u32) -> Option<Decimal> {
    let hex_str = data.trim_start_matches("0x");
    let raw = u128::from_str_radix(hex_str, 16).ok()?;
    let amount = Decimal::from_str(&raw.to_string()).ok()?;
    Some(amount / Decimal::from(10u128.pow(decimals)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chain;

    const TREASURY: &str = "0x0000000000000000000000000000000000000a11";
    const USDT: &str = "0x55d398326f99059ff775485246999027b3197955";

    fn test_config() -> BscConfig {
        BscConfig {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            usdt_contract: USDT.to_string(),
            treasury_wallet: TREASURY.to_string(),
            usdt_decimals: 18,
        }
    }

    fn transfer_log(to: &str, amount_wei: u128) -> ReceiptLog {
        ReceiptLog {
            address: USDT.to_string(),
            topics: vec![
                TRANSFER_TOPIC.to_string(),
                format!("0x{:0>64}", "deadbeef"),
                format!("0x{:0>64}", to.trim_start_matches("0x")),
            ],
            data: format!("0x{:064x}", amount_wei),
        }
    }

    fn good_receipt(amount_wei: u128) -> TxReceipt {
        TxReceipt {
            status: "0x1".to_string(),
            block_number: "0x10".to_string(),
            logs: vec![transfer_log(TREASURY, amount_wei)],
        }
    }

    fn request(min: &str) -> VerifyRequest {
        VerifyRequest {
            transaction_hash: "0xAbCdef0011223344556677889900aabbccddeeff".to_string(),
            chain: Chain::Bsc,
            num_eggs: 5,
            min_amount: Decimal::from_str(min).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_verify_accepts_sufficient_transfer() {
        let mut verifier = BscVerifier::new_mock(test_config());
        let req = request("5");
        // 5 USDT at 18 decimals
        verifier.set_mock_receipt(&req.transaction_hash, good_receipt(5_000_000_000_000_000_000));

        let verified = verifier.verify(&req).await.unwrap();
        assert_eq!(verified.block_number, 16);
        assert_eq!(verified.amount, Some(Decimal::from(5)));
    }

    #[tokio::test]
    async fn test_verify_rejects_underpayment() {
        let mut verifier = BscVerifier::new_mock(test_config());
        let req = request("5");
        verifier.set_mock_receipt(&req.transaction_hash, good_receipt(4_000_000_000_000_000_000));

        let err = verifier.verify(&req).await.unwrap_err();
        assert!(matches!(err, ChainError::AmountTooLow { .. }));
    }

    #[tokio::test]
    async fn test_verify_unknown_hash_is_not_mined() {
        let verifier = BscVerifier::new_mock(test_config());
        let err = verifier.verify(&request("5")).await.unwrap_err();
        assert!(matches!(err, ChainError::NotMined));
    }

    #[tokio::test]
    async fn test_verify_rejects_failed_execution() {
        let mut verifier = BscVerifier::new_mock(test_config());
        let req = request("5");
        let mut receipt = good_receipt(5_000_000_000_000_000_000);
        receipt.status = "0x0".to_string();
        verifier.set_mock_receipt(&req.transaction_hash, receipt);

        let err = verifier.verify(&req).await.unwrap_err();
        assert!(matches!(err, ChainError::ExecutionFailed));
    }

    #[tokio::test]
    async fn test_verify_ignores_transfers_to_other_wallets() {
        let mut verifier = BscVerifier::new_mock(test_config());
        let req = request("5");
        let receipt = TxReceipt {
            status: "0x1".to_string(),
            block_number: "0x10".to_string(),
            logs: vec![transfer_log(
                "0x00000000000000000000000000000000000000ff",
                5_000_000_000_000_000_000,
            )],
        };
        verifier.set_mock_receipt(&req.transaction_hash, receipt);

        let err = verifier.verify(&req).await.unwrap_err();
        assert!(matches!(err, ChainError::NoMatchingTransfer));
    }

    #[tokio::test]
    async fn test_verify_sums_split_transfers() {
        let mut verifier = BscVerifier::new_mock(test_config());
        let req = request("5");
        let receipt = TxReceipt {
            status: "0x1".to_string(),
            block_number: "0x10".to_string(),
            logs: vec![
                transfer_log(TREASURY, 3_000_000_000_000_000_000),
                transfer_log(TREASURY, 2_000_000_000_000_000_000),
            ],
        };
        verifier.set_mock_receipt(&req.transaction_hash, receipt);

        let verified = verifier.verify(&req).await.unwrap();
        assert_eq!(verified.amount, Some(Decimal::from(5)));
    }

    #[test]
    fn test_topic_address_match_is_case_insensitive() {
        let topic = format!("0x{:0>64}", "0A11");
        assert!(topic_matches_address(
            &topic,
            "0x0000000000000000000000000000000000000a11"
        ));
    }

    #[test]
    fn test_decode_token_amount() {
        let data = format!("0x{:064x}", 1_500_000_000_000_000_000u128);
        assert_eq!(
            decode_token_amount(&data, 18),
            Some(Decimal::from_str("1.5").unwrap())
        );
        assert_eq!(decode_token_amount("0xzz", 18), None);
    }

    #[test]
    fn test_real_verifier_creation() {
        let verifier = BscVerifier::new(test_config());
        assert!(verifier.is_ok());
        assert!(!verifier.unwrap().mock_mode);
    }
}
