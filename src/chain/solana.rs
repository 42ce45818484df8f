//! Solana payment verifier.
//!
//! Solana receipts do not expose a decoded token amount without parsing
//! inner instructions, so this verifier only confirms the transaction is
//! finalized and succeeded (meta.err is null). Amount enforcement for
//! Solana payments happens off-path; the verified transfer carries
//! `amount: None`.

use super::error::ChainError;
use super::verifier::{VerifiedTransfer, VerifyRequest};
use crate::config::SolanaConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

pub struct SolanaVerifier {
    config: SolanaConfig,
    client: Option<reqwest::Client>,
    mock_mode: bool,
    /// Preset transactions keyed by signature, for tests.
    mock_transactions: HashMap<String, SolTransaction>,
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

/// Transaction structure from getTransaction.
#[derive(Deserialize, Debug, Clone)]
pub struct SolTransaction {
    pub slot: u64,
    pub meta: Option<SolMeta>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SolMeta {
    /// Null on success, an error object otherwise.
    pub err: Option<Value>,
}

#[derive(Serialize)]
struct GetTransactionConfig {
    encoding: &'static str,
    #[serde(rename = "maxSupportedTransactionVersion")]
    max_supported_transaction_version: u8,
}

impl SolanaVerifier {
    pub fn new(config: SolanaConfig) -> Result<Self, ChainError> {
        info!("Initializing Solana verifier at {}", config.rpc_url);

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ChainError::RpcConnection(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client: Some(client),
            mock_mode: false,
            mock_transactions: HashMap::new(),
        })
    }

    /// Create a mock verifier for testing.
    pub fn new_mock(config: SolanaConfig) -> Self {
        Self {
            config,
            client: None,
            mock_mode: true,
            mock_transactions: HashMap::new(),
        }
    }

    /// Preset a transaction for a signature in mock mode.
    pub fn set_mock_transaction(&mut self, signature: &str, tx: SolTransaction) {
        self.mock_transactions.insert(signature.to_string(), tx);
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

        // Null result: signature unknown or not yet finalized.
        rpc_response.result.ok_or(ChainError::NotMined)
    }

    async fn fetch_transaction(&self, signature: &str) -> Result<SolTransaction, ChainError> {
        if self.mock_mode {
            return self
                .mock_transactions
                .get(signature)
                .cloned()
                .ok_or(ChainError::NotMined);
        }
        self.rpc_call(
            "getTransaction",
            (
                signature,
                GetTransactionConfig {
                    encoding: "json",
                    max_supported_transaction_version: 0,
                },
            ),
        )
        .await
    }

    pub async fn verify(&self, req: &VerifyRequest) -> Result<VerifiedTransfer, ChainError> {
        let tx = self.fetch_transaction(&req.transaction_hash).await?;

        let meta = tx.meta.ok_or(ChainError::NotMined)?;
        if meta.err.is_some() {
            return Err(ChainError::ExecutionFailed);
        }

        debug!(signature = %req.transaction_hash, slot = tx.slot, "Solana payment verified");

        Ok(VerifiedTransfer {
            block_number: tx.slot,
            amount: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chain;
    use rust_decimal::Decimal;

    fn test_config() -> SolanaConfig {
        SolanaConfig {
            rpc_url: "http://127.0.0.1:8899".to_string(),
        }
    }

    fn request(sig: &str) -> VerifyRequest {
        VerifyRequest {
            transaction_hash: sig.to_string(),
            chain: Chain::Solana,
            num_eggs: 3,
            min_amount: Decimal::from(3),
        }
    }

    #[tokio::test]
    async fn test_verify_accepts_successful_transaction() {
        let mut verifier = SolanaVerifier::new_mock(test_config());
        verifier.set_mock_transaction(
            "5sig",
            SolTransaction {
                slot: 4242,
                meta: Some(SolMeta { err: None }),
            },
        );

        let verified = verifier.verify(&request("5sig")).await.unwrap();
        assert_eq!(verified.block_number, 4242);
        assert_eq!(verified.amount, None);
    }

    #[tokio::test]
    async fn test_verify_rejects_failed_transaction() {
        let mut verifier = SolanaVerifier::new_mock(test_config());
        verifier.set_mock_transaction(
            "bad",
            SolTransaction {
                slot: 1,
                meta: Some(SolMeta {
                    err: Some(serde_json::json!({"InstructionError": [0, "Custom"]})),
                }),
            },
        );

        let err = verifier.verify(&request("bad")).await.unwrap_err();
        assert!(matches!(err, ChainError::ExecutionFailed));
    }

    #[tokio::test]
    async fn test_verify_unknown_signature_is_not_mined() {
        let verifier = SolanaVerifier::new_mock(test_config());
        let err = verifier.verify(&request("missing")).await.unwrap_err();
        assert!(matches!(err, ChainError::NotMined));
    }

    #[tokio::test]
    async fn test_verify_missing_meta_is_not_mined() {
        let mut verifier = SolanaVerifier::new_mock(test_config());
        verifier.set_mock_transaction("nometa", SolTransaction { slot: 7, meta: None });

        let err = verifier.verify(&request("nometa")).await.unwrap_err();
        assert!(matches!(err, ChainError::NotMined));
    }
}
