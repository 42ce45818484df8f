//! The chain-verification seam: a pure read-oracle over two chains.

use super::bsc::BscVerifier;
use super::error::ChainError;
use super::solana::SolanaVerifier;
use crate::types::Chain;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// What the reconciler asks the oracle to confirm.
#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub transaction_hash: String,
    pub chain: Chain,
    pub num_eggs: i64,
    /// `num_eggs x rate_in_usdt`, computed by the caller from the asset
    /// rate table so the verifier stays stateless.
    pub min_amount: Decimal,
}

/// Normalized verification result.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedTransfer {
    pub block_number: u64,
    /// Stablecoin amount actually transferred, when the chain exposes it.
    pub amount: Option<Decimal>,
}

/// Read-only oracle confirming an external payment is mined, successful and
/// pays enough stablecoin to the treasury wallet.
#[async_trait]
pub trait ChainVerifier: Send + Sync {
    async fn verify(&self, req: &VerifyRequest) -> Result<VerifiedTransfer, ChainError>;
}

/// Production verifier dispatching on the request's chain.
pub struct RpcVerifier {
    bsc: BscVerifier,
    solana: SolanaVerifier,
}

impl RpcVerifier {
    pub fn new(bsc: BscVerifier, solana: SolanaVerifier) -> Self {
        Self { bsc, solana }
    }
}

#[async_trait]
impl ChainVerifier for RpcVerifier {
    async fn verify(&self, req: &VerifyRequest) -> Result<VerifiedTransfer, ChainError> {
        match req.chain {
            Chain::Bsc => self.bsc.verify(req).await,
            Chain::Solana => self.solana.verify(req).await,
        }
    }
}
