use thiserror::Error;

/// Chain verification failures.
///
/// All variants are retryable from the reconciler's point of view: a
/// transient RPC error is indistinguishable from a true failure here, so
/// verification fails closed and callers treat it as "not yet payable".
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("RPC connection failed: {0}")]
    RpcConnection(String),

    #[error("Transaction not found or not yet mined")]
    NotMined,

    #[error("Transaction execution failed on chain")]
    ExecutionFailed,

    #[error("No stablecoin transfer to the treasury wallet found in receipt")]
    NoMatchingTransfer,

    #[error("Transferred amount {transferred} is below required {required}")]
    AmountTooLow { transferred: String, required: String },

    #[error("Parse error: {0}")]
    Parse(String),
}
