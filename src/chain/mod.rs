//! On-chain payment verification for egg purchases.
//!
//! Read-only: verifiers never sign or submit transactions. A verification
//! failure is always safe to retry, so every error fails closed.

pub mod bsc;
pub mod error;
pub mod solana;
pub mod verifier;

pub use bsc::BscVerifier;
pub use error::ChainError;
pub use solana::SolanaVerifier;
pub use verifier::{ChainVerifier, RpcVerifier, VerifiedTransfer, VerifyRequest};
