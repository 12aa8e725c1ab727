use alloy::primitives::TxHash;
use alloy::sol_types::{Revert, SolError};
use alloy::transports::TransportError;
use thiserror::Error;

use crate::address::AddressError;

/// Errors raised while talking to the node or the voting contract
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid RPC URL: {0}")]
    InvalidUrl(String),

    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        reason: Option<String>,
    },

    #[error("Malformed RPC response: {0}")]
    Malformed(String),

    #[error("ABI error: {0}")]
    Abi(#[from] alloy::sol_types::Error),

    #[error("Invalid address: {0}")]
    Address(#[from] AddressError),

    #[error("Transaction {0} reverted")]
    Reverted(TxHash),

    #[error("Timed out waiting for receipt of {0}")]
    ReceiptTimeout(TxHash),

    #[error("No signing wallet configured")]
    NoSigner,

    #[error("Invalid private key")]
    InvalidKey,

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Invalid ether amount: {0}")]
    InvalidAmount(String),
}

impl From<TransportError> for ChainError {
    /// JSON-RPC error responses keep their code; revert data is decoded
    /// into the contract's reason string when present.
    fn from(error: TransportError) -> Self {
        match error.as_error_resp() {
            Some(payload) => ChainError::Rpc {
                code: payload.code,
                message: payload.message.to_string(),
                reason: payload
                    .as_revert_data()
                    .and_then(|data| Revert::abi_decode(&data).ok())
                    .map(|revert| revert.reason),
            },
            None => ChainError::Transport(error.to_string()),
        }
    }
}

impl ChainError {
    /// Short message suitable for a status line
    pub fn reason(&self) -> String {
        match self {
            ChainError::Rpc {
                reason: Some(reason),
                ..
            } => reason.clone(),
            ChainError::Rpc { message, .. } => {
                let message = message.split(" (").next().unwrap_or(message);
                message
                    .strip_prefix("execution reverted: ")
                    .unwrap_or(message)
                    .to_string()
            }
            other => other.to_string(),
        }
    }

    /// True when the node executed the call and the contract rejected it
    pub fn is_execution_error(&self) -> bool {
        matches!(self, ChainError::Rpc { .. } | ChainError::Reverted(_))
    }
}
