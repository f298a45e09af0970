//! Collaborator interfaces the lottery service depends on
//!
//! Both are called with the engine lock released, so implementations may take
//! as long as they need and may fail independently of engine state.

use crate::lottery::{AccountId, Amount, DrawRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source of official draw numbers
///
/// Answers a [`DrawRequest`] with one value. The engine validates the value on
/// arrival, so a source returning out-of-range or repeated numbers is tolerated;
/// the request is simply retired and a new one issued.
#[async_trait]
pub trait RandomDrawSource: Send + Sync {
    /// Produce the value for one outstanding request
    async fn draw_number(&self, request: &DrawRequest) -> Result<u8, DrawSourceError>;

    /// Called once a new round is open and persisted
    fn round_started(&self, _round: u64) {}
}

/// Outbound payments to account holders and the operator
#[async_trait]
pub trait FundsTransfer: Send + Sync {
    /// Move `amount` to `to`. An `Err` means no funds moved.
    async fn transfer(&self, to: &AccountId, amount: Amount) -> Result<TransferReceipt, TransferError>;
}

/// Proof that a transfer went through
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferReceipt {
    pub transfer_id: String,
    pub to: AccountId,
    pub amount: Amount,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum DrawSourceError {
    #[error("Draw source unavailable: {0}")]
    Unavailable(String),

    #[error("Draw source timed out")]
    Timeout,

    #[error("Draw proof generation failed: {0}")]
    ProofFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("Insufficient funds in payout wallet: needed {needed}, available {available}")]
    InsufficientFunds { needed: Amount, available: Amount },

    #[error("Recipient rejected: {0}")]
    RecipientRejected(String),

    #[error("Transfer provider unavailable: {0}")]
    Unavailable(String),

    #[error("Transfer timed out")]
    Timeout,
}

impl From<DrawSourceError> for crate::errors::LotteryError {
    fn from(e: DrawSourceError) -> Self {
        crate::errors::LotteryError::DrawSourceFailed(e.to_string())
    }
}

impl From<TransferError> for crate::errors::LotteryError {
    fn from(e: TransferError) -> Self {
        crate::errors::LotteryError::TransferFailed(e.to_string())
    }
}
