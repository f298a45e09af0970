//! In-process funds transfer
//!
//! Keeps per-account received totals and a receipt log. An optional reserve
//! caps how much the payout wallet can send, which is how failed transfers are
//! exercised without a real payment rail.

use crate::common::traits::{FundsTransfer, TransferError, TransferReceipt};
use crate::lottery::{AccountId, Amount};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryFundsTransfer {
    received: DashMap<AccountId, Amount>,
    receipts: DashMap<String, TransferReceipt>,
    /// Remaining funds in the payout wallet; `None` means unlimited
    reserve: Mutex<Option<Amount>>,
}

impl InMemoryFundsTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payout wallet holding exactly `reserve`
    pub fn with_reserve(reserve: Amount) -> Self {
        Self {
            reserve: Mutex::new(Some(reserve)),
            ..Default::default()
        }
    }

    /// Total ever transferred to `account`
    pub fn received(&self, account: &AccountId) -> Amount {
        self.received.get(account).map(|v| *v).unwrap_or(0)
    }

    pub fn receipt(&self, transfer_id: &str) -> Option<TransferReceipt> {
        self.receipts.get(transfer_id).map(|r| r.value().clone())
    }

    pub fn transfer_count(&self) -> usize {
        self.receipts.len()
    }

    pub async fn top_up(&self, amount: Amount) {
        let mut reserve = self.reserve.lock().await;
        if let Some(remaining) = reserve.as_mut() {
            *remaining = remaining.saturating_add(amount);
        }
    }
}

#[async_trait]
impl FundsTransfer for InMemoryFundsTransfer {
    async fn transfer(&self, to: &AccountId, amount: Amount) -> Result<TransferReceipt, TransferError> {
        {
            let mut reserve = self.reserve.lock().await;
            if let Some(remaining) = reserve.as_mut() {
                if *remaining < amount {
                    return Err(TransferError::InsufficientFunds {
                        needed: amount,
                        available: *remaining,
                    });
                }
                *remaining -= amount;
            }
        }

        let receipt = TransferReceipt {
            transfer_id: format!("transfer_{}", Uuid::new_v4()),
            to: to.clone(),
            amount,
            completed_at: Utc::now(),
        };

        *self.received.entry(to.clone()).or_insert(0) += amount;
        self.receipts.insert(receipt.transfer_id.clone(), receipt.clone());

        debug!(transfer_id = %receipt.transfer_id, to = %to, amount, "Transfer completed");
        Ok(receipt)
    }
}
