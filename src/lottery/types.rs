use crate::errors::{LotteryError, LotteryResult};
use chrono::{DateTime, Utc};
use rand::{seq::index, Rng};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numbers chosen per ticket and drawn per round
pub const NUMBERS_PER_TICKET: usize = 7;

/// Smallest selectable number
pub const MIN_NUMBER: u8 = 1;

/// Largest selectable number
pub const MAX_NUMBER: u8 = 39;

/// Match tiers 0..=7
pub const TIER_COUNT: usize = NUMBERS_PER_TICKET + 1;

/// Amount in the smallest currency unit
pub type Amount = u64;

/// Sequential ticket identifier, starting at 1 in every round
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TicketId(pub u64);

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Account identifier (wallet address or player id)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Returns true when `value` is a selectable number
pub fn in_range(value: u8) -> bool {
    (MIN_NUMBER..=MAX_NUMBER).contains(&value)
}

/// Seven distinct numbers in 1..=39, in the order the player chose them
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Selection([u8; NUMBERS_PER_TICKET]);

impl Selection {
    /// Validate a raw selection
    pub fn new(numbers: &[u8]) -> LotteryResult<Self> {
        let array: [u8; NUMBERS_PER_TICKET] = numbers.try_into().map_err(|_| {
            LotteryError::InvalidSelection(format!(
                "expected {} numbers, got {}",
                NUMBERS_PER_TICKET,
                numbers.len()
            ))
        })?;

        let mut seen = [false; MAX_NUMBER as usize + 1];
        for &n in &array {
            if !in_range(n) {
                return Err(LotteryError::InvalidSelection(format!(
                    "number {} is outside {}..={}",
                    n, MIN_NUMBER, MAX_NUMBER
                )));
            }
            if seen[n as usize] {
                return Err(LotteryError::InvalidSelection(format!(
                    "number {} chosen more than once",
                    n
                )));
            }
            seen[n as usize] = true;
        }

        Ok(Self(array))
    }

    /// Pick seven distinct numbers at random
    pub fn quick_pick<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut numbers = [0u8; NUMBERS_PER_TICKET];
        let picks = index::sample(rng, MAX_NUMBER as usize, NUMBERS_PER_TICKET);
        for (slot, pick) in numbers.iter_mut().zip(picks.iter()) {
            *slot = pick as u8 + MIN_NUMBER;
        }
        Self(numbers)
    }

    pub fn numbers(&self) -> &[u8; NUMBERS_PER_TICKET] {
        &self.0
    }

    pub fn contains(&self, value: u8) -> bool {
        self.0.contains(&value)
    }
}

/// A sold ticket. Immutable after purchase except for `paid_out`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ticket {
    pub id: TicketId,
    pub owner: AccountId,
    pub selection: Selection,
    pub amount_paid: Amount,
    pub paid_out: bool,
    pub purchased_at: DateTime<Utc>,
}
