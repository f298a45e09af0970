//! Prize Table
//!
//! Splits a round's pool into an operator cut and a per-ticket payout for each
//! match tier. All arithmetic is integer; whatever integer division leaves
//! behind is added to the operator cut, so payouts plus cut equal the pool
//! exactly.

use crate::errors::{ConfigurationError, LotteryError, LotteryResult};
use crate::lottery::classifier::TierStatistics;
use crate::lottery::types::{Amount, TIER_COUNT};
use serde::{Deserialize, Serialize};

pub const BPS_DENOMINATOR: u128 = 10_000;

/// How the pool is divided between operator and tiers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrizePolicy {
    /// Operator share of the pool in basis points
    pub operator_cut_bps: u16,
    /// Relative share of the distributable pool for each tier 0..=7
    pub tier_weights: [u32; TIER_COUNT],
}

impl Default for PrizePolicy {
    fn default() -> Self {
        Self {
            operator_cut_bps: 500,
            tier_weights: [0, 1, 2, 4, 8, 16, 32, 64],
        }
    }
}

impl PrizePolicy {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if u128::from(self.operator_cut_bps) > BPS_DENOMINATOR {
            return Err(ConfigurationError::InvalidValue {
                field: "prizes.operator_cut_bps".to_string(),
                value: self.operator_cut_bps.to_string(),
                reason: "cannot exceed 10000 basis points".to_string(),
            });
        }
        if self.tier_weights[1..].iter().all(|&w| w == 0) {
            return Err(ConfigurationError::InvalidValue {
                field: "prizes.tier_weights".to_string(),
                value: format!("{:?}", self.tier_weights),
                reason: "at least one of tiers 1..=7 needs a non-zero weight".to_string(),
            });
        }
        Ok(())
    }
}

/// Per-ticket payout for every tier of one round. Immutable once computed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrizeTable {
    per_ticket: [Amount; TIER_COUNT],
    total_pool: Amount,
    /// Cut reserved by policy before remainders
    reserved_cut: Amount,
    /// Cut actually owed to the operator, remainders included
    operator_cut: Amount,
    total_payout: Amount,
}

impl PrizeTable {
    pub fn compute(
        stats: &TierStatistics,
        tickets_sold: u64,
        total_pool: Amount,
        policy: &PrizePolicy,
    ) -> LotteryResult<Self> {
        policy.validate()?;

        match stats.total() {
            Some(total) if total == tickets_sold => {}
            Some(total) => {
                return Err(LotteryError::BadTierStats(format!(
                    "tier counts sum to {} but {} tickets were sold",
                    total, tickets_sold
                )))
            }
            None => return Err(LotteryError::BadTierStats("tier counts overflow".to_string())),
        }

        let pool = u128::from(total_pool);
        let reserved_cut = pool * u128::from(policy.operator_cut_bps) / BPS_DENOMINATOR;
        let distributable = pool - reserved_cut;

        let counts = stats.counts();
        let active_weight: u128 = (0..TIER_COUNT)
            .filter(|&t| counts[t] > 0)
            .map(|t| u128::from(policy.tier_weights[t]))
            .sum();

        let mut per_ticket = [0 as Amount; TIER_COUNT];
        let mut total_payout: u128 = 0;
        if active_weight > 0 {
            for tier in 0..TIER_COUNT {
                let count = u128::from(counts[tier]);
                let weight = u128::from(policy.tier_weights[tier]);
                if count == 0 || weight == 0 {
                    continue;
                }
                let tier_share = distributable * weight / active_weight;
                let amount = tier_share / count;
                per_ticket[tier] = amount as Amount;
                total_payout += amount * count;
            }
        }

        // Unclaimed tiers and division remainders stay with the operator
        let operator_cut = pool - total_payout;
        debug_assert!(total_payout <= distributable);

        Ok(Self {
            per_ticket,
            total_pool,
            reserved_cut: reserved_cut as Amount,
            operator_cut: operator_cut as Amount,
            total_payout: total_payout as Amount,
        })
    }

    pub fn payout_for(&self, tier: usize) -> LotteryResult<Amount> {
        self.per_ticket.get(tier).copied().ok_or(LotteryError::InvalidTier(tier))
    }

    pub fn per_ticket(&self) -> &[Amount; TIER_COUNT] {
        &self.per_ticket
    }

    pub fn total_pool(&self) -> Amount {
        self.total_pool
    }

    pub fn reserved_cut(&self) -> Amount {
        self.reserved_cut
    }

    pub fn operator_cut(&self) -> Amount {
        self.operator_cut
    }

    /// Sum of all ticket payouts across the round
    pub fn total_payout(&self) -> Amount {
        self.total_payout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(counts: [u64; TIER_COUNT]) -> TierStatistics {
        TierStatistics::from_counts(&counts).unwrap()
    }

    #[test]
    fn test_payouts_plus_cut_equal_pool() {
        let s = stats([3, 2, 2, 1, 1, 0, 0, 1]);
        let pool = 10 * 1_000_003;
        let table = PrizeTable::compute(&s, 10, pool, &PrizePolicy::default()).unwrap();

        let paid: u64 = (0..TIER_COUNT)
            .map(|t| table.payout_for(t).unwrap() * s.count(t).unwrap())
            .sum();
        assert_eq!(paid, table.total_payout());
        assert_eq!(paid + table.operator_cut(), pool);
        assert!(table.operator_cut() >= table.reserved_cut());
        assert_eq!(table.reserved_cut(), pool * 5 / 100);
    }

    #[test]
    fn test_higher_tiers_pay_more() {
        let s = stats([0, 1, 1, 1, 1, 1, 1, 1]);
        let table = PrizePolicy::default();
        let table = PrizeTable::compute(&s, 7, 7_000_000, &table).unwrap();

        for tier in 1..TIER_COUNT - 1 {
            assert!(table.payout_for(tier + 1).unwrap() > table.payout_for(tier).unwrap());
        }
        assert_eq!(table.payout_for(0).unwrap(), 0);
    }

    #[test]
    fn test_empty_tiers_receive_nothing() {
        let s = stats([5, 0, 0, 0, 0, 0, 0, 1]);
        let table = PrizeTable::compute(&s, 6, 600, &PrizePolicy::default()).unwrap();

        assert_eq!(table.payout_for(6).unwrap(), 0);
        // The only weighted winner takes the whole distributable pool
        assert_eq!(table.payout_for(7).unwrap(), 570);
        assert_eq!(table.operator_cut(), 30);
    }

    #[test]
    fn test_no_winners_leaves_pool_with_operator() {
        let s = stats([4, 0, 0, 0, 0, 0, 0, 0]);
        let table = PrizeTable::compute(&s, 4, 400, &PrizePolicy::default()).unwrap();
        assert_eq!(table.total_payout(), 0);
        assert_eq!(table.operator_cut(), 400);
    }

    #[test]
    fn test_rejects_counts_not_matching_tickets_sold() {
        let s = stats([1, 1, 1, 1, 1, 1, 1, 1]);
        let err = PrizeTable::compute(&s, 9, 900, &PrizePolicy::default()).unwrap_err();
        assert!(matches!(err, LotteryError::BadTierStats(_)));
    }

    #[test]
    fn test_rejects_invalid_policy() {
        let s = stats([1, 0, 0, 0, 0, 0, 0, 0]);
        let policy = PrizePolicy {
            operator_cut_bps: 10_001,
            ..PrizePolicy::default()
        };
        assert!(matches!(
            PrizeTable::compute(&s, 1, 100, &policy),
            Err(LotteryError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_pool() {
        let s = stats([0; TIER_COUNT]);
        let table = PrizeTable::compute(&s, 0, 0, &PrizePolicy::default()).unwrap();
        assert_eq!(table.operator_cut(), 0);
        assert_eq!(table.per_ticket(), &[0; TIER_COUNT]);
    }
}
