//! Tier Classifier
//!
//! A ticket's tier is the size of the intersection between its selection and
//! the official draw. Both sides hold distinct values, so membership counting
//! is exact and bounded by 0..=7.

use crate::errors::{LotteryError, LotteryResult};
use crate::lottery::draw::CompletedDraw;
use crate::lottery::types::{Selection, Ticket, MAX_NUMBER, TIER_COUNT};
use serde::{Deserialize, Serialize};

/// Number of a ticket's numbers that appear in the draw
pub fn match_count(ticket: &Selection, official: &CompletedDraw) -> usize {
    let mut drawn = [false; MAX_NUMBER as usize + 1];
    for &n in official.numbers() {
        drawn[n as usize] = true;
    }
    ticket
        .numbers()
        .iter()
        .filter(|&&n| drawn[n as usize])
        .count()
}

/// Ticket count per match tier, tiers 0 through 7
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TierStatistics([u64; TIER_COUNT]);

impl TierStatistics {
    /// Accept externally supplied counts. Exactly one entry per tier.
    pub fn from_counts(counts: &[u64]) -> LotteryResult<Self> {
        let counts: [u64; TIER_COUNT] = counts.try_into().map_err(|_| {
            LotteryError::BadTierStats(format!(
                "expected {} tier counts, got {}",
                TIER_COUNT,
                counts.len()
            ))
        })?;
        Ok(Self(counts))
    }

    /// Count tiers directly from the sold tickets
    pub fn tally<'a>(tickets: impl IntoIterator<Item = &'a Ticket>, official: &CompletedDraw) -> Self {
        let mut counts = [0u64; TIER_COUNT];
        for ticket in tickets {
            counts[match_count(&ticket.selection, official)] += 1;
        }
        Self(counts)
    }

    pub fn count(&self, tier: usize) -> LotteryResult<u64> {
        self.0.get(tier).copied().ok_or(LotteryError::InvalidTier(tier))
    }

    pub fn counts(&self) -> &[u64; TIER_COUNT] {
        &self.0
    }

    /// Sum over all tiers, `None` on overflow
    pub fn total(&self) -> Option<u64> {
        self.0.iter().try_fold(0u64, |acc, &c| acc.checked_add(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lottery::draw::DrawResolver;
    use crate::lottery::types::{AccountId, TicketId};
    use chrono::Utc;

    fn draw(values: [u8; 7]) -> CompletedDraw {
        let mut resolver = DrawResolver::new();
        for v in values {
            resolver.submit_drawn_number(v).unwrap();
        }
        resolver.completed().unwrap()
    }

    fn selection(values: [u8; 7]) -> Selection {
        Selection::new(&values).unwrap()
    }

    #[test]
    fn test_identical_ticket_scores_seven() {
        let official = draw([4, 8, 15, 16, 23, 38, 39]);
        assert_eq!(match_count(&selection([39, 38, 23, 16, 15, 8, 4]), &official), 7);
    }

    #[test]
    fn test_disjoint_ticket_scores_zero() {
        let official = draw([1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(match_count(&selection([10, 11, 12, 13, 14, 15, 16]), &official), 0);
    }

    #[test]
    fn test_position_does_not_matter() {
        let official = draw([1, 2, 3, 4, 5, 6, 7]);
        // Same values in the same slot still count once each
        assert_eq!(match_count(&selection([1, 2, 3, 20, 21, 22, 23]), &official), 3);
        assert_eq!(match_count(&selection([20, 21, 22, 23, 3, 2, 1]), &official), 3);
    }

    #[test]
    fn test_match_count_is_symmetric() {
        let a = [2, 9, 17, 21, 30, 33, 36];
        let b = [9, 30, 1, 5, 36, 12, 14];
        assert_eq!(
            match_count(&selection(a), &draw(b)),
            match_count(&selection(b), &draw(a))
        );
    }

    #[test]
    fn test_tally_sums_to_ticket_count() {
        let official = draw([1, 2, 3, 4, 5, 6, 7]);
        let tickets: Vec<Ticket> = [
            [1, 2, 3, 4, 5, 6, 7],
            [1, 2, 3, 30, 31, 32, 33],
            [20, 21, 22, 23, 24, 25, 26],
        ]
        .iter()
        .enumerate()
        .map(|(i, numbers)| Ticket {
            id: TicketId(i as u64 + 1),
            owner: AccountId::new("bob"),
            selection: selection(*numbers),
            amount_paid: 10,
            paid_out: false,
            purchased_at: Utc::now(),
        })
        .collect();

        let stats = TierStatistics::tally(&tickets, &official);
        assert_eq!(stats.counts(), &[1, 0, 0, 1, 0, 0, 0, 1]);
        assert_eq!(stats.total(), Some(3));
    }

    #[test]
    fn test_from_counts_requires_eight_entries() {
        assert!(TierStatistics::from_counts(&[0; 7]).is_err());
        assert!(TierStatistics::from_counts(&[0; 9]).is_err());

        let stats = TierStatistics::from_counts(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(stats.count(7).unwrap(), 8);
        assert!(matches!(stats.count(8), Err(LotteryError::InvalidTier(8))));
    }
}
