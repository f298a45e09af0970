//! Round record and lifecycle
//!
//! Open -> DrawPending -> DrawComplete -> StatsImported -> Settled. Every
//! transition goes through [`Round::advance`], so operations issued in the
//! wrong order are rejected in one place.

use crate::errors::{LotteryError, LotteryResult};
use crate::lottery::types::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RoundState {
    Open,
    DrawPending,
    DrawComplete,
    StatsImported,
    Settled,
}

impl RoundState {
    fn next(self) -> Option<RoundState> {
        match self {
            RoundState::Open => Some(RoundState::DrawPending),
            RoundState::DrawPending => Some(RoundState::DrawComplete),
            RoundState::DrawComplete => Some(RoundState::StatsImported),
            RoundState::StatsImported => Some(RoundState::Settled),
            RoundState::Settled => None,
        }
    }
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoundState::Open => "open",
            RoundState::DrawPending => "draw_pending",
            RoundState::DrawComplete => "draw_complete",
            RoundState::StatsImported => "stats_imported",
            RoundState::Settled => "settled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Round {
    pub number: u64,
    state: RoundState,
    /// Aggregate paid in by ticket sales
    pub paid_in: Amount,
    operator_cut_withdrawn: bool,
    pub opened_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Round {
    pub fn new(number: u64) -> Self {
        Self {
            number,
            state: RoundState::Open,
            paid_in: 0,
            operator_cut_withdrawn: false,
            opened_at: Utc::now(),
            settled_at: None,
        }
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn operator_cut_withdrawn(&self) -> bool {
        self.operator_cut_withdrawn
    }

    /// Move exactly one step forward in the lifecycle
    pub fn advance(&mut self, to: RoundState) -> LotteryResult<()> {
        if self.state.next() != Some(to) {
            return Err(LotteryError::InvalidTransition {
                round: self.number,
                from: self.state,
                to,
            });
        }
        self.state = to;
        if to == RoundState::Settled {
            self.settled_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn ensure_open(&self) -> LotteryResult<()> {
        if self.state != RoundState::Open {
            return Err(LotteryError::SalesClosed(self.number));
        }
        Ok(())
    }

    /// Prize amounts are only known once tier statistics are in
    pub fn ensure_finalized(&self) -> LotteryResult<()> {
        if self.state < RoundState::StatsImported {
            return Err(LotteryError::DrawNotFinalized(format!(
                "round {} is {}",
                self.number, self.state
            )));
        }
        Ok(())
    }

    pub(crate) fn mark_operator_cut_withdrawn(&mut self) -> LotteryResult<()> {
        if self.operator_cut_withdrawn {
            return Err(LotteryError::AlreadyWithdrawn(self.number));
        }
        self.operator_cut_withdrawn = true;
        Ok(())
    }

    pub(crate) fn clear_operator_cut_withdrawn(&mut self) {
        self.operator_cut_withdrawn = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_in_order() {
        let mut round = Round::new(1);
        for to in [
            RoundState::DrawPending,
            RoundState::DrawComplete,
            RoundState::StatsImported,
            RoundState::Settled,
        ] {
            round.advance(to).unwrap();
        }
        assert_eq!(round.state(), RoundState::Settled);
        assert!(round.settled_at.is_some());
    }

    #[test]
    fn test_skipping_a_state_is_rejected() {
        let mut round = Round::new(3);
        let err = round.advance(RoundState::StatsImported).unwrap_err();
        assert!(matches!(
            err,
            LotteryError::InvalidTransition {
                round: 3,
                from: RoundState::Open,
                to: RoundState::StatsImported
            }
        ));
        assert_eq!(round.state(), RoundState::Open);
    }

    #[test]
    fn test_sales_and_finalization_guards() {
        let mut round = Round::new(1);
        assert!(round.ensure_open().is_ok());
        assert!(matches!(round.ensure_finalized(), Err(LotteryError::DrawNotFinalized(_))));

        round.advance(RoundState::DrawPending).unwrap();
        assert!(matches!(round.ensure_open(), Err(LotteryError::SalesClosed(1))));
    }

    #[test]
    fn test_operator_cut_flag_set_once() {
        let mut round = Round::new(2);
        round.mark_operator_cut_withdrawn().unwrap();
        assert!(matches!(round.mark_operator_cut_withdrawn(), Err(LotteryError::AlreadyWithdrawn(2))));

        round.clear_operator_cut_withdrawn();
        assert!(!round.operator_cut_withdrawn());
    }
}
