//! Settlement Ledger
//!
//! Tracks withdrawable balances per account and settles tickets exactly once.
//! Withdrawals are two-phase: the balance is zeroed first, and only restored if
//! the external transfer reports failure.

use crate::errors::{LotteryError, LotteryResult};
use crate::lottery::types::{AccountId, Amount, Ticket};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettlementLedger {
    balances: BTreeMap<AccountId, Amount>,
}

impl SettlementLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_balances(balances: impl IntoIterator<Item = (AccountId, Amount)>) -> Self {
        Self {
            balances: balances.into_iter().filter(|(_, amount)| *amount > 0).collect(),
        }
    }

    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn balances(&self) -> impl Iterator<Item = (&AccountId, Amount)> {
        self.balances.iter().map(|(account, amount)| (account, *amount))
    }

    /// Credit `amount` to the ticket owner and mark the ticket paid
    pub fn settle_ticket(&mut self, ticket: &mut Ticket, amount: Amount) -> LotteryResult<Amount> {
        if ticket.paid_out {
            return Err(LotteryError::AlreadyPaid(ticket.id));
        }

        let new_balance = self
            .balance_of(&ticket.owner)
            .checked_add(amount)
            .ok_or(LotteryError::ArithmeticOverflow("account balance"))?;

        if amount > 0 {
            self.balances.insert(ticket.owner.clone(), new_balance);
        }
        ticket.paid_out = true;
        Ok(new_balance)
    }

    /// Zero the account's balance and return what it held
    pub fn take_balance(&mut self, account: &AccountId) -> Amount {
        self.balances.remove(account).unwrap_or(0)
    }

    /// Overwrite a balance with an earlier value
    pub(crate) fn set_balance(&mut self, account: &AccountId, amount: Amount) {
        if amount == 0 {
            self.balances.remove(account);
        } else {
            self.balances.insert(account.clone(), amount);
        }
    }

    /// Put back a balance taken for a transfer that did not go through
    pub fn restore_balance(&mut self, account: &AccountId, amount: Amount) -> LotteryResult<Amount> {
        if amount == 0 {
            return Ok(self.balance_of(account));
        }
        let restored = self
            .balance_of(account)
            .checked_add(amount)
            .ok_or(LotteryError::ArithmeticOverflow("account balance"))?;
        self.balances.insert(account.clone(), restored);
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lottery::types::{Selection, TicketId};
    use chrono::Utc;

    fn ticket(owner: &str) -> Ticket {
        Ticket {
            id: TicketId(1),
            owner: AccountId::new(owner),
            selection: Selection::new(&[1, 2, 3, 4, 5, 6, 7]).unwrap(),
            amount_paid: 100,
            paid_out: false,
            purchased_at: Utc::now(),
        }
    }

    #[test]
    fn test_settle_ticket_exactly_once() {
        let mut ledger = SettlementLedger::new();
        let mut t = ticket("carol");

        assert_eq!(ledger.settle_ticket(&mut t, 250).unwrap(), 250);
        assert!(t.paid_out);

        assert!(matches!(ledger.settle_ticket(&mut t, 250), Err(LotteryError::AlreadyPaid(TicketId(1)))));
        assert_eq!(ledger.balance_of(&t.owner), 250);
    }

    #[test]
    fn test_zero_prize_marks_paid_without_balance_entry() {
        let mut ledger = SettlementLedger::new();
        let mut t = ticket("dave");

        ledger.settle_ticket(&mut t, 0).unwrap();
        assert!(t.paid_out);
        assert_eq!(ledger.balances().count(), 0);
    }

    #[test]
    fn test_take_and_restore_balance() {
        let mut ledger = SettlementLedger::new();
        let mut t = ticket("erin");
        ledger.settle_ticket(&mut t, 40).unwrap();

        assert_eq!(ledger.take_balance(&t.owner), 40);
        assert_eq!(ledger.take_balance(&t.owner), 0);

        assert_eq!(ledger.restore_balance(&t.owner, 40).unwrap(), 40);
        assert_eq!(ledger.balance_of(&t.owner), 40);
    }

    #[test]
    fn test_set_balance_drops_zero_entries() {
        let mut ledger = SettlementLedger::new();
        let frank = AccountId::new("frank");

        ledger.set_balance(&frank, 75);
        assert_eq!(ledger.balance_of(&frank), 75);

        ledger.set_balance(&frank, 0);
        assert_eq!(ledger.balances().count(), 0);
    }
}
